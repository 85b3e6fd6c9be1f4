//! Monetary CLI - ledger and recharge orders from command line
//!
//! Usage:
//! ```bash
//! monetary init
//! monetary credit onebot:10001 100 --currency gold
//! monetary transfer alice bob 50
//! monetary balance '#12'
//! monetary order create onebot:10001 10.00 --product 1
//! monetary order notify out_trade_no=NL... trade_status=TRADE_SUCCESS ... sign=...
//! monetary order list --status success --from 2026-01-01
//! ```
//!
//! Gateway settings come from `MONETARY_*` environment variables.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use monetary_business::{CreateOrder, LedgerConfig, DEFAULT_PLATFORM};
use monetary_core::{AccountRef, DEFAULT_CURRENCY};
use monetary_epay::{GatewayConfig, DEFAULT_BASE_PATH};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod commands;
mod db;

use commands::{ledger, orders, products, App};

/// Monetary - multi-currency balance ledger with epay recharge orders
#[derive(Parser)]
#[command(name = "monetary")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Database file path
    #[arg(long, env = "MONETARY_DB", default_value = "data/monetary.db", global = true)]
    pub db: PathBuf,

    /// Platform assumed for bare identifiers
    #[arg(long, env = "MONETARY_DEFAULT_PLATFORM", default_value = DEFAULT_PLATFORM, global = true)]
    pub platform: String,

    /// Upper bound on every store operation, in seconds
    #[arg(long, env = "MONETARY_TIMEOUT_SECS", default_value_t = 5, global = true)]
    pub timeout_secs: u64,

    #[command(flatten)]
    pub gateway: GatewayArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Payment gateway settings
#[derive(Args)]
pub struct GatewayArgs {
    /// Gateway root URL, with trailing slash
    #[arg(long, env = "MONETARY_API_URL", default_value = "", global = true)]
    pub api_url: String,

    /// Merchant id
    #[arg(long, env = "MONETARY_PID", default_value = "", global = true)]
    pub pid: String,

    /// Platform public key: PEM, bare base64, or a file holding either
    #[arg(long, env = "MONETARY_PLATFORM_PUBLIC_KEY", default_value = "", hide_env_values = true, global = true)]
    pub platform_public_key: String,

    /// Merchant private key: PEM, bare base64, or a file holding either
    #[arg(long, env = "MONETARY_MERCHANT_PRIVATE_KEY", default_value = "", hide_env_values = true, global = true)]
    pub merchant_private_key: String,

    /// Public URL of this service, used to derive callback URLs
    #[arg(long, env = "MONETARY_BASE_URL", default_value = "", global = true)]
    pub base_url: String,

    #[arg(long, env = "MONETARY_BASE_PATH", default_value = DEFAULT_BASE_PATH, global = true)]
    pub base_path: String,

    #[arg(long, env = "MONETARY_NOTIFY_URL", default_value = "", global = true)]
    pub notify_url: String,

    #[arg(long, env = "MONETARY_RETURN_URL", default_value = "", global = true)]
    pub return_url: String,

    /// Credits per yuan for orders without a product
    #[arg(long, env = "MONETARY_CREDITS_PER_YUAN", default_value = "10", global = true)]
    pub credits_per_yuan: Decimal,

    /// Admin console password; the console is disabled when unset
    #[arg(long, env = "MONETARY_ADMIN_PASSWORD", hide_env_values = true, global = true)]
    pub admin_password: Option<String>,
}

/// Key values naming an existing file are read from it
fn key_material(value: &str) -> Result<String> {
    let path = Path::new(value);
    if !value.is_empty() && path.is_file() {
        return std::fs::read_to_string(path).with_context(|| format!("Failed to read key file {:?}", path));
    }
    Ok(value.to_string())
}

impl GatewayArgs {
    fn into_config(self) -> Result<GatewayConfig> {
        Ok(GatewayConfig {
            api_url: self.api_url,
            pid: self.pid,
            platform_public_key: key_material(&self.platform_public_key)?,
            merchant_private_key: key_material(&self.merchant_private_key)?,
            notify_url: self.notify_url,
            return_url: self.return_url,
            base_url: self.base_url,
            base_path: self.base_path,
            credits_per_yuan: self.credits_per_yuan,
            admin_password: self.admin_password.filter(|p| !p.is_empty()),
        })
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize database with schema
    Init {
        /// Force re-initialization (drops existing data)
        #[arg(long)]
        force: bool,
    },

    /// Show database status
    Status,

    /// Show a balance (`#123` is an account id, anything else an identifier)
    Balance {
        account: AccountRef,
        #[arg(long, short, default_value = DEFAULT_CURRENCY)]
        currency: String,
    },

    /// Add to a balance
    Credit {
        account: AccountRef,
        amount: i64,
        #[arg(long, short, default_value = DEFAULT_CURRENCY)]
        currency: String,
    },

    /// Subtract from a balance
    Debit {
        account: AccountRef,
        amount: i64,
        #[arg(long, short, default_value = DEFAULT_CURRENCY)]
        currency: String,
    },

    /// Move funds between two accounts
    Transfer {
        from: AccountRef,
        to: AccountRef,
        amount: i64,
        #[arg(long, short, default_value = DEFAULT_CURRENCY)]
        currency: String,
    },

    /// Product catalog
    Product {
        #[command(subcommand)]
        action: ProductAction,
    },

    /// Recharge orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },

    /// Balance and last orders of an identifier
    Query {
        user_id: String,
    },
}

#[derive(Subcommand)]
pub enum ProductAction {
    /// Add or replace a product
    Add {
        #[arg(long)]
        id: i64,
        #[arg(long, short)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Currency credited on purchase
        #[arg(long, short, default_value = DEFAULT_CURRENCY)]
        currency: String,
        /// Credits per yuan
        #[arg(long)]
        rate: Decimal,
        /// Minimum order amount in yuan
        #[arg(long, default_value = "0.01")]
        min: Decimal,
        /// Maximum order amount in yuan
        #[arg(long)]
        max: Option<Decimal>,
        #[arg(long)]
        disabled: bool,
        #[arg(long, default_value_t = 0)]
        sort_order: i64,
    },
    /// List enabled products
    List,
}

#[derive(Subcommand)]
pub enum OrderAction {
    /// Create a pending order and its signed pay form
    Create {
        user_id: String,
        /// Amount in yuan
        money: String,
        #[arg(long, default_value = "alipay")]
        pay_type: String,
        #[arg(long)]
        product: Option<i64>,
        #[arg(long)]
        name: Option<String>,
        /// Write the self-submitting pay form to this file
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// Process a gateway notification (`key=value` pairs)
    Notify {
        #[arg(required = true)]
        params: Vec<String>,
    },
    /// Check return redirect parameters (`key=value` pairs)
    Return {
        #[arg(required = true)]
        params: Vec<String>,
    },
    /// Settle an order manually (admin)
    Complete { out_trade_no: String },
    /// Mark a pending order as failed
    Fail { out_trade_no: String },
    /// List orders (admin)
    List {
        /// pending, success or failed
        #[arg(long)]
        status: Option<String>,
        /// Identifier substring
        #[arg(long)]
        user: Option<String>,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// End date (YYYY-MM-DD), inclusive
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = monetary_business::admin::DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
    /// Show one order
    Show { out_trade_no: String },
    /// Delete an order (admin)
    Delete { out_trade_no: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            db::init_database(&cli.db, force).await?;
            println!("✅ Database initialized at {:?}", cli.db);
            return Ok(());
        }
        Commands::Status => return db::show_status(&cli.db).await,
        _ => {}
    }

    let ledger_config = LedgerConfig {
        default_platform: cli.platform,
        op_timeout: Duration::from_secs(cli.timeout_secs.max(1)),
    };
    let app = App::open(&cli.db, ledger_config, cli.gateway.into_config()?).await?;

    let result = run(&app, cli.command).await;
    app.close().await;
    result
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Init { .. } | Commands::Status => Ok(()),

        Commands::Balance { account, currency } => ledger::balance(app, &account, &currency).await,

        Commands::Credit {
            account,
            amount,
            currency,
        } => ledger::credit(app, &account, amount, &currency).await,

        Commands::Debit {
            account,
            amount,
            currency,
        } => ledger::debit(app, &account, amount, &currency).await,

        Commands::Transfer {
            from,
            to,
            amount,
            currency,
        } => ledger::transfer(app, &from, &to, amount, &currency).await,

        Commands::Query { user_id } => ledger::query(app, &user_id).await,

        Commands::Product { action } => match action {
            ProductAction::Add {
                id,
                name,
                description,
                currency,
                rate,
                min,
                max,
                disabled,
                sort_order,
            } => {
                let input = products::ProductInput {
                    id,
                    name,
                    description,
                    currency,
                    rate,
                    min,
                    max,
                    disabled,
                    sort_order,
                };
                products::add(app, input).await
            }
            ProductAction::List => products::list(app).await,
        },

        Commands::Order { action } => match action {
            OrderAction::Create {
                user_id,
                money,
                pay_type,
                product,
                name,
                html,
            } => {
                let request = CreateOrder {
                    user_id,
                    money,
                    pay_type: Some(pay_type),
                    product_id: product,
                    name,
                };
                orders::create(app, request, html.as_deref()).await
            }
            OrderAction::Notify { params } => orders::notify(app, &params).await,
            OrderAction::Return { params } => orders::inspect_return(app, &params).await,
            OrderAction::Complete { out_trade_no } => orders::complete(app, &out_trade_no).await,
            OrderAction::Fail { out_trade_no } => orders::fail(app, &out_trade_no).await,
            OrderAction::List {
                status,
                user,
                from,
                to,
                page,
                page_size,
            } => {
                let args = orders::ListArgs {
                    status,
                    user,
                    from,
                    to,
                    page,
                    page_size,
                };
                orders::list(app, args).await
            }
            OrderAction::Show { out_trade_no } => orders::show(app, &out_trade_no).await,
            OrderAction::Delete { out_trade_no } => orders::delete(app, &out_trade_no).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_account_refs() {
        let cli = Cli::try_parse_from(["monetary", "transfer", "#12", "onebot:10001", "50", "-c", "gold"]).unwrap();
        match cli.command {
            Commands::Transfer {
                from,
                to,
                amount,
                currency,
            } => {
                assert_eq!(from, AccountRef::canonical(12));
                assert_eq!(to, AccountRef::external("onebot:10001"));
                assert_eq!(amount, 50);
                assert_eq!(currency, "gold");
            }
            _ => panic!("expected transfer"),
        }

        assert!(Cli::try_parse_from(["monetary", "balance", "#abc"]).is_err());
    }

    #[test]
    fn test_key_material_reads_files() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("key.pem");
        std::fs::write(&path, "-----BEGIN PUBLIC KEY-----").unwrap();

        assert_eq!(
            key_material(path.to_str().unwrap()).unwrap(),
            "-----BEGIN PUBLIC KEY-----"
        );
        assert_eq!(key_material("MIIBIjAN").unwrap(), "MIIBIjAN");
        assert_eq!(key_material("").unwrap(), "");
    }
}
