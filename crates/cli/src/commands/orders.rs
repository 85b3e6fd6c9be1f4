//! Recharge orders: create, notify, return, complete, fail, list, show, delete

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use monetary_business::{
    notification_reply, AdminConsole, Completion, CreateOrder, OrderPipeline, OrderQuery, SessionStore,
};
use monetary_core::{OrderFilter, OrderStatus, PaymentOrder};
use monetary_epay::params_from_pairs;
use std::path::Path;
use tracing::warn;

use super::App;

fn print_order(order: &PaymentOrder) {
    println!("   Order:    {}", order.out_trade_no);
    println!("   User:     {}", order.identifier_key);
    if let Some(account_id) = order.account_id {
        println!("   Account:  #{}", account_id);
    }
    println!("   Amount:   {} yuan ({})", order.amount(), order.pay_type);
    println!("   Credits:  {} {}", order.credits, order.currency);
    println!("   Status:   {}", order.status);
    println!("   Created:  {}", order.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("   Updated:  {}", order.updated_at.format("%Y-%m-%d %H:%M:%S"));
}

fn print_completion(out_trade_no: &str, completion: &Completion) {
    match completion {
        Completion::Settled {
            credits,
            currency,
            balance,
        } => {
            println!("✅ Order {} settled", out_trade_no);
            println!("   Credited: {} {}", credits, currency);
            println!("   Balance:  {}", balance);
        }
        Completion::AlreadySettled => println!("ℹ️  Order {} was already settled", out_trade_no),
    }
}

/// Create a pending order and print (or save) its pay form
pub async fn create(app: &App, request: CreateOrder, html: Option<&Path>) -> Result<()> {
    let created = OrderPipeline::new(&app.ctx, &app.gateway)
        .create_order(&request)
        .await
        .with_context(|| format!("Failed to create order for {}", request.user_id))?;

    println!("✅ Order created!");
    print_order(&created.order);
    println!();
    println!("   Submit to: {}", created.form.action);
    for (name, value) in &created.form.fields {
        println!("   {:<14} {}", name, value);
    }

    if let Some(path) = html {
        std::fs::write(path, created.form.to_html())
            .with_context(|| format!("Failed to write pay form to {:?}", path))?;
        println!();
        println!("📄 Pay form written to {:?}", path);
    }
    Ok(())
}

/// Process a gateway notification given as `key=value` pairs.
///
/// Prints the reply body the gateway expects.
pub async fn notify(app: &App, pairs: &[String]) -> Result<()> {
    let params = params_from_pairs(pairs.iter().map(String::as_str)).map_err(anyhow::Error::msg)?;

    let result = OrderPipeline::new(&app.ctx, &app.gateway)
        .handle_notification(&params)
        .await;
    if let Err(e) = &result {
        warn!("Notification rejected: {}", e);
    }
    println!("{}", notification_reply(&result));
    Ok(())
}

/// Check the parameters of a return redirect without changing anything
pub async fn inspect_return(app: &App, pairs: &[String]) -> Result<()> {
    let params = params_from_pairs(pairs.iter().map(String::as_str)).map_err(anyhow::Error::msg)?;

    let summary = OrderPipeline::new(&app.ctx, &app.gateway)
        .inspect_return(&params)
        .await
        .context("Return parameters rejected")?;

    println!("✅ Payment confirmed");
    println!("   Order:   {}", summary.out_trade_no);
    if let Some(money) = &summary.money {
        println!("   Amount:  {} yuan", money);
    }
    println!("   Credits: {}", summary.credits);
    Ok(())
}

pub async fn fail(app: &App, out_trade_no: &str) -> Result<()> {
    OrderPipeline::new(&app.ctx, &app.gateway)
        .fail(out_trade_no)
        .await
        .with_context(|| format!("Failed to mark order {} as failed", out_trade_no))?;

    println!("✅ Order {} marked as failed", out_trade_no);
    Ok(())
}

pub async fn show(app: &App, out_trade_no: &str) -> Result<()> {
    let order = app
        .ctx
        .bounded("orders.get", app.ctx.orders().get_order(out_trade_no))
        .await
        .with_context(|| format!("Failed to load order {}", out_trade_no))?;

    match order {
        Some(order) => {
            println!("🧾 Order Details");
            print_order(&order);
        }
        None => bail!("Order not found: {}", out_trade_no),
    }
    Ok(())
}

/// Admin session opened with the configured password
struct AdminSession<'a> {
    console: AdminConsole<'a>,
    token: String,
}

impl<'a> AdminSession<'a> {
    async fn login(app: &'a App, sessions: &'a SessionStore) -> Result<Self> {
        let console = AdminConsole::new(&app.ctx, &app.gateway, sessions);
        let password = app.gateway.config().admin_password.clone().unwrap_or_default();
        let token = console.login(&password).await.context("Admin login failed")?;
        Ok(Self { console, token })
    }

    async fn logout(self) {
        self.console.logout(&self.token).await;
    }
}

pub async fn complete(app: &App, out_trade_no: &str) -> Result<()> {
    let sessions = SessionStore::default();
    let session = AdminSession::login(app, &sessions).await?;
    let result = session.console.complete(&session.token, out_trade_no).await;
    session.logout().await;

    let completion = result.with_context(|| format!("Failed to complete order {}", out_trade_no))?;
    print_completion(out_trade_no, &completion);
    Ok(())
}

pub async fn delete(app: &App, out_trade_no: &str) -> Result<()> {
    let sessions = SessionStore::default();
    let session = AdminSession::login(app, &sessions).await?;
    let result = session.console.delete_order(&session.token, out_trade_no).await;
    session.logout().await;

    result.with_context(|| format!("Failed to delete order {}", out_trade_no))?;
    println!("🗑️  Order {} deleted", out_trade_no);
    Ok(())
}

/// Listing options as entered on the command line
pub struct ListArgs {
    pub status: Option<String>,
    pub user: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: usize,
    pub page_size: usize,
}

impl ListArgs {
    fn into_query(self) -> Result<OrderQuery> {
        let status = match self.status.as_deref() {
            Some(s) => Some(OrderStatus::from_str(s).with_context(|| format!("Unknown order status: {}", s))?),
            None => None,
        };

        Ok(OrderQuery {
            filter: OrderFilter {
                status,
                identifier_contains: self.user.filter(|u| !u.trim().is_empty()),
                ..Default::default()
            },
            page: self.page,
            page_size: self.page_size,
        }
        .with_date_range(self.from, self.to))
    }
}

pub async fn list(app: &App, args: ListArgs) -> Result<()> {
    let query = args.into_query()?;
    let sessions = SessionStore::default();
    let session = AdminSession::login(app, &sessions).await?;
    let result = session.console.list_orders(&session.token, &query).await;
    session.logout().await;
    let page = result.context("Failed to list orders")?;

    if page.orders.is_empty() {
        println!("No orders found");
    } else {
        println!(
            "{:<22} {:<20} {:>10} {:>10} {:<10} {:<8} {:<19}",
            "Order", "User", "Yuan", "Credits", "Currency", "Status", "Created"
        );
        println!("{}", "-".repeat(105));
        for order in &page.orders {
            println!(
                "{:<22} {:<20} {:>10} {:>10} {:<10} {:<8} {:<19}",
                order.out_trade_no,
                order.identifier_key,
                order.amount(),
                order.credits,
                order.currency,
                order.status.as_str(),
                order.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    let pages = page.total.div_ceil(page.page_size).max(1);
    println!();
    println!("   Page {}/{} ({} orders)", page.page, pages, page.total);
    println!(
        "   Success: {}  Pending: {}  Failed: {}",
        page.stats.success_count, page.stats.pending_count, page.stats.failed_count
    );
    println!(
        "   Paid:    {} yuan  Credits: {}",
        rust_decimal::Decimal::new(page.stats.total_amount_minor, 2),
        page.stats.total_credits
    );
    Ok(())
}
