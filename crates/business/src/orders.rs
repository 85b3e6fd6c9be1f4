//! Order reconciliation pipeline
//!
//! Creates payment orders and turns verified gateway notifications (or a
//! manual admin completion) into exactly one ledger credit. The persisted
//! order status is the idempotency guard: `pending -> success` and the
//! credit commit in one store transaction.

use crate::error::{BusinessError, BusinessResult};
use crate::identity::IdentityResolver;
use crate::ledger::LedgerService;
use crate::services::{PaymentGateway, ServiceContext};
use chrono::{DateTime, Utc};
use monetary_core::{
    credits_for, parse_money, to_minor_units, OrderFilter, OrderStatus, PaymentOrder, SettleOutcome,
    DEFAULT_CURRENCY,
};
use monetary_epay::{build_pay_form, Notification, Params, PayForm, PayRequest, REPLY_FAIL, REPLY_SUCCESS};
use monetary_persistence::PersistenceError;
use rand::Rng;
use tracing::{info, warn};

/// Default pay type when the request leaves it out
pub const DEFAULT_PAY_TYPE: &str = "alipay";

/// Default item name shown by the gateway
pub const DEFAULT_ORDER_NAME: &str = "Credits recharge";

/// Orders returned by `query_user`
pub const QUERY_ORDER_LIMIT: usize = 10;

const ORDER_ID_ATTEMPTS: usize = 3;

/// Order creation request
#[derive(Debug, Clone, Default)]
pub struct CreateOrder {
    pub user_id: String,
    /// Amount in yuan as entered, e.g. "5" or "10.50"
    pub money: String,
    pub pay_type: Option<String>,
    pub product_id: Option<i64>,
    pub name: Option<String>,
}

/// A persisted pending order and the form that pays it
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: PaymentOrder,
    pub form: PayForm,
}

/// Result of a completion attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// This call moved the order to success and credited the ledger
    Settled {
        credits: i64,
        currency: String,
        balance: i64,
    },
    /// The order was already successful; nothing changed
    AlreadySettled,
}

/// What the return page shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnSummary {
    pub out_trade_no: String,
    pub money: Option<String>,
    /// Credits of the stored order, 0 when unknown
    pub credits: i64,
}

/// Balance and recent orders of one identifier
#[derive(Debug, Clone)]
pub struct UserSummary {
    pub user_id: String,
    pub balance: i64,
    pub orders: Vec<PaymentOrder>,
}

/// `NL` + epoch millis + 3 random digits
pub fn generate_out_trade_no(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..1000);
    format!("NL{}{:03}", now.timestamp_millis(), suffix)
}

/// Body to answer a gateway notification with
pub fn notification_reply<T>(result: &BusinessResult<T>) -> &'static str {
    if result.is_ok() {
        REPLY_SUCCESS
    } else {
        REPLY_FAIL
    }
}

/// Order pipeline
pub struct OrderPipeline<'a> {
    ctx: &'a ServiceContext,
    gateway: &'a PaymentGateway,
}

impl<'a> OrderPipeline<'a> {
    pub fn new(ctx: &'a ServiceContext, gateway: &'a PaymentGateway) -> Self {
        Self { ctx, gateway }
    }

    async fn load(&self, out_trade_no: &str) -> BusinessResult<PaymentOrder> {
        self.ctx
            .bounded("orders.get", self.ctx.orders().get_order(out_trade_no))
            .await?
            .ok_or_else(|| BusinessError::OrderNotFound(out_trade_no.to_string()))
    }

    /// Create a pending order and its signed pay form.
    pub async fn create_order(&self, request: &CreateOrder) -> BusinessResult<CreatedOrder> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(BusinessError::InvalidRequest("user id is required".to_string()));
        }

        let amount = parse_money(&request.money)?;
        let amount_minor = to_minor_units(amount)?;

        let mut rate = self.gateway.config().credits_per_yuan;
        let mut currency = DEFAULT_CURRENCY.to_string();
        let mut product_id = None;

        if let Some(id) = request.product_id {
            let product = self
                .ctx
                .bounded("products.get", self.ctx.products().get_product(id))
                .await?;
            // Unknown or disabled products fall back to the default rate
            if let Some(product) = product.filter(|p| p.enabled) {
                product.check_amount(amount_minor)?;
                rate = product.credits_per_yuan;
                currency = product.currency;
                product_id = Some(product.id);
            }
        }

        let platform = self.ctx.config().default_platform.as_str();
        let account_id = IdentityResolver::new(self.ctx)
            .resolve_or_provision(user_id, platform)
            .await?;
        let credits = credits_for(amount, rate)?;
        let pay_type = request
            .pay_type
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PAY_TYPE.to_string());
        let name = request
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ORDER_NAME.to_string());

        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = Utc::now();
            let out_trade_no = generate_out_trade_no(now);

            // Sign before persisting so a key problem leaves no orphan order
            let form = build_pay_form(
                self.gateway.config(),
                self.gateway.codec(),
                &PayRequest {
                    pay_type: pay_type.clone(),
                    out_trade_no: out_trade_no.clone(),
                    name: name.clone(),
                    money: request.money.trim().to_string(),
                },
                now,
            )?;

            let order = PaymentOrder {
                out_trade_no,
                identifier_key: user_id.to_string(),
                account_id: Some(account_id),
                product_id,
                currency: currency.clone(),
                amount_minor,
                credits,
                pay_type: pay_type.clone(),
                status: OrderStatus::Pending,
                created_at: now,
                updated_at: now,
            };

            let created = self
                .ctx
                .bounded("orders.create", self.ctx.orders().create_order(&order))
                .await;
            match created {
                Ok(()) => {
                    info!(
                        "Created order {} for {}: {} yuan = {} {}",
                        order.out_trade_no,
                        order.identifier_key,
                        order.amount(),
                        order.credits,
                        order.currency
                    );
                    return Ok(CreatedOrder { order, form });
                }
                Err(BusinessError::Persistence(PersistenceError::AlreadyExists { .. }))
                    if attempt < ORDER_ID_ATTEMPTS =>
                {
                    continue
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Move a pending order to success and credit its stored amount.
    ///
    /// A second completion of a successful order is a no-op; completing a
    /// failed order is `OrderAlreadyTerminal`.
    pub async fn complete(&self, out_trade_no: &str) -> BusinessResult<Completion> {
        let order = self.load(out_trade_no).await?;
        if !order.status.can_transition_to(OrderStatus::Success) {
            return match order.status {
                OrderStatus::Success => Ok(Completion::AlreadySettled),
                status => Err(BusinessError::OrderAlreadyTerminal {
                    out_trade_no: out_trade_no.to_string(),
                    status,
                }),
            };
        }

        let target = LedgerService::new(self.ctx)
            .identifier_target(&order.identifier_key, order.account_id)
            .await?;
        let outcome = self
            .ctx
            .bounded(
                "orders.settle",
                self.ctx.orders().settle(out_trade_no, &target, Utc::now()),
            )
            .await?;

        match outcome {
            SettleOutcome::Settled { balance } => {
                info!(
                    "Order {} settled: {} yuan = {} {} credited to {}",
                    out_trade_no,
                    order.amount(),
                    order.credits,
                    order.currency,
                    order.identifier_key
                );
                Ok(Completion::Settled {
                    credits: order.credits,
                    currency: order.currency,
                    balance,
                })
            }
            // Lost a race against another completion
            SettleOutcome::NotPending(OrderStatus::Success) => Ok(Completion::AlreadySettled),
            SettleOutcome::NotPending(status) => Err(BusinessError::OrderAlreadyTerminal {
                out_trade_no: out_trade_no.to_string(),
                status,
            }),
            SettleOutcome::Missing => Err(BusinessError::OrderNotFound(out_trade_no.to_string())),
        }
    }

    /// Mark a pending order as failed. Failing a failed order is a no-op.
    pub async fn fail(&self, out_trade_no: &str) -> BusinessResult<()> {
        let order = self.load(out_trade_no).await?;
        if !order.status.can_transition_to(OrderStatus::Failed) {
            return match order.status {
                OrderStatus::Failed => Ok(()),
                status => Err(BusinessError::OrderAlreadyTerminal {
                    out_trade_no: out_trade_no.to_string(),
                    status,
                }),
            };
        }

        let moved = self
            .ctx
            .bounded(
                "orders.transition",
                self.ctx
                    .orders()
                    .transition(out_trade_no, OrderStatus::Pending, OrderStatus::Failed, Utc::now()),
            )
            .await?;
        if moved {
            info!("Order {} marked failed", out_trade_no);
            return Ok(());
        }

        let current = self.load(out_trade_no).await?;
        match current.status {
            OrderStatus::Failed => Ok(()),
            status => Err(BusinessError::OrderAlreadyTerminal {
                out_trade_no: out_trade_no.to_string(),
                status,
            }),
        }
    }

    /// Verify the notification fields and require the success sentinel
    fn check_notification<'p>(&self, params: &'p Params) -> BusinessResult<Notification<'p>> {
        if !self.gateway.codec().verify(params) {
            warn!("Rejected notification: signature verification failed");
            return Err(BusinessError::SignatureInvalid);
        }

        let notification = Notification::new(params);
        if !notification.is_trade_success() {
            let status = notification.trade_status().unwrap_or_default().to_string();
            warn!("Rejected notification: trade_status {:?}", status);
            return Err(BusinessError::TradeNotSuccessful(status));
        }
        Ok(notification)
    }

    /// Asynchronous gateway notification.
    ///
    /// Rejected notifications have no side effects. Answer the gateway
    /// with `notification_reply(&result)`.
    pub async fn handle_notification(&self, params: &Params) -> BusinessResult<Completion> {
        let notification = self.check_notification(params)?;
        let out_trade_no = notification
            .out_trade_no()
            .ok_or_else(|| BusinessError::InvalidRequest("out_trade_no is required".to_string()))?;

        info!("Verified notification for order {}", out_trade_no);
        self.complete(out_trade_no).await
    }

    /// Synchronous return page check. Never mutates.
    pub async fn inspect_return(&self, params: &Params) -> BusinessResult<ReturnSummary> {
        let notification = self.check_notification(params)?;
        let out_trade_no = notification
            .out_trade_no()
            .ok_or_else(|| BusinessError::InvalidRequest("out_trade_no is required".to_string()))?;

        let order = self
            .ctx
            .bounded("orders.get", self.ctx.orders().get_order(out_trade_no))
            .await?;

        Ok(ReturnSummary {
            out_trade_no: out_trade_no.to_string(),
            money: notification.money().map(str::to_string),
            credits: order.map(|o| o.credits).unwrap_or(0),
        })
    }

    /// Recent orders and default-currency balance of an identifier
    pub async fn query_user(&self, user_id: &str) -> BusinessResult<UserSummary> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(BusinessError::InvalidRequest("user id is required".to_string()));
        }

        let orders = self
            .ctx
            .bounded(
                "orders.list",
                self.ctx
                    .orders()
                    .list_orders(&OrderFilter::for_identifier(user_id, QUERY_ORDER_LIMIT)),
            )
            .await?;
        let balance = LedgerService::new(self.ctx)
            .balance_by_identifier(user_id, DEFAULT_CURRENCY)
            .await?;

        Ok(UserSummary {
            user_id: user_id.to_string(),
            balance,
            orders,
        })
    }
}
