//! Admin console - sessions, order listing, manual completion
//!
//! Every console operation except `login` requires a live session token.
//! The console is disabled unless an admin password is configured.

use crate::error::{BusinessError, BusinessResult};
use crate::orders::{Completion, OrderPipeline};
use crate::services::{PaymentGateway, ServiceContext};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use monetary_core::{OrderFilter, OrderStats, PaymentOrder};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Session lifetime
pub const SESSION_TTL_HOURS: i64 = 24;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Admin sessions: token -> expiry.
///
/// Created at startup, entries expire by timestamp, `clear()` on shutdown.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::hours(SESSION_TTL_HOURS))
    }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn issue(&self, now: DateTime<Utc>) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.lock().await.insert(token.clone(), now + self.ttl);
        token
    }

    /// Expired entries are dropped on the way
    pub async fn validate(&self, token: &str, now: DateTime<Utc>) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(token) {
            Some(expiry) if now <= *expiry => true,
            Some(_) => {
                sessions.remove(token);
                false
            }
            None => false,
        }
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.lock().await.remove(token).is_some()
    }

    pub async fn clear(&self) {
        self.sessions.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Listing request: filter plus 1-based pagination
#[derive(Debug, Clone)]
pub struct OrderQuery {
    pub filter: OrderFilter,
    pub page: usize,
    pub page_size: usize,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            filter: OrderFilter::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl OrderQuery {
    /// Date range by calendar day (UTC). `to` covers the whole day.
    pub fn with_date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.filter.created_from = from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
        self.filter.created_to = to
            .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
            .map(|dt| dt.and_utc());
        self
    }
}

/// One page of orders; `total` and `stats` cover every matching order
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<PaymentOrder>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub stats: OrderStats,
}

/// Admin console
pub struct AdminConsole<'a> {
    ctx: &'a ServiceContext,
    gateway: &'a PaymentGateway,
    sessions: &'a SessionStore,
}

impl<'a> AdminConsole<'a> {
    pub fn new(ctx: &'a ServiceContext, gateway: &'a PaymentGateway, sessions: &'a SessionStore) -> Self {
        Self {
            ctx,
            gateway,
            sessions,
        }
    }

    async fn authorize(&self, token: &str) -> BusinessResult<()> {
        if !self.gateway.config().admin_enabled() {
            return Err(BusinessError::AdminDisabled);
        }
        if self.sessions.validate(token, Utc::now()).await {
            Ok(())
        } else {
            Err(BusinessError::Unauthorized)
        }
    }

    /// Exchange the admin password for a session token
    pub async fn login(&self, password: &str) -> BusinessResult<String> {
        let expected = match self.gateway.config().admin_password.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => return Err(BusinessError::AdminDisabled),
        };
        if password != expected {
            warn!("Admin login failed");
            return Err(BusinessError::Unauthorized);
        }

        info!("Admin login");
        Ok(self.sessions.issue(Utc::now()).await)
    }

    pub async fn logout(&self, token: &str) {
        self.sessions.revoke(token).await;
    }

    /// Filtered, paginated order listing, newest first
    pub async fn list_orders(&self, token: &str, query: &OrderQuery) -> BusinessResult<OrderPage> {
        self.authorize(token).await?;

        let mut filter = query.filter.clone();
        filter.limit = None;
        let orders = self
            .ctx
            .bounded("orders.list", self.ctx.orders().list_orders(&filter))
            .await?;

        let page = query.page.max(1);
        let page_size = query.page_size.max(1);
        let stats = OrderStats::from_orders(&orders);
        let total = orders.len();
        let orders = orders
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Ok(OrderPage {
            orders,
            total,
            page,
            page_size,
            stats,
        })
    }

    /// Manual completion, bypassing signature verification
    pub async fn complete(&self, token: &str, out_trade_no: &str) -> BusinessResult<Completion> {
        self.authorize(token).await?;
        if out_trade_no.trim().is_empty() {
            return Err(BusinessError::InvalidRequest("out_trade_no is required".to_string()));
        }

        info!("Admin completing order {}", out_trade_no);
        OrderPipeline::new(self.ctx, self.gateway).complete(out_trade_no).await
    }

    pub async fn delete_order(&self, token: &str, out_trade_no: &str) -> BusinessResult<()> {
        self.authorize(token).await?;

        let removed = self
            .ctx
            .bounded("orders.remove", self.ctx.orders().remove_order(out_trade_no))
            .await?;
        if !removed {
            return Err(BusinessError::OrderNotFound(out_trade_no.to_string()));
        }
        info!("Admin deleted order {}", out_trade_no);
        Ok(())
    }
}
