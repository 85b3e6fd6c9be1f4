//! Gateway configuration

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default mount point for notify/return callbacks
pub const DEFAULT_BASE_PATH: &str = "/recharge";

/// Merchant-side configuration for the epay gateway.
///
/// Keys are accepted either as full PEM or as the bare base64 body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway root, e.g. `https://pay.example.com/` (trailing slash expected)
    pub api_url: String,
    /// Merchant id assigned by the gateway
    pub pid: String,
    pub platform_public_key: String,
    pub merchant_private_key: String,
    /// Explicit callback URLs; empty means derive from `base_url`
    pub notify_url: String,
    pub return_url: String,
    /// Public URL of this service
    pub base_url: String,
    pub base_path: String,
    /// Rate used when an order has no product
    pub credits_per_yuan: Decimal,
    /// Admin console is disabled when unset
    pub admin_password: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            pid: String::new(),
            platform_public_key: String::new(),
            merchant_private_key: String::new(),
            notify_url: String::new(),
            return_url: String::new(),
            base_url: String::new(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            credits_per_yuan: Decimal::TEN,
            admin_password: None,
        }
    }
}

impl GatewayConfig {
    /// URL the gateway posts asynchronous notifications to
    pub fn notify_url(&self) -> String {
        if self.notify_url.is_empty() {
            format!("{}{}/notify", self.base_url, self.base_path)
        } else {
            self.notify_url.clone()
        }
    }

    /// URL the payer's browser is redirected to
    pub fn return_url(&self) -> String {
        if self.return_url.is_empty() {
            format!("{}{}/return", self.base_url, self.base_path)
        } else {
            self.return_url.clone()
        }
    }

    /// Endpoint the pay form submits to
    pub fn submit_url(&self) -> String {
        format!("{}api/pay/submit", self.api_url)
    }

    pub fn admin_enabled(&self) -> bool {
        self.admin_password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_urls_fall_back_to_base() {
        let config = GatewayConfig {
            base_url: "https://shop.example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(config.notify_url(), "https://shop.example.com/recharge/notify");
        assert_eq!(config.return_url(), "https://shop.example.com/recharge/return");

        let explicit = GatewayConfig {
            notify_url: "https://cb.example.com/n".to_string(),
            ..config
        };
        assert_eq!(explicit.notify_url(), "https://cb.example.com/n");
    }

    #[test]
    fn test_submit_url_and_admin_flag() {
        let mut config = GatewayConfig {
            api_url: "https://pay.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.submit_url(), "https://pay.example.com/api/pay/submit");
        assert!(!config.admin_enabled());

        config.admin_password = Some(String::new());
        assert!(!config.admin_enabled());
        config.admin_password = Some("hunter2".to_string());
        assert!(config.admin_enabled());
    }
}
