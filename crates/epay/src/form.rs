//! Outbound pay form
//!
//! The gateway expects a browser POST to `{api_url}api/pay/submit`. We
//! render a self-submitting HTML form carrying the signed parameters.

use crate::config::GatewayConfig;
use crate::error::EpayResult;
use crate::sign::{Params, SignatureCodec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields order in the rendered form
const FIELD_ORDER: [&str; 10] = [
    "pid",
    "type",
    "out_trade_no",
    "name",
    "money",
    "notify_url",
    "return_url",
    "timestamp",
    "sign",
    "sign_type",
];

/// What the merchant asks the gateway to collect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayRequest {
    pub pay_type: String,
    pub out_trade_no: String,
    /// Item name shown by the gateway
    pub name: String,
    /// Amount in yuan, passed through verbatim
    pub money: String,
}

/// Signed form ready to hand to the payer's browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayForm {
    pub action: String,
    pub fields: Vec<(String, String)>,
}

impl PayForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Auto-submitting HTML page
    pub fn to_html(&self) -> String {
        let mut html = String::from(
            r#"<!DOCTYPE html><html><head><meta charset="utf-8"><title>Redirecting...</title></head><body>"#,
        );
        html.push_str(&format!(
            r#"<form id="dopay" action="{}" method="post">"#,
            escape_html(&self.action)
        ));
        for (name, value) in &self.fields {
            html.push_str(&format!(
                r#"<input type="hidden" name="{}" value="{}"/>"#,
                name,
                escape_html(value)
            ));
        }
        html.push_str(r#"<input type="submit" value="Continue to payment"></form>"#);
        html.push_str(r#"<script>document.getElementById("dopay").submit();</script></body></html>"#);
        html
    }
}

/// Escape `&`, `<`, `>` and `"` for attribute values
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Build and sign the form parameters at `now`.
pub fn build_pay_form(
    config: &GatewayConfig,
    codec: &SignatureCodec,
    request: &PayRequest,
    now: DateTime<Utc>,
) -> EpayResult<PayForm> {
    let mut params = Params::new();
    params.insert("pid".to_string(), config.pid.clone());
    params.insert("type".to_string(), request.pay_type.clone());
    params.insert("out_trade_no".to_string(), request.out_trade_no.clone());
    params.insert("name".to_string(), request.name.clone());
    params.insert("money".to_string(), request.money.clone());
    params.insert("notify_url".to_string(), config.notify_url());
    params.insert("return_url".to_string(), config.return_url());
    params.insert("timestamp".to_string(), now.timestamp().to_string());

    let signature = codec.sign(&params)?;
    params.insert("sign".to_string(), signature);
    params.insert("sign_type".to_string(), "RSA".to_string());

    let fields = FIELD_ORDER
        .iter()
        .filter_map(|k| params.remove(*k).map(|v| (k.to_string(), v)))
        .collect();

    Ok(PayForm {
        action: config.submit_url(),
        fields,
    })
}
