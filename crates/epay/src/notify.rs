//! Inbound notification fields

use crate::sign::Params;

/// Exact `trade_status` value the gateway sends for a paid order
pub const TRADE_SUCCESS: &str = "TRADE_SUCCESS";

/// Reply body the gateway expects after a notification
pub const REPLY_SUCCESS: &str = "success";
pub const REPLY_FAIL: &str = "fail";

/// Borrowed view over notification/return parameters.
#[derive(Debug, Clone, Copy)]
pub struct Notification<'a> {
    params: &'a Params,
}

impl<'a> Notification<'a> {
    pub fn new(params: &'a Params) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &'a Params {
        self.params
    }

    pub fn out_trade_no(&self) -> Option<&'a str> {
        self.params
            .get("out_trade_no")
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn trade_status(&self) -> Option<&'a str> {
        self.params.get("trade_status").map(String::as_str)
    }

    pub fn money(&self) -> Option<&'a str> {
        self.params.get("money").map(String::as_str)
    }

    /// Case-sensitive comparison with `TRADE_SUCCESS`
    pub fn is_trade_success(&self) -> bool {
        self.trade_status() == Some(TRADE_SUCCESS)
    }
}

/// Parse `key=value` pairs as given on a command line
pub fn params_from_pairs<I, S>(pairs: I) -> Result<Params, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|pair| {
            let pair = pair.as_ref();
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| format!("expected key=value, got {:?}", pair))
        })
        .collect()
}
