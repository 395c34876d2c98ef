//! Network side of one action: prepare the order, then submit it.

mod extract;
mod http;

pub use extract::{PageExtractor, RegexExtractor};
pub use http::HttpGateway;

use crate::error::GatewayError;
use futures::future::BoxFuture;
use std::time::Duration;
use volley_core::types::{ActionKind, ActionRequest};

/// A confirmed order, ready to be fired with a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedAction {
    pub request_id: String,
    pub origin: String,
    pub kind: ActionKind,
    /// Form fields of the confirmation step, in page order.
    pub form: Vec<(String, String)>,
    /// Travel time the server quoted for this exact order.
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub request_id: String,
    pub message: Option<String>,
}

/// Every call goes through pacing and the challenge check; a challenged call
/// is re-issued once the gate opens, so callers only ever see the final
/// answer.
pub trait ActionGateway: Send + Sync {
    fn prepare<'a>(
        &'a self,
        request: &'a ActionRequest,
    ) -> BoxFuture<'a, Result<PreparedAction, GatewayError>>;

    fn submit<'a>(&'a self, prepared: &'a PreparedAction) -> BoxFuture<'a, Result<Ack, GatewayError>>;
}

/// Insert or overwrite `key` keeping its original position.
pub(crate) fn set_field(form: &mut Vec<(String, String)>, key: &str, value: impl Into<String>) {
    let value = value.into();
    match form.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value,
        None => form.push((key.to_string(), value)),
    }
}

pub(crate) fn has_field(form: &[(String, String)], key: &str) -> bool {
    form.iter().any(|(k, _)| k == key)
}
