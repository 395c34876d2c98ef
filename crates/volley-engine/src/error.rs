use thiserror::Error;
use volley_core::VolleyError;

/// Failure of one gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The server refused the order as impossible (not enough units,
    /// protected target, and so on).
    #[error("infeasible: {0}")]
    Infeasible(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error(transparent)]
    Gate(#[from] GateError),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("cancelled while waiting for clearance")]
    Cancelled,

    #[error("sentinel: {0}")]
    Sentinel(#[from] VolleyError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] VolleyError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("invalid server endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
