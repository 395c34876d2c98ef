use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolleyError {
    #[error("not initialized: run 'volley init'")]
    NotInitialized,

    #[error("schedule input not found: {0}")]
    InputNotFound(String),

    #[error("invalid schedule input: {0}")]
    InvalidInput(String),

    #[error("invalid payload for '{id}': at least one unit must have a quantity above zero")]
    EmptyPayload { id: String },

    #[error("snapshot write failed: {0}")]
    Persistence(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VolleyError>;
