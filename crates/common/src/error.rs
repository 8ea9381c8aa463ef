use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A strategy or risk record was built with parameters that can never work.
    #[error("Invalid parameter '{parameter}': {reason}")]
    Construction {
        parameter: &'static str,
        reason: String,
    },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn construction(parameter: &'static str, reason: impl Into<String>) -> Self {
        Error::Construction {
            parameter,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
