use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid size value: {0}")]
    InvalidSizeFormat(String),

    #[error("Invalid unit: {0}")]
    UnknownUnit(String),

    #[error("Could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error sending data: {0}")]
    SendFailure(#[source] std::io::Error),

    #[error("Error sending data to client: {0}")]
    AckSendFailure(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stream task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, Error>;
