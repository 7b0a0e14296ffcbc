use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Printer transport error: {0}")]
    Transport(String),

    #[error("Relay channel error: {0}")]
    Channel(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

impl From<tokio_tungstenite::tungstenite::Error> for DaemonError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        DaemonError::Channel(e.to_string())
    }
}
