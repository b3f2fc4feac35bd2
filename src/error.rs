use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum GatewayError {
    #[error("Missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("Connection to coordinator failed: {0}")]
    ConnectionFailed(String),

    #[error("Handshake with coordinator timed out after {0} ms")]
    HandshakeTimeout(u64),

    #[error("Giving up on coordinator after {attempts} failed attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Not connected to coordinator")]
    NotConnected,

    #[error("Outbound queue full, dropping {0}")]
    QueueFull(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Sensor read failed: {0}")]
    SensorRead(String),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl GatewayError {
    /// True for failures that the retry policy is expected to absorb.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::ConnectionFailed(_)
                | GatewayError::HandshakeTimeout(_)
                | GatewayError::Protocol(_)
                | GatewayError::WebSocket(_)
                | GatewayError::IoError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
