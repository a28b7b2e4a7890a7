use ppg_common::Protocol;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PanelClientError {
    #[error("Could not initialize panel client. {0}")]
    Initialization(String),
    #[error("Panel authentication failed. {0}")]
    Authentication(String),
    #[error("Panel rejected the request. {0}")]
    Validation(String),
    #[error("Transient panel error (status {status}). {message}")]
    Transient { status: u16, message: String },
    #[error("Network error talking to panel. {0}")]
    Network(String),
    #[error("Could not decode panel response. {0}")]
    Json(String),
    #[error("Panel call '{op}' failed after {attempts} attempts. {last_error}")]
    RetriesExhausted { op: String, attempts: u32, last_error: String },
    #[error("No adapter is registered for protocol '{0}'")]
    UnsupportedProtocol(Protocol),
    #[error("Could not render QR code. {0}")]
    QrError(String),
}

impl PanelClientError {
    /// Transient errors are worth retrying with backoff. Authentication and validation failures are not: the panel
    /// has seen the request and given a definitive answer.
    pub fn is_transient(&self) -> bool {
        matches!(self, PanelClientError::Transient { .. } | PanelClientError::Network(_))
    }
}
