/// Errors raised by transport setup and delivery.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport setup failed: {0}")]
    TransportSetup(String),

    #[error("transport registration failed: {0}")]
    TransportRegistration(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("inbound message rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Delivery(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::Delivery(e.to_string())
    }
}
