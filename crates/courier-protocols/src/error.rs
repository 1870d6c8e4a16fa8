use courier_core::CoreError;
use courier_messaging::MessageError;

/// Protocol-level errors raised by managers, handlers and the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("connection protocol error: {0}")]
    ConnectionProtocol(String),

    #[error("exchange not found: {0}")]
    ExchangeNotFound(String),

    #[error("ambiguous exchange lookup: {0}")]
    ExchangeAmbiguous(String),

    #[error("no recipient registered for key {0}")]
    NoRecipient(String),

    #[error("could not prepare outbound message: {0}")]
    MessagePrepare(String),

    #[error("handler error: {0}")]
    Handler(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Message(#[from] MessageError),
}

impl ProtocolError {
    /// Whether the message that caused this error could not be decoded.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Message(e) if e.is_decode_error())
    }
}
