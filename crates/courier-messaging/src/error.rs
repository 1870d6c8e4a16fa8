use courier_core::CoreError;
use courier_crypto::CryptoError;

/// Message decoding, validation and signing errors.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("message has no @type")]
    MissingType,

    #[error("unrecognized message type: {0}")]
    UnrecognizedMessageType(String),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("invalid message JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid invitation: {0}")]
    InvalidInvitation(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl MessageError {
    /// Whether the error came from decoding an inbound payload.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::MissingType
                | Self::UnrecognizedMessageType(_)
                | Self::Malformed(_)
                | Self::Json(_)
                | Self::InvalidInvitation(_)
        )
    }
}
