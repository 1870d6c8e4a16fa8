use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport metadata for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelivery {
    pub in_time: DateTime<Utc>,
    /// Scheme of the transport the payload arrived on (`http`, `ws`, `invitation`).
    pub transport_type: String,
    pub sender_verkey: Option<String>,
    pub recipient_verkey: Option<String>,
    pub recipient_did: Option<String>,
    pub recipient_did_public: bool,
    /// Set when the transport can carry replies back over the same socket.
    pub socket_id: Option<String>,
}

impl MessageDelivery {
    pub fn new(transport_type: impl Into<String>) -> Self {
        Self {
            in_time: Utc::now(),
            transport_type: transport_type.into(),
            sender_verkey: None,
            recipient_verkey: None,
            recipient_did: None,
            recipient_did_public: false,
            socket_id: None,
        }
    }

    pub fn with_sender(mut self, verkey: impl Into<String>) -> Self {
        self.sender_verkey = Some(verkey.into());
        self
    }

    pub fn with_recipient(mut self, verkey: impl Into<String>) -> Self {
        self.recipient_verkey = Some(verkey.into());
        self
    }
}
