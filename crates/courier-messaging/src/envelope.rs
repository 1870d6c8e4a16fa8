//! Plaintext transport envelope.
//!
//! Messages travel unencrypted; the envelope only carries the keys a
//! packed message would expose so the receiver can find the connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MessageError;
use crate::outbound::ConnectionTarget;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportEnvelope {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipient_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_key: Option<String>,
    pub msg: Value,
}

/// The message and the keys recovered from an inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Unpacked {
    pub message: Value,
    pub sender_verkey: Option<String>,
    pub recipient_verkey: Option<String>,
}

impl TransportEnvelope {
    /// Wrap `message` for `target`. Without a target the message goes bare.
    pub fn pack(message: Value, target: Option<&ConnectionTarget>) -> Value {
        match target {
            Some(target) if !target.recipient_keys.is_empty() || target.sender_key.is_some() => {
                serde_json::json!({
                    "recipient_keys": target.recipient_keys,
                    "sender_key": target.sender_key,
                    "msg": message,
                })
            }
            _ => message,
        }
    }

    /// Split an inbound payload into message and keys. A payload that is
    /// itself a typed message passes through with no keys.
    pub fn unpack(raw: Value) -> Result<Unpacked, MessageError> {
        let is_envelope = raw.get("@type").is_none() && raw.get("msg").is_some_and(Value::is_object);
        if !is_envelope {
            return Ok(Unpacked {
                message: raw,
                sender_verkey: None,
                recipient_verkey: None,
            });
        }
        let envelope: Self = serde_json::from_value(raw)?;
        Ok(Unpacked {
            message: envelope.msg,
            sender_verkey: envelope.sender_key,
            recipient_verkey: envelope.recipient_keys.into_iter().next(),
        })
    }
}
