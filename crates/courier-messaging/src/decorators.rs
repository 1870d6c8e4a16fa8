//! Message decorators: `~thread`, `~timing` and field signatures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use courier_core::Wallet;
use courier_crypto::{b64url_decode, b64url_encode};

use crate::error::MessageError;
use crate::message_types::SIGNATURE_ED25519_SHA512_SINGLE;

/// Links a message to the interaction it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadDecorator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pthid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_order: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_orders: Option<BTreeMap<String, u64>>,
}

impl ThreadDecorator {
    pub fn with_thid(thid: impl Into<String>) -> Self {
        Self {
            thid: Some(thid.into()),
            ..Default::default()
        }
    }
}

/// Timing hints attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingDecorator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_milli: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_until_time: Option<DateTime<Utc>>,
}

/// A field value signed by a known verkey.
///
/// The signed data is an 8-byte big-endian timestamp followed by the JSON
/// serialization of the value; both signature and data travel base64url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDecorator {
    #[serde(rename = "@type")]
    pub signature_type: String,
    pub signature: String,
    pub sig_data: String,
    pub signer: String,
}

impl SignatureDecorator {
    /// Sign `value` with the wallet key behind `signer`.
    pub async fn create(
        value: &Value,
        signer: &str,
        wallet: &dyn Wallet,
        timestamp: Option<u64>,
    ) -> Result<Self, MessageError> {
        let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp().max(0) as u64);
        let mut sig_data = timestamp.to_be_bytes().to_vec();
        sig_data.extend_from_slice(&serde_json::to_vec(value)?);
        let signature = wallet.sign_message(&sig_data, signer).await?;
        Ok(Self {
            signature_type: SIGNATURE_ED25519_SHA512_SINGLE.to_string(),
            signature: b64url_encode(&signature),
            sig_data: b64url_encode(&sig_data),
            signer: signer.to_string(),
        })
    }

    /// Decode the signed value and its timestamp.
    pub fn decode(&self) -> Result<(Value, u64), MessageError> {
        let data = b64url_decode(&self.sig_data)?;
        if data.len() < 8 {
            return Err(MessageError::Signature("signature data too short".into()));
        }
        let (ts, json) = data.split_at(8);
        let mut ts_bytes = [0u8; 8];
        ts_bytes.copy_from_slice(ts);
        let value = serde_json::from_slice(json)?;
        Ok((value, u64::from_be_bytes(ts_bytes)))
    }

    /// Check the signature against the signer's verkey.
    pub async fn verify(&self, wallet: &dyn Wallet) -> Result<bool, MessageError> {
        if self.signature_type != SIGNATURE_ED25519_SHA512_SINGLE {
            return Ok(false);
        }
        let data = b64url_decode(&self.sig_data)?;
        let signature = b64url_decode(&self.signature)?;
        Ok(wallet.verify_message(&data, &signature, &self.signer).await?)
    }
}
