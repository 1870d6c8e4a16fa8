//! Credential presentation messages. Payloads travel as JSON strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MessageError;

/// Verifier's proof request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationRequest {
    pub request: String,
}

impl PresentationRequest {
    pub fn from_value(request: &Value) -> Result<Self, MessageError> {
        Ok(Self {
            request: serde_json::to_string(request)?,
        })
    }

    pub fn request_value(&self) -> Result<Value, MessageError> {
        Ok(serde_json::from_str(&self.request)?)
    }
}

/// Holder's presentation answering a proof request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPresentation {
    pub presentation: String,
}

impl CredentialPresentation {
    pub fn from_value(presentation: &Value) -> Result<Self, MessageError> {
        Ok(Self {
            presentation: serde_json::to_string(presentation)?,
        })
    }

    pub fn presentation_value(&self) -> Result<Value, MessageError> {
        Ok(serde_json::from_str(&self.presentation)?)
    }
}
