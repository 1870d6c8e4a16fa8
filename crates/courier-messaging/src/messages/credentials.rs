//! Credential issuance messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Issuer's offer of a credential under one credential definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialOffer {
    pub offer_json: Value,
}

impl CredentialOffer {
    pub fn credential_definition_id(&self) -> Option<&str> {
        self.offer_json.get("cred_def_id").and_then(Value::as_str)
    }

    pub fn schema_id(&self) -> Option<&str> {
        self.offer_json.get("schema_id").and_then(Value::as_str)
    }
}

/// Holder's request for the offered credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRequest {
    pub offer_json: Value,
    pub credential_request_json: Value,
}

impl CredentialRequest {
    pub fn credential_definition_id(&self) -> Option<&str> {
        self.offer_json.get("cred_def_id").and_then(Value::as_str)
    }
}

/// The issued credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialIssue {
    pub credential_json: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_registry_id: Option<String>,
}
