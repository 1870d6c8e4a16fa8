//! Credential issuance, holding and verification capabilities.
//!
//! Offers, requests, credentials and presentations are opaque JSON to the
//! protocol layer; only the implementations interpret them.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::CoreError;

/// Raw attribute values keyed by attribute name.
pub type CredentialValues = BTreeMap<String, String>;

#[async_trait]
pub trait Issuer: Send + Sync {
    async fn create_credential_offer(&self, credential_definition_id: &str) -> Result<Value, CoreError>;

    /// Issue a credential. Returns the credential and an optional
    /// revocation registry id.
    async fn create_credential(
        &self,
        schema: &Value,
        credential_offer: &Value,
        credential_request: &Value,
        values: &CredentialValues,
    ) -> Result<(Value, Option<String>), CoreError>;
}

#[async_trait]
pub trait Holder: Send + Sync {
    /// Build a credential request. Returns the request and the metadata
    /// needed later to store the issued credential.
    async fn create_credential_request(
        &self,
        credential_offer: &Value,
        credential_definition: &Value,
        did: &str,
    ) -> Result<(Value, Value), CoreError>;

    /// Store an issued credential and return its wallet id.
    async fn store_credential(
        &self,
        credential_definition: &Value,
        credential: &Value,
        credential_request_metadata: &Value,
    ) -> Result<String, CoreError>;

    async fn get_credential(&self, credential_id: &str) -> Result<Value, CoreError>;

    async fn get_credentials(&self) -> Result<Vec<Value>, CoreError>;

    async fn delete_credential(&self, credential_id: &str) -> Result<(), CoreError>;

    async fn create_presentation(
        &self,
        presentation_request: &Value,
        requested_credentials: &Value,
        schemas: &Value,
        credential_definitions: &Value,
    ) -> Result<Value, CoreError>;
}

#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify_presentation(
        &self,
        presentation_request: &Value,
        presentation: &Value,
        schemas: &Value,
        credential_definitions: &Value,
    ) -> Result<bool, CoreError>;
}
