use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreError;

/// Public ledger holding schemas, credential definitions and DID endpoints.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Publish a schema and return its id.
    async fn send_schema(
        &self,
        name: &str,
        version: &str,
        attribute_names: &[String],
    ) -> Result<String, CoreError>;

    async fn get_schema(&self, schema_id: &str) -> Result<Option<Value>, CoreError>;

    /// Publish a credential definition for a schema and return its id.
    async fn send_credential_definition(&self, schema_id: &str, tag: &str) -> Result<String, CoreError>;

    async fn get_credential_definition(
        &self,
        credential_definition_id: &str,
    ) -> Result<Option<Value>, CoreError>;

    async fn get_key_for_did(&self, did: &str) -> Result<Option<String>, CoreError>;

    async fn get_endpoint_for_did(&self, did: &str) -> Result<Option<String>, CoreError>;
}
