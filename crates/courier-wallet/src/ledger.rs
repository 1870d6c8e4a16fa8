use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};

use courier_core::{CoreError, Ledger, Wallet};

#[derive(Debug, Clone)]
struct Nym {
    verkey: String,
    endpoint: Option<String>,
}

/// Ledger kept in process memory.
///
/// Schemas and credential definitions are published under the wallet's
/// public DID. Each credential definition gets its own signing key in the
/// wallet; its verkey is the definition's public value.
pub struct BasicLedger {
    wallet: Arc<dyn Wallet>,
    schemas: DashMap<String, Value>,
    credential_definitions: DashMap<String, Value>,
    nyms: DashMap<String, Nym>,
    seq_no: AtomicU64,
}

impl BasicLedger {
    pub fn new(wallet: Arc<dyn Wallet>) -> Self {
        Self {
            wallet,
            schemas: DashMap::new(),
            credential_definitions: DashMap::new(),
            nyms: DashMap::new(),
            seq_no: AtomicU64::new(1),
        }
    }

    /// Register a DID with its verkey and optional endpoint.
    pub fn register_nym(&self, did: &str, verkey: &str, endpoint: Option<&str>) {
        self.nyms.insert(
            did.to_string(),
            Nym {
                verkey: verkey.to_string(),
                endpoint: endpoint.map(str::to_string),
            },
        );
        tracing::debug!(did = %did, "nym registered");
    }

    pub fn schema_ids(&self) -> Vec<String> {
        self.schemas.iter().map(|s| s.key().clone()).collect()
    }

    pub fn credential_definition_ids(&self) -> Vec<String> {
        self.credential_definitions
            .iter()
            .map(|c| c.key().clone())
            .collect()
    }

    async fn submitter_did(&self) -> Result<String, CoreError> {
        self.wallet
            .get_public_did()
            .await?
            .map(|info| info.did)
            .ok_or_else(|| CoreError::LedgerError("no public DID to submit with".into()))
    }

    fn next_seq_no(&self) -> u64 {
        self.seq_no.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl Ledger for BasicLedger {
    async fn send_schema(
        &self,
        name: &str,
        version: &str,
        attribute_names: &[String],
    ) -> Result<String, CoreError> {
        if attribute_names.is_empty() {
            return Err(CoreError::LedgerError("schema needs at least one attribute".into()));
        }
        let did = self.submitter_did().await?;
        let schema_id = format!("{}:2:{}:{}", did, name, version);
        if self.schemas.contains_key(&schema_id) {
            return Err(CoreError::LedgerError(format!("schema already published: {}", schema_id)));
        }
        let schema = json!({
            "ver": "1.0",
            "id": schema_id,
            "name": name,
            "version": version,
            "attrNames": attribute_names,
            "seqNo": self.next_seq_no(),
        });
        self.schemas.insert(schema_id.clone(), schema);
        tracing::info!(schema_id = %schema_id, "schema published");
        Ok(schema_id)
    }

    async fn get_schema(&self, schema_id: &str) -> Result<Option<Value>, CoreError> {
        Ok(self.schemas.get(schema_id).map(|s| s.value().clone()))
    }

    async fn send_credential_definition(&self, schema_id: &str, tag: &str) -> Result<String, CoreError> {
        let seq_no = self
            .schemas
            .get(schema_id)
            .and_then(|s| s.get("seqNo").and_then(Value::as_u64))
            .ok_or_else(|| CoreError::LedgerError(format!("unknown schema: {}", schema_id)))?;
        let did = self.submitter_did().await?;
        let credential_definition_id = format!("{}:3:CL:{}:{}", did, seq_no, tag);
        if self.credential_definitions.contains_key(&credential_definition_id) {
            return Ok(credential_definition_id);
        }
        let key = self
            .wallet
            .create_signing_key(None, Some(json!({"cred_def_id": credential_definition_id})))
            .await?;
        let definition = json!({
            "ver": "1.0",
            "id": credential_definition_id,
            "schemaId": schema_id,
            "type": "CL",
            "tag": tag,
            "value": {"verkey": key.verkey},
        });
        self.credential_definitions
            .insert(credential_definition_id.clone(), definition);
        tracing::info!(
            credential_definition_id = %credential_definition_id,
            schema_id = %schema_id,
            "credential definition published"
        );
        Ok(credential_definition_id)
    }

    async fn get_credential_definition(
        &self,
        credential_definition_id: &str,
    ) -> Result<Option<Value>, CoreError> {
        Ok(self
            .credential_definitions
            .get(credential_definition_id)
            .map(|c| c.value().clone()))
    }

    async fn get_key_for_did(&self, did: &str) -> Result<Option<String>, CoreError> {
        Ok(self.nyms.get(did).map(|n| n.verkey.clone()))
    }

    async fn get_endpoint_for_did(&self, did: &str) -> Result<Option<String>, CoreError> {
        Ok(self.nyms.get(did).and_then(|n| n.endpoint.clone()))
    }
}
