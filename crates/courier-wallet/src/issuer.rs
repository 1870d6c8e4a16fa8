use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use courier_core::{CoreError, CredentialValues, Issuer, Ledger, Wallet};
use courier_crypto::b64url_encode;

use crate::credential::{definition_verkey, signing_payload, SIGNATURE_FIELD};
use crate::encoding::encode_attribute;

/// Issues credentials signed with the credential definition's wallet key.
pub struct BasicIssuer {
    wallet: Arc<dyn Wallet>,
    ledger: Arc<dyn Ledger>,
}

impl BasicIssuer {
    pub fn new(wallet: Arc<dyn Wallet>, ledger: Arc<dyn Ledger>) -> Self {
        Self { wallet, ledger }
    }

    async fn credential_definition(&self, credential_definition_id: &str) -> Result<Value, CoreError> {
        self.ledger
            .get_credential_definition(credential_definition_id)
            .await?
            .ok_or_else(|| {
                CoreError::IssuerError(format!(
                    "unknown credential definition: {}",
                    credential_definition_id
                ))
            })
    }
}

fn str_field<'a>(value: &'a Value, field: &str, what: &str) -> Result<&'a str, CoreError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::IssuerError(format!("{} has no {}", what, field)))
}

#[async_trait]
impl Issuer for BasicIssuer {
    async fn create_credential_offer(&self, credential_definition_id: &str) -> Result<Value, CoreError> {
        let definition = self.credential_definition(credential_definition_id).await?;
        let schema_id = str_field(&definition, "schemaId", "credential definition")?;
        Ok(json!({
            "schema_id": schema_id,
            "cred_def_id": credential_definition_id,
            "nonce": rand::random::<u64>().to_string(),
        }))
    }

    async fn create_credential(
        &self,
        schema: &Value,
        credential_offer: &Value,
        credential_request: &Value,
        values: &CredentialValues,
    ) -> Result<(Value, Option<String>), CoreError> {
        let cred_def_id = str_field(credential_offer, "cred_def_id", "offer")?;
        if str_field(credential_request, "cred_def_id", "request")? != cred_def_id {
            return Err(CoreError::IssuerError(
                "request does not match the offered credential definition".into(),
            ));
        }
        if str_field(credential_request, "nonce", "request")?
            != str_field(credential_offer, "nonce", "offer")?
        {
            return Err(CoreError::IssuerError("request nonce does not match the offer".into()));
        }

        let attr_names = schema
            .get("attrNames")
            .and_then(Value::as_array)
            .ok_or_else(|| CoreError::IssuerError("schema has no attrNames".into()))?;
        let mut encoded_values = Map::new();
        for name in attr_names.iter().filter_map(Value::as_str) {
            let raw = values
                .get(name)
                .ok_or_else(|| CoreError::IssuerError(format!("missing value for attribute {}", name)))?;
            encoded_values.insert(
                name.to_string(),
                json!({"raw": raw, "encoded": encode_attribute(raw)}),
            );
        }

        let definition = self.credential_definition(cred_def_id).await?;
        let verkey = definition_verkey(&definition)
            .ok_or_else(|| CoreError::IssuerError("credential definition has no verkey".into()))?;

        let mut credential = json!({
            "schema_id": str_field(credential_offer, "schema_id", "offer")?,
            "cred_def_id": cred_def_id,
            "prover_did": str_field(credential_request, "prover_did", "request")?,
            "values": encoded_values,
        });
        let signature = self
            .wallet
            .sign_message(&signing_payload(&credential)?, verkey)
            .await?;
        if let Value::Object(map) = &mut credential {
            map.insert(SIGNATURE_FIELD.into(), Value::String(b64url_encode(&signature)));
        }
        tracing::info!(cred_def_id = %cred_def_id, "credential issued");
        Ok((credential, None))
    }
}
