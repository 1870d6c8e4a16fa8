use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Map, Value};

use courier_core::{CoreError, Holder};
use courier_crypto::{b64url_encode, hash};

use crate::credential::{encoded_value, predicate_holds, raw_value, signature_valid};

/// Holds issued credentials in memory.
#[derive(Default)]
pub struct BasicHolder {
    credentials: DashMap<String, Value>,
}

impl BasicHolder {
    pub fn new() -> Self {
        Self::default()
    }

    fn stored(&self, credential_id: &str) -> Result<Value, CoreError> {
        self.credentials
            .get(credential_id)
            .map(|c| c.value().clone())
            .ok_or_else(|| CoreError::WalletNotFound(format!("credential {}", credential_id)))
    }
}

/// The summary view of a stored credential.
fn credential_info(credential_id: &str, credential: &Value) -> Value {
    let attrs: Map<String, Value> = credential
        .get("values")
        .and_then(Value::as_object)
        .map(|values| {
            values
                .iter()
                .filter_map(|(name, v)| v.get("raw").map(|raw| (name.clone(), raw.clone())))
                .collect()
        })
        .unwrap_or_default();
    json!({
        "referent": credential_id,
        "attrs": attrs,
        "schema_id": credential.get("schema_id").cloned().unwrap_or(Value::Null),
        "cred_def_id": credential.get("cred_def_id").cloned().unwrap_or(Value::Null),
        "rev_reg_id": Value::Null,
        "cred_rev_id": Value::Null,
    })
}

fn holder_err(msg: impl Into<String>) -> CoreError {
    CoreError::HolderError(msg.into())
}

fn entries(value: &Value, field: &str) -> Map<String, Value> {
    value
        .get(field)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl Holder for BasicHolder {
    async fn create_credential_request(
        &self,
        credential_offer: &Value,
        credential_definition: &Value,
        did: &str,
    ) -> Result<(Value, Value), CoreError> {
        let cred_def_id = credential_offer
            .get("cred_def_id")
            .and_then(Value::as_str)
            .ok_or_else(|| holder_err("offer has no cred_def_id"))?;
        if credential_definition.get("id").and_then(Value::as_str) != Some(cred_def_id) {
            return Err(holder_err("credential definition does not match the offer"));
        }
        let nonce = credential_offer
            .get("nonce")
            .and_then(Value::as_str)
            .ok_or_else(|| holder_err("offer has no nonce"))?;
        let blinded = hash(format!("{}|{}", did, nonce).as_bytes());
        let request = json!({
            "prover_did": did,
            "cred_def_id": cred_def_id,
            "nonce": nonce,
            "blinded_ms": b64url_encode(&blinded),
        });
        let metadata = json!({
            "prover_did": did,
            "cred_def_id": cred_def_id,
            "nonce": nonce,
        });
        Ok((request, metadata))
    }

    async fn store_credential(
        &self,
        credential_definition: &Value,
        credential: &Value,
        credential_request_metadata: &Value,
    ) -> Result<String, CoreError> {
        if !signature_valid(credential, credential_definition) {
            return Err(holder_err("credential signature is invalid"));
        }
        if credential.get("cred_def_id") != credential_definition.get("id") {
            return Err(holder_err("credential was not issued under this definition"));
        }
        if let Some(expected) = credential_request_metadata.get("prover_did") {
            if credential.get("prover_did") != Some(expected) {
                return Err(holder_err("credential was issued to a different DID"));
            }
        }
        let credential_id = uuid::Uuid::now_v7().to_string();
        self.credentials
            .insert(credential_id.clone(), credential.clone());
        tracing::debug!(credential_id = %credential_id, "credential stored");
        Ok(credential_id)
    }

    async fn get_credential(&self, credential_id: &str) -> Result<Value, CoreError> {
        let credential = self.stored(credential_id)?;
        Ok(credential_info(credential_id, &credential))
    }

    async fn get_credentials(&self) -> Result<Vec<Value>, CoreError> {
        Ok(self
            .credentials
            .iter()
            .map(|c| credential_info(c.key(), c.value()))
            .collect())
    }

    async fn delete_credential(&self, credential_id: &str) -> Result<(), CoreError> {
        self.credentials
            .remove(credential_id)
            .map(|_| ())
            .ok_or_else(|| CoreError::WalletNotFound(format!("credential {}", credential_id)))
    }

    async fn create_presentation(
        &self,
        presentation_request: &Value,
        requested_credentials: &Value,
        schemas: &Value,
        credential_definitions: &Value,
    ) -> Result<Value, CoreError> {
        let request_attrs = entries(presentation_request, "requested_attributes");
        let request_predicates = entries(presentation_request, "requested_predicates");

        let mut proofs: Vec<Value> = Vec::new();
        let mut identifiers: Vec<Value> = Vec::new();
        let mut index_of: HashMap<String, usize> = HashMap::new();

        let mut sub_proof = |credential_id: &str| -> Result<(usize, Value), CoreError> {
            let credential = self.stored(credential_id)?;
            if let Some(index) = index_of.get(credential_id) {
                return Ok((*index, credential));
            }
            let schema_id = credential.get("schema_id").and_then(Value::as_str).unwrap_or_default();
            let cred_def_id = credential.get("cred_def_id").and_then(Value::as_str).unwrap_or_default();
            if schemas.get(schema_id).is_none() {
                return Err(holder_err(format!("schema {} not supplied", schema_id)));
            }
            if credential_definitions.get(cred_def_id).is_none() {
                return Err(holder_err(format!("credential definition {} not supplied", cred_def_id)));
            }
            let index = proofs.len();
            identifiers.push(json!({
                "schema_id": schema_id,
                "cred_def_id": cred_def_id,
                "rev_reg_id": Value::Null,
                "timestamp": Value::Null,
            }));
            proofs.push(json!({"credential": credential.clone()}));
            index_of.insert(credential_id.to_string(), index);
            Ok((index, credential))
        };

        let mut revealed_attrs = Map::new();
        let mut unrevealed_attrs = Map::new();
        for (referent, choice) in entries(requested_credentials, "requested_attributes") {
            let credential_id = choice
                .get("cred_id")
                .and_then(Value::as_str)
                .ok_or_else(|| holder_err(format!("no cred_id for attribute {}", referent)))?;
            let name = request_attrs
                .get(&referent)
                .and_then(|a| a.get("name"))
                .and_then(Value::as_str)
                .ok_or_else(|| holder_err(format!("attribute {} was not requested", referent)))?;
            let (index, credential) = sub_proof(credential_id)?;
            let raw = raw_value(&credential, name)
                .ok_or_else(|| holder_err(format!("credential has no attribute {}", name)))?;
            let revealed = choice.get("revealed").and_then(Value::as_bool).unwrap_or(true);
            if revealed {
                revealed_attrs.insert(
                    referent,
                    json!({
                        "sub_proof_index": index,
                        "raw": raw,
                        "encoded": encoded_value(&credential, name),
                    }),
                );
            } else {
                unrevealed_attrs.insert(referent, json!({"sub_proof_index": index}));
            }
        }

        let mut predicates = Map::new();
        for (referent, choice) in entries(requested_credentials, "requested_predicates") {
            let credential_id = choice
                .get("cred_id")
                .and_then(Value::as_str)
                .ok_or_else(|| holder_err(format!("no cred_id for predicate {}", referent)))?;
            let predicate = request_predicates
                .get(&referent)
                .ok_or_else(|| holder_err(format!("predicate {} was not requested", referent)))?;
            let (name, p_type, p_value) = predicate_parts(predicate)
                .ok_or_else(|| holder_err(format!("malformed predicate {}", referent)))?;
            let (index, credential) = sub_proof(credential_id)?;
            let encoded = encoded_value(&credential, name)
                .ok_or_else(|| holder_err(format!("credential has no attribute {}", name)))?;
            if !predicate_holds(encoded, p_type, p_value)? {
                return Err(holder_err(format!("predicate {} is not satisfied", referent)));
            }
            predicates.insert(referent, json!({"sub_proof_index": index}));
        }

        Ok(json!({
            "proof": {"proofs": proofs},
            "requested_proof": {
                "revealed_attrs": revealed_attrs,
                "unrevealed_attrs": unrevealed_attrs,
                "self_attested_attrs": entries(requested_credentials, "self_attested_attributes"),
                "predicates": predicates,
            },
            "identifiers": identifiers,
        }))
    }
}

/// `(name, p_type, p_value)` of a requested predicate. `p_value` may be a
/// number or a numeric string.
pub(crate) fn predicate_parts(predicate: &Value) -> Option<(&str, &str, i64)> {
    let name = predicate.get("name")?.as_str()?;
    let p_type = predicate.get("p_type")?.as_str()?;
    let p_value = match predicate.get("p_value")? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    Some((name, p_type, p_value))
}
