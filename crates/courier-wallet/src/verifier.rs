use async_trait::async_trait;
use serde_json::{Map, Value};

use courier_core::{CoreError, Verifier};

use crate::credential::{encoded_value, predicate_holds, raw_value, signature_valid};
use crate::holder::predicate_parts;

/// Verifies presentations built by [`crate::BasicHolder`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicVerifier;

impl BasicVerifier {
    pub fn new() -> Self {
        Self
    }
}

fn object<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Map<String, Value>> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_object()
}

fn sub_proof_index(entry: &Value) -> Option<usize> {
    entry
        .get("sub_proof_index")
        .and_then(Value::as_u64)
        .map(|i| i as usize)
}

/// Whether `identifier` satisfies at least one restriction, if any are set.
fn restrictions_met(requested: &Value, identifier: &Value) -> bool {
    let Some(restrictions) = requested.get("restrictions").and_then(Value::as_array) else {
        return true;
    };
    if restrictions.is_empty() {
        return true;
    }
    restrictions.iter().any(|restriction| {
        restriction.as_object().is_some_and(|fields| {
            fields
                .iter()
                .all(|(key, expected)| identifier.get(key) == Some(expected))
        })
    })
}

#[async_trait]
impl Verifier for BasicVerifier {
    async fn verify_presentation(
        &self,
        presentation_request: &Value,
        presentation: &Value,
        schemas: &Value,
        credential_definitions: &Value,
    ) -> Result<bool, CoreError> {
        let identifiers = presentation
            .get("identifiers")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let proofs = presentation
            .get("proof")
            .and_then(|p| p.get("proofs"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if identifiers.len() != proofs.len() {
            tracing::debug!("presentation identifiers and proofs differ in length");
            return Ok(false);
        }

        let mut credentials = Vec::with_capacity(proofs.len());
        for (identifier, proof) in identifiers.iter().zip(&proofs) {
            let Some(credential) = proof.get("credential") else {
                return Ok(false);
            };
            let cred_def_id = identifier.get("cred_def_id").and_then(Value::as_str).unwrap_or_default();
            let schema_id = identifier.get("schema_id").and_then(Value::as_str).unwrap_or_default();
            if credential.get("cred_def_id").and_then(Value::as_str) != Some(cred_def_id)
                || credential.get("schema_id").and_then(Value::as_str) != Some(schema_id)
            {
                tracing::debug!(cred_def_id = %cred_def_id, "credential does not match its identifier");
                return Ok(false);
            }
            if schemas.get(schema_id).is_none() {
                return Err(CoreError::VerifierError(format!("schema {} not supplied", schema_id)));
            }
            let Some(definition) = credential_definitions.get(cred_def_id) else {
                return Err(CoreError::VerifierError(format!(
                    "credential definition {} not supplied",
                    cred_def_id
                )));
            };
            if !signature_valid(credential, definition) {
                tracing::debug!(cred_def_id = %cred_def_id, "credential signature invalid");
                return Ok(false);
            }
            credentials.push(credential);
        }

        let empty = Map::new();
        let revealed = object(presentation, &["requested_proof", "revealed_attrs"]).unwrap_or(&empty);
        let unrevealed = object(presentation, &["requested_proof", "unrevealed_attrs"]).unwrap_or(&empty);
        let self_attested =
            object(presentation, &["requested_proof", "self_attested_attrs"]).unwrap_or(&empty);
        let proven_predicates = object(presentation, &["requested_proof", "predicates"]).unwrap_or(&empty);

        for (referent, requested) in object(presentation_request, &["requested_attributes"]).unwrap_or(&empty) {
            if self_attested.contains_key(referent) {
                continue;
            }
            let Some(name) = requested.get("name").and_then(Value::as_str) else {
                return Ok(false);
            };
            let entry = match (revealed.get(referent), unrevealed.get(referent)) {
                (Some(entry), _) => entry,
                (None, Some(entry)) => entry,
                (None, None) => {
                    tracing::debug!(referent = %referent, "requested attribute not proven");
                    return Ok(false);
                }
            };
            let Some(index) = sub_proof_index(entry).filter(|i| *i < credentials.len()) else {
                return Ok(false);
            };
            if !restrictions_met(requested, &identifiers[index]) {
                return Ok(false);
            }
            if revealed.contains_key(referent) {
                let claimed = entry.get("raw").and_then(Value::as_str);
                if claimed.is_none() || claimed != raw_value(credentials[index], name) {
                    tracing::debug!(referent = %referent, "revealed value does not match credential");
                    return Ok(false);
                }
            } else if raw_value(credentials[index], name).is_none() {
                return Ok(false);
            }
        }

        for (referent, requested) in object(presentation_request, &["requested_predicates"]).unwrap_or(&empty) {
            let Some((name, p_type, p_value)) = predicate_parts(requested) else {
                return Ok(false);
            };
            let Some(index) = proven_predicates
                .get(referent)
                .and_then(sub_proof_index)
                .filter(|i| *i < credentials.len())
            else {
                return Ok(false);
            };
            if !restrictions_met(requested, &identifiers[index]) {
                return Ok(false);
            }
            let Some(encoded) = encoded_value(credentials[index], name) else {
                return Ok(false);
            };
            if !predicate_holds(encoded, p_type, p_value).unwrap_or(false) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BasicHolder, BasicIssuer, BasicLedger, BasicWallet};
    use courier_core::{CredentialValues, Holder, Issuer, Ledger, Wallet};
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        ledger: Arc<BasicLedger>,
        issuer: BasicIssuer,
        holder: BasicHolder,
        schema_id: String,
        cred_def_id: String,
        credential_id: String,
    }

    async fn issued_credential() -> Fixture {
        let wallet = Arc::new(BasicWallet::new());
        wallet.create_public_did(None).await.unwrap();
        let ledger = Arc::new(BasicLedger::new(wallet.clone()));
        let schema_id = ledger
            .send_schema("id", "1.0", &["name".into(), "age".into()])
            .await
            .unwrap();
        let cred_def_id = ledger
            .send_credential_definition(&schema_id, "default")
            .await
            .unwrap();
        let issuer = BasicIssuer::new(wallet.clone(), ledger.clone());
        let holder = BasicHolder::new();

        let offer = issuer.create_credential_offer(&cred_def_id).await.unwrap();
        let definition = ledger.get_credential_definition(&cred_def_id).await.unwrap().unwrap();
        let (request, metadata) = holder
            .create_credential_request(&offer, &definition, "holderdid")
            .await
            .unwrap();
        let schema = ledger.get_schema(&schema_id).await.unwrap().unwrap();
        let values: CredentialValues = [("name", "Alice"), ("age", "30")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let (credential, rev_reg) = issuer
            .create_credential(&schema, &offer, &request, &values)
            .await
            .unwrap();
        assert!(rev_reg.is_none());
        let credential_id = holder
            .store_credential(&definition, &credential, &metadata)
            .await
            .unwrap();
        Fixture {
            ledger,
            issuer,
            holder,
            schema_id,
            cred_def_id,
            credential_id,
        }
    }

    async fn ledger_maps(f: &Fixture) -> (Value, Value) {
        let schema = f.ledger.get_schema(&f.schema_id).await.unwrap().unwrap();
        let definition = f
            .ledger
            .get_credential_definition(&f.cred_def_id)
            .await
            .unwrap()
            .unwrap();
        (
            json!({ f.schema_id.clone(): schema }),
            json!({ f.cred_def_id.clone(): definition }),
        )
    }

    fn proof_request(cred_def_id: &str, min_age: i64) -> Value {
        json!({
            "name": "proof",
            "version": "1.0",
            "nonce": "1234",
            "requested_attributes": {
                "attr1": {"name": "name", "restrictions": [{"cred_def_id": cred_def_id}]}
            },
            "requested_predicates": {
                "pred1": {"name": "age", "p_type": ">=", "p_value": min_age}
            }
        })
    }

    fn choices(credential_id: &str) -> Value {
        json!({
            "self_attested_attributes": {},
            "requested_attributes": {"attr1": {"cred_id": credential_id, "revealed": true}},
            "requested_predicates": {"pred1": {"cred_id": credential_id}}
        })
    }

    #[tokio::test]
    async fn test_issue_store_present_verify() {
        let f = issued_credential().await;
        let info = f.holder.get_credential(&f.credential_id).await.unwrap();
        assert_eq!(info["attrs"]["name"], "Alice");
        assert_eq!(info["cred_def_id"], f.cred_def_id.as_str());

        let (schemas, defs) = ledger_maps(&f).await;
        let request = proof_request(&f.cred_def_id, 18);
        let presentation = f
            .holder
            .create_presentation(&request, &choices(&f.credential_id), &schemas, &defs)
            .await
            .unwrap();
        assert_eq!(
            presentation["requested_proof"]["revealed_attrs"]["attr1"]["raw"],
            "Alice"
        );
        assert_eq!(presentation["identifiers"].as_array().unwrap().len(), 1);

        let verifier = BasicVerifier::new();
        assert!(verifier
            .verify_presentation(&request, &presentation, &schemas, &defs)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_tampered_presentation_fails() {
        let f = issued_credential().await;
        let (schemas, defs) = ledger_maps(&f).await;
        let request = proof_request(&f.cred_def_id, 18);
        let mut presentation = f
            .holder
            .create_presentation(&request, &choices(&f.credential_id), &schemas, &defs)
            .await
            .unwrap();

        let verifier = BasicVerifier::new();
        let mut wrong_raw = presentation.clone();
        wrong_raw["requested_proof"]["revealed_attrs"]["attr1"]["raw"] = json!("Mallory");
        assert!(!verifier
            .verify_presentation(&request, &wrong_raw, &schemas, &defs)
            .await
            .unwrap());

        presentation["proof"]["proofs"][0]["credential"]["values"]["name"]["raw"] = json!("Mallory");
        presentation["requested_proof"]["revealed_attrs"]["attr1"]["raw"] = json!("Mallory");
        assert!(!verifier
            .verify_presentation(&request, &presentation, &schemas, &defs)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unsatisfied_predicate() {
        let f = issued_credential().await;
        let (schemas, defs) = ledger_maps(&f).await;
        let request = proof_request(&f.cred_def_id, 40);
        let err = f
            .holder
            .create_presentation(&request, &choices(&f.credential_id), &schemas, &defs)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::HolderError(_)));
    }

    #[tokio::test]
    async fn test_restriction_mismatch() {
        let f = issued_credential().await;
        let (schemas, defs) = ledger_maps(&f).await;
        let request = proof_request(&f.cred_def_id, 18);
        let presentation = f
            .holder
            .create_presentation(&request, &choices(&f.credential_id), &schemas, &defs)
            .await
            .unwrap();
        let stricter = proof_request("other-cred-def", 18);
        assert!(!BasicVerifier::new()
            .verify_presentation(&stricter, &presentation, &schemas, &defs)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_credential_request_checks_definition() {
        let f = issued_credential().await;
        let offer = f.issuer.create_credential_offer(&f.cred_def_id).await.unwrap();
        let err = f
            .holder
            .create_credential_request(&offer, &json!({"id": "other"}), "did")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::HolderError(_)));
    }

    #[tokio::test]
    async fn test_issue_missing_value() {
        let f = issued_credential().await;
        let offer = f.issuer.create_credential_offer(&f.cred_def_id).await.unwrap();
        let definition = f
            .ledger
            .get_credential_definition(&f.cred_def_id)
            .await
            .unwrap()
            .unwrap();
        let (request, _) = f
            .holder
            .create_credential_request(&offer, &definition, "did")
            .await
            .unwrap();
        let schema = f.ledger.get_schema(&f.schema_id).await.unwrap().unwrap();
        let values: CredentialValues = [("name".to_string(), "Bob".to_string())].into();
        assert!(matches!(
            f.issuer.create_credential(&schema, &offer, &request, &values).await,
            Err(CoreError::IssuerError(_))
        ));
    }

    #[tokio::test]
    async fn test_store_rejects_forged_credential() {
        let f = issued_credential().await;
        let definition = f
            .ledger
            .get_credential_definition(&f.cred_def_id)
            .await
            .unwrap()
            .unwrap();
        let forged = json!({
            "cred_def_id": f.cred_def_id,
            "values": {},
            "signature": "AAAA"
        });
        assert!(f
            .holder
            .store_credential(&definition, &forged, &json!({}))
            .await
            .is_err());
        f.holder.delete_credential(&f.credential_id).await.unwrap();
        assert!(f.holder.get_credentials().await.unwrap().is_empty());
        assert!(f.holder.get_credential(&f.credential_id).await.unwrap_err().is_not_found());
    }
}
