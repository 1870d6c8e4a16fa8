//! Credential issuance exchange.

use std::sync::Arc;

use serde_json::Value;

use courier_core::{
    tag_filter, CoreError, CredentialExchangeEvent, CredentialExchangeState, CredentialValues,
    Holder, InjectionContext, Initiator, Issuer, Ledger, Storage, TagFilter,
};
use courier_messaging::messages::{CredentialIssue, CredentialOffer, CredentialRequest};
use courier_messaging::AgentMessage;

use crate::error::ProtocolError;
use crate::events::{topics, EventHook};
use crate::locks::ExchangeLocks;
use crate::records::{CredentialExchangeRecord, RecordStore};

pub struct CredentialManager {
    storage: Arc<dyn Storage>,
    ledger: Option<Arc<dyn Ledger>>,
    issuer: Option<Arc<dyn Issuer>>,
    holder: Option<Arc<dyn Holder>>,
    events: Option<Arc<dyn EventHook>>,
    locks: Arc<ExchangeLocks>,
}

fn required<T: ?Sized>(capability: &Option<Arc<T>>, name: &str) -> Result<Arc<T>, ProtocolError> {
    capability
        .clone()
        .ok_or_else(|| CoreError::ResolutionError(format!("no {} configured", name)).into())
}

impl CredentialManager {
    pub fn new(context: &InjectionContext) -> Result<Self, ProtocolError> {
        Ok(Self {
            storage: context.inject::<dyn Storage>()?,
            ledger: context.inject_optional::<dyn Ledger>()?,
            issuer: context.inject_optional::<dyn Issuer>()?,
            holder: context.inject_optional::<dyn Holder>()?,
            events: context.inject_optional::<dyn EventHook>()?,
            locks: context
                .inject_optional::<ExchangeLocks>()?
                .unwrap_or_else(|| Arc::new(ExchangeLocks::new())),
        })
    }

    async fn save(&self, record: &CredentialExchangeRecord) -> Result<(), ProtocolError> {
        self.storage.save(record).await?;
        if let Some(events) = &self.events {
            events
                .emit(topics::CREDENTIALS, serde_json::to_value(record)?)
                .await;
        }
        Ok(())
    }

    async fn credential_definition(&self, id: &str) -> Result<Value, ProtocolError> {
        required(&self.ledger, "ledger")?
            .get_credential_definition(id)
            .await?
            .ok_or_else(|| CoreError::LedgerError(format!("unknown credential definition: {}", id)).into())
    }

    /// Offer a credential. `values`, when given, are kept so the request
    /// can be answered without further input.
    pub async fn create_offer(
        &self,
        connection_id: &str,
        credential_definition_id: &str,
        values: Option<CredentialValues>,
    ) -> Result<(CredentialExchangeRecord, AgentMessage), ProtocolError> {
        let offer = required(&self.issuer, "issuer")?
            .create_credential_offer(credential_definition_id)
            .await?;
        let message = AgentMessage::new(CredentialOffer {
            offer_json: offer.clone(),
        });

        let mut record = CredentialExchangeRecord::new(
            Initiator::Local,
            CredentialExchangeState::OfferSent,
            connection_id,
        );
        record.thread_id = Some(message.id().to_string());
        record.credential_definition_id = Some(credential_definition_id.to_string());
        record.schema_id = offer.get("schema_id").and_then(Value::as_str).map(str::to_string);
        record.credential_offer = Some(offer);
        record.credential_values = values;
        self.save(&record).await?;

        tracing::info!(
            credential_exchange_id = %record.credential_exchange_id,
            connection_id = %connection_id,
            credential_definition_id = %credential_definition_id,
            "credential offer created"
        );
        Ok((record, message))
    }

    pub async fn receive_offer(
        &self,
        offer: &CredentialOffer,
        thread_id: &str,
        connection_id: &str,
    ) -> Result<CredentialExchangeRecord, ProtocolError> {
        let mut record = CredentialExchangeRecord::new(
            Initiator::External,
            CredentialExchangeState::OfferReceived,
            connection_id,
        );
        record.thread_id = Some(thread_id.to_string());
        record.credential_definition_id = offer.credential_definition_id().map(str::to_string);
        record.schema_id = offer.schema_id().map(str::to_string);
        record.credential_offer = Some(offer.offer_json.clone());
        self.save(&record).await?;

        tracing::info!(
            credential_exchange_id = %record.credential_exchange_id,
            connection_id = %connection_id,
            "credential offer received"
        );
        Ok(record)
    }

    /// Answer the offer held by `record` with a credential request.
    pub async fn create_request(
        &self,
        record: &mut CredentialExchangeRecord,
        my_did: &str,
    ) -> Result<AgentMessage, ProtocolError> {
        let offer = record
            .credential_offer
            .clone()
            .ok_or_else(|| CoreError::MissingField("credential_offer".into()))?;
        let cred_def_id = record
            .credential_definition_id
            .clone()
            .ok_or_else(|| CoreError::MissingField("credential_definition_id".into()))?;
        let definition = self.credential_definition(&cred_def_id).await?;
        let (request, metadata) = required(&self.holder, "holder")?
            .create_credential_request(&offer, &definition, my_did)
            .await?;

        let mut next = record.clone();
        next.advance(CredentialExchangeEvent::SendRequest)?;
        next.credential_request = Some(request.clone());
        next.credential_request_metadata = Some(metadata);
        self.save(&next).await?;
        *record = next;

        let mut message = AgentMessage::new(CredentialRequest {
            offer_json: offer,
            credential_request_json: request,
        });
        if let Some(thread_id) = &record.thread_id {
            message = message.with_thread_id(thread_id);
        }
        tracing::info!(
            credential_exchange_id = %record.credential_exchange_id,
            "credential request created"
        );
        Ok(message)
    }

    pub async fn send_request(
        &self,
        credential_exchange_id: &str,
        my_did: &str,
    ) -> Result<(CredentialExchangeRecord, AgentMessage), ProtocolError> {
        let _guard = self.locks.lock(credential_exchange_id).await;
        let mut record: CredentialExchangeRecord =
            self.storage.retrieve(credential_exchange_id).await?;
        let message = self.create_request(&mut record, my_did).await?;
        Ok((record, message))
    }

    /// Match a request to the single offer it answers.
    pub async fn receive_request(
        &self,
        request: &CredentialRequest,
        connection_id: &str,
    ) -> Result<CredentialExchangeRecord, ProtocolError> {
        let cred_def_id = request
            .credential_definition_id()
            .ok_or_else(|| CoreError::MissingField("cred_def_id".into()))?;
        let filter = tag_filter([
            ("state", CredentialExchangeState::OfferSent.as_str()),
            ("credential_definition_id", cred_def_id),
            ("connection_id", connection_id),
        ]);
        let mut found: Vec<CredentialExchangeRecord> = self.storage.query(&filter).await?;
        let record = match found.len() {
            0 => {
                return Err(ProtocolError::ExchangeNotFound(format!(
                    "no offer for {} on connection {}",
                    cred_def_id, connection_id
                )))
            }
            1 => found.remove(0),
            n => {
                return Err(ProtocolError::ExchangeAmbiguous(format!(
                    "{} offers for {} on connection {}",
                    n, cred_def_id, connection_id
                )))
            }
        };

        let _guard = self.locks.lock(&record.credential_exchange_id).await;
        let mut record: CredentialExchangeRecord =
            self.storage.retrieve(&record.credential_exchange_id).await?;
        record.advance(CredentialExchangeEvent::ReceiveRequest)?;
        record.credential_request = Some(request.credential_request_json.clone());
        self.save(&record).await?;

        tracing::info!(
            credential_exchange_id = %record.credential_exchange_id,
            "credential request received"
        );
        Ok(record)
    }

    /// Issue the credential requested in `record`. Falls back to the values
    /// stored with the offer.
    pub async fn issue_credential(
        &self,
        record: &mut CredentialExchangeRecord,
        values: Option<&CredentialValues>,
    ) -> Result<AgentMessage, ProtocolError> {
        let values = values
            .or(record.credential_values.as_ref())
            .cloned()
            .ok_or_else(|| CoreError::MissingField("credential_values".into()))?;
        let schema_id = record
            .schema_id
            .clone()
            .ok_or_else(|| CoreError::MissingField("schema_id".into()))?;
        let offer = record
            .credential_offer
            .as_ref()
            .ok_or_else(|| CoreError::MissingField("credential_offer".into()))?;
        let request = record
            .credential_request
            .as_ref()
            .ok_or_else(|| CoreError::MissingField("credential_request".into()))?;

        let schema = required(&self.ledger, "ledger")?
            .get_schema(&schema_id)
            .await?
            .ok_or_else(|| CoreError::LedgerError(format!("unknown schema: {}", schema_id)))?;
        let (credential, revocation_registry_id) = required(&self.issuer, "issuer")?
            .create_credential(&schema, offer, request, &values)
            .await?;

        let mut next = record.clone();
        next.advance(CredentialExchangeEvent::Issue)?;
        next.credential_values = Some(values);
        next.credential = Some(credential.clone());
        self.save(&next).await?;
        *record = next;

        let mut message = AgentMessage::new(CredentialIssue {
            credential_json: credential,
            revocation_registry_id,
        });
        if let Some(thread_id) = &record.thread_id {
            message = message.with_thread_id(thread_id);
        }
        tracing::info!(
            credential_exchange_id = %record.credential_exchange_id,
            "credential issued"
        );
        Ok(message)
    }

    pub async fn issue(
        &self,
        credential_exchange_id: &str,
        values: Option<&CredentialValues>,
    ) -> Result<(CredentialExchangeRecord, AgentMessage), ProtocolError> {
        let _guard = self.locks.lock(credential_exchange_id).await;
        let mut record: CredentialExchangeRecord =
            self.storage.retrieve(credential_exchange_id).await?;
        let message = self.issue_credential(&mut record, values).await?;
        Ok((record, message))
    }

    /// Store an issued credential in the holder wallet. The exchange is
    /// found by thread id, else by the single pending request for the
    /// credential definition on the connection.
    pub async fn store_credential(
        &self,
        issue: &CredentialIssue,
        thread_id: Option<&str>,
        connection_id: &str,
    ) -> Result<CredentialExchangeRecord, ProtocolError> {
        let mut filter = tag_filter([
            ("state", CredentialExchangeState::RequestSent.as_str()),
            ("connection_id", connection_id),
        ]);
        match thread_id {
            Some(thread_id) => {
                filter.insert("thread_id".into(), thread_id.into());
            }
            None => {
                if let Some(id) = issue.credential_json.get("cred_def_id").and_then(Value::as_str) {
                    filter.insert("credential_definition_id".into(), id.into());
                }
            }
        }
        let found: Vec<CredentialExchangeRecord> = self.storage.query(&filter).await?;
        let record = match found.as_slice() {
            [record] => record.clone(),
            [] => {
                return Err(ProtocolError::ExchangeNotFound(format!(
                    "no pending credential request on connection {}",
                    connection_id
                )))
            }
            _ => {
                return Err(ProtocolError::ExchangeAmbiguous(format!(
                    "{} pending credential requests on connection {}",
                    found.len(),
                    connection_id
                )))
            }
        };

        let _guard = self.locks.lock(&record.credential_exchange_id).await;
        let mut record: CredentialExchangeRecord =
            self.storage.retrieve(&record.credential_exchange_id).await?;
        let metadata = record
            .credential_request_metadata
            .clone()
            .ok_or_else(|| CoreError::MissingField("credential_request_metadata".into()))?;
        let cred_def_id = record
            .credential_definition_id
            .clone()
            .ok_or_else(|| CoreError::MissingField("credential_definition_id".into()))?;
        let definition = self.credential_definition(&cred_def_id).await?;

        record.advance(CredentialExchangeEvent::ReceiveCredential)?;
        let credential_id = required(&self.holder, "holder")?
            .store_credential(&definition, &issue.credential_json, &metadata)
            .await?;
        record.advance(CredentialExchangeEvent::Store)?;
        record.credential = Some(issue.credential_json.clone());
        record.credential_id = Some(credential_id.clone());
        self.save(&record).await?;

        tracing::info!(
            credential_exchange_id = %record.credential_exchange_id,
            credential_id = %credential_id,
            "credential stored"
        );
        Ok(record)
    }

    /// Move an exchange to `error`.
    pub async fn mark_failed(
        &self,
        credential_exchange_id: &str,
        error_msg: &str,
    ) -> Result<CredentialExchangeRecord, ProtocolError> {
        let _guard = self.locks.lock(credential_exchange_id).await;
        let mut record: CredentialExchangeRecord =
            self.storage.retrieve(credential_exchange_id).await?;
        record.advance(CredentialExchangeEvent::Fail)?;
        record.error_msg = Some(error_msg.to_string());
        self.save(&record).await?;
        tracing::warn!(
            credential_exchange_id = %credential_exchange_id,
            error = %error_msg,
            "credential exchange failed"
        );
        Ok(record)
    }

    pub async fn get(&self, credential_exchange_id: &str) -> Result<CredentialExchangeRecord, ProtocolError> {
        self.storage.retrieve(credential_exchange_id).await
    }

    /// The exchange a thread belongs to.
    pub async fn find_by_thread(
        &self,
        thread_id: &str,
    ) -> Result<Option<CredentialExchangeRecord>, ProtocolError> {
        let found: Vec<CredentialExchangeRecord> = self
            .storage
            .query(&tag_filter([("thread_id", thread_id)]))
            .await?;
        Ok(found.into_iter().next())
    }

    pub async fn list(&self, filter: &TagFilter) -> Result<Vec<CredentialExchangeRecord>, ProtocolError> {
        let mut records: Vec<CredentialExchangeRecord> = self.storage.query(filter).await?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    pub async fn remove(&self, credential_exchange_id: &str) -> Result<(), ProtocolError> {
        let _guard = self.locks.lock(credential_exchange_id).await;
        let record: CredentialExchangeRecord = self.storage.retrieve(credential_exchange_id).await?;
        self.storage.remove(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::Wallet;
    use courier_wallet::{BasicHolder, BasicIssuer, BasicLedger, BasicStorage, BasicWallet};

    struct Parties {
        issuer: CredentialManager,
        holder: CredentialManager,
        cred_def_id: String,
    }

    async fn parties() -> Parties {
        let issuer_wallet = Arc::new(BasicWallet::new());
        issuer_wallet.create_public_did(None).await.unwrap();
        let ledger = Arc::new(BasicLedger::new(issuer_wallet.clone()));
        let schema_id = ledger
            .send_schema("degree", "1.0", &["name".into(), "score".into()])
            .await
            .unwrap();
        let cred_def_id = ledger
            .send_credential_definition(&schema_id, "default")
            .await
            .unwrap();

        let mut issuer_ctx = InjectionContext::default();
        issuer_ctx.bind_instance::<dyn Wallet>(issuer_wallet.clone());
        issuer_ctx.bind_instance::<dyn Storage>(Arc::new(BasicStorage::new()));
        issuer_ctx.bind_instance::<dyn Ledger>(ledger.clone());
        issuer_ctx.bind_instance::<dyn Issuer>(Arc::new(BasicIssuer::new(issuer_wallet, ledger.clone())));

        let mut holder_ctx = InjectionContext::default();
        holder_ctx.bind_instance::<dyn Storage>(Arc::new(BasicStorage::new()));
        holder_ctx.bind_instance::<dyn Ledger>(ledger);
        holder_ctx.bind_instance::<dyn Holder>(Arc::new(BasicHolder::new()));

        Parties {
            issuer: CredentialManager::new(&issuer_ctx).unwrap(),
            holder: CredentialManager::new(&holder_ctx).unwrap(),
            cred_def_id,
        }
    }

    fn values() -> CredentialValues {
        [("name", "Alice"), ("score", "93")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_full_issuance() {
        use courier_messaging::MessageBody as B;
        let p = parties().await;

        let (offered, offer_msg) = p
            .issuer
            .create_offer("conn-i", &p.cred_def_id, Some(values()))
            .await
            .unwrap();
        assert_eq!(offered.state, CredentialExchangeState::OfferSent);
        assert!(offered.schema_id.is_some());

        let B::CredentialOffer(offer) = offer_msg.body() else {
            panic!("expected an offer");
        };
        let received = p
            .holder
            .receive_offer(offer, offer_msg.thread_id(), "conn-h")
            .await
            .unwrap();
        let (requested, request_msg) = p
            .holder
            .send_request(&received.credential_exchange_id, "holderdid")
            .await
            .unwrap();
        assert_eq!(requested.state, CredentialExchangeState::RequestSent);
        assert_eq!(request_msg.explicit_thread_id(), Some(offer_msg.id()));

        let B::CredentialRequest(request) = request_msg.body() else {
            panic!("expected a request");
        };
        let on_issuer = p.issuer.receive_request(request, "conn-i").await.unwrap();
        assert_eq!(on_issuer.credential_exchange_id, offered.credential_exchange_id);

        let (issued, issue_msg) = p.issuer.issue(&on_issuer.credential_exchange_id, None).await.unwrap();
        assert_eq!(issued.state, CredentialExchangeState::Issued);

        let B::CredentialIssue(issue) = issue_msg.body() else {
            panic!("expected a credential");
        };
        let stored = p
            .holder
            .store_credential(issue, issue_msg.explicit_thread_id(), "conn-h")
            .await
            .unwrap();
        assert_eq!(stored.state, CredentialExchangeState::Stored);
        assert!(stored.credential_id.is_some());
    }

    #[tokio::test]
    async fn test_request_without_offer() {
        let p = parties().await;
        let request = CredentialRequest {
            offer_json: serde_json::json!({"cred_def_id": p.cred_def_id}),
            credential_request_json: serde_json::json!({}),
        };
        let err = p.issuer.receive_request(&request, "conn-i").await.unwrap_err();
        assert!(matches!(err, ProtocolError::ExchangeNotFound(_)));
    }

    #[tokio::test]
    async fn test_ambiguous_offers() {
        let p = parties().await;
        p.issuer.create_offer("conn-i", &p.cred_def_id, None).await.unwrap();
        p.issuer.create_offer("conn-i", &p.cred_def_id, None).await.unwrap();
        let request = CredentialRequest {
            offer_json: serde_json::json!({"cred_def_id": p.cred_def_id}),
            credential_request_json: serde_json::json!({}),
        };
        let err = p.issuer.receive_request(&request, "conn-i").await.unwrap_err();
        assert!(matches!(err, ProtocolError::ExchangeAmbiguous(_)));
    }

    #[tokio::test]
    async fn test_failed_step_leaves_record_unchanged() {
        let p = parties().await;
        let (offered, _) = p.issuer.create_offer("conn-i", &p.cred_def_id, None).await.unwrap();
        // Not in request_received and no values: issuing fails.
        assert!(p.issuer.issue(&offered.credential_exchange_id, None).await.is_err());
        let reloaded = p.issuer.get(&offered.credential_exchange_id).await.unwrap();
        assert_eq!(reloaded, offered);
    }

    #[tokio::test]
    async fn test_mark_failed() {
        let p = parties().await;
        let (offered, _) = p.issuer.create_offer("conn-i", &p.cred_def_id, None).await.unwrap();
        let failed = p
            .issuer
            .mark_failed(&offered.credential_exchange_id, "declined")
            .await
            .unwrap();
        assert_eq!(failed.state, CredentialExchangeState::Error);
        assert_eq!(failed.error_msg.as_deref(), Some("declined"));
        assert!(p
            .issuer
            .mark_failed(&offered.credential_exchange_id, "again")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_holder_without_issuer_cannot_offer() {
        let p = parties().await;
        let err = p.holder.create_offer("c", &p.cred_def_id, None).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Core(CoreError::ResolutionError(_))));
    }
}
