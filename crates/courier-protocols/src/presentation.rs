//! Proof request and presentation exchange.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use courier_core::{
    tag_filter, CoreError, Holder, InjectionContext, Initiator, Ledger, PresentationExchangeEvent,
    PresentationExchangeState, Storage, TagFilter, Verifier,
};
use courier_messaging::messages::{CredentialPresentation, PresentationRequest};
use courier_messaging::AgentMessage;

use crate::error::ProtocolError;
use crate::events::{topics, EventHook};
use crate::locks::ExchangeLocks;
use crate::records::{PresentationExchangeRecord, RecordStore};

pub struct PresentationManager {
    storage: Arc<dyn Storage>,
    ledger: Option<Arc<dyn Ledger>>,
    holder: Option<Arc<dyn Holder>>,
    verifier: Option<Arc<dyn Verifier>>,
    events: Option<Arc<dyn EventHook>>,
    locks: Arc<ExchangeLocks>,
}

fn required<T: ?Sized>(capability: &Option<Arc<T>>, name: &str) -> Result<Arc<T>, ProtocolError> {
    capability
        .clone()
        .ok_or_else(|| CoreError::ResolutionError(format!("no {} configured", name)).into())
}

/// Key every entry by a fresh UUID referent.
fn with_referents(entries: Vec<Value>) -> Map<String, Value> {
    entries
        .into_iter()
        .map(|entry| (uuid::Uuid::now_v7().to_string(), entry))
        .collect()
}

impl PresentationManager {
    pub fn new(context: &InjectionContext) -> Result<Self, ProtocolError> {
        Ok(Self {
            storage: context.inject::<dyn Storage>()?,
            ledger: context.inject_optional::<dyn Ledger>()?,
            holder: context.inject_optional::<dyn Holder>()?,
            verifier: context.inject_optional::<dyn Verifier>()?,
            events: context.inject_optional::<dyn EventHook>()?,
            locks: context
                .inject_optional::<ExchangeLocks>()?
                .unwrap_or_else(|| Arc::new(ExchangeLocks::new())),
        })
    }

    async fn save(&self, record: &PresentationExchangeRecord) -> Result<(), ProtocolError> {
        self.storage.save(record).await?;
        if let Some(events) = &self.events {
            events
                .emit(topics::PRESENTATIONS, serde_json::to_value(record)?)
                .await;
        }
        Ok(())
    }

    /// Schemas and credential definitions referenced by `ids`, keyed by id.
    async fn ledger_maps(
        &self,
        ids: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(Value, Value), ProtocolError> {
        let ledger = required(&self.ledger, "ledger")?;
        let mut schemas = Map::new();
        let mut definitions = Map::new();
        let ids: BTreeSet<(String, String)> = ids.into_iter().collect();
        for (schema_id, cred_def_id) in ids {
            if !schemas.contains_key(&schema_id) {
                let schema = ledger
                    .get_schema(&schema_id)
                    .await?
                    .ok_or_else(|| CoreError::LedgerError(format!("unknown schema: {}", schema_id)))?;
                schemas.insert(schema_id, schema);
            }
            if !definitions.contains_key(&cred_def_id) {
                let definition = ledger.get_credential_definition(&cred_def_id).await?.ok_or_else(|| {
                    CoreError::LedgerError(format!("unknown credential definition: {}", cred_def_id))
                })?;
                definitions.insert(cred_def_id, definition);
            }
        }
        Ok((Value::Object(schemas), Value::Object(definitions)))
    }

    /// Build a proof request with a fresh numeric nonce.
    pub async fn create_request(
        &self,
        name: &str,
        version: &str,
        requested_attributes: Vec<Value>,
        requested_predicates: Vec<Value>,
        connection_id: &str,
    ) -> Result<(PresentationExchangeRecord, AgentMessage), ProtocolError> {
        let request = json!({
            "name": name,
            "version": version,
            "nonce": rand::random::<u128>().to_string(),
            "requested_attributes": with_referents(requested_attributes),
            "requested_predicates": with_referents(requested_predicates),
        });
        let message = AgentMessage::new(PresentationRequest::from_value(&request)?);

        let mut record = PresentationExchangeRecord::new(
            Initiator::Local,
            PresentationExchangeState::RequestSent,
            connection_id,
            request,
        );
        record.thread_id = Some(message.id().to_string());
        self.save(&record).await?;

        tracing::info!(
            presentation_exchange_id = %record.presentation_exchange_id,
            connection_id = %connection_id,
            "presentation request created"
        );
        Ok((record, message))
    }

    pub async fn receive_request(
        &self,
        request: &PresentationRequest,
        thread_id: &str,
        connection_id: &str,
    ) -> Result<PresentationExchangeRecord, ProtocolError> {
        let mut record = PresentationExchangeRecord::new(
            Initiator::External,
            PresentationExchangeState::RequestReceived,
            connection_id,
            request.request_value()?,
        );
        record.thread_id = Some(thread_id.to_string());
        self.save(&record).await?;

        tracing::info!(
            presentation_exchange_id = %record.presentation_exchange_id,
            connection_id = %connection_id,
            "presentation request received"
        );
        Ok(record)
    }

    /// Answer the request in `record` from the credentials chosen in
    /// `requested_credentials`.
    pub async fn create_presentation(
        &self,
        record: &mut PresentationExchangeRecord,
        requested_credentials: &Value,
    ) -> Result<AgentMessage, ProtocolError> {
        let holder = required(&self.holder, "holder")?;

        let mut credential_ids = BTreeSet::new();
        for section in ["requested_attributes", "requested_predicates"] {
            if let Some(choices) = requested_credentials.get(section).and_then(Value::as_object) {
                credential_ids.extend(
                    choices
                        .values()
                        .filter_map(|c| c.get("cred_id").and_then(Value::as_str))
                        .map(str::to_string),
                );
            }
        }
        let mut ids = Vec::new();
        for credential_id in &credential_ids {
            let info = holder.get_credential(credential_id).await?;
            let schema_id = info.get("schema_id").and_then(Value::as_str);
            let cred_def_id = info.get("cred_def_id").and_then(Value::as_str);
            if let (Some(schema_id), Some(cred_def_id)) = (schema_id, cred_def_id) {
                ids.push((schema_id.to_string(), cred_def_id.to_string()));
            }
        }
        let (schemas, definitions) = self.ledger_maps(ids).await?;

        let presentation = holder
            .create_presentation(
                &record.presentation_request,
                requested_credentials,
                &schemas,
                &definitions,
            )
            .await?;

        let mut next = record.clone();
        next.advance(PresentationExchangeEvent::SendPresentation)?;
        next.presentation = Some(presentation.clone());
        self.save(&next).await?;
        *record = next;

        let mut message = AgentMessage::new(CredentialPresentation::from_value(&presentation)?);
        if let Some(thread_id) = &record.thread_id {
            message = message.with_thread_id(thread_id);
        }
        tracing::info!(
            presentation_exchange_id = %record.presentation_exchange_id,
            "presentation created"
        );
        Ok(message)
    }

    pub async fn send_presentation(
        &self,
        presentation_exchange_id: &str,
        requested_credentials: &Value,
    ) -> Result<(PresentationExchangeRecord, AgentMessage), ProtocolError> {
        let _guard = self.locks.lock(presentation_exchange_id).await;
        let mut record: PresentationExchangeRecord =
            self.storage.retrieve(presentation_exchange_id).await?;
        let message = self
            .create_presentation(&mut record, requested_credentials)
            .await?;
        Ok((record, message))
    }

    /// Attach a presentation to the request it answers, found by thread id
    /// on the connection it arrived over.
    pub async fn receive_presentation(
        &self,
        presentation: &Value,
        connection_id: &str,
        thread_id: &str,
    ) -> Result<PresentationExchangeRecord, ProtocolError> {
        let found: Vec<PresentationExchangeRecord> = self
            .storage
            .query(&tag_filter([
                ("connection_id", connection_id),
                ("thread_id", thread_id),
                ("initiator", Initiator::Local.as_str()),
            ]))
            .await?;
        let record = found.into_iter().next().ok_or_else(|| {
            ProtocolError::ExchangeNotFound(format!("no presentation request for thread {}", thread_id))
        })?;

        let _guard = self.locks.lock(&record.presentation_exchange_id).await;
        let mut record: PresentationExchangeRecord =
            self.storage.retrieve(&record.presentation_exchange_id).await?;
        record.advance(PresentationExchangeEvent::ReceivePresentation)?;
        record.presentation = Some(presentation.clone());
        self.save(&record).await?;

        tracing::info!(
            presentation_exchange_id = %record.presentation_exchange_id,
            "presentation received"
        );
        Ok(record)
    }

    /// Check the received presentation. The outcome is recorded, not raised.
    pub async fn verify_presentation(
        &self,
        record: &mut PresentationExchangeRecord,
    ) -> Result<bool, ProtocolError> {
        let presentation = record
            .presentation
            .clone()
            .ok_or_else(|| CoreError::MissingField("presentation".into()))?;
        let ids = presentation
            .get("identifiers")
            .and_then(Value::as_array)
            .map(|identifiers| {
                identifiers
                    .iter()
                    .filter_map(|i| {
                        Some((
                            i.get("schema_id")?.as_str()?.to_string(),
                            i.get("cred_def_id")?.as_str()?.to_string(),
                        ))
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let (schemas, definitions) = self.ledger_maps(ids).await?;

        let verified = required(&self.verifier, "verifier")?
            .verify_presentation(
                &record.presentation_request,
                &presentation,
                &schemas,
                &definitions,
            )
            .await?;

        let mut next = record.clone();
        next.advance(PresentationExchangeEvent::Verify)?;
        next.verified = Some(verified.to_string());
        self.save(&next).await?;
        *record = next;

        tracing::info!(
            presentation_exchange_id = %record.presentation_exchange_id,
            verified = verified,
            "presentation verified"
        );
        Ok(verified)
    }

    pub async fn verify(
        &self,
        presentation_exchange_id: &str,
    ) -> Result<PresentationExchangeRecord, ProtocolError> {
        let _guard = self.locks.lock(presentation_exchange_id).await;
        let mut record: PresentationExchangeRecord =
            self.storage.retrieve(presentation_exchange_id).await?;
        self.verify_presentation(&mut record).await?;
        Ok(record)
    }

    pub async fn mark_failed(
        &self,
        presentation_exchange_id: &str,
        error_msg: &str,
    ) -> Result<PresentationExchangeRecord, ProtocolError> {
        let _guard = self.locks.lock(presentation_exchange_id).await;
        let mut record: PresentationExchangeRecord =
            self.storage.retrieve(presentation_exchange_id).await?;
        record.advance(PresentationExchangeEvent::Fail)?;
        record.error_msg = Some(error_msg.to_string());
        self.save(&record).await?;
        tracing::warn!(
            presentation_exchange_id = %presentation_exchange_id,
            error = %error_msg,
            "presentation exchange failed"
        );
        Ok(record)
    }

    pub async fn get(
        &self,
        presentation_exchange_id: &str,
    ) -> Result<PresentationExchangeRecord, ProtocolError> {
        self.storage.retrieve(presentation_exchange_id).await
    }

    pub async fn list(&self, filter: &TagFilter) -> Result<Vec<PresentationExchangeRecord>, ProtocolError> {
        let mut records: Vec<PresentationExchangeRecord> = self.storage.query(filter).await?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    pub async fn remove(&self, presentation_exchange_id: &str) -> Result<(), ProtocolError> {
        let _guard = self.locks.lock(presentation_exchange_id).await;
        let record: PresentationExchangeRecord =
            self.storage.retrieve(presentation_exchange_id).await?;
        self.storage.remove(&record).await
    }
}
