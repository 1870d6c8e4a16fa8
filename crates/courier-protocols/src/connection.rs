//! Connection protocol: invitation, request, response and the pairwise
//! relationship they establish.

use std::sync::Arc;

use serde_json::{json, Value};

use courier_core::settings::keys;
use courier_core::{
    tag_filter, ConnectionEvent, ConnectionState, CoreError, Did, InjectionContext, Initiator,
    Ledger, Settings, Storage, StorageRecord, TagFilter, Wallet,
};
use courier_messaging::messages::{
    ConnectionDetail, ConnectionInvitation, ConnectionRequest, ConnectionResponse, DidDoc,
};
use courier_messaging::{AgentMessage, ConnectionTarget};

use crate::delivery::MessageDelivery;
use crate::error::ProtocolError;
use crate::events::{topics, EventHook};
use crate::locks::{ExchangeGuard, ExchangeLocks};
use crate::records::{ConnectionRecord, Record, RecordStore};

/// Invitations we created, keyed by invitation key.
pub const SENT_INVITATION: &str = "sent_invitation";
/// Invitations we received, keyed by invitation key.
pub const RECEIVED_INVITATION: &str = "received_invitation";
/// Requests we sent, keyed by request message id.
pub const CONNECTION_REQUEST: &str = "connection_request";
/// Requests we received, keyed by request message id.
pub const RECEIVED_CONNECTION_REQUEST: &str = "received_connection_request";

const DEFAULT_LABEL: &str = "Courier Agent";

pub struct ConnectionManager {
    wallet: Arc<dyn Wallet>,
    storage: Arc<dyn Storage>,
    ledger: Option<Arc<dyn Ledger>>,
    events: Option<Arc<dyn EventHook>>,
    locks: Arc<ExchangeLocks>,
    settings: Settings,
}

impl ConnectionManager {
    pub fn new(context: &InjectionContext) -> Result<Self, ProtocolError> {
        Ok(Self {
            wallet: context.inject::<dyn Wallet>()?,
            storage: context.inject::<dyn Storage>()?,
            ledger: context.inject_optional::<dyn Ledger>()?,
            events: context.inject_optional::<dyn EventHook>()?,
            locks: context
                .inject_optional::<ExchangeLocks>()?
                .unwrap_or_else(|| Arc::new(ExchangeLocks::new())),
            settings: context.settings().clone(),
        })
    }

    fn label(&self, label: Option<&str>) -> String {
        label
            .or_else(|| self.settings.get_str(keys::DEFAULT_LABEL))
            .unwrap_or(DEFAULT_LABEL)
            .to_string()
    }

    fn endpoint(&self, endpoint: Option<&str>) -> Result<String, ProtocolError> {
        endpoint
            .or_else(|| self.settings.get_str(keys::DEFAULT_ENDPOINT))
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::ConnectionProtocol("no endpoint configured".into()))
    }

    async fn save(&self, record: &ConnectionRecord) -> Result<(), ProtocolError> {
        self.storage.save(record).await?;
        if let Some(events) = &self.events {
            events
                .emit(topics::CONNECTIONS, serde_json::to_value(record)?)
                .await;
        }
        Ok(())
    }

    /// Create an invitation with a fresh invitation key.
    pub async fn create_invitation(
        &self,
        label: Option<&str>,
        endpoint: Option<&str>,
        seed: Option<&str>,
    ) -> Result<(ConnectionRecord, ConnectionInvitation), ProtocolError> {
        let endpoint = self.endpoint(endpoint)?;
        let key = self.wallet.create_signing_key(seed, None).await?;
        let invitation =
            ConnectionInvitation::with_keys(self.label(label), vec![key.verkey.clone()], endpoint);

        self.storage
            .save_record(
                StorageRecord::new(SENT_INVITATION, serde_json::to_string(&invitation)?)
                    .with_id(&key.verkey),
            )
            .await?;

        let mut record = ConnectionRecord::new(Initiator::Local);
        record.invitation_key = Some(key.verkey.clone());
        self.save(&record).await?;

        tracing::info!(
            connection_id = %record.connection_id,
            invitation_key = %key.verkey,
            "invitation created"
        );
        Ok((record, invitation))
    }

    /// Record an invitation from a peer. Receiving the same invitation twice
    /// returns the existing connection.
    pub async fn receive_invitation(
        &self,
        invitation: &ConnectionInvitation,
    ) -> Result<ConnectionRecord, ProtocolError> {
        invitation.validate()?;

        let (invitation_key, endpoint, routing_keys) = match invitation.invitation_key() {
            Some(key) => (
                key.to_string(),
                invitation.endpoint.clone(),
                invitation.routing_keys.clone().unwrap_or_default(),
            ),
            None => {
                let did = invitation.did.as_deref().unwrap_or_default();
                let (key, endpoint) = self.resolve_public_did(did).await?;
                (key, Some(endpoint), Vec::new())
            }
        };

        let existing: Vec<ConnectionRecord> = self
            .storage
            .query(&tag_filter([
                ("invitation_key", invitation_key.as_str()),
                ("initiator", Initiator::External.as_str()),
            ]))
            .await?;
        if let Some(record) = existing.into_iter().next() {
            tracing::debug!(
                connection_id = %record.connection_id,
                "invitation already received"
            );
            return Ok(record);
        }

        self.storage
            .save_record(
                StorageRecord::new(RECEIVED_INVITATION, serde_json::to_string(invitation)?)
                    .with_id(&invitation_key),
            )
            .await?;

        let mut record = ConnectionRecord::new(Initiator::External);
        record.invitation_key = Some(invitation_key);
        record.their_label = Some(invitation.label.clone());
        record.their_endpoint = endpoint;
        record.routing_keys = routing_keys;
        self.save(&record).await?;

        tracing::info!(
            connection_id = %record.connection_id,
            label = %invitation.label,
            "invitation received"
        );
        Ok(record)
    }

    async fn resolve_public_did(&self, did: &str) -> Result<(String, String), ProtocolError> {
        let ledger = self.ledger.as_ref().ok_or_else(|| {
            ProtocolError::ConnectionProtocol(format!("no ledger to resolve {}", did))
        })?;
        let unqualified = Did::new(did)?;
        let key = ledger
            .get_key_for_did(unqualified.unqualified())
            .await?
            .ok_or_else(|| ProtocolError::ConnectionProtocol(format!("no key on ledger for {}", did)))?;
        let endpoint = ledger
            .get_endpoint_for_did(unqualified.unqualified())
            .await?
            .ok_or_else(|| {
                ProtocolError::ConnectionProtocol(format!("no endpoint on ledger for {}", did))
            })?;
        Ok((key, endpoint))
    }

    /// Build the request answering the invitation held by `record`.
    pub async fn create_request(
        &self,
        record: &mut ConnectionRecord,
        label: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<(AgentMessage, ConnectionTarget), ProtocolError> {
        if record.state != ConnectionState::Invitation {
            return Err(CoreError::InvalidStateTransition {
                from: record.state.to_string(),
                to: ConnectionState::Request.to_string(),
            }
            .into());
        }
        let endpoint = self.endpoint(endpoint)?;
        let info = self
            .wallet
            .create_local_did(
                None,
                None,
                Some(json!({
                    "their_label": record.their_label,
                    "their_endpoint": record.their_endpoint,
                })),
            )
            .await?;
        let did = Did::new(&info.did)?;
        let doc = DidDoc::new(&did, &info.verkey, &endpoint, Vec::new());
        let request = ConnectionRequest {
            label: self.label(label),
            connection: ConnectionDetail::new(&did, doc),
        };
        let message = AgentMessage::new(request.clone());

        self.storage
            .save_record(
                StorageRecord::new(CONNECTION_REQUEST, serde_json::to_string(&request)?)
                    .with_id(message.id())
                    .with_tag("connection_id", &record.connection_id)
                    .with_tag("my_did", &info.did),
            )
            .await?;

        record.my_did = Some(info.did.clone());
        record.request_id = Some(message.id().to_string());
        record.advance(ConnectionEvent::Request)?;
        self.save(record).await?;

        let target = ConnectionTarget {
            did: None,
            endpoint: record.their_endpoint.clone(),
            label: record.their_label.clone(),
            recipient_keys: record.invitation_key.iter().cloned().collect(),
            routing_keys: record.routing_keys.clone(),
            sender_key: Some(info.verkey),
        };
        tracing::info!(
            connection_id = %record.connection_id,
            request_id = %message.id(),
            "connection request created"
        );
        Ok((message, target))
    }

    pub async fn accept_invitation(
        &self,
        connection_id: &str,
    ) -> Result<(ConnectionRecord, AgentMessage, ConnectionTarget), ProtocolError> {
        let _guard = self.locks.lock(connection_id).await;
        let mut record: ConnectionRecord = self.storage.retrieve(connection_id).await?;
        let (message, target) = self.create_request(&mut record, None, None).await?;
        Ok((record, message, target))
    }

    /// Record an inbound request against the invitation it answers.
    pub async fn receive_request(
        &self,
        request: &ConnectionRequest,
        request_id: &str,
        delivery: &MessageDelivery,
    ) -> Result<ConnectionRecord, ProtocolError> {
        request.validate()?;
        let doc = request.connection.require_did_doc()?;

        let claimed = match &delivery.recipient_verkey {
            Some(key) => self.claim_invitation(key).await?,
            None => None,
        };
        let (mut record, _guard) = match claimed {
            Some(claimed) => claimed,
            None => {
                let mut fresh = ConnectionRecord::new(Initiator::External);
                fresh.invitation_key = delivery.recipient_verkey.clone();
                let guard = self.locks.lock(&fresh.connection_id).await;
                (fresh, guard)
            }
        };

        self.storage
            .save_record(
                StorageRecord::new(RECEIVED_CONNECTION_REQUEST, serde_json::to_string(request)?)
                    .with_id(request_id)
                    .with_tag("connection_id", &record.connection_id),
            )
            .await?;

        record.their_label = Some(request.label.clone());
        record.their_did = request.connection.did.clone();
        record.their_endpoint = doc.endpoint().map(str::to_string);
        record.routing_keys = doc.routing_keys();
        record.request_id = Some(request_id.to_string());
        record.advance(ConnectionEvent::Request)?;
        self.save(&record).await?;

        tracing::info!(
            connection_id = %record.connection_id,
            label = %request.label,
            "connection request received"
        );
        Ok(record)
    }

    /// Lock a local invitation still waiting for its request. The state is
    /// checked again under the lock so each invitation is claimed once.
    async fn claim_invitation(
        &self,
        invitation_key: &str,
    ) -> Result<Option<(ConnectionRecord, ExchangeGuard)>, ProtocolError> {
        let candidates: Vec<ConnectionRecord> = self
            .storage
            .query(&tag_filter([
                ("invitation_key", invitation_key),
                ("initiator", Initiator::Local.as_str()),
                ("state", ConnectionState::Invitation.as_str()),
            ]))
            .await?;
        for candidate in candidates {
            let guard = self.locks.lock(&candidate.connection_id).await;
            let current: ConnectionRecord = self.storage.retrieve(&candidate.connection_id).await?;
            if current.state == ConnectionState::Invitation {
                return Ok(Some((current, guard)));
            }
        }
        Ok(None)
    }

    /// Answer `request` with a response signed by the invitation key.
    pub async fn create_response(
        &self,
        record: &mut ConnectionRecord,
        request: &ConnectionRequest,
        request_id: &str,
        endpoint: Option<&str>,
    ) -> Result<(AgentMessage, ConnectionTarget), ProtocolError> {
        if let Some(key) = &record.invitation_key {
            if let Err(e) = self.storage.get_record(SENT_INVITATION, key).await {
                tracing::warn!(invitation_key = %key, error = %e, "invitation not found, responding anyway");
            }
        }

        let their_did = request.connection.require_did()?;
        let doc = request.connection.require_did_doc()?;
        let their_verkey = doc.recipient_key().ok_or_else(|| {
            ProtocolError::ConnectionProtocol("request DIDDoc carries no key".into())
        })?;
        let endpoint = self.endpoint(endpoint)?;
        let mut next = record.clone();
        next.advance(ConnectionEvent::Respond)?;

        let info = self
            .wallet
            .create_local_did(
                None,
                None,
                Some(json!({
                    "their_label": request.label,
                    "their_endpoint": doc.endpoint(),
                })),
            )
            .await?;
        self.wallet
            .create_pairwise(their_did, their_verkey, &info.did, None)
            .await?;

        let did = Did::new(&info.did)?;
        let detail = ConnectionDetail::new(&did, DidDoc::new(&did, &info.verkey, &endpoint, Vec::new()));
        let signer = next.invitation_key.as_deref().unwrap_or(&info.verkey);
        let response = ConnectionResponse::signed(&detail, signer, self.wallet.as_ref()).await?;
        let message = AgentMessage::new(response).with_thread_id(request_id);

        next.my_did = Some(info.did.clone());
        next.their_did = Some(their_did.to_string());
        next.their_label = Some(request.label.clone());
        next.their_endpoint = doc.endpoint().map(str::to_string);
        next.routing_keys = doc.routing_keys();
        self.save(&next).await?;
        *record = next;

        let target = ConnectionTarget {
            did: Some(their_did.to_string()),
            endpoint: record.their_endpoint.clone(),
            label: record.their_label.clone(),
            recipient_keys: vec![their_verkey.to_string()],
            routing_keys: record.routing_keys.clone(),
            sender_key: Some(info.verkey),
        };
        tracing::info!(
            connection_id = %record.connection_id,
            their_did = %their_did,
            "connection response created"
        );
        Ok((message, target))
    }

    pub async fn accept_request(
        &self,
        connection_id: &str,
    ) -> Result<(ConnectionRecord, AgentMessage, ConnectionTarget), ProtocolError> {
        let _guard = self.locks.lock(connection_id).await;
        let mut record: ConnectionRecord = self.storage.retrieve(connection_id).await?;
        let request_id = record.request_id.clone().ok_or_else(|| {
            ProtocolError::ConnectionProtocol(format!("connection {} has no request", connection_id))
        })?;
        let stored = self
            .storage
            .get_record(RECEIVED_CONNECTION_REQUEST, &request_id)
            .await?;
        let request: ConnectionRequest = serde_json::from_str(&stored.value)?;
        let (message, target) = self
            .create_response(&mut record, &request, &request_id, None)
            .await?;
        Ok((record, message, target))
    }

    /// Complete the invitee side: verify the response, pair with the
    /// inviter and consume the stored request.
    pub async fn accept_response(
        &self,
        response: &ConnectionResponse,
        thread_id: Option<&str>,
    ) -> Result<(ConnectionRecord, ConnectionTarget), ProtocolError> {
        let thread_id = thread_id.ok_or_else(|| {
            ProtocolError::ConnectionProtocol("connection response has no thread id".into())
        })?;
        let stored = self.find_request(thread_id).await?;
        let connection_id = stored.tags.get("connection_id").cloned().ok_or_else(|| {
            ProtocolError::ConnectionProtocol(format!("request {} has no connection", thread_id))
        })?;

        let _guard = self.locks.lock(&connection_id).await;
        // A concurrent accept may have consumed the request while we waited.
        let stored = self.find_request(thread_id).await?;
        let mut record: ConnectionRecord = self.storage.retrieve(&connection_id).await?;

        let my_did = record.my_did.clone().ok_or_else(|| {
            ProtocolError::ConnectionProtocol(format!("connection {} has no local DID", connection_id))
        })?;
        let my_info = self.wallet.get_local_did(&my_did).await?;
        if my_info.metadata.get("their_label").map_or(true, Value::is_null) {
            return Err(ProtocolError::ConnectionProtocol(format!(
                "local DID {} carries no peer label",
                my_did
            )));
        }

        let (detail, signer) = response.verified_connection(self.wallet.as_ref()).await?;
        if let (Some(signer), Some(key)) = (&signer, &record.invitation_key) {
            if signer != key {
                return Err(ProtocolError::ConnectionProtocol(format!(
                    "response signed by {} instead of invitation key {}",
                    signer, key
                )));
            }
        }
        let their_did = detail.require_did()?;
        let doc = detail.require_did_doc()?;
        let their_verkey = doc.recipient_key().ok_or_else(|| {
            ProtocolError::ConnectionProtocol("response DIDDoc carries no key".into())
        })?;

        record.advance(ConnectionEvent::Accept)?;
        self.wallet
            .create_pairwise(their_did, their_verkey, &my_did, None)
            .await?;
        self.storage.delete_record(&stored).await?;

        record.their_did = Some(their_did.to_string());
        if let Some(endpoint) = doc.endpoint() {
            record.their_endpoint = Some(endpoint.to_string());
        }
        record.routing_keys = doc.routing_keys();
        self.save(&record).await?;

        let target = ConnectionTarget {
            did: Some(their_did.to_string()),
            endpoint: record.their_endpoint.clone(),
            label: record.their_label.clone(),
            recipient_keys: vec![their_verkey.to_string()],
            routing_keys: record.routing_keys.clone(),
            sender_key: Some(my_info.verkey),
        };
        tracing::info!(connection_id = %connection_id, their_did = %their_did, "connection active");
        Ok((record, target))
    }

    async fn find_request(&self, thread_id: &str) -> Result<StorageRecord, ProtocolError> {
        match self.storage.get_record(CONNECTION_REQUEST, thread_id).await {
            Ok(stored) => Ok(stored),
            Err(e) if e.is_not_found() => Err(ProtocolError::ConnectionProtocol(format!(
                "no pending connection request for thread {}",
                thread_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// The connection an inbound message arrived on, from its sender key.
    /// A connection still in `response` becomes active.
    pub async fn find_connection(
        &self,
        delivery: &MessageDelivery,
    ) -> Result<Option<ConnectionRecord>, ProtocolError> {
        let Some(sender) = &delivery.sender_verkey else {
            return Ok(None);
        };
        let pairwise = match self.wallet.get_pairwise_for_verkey(sender).await {
            Ok(pairwise) => pairwise,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let found: Vec<ConnectionRecord> = self
            .storage
            .query(&tag_filter([("their_did", pairwise.their_did.as_str())]))
            .await?;
        let Some(record) = found.into_iter().next() else {
            return Ok(None);
        };
        if record.state != ConnectionState::Response {
            return Ok(Some(record));
        }

        let _guard = self.locks.lock(&record.connection_id).await;
        let mut record: ConnectionRecord = self.storage.retrieve(&record.connection_id).await?;
        if record.state == ConnectionState::Response {
            record.advance(ConnectionEvent::Complete)?;
            self.save(&record).await?;
            tracing::info!(connection_id = %record.connection_id, "connection active");
        }
        Ok(Some(record))
    }

    /// Addressing for messages sent over `record`.
    pub async fn get_connection_target(
        &self,
        record: &ConnectionRecord,
    ) -> Result<ConnectionTarget, ProtocolError> {
        let my_did = record.my_did.as_deref().ok_or_else(|| {
            ProtocolError::ConnectionProtocol(format!(
                "connection {} has no local DID",
                record.connection_id
            ))
        })?;
        let my_info = self.wallet.get_local_did(my_did).await?;
        let recipient_keys = match &record.their_did {
            Some(their_did) => match self.wallet.get_pairwise_for_did(their_did).await {
                Ok(pairwise) => vec![pairwise.their_verkey],
                Err(e) if e.is_not_found() => record.invitation_key.iter().cloned().collect(),
                Err(e) => return Err(e.into()),
            },
            None => record.invitation_key.iter().cloned().collect(),
        };
        Ok(ConnectionTarget {
            did: record.their_did.clone(),
            endpoint: record.their_endpoint.clone(),
            label: record.their_label.clone(),
            recipient_keys,
            routing_keys: record.routing_keys.clone(),
            sender_key: Some(my_info.verkey),
        })
    }

    pub async fn get_connection(&self, connection_id: &str) -> Result<ConnectionRecord, ProtocolError> {
        self.storage.retrieve(connection_id).await
    }

    pub async fn list_connections(
        &self,
        filter: &TagFilter,
    ) -> Result<Vec<ConnectionRecord>, ProtocolError> {
        let mut records: Vec<ConnectionRecord> = self.storage.query(filter).await?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    pub async fn remove_connection(&self, connection_id: &str) -> Result<(), ProtocolError> {
        let _guard = self.locks.lock(connection_id).await;
        let record: ConnectionRecord = self.storage.retrieve(connection_id).await?;
        self.storage.remove(&record).await?;
        tracing::info!(connection_id = %connection_id, "connection removed");
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("record_type", &ConnectionRecord::RECORD_TYPE)
            .finish_non_exhaustive()
    }
}
