//! Persistent exchange records.
//!
//! Each record serializes to a storage value and a flat tag set. State
//! changes go through the matching state machine in `courier-core`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use courier_core::{
    ConnectionEvent, ConnectionState, ConnectionStateMachine, CoreError, CredentialExchangeEvent,
    CredentialExchangeState, CredentialExchangeStateMachine, CredentialValues, Initiator,
    PresentationExchangeEvent, PresentationExchangeState, PresentationExchangeStateMachine,
    Storage, StorageRecord, TagFilter, Tags,
};

use crate::error::ProtocolError;

/// A record type persisted through [`Storage`].
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const RECORD_TYPE: &'static str;

    fn record_id(&self) -> &str;

    fn tags(&self) -> Tags;

    fn to_storage(&self) -> Result<StorageRecord, CoreError> {
        Ok(StorageRecord::new(Self::RECORD_TYPE, serde_json::to_string(self)?)
            .with_id(self.record_id())
            .with_tags(self.tags()))
    }

    fn from_storage(record: &StorageRecord) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(&record.value)?)
    }
}

/// Typed access to records of one type.
#[async_trait]
pub trait RecordStore {
    async fn save<R: Record>(&self, record: &R) -> Result<(), ProtocolError>;
    async fn retrieve<R: Record>(&self, record_id: &str) -> Result<R, ProtocolError>;
    async fn query<R: Record>(&self, filter: &TagFilter) -> Result<Vec<R>, ProtocolError>;
    async fn remove<R: Record>(&self, record: &R) -> Result<(), ProtocolError>;
}

#[async_trait]
impl<S: Storage + ?Sized> RecordStore for S {
    async fn save<R: Record>(&self, record: &R) -> Result<(), ProtocolError> {
        Ok(self.save_record(record.to_storage()?).await?)
    }

    async fn retrieve<R: Record>(&self, record_id: &str) -> Result<R, ProtocolError> {
        let stored = self.get_record(R::RECORD_TYPE, record_id).await?;
        Ok(R::from_storage(&stored)?)
    }

    async fn query<R: Record>(&self, filter: &TagFilter) -> Result<Vec<R>, ProtocolError> {
        self.search_records(R::RECORD_TYPE, filter)
            .await?
            .iter()
            .map(|stored| R::from_storage(stored).map_err(ProtocolError::from))
            .collect()
    }

    async fn remove<R: Record>(&self, record: &R) -> Result<(), ProtocolError> {
        let stored = self.get_record(R::RECORD_TYPE, record.record_id()).await?;
        Ok(self.delete_record(&stored).await?)
    }
}

fn tag(tags: &mut Tags, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        tags.insert(name.to_string(), value.to_string());
    }
}

fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub connection_id: String,
    pub state: ConnectionState,
    pub initiator: Initiator,
    pub my_did: Option<String>,
    pub their_did: Option<String>,
    pub their_label: Option<String>,
    pub their_endpoint: Option<String>,
    pub invitation_key: Option<String>,
    #[serde(default)]
    pub routing_keys: Vec<String>,
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionRecord {
    pub const RECORD_TYPE: &'static str = "connection";

    /// A connection waiting on an invitation.
    pub fn new(initiator: Initiator) -> Self {
        let now = Utc::now();
        Self {
            connection_id: new_id(),
            state: ConnectionState::Invitation,
            initiator,
            my_did: None,
            their_did: None,
            their_label: None,
            their_endpoint: None,
            invitation_key: None,
            routing_keys: Vec::new(),
            request_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn advance(&mut self, event: ConnectionEvent) -> Result<ConnectionState, CoreError> {
        self.state = ConnectionStateMachine::transition(self.state, event)?;
        self.updated_at = Utc::now();
        Ok(self.state)
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    /// Whether messages may flow over this connection.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, ConnectionState::Active | ConnectionState::Response)
    }
}

impl Record for ConnectionRecord {
    const RECORD_TYPE: &'static str = ConnectionRecord::RECORD_TYPE;

    fn record_id(&self) -> &str {
        &self.connection_id
    }

    fn tags(&self) -> Tags {
        let mut tags = Tags::new();
        tag(&mut tags, "state", Some(self.state.as_str()));
        tag(&mut tags, "initiator", Some(self.initiator.as_str()));
        tag(&mut tags, "my_did", self.my_did.as_deref());
        tag(&mut tags, "their_did", self.their_did.as_deref());
        tag(&mut tags, "invitation_key", self.invitation_key.as_deref());
        tag(&mut tags, "request_id", self.request_id.as_deref());
        tags
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialExchangeRecord {
    pub credential_exchange_id: String,
    pub state: CredentialExchangeState,
    pub initiator: Initiator,
    pub connection_id: String,
    pub thread_id: Option<String>,
    pub credential_definition_id: Option<String>,
    pub schema_id: Option<String>,
    pub credential_offer: Option<Value>,
    pub credential_request: Option<Value>,
    pub credential_request_metadata: Option<Value>,
    pub credential_values: Option<CredentialValues>,
    pub credential: Option<Value>,
    pub credential_id: Option<String>,
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialExchangeRecord {
    pub const RECORD_TYPE: &'static str = "credential_exchange";

    pub fn new(
        initiator: Initiator,
        state: CredentialExchangeState,
        connection_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            credential_exchange_id: new_id(),
            state,
            initiator,
            connection_id: connection_id.into(),
            thread_id: None,
            credential_definition_id: None,
            schema_id: None,
            credential_offer: None,
            credential_request: None,
            credential_request_metadata: None,
            credential_values: None,
            credential: None,
            credential_id: None,
            error_msg: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn advance(&mut self, event: CredentialExchangeEvent) -> Result<CredentialExchangeState, CoreError> {
        self.state = CredentialExchangeStateMachine::transition(self.state, event)?;
        self.updated_at = Utc::now();
        Ok(self.state)
    }
}

impl Record for CredentialExchangeRecord {
    const RECORD_TYPE: &'static str = CredentialExchangeRecord::RECORD_TYPE;

    fn record_id(&self) -> &str {
        &self.credential_exchange_id
    }

    fn tags(&self) -> Tags {
        let mut tags = Tags::new();
        tag(&mut tags, "state", Some(self.state.as_str()));
        tag(&mut tags, "initiator", Some(self.initiator.as_str()));
        tag(&mut tags, "connection_id", Some(&self.connection_id));
        tag(&mut tags, "thread_id", self.thread_id.as_deref());
        tag(
            &mut tags,
            "credential_definition_id",
            self.credential_definition_id.as_deref(),
        );
        tag(&mut tags, "schema_id", self.schema_id.as_deref());
        tags
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationExchangeRecord {
    pub presentation_exchange_id: String,
    pub state: PresentationExchangeState,
    pub initiator: Initiator,
    pub connection_id: String,
    pub thread_id: Option<String>,
    pub presentation_request: Value,
    pub presentation: Option<Value>,
    /// `"true"` or `"false"` once verified.
    pub verified: Option<String>,
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PresentationExchangeRecord {
    pub const RECORD_TYPE: &'static str = "presentation_exchange";

    pub fn new(
        initiator: Initiator,
        state: PresentationExchangeState,
        connection_id: impl Into<String>,
        presentation_request: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            presentation_exchange_id: new_id(),
            state,
            initiator,
            connection_id: connection_id.into(),
            thread_id: None,
            presentation_request,
            presentation: None,
            verified: None,
            error_msg: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn advance(
        &mut self,
        event: PresentationExchangeEvent,
    ) -> Result<PresentationExchangeState, CoreError> {
        self.state = PresentationExchangeStateMachine::transition(self.state, event)?;
        self.updated_at = Utc::now();
        Ok(self.state)
    }
}

impl Record for PresentationExchangeRecord {
    const RECORD_TYPE: &'static str = PresentationExchangeRecord::RECORD_TYPE;

    fn record_id(&self) -> &str {
        &self.presentation_exchange_id
    }

    fn tags(&self) -> Tags {
        let mut tags = Tags::new();
        tag(&mut tags, "state", Some(self.state.as_str()));
        tag(&mut tags, "initiator", Some(self.initiator.as_str()));
        tag(&mut tags, "connection_id", Some(&self.connection_id));
        tag(&mut tags, "thread_id", self.thread_id.as_deref());
        tags
    }
}

/// Maps a recipient key to the connection that receives its messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub record_id: String,
    pub connection_id: String,
    pub recipient_key: String,
}

impl RouteRecord {
    pub const RECORD_TYPE: &'static str = "forward_route";

    pub fn new(connection_id: impl Into<String>, recipient_key: impl Into<String>) -> Self {
        Self {
            record_id: new_id(),
            connection_id: connection_id.into(),
            recipient_key: recipient_key.into(),
        }
    }
}

impl Record for RouteRecord {
    const RECORD_TYPE: &'static str = RouteRecord::RECORD_TYPE;

    fn record_id(&self) -> &str {
        &self.record_id
    }

    fn tags(&self) -> Tags {
        let mut tags = Tags::new();
        tag(&mut tags, "connection_id", Some(&self.connection_id));
        tag(&mut tags, "recipient_key", Some(&self.recipient_key));
        tags
    }
}
