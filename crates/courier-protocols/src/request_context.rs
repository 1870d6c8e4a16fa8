use courier_core::{ConnectionState, InjectionContext, Settings};
use courier_messaging::AgentMessage;

use crate::delivery::MessageDelivery;
use crate::error::ProtocolError;
use crate::records::ConnectionRecord;

/// Name of the per-message injection scope.
pub const REQUEST_SCOPE: &str = "request";

/// Everything a handler knows about one inbound message.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub injection: InjectionContext,
    pub message: AgentMessage,
    pub delivery: MessageDelivery,
    pub connection: Option<ConnectionRecord>,
}

impl RequestContext {
    /// Open a request scope under `parent` for `message`.
    pub fn new(
        parent: &InjectionContext,
        message: AgentMessage,
        delivery: MessageDelivery,
        connection: Option<ConnectionRecord>,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            injection: parent.start_scope(REQUEST_SCOPE, None)?,
            message,
            delivery,
            connection,
        })
    }

    pub fn settings(&self) -> &Settings {
        self.injection.settings()
    }

    /// Whether the message arrived on an `active` connection.
    pub fn connection_active(&self) -> bool {
        self.connection.as_ref().is_some_and(ConnectionRecord::is_active)
    }

    /// Whether the connection can carry replies (`active` or `response`).
    pub fn connection_ready(&self) -> bool {
        self.connection.as_ref().is_some_and(ConnectionRecord::is_ready)
    }

    pub fn require_connection(&self) -> Result<&ConnectionRecord, ProtocolError> {
        self.connection.as_ref().ok_or_else(|| {
            ProtocolError::Handler(format!(
                "{} requires a connection",
                self.message.type_uri()
            ))
        })
    }

    pub fn require_active_connection(&self) -> Result<&ConnectionRecord, ProtocolError> {
        let connection = self.require_connection()?;
        if connection.state != ConnectionState::Active {
            return Err(ProtocolError::Handler(format!(
                "{} requires an active connection, connection {} is {}",
                self.message.type_uri(),
                connection.connection_id,
                connection.state
            )));
        }
        Ok(connection)
    }
}
