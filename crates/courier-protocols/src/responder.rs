//! Sending messages from handlers and the admin surface.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use courier_messaging::{
    AgentMessage, ConnectionTarget, MessageFactory, OutboundMessage, TransportEnvelope,
};

use crate::error::ProtocolError;

/// Addressing a responder applies to everything it sends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyBindings {
    pub connection_id: Option<String>,
    pub target: Option<ConnectionTarget>,
    pub reply_to_verkey: Option<String>,
    pub reply_socket_id: Option<String>,
    /// Thread a reply joins when it carries none of its own.
    pub reply_thread_id: Option<String>,
}

impl ReplyBindings {
    pub fn for_target(connection_id: impl Into<String>, target: ConnectionTarget) -> Self {
        Self {
            connection_id: Some(connection_id.into()),
            target: Some(target),
            ..Default::default()
        }
    }

    /// Fields set in `overrides` win.
    pub fn merged(&self, overrides: ReplyBindings) -> ReplyBindings {
        ReplyBindings {
            connection_id: overrides.connection_id.or_else(|| self.connection_id.clone()),
            target: overrides.target.or_else(|| self.target.clone()),
            reply_to_verkey: overrides
                .reply_to_verkey
                .or_else(|| self.reply_to_verkey.clone()),
            reply_socket_id: overrides
                .reply_socket_id
                .or_else(|| self.reply_socket_id.clone()),
            reply_thread_id: overrides
                .reply_thread_id
                .or_else(|| self.reply_thread_id.clone()),
        }
    }

    /// Thread `message`, encode it and wrap it for the bound target.
    pub fn create_outbound(
        &self,
        factory: &MessageFactory,
        message: AgentMessage,
    ) -> Result<OutboundMessage, ProtocolError> {
        let message = match &self.reply_thread_id {
            Some(thid) if message.explicit_thread_id().is_none() => message.with_thread_id(thid),
            _ => message,
        };
        let encoded = factory
            .encode(&message)
            .map_err(|e| ProtocolError::MessagePrepare(e.to_string()))?;
        let payload = serde_json::to_string(&TransportEnvelope::pack(encoded, self.target.as_ref()))?;
        Ok(OutboundMessage {
            payload,
            connection_id: self.connection_id.clone(),
            target: self.target.clone(),
            endpoint: None,
            reply_socket_id: self.reply_socket_id.clone(),
            reply_to_verkey: self.reply_to_verkey.clone(),
            reply_thread_id: message.explicit_thread_id().map(str::to_string),
        })
    }
}

#[async_trait]
pub trait Responder: Send + Sync {
    fn bindings(&self) -> &ReplyBindings;

    fn factory(&self) -> &MessageFactory;

    /// Queue an already prepared message.
    async fn send_outbound(&self, message: OutboundMessage) -> Result<(), ProtocolError>;

    /// Send with `overrides` layered over the bound addressing.
    async fn send(&self, message: AgentMessage, overrides: ReplyBindings) -> Result<(), ProtocolError> {
        let outbound = self
            .bindings()
            .merged(overrides)
            .create_outbound(self.factory(), message)?;
        self.send_outbound(outbound).await
    }

    /// Reply on the bound connection, joining the inbound thread.
    async fn send_reply(&self, message: AgentMessage) -> Result<(), ProtocolError> {
        self.send(message, ReplyBindings::default()).await
    }
}

/// Queues messages for the outbound transports.
pub struct DispatchResponder {
    factory: Arc<MessageFactory>,
    bindings: ReplyBindings,
    sink: mpsc::Sender<OutboundMessage>,
}

impl DispatchResponder {
    pub fn new(
        factory: Arc<MessageFactory>,
        bindings: ReplyBindings,
        sink: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            factory,
            bindings,
            sink,
        }
    }
}

#[async_trait]
impl Responder for DispatchResponder {
    fn bindings(&self) -> &ReplyBindings {
        &self.bindings
    }

    fn factory(&self) -> &MessageFactory {
        &self.factory
    }

    async fn send_outbound(&self, message: OutboundMessage) -> Result<(), ProtocolError> {
        tracing::debug!(
            connection_id = ?message.connection_id,
            endpoint = ?message.endpoint(),
            "queueing outbound message"
        );
        self.sink
            .send(message)
            .await
            .map_err(|_| ProtocolError::MessagePrepare("outbound queue closed".into()))
    }
}

/// Keeps sent messages in memory.
#[derive(Default)]
pub struct MockResponder {
    factory: MessageFactory,
    bindings: ReplyBindings,
    messages: Mutex<Vec<OutboundMessage>>,
}

impl MockResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bindings(bindings: ReplyBindings) -> Self {
        Self {
            bindings,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Sent messages decoded back to typed form.
    pub fn sent(&self) -> Vec<AgentMessage> {
        self.messages()
            .iter()
            .filter_map(|outbound| {
                let raw = serde_json::from_str(&outbound.payload).ok()?;
                let unpacked = TransportEnvelope::unpack(raw).ok()?;
                self.factory.decode(unpacked.message).ok()
            })
            .collect()
    }
}

#[async_trait]
impl Responder for MockResponder {
    fn bindings(&self) -> &ReplyBindings {
        &self.bindings
    }

    fn factory(&self) -> &MessageFactory {
        &self.factory
    }

    async fn send_outbound(&self, message: OutboundMessage) -> Result<(), ProtocolError> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
        Ok(())
    }
}
