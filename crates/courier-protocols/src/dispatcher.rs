//! Inbound message pipeline: unpack, decode, find the connection, run the
//! handler, turn handler failures into problem reports.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use courier_core::InjectionContext;
use courier_messaging::messages::ProblemReport;
use courier_messaging::{AgentMessage, MessageFactory, OutboundMessage, TransportEnvelope};

use crate::connection::ConnectionManager;
use crate::delivery::MessageDelivery;
use crate::error::ProtocolError;
use crate::handlers::handler_for;
use crate::request_context::RequestContext;
use crate::responder::{DispatchResponder, ReplyBindings, Responder};

pub struct Dispatcher {
    context: InjectionContext,
    factory: Arc<MessageFactory>,
    outbound: mpsc::Sender<OutboundMessage>,
    tasks: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        context: InjectionContext,
        factory: Arc<MessageFactory>,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            context,
            factory,
            outbound,
            tasks: TaskTracker::new(),
        }
    }

    pub fn context(&self) -> &InjectionContext {
        &self.context
    }

    pub fn factory(&self) -> &Arc<MessageFactory> {
        &self.factory
    }

    /// Run one inbound payload through its handler.
    ///
    /// Only unpack and decode failures are returned; handler failures are
    /// reported to the peer or logged here.
    pub async fn dispatch(&self, raw: Value, mut delivery: MessageDelivery) -> Result<(), ProtocolError> {
        let unpacked = TransportEnvelope::unpack(raw)?;
        delivery.sender_verkey = unpacked.sender_verkey.or(delivery.sender_verkey);
        delivery.recipient_verkey = unpacked.recipient_verkey.or(delivery.recipient_verkey);

        let message = self.factory.decode(unpacked.message)?;
        tracing::debug!(
            message_id = %message.id(),
            message_type = %message.type_uri(),
            transport = %delivery.transport_type,
            "dispatching message"
        );

        let connections = ConnectionManager::new(&self.context)?;
        let connection = connections.find_connection(&delivery).await?;
        let target = match &connection {
            Some(record) => match connections.get_connection_target(record).await {
                Ok(target) => Some(target),
                Err(e) => {
                    tracing::warn!(connection_id = %record.connection_id, error = %e, "no target for connection");
                    None
                }
            },
            None => None,
        };

        let bindings = ReplyBindings {
            connection_id: connection.as_ref().map(|c| c.connection_id.clone()),
            target,
            reply_to_verkey: delivery.sender_verkey.clone(),
            reply_socket_id: delivery.socket_id.clone(),
            reply_thread_id: Some(message.thread_id().to_string()),
        };
        let responder = DispatchResponder::new(self.factory.clone(), bindings, self.outbound.clone());

        let message_type = message.message_type();
        let context = RequestContext::new(&self.context, message, delivery, connection)?;
        if let Err(e) = handler_for(message_type).handle(&context, &responder).await {
            self.report_failure(&context, &responder, e).await;
        }
        Ok(())
    }

    async fn report_failure(&self, context: &RequestContext, responder: &dyn Responder, error: ProtocolError) {
        let Some(connection) = &context.connection else {
            tracing::warn!(
                message_id = %context.message.id(),
                message_type = %context.message.type_uri(),
                error = %error,
                "handler failed without a connection, dropping"
            );
            return;
        };
        tracing::warn!(
            connection_id = %connection.connection_id,
            message_type = %context.message.type_uri(),
            error = %error,
            "handler failed, sending problem report"
        );
        let report = AgentMessage::new(ProblemReport::explain(error.to_string()));
        if let Err(e) = responder.send_reply(report).await {
            tracing::error!(error = %e, "could not send problem report");
        }
    }

    /// Dispatch on a tracked task.
    pub fn spawn_dispatch(self: &Arc<Self>, raw: Value, delivery: MessageDelivery) {
        let dispatcher = Arc::clone(self);
        self.tasks.spawn(async move {
            if let Err(e) = dispatcher.dispatch(raw, delivery).await {
                tracing::warn!(error = %e, decode = e.is_decode_error(), "inbound message dropped");
            }
        });
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Stop accepting dispatches and wait up to `timeout` for running ones.
    /// Returns whether all of them finished.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tasks.close();
        match tokio::time::timeout(timeout, self.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(pending = self.tasks.len(), "dispatches still running at shutdown");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing;
    use crate::records::{ConnectionRecord, RecordStore};
    use courier_core::{ConnectionEvent, Initiator, Settings, Storage, Wallet};
    use courier_messaging::messages::{CredentialRequest, Ping};
    use courier_messaging::MessageBody;
    use serde_json::json;

    fn dispatcher(root: InjectionContext) -> (Arc<Dispatcher>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(Dispatcher::new(root, Arc::new(MessageFactory::new()), tx)), rx)
    }

    /// Store an active connection paired with `their_verkey`.
    async fn paired(root: &InjectionContext, their_verkey: &str) -> ConnectionRecord {
        let wallet = root.inject::<dyn Wallet>().unwrap();
        let mine = wallet.create_local_did(None, None, None).await.unwrap();
        wallet
            .create_pairwise("did:peer:them", their_verkey, &mine.did, None)
            .await
            .unwrap();
        let mut record = ConnectionRecord::new(Initiator::Local);
        record.my_did = Some(mine.did);
        record.their_did = Some("did:peer:them".into());
        record.their_endpoint = Some("http://them".into());
        record.advance(ConnectionEvent::Request).unwrap();
        record.advance(ConnectionEvent::Accept).unwrap();
        root.inject::<dyn Storage>().unwrap().save(&record).await.unwrap();
        record
    }

    fn enveloped(message: AgentMessage, sender: &str) -> Value {
        let encoded = MessageFactory::new().encode(&message).unwrap();
        json!({"recipient_keys": ["ME"], "sender_key": sender, "msg": encoded})
    }

    #[tokio::test]
    async fn test_undecodable_payload_rejected() {
        let (root, _) = testing::injection(Settings::new());
        let (dispatcher, _rx) = dispatcher(root);
        let err = dispatcher
            .dispatch(json!({"@type": "unknown/1.0/thing"}), MessageDelivery::new("http"))
            .await
            .unwrap_err();
        assert!(err.is_decode_error());
    }

    #[tokio::test]
    async fn test_ping_answered_over_connection() {
        let (root, _) = testing::injection(Settings::new());
        let connection = paired(&root, "THEIRKEY").await;
        let (dispatcher, mut rx) = dispatcher(root);

        let ping = AgentMessage::new(Ping::default());
        let ping_id = ping.id().to_string();
        dispatcher
            .dispatch(enveloped(ping, "THEIRKEY"), MessageDelivery::new("http"))
            .await
            .unwrap();

        let outbound = rx.recv().await.unwrap();
        assert_eq!(outbound.connection_id.as_deref(), Some(connection.connection_id.as_str()));
        assert_eq!(outbound.endpoint(), Some("http://them"));
        assert_eq!(outbound.reply_thread_id.as_deref(), Some(ping_id.as_str()));
        assert_eq!(outbound.reply_to_verkey.as_deref(), Some("THEIRKEY"));
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_problem_report() {
        let (root, _) = testing::injection(Settings::new());
        paired(&root, "THEIRKEY").await;
        let (dispatcher, mut rx) = dispatcher(root);

        // No offer was ever sent, so the request matches no exchange.
        let request = CredentialRequest {
            offer_json: json!({"cred_def_id": "CD"}),
            credential_request_json: json!({}),
        };
        dispatcher
            .dispatch(enveloped(AgentMessage::new(request), "THEIRKEY"), MessageDelivery::new("http"))
            .await
            .unwrap();

        let outbound = rx.recv().await.unwrap();
        let raw: Value = serde_json::from_str(&outbound.payload).unwrap();
        let unpacked = TransportEnvelope::unpack(raw).unwrap();
        let reply = MessageFactory::new().decode(unpacked.message).unwrap();
        assert!(matches!(reply.body(), MessageBody::ProblemReport(r) if r.explain_ltxt.is_some()));
    }

    #[tokio::test]
    async fn test_failure_without_connection_dropped() {
        let (root, _) = testing::injection(Settings::new());
        let (dispatcher, mut rx) = dispatcher(root);
        let request = CredentialRequest {
            offer_json: json!({"cred_def_id": "CD"}),
            credential_request_json: json!({}),
        };
        let encoded = MessageFactory::new().encode(&AgentMessage::new(request)).unwrap();
        dispatcher
            .dispatch(encoded, MessageDelivery::new("http"))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawned_dispatches_drain_on_shutdown() {
        let (root, _) = testing::injection(Settings::new());
        paired(&root, "THEIRKEY").await;
        let (dispatcher, mut rx) = dispatcher(root);
        for _ in 0..3 {
            dispatcher.spawn_dispatch(
                enveloped(AgentMessage::new(Ping::default()), "THEIRKEY"),
                MessageDelivery::new("ws"),
            );
        }
        assert!(dispatcher.shutdown(Duration::from_secs(5)).await);
        assert_eq!(dispatcher.in_flight(), 0);
        for _ in 0..3 {
            assert!(rx.try_recv().is_ok());
        }
    }
}
