use async_trait::async_trait;

use courier_messaging::messages::PingResponse;
use courier_messaging::{AgentMessage, MessageBody};

use crate::error::ProtocolError;
use crate::handlers::{unexpected, Handler};
use crate::request_context::RequestContext;
use crate::responder::Responder;

pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::Ping(ping) = context.message.body() else {
            return Err(unexpected(context));
        };
        if !context.connection_ready() {
            tracing::info!(message_id = %context.message.id(), "ping without a connection, ignoring");
            return Ok(());
        }
        if ping.response_requested {
            responder
                .send_reply(AgentMessage::new(PingResponse::default()))
                .await?;
        }
        Ok(())
    }
}

pub struct PingResponseHandler;

#[async_trait]
impl Handler for PingResponseHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        _responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::PingResponse(_) = context.message.body() else {
            return Err(unexpected(context));
        };
        tracing::info!(
            thread_id = %context.message.thread_id(),
            connection_id = ?context.connection.as_ref().map(|c| &c.connection_id),
            "trust ping answered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing;
    use crate::responder::MockResponder;
    use courier_core::Settings;
    use courier_messaging::messages::Ping;

    #[tokio::test]
    async fn test_ping_answered_on_connection() {
        let (root, _) = testing::injection(Settings::new());
        let message = AgentMessage::new(Ping::default());
        let ping_id = message.id().to_string();
        let context = testing::request(&root, message, Some(testing::active_connection()));
        let responder = MockResponder::new();
        PingHandler.handle(&context, &responder).await.unwrap();

        let sent = responder.sent();
        assert!(matches!(sent[0].body(), MessageBody::PingResponse(_)));
        assert_eq!(sent[0].explicit_thread_id(), Some(ping_id.as_str()));
    }

    #[tokio::test]
    async fn test_ping_without_connection_ignored() {
        let (root, _) = testing::injection(Settings::new());
        let context = testing::request(&root, AgentMessage::new(Ping::default()), None);
        let responder = MockResponder::new();
        PingHandler.handle(&context, &responder).await.unwrap();
        assert!(responder.messages().is_empty());
    }

    #[tokio::test]
    async fn test_ping_without_response_requested() {
        let (root, _) = testing::injection(Settings::new());
        let ping = Ping {
            comment: None,
            response_requested: false,
        };
        let context = testing::request(&root, AgentMessage::new(ping), Some(testing::active_connection()));
        let responder = MockResponder::new();
        PingHandler.handle(&context, &responder).await.unwrap();
        assert!(responder.messages().is_empty());
    }
}
