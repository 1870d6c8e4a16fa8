use async_trait::async_trait;
use serde_json::json;

use courier_messaging::messages::BasicMessage;
use courier_messaging::{AgentMessage, MessageBody};

use crate::error::ProtocolError;
use crate::events::topics;
use crate::handlers::{emit, unexpected, Handler};
use crate::request_context::RequestContext;
use crate::responder::Responder;

pub struct BasicMessageHandler;

#[async_trait]
impl Handler for BasicMessageHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::BasicMessage(message) = context.message.body() else {
            return Err(unexpected(context));
        };
        let connection = context.require_active_connection()?;
        tracing::info!(connection_id = %connection.connection_id, "basic message received");
        emit(
            context,
            topics::BASIC_MESSAGES,
            json!({
                "connection_id": connection.connection_id,
                "message_id": context.message.id(),
                "content": message.content,
                "sent_time": message.sent_time,
            }),
        )
        .await?;

        if let Some(reply) = message.requested_reply() {
            responder
                .send_reply(AgentMessage::new(BasicMessage::new(reply)))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing;
    use crate::responder::MockResponder;
    use courier_core::Settings;

    #[tokio::test]
    async fn test_message_emitted() {
        let (root, hook) = testing::injection(Settings::new());
        let connection = testing::active_connection();
        let context = testing::request(
            &root,
            AgentMessage::new(BasicMessage::new("hello")),
            Some(connection.clone()),
        );
        let responder = MockResponder::new();
        BasicMessageHandler.handle(&context, &responder).await.unwrap();

        let events = hook.events();
        assert_eq!(events[0].0, "basicmessages");
        assert_eq!(events[0].1["content"], "hello");
        assert_eq!(events[0].1["connection_id"], connection.connection_id.as_str());
        assert!(responder.messages().is_empty());
    }

    #[tokio::test]
    async fn test_requested_reply_echoed() {
        let (root, _) = testing::injection(Settings::new());
        let context = testing::request(
            &root,
            AgentMessage::new(BasicMessage::new("Reply with: pong")),
            Some(testing::active_connection()),
        );
        let responder = MockResponder::new();
        BasicMessageHandler.handle(&context, &responder).await.unwrap();
        let sent = responder.sent();
        let MessageBody::BasicMessage(reply) = sent[0].body() else {
            panic!("expected basic message");
        };
        assert_eq!(reply.content, "pong");
    }
}
