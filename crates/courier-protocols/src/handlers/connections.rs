use async_trait::async_trait;

use courier_core::settings::keys;
use courier_messaging::messages::Ping;
use courier_messaging::{AgentMessage, MessageBody};

use crate::connection::ConnectionManager;
use crate::error::ProtocolError;
use crate::handlers::{unexpected, Handler};
use crate::request_context::RequestContext;
use crate::responder::{ReplyBindings, Responder};

pub struct InvitationHandler;

#[async_trait]
impl Handler for InvitationHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::ConnectionInvitation(invitation) = context.message.body() else {
            return Err(unexpected(context));
        };
        let manager = ConnectionManager::new(&context.injection)?;
        let record = manager.receive_invitation(invitation).await?;

        if context.settings().get_bool(keys::ACCEPT_INVITES) {
            let (record, request, target) = manager.accept_invitation(&record.connection_id).await?;
            responder
                .send(request, ReplyBindings::for_target(record.connection_id, target))
                .await?;
        }
        Ok(())
    }
}

pub struct RequestHandler;

#[async_trait]
impl Handler for RequestHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::ConnectionRequest(request) = context.message.body() else {
            return Err(unexpected(context));
        };
        let manager = ConnectionManager::new(&context.injection)?;
        let record = manager
            .receive_request(request, context.message.id(), &context.delivery)
            .await?;

        if context.settings().get_bool(keys::ACCEPT_REQUESTS) {
            let (record, response, target) = manager.accept_request(&record.connection_id).await?;
            let bindings = ReplyBindings {
                reply_socket_id: context.delivery.socket_id.clone(),
                ..ReplyBindings::for_target(record.connection_id, target)
            };
            responder.send(response, bindings).await?;
        }
        Ok(())
    }
}

pub struct ResponseHandler;

#[async_trait]
impl Handler for ResponseHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::ConnectionResponse(response) = context.message.body() else {
            return Err(unexpected(context));
        };
        let manager = ConnectionManager::new(&context.injection)?;
        let (record, target) = manager
            .accept_response(response, context.message.explicit_thread_id())
            .await?;

        // The inviter completes its side on the first message it receives.
        // The ping opens its own thread instead of continuing the handshake.
        let ping = AgentMessage::new(Ping {
            comment: None,
            response_requested: false,
        });
        let own_thread = ping.id().to_string();
        let ping = ping.with_thread_id(own_thread);
        responder
            .send(ping, ReplyBindings::for_target(record.connection_id, target))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::MessageDelivery;
    use crate::handlers::testing;
    use crate::responder::MockResponder;
    use courier_core::{ConnectionState, Settings, TagFilter};
    use courier_messaging::MessageType;

    #[tokio::test]
    async fn test_invitation_auto_accepted() {
        let settings = Settings::new()
            .with(keys::ACCEPT_INVITES, true)
            .with(keys::DEFAULT_ENDPOINT, "http://bob");
        let (root, _) = testing::injection(settings);
        let invitation = courier_messaging::messages::ConnectionInvitation::with_keys(
            "Alice",
            vec!["ALICEKEY".into()],
            "http://alice",
        );
        let context = testing::request(&root, AgentMessage::new(invitation), None);
        let responder = MockResponder::new();
        InvitationHandler.handle(&context, &responder).await.unwrap();

        let sent = responder.sent();
        assert_eq!(sent[0].message_type(), MessageType::ConnectionRequest);
        let messages = responder.messages();
        assert_eq!(messages[0].endpoint(), Some("http://alice"));

        let connections = ConnectionManager::new(&root)
            .unwrap()
            .list_connections(&TagFilter::new())
            .await
            .unwrap();
        assert_eq!(connections[0].state, ConnectionState::Request);
    }

    #[tokio::test]
    async fn test_invitation_kept_without_auto_accept() {
        let (root, hook) = testing::injection(Settings::new());
        let invitation = courier_messaging::messages::ConnectionInvitation::with_keys(
            "Alice",
            vec!["ALICEKEY".into()],
            "http://alice",
        );
        let context = testing::request(&root, AgentMessage::new(invitation), None);
        let responder = MockResponder::new();
        InvitationHandler.handle(&context, &responder).await.unwrap();
        assert!(responder.messages().is_empty());
        assert_eq!(hook.topics(), vec!["connections"]);
    }

    #[tokio::test]
    async fn test_handshake_through_handlers() {
        let alice_settings = Settings::new()
            .with(keys::DEFAULT_ENDPOINT, "http://alice")
            .with(keys::ACCEPT_REQUESTS, true);
        let (alice, _) = testing::injection(alice_settings);
        let (bob, _) = testing::injection(Settings::new().with(keys::DEFAULT_ENDPOINT, "http://bob"));
        let alice_manager = ConnectionManager::new(&alice).unwrap();
        let bob_manager = ConnectionManager::new(&bob).unwrap();

        let (_, invitation) = alice_manager.create_invitation(None, None, None).await.unwrap();
        let bob_record = bob_manager.receive_invitation(&invitation).await.unwrap();
        let (_, request, _) = bob_manager
            .accept_invitation(&bob_record.connection_id)
            .await
            .unwrap();

        let delivery = MessageDelivery::new("http").with_recipient(invitation.invitation_key().unwrap());
        let context = RequestContext::new(&alice, request, delivery, None).unwrap();
        let alice_out = MockResponder::new();
        RequestHandler.handle(&context, &alice_out).await.unwrap();
        let response = alice_out.sent().remove(0);
        assert_eq!(response.message_type(), MessageType::ConnectionResponse);

        let handshake_thread = response.thread_id().to_string();
        let context = testing::request(&bob, response, None);
        let bob_out = MockResponder::with_bindings(ReplyBindings {
            reply_thread_id: Some(handshake_thread.clone()),
            ..Default::default()
        });
        ResponseHandler.handle(&context, &bob_out).await.unwrap();
        let ping = bob_out.sent().remove(0);
        assert_eq!(ping.message_type(), MessageType::Ping);
        assert_eq!(ping.explicit_thread_id(), Some(ping.id()));
        assert_ne!(ping.thread_id(), handshake_thread);
        assert_eq!(
            bob_manager.get_connection(&bob_record.connection_id).await.unwrap().state,
            ConnectionState::Active
        );
    }
}
