use async_trait::async_trait;

use courier_core::settings::keys;
use courier_core::CoreError;
use courier_messaging::MessageBody;

use crate::credential::CredentialManager;
use crate::error::ProtocolError;
use crate::handlers::{unexpected, Handler};
use crate::request_context::RequestContext;
use crate::responder::Responder;

pub struct OfferHandler;

#[async_trait]
impl Handler for OfferHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::CredentialOffer(offer) = context.message.body() else {
            return Err(unexpected(context));
        };
        let connection = context.require_active_connection()?;
        let manager = CredentialManager::new(&context.injection)?;
        let record = manager
            .receive_offer(offer, context.message.thread_id(), &connection.connection_id)
            .await?;

        if context.settings().get_bool(keys::AUTO_RESPOND_CREDENTIAL_OFFER) {
            let my_did = connection
                .my_did
                .as_deref()
                .ok_or_else(|| CoreError::MissingField("my_did".into()))?;
            let (_, request) = manager
                .send_request(&record.credential_exchange_id, my_did)
                .await?;
            responder.send_reply(request).await?;
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
        let MessageBody::CredentialRequest(request) = context.message.body() else {
            return Err(unexpected(context));
        };
        let connection = context.require_active_connection()?;
        let manager = CredentialManager::new(&context.injection)?;
        let record = manager
            .receive_request(request, &connection.connection_id)
            .await?;

        // Values supplied with the offer mean the issuer already agreed.
        if record.credential_values.is_some() {
            let (_, issue) = manager.issue(&record.credential_exchange_id, None).await?;
            responder.send_reply(issue).await?;
        }
        Ok(())
    }
}

pub struct IssueHandler;

#[async_trait]
impl Handler for IssueHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        _responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::CredentialIssue(issue) = context.message.body() else {
            return Err(unexpected(context));
        };
        let connection = context.require_active_connection()?;
        CredentialManager::new(&context.injection)?
            .store_credential(
                issue,
                context.message.explicit_thread_id(),
                &connection.connection_id,
            )
            .await?;
        Ok(())
    }
}
