use async_trait::async_trait;

use courier_core::settings::keys;
use courier_messaging::MessageBody;

use crate::error::ProtocolError;
use crate::handlers::{unexpected, Handler};
use crate::presentation::PresentationManager;
use crate::request_context::RequestContext;
use crate::responder::Responder;

pub struct RequestHandler;

#[async_trait]
impl Handler for RequestHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        _responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::PresentationRequest(request) = context.message.body() else {
            return Err(unexpected(context));
        };
        let connection = context.require_active_connection()?;
        PresentationManager::new(&context.injection)?
            .receive_request(request, context.message.thread_id(), &connection.connection_id)
            .await?;
        Ok(())
    }
}

pub struct PresentationHandler;

#[async_trait]
impl Handler for PresentationHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        _responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::CredentialPresentation(presentation) = context.message.body() else {
            return Err(unexpected(context));
        };
        let connection = context.require_active_connection()?;
        let manager = PresentationManager::new(&context.injection)?;
        let record = manager
            .receive_presentation(
                &presentation.presentation_value()?,
                &connection.connection_id,
                context.message.thread_id(),
            )
            .await?;

        if context.settings().get_bool(keys::AUTO_VERIFY_PRESENTATION) {
            manager.verify(&record.presentation_exchange_id).await?;
        }
        Ok(())
    }
}
