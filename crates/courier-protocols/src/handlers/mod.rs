//! Message handlers, one per message type.
//!
//! Handlers are stateless; everything they need comes from the request
//! context and its injection scope.

use async_trait::async_trait;
use serde_json::Value;

use courier_messaging::MessageType;

use crate::error::ProtocolError;
use crate::events::EventHook;
use crate::request_context::RequestContext;
use crate::responder::Responder;

pub mod action_menu;
pub mod basicmessage;
pub mod connections;
pub mod credentials;
pub mod presentations;
pub mod problem_report;
pub mod routing;
pub mod trustping;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        context: &RequestContext,
        responder: &dyn Responder,
    ) -> Result<(), ProtocolError>;
}

/// The handler registered for a message type.
pub fn handler_for(message_type: MessageType) -> &'static dyn Handler {
    use MessageType as T;
    match message_type {
        T::ConnectionInvitation => &connections::InvitationHandler,
        T::ConnectionRequest => &connections::RequestHandler,
        T::ConnectionResponse => &connections::ResponseHandler,
        T::CredentialOffer => &credentials::OfferHandler,
        T::CredentialRequest => &credentials::RequestHandler,
        T::CredentialIssue => &credentials::IssueHandler,
        T::PresentationRequest => &presentations::RequestHandler,
        T::CredentialPresentation => &presentations::PresentationHandler,
        T::RouteUpdateRequest => &routing::RouteUpdateRequestHandler,
        T::RouteUpdateResponse => &routing::RouteUpdateResponseHandler,
        T::RouteQueryRequest => &routing::RouteQueryRequestHandler,
        T::RouteQueryResponse => &routing::RouteQueryResponseHandler,
        T::Forward => &routing::ForwardHandler,
        T::Ping => &trustping::PingHandler,
        T::PingResponse => &trustping::PingResponseHandler,
        T::BasicMessage => &basicmessage::BasicMessageHandler,
        T::ProblemReport => &problem_report::ProblemReportHandler,
        T::Menu => &action_menu::MenuHandler,
        T::MenuRequest => &action_menu::MenuRequestHandler,
        T::Perform => &action_menu::PerformHandler,
    }
}

/// The handler was given a message of another type.
fn unexpected(context: &RequestContext) -> ProtocolError {
    ProtocolError::Handler(format!(
        "handler received unexpected message {}",
        context.message.type_uri()
    ))
}

/// Emit through the event hook bound in scope, if any.
async fn emit(context: &RequestContext, topic: &str, payload: Value) -> Result<(), ProtocolError> {
    if let Some(events) = context.injection.inject_optional::<dyn EventHook>()? {
        events.emit(topic, payload).await;
    }
    Ok(())
}
