use async_trait::async_trait;

use courier_messaging::messages::RouteUpdateResponse;
use courier_messaging::{AgentMessage, MessageBody, OutboundMessage};

use crate::connection::ConnectionManager;
use crate::error::ProtocolError;
use crate::handlers::{unexpected, Handler};
use crate::request_context::RequestContext;
use crate::responder::Responder;
use crate::routing::RoutingManager;

pub struct RouteUpdateRequestHandler;

#[async_trait]
impl Handler for RouteUpdateRequestHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::RouteUpdateRequest(request) = context.message.body() else {
            return Err(unexpected(context));
        };
        let connection = context.require_active_connection()?;
        let updated = RoutingManager::new(&context.injection)?
            .update_routes(&connection.connection_id, &request.updates)
            .await;
        responder
            .send_reply(AgentMessage::new(RouteUpdateResponse { updated }))
            .await
    }
}

pub struct RouteUpdateResponseHandler;

#[async_trait]
impl Handler for RouteUpdateResponseHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        _responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::RouteUpdateResponse(response) = context.message.body() else {
            return Err(unexpected(context));
        };
        context.require_active_connection()?;
        for updated in &response.updated {
            tracing::info!(
                recipient_key = %updated.recipient_key,
                action = ?updated.action,
                result = ?updated.result,
                "route updated by mediator"
            );
        }
        Ok(())
    }
}

pub struct RouteQueryRequestHandler;

#[async_trait]
impl Handler for RouteQueryRequestHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::RouteQueryRequest(query) = context.message.body() else {
            return Err(unexpected(context));
        };
        let connection = context.require_active_connection()?;
        let response = RoutingManager::new(&context.injection)?
            .query_routes(&connection.connection_id, query)
            .await?;
        responder.send_reply(AgentMessage::new(response)).await
    }
}

pub struct RouteQueryResponseHandler;

#[async_trait]
impl Handler for RouteQueryResponseHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        _responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::RouteQueryResponse(response) = context.message.body() else {
            return Err(unexpected(context));
        };
        context.require_active_connection()?;
        tracing::info!(routes = response.routes.len(), "route query answered");
        Ok(())
    }
}

/// Relays a forwarded message to the connection registered for its key.
/// The sender need not have a connection with us.
pub struct ForwardHandler;

#[async_trait]
impl Handler for ForwardHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::Forward(forward) = context.message.body() else {
            return Err(unexpected(context));
        };
        let route = RoutingManager::new(&context.injection)?
            .get_recipient(&forward.to)
            .await?;
        let connections = ConnectionManager::new(&context.injection)?;
        let connection = connections.get_connection(&route.connection_id).await?;
        let target = connections.get_connection_target(&connection).await?;

        tracing::debug!(
            recipient_key = %forward.to,
            connection_id = %route.connection_id,
            "forwarding message"
        );
        responder
            .send_outbound(OutboundMessage {
                payload: serde_json::to_string(&forward.msg)?,
                connection_id: Some(route.connection_id),
                target: Some(target),
                ..Default::default()
            })
            .await
    }
}
