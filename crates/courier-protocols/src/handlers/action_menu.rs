use async_trait::async_trait;
use serde_json::json;

use courier_core::Storage;
use courier_messaging::{AgentMessage, MessageBody};

use crate::error::ProtocolError;
use crate::events::topics;
use crate::handlers::{emit, unexpected, Handler};
use crate::menu::{save_connection_menu, MenuService};
use crate::request_context::RequestContext;
use crate::responder::Responder;

/// Stores the menu a peer offered us.
pub struct MenuHandler;

#[async_trait]
impl Handler for MenuHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        _responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::Menu(menu) = context.message.body() else {
            return Err(unexpected(context));
        };
        let connection = context.require_active_connection()?;
        let storage = context.injection.inject::<dyn Storage>()?;
        save_connection_menu(storage.as_ref(), &connection.connection_id, menu).await?;
        emit(
            context,
            topics::ACTION_MENU,
            json!({"connection_id": connection.connection_id, "menu": menu}),
        )
        .await
    }
}

pub struct MenuRequestHandler;

#[async_trait]
impl Handler for MenuRequestHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::MenuRequest(_) = context.message.body() else {
            return Err(unexpected(context));
        };
        let connection = context.require_active_connection()?;
        let Some(service) = context.injection.inject_optional::<dyn MenuService>()? else {
            tracing::debug!(connection_id = %connection.connection_id, "no menu service bound");
            return Ok(());
        };
        if let Some(menu) = service
            .get_active_menu(connection, context.message.thread_id())
            .await?
        {
            responder.send_reply(AgentMessage::new(menu)).await?;
        }
        Ok(())
    }
}

pub struct PerformHandler;

#[async_trait]
impl Handler for PerformHandler {
    async fn handle(
        &self,
        context: &RequestContext,
        responder: &dyn Responder,
    ) -> Result<(), ProtocolError> {
        let MessageBody::Perform(action) = context.message.body() else {
            return Err(unexpected(context));
        };
        let connection = context.require_active_connection()?;
        let Some(service) = context.injection.inject_optional::<dyn MenuService>()? else {
            tracing::debug!(connection_id = %connection.connection_id, "no menu service bound");
            return Ok(());
        };
        if let Some(reply) = service
            .perform_menu_action(connection, action, context.message.thread_id())
            .await?
        {
            responder.send_reply(reply).await?;
        }
        Ok(())
    }
}
