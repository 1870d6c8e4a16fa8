//! Action menus: the menu a peer offered us, and the service that answers
//! menu requests from peers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use courier_core::{Storage, StorageRecord};
use courier_messaging::messages::{Menu, Perform};
use courier_messaging::AgentMessage;

use crate::error::ProtocolError;
use crate::events::{topics, EventHook};
use crate::records::ConnectionRecord;

/// Menus received from peers, keyed by connection id.
pub const ACTION_MENU: &str = "action_menu";

/// Answers menu requests and performs menu actions for peers.
#[async_trait]
pub trait MenuService: Send + Sync {
    /// The menu to show a connection, if any.
    async fn get_active_menu(
        &self,
        connection: &ConnectionRecord,
        thread_id: &str,
    ) -> Result<Option<Menu>, ProtocolError>;

    /// Run a menu action. The result, if any, is sent back as a reply.
    async fn perform_menu_action(
        &self,
        connection: &ConnectionRecord,
        action: &Perform,
        thread_id: &str,
    ) -> Result<Option<AgentMessage>, ProtocolError>;
}

/// Hands menu traffic to an external controller through events and
/// answers nothing itself.
pub struct DriverMenuService {
    events: Arc<dyn EventHook>,
}

impl DriverMenuService {
    pub fn new(events: Arc<dyn EventHook>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl MenuService for DriverMenuService {
    async fn get_active_menu(
        &self,
        connection: &ConnectionRecord,
        thread_id: &str,
    ) -> Result<Option<Menu>, ProtocolError> {
        self.events
            .emit(
                topics::GET_ACTIVE_MENU,
                json!({
                    "connection_id": connection.connection_id,
                    "thread_id": thread_id,
                }),
            )
            .await;
        Ok(None)
    }

    async fn perform_menu_action(
        &self,
        connection: &ConnectionRecord,
        action: &Perform,
        thread_id: &str,
    ) -> Result<Option<AgentMessage>, ProtocolError> {
        self.events
            .emit(
                topics::PERFORM_MENU_ACTION,
                json!({
                    "connection_id": connection.connection_id,
                    "thread_id": thread_id,
                    "action_name": action.name,
                    "action_params": action.params,
                }),
            )
            .await;
        Ok(None)
    }
}

/// Keep the latest menu a connection offered us.
pub async fn save_connection_menu(
    storage: &dyn Storage,
    connection_id: &str,
    menu: &Menu,
) -> Result<(), ProtocolError> {
    storage
        .save_record(
            StorageRecord::new(ACTION_MENU, serde_json::to_string(menu)?)
                .with_id(connection_id)
                .with_tag("connection_id", connection_id),
        )
        .await?;
    Ok(())
}

pub async fn retrieve_connection_menu(
    storage: &dyn Storage,
    connection_id: &str,
) -> Result<Option<Menu>, ProtocolError> {
    match storage.get_record(ACTION_MENU, connection_id).await {
        Ok(record) => Ok(Some(serde_json::from_str(&record.value)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}
