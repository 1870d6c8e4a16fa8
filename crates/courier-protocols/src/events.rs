//! Outbound notification hook for state changes.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

pub mod topics {
    pub const CONNECTIONS: &str = "connections";
    pub const CREDENTIALS: &str = "credentials";
    pub const PRESENTATIONS: &str = "presentations";
    pub const BASIC_MESSAGES: &str = "basicmessages";
    pub const ACTION_MENU: &str = "actionmenu";
    pub const GET_ACTIVE_MENU: &str = "get-active-menu";
    pub const PERFORM_MENU_ACTION: &str = "perform-menu-action";
}

/// Receives `(topic, payload)` notifications. Implementations must not block.
#[async_trait]
pub trait EventHook: Send + Sync {
    async fn emit(&self, topic: &str, payload: Value);
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventHook {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingEventHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events().into_iter().map(|(topic, _)| topic).collect()
    }
}

#[async_trait]
impl EventHook for RecordingEventHook {
    async fn emit(&self, topic: &str, payload: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push((topic.to_string(), payload));
        }
    }
}
