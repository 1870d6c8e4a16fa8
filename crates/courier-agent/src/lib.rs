//! The runnable Courier agent: configuration, the conductor that
//! wires capabilities and transports together, the admin API, persistent
//! storage, and webhook delivery.

pub mod admin;
pub mod conductor;
pub mod config;
pub mod storage;
pub mod webhook;

pub use conductor::Conductor;
pub use config::AgentConfig;
pub use storage::RocksStorage;
pub use webhook::WebhookDispatcher;
