//! Courier Protocols: Exchange records, protocol managers, message
//! handlers and the inbound dispatch pipeline.

pub mod connection;
pub mod credential;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handlers;
pub mod locks;
pub mod menu;
pub mod presentation;
pub mod records;
pub mod request_context;
pub mod responder;
pub mod routing;

pub use connection::ConnectionManager;
pub use credential::CredentialManager;
pub use delivery::MessageDelivery;
pub use dispatcher::Dispatcher;
pub use error::ProtocolError;
pub use events::{topics, EventHook, RecordingEventHook};
pub use handlers::{handler_for, Handler};
pub use locks::{ExchangeGuard, ExchangeLocks};
pub use menu::{DriverMenuService, MenuService};
pub use presentation::PresentationManager;
pub use records::{
    ConnectionRecord, CredentialExchangeRecord, PresentationExchangeRecord, Record, RecordStore,
    RouteRecord,
};
pub use request_context::RequestContext;
pub use responder::{DispatchResponder, MockResponder, ReplyBindings, Responder};
pub use routing::RoutingManager;
