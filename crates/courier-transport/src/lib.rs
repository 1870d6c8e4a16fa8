//! Courier Transport: Inbound listeners that hand raw payloads to the
//! agent, and the outbound queue that delivers addressed messages.

pub mod error;
pub mod inbound;
pub mod outbound;
pub mod sockets;

pub use error::TransportError;
pub use inbound::{InboundTransport, InboundTransportManager, MessageHandler};
pub use outbound::{OutboundConfig, OutboundTransport, OutboundTransportManager};
pub use sockets::SocketRegistry;
