pub mod decorators;
pub mod envelope;
pub mod error;
pub mod factory;
pub mod message;
pub mod message_types;
pub mod messages;
pub mod outbound;

pub use decorators::{SignatureDecorator, ThreadDecorator, TimingDecorator};
pub use envelope::{TransportEnvelope, Unpacked};
pub use error::MessageError;
pub use factory::MessageFactory;
pub use message::{AgentMessage, MessageBody, MessageType};
pub use outbound::{ConnectionTarget, OutboundMessage};
