//! The agent message envelope and the static type registry.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use uuid::Uuid;

use crate::decorators::{ThreadDecorator, TimingDecorator};
use crate::error::MessageError;
use crate::message_types;
use crate::messages::*;

/// Declares every message variant once: its type URI and its body struct.
macro_rules! agent_messages {
    ($($variant:ident => $uri:expr),+ $(,)?) => {
        /// Every message type this agent can decode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MessageType {
            $($variant),+
        }

        impl MessageType {
            pub const ALL: &'static [MessageType] = &[$(MessageType::$variant),+];

            pub fn uri(self) -> &'static str {
                match self {
                    $(MessageType::$variant => $uri),+
                }
            }
        }

        /// The typed payload of an agent message.
        #[derive(Debug, Clone, PartialEq)]
        pub enum MessageBody {
            $($variant($variant)),+
        }

        impl MessageBody {
            pub fn message_type(&self) -> MessageType {
                match self {
                    $(MessageBody::$variant(_) => MessageType::$variant),+
                }
            }

            pub fn to_value(&self) -> Result<Value, MessageError> {
                Ok(match self {
                    $(MessageBody::$variant(body) => serde_json::to_value(body)?),+
                })
            }

            pub fn from_value(ty: MessageType, value: Value) -> Result<Self, MessageError> {
                Ok(match ty {
                    $(MessageType::$variant => MessageBody::$variant(serde_json::from_value(value)?)),+
                })
            }
        }

        $(
            impl From<$variant> for MessageBody {
                fn from(body: $variant) -> Self {
                    MessageBody::$variant(body)
                }
            }
        )+
    };
}

agent_messages! {
    ConnectionInvitation => message_types::CONNECTION_INVITATION,
    ConnectionRequest => message_types::CONNECTION_REQUEST,
    ConnectionResponse => message_types::CONNECTION_RESPONSE,
    CredentialOffer => message_types::CREDENTIAL_OFFER,
    CredentialRequest => message_types::CREDENTIAL_REQUEST,
    CredentialIssue => message_types::CREDENTIAL_ISSUE,
    PresentationRequest => message_types::PRESENTATION_REQUEST,
    CredentialPresentation => message_types::CREDENTIAL_PRESENTATION,
    RouteUpdateRequest => message_types::ROUTE_UPDATE_REQUEST,
    RouteUpdateResponse => message_types::ROUTE_UPDATE_RESPONSE,
    RouteQueryRequest => message_types::ROUTE_QUERY_REQUEST,
    RouteQueryResponse => message_types::ROUTE_QUERY_RESPONSE,
    Forward => message_types::FORWARD,
    Ping => message_types::PING,
    PingResponse => message_types::PING_RESPONSE,
    BasicMessage => message_types::BASIC_MESSAGE,
    ProblemReport => message_types::PROBLEM_REPORT,
    Menu => message_types::MENU,
    MenuRequest => message_types::MENU_REQUEST,
    Perform => message_types::PERFORM,
}

impl MessageType {
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|ty| ty.uri() == uri)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

impl FromStr for MessageType {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uri(s).ok_or_else(|| MessageError::UnrecognizedMessageType(s.to_string()))
    }
}

/// A DIDComm message: identity, decorators and a typed body.
///
/// Built once and never mutated; the builder methods consume and return.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentMessage {
    id: String,
    thread: Option<ThreadDecorator>,
    timing: Option<TimingDecorator>,
    body: MessageBody,
}

impl AgentMessage {
    pub fn new(body: impl Into<MessageBody>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            thread: None,
            timing: None,
            body: body.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_thread(mut self, thread: ThreadDecorator) -> Self {
        self.thread = Some(thread);
        self
    }

    /// Set `~thread.thid`, keeping any other thread fields.
    pub fn with_thread_id(mut self, thid: impl Into<String>) -> Self {
        let mut thread = self.thread.take().unwrap_or_default();
        thread.thid = Some(thid.into());
        self.thread = Some(thread);
        self
    }

    /// Join the thread `other` belongs to.
    pub fn with_thread_from(self, other: &AgentMessage) -> Self {
        let thid = other.thread_id().to_string();
        self.with_thread_id(thid)
    }

    pub fn with_timing(mut self, timing: TimingDecorator) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn thread(&self) -> Option<&ThreadDecorator> {
        self.thread.as_ref()
    }

    pub fn timing(&self) -> Option<&TimingDecorator> {
        self.timing.as_ref()
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn into_body(self) -> MessageBody {
        self.body
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    pub fn type_uri(&self) -> &'static str {
        self.message_type().uri()
    }

    /// `~thread.thid` when present, otherwise the message's own id.
    pub fn thread_id(&self) -> &str {
        self.thread
            .as_ref()
            .and_then(|t| t.thid.as_deref())
            .unwrap_or(&self.id)
    }

    /// The explicit `~thread.thid`, if any.
    pub fn explicit_thread_id(&self) -> Option<&str> {
        self.thread.as_ref().and_then(|t| t.thid.as_deref())
    }
}
