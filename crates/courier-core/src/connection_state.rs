use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The states of a pairwise connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// An invitation has been created or received.
    Invitation,
    /// A connection request has been sent or received.
    Request,
    /// The inviter has answered the request.
    Response,
    /// Both sides hold the pairwise relationship. Final state.
    Active,
    /// The connection was abandoned before completing.
    Inactive,
    /// The connection failed. Final state.
    Error,
}

impl ConnectionState {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Active | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invitation => "invitation",
            Self::Request => "request",
            Self::Response => "response",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invitation" => Ok(Self::Invitation),
            "request" => Ok(Self::Request),
            "response" => Ok(Self::Response),
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "error" => Ok(Self::Error),
            other => Err(CoreError::ValidationError(format!(
                "invalid connection state: {}",
                other
            ))),
        }
    }
}

/// Events that move a connection between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection request was sent (invitee) or received (inviter).
    Request,
    /// The inviter sent its connection response.
    Respond,
    /// The invitee accepted the inviter's response.
    Accept,
    /// The inviter received the first message over the new connection.
    Complete,
    /// The connection was abandoned.
    Deactivate,
    /// Processing failed.
    Fail,
}

/// Valid transitions:
/// - Invitation → Request (Request)
/// - Request → Response (Respond)
/// - Request → Active (Accept)
/// - Response → Active (Complete)
/// - Invitation | Request | Response → Inactive (Deactivate)
/// - Invitation | Request | Response → Error (Fail)
pub struct ConnectionStateMachine;

impl ConnectionStateMachine {
    pub fn transition(
        current: ConnectionState,
        event: ConnectionEvent,
    ) -> Result<ConnectionState, CoreError> {
        use ConnectionState as S;

        let new_state = match (current, event) {
            (S::Invitation, ConnectionEvent::Request) => S::Request,

            (S::Request, ConnectionEvent::Respond) => S::Response,
            (S::Request, ConnectionEvent::Accept) => S::Active,

            (S::Response, ConnectionEvent::Complete) => S::Active,

            (S::Invitation | S::Request | S::Response, ConnectionEvent::Deactivate) => S::Inactive,
            (S::Invitation | S::Request | S::Response, ConnectionEvent::Fail) => S::Error,

            _ => {
                let target = match event {
                    ConnectionEvent::Request => S::Request,
                    ConnectionEvent::Respond => S::Response,
                    ConnectionEvent::Accept | ConnectionEvent::Complete => S::Active,
                    ConnectionEvent::Deactivate => S::Inactive,
                    ConnectionEvent::Fail => S::Error,
                };
                return Err(CoreError::InvalidStateTransition {
                    from: current.to_string(),
                    to: target.to_string(),
                });
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = ?event,
            "connection state transition"
        );

        Ok(new_state)
    }

    pub fn can_transition(current: ConnectionState, event: ConnectionEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
