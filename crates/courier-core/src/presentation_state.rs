use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The states of a presentation exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationExchangeState {
    /// Verifier sent a presentation request.
    RequestSent,
    /// Prover received a presentation request.
    RequestReceived,
    /// Prover sent its presentation.
    PresentationSent,
    /// Verifier received the presentation.
    PresentationReceived,
    /// Verifier checked the presentation. Final state.
    Verified,
    /// The exchange failed. Final state.
    Error,
}

impl PresentationExchangeState {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Verified | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestSent => "request_sent",
            Self::RequestReceived => "request_received",
            Self::PresentationSent => "presentation_sent",
            Self::PresentationReceived => "presentation_received",
            Self::Verified => "verified",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PresentationExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresentationExchangeState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request_sent" => Ok(Self::RequestSent),
            "request_received" => Ok(Self::RequestReceived),
            "presentation_sent" => Ok(Self::PresentationSent),
            "presentation_received" => Ok(Self::PresentationReceived),
            "verified" => Ok(Self::Verified),
            "error" => Ok(Self::Error),
            other => Err(CoreError::ValidationError(format!(
                "invalid presentation exchange state: {}",
                other
            ))),
        }
    }
}

/// Events that advance a presentation exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationExchangeEvent {
    /// Prover answers a request with a presentation.
    SendPresentation,
    /// Verifier receives the presentation for its request.
    ReceivePresentation,
    /// Verifier checks the received presentation.
    Verify,
    /// Processing failed.
    Fail,
}

/// Valid transitions:
/// - RequestReceived → PresentationSent (SendPresentation)
/// - RequestSent → PresentationReceived (ReceivePresentation)
/// - PresentationReceived → Verified (Verify)
/// - any non-final state → Error (Fail)
pub struct PresentationExchangeStateMachine;

impl PresentationExchangeStateMachine {
    pub fn transition(
        current: PresentationExchangeState,
        event: PresentationExchangeEvent,
    ) -> Result<PresentationExchangeState, CoreError> {
        use PresentationExchangeEvent as E;
        use PresentationExchangeState as S;

        let new_state = match (current, event) {
            (S::RequestReceived, E::SendPresentation) => S::PresentationSent,
            (S::RequestSent, E::ReceivePresentation) => S::PresentationReceived,
            (S::PresentationReceived, E::Verify) => S::Verified,
            (state, E::Fail) if !state.is_final() => S::Error,

            _ => {
                let target = match event {
                    E::SendPresentation => S::PresentationSent,
                    E::ReceivePresentation => S::PresentationReceived,
                    E::Verify => S::Verified,
                    E::Fail => S::Error,
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
            "presentation exchange state transition"
        );

        Ok(new_state)
    }

    pub fn can_transition(
        current: PresentationExchangeState,
        event: PresentationExchangeEvent,
    ) -> bool {
        Self::transition(current, event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PresentationExchangeEvent as E;
    use PresentationExchangeState as S;

    #[test]
    fn test_verifier_path() {
        let s = PresentationExchangeStateMachine::transition(S::RequestSent, E::ReceivePresentation)
            .unwrap();
        assert_eq!(s, S::PresentationReceived);
        let s = PresentationExchangeStateMachine::transition(s, E::Verify).unwrap();
        assert_eq!(s, S::Verified);
        assert!(s.is_final());
    }

    #[test]
    fn test_prover_path() {
        let s = PresentationExchangeStateMachine::transition(S::RequestReceived, E::SendPresentation)
            .unwrap();
        assert_eq!(s, S::PresentationSent);
    }

    #[test]
    fn test_cannot_verify_before_presentation() {
        assert!(!PresentationExchangeStateMachine::can_transition(
            S::RequestSent,
            E::Verify
        ));
        assert!(!PresentationExchangeStateMachine::can_transition(
            S::RequestReceived,
            E::ReceivePresentation
        ));
    }

    #[test]
    fn test_fail_only_from_non_final() {
        assert_eq!(
            PresentationExchangeStateMachine::transition(S::PresentationSent, E::Fail).unwrap(),
            S::Error
        );
        assert!(!PresentationExchangeStateMachine::can_transition(S::Verified, E::Fail));
    }

    #[test]
    fn test_state_parse() {
        assert_eq!(
            "presentation_received".parse::<S>().unwrap(),
            S::PresentationReceived
        );
        assert!("done".parse::<S>().is_err());
    }
}
