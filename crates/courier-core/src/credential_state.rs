use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The states of a credential exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialExchangeState {
    /// Issuer sent an offer.
    OfferSent,
    /// Holder received an offer.
    OfferReceived,
    /// Holder sent a credential request.
    RequestSent,
    /// Issuer received a credential request.
    RequestReceived,
    /// Credential was issued (issuer) or received (holder).
    Issued,
    /// Holder stored the credential in its wallet. Final state.
    Stored,
    /// The exchange failed. Final state.
    Error,
}

impl CredentialExchangeState {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Stored | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OfferSent => "offer_sent",
            Self::OfferReceived => "offer_received",
            Self::RequestSent => "request_sent",
            Self::RequestReceived => "request_received",
            Self::Issued => "issued",
            Self::Stored => "stored",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CredentialExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialExchangeState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offer_sent" => Ok(Self::OfferSent),
            "offer_received" => Ok(Self::OfferReceived),
            "request_sent" => Ok(Self::RequestSent),
            "request_received" => Ok(Self::RequestReceived),
            "issued" => Ok(Self::Issued),
            "stored" => Ok(Self::Stored),
            "error" => Ok(Self::Error),
            other => Err(CoreError::ValidationError(format!(
                "invalid credential exchange state: {}",
                other
            ))),
        }
    }
}

/// Events that advance a credential exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialExchangeEvent {
    /// Holder answers an offer with a request.
    SendRequest,
    /// Issuer receives the request for its offer.
    ReceiveRequest,
    /// Issuer issues the credential.
    Issue,
    /// Holder receives the issued credential.
    ReceiveCredential,
    /// Holder stores the received credential.
    Store,
    /// Processing failed.
    Fail,
}

/// Valid transitions:
/// - OfferReceived → RequestSent (SendRequest)
/// - OfferSent → RequestReceived (ReceiveRequest)
/// - RequestReceived → Issued (Issue)
/// - RequestSent → Issued (ReceiveCredential)
/// - Issued → Stored (Store)
/// - any non-final state → Error (Fail)
pub struct CredentialExchangeStateMachine;

impl CredentialExchangeStateMachine {
    pub fn transition(
        current: CredentialExchangeState,
        event: CredentialExchangeEvent,
    ) -> Result<CredentialExchangeState, CoreError> {
        use CredentialExchangeEvent as E;
        use CredentialExchangeState as S;

        let new_state = match (current, event) {
            (S::OfferReceived, E::SendRequest) => S::RequestSent,
            (S::OfferSent, E::ReceiveRequest) => S::RequestReceived,
            (S::RequestReceived, E::Issue) => S::Issued,
            (S::RequestSent, E::ReceiveCredential) => S::Issued,
            (S::Issued, E::Store) => S::Stored,
            (state, E::Fail) if !state.is_final() => S::Error,

            _ => {
                let target = match event {
                    E::SendRequest => S::RequestSent,
                    E::ReceiveRequest => S::RequestReceived,
                    E::Issue | E::ReceiveCredential => S::Issued,
                    E::Store => S::Stored,
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
            "credential exchange state transition"
        );

        Ok(new_state)
    }

    pub fn can_transition(current: CredentialExchangeState, event: CredentialExchangeEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
