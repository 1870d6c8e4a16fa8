//! Courier Core: Fundamental types, errors, capability interfaces and
//! the scoped injection context shared by every layer of the agent.

pub mod connection_state;
pub mod credential_state;
pub mod credentials;
pub mod error;
pub mod injection;
pub mod ledger;
pub mod presentation_state;
pub mod settings;
pub mod storage;
pub mod types;
pub mod wallet;

pub use connection_state::{ConnectionEvent, ConnectionState, ConnectionStateMachine};
pub use credential_state::{
    CredentialExchangeEvent, CredentialExchangeState, CredentialExchangeStateMachine,
};
pub use credentials::{CredentialValues, Holder, Issuer, Verifier};
pub use error::CoreError;
pub use injection::{InjectionContext, Injector, Provider, ROOT_SCOPE};
pub use ledger::Ledger;
pub use presentation_state::{
    PresentationExchangeEvent, PresentationExchangeState, PresentationExchangeStateMachine,
};
pub use settings::Settings;
pub use storage::{tag_filter, Storage, StorageRecord, TagFilter, Tags};
pub use types::{Did, Initiator};
pub use wallet::{DidInfo, KeyInfo, PairwiseInfo, Wallet};
