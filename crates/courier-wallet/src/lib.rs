//! Courier Wallet: In-memory implementations of the agent's capability
//! traits: wallet, record storage, ledger, and an Ed25519-signed JSON
//! credential scheme for issuer, holder and verifier.

pub mod credential;
pub mod encoding;
pub mod holder;
pub mod issuer;
pub mod ledger;
pub mod storage;
pub mod verifier;
pub mod wallet;

pub use encoding::encode_attribute;
pub use holder::BasicHolder;
pub use issuer::BasicIssuer;
pub use ledger::BasicLedger;
pub use storage::BasicStorage;
pub use verifier::BasicVerifier;
pub use wallet::BasicWallet;
