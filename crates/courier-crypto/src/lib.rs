pub mod did;
pub mod encoding;
pub mod error;
pub mod hashing;
pub mod keys;
pub mod signing;

pub use did::{did_from_verkey, did_from_public_key};
pub use encoding::{b64url_decode, b64url_encode};
pub use error::CryptoError;
pub use hashing::hash;
pub use keys::{seed_from_str, KeyPair, PublicKey};
pub use signing::{sign, verify, verify_with_verkey, Signature};
