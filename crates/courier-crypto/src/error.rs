/// Cryptographic operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
