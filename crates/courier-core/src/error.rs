/// Core agent errors, shared by every capability interface.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("resolution error: {0}")]
    ResolutionError(String),

    #[error("scope error: {0}")]
    ScopeError(String),

    #[error("record not found: {0}")]
    StorageNotFound(String),

    #[error("duplicate record: {0}")]
    StorageDuplicate(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("wallet item not found: {0}")]
    WalletNotFound(String),

    #[error("duplicate wallet item: {0}")]
    WalletDuplicate(String),

    #[error("wallet error: {0}")]
    WalletError(String),

    #[error("ledger error: {0}")]
    LedgerError(String),

    #[error("issuer error: {0}")]
    IssuerError(String),

    #[error("holder error: {0}")]
    HolderError(String),

    #[error("verifier error: {0}")]
    VerifierError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether this error reports a missing storage record or wallet item.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StorageNotFound(_) | Self::WalletNotFound(_))
    }

    /// Whether this error reports a duplicate storage record or wallet item.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::StorageDuplicate(_) | Self::WalletDuplicate(_))
    }
}
