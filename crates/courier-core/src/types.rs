use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Method prefix applied when a bare DID is qualified.
pub const DID_SOV_PREFIX: &str = "did:sov:";

/// Decentralized Identifier held in its unqualified base58 form.
///
/// Pairwise DIDs travel unqualified in connection details and qualified
/// (`did:sov:<identifier>`) inside DID documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Did(pub String);

impl Did {
    /// Create a DID from either the bare identifier or a `did:sov:` URI.
    pub fn new(value: &str) -> Result<Self, CoreError> {
        let identifier = value.strip_prefix(DID_SOV_PREFIX).unwrap_or(value);
        if identifier.is_empty() {
            return Err(CoreError::ValidationError("DID must not be empty".into()));
        }
        if identifier.contains(':') {
            return Err(CoreError::ValidationError(format!(
                "unsupported DID method: {}",
                value
            )));
        }
        Ok(Self(identifier.to_string()))
    }

    /// The bare identifier.
    pub fn unqualified(&self) -> &str {
        &self.0
    }

    /// The `did:sov:` URI form.
    pub fn qualified(&self) -> String {
        format!("{}{}", DID_SOV_PREFIX, self.0)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which party started an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initiator {
    /// This agent created the first message.
    #[serde(rename = "self")]
    Local,
    /// The peer created the first message.
    External,
}

impl Initiator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "self",
            Self::External => "external",
        }
    }
}

impl fmt::Display for Initiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
