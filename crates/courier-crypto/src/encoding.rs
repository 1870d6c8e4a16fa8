use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::error::CryptoError;

/// Encode bytes as padded base64url.
pub fn b64url_encode(data: &[u8]) -> String {
    URL_SAFE.encode(data)
}

/// Decode base64url, with or without padding.
pub fn b64url_decode(data: &str) -> Result<Vec<u8>, CryptoError> {
    let trimmed = data.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|e| CryptoError::InvalidEncoding(format!("invalid base64url: {}", e)))
}
