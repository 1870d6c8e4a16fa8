use crate::keys::PublicKey;
use crate::error::CryptoError;

/// Derive the unqualified DID for a public key: the base58 encoding of
/// the first 16 bytes of the key.
pub fn did_from_public_key(public_key: &PublicKey) -> String {
    bs58::encode(&public_key.as_bytes()[..16]).into_string()
}

/// Derive the unqualified DID for a base58 verkey.
pub fn did_from_verkey(verkey: &str) -> Result<String, CryptoError> {
    let public_key = PublicKey::from_bs58(verkey)?;
    Ok(did_from_public_key(&public_key))
}
