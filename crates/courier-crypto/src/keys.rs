use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Ed25519 key pair for signing operations.
/// Private key material is zeroized on drop.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random key pair using OS-provided entropy.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create a key pair from a 32-byte seed.
    /// The seed is used directly as the Ed25519 private key.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Create a key pair from raw bytes (32 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(bytes);
        let kp = Self::from_seed(&seed);
        seed.zeroize();
        Ok(kp)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// The base58 verification key.
    pub fn verkey(&self) -> String {
        self.public_key().to_bs58()
    }

    /// Get the raw private key bytes (32 bytes).
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        let mut secret = self.secret_bytes();
        let kp = Self::from_seed(&secret);
        secret.zeroize();
        kp
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("verkey", &self.verkey())
            .finish_non_exhaustive()
    }
}

/// Turn a wallet seed string into 32 bytes of key material.
///
/// Accepts a 32-character string used verbatim or the base64 encoding of
/// 32 bytes.
pub fn seed_from_str(seed: &str) -> Result<[u8; 32], CryptoError> {
    let mut bytes = if seed.len() == 32 {
        seed.as_bytes().to_vec()
    } else {
        STANDARD
            .decode(seed)
            .map_err(|e| CryptoError::InvalidSeed(format!("not 32 bytes or base64: {}", e)))?
    };
    if bytes.len() != 32 {
        let actual = bytes.len();
        bytes.zeroize();
        return Err(CryptoError::InvalidSeed(format!(
            "seed must decode to 32 bytes, got {}",
            actual
        )));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(out)
}

/// Ed25519 public key for verification operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

impl PublicKey {
    /// Create from raw bytes (32 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        let verifying_key = VerifyingKey::from_bytes(&bytes_arr)
            .map_err(|e| CryptoError::InvalidInput(format!("invalid public key: {}", e)))?;
        Ok(Self { verifying_key })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.verifying_key.as_bytes()
    }

    /// Encode as base58 (the verkey form).
    pub fn to_bs58(&self) -> String {
        bs58::encode(self.as_bytes()).into_string()
    }

    /// Decode from a base58 verkey.
    pub fn from_bs58(bs58_str: &str) -> Result<Self, CryptoError> {
        let bytes = bs58::decode(bs58_str)
            .into_vec()
            .map_err(|e| CryptoError::InvalidEncoding(format!("invalid base58: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_keypair() {
        let kp = KeyPair::generate();
        assert_eq!(kp.public_key().as_bytes().len(), 32);
    }

    #[test]
    fn test_from_seed_deterministic() {
        let seed = [42u8; 32];
        let kp1 = KeyPair::from_seed(&seed);
        let kp2 = KeyPair::from_seed(&seed);
        assert_eq!(kp1.verkey(), kp2.verkey());
    }

    #[test]
    fn test_from_bytes_wrong_length() {
        let result = KeyPair::from_bytes(&[0u8; 16]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_clone_preserves_key() {
        let kp = KeyPair::generate();
        let copy = kp.clone();
        assert_eq!(kp.secret_bytes(), copy.secret_bytes());
    }

    #[test]
    fn test_verkey_bs58_roundtrip() {
        let kp = KeyPair::generate();
        let verkey = kp.verkey();
        let pk = PublicKey::from_bs58(&verkey).unwrap();
        assert_eq!(pk, kp.public_key());
    }

    #[test]
    fn test_from_bs58_invalid() {
        assert!(PublicKey::from_bs58("0OIl").is_err());
        assert!(PublicKey::from_bs58("3mJr7AoUXx2Wqd").is_err());
    }

    #[test]
    fn test_seed_from_plain_string() {
        let seed = seed_from_str("00000000000000000000000000000My1").unwrap();
        assert_eq!(&seed[..], b"00000000000000000000000000000My1");
    }

    #[test]
    fn test_seed_from_base64() {
        let encoded = STANDARD.encode([7u8; 32]);
        assert_eq!(seed_from_str(&encoded).unwrap(), [7u8; 32]);
    }

    #[test]
    fn test_seed_invalid() {
        assert!(seed_from_str("short").is_err());
        assert!(seed_from_str(&STANDARD.encode([1u8; 8])).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let kp = KeyPair::from_seed(&[1u8; 32]);
        let dbg = format!("{:?}", kp);
        assert!(dbg.contains(&kp.verkey()));
    }
}
