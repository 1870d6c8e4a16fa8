/// BLAKE3 hash (32 bytes).
pub type Hash = [u8; 32];

/// Hash arbitrary data using BLAKE3.
pub fn hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash(b"courier"), hash(b"courier"));
        assert_ne!(hash(b"courier"), hash(b"Courier"));
    }

    #[test]
    fn test_hash_length() {
        assert_eq!(hash(b"").len(), 32);
    }
}
