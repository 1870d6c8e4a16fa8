/// Encode a raw attribute value for credential signing.
///
/// Values that parse as a 32-bit integer encode as themselves; anything else
/// encodes as the decimal of the first 16 bytes of its BLAKE3 hash.
pub fn encode_attribute(raw: &str) -> String {
    if let Ok(n) = raw.trim().parse::<i32>() {
        return n.to_string();
    }
    let digest = courier_crypto::hash(raw.as_bytes());
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(head).to_string()
}
