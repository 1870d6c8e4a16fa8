//! The signed JSON credential format shared by issuer, holder and verifier.

use serde_json::Value;

use courier_core::CoreError;
use courier_crypto::{b64url_decode, verify_with_verkey};

pub const SIGNATURE_FIELD: &str = "signature";

/// Bytes covered by a credential signature: the credential without its
/// signature field, serialized with sorted keys.
pub fn signing_payload(credential: &Value) -> Result<Vec<u8>, CoreError> {
    let mut unsigned = credential.clone();
    if let Value::Object(map) = &mut unsigned {
        map.remove(SIGNATURE_FIELD);
    }
    Ok(serde_json::to_vec(&unsigned)?)
}

/// The verkey published in a credential definition.
pub fn definition_verkey(credential_definition: &Value) -> Option<&str> {
    credential_definition
        .get("value")
        .and_then(|v| v.get("verkey"))
        .and_then(Value::as_str)
}

/// Check a credential's signature against its definition's verkey.
pub fn signature_valid(credential: &Value, credential_definition: &Value) -> bool {
    let (Some(verkey), Some(signature)) = (
        definition_verkey(credential_definition),
        credential.get(SIGNATURE_FIELD).and_then(Value::as_str),
    ) else {
        return false;
    };
    let Ok(signature) = b64url_decode(signature) else {
        return false;
    };
    match signing_payload(credential) {
        Ok(payload) => verify_with_verkey(&payload, &signature, verkey).is_ok(),
        Err(_) => false,
    }
}

/// The raw value of attribute `name` in a credential.
pub fn raw_value<'a>(credential: &'a Value, name: &str) -> Option<&'a str> {
    credential
        .get("values")
        .and_then(|v| v.get(name))
        .and_then(|v| v.get("raw"))
        .and_then(Value::as_str)
}

pub fn encoded_value<'a>(credential: &'a Value, name: &str) -> Option<&'a str> {
    credential
        .get("values")
        .and_then(|v| v.get(name))
        .and_then(|v| v.get("encoded"))
        .and_then(Value::as_str)
}

/// Evaluate a predicate such as `age >= 18` against an encoded value.
pub fn predicate_holds(encoded: &str, p_type: &str, p_value: i64) -> Result<bool, CoreError> {
    let value: i64 = encoded
        .parse()
        .map_err(|_| CoreError::ValidationError(format!("not a numeric attribute: {}", encoded)))?;
    match p_type {
        ">=" => Ok(value >= p_value),
        ">" => Ok(value > p_value),
        "<=" => Ok(value <= p_value),
        "<" => Ok(value < p_value),
        other => Err(CoreError::ValidationError(format!("unsupported predicate: {}", other))),
    }
}
