//! Connection protocol messages: invitation, request and response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use courier_core::{Did, Wallet};
use courier_crypto::{b64url_decode, b64url_encode};

use crate::decorators::SignatureDecorator;
use crate::error::MessageError;
use crate::message_types::CONNECTION_INVITATION;

const DID_CONTEXT: &str = "https://w3id.org/did/v1";
const ED25519_KEY_TYPE: &str = "Ed25519VerificationKey2018";
const ED25519_AUTH_TYPE: &str = "Ed25519SignatureAuthentication2018";
const AGENT_SERVICE_TYPE: &str = "IndyAgent";

/// Invitation to connect, shared out of band or as a `c_i` URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInvitation {
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(
        rename = "recipientKeys",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub recipient_keys: Option<Vec<String>>,
    #[serde(
        rename = "serviceEndpoint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub endpoint: Option<String>,
    #[serde(
        rename = "routingKeys",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub routing_keys: Option<Vec<String>>,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ConnectionInvitation {
    /// An invitation addressed by key and endpoint.
    pub fn with_keys(
        label: impl Into<String>,
        recipient_keys: Vec<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            recipient_keys: Some(recipient_keys),
            endpoint: Some(endpoint.into()),
            ..Default::default()
        }
    }

    /// A `did` invitation excludes keys and endpoint; otherwise both are
    /// required.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.did.is_some() {
            if self.recipient_keys.is_some() || self.endpoint.is_some() {
                return Err(MessageError::InvalidInvitation(
                    "a did invitation must not carry recipientKeys or serviceEndpoint".into(),
                ));
            }
            return Ok(());
        }
        match (&self.recipient_keys, &self.endpoint) {
            (Some(keys), Some(_)) if !keys.is_empty() => Ok(()),
            (Some(_), Some(_)) => Err(MessageError::InvalidInvitation(
                "recipientKeys must not be empty".into(),
            )),
            _ => Err(MessageError::InvalidInvitation(
                "recipientKeys and serviceEndpoint are required without a did".into(),
            )),
        }
    }

    /// The first recipient key, which identifies the invitation.
    pub fn invitation_key(&self) -> Option<&str> {
        self.recipient_keys
            .as_ref()
            .and_then(|keys| keys.first())
            .map(String::as_str)
    }

    /// Serialize as the wire envelope, `@type` included.
    pub fn to_envelope(&self, id: &str) -> Result<Value, MessageError> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(ref mut map) = value {
            map.insert("@type".into(), Value::String(CONNECTION_INVITATION.into()));
            map.insert("@id".into(), Value::String(id.into()));
        }
        Ok(value)
    }

    /// Render as `base?c_i=<base64url(envelope)>`.
    pub fn to_url(&self, base: &str, id: &str) -> Result<String, MessageError> {
        let envelope = serde_json::to_vec(&self.to_envelope(id)?)?;
        let mut url = url::Url::parse(base)
            .map_err(|e| MessageError::InvalidInvitation(format!("invalid base url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("c_i", &b64url_encode(&envelope));
        Ok(url.to_string())
    }

    /// Extract the raw envelope carried by a `c_i` invitation URL.
    pub fn envelope_from_url(invitation_url: &str) -> Result<Value, MessageError> {
        let url = url::Url::parse(invitation_url)
            .map_err(|e| MessageError::InvalidInvitation(format!("invalid url: {}", e)))?;
        let encoded = url
            .query_pairs()
            .find(|(k, _)| k == "c_i")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| MessageError::InvalidInvitation("url has no c_i parameter".into()))?;
        Self::envelope_from_param(&encoded)
    }

    /// Decode the value of a `c_i` query parameter.
    pub fn envelope_from_param(encoded: &str) -> Result<Value, MessageError> {
        let bytes = b64url_decode(encoded)?;
        let value: Value = serde_json::from_slice(&bytes)?;
        match value.get("@type").and_then(Value::as_str) {
            Some(CONNECTION_INVITATION) => Ok(value),
            Some(other) => Err(MessageError::InvalidInvitation(format!(
                "unexpected message type in invitation url: {}",
                other
            ))),
            None => Err(MessageError::MissingType),
        }
    }

    /// Parse an invitation URL back into an invitation.
    pub fn from_url(invitation_url: &str) -> Result<Self, MessageError> {
        let envelope = Self::envelope_from_url(invitation_url)?;
        let invitation: Self = serde_json::from_value(envelope)?;
        invitation.validate()?;
        Ok(invitation)
    }
}

/// A verification key entry of a DID document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub key_type: String,
    pub controller: String,
    #[serde(rename = "publicKeyBase58")]
    pub public_key_base58: String,
}

/// An authentication reference of a DID document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationEntry {
    #[serde(rename = "type")]
    pub auth_type: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// A service endpoint of a DID document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "recipientKeys", default)]
    pub recipient_keys: Vec<String>,
    #[serde(rename = "routingKeys", default)]
    pub routing_keys: Vec<String>,
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

/// DID document exchanged while establishing a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidDoc {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "publicKey", default)]
    pub public_key: Vec<PublicKeyEntry>,
    #[serde(default)]
    pub authentication: Vec<AuthenticationEntry>,
    #[serde(default)]
    pub service: Vec<ServiceEntry>,
}

impl DidDoc {
    /// Build a document with one Ed25519 key and one agent service.
    pub fn new(did: &Did, verkey: &str, endpoint: &str, routing_keys: Vec<String>) -> Self {
        let qualified = did.qualified();
        let key_id = format!("{}#keys-1", qualified);
        Self {
            context: DID_CONTEXT.to_string(),
            id: qualified.clone(),
            public_key: vec![PublicKeyEntry {
                id: key_id.clone(),
                key_type: ED25519_KEY_TYPE.to_string(),
                controller: qualified.clone(),
                public_key_base58: verkey.to_string(),
            }],
            authentication: vec![AuthenticationEntry {
                auth_type: ED25519_AUTH_TYPE.to_string(),
                public_key: key_id,
            }],
            service: vec![ServiceEntry {
                id: format!("{};indy", qualified),
                service_type: AGENT_SERVICE_TYPE.to_string(),
                recipient_keys: vec![verkey.to_string()],
                routing_keys,
                service_endpoint: endpoint.to_string(),
            }],
        }
    }

    /// The key messages for this DID should be addressed to.
    pub fn recipient_key(&self) -> Option<&str> {
        self.service
            .iter()
            .find_map(|s| s.recipient_keys.first())
            .or_else(|| self.public_key.first().map(|k| &k.public_key_base58))
            .map(String::as_str)
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.service.first().map(|s| s.service_endpoint.as_str())
    }

    pub fn routing_keys(&self) -> Vec<String> {
        self.service
            .first()
            .map(|s| s.routing_keys.clone())
            .unwrap_or_default()
    }
}

/// The DID and DID document one side offers the other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDetail {
    #[serde(rename = "DID", default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(rename = "DIDDoc", default, skip_serializing_if = "Option::is_none")]
    pub did_doc: Option<DidDoc>,
}

impl ConnectionDetail {
    pub fn new(did: &Did, did_doc: DidDoc) -> Self {
        Self {
            did: Some(did.unqualified().to_string()),
            did_doc: Some(did_doc),
        }
    }

    pub fn require_did(&self) -> Result<&str, MessageError> {
        self.did
            .as_deref()
            .ok_or_else(|| MessageError::Malformed("connection detail has no DID".into()))
    }

    pub fn require_did_doc(&self) -> Result<&DidDoc, MessageError> {
        self.did_doc
            .as_ref()
            .ok_or_else(|| MessageError::Malformed("connection detail has no DIDDoc".into()))
    }
}

/// Invitee's request to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    #[serde(default)]
    pub label: String,
    pub connection: ConnectionDetail,
}

impl ConnectionRequest {
    pub fn validate(&self) -> Result<(), MessageError> {
        self.connection.require_did()?;
        self.connection.require_did_doc()?;
        Ok(())
    }
}

/// Inviter's answer to a connection request. The connection detail travels
/// signed by the invitation key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionDetail>,
    #[serde(
        rename = "connection~sig",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub connection_sig: Option<SignatureDecorator>,
}

impl ConnectionResponse {
    /// Sign `connection` with `signer`, replacing the plain field.
    pub async fn signed(
        connection: &ConnectionDetail,
        signer: &str,
        wallet: &dyn Wallet,
    ) -> Result<Self, MessageError> {
        let value = serde_json::to_value(connection)?;
        let sig = SignatureDecorator::create(&value, signer, wallet, None).await?;
        Ok(Self {
            connection: None,
            connection_sig: Some(sig),
        })
    }

    pub fn validate(&self) -> Result<(), MessageError> {
        if self.connection.is_none() && self.connection_sig.is_none() {
            return Err(MessageError::Malformed(
                "connection response carries no connection".into(),
            ));
        }
        Ok(())
    }

    /// The connection detail, verified against its signature when signed.
    /// Returns the detail and the signer verkey, if any.
    pub async fn verified_connection(
        &self,
        wallet: &dyn Wallet,
    ) -> Result<(ConnectionDetail, Option<String>), MessageError> {
        if let Some(sig) = &self.connection_sig {
            if !sig.verify(wallet).await? {
                return Err(MessageError::Signature(
                    "connection signature verification failed".into(),
                ));
            }
            let (value, _timestamp) = sig.decode()?;
            let detail: ConnectionDetail = serde_json::from_value(value)?;
            return Ok((detail, Some(sig.signer.clone())));
        }
        let detail = self
            .connection
            .clone()
            .ok_or_else(|| MessageError::Malformed("connection response carries no connection".into()))?;
        Ok((detail, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_wallet::BasicWallet;
    use serde_json::json;

    fn alice_invitation() -> ConnectionInvitation {
        ConnectionInvitation::with_keys("Alice", vec!["K1".into()], "https://alice")
    }

    #[test]
    fn test_invitation_wire_names() {
        let json = serde_json::to_value(alice_invitation()).unwrap();
        assert_eq!(
            json,
            json!({
                "label": "Alice",
                "recipientKeys": ["K1"],
                "serviceEndpoint": "https://alice"
            })
        );
    }

    #[test]
    fn test_invitation_validation() {
        assert!(alice_invitation().validate().is_ok());

        let did_only = ConnectionInvitation {
            label: "Public".into(),
            did: Some("did:sov:QmWbsNYhMrjHiqZDTUTEJs".into()),
            ..Default::default()
        };
        assert!(did_only.validate().is_ok());

        let mixed = ConnectionInvitation {
            did: Some("did:sov:QmWbsNYhMrjHiqZDTUTEJs".into()),
            ..alice_invitation()
        };
        assert!(matches!(
            mixed.validate(),
            Err(MessageError::InvalidInvitation(_))
        ));

        let no_endpoint = ConnectionInvitation {
            endpoint: None,
            ..alice_invitation()
        };
        assert!(no_endpoint.validate().is_err());

        let empty_keys = ConnectionInvitation {
            recipient_keys: Some(vec![]),
            ..alice_invitation()
        };
        assert!(empty_keys.validate().is_err());
    }

    #[test]
    fn test_invitation_url_roundtrip() {
        let invitation = alice_invitation();
        let url = invitation.to_url("https://alice/invite", "inv-1").unwrap();
        assert!(url.starts_with("https://alice/invite?c_i="));
        let parsed = ConnectionInvitation::from_url(&url).unwrap();
        assert_eq!(parsed, invitation);
        let envelope = ConnectionInvitation::envelope_from_url(&url).unwrap();
        assert_eq!(envelope["@type"], CONNECTION_INVITATION);
        assert_eq!(envelope["@id"], "inv-1");
    }

    #[test]
    fn test_invitation_url_without_param() {
        assert!(ConnectionInvitation::from_url("https://alice/invite?x=1").is_err());
        assert!(ConnectionInvitation::from_url("not a url").is_err());
    }

    #[test]
    fn test_envelope_from_param_rejects_other_types() {
        let encoded = b64url_encode(br#"{"@type":"something/else"}"#);
        assert!(matches!(
            ConnectionInvitation::envelope_from_param(&encoded),
            Err(MessageError::InvalidInvitation(_))
        ));
        let untyped = b64url_encode(br#"{"label":"x"}"#);
        assert!(matches!(
            ConnectionInvitation::envelope_from_param(&untyped),
            Err(MessageError::MissingType)
        ));
    }

    #[test]
    fn test_did_doc_accessors() {
        let did = Did::new("GLdLMrc7xSiWGQAqnGKYG2").unwrap();
        let doc = DidDoc::new(&did, "VERKEY", "http://bob:8020", vec!["R1".into()]);
        assert_eq!(doc.id, "did:sov:GLdLMrc7xSiWGQAqnGKYG2");
        assert_eq!(doc.recipient_key(), Some("VERKEY"));
        assert_eq!(doc.endpoint(), Some("http://bob:8020"));
        assert_eq!(doc.routing_keys(), vec!["R1".to_string()]);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["@context"], DID_CONTEXT);
        assert_eq!(json["publicKey"][0]["publicKeyBase58"], "VERKEY");
        assert_eq!(json["service"][0]["type"], "IndyAgent");
    }

    #[test]
    fn test_request_validation_requires_did_and_doc() {
        let request = ConnectionRequest {
            label: "Bob".into(),
            connection: ConnectionDetail::default(),
        };
        assert!(request.validate().is_err());
    }

    #[tokio::test]
    async fn test_signed_response_roundtrip() {
        let wallet = BasicWallet::new();
        let key = wallet.create_signing_key(None, None).await.unwrap();
        let did = Did::new("GLdLMrc7xSiWGQAqnGKYG2").unwrap();
        let detail = ConnectionDetail::new(&did, DidDoc::new(&did, "VK", "http://x", vec![]));

        let response = ConnectionResponse::signed(&detail, &key.verkey, &wallet)
            .await
            .unwrap();
        assert!(response.connection.is_none());
        assert!(response.validate().is_ok());

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("connection~sig").is_some());

        let (verified, signer) = response.verified_connection(&wallet).await.unwrap();
        assert_eq!(verified, detail);
        assert_eq!(signer.as_deref(), Some(key.verkey.as_str()));
    }

    #[tokio::test]
    async fn test_unsigned_response() {
        let wallet = BasicWallet::new();
        let response = ConnectionResponse::default();
        assert!(response.validate().is_err());
        assert!(response.verified_connection(&wallet).await.is_err());
    }
}
