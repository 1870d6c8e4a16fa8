//! Decoding raw envelopes into typed messages and back.

use std::collections::HashMap;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::decorators::{ThreadDecorator, TimingDecorator};
use crate::error::MessageError;
use crate::message::{AgentMessage, MessageBody, MessageType};

const TYPE_KEY: &str = "@type";
const ID_KEY: &str = "@id";
const THREAD_KEY: &str = "~thread";
const TIMING_KEY: &str = "~timing";

/// Turns wire JSON into [`AgentMessage`]s using the static type registry.
#[derive(Debug, Clone)]
pub struct MessageFactory {
    registry: HashMap<&'static str, MessageType>,
}

impl Default for MessageFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFactory {
    pub fn new() -> Self {
        let registry = MessageType::ALL.iter().map(|ty| (ty.uri(), *ty)).collect();
        Self { registry }
    }

    pub fn resolve_type(&self, uri: &str) -> Option<MessageType> {
        self.registry.get(uri).copied()
    }

    pub fn registered_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.registry.keys().copied()
    }

    /// Decode a parsed envelope.
    pub fn decode(&self, raw: Value) -> Result<AgentMessage, MessageError> {
        let mut object = match raw {
            Value::Object(map) => map,
            other => {
                return Err(MessageError::Malformed(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let type_uri = match object.remove(TYPE_KEY) {
            Some(Value::String(uri)) => uri,
            Some(_) => return Err(MessageError::Malformed("@type must be a string".into())),
            None => return Err(MessageError::MissingType),
        };
        let message_type = self
            .resolve_type(&type_uri)
            .ok_or(MessageError::UnrecognizedMessageType(type_uri))?;

        let id = match object.remove(ID_KEY) {
            Some(Value::String(id)) => id,
            Some(_) => return Err(MessageError::Malformed("@id must be a string".into())),
            None => Uuid::now_v7().to_string(),
        };
        let thread = take_decorator::<ThreadDecorator>(&mut object, THREAD_KEY)?;
        let timing = take_decorator::<TimingDecorator>(&mut object, TIMING_KEY)?;

        let body = MessageBody::from_value(message_type, Value::Object(object))?;
        validate(&body)?;

        let mut message = AgentMessage::new(body).with_id(id);
        if let Some(thread) = thread {
            message = message.with_thread(thread);
        }
        if let Some(timing) = timing {
            message = message.with_timing(timing);
        }
        tracing::trace!(id = %message.id(), message_type = %message_type, "decoded message");
        Ok(message)
    }

    pub fn decode_bytes(&self, raw: &[u8]) -> Result<AgentMessage, MessageError> {
        self.decode(serde_json::from_slice(raw)?)
    }

    pub fn decode_str(&self, raw: &str) -> Result<AgentMessage, MessageError> {
        self.decode(serde_json::from_str(raw)?)
    }

    /// Encode to the wire envelope.
    pub fn encode(&self, message: &AgentMessage) -> Result<Value, MessageError> {
        let mut object = match message.body().to_value()? {
            Value::Object(map) => map,
            _ => return Err(MessageError::Malformed("message body is not an object".into())),
        };
        object.insert(TYPE_KEY.into(), Value::String(message.type_uri().into()));
        object.insert(ID_KEY.into(), Value::String(message.id().into()));
        if let Some(thread) = message.thread() {
            object.insert(THREAD_KEY.into(), serde_json::to_value(thread)?);
        }
        if let Some(timing) = message.timing() {
            object.insert(TIMING_KEY.into(), serde_json::to_value(timing)?);
        }
        Ok(Value::Object(object))
    }

    pub fn encode_string(&self, message: &AgentMessage) -> Result<String, MessageError> {
        Ok(serde_json::to_string(&self.encode(message)?)?)
    }
}

fn take_decorator<T: serde::de::DeserializeOwned>(
    object: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<T>, MessageError> {
    match object.remove(key) {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| MessageError::Malformed(format!("invalid {} decorator: {}", key, e))),
        None => Ok(None),
    }
}

fn validate(body: &MessageBody) -> Result<(), MessageError> {
    match body {
        MessageBody::ConnectionInvitation(invitation) => invitation.validate(),
        MessageBody::ConnectionRequest(request) => request.validate(),
        MessageBody::ConnectionResponse(response) => response.validate(),
        _ => Ok(()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_types;
    use crate::messages::*;
    use chrono::{TimeZone, Utc};
    use courier_core::Did;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn sample_did_doc() -> DidDoc {
        let did = Did::new("GLdLMrc7xSiWGQAqnGKYG2").unwrap();
        DidDoc::new(&did, "VERKEY", "http://bob:8020", vec![])
    }

    fn sample_messages() -> Vec<AgentMessage> {
        let did = Did::new("GLdLMrc7xSiWGQAqnGKYG2").unwrap();
        let detail = ConnectionDetail::new(&did, sample_did_doc());
        let offer = json!({"cred_def_id": "CD1", "schema_id": "S1", "nonce": "7"});
        vec![
            AgentMessage::new(ConnectionInvitation::with_keys(
                "Alice",
                vec!["K1".into()],
                "http://alice",
            )),
            AgentMessage::new(ConnectionRequest {
                label: "Bob".into(),
                connection: detail.clone(),
            }),
            AgentMessage::new(ConnectionResponse {
                connection: Some(detail),
                connection_sig: None,
            })
            .with_thread_id("req-1"),
            AgentMessage::new(CredentialOffer {
                offer_json: offer.clone(),
            }),
            AgentMessage::new(CredentialRequest {
                offer_json: offer,
                credential_request_json: json!({"prover_did": "abc"}),
            }),
            AgentMessage::new(CredentialIssue {
                credential_json: json!({"values": {"name": {"raw": "Alice"}}}),
                revocation_registry_id: None,
            }),
            AgentMessage::new(PresentationRequest {
                request: r#"{"name":"proof"}"#.into(),
            }),
            AgentMessage::new(CredentialPresentation {
                presentation: r#"{"proof":{}}"#.into(),
            }),
            AgentMessage::new(RouteUpdateRequest {
                updates: vec![RouteUpdate {
                    recipient_key: "K".into(),
                    action: RouteAction::Create,
                }],
            }),
            AgentMessage::new(RouteUpdateResponse {
                updated: vec![RouteUpdated {
                    recipient_key: "K".into(),
                    action: RouteAction::Create,
                    result: RouteUpdateResult::Success,
                }],
            }),
            AgentMessage::new(RouteQueryRequest {
                filter: Some(BTreeMap::from([("recipient_key".into(), vec!["K".into()])])),
                paginate: Some(Paginate {
                    limit: Some(5),
                    offset: None,
                }),
            }),
            AgentMessage::new(RouteQueryResponse {
                routes: vec![RouteQueryResult {
                    recipient_key: "K".into(),
                }],
                paginated: Some(Paginated {
                    start: 0,
                    end: 1,
                    limit: 5,
                    total: 1,
                }),
            }),
            AgentMessage::new(Forward {
                to: "K".into(),
                msg: json!({"@type": "x", "payload": 1}),
            }),
            AgentMessage::new(Ping {
                comment: Some("hi".into()),
                response_requested: false,
            }),
            AgentMessage::new(PingResponse::default()),
            AgentMessage::new(BasicMessage {
                content: "hello".into(),
                sent_time: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            }),
            AgentMessage::new(ProblemReport::explain("failed")),
            AgentMessage::new(Menu {
                title: Some("Main".into()),
                options: vec![MenuOption {
                    name: "a".into(),
                    title: "A".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            AgentMessage::new(MenuRequest {}),
            AgentMessage::new(Perform {
                name: "a".into(),
                params: BTreeMap::from([("k".into(), "v".into())]),
            }),
        ]
    }

    #[test]
    fn test_registry_covers_all_types() {
        let factory = MessageFactory::new();
        assert_eq!(factory.registered_types().count(), MessageType::ALL.len());
        assert_eq!(
            factory.resolve_type(message_types::PING),
            Some(MessageType::Ping)
        );
    }

    #[test]
    fn test_roundtrip_every_variant() {
        let factory = MessageFactory::new();
        let messages = sample_messages();
        let covered: std::collections::HashSet<_> =
            messages.iter().map(|m| m.message_type()).collect();
        assert_eq!(covered.len(), MessageType::ALL.len());

        for message in messages {
            let encoded = factory.encode(&message).unwrap();
            assert_eq!(encoded["@type"], message.type_uri());
            assert_eq!(encoded["@id"], message.id());
            let decoded = factory.decode(encoded).unwrap();
            assert_eq!(decoded, message);

            let text = factory.encode_string(&message).unwrap();
            assert_eq!(factory.decode_str(&text).unwrap(), message);
        }
    }

    #[test]
    fn test_decode_missing_type() {
        let factory = MessageFactory::new();
        let err = factory.decode(json!({"@id": "1"})).unwrap_err();
        assert!(matches!(err, MessageError::MissingType));
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_decode_unrecognized_type() {
        let factory = MessageFactory::new();
        let err = factory
            .decode(json!({"@type": "did:sov:abc;spec/unknown/1.0/thing"}))
            .unwrap_err();
        match err {
            MessageError::UnrecognizedMessageType(uri) => {
                assert_eq!(uri, "did:sov:abc;spec/unknown/1.0/thing")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_non_object() {
        let factory = MessageFactory::new();
        assert!(matches!(
            factory.decode(json!([1, 2])),
            Err(MessageError::Malformed(_))
        ));
        assert!(factory.decode_bytes(b"not json").unwrap_err().is_decode_error());
    }

    #[test]
    fn test_decode_missing_required_field() {
        let factory = MessageFactory::new();
        let err = factory
            .decode(json!({"@type": message_types::BASIC_MESSAGE}))
            .unwrap_err();
        assert!(matches!(err, MessageError::Json(_)));
    }

    #[test]
    fn test_decode_generates_missing_id() {
        let factory = MessageFactory::new();
        let msg = factory
            .decode(json!({"@type": message_types::PING}))
            .unwrap();
        assert!(!msg.id().is_empty());
        assert!(msg.thread().is_none());
    }

    #[test]
    fn test_decode_reads_thread() {
        let factory = MessageFactory::new();
        let msg = factory
            .decode(json!({
                "@type": message_types::PING_RESPONSE,
                "@id": "r1",
                "~thread": {"thid": "p1"}
            }))
            .unwrap();
        assert_eq!(msg.thread_id(), "p1");
        assert!(factory
            .decode(json!({"@type": message_types::PING, "~thread": "bad"}))
            .is_err());
    }

    #[test]
    fn test_decode_rejects_invalid_invitation() {
        let factory = MessageFactory::new();
        let err = factory
            .decode(json!({
                "@type": message_types::CONNECTION_INVITATION,
                "label": "Alice",
                "recipientKeys": ["K1"]
            }))
            .unwrap_err();
        assert!(matches!(err, MessageError::InvalidInvitation(_)));
    }

    #[test]
    fn test_decode_nested_connection_detail() {
        let factory = MessageFactory::new();
        let doc = serde_json::to_value(sample_did_doc()).unwrap();
        let msg = factory
            .decode(json!({
                "@type": message_types::CONNECTION_REQUEST,
                "@id": "req-1",
                "label": "Bob",
                "connection": {"DID": "GLdLMrc7xSiWGQAqnGKYG2", "DIDDoc": doc}
            }))
            .unwrap();
        match msg.body() {
            MessageBody::ConnectionRequest(request) => {
                assert_eq!(request.label, "Bob");
                assert_eq!(
                    request.connection.did_doc.as_ref().unwrap().recipient_key(),
                    Some("VERKEY")
                );
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }
}
