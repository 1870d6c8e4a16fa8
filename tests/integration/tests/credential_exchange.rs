//! Credential issuance and proof presentation between two in-process
//! agents sharing one ledger.

use std::sync::Arc;

use serde_json::{json, Value};

use courier_core::settings::keys;
use courier_core::{
    CredentialExchangeState, CredentialValues, Holder, Ledger, PresentationExchangeState,
    Settings, TagFilter, Wallet,
};
use courier_integration_tests::{connect, TestAgent};
use courier_messaging::MessageType;
use courier_protocols::{topics, ConnectionManager, CredentialManager, PresentationManager};
use courier_wallet::{BasicLedger, BasicWallet};

struct Setup {
    alice: TestAgent,
    bob: TestAgent,
    alice_id: String,
    bob_id: String,
    cred_def_id: String,
}

/// Bob is the issuer and verifier, Alice the holder.
async fn setup(alice_settings: Settings) -> Setup {
    let bob_wallet = Arc::new(BasicWallet::new());
    bob_wallet.create_public_did(None).await.unwrap();
    let ledger = Arc::new(BasicLedger::new(bob_wallet.clone()));
    let schema_id = ledger
        .send_schema("membership", "1.0", &["name".into(), "age".into()])
        .await
        .unwrap();
    let cred_def_id = ledger
        .send_credential_definition(&schema_id, "default")
        .await
        .unwrap();
    let ledger: Arc<dyn Ledger> = ledger;

    let mut alice = TestAgent::new(
        "Alice",
        alice_settings.with(keys::ACCEPT_INVITES, true),
        Arc::new(BasicWallet::new()),
        ledger.clone(),
    );
    let mut bob = TestAgent::new(
        "Bob",
        Settings::new()
            .with(keys::ACCEPT_REQUESTS, true)
            .with(keys::AUTO_VERIFY_PRESENTATION, true),
        bob_wallet,
        ledger,
    );
    let (alice_id, bob_id) = connect(&mut alice, &mut bob).await;
    Setup {
        alice,
        bob,
        alice_id,
        bob_id,
        cred_def_id,
    }
}

fn values() -> CredentialValues {
    [("name", "Alice"), ("age", "30")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn only_credential_exchange(agent: &TestAgent) -> courier_protocols::CredentialExchangeRecord {
    let mut records = CredentialManager::new(agent.context())
        .unwrap()
        .list(&TagFilter::new())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    records.remove(0)
}

#[tokio::test]
async fn test_offer_with_values_runs_to_stored() {
    let mut s = setup(Settings::new().with(keys::AUTO_RESPOND_CREDENTIAL_OFFER, true)).await;

    let (_, offer) = CredentialManager::new(s.bob.context())
        .unwrap()
        .create_offer(&s.bob_id, &s.cred_def_id, Some(values()))
        .await
        .unwrap();
    s.bob.send(&s.bob_id, offer).await;

    s.bob.relay_to(&s.alice).await;
    let request = s.alice.relay_to(&s.bob).await;
    assert_eq!(request.message_type(), MessageType::CredentialRequest);
    let issue = s.bob.relay_to(&s.alice).await;
    assert_eq!(issue.message_type(), MessageType::CredentialIssue);

    let held = only_credential_exchange(&s.alice).await;
    assert_eq!(held.state, CredentialExchangeState::Stored);
    assert_eq!(held.connection_id, s.alice_id);
    let credential_id = held.credential_id.clone().unwrap();

    let issued = only_credential_exchange(&s.bob).await;
    assert_eq!(issued.state, CredentialExchangeState::Issued);
    assert_eq!(issued.thread_id, held.thread_id);

    let info = s
        .alice
        .context()
        .inject::<dyn Holder>()
        .unwrap()
        .get_credential(&credential_id)
        .await
        .unwrap();
    assert_eq!(info["attrs"]["name"], "Alice");
    assert_eq!(info["cred_def_id"], s.cred_def_id.as_str());
    assert!(s.alice.events.topics().iter().any(|t| t == topics::CREDENTIALS));
}

#[tokio::test]
async fn test_manual_request_and_issue() {
    let mut s = setup(Settings::new()).await;

    let (_, offer) = CredentialManager::new(s.bob.context())
        .unwrap()
        .create_offer(&s.bob_id, &s.cred_def_id, None)
        .await
        .unwrap();
    s.bob.send(&s.bob_id, offer).await;
    s.bob.relay_to(&s.alice).await;

    // Without auto-respond the holder waits for its controller.
    assert!(s.alice.outbox_is_empty());
    let held = only_credential_exchange(&s.alice).await;
    assert_eq!(held.state, CredentialExchangeState::OfferReceived);

    let my_did = ConnectionManager::new(s.alice.context())
        .unwrap()
        .get_connection(&s.alice_id)
        .await
        .unwrap()
        .my_did
        .unwrap();
    let alice_credentials = CredentialManager::new(s.alice.context()).unwrap();
    let (held, request) = alice_credentials
        .send_request(&held.credential_exchange_id, &my_did)
        .await
        .unwrap();
    assert_eq!(held.state, CredentialExchangeState::RequestSent);
    s.alice.send(&s.alice_id, request).await;
    s.alice.relay_to(&s.bob).await;

    // No values came with the offer, so the issuer waits too.
    assert!(s.bob.outbox_is_empty());
    let pending = only_credential_exchange(&s.bob).await;
    assert_eq!(pending.state, CredentialExchangeState::RequestReceived);

    let (issued, issue) = CredentialManager::new(s.bob.context())
        .unwrap()
        .issue(&pending.credential_exchange_id, Some(&values()))
        .await
        .unwrap();
    assert_eq!(issued.state, CredentialExchangeState::Issued);
    s.bob.send(&s.bob_id, issue).await;
    s.bob.relay_to(&s.alice).await;

    let held = alice_credentials.get(&held.credential_exchange_id).await.unwrap();
    assert_eq!(held.state, CredentialExchangeState::Stored);
    assert!(held.credential_id.is_some());
}

/// Choose `credential_id` for every referent in a received request.
fn requested_credentials(request: &Value, credential_id: &str) -> Value {
    let pick = |section: &str, revealed: bool| -> Value {
        request[section]
            .as_object()
            .map(|entries| {
                Value::Object(
                    entries
                        .keys()
                        .map(|referent| {
                            let mut choice = json!({"cred_id": credential_id});
                            if revealed {
                                choice["revealed"] = json!(true);
                            }
                            (referent.clone(), choice)
                        })
                        .collect(),
                )
            })
            .unwrap_or_else(|| json!({}))
    };
    json!({
        "self_attested_attributes": {},
        "requested_attributes": pick("requested_attributes", true),
        "requested_predicates": pick("requested_predicates", false),
    })
}

#[tokio::test]
async fn test_presentation_verified() {
    let mut s = setup(Settings::new().with(keys::AUTO_RESPOND_CREDENTIAL_OFFER, true)).await;
    let (_, offer) = CredentialManager::new(s.bob.context())
        .unwrap()
        .create_offer(&s.bob_id, &s.cred_def_id, Some(values()))
        .await
        .unwrap();
    s.bob.send(&s.bob_id, offer).await;
    s.bob.relay_to(&s.alice).await;
    s.alice.relay_to(&s.bob).await;
    s.bob.relay_to(&s.alice).await;
    let credential_id = only_credential_exchange(&s.alice)
        .await
        .credential_id
        .unwrap();

    let (requested, request) = PresentationManager::new(s.bob.context())
        .unwrap()
        .create_request(
            "membership proof",
            "1.0",
            vec![json!({"name": "name", "restrictions": [{"cred_def_id": s.cred_def_id}]})],
            vec![json!({"name": "age", "p_type": ">=", "p_value": 18})],
            &s.bob_id,
        )
        .await
        .unwrap();
    s.bob.send(&s.bob_id, request).await;
    s.bob.relay_to(&s.alice).await;

    let alice_presentations = PresentationManager::new(s.alice.context()).unwrap();
    let received = alice_presentations
        .list(&TagFilter::new())
        .await
        .unwrap()
        .remove(0);
    assert_eq!(received.state, PresentationExchangeState::RequestReceived);

    let choices = requested_credentials(&received.presentation_request, &credential_id);
    let (sent, presentation) = alice_presentations
        .send_presentation(&received.presentation_exchange_id, &choices)
        .await
        .unwrap();
    assert_eq!(sent.state, PresentationExchangeState::PresentationSent);
    s.alice.send(&s.alice_id, presentation).await;
    s.alice.relay_to(&s.bob).await;

    let verified = PresentationManager::new(s.bob.context())
        .unwrap()
        .get(&requested.presentation_exchange_id)
        .await
        .unwrap();
    assert_eq!(verified.state, PresentationExchangeState::Verified);
    assert_eq!(verified.verified.as_deref(), Some("true"));
    assert_eq!(
        verified.presentation.unwrap()["requested_proof"]["revealed_attrs"]
            .as_object()
            .unwrap()
            .values()
            .next()
            .unwrap()["raw"],
        "Alice"
    );
}

#[tokio::test]
async fn test_unsatisfiable_predicate_rejected_by_holder() {
    let mut s = setup(Settings::new().with(keys::AUTO_RESPOND_CREDENTIAL_OFFER, true)).await;
    let (_, offer) = CredentialManager::new(s.bob.context())
        .unwrap()
        .create_offer(&s.bob_id, &s.cred_def_id, Some(values()))
        .await
        .unwrap();
    s.bob.send(&s.bob_id, offer).await;
    s.bob.relay_to(&s.alice).await;
    s.alice.relay_to(&s.bob).await;
    s.bob.relay_to(&s.alice).await;
    let credential_id = only_credential_exchange(&s.alice)
        .await
        .credential_id
        .unwrap();

    let (_, request) = PresentationManager::new(s.bob.context())
        .unwrap()
        .create_request(
            "senior proof",
            "1.0",
            Vec::new(),
            vec![json!({"name": "age", "p_type": ">=", "p_value": 65})],
            &s.bob_id,
        )
        .await
        .unwrap();
    s.bob.send(&s.bob_id, request).await;
    s.bob.relay_to(&s.alice).await;

    let alice_presentations = PresentationManager::new(s.alice.context()).unwrap();
    let received = alice_presentations
        .list(&TagFilter::new())
        .await
        .unwrap()
        .remove(0);
    let choices = requested_credentials(&received.presentation_request, &credential_id);
    assert!(alice_presentations
        .send_presentation(&received.presentation_exchange_id, &choices)
        .await
        .is_err());
    let unchanged = alice_presentations
        .get(&received.presentation_exchange_id)
        .await
        .unwrap();
    assert_eq!(unchanged.state, PresentationExchangeState::RequestReceived);
}
