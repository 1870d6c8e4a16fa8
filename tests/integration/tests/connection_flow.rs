//! Connection establishment and messaging between two in-process agents.

use std::sync::Arc;

use courier_core::settings::keys;
use courier_core::{ConnectionState, Ledger, Settings, Wallet};
use courier_integration_tests::{connect, TestAgent};
use courier_messaging::messages::{BasicMessage, Ping};
use courier_messaging::{AgentMessage, MessageBody, MessageType};
use courier_protocols::{topics, ConnectionManager, MessageDelivery, ProtocolError};
use courier_wallet::{BasicLedger, BasicWallet};

fn agents() -> (TestAgent, TestAgent) {
    let ledger: Arc<dyn Ledger> = Arc::new(BasicLedger::new(Arc::new(BasicWallet::new())));
    let alice = TestAgent::new(
        "Alice",
        Settings::new().with(keys::ACCEPT_INVITES, true),
        Arc::new(BasicWallet::new()),
        ledger.clone(),
    );
    let bob = TestAgent::new(
        "Bob",
        Settings::new().with(keys::ACCEPT_REQUESTS, true),
        Arc::new(BasicWallet::new()),
        ledger,
    );
    (alice, bob)
}

#[tokio::test]
async fn test_manual_handshake_through_managers() {
    let (alice, bob) = agents();
    let alice_connections = ConnectionManager::new(alice.context()).unwrap();
    let bob_connections = ConnectionManager::new(bob.context()).unwrap();

    let (invited, invitation) = bob_connections
        .create_invitation(Some("Bob's desk"), None, None)
        .await
        .unwrap();
    assert_eq!(invited.state, ConnectionState::Invitation);

    let alice_record = alice_connections.receive_invitation(&invitation).await.unwrap();
    let (alice_record, request, _) = alice_connections
        .accept_invitation(&alice_record.connection_id)
        .await
        .unwrap();
    assert_eq!(alice_record.state, ConnectionState::Request);

    let MessageBody::ConnectionRequest(request_body) = request.body() else {
        panic!("expected a connection request");
    };
    let delivery =
        MessageDelivery::new("http").with_recipient(invitation.invitation_key().unwrap());
    let bob_record = bob_connections
        .receive_request(request_body, request.id(), &delivery)
        .await
        .unwrap();
    assert_eq!(bob_record.connection_id, invited.connection_id);
    assert_eq!(bob_record.state, ConnectionState::Request);

    let (bob_record, response, _) = bob_connections
        .accept_request(&bob_record.connection_id)
        .await
        .unwrap();
    assert_eq!(bob_record.state, ConnectionState::Response);

    let MessageBody::ConnectionResponse(response_body) = response.body() else {
        panic!("expected a connection response");
    };
    let (alice_record, target) = alice_connections
        .accept_response(response_body, response.explicit_thread_id())
        .await
        .unwrap();
    assert_eq!(alice_record.state, ConnectionState::Active);
    assert_eq!(alice_record.their_did, bob_record.my_did);
    assert_eq!(target.endpoint.as_deref(), Some("http://bob.example"));

    // The request is consumed by the first response.
    let err = alice_connections
        .accept_response(response_body, response.explicit_thread_id())
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionProtocol(_)));
}

#[tokio::test]
async fn test_handshake_over_dispatchers() {
    let (mut alice, mut bob) = agents();
    let (alice_id, bob_id) = connect(&mut alice, &mut bob).await;

    let alice_record = ConnectionManager::new(alice.context())
        .unwrap()
        .get_connection(&alice_id)
        .await
        .unwrap();
    let bob_record = ConnectionManager::new(bob.context())
        .unwrap()
        .get_connection(&bob_id)
        .await
        .unwrap();
    assert!(alice_record.is_active());
    assert!(bob_record.is_active());
    assert_eq!(alice_record.my_did, bob_record.their_did);
    assert_eq!(alice_record.their_did, bob_record.my_did);

    // The pairwise relationship is recorded in each wallet.
    let pairwise = alice
        .context()
        .inject::<dyn Wallet>()
        .unwrap()
        .get_pairwise_for_did(alice_record.their_did.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(pairwise.my_did, alice_record.my_did.unwrap());

    assert!(alice.events.topics().iter().all(|t| t == topics::CONNECTIONS));
    assert!(alice.outbox_is_empty());
    assert!(bob.outbox_is_empty());
}

#[tokio::test]
async fn test_invitation_waits_without_auto_accept() {
    let ledger: Arc<dyn Ledger> = Arc::new(BasicLedger::new(Arc::new(BasicWallet::new())));
    let mut alice = TestAgent::new("Alice", Settings::new(), Arc::new(BasicWallet::new()), ledger.clone());
    let bob = TestAgent::new("Bob", Settings::new(), Arc::new(BasicWallet::new()), ledger);

    let (_, invitation) = ConnectionManager::new(bob.context())
        .unwrap()
        .create_invitation(None, None, None)
        .await
        .unwrap();
    let raw = courier_messaging::MessageFactory::new()
        .encode(&AgentMessage::new(invitation))
        .unwrap();
    alice.receive(raw, "invitation").await;

    assert!(alice.outbox_is_empty());
    let records = ConnectionManager::new(alice.context())
        .unwrap()
        .list_connections(&courier_core::TagFilter::new())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, ConnectionState::Invitation);
}

#[tokio::test]
async fn test_basic_message_echo() {
    let (mut alice, mut bob) = agents();
    let (alice_id, _) = connect(&mut alice, &mut bob).await;

    alice
        .send(&alice_id, AgentMessage::new(BasicMessage::new("Reply with: hello")))
        .await;
    alice.relay_to(&bob).await;
    let reply = bob.relay_to(&alice).await;

    let MessageBody::BasicMessage(reply) = reply.body() else {
        panic!("expected a basic message");
    };
    assert_eq!(reply.content, "hello");

    let received: Vec<_> = alice
        .events
        .events()
        .into_iter()
        .filter(|(topic, _)| topic == topics::BASIC_MESSAGES)
        .collect();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].1["content"], "hello");
    assert_eq!(received[0].1["connection_id"], alice_id.as_str());
}

#[tokio::test]
async fn test_trust_ping_answered_on_thread() {
    let (mut alice, mut bob) = agents();
    let (alice_id, _) = connect(&mut alice, &mut bob).await;

    let ping = AgentMessage::new(Ping {
        comment: Some("are you there".into()),
        response_requested: true,
    });
    let ping_id = ping.id().to_string();
    alice.send(&alice_id, ping).await;
    alice.relay_to(&bob).await;

    let response = bob.relay_to(&alice).await;
    assert_eq!(response.message_type(), MessageType::PingResponse);
    assert_eq!(response.thread_id(), ping_id);
}

#[tokio::test]
async fn test_message_without_connection_dropped() {
    let (mut alice, mut bob) = agents();
    connect(&mut alice, &mut bob).await;

    // A basic message outside any connection fails in the handler and is dropped.
    let stray = courier_messaging::MessageFactory::new()
        .encode(&AgentMessage::new(BasicMessage::new("hi")))
        .unwrap();
    bob.receive(stray, "http").await;
    assert!(bob.outbox_is_empty());
}
