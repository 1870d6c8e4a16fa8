//! Two running agents talking over HTTP, driven through their admin APIs.

use reqwest::StatusCode;
use serde_json::{json, Value};

use courier_agent::Conductor;
use courier_integration_tests::{
    eventually, local_agent_config, webhook_controller, AdminClient, Received,
};

async fn connection_state(admin: &AdminClient) -> Option<String> {
    let (_, body) = admin.get("/connections").await;
    body["results"][0]["state"].as_str().map(str::to_string)
}

fn topic_contents(received: &Received, topic: &str) -> Vec<Value> {
    received
        .lock()
        .map(|events| {
            events
                .iter()
                .filter(|(t, _)| t == topic)
                .map(|(_, payload)| payload["content"].clone())
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_connect_and_exchange_messages() {
    let (alice_hooks, alice_received) = webhook_controller().await;
    let (bob_hooks, bob_received) = webhook_controller().await;

    let mut alice_config = local_agent_config("Alice");
    alice_config.webhook.url = Some(alice_hooks);
    let mut bob_config = local_agent_config("Bob");
    bob_config.webhook.url = Some(bob_hooks);

    let alice = Conductor::start(alice_config).await.unwrap();
    let bob = Conductor::start(bob_config).await.unwrap();
    let alice_admin = AdminClient::new(alice.admin_addr().unwrap());
    let bob_admin = AdminClient::new(bob.admin_addr().unwrap());

    let (status, invitation) = bob_admin.post("/connections/create-invitation", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let url = invitation["invitation_url"].as_str().unwrap().to_string();
    assert!(url.contains("c_i="));
    let bob_id = invitation["connection_id"].as_str().unwrap().to_string();

    let (status, record) = alice_admin
        .post(
            "/connections/receive-invitation",
            json!({"invitation_url": url, "auto_accept": true}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["state"], "request");

    for (name, admin) in [("alice", &alice_admin), ("bob", &bob_admin)] {
        eventually(&format!("{} active", name), move || async move {
            connection_state(admin).await.as_deref() == Some("active")
        })
        .await;
    }

    let (status, sent) = bob_admin
        .post(
            &format!("/connections/{}/send-message", bob_id),
            json!({"content": "Reply with: pong"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["connection_id"], bob_id.as_str());

    for (name, received, expected) in [
        ("alice", &alice_received, "Reply with: pong"),
        ("bob", &bob_received, "pong"),
    ] {
        eventually(&format!("{} webhook", name), move || async move {
            topic_contents(received, "basicmessages") == vec![json!(expected)]
        })
        .await;
    }

    let (status, _) = bob_admin
        .post(&format!("/connections/{}/send-ping", bob_id), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, status_body) = bob_admin.get("/status").await;
    assert_eq!(status_body["label"], "Bob");
    assert_eq!(status_body["connection_count"], 1);

    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test]
async fn test_admin_error_codes() {
    let agent = Conductor::start(local_agent_config("Solo")).await.unwrap();
    let admin = AdminClient::new(agent.admin_addr().unwrap());

    let (status, body) = admin.get("/connections/no-such-connection").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (_, invitation) = admin.post("/connections/create-invitation", json!({})).await;
    let id = invitation["connection_id"].as_str().unwrap();
    let (status, _) = admin
        .post(
            &format!("/connections/{}/send-message", id),
            json!({"content": "too early"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = admin
        .post("/connections/receive-invitation", json!({"auto_accept": true}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Publishing needs a public DID, which only a seeded agent has.
    let (status, _) = admin
        .post(
            "/schemas",
            json!({"schema_name": "id", "schema_version": "1.0", "attributes": ["name"]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = admin.get("/credential_exchange/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    agent.shutdown().await;
}

#[tokio::test]
async fn test_seeded_agent_publishes() {
    let mut config = local_agent_config("Issuer");
    config.agent.seed = Some("00000000000000000000000000000007".into());
    let agent = Conductor::start(config).await.unwrap();
    let admin = AdminClient::new(agent.admin_addr().unwrap());

    let (_, status_body) = admin.get("/status").await;
    let did = status_body["public_did"].as_str().unwrap().to_string();

    let (status, schema) = admin
        .post(
            "/schemas",
            json!({"schema_name": "id", "schema_version": "1.0", "attributes": ["name", "age"]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let schema_id = schema["schema_id"].as_str().unwrap().to_string();
    assert!(schema_id.starts_with(&did));

    let (status, fetched) = admin.get(&format!("/schemas/{}", schema_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "id");

    let (status, definition) = admin
        .post("/credential-definitions", json!({"schema_id": schema_id}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let cred_def_id = definition["credential_definition_id"].as_str().unwrap();
    let (status, _) = admin
        .get(&format!("/credential-definitions/{}", cred_def_id))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = admin.get("/schemas/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    agent.shutdown().await;
}
