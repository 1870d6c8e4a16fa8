//! Shared helpers for the cross-crate integration tests.
//!
//! [`TestAgent`] runs the full dispatch pipeline in process and hands its
//! outbound messages to another agent on request. The HTTP helpers drive
//! real conductors through their admin API.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::sync::mpsc;

use courier_agent::config::InboundConfig;
use courier_agent::AgentConfig;
use courier_core::settings::keys;
use courier_core::{
    Holder, InjectionContext, Issuer, Ledger, Settings, Storage, TagFilter, Verifier, Wallet,
};
use courier_messaging::{AgentMessage, MessageFactory, OutboundMessage, TransportEnvelope};
use courier_protocols::{
    ConnectionManager, DispatchResponder, Dispatcher, DriverMenuService, EventHook, ExchangeLocks,
    MenuService, MessageDelivery, RecordingEventHook, ReplyBindings, Responder,
};
use courier_wallet::{BasicHolder, BasicIssuer, BasicStorage, BasicVerifier};

/// An agent whose outbound messages wait in `outbox` until relayed.
pub struct TestAgent {
    pub dispatcher: Arc<Dispatcher>,
    pub outbox: mpsc::Receiver<OutboundMessage>,
    pub events: Arc<RecordingEventHook>,
    sink: mpsc::Sender<OutboundMessage>,
}

impl TestAgent {
    pub fn new(
        label: &str,
        settings: Settings,
        wallet: Arc<dyn Wallet>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        let settings = settings
            .with(keys::DEFAULT_LABEL, label)
            .with(keys::DEFAULT_ENDPOINT, format!("http://{}.example", label.to_lowercase()));
        let events = Arc::new(RecordingEventHook::new());
        let hook: Arc<dyn EventHook> = events.clone();

        let mut context = InjectionContext::new(settings);
        context.bind_instance::<dyn Wallet>(wallet.clone());
        context.bind_instance::<dyn Storage>(Arc::new(BasicStorage::new()));
        context.bind_instance::<dyn Ledger>(ledger.clone());
        context.bind_instance::<dyn Issuer>(Arc::new(BasicIssuer::new(wallet, ledger)));
        context.bind_instance::<dyn Holder>(Arc::new(BasicHolder::new()));
        context.bind_instance::<dyn Verifier>(Arc::new(BasicVerifier::new()));
        context.bind_instance::<dyn EventHook>(hook.clone());
        context.bind_instance::<dyn MenuService>(Arc::new(DriverMenuService::new(hook)));
        context.bind_instance::<ExchangeLocks>(Arc::new(ExchangeLocks::new()));

        let (sink, outbox) = mpsc::channel(32);
        Self {
            dispatcher: Arc::new(Dispatcher::new(
                context,
                Arc::new(MessageFactory::new()),
                sink.clone(),
            )),
            outbox,
            events,
            sink,
        }
    }

    pub fn context(&self) -> &InjectionContext {
        self.dispatcher.context()
    }

    /// Run a raw payload through this agent.
    pub async fn receive(&self, raw: Value, transport: &str) {
        self.dispatcher
            .dispatch(raw, MessageDelivery::new(transport))
            .await
            .expect("payload should decode");
    }

    /// Hand the next queued outbound message to `to` and return it decoded.
    pub async fn relay_to(&mut self, to: &TestAgent) -> AgentMessage {
        let outbound = tokio::time::timeout(Duration::from_secs(5), self.outbox.recv())
            .await
            .expect("an outbound message should be queued")
            .expect("outbound queue open");
        let raw: Value = serde_json::from_str(&outbound.payload).expect("payload is JSON");
        let message = decode(raw.clone());
        to.receive(raw, "http").await;
        message
    }

    pub fn outbox_is_empty(&mut self) -> bool {
        self.outbox.try_recv().is_err()
    }

    /// Send `message` over an established connection.
    pub async fn send(&self, connection_id: &str, message: AgentMessage) {
        let connections = ConnectionManager::new(self.context()).expect("connection manager");
        let record = connections
            .get_connection(connection_id)
            .await
            .expect("connection exists");
        let target = connections
            .get_connection_target(&record)
            .await
            .expect("connection has a target");
        DispatchResponder::new(
            self.dispatcher.factory().clone(),
            ReplyBindings::for_target(connection_id, target),
            self.sink.clone(),
        )
        .send_reply(message)
        .await
        .expect("message queued");
    }
}

/// Decode an enveloped wire payload.
pub fn decode(raw: Value) -> AgentMessage {
    let unpacked = TransportEnvelope::unpack(raw).expect("envelope unpacks");
    MessageFactory::new()
        .decode(unpacked.message)
        .expect("message decodes")
}

/// Connect `invitee` to `inviter`, which must accept invitations and
/// requests respectively. Returns `(invitee_connection_id, inviter_connection_id)`.
pub async fn connect(invitee: &mut TestAgent, inviter: &mut TestAgent) -> (String, String) {
    let (inviter_record, invitation) = ConnectionManager::new(inviter.context())
        .expect("connection manager")
        .create_invitation(None, None, None)
        .await
        .expect("invitation created");
    let raw = MessageFactory::new()
        .encode(&AgentMessage::new(invitation))
        .expect("invitation encodes");
    invitee.receive(raw, "invitation").await;

    invitee.relay_to(inviter).await; // request
    inviter.relay_to(invitee).await; // response
    invitee.relay_to(inviter).await; // completing ping

    let invitee_records = ConnectionManager::new(invitee.context())
        .expect("connection manager")
        .list_connections(&TagFilter::new())
        .await
        .expect("connections listed");
    let invitee_id = invitee_records
        .first()
        .expect("invitee has a connection")
        .connection_id
        .clone();
    (invitee_id, inviter_record.connection_id)
}

// --- HTTP helpers ---

/// A port free at the time of the call.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("ephemeral port")
}

/// Loopback agent that accepts invitations and requests on its own.
pub fn local_agent_config(label: &str) -> AgentConfig {
    let port = free_port();
    let mut config = AgentConfig::default();
    config.agent.label = label.to_string();
    config.agent.endpoint = Some(format!("http://127.0.0.1:{}", port));
    config.transport.inbound = vec![InboundConfig {
        kind: "http".into(),
        host: "127.0.0.1".into(),
        port,
    }];
    config.transport.delivery.retry_backoff_ms = 50;
    config.transport.shutdown_timeout_secs = 2;
    config.admin.port = 0;
    config.protocols.accept_invites = true;
    config.protocols.accept_requests = true;
    config
}

pub struct AdminClient {
    base: String,
    client: reqwest::Client,
}

impl AdminClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            base: format!("http://{}/api/v1", addr),
            client: reqwest::Client::new(),
        }
    }

    pub async fn get(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .expect("admin API reachable");
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    pub async fn post(&self, path: &str, body: Value) -> (reqwest::StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .expect("admin API reachable");
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }
}

/// Poll `check` until it holds, failing after ten seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {}", what);
}

pub type Received = Arc<Mutex<Vec<(String, Value)>>>;

/// A controller that records every webhook it receives. Returns the
/// webhook base URL.
pub async fn webhook_controller() -> (String, Received) {
    async fn receive(
        State(received): State<Received>,
        Path(topic): Path<String>,
        Json(body): Json<Value>,
    ) -> &'static str {
        if let Ok(mut events) = received.lock() {
            events.push((topic, body));
        }
        "ok"
    }

    let received: Received = Arc::default();
    let app = Router::new()
        .route("/webhooks/topic/{topic}/", post(receive))
        .with_state(received.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("controller binds");
    let addr = listener.local_addr().expect("controller address");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "webhook controller failed");
        }
    });
    (format!("http://{}/webhooks", addr), received)
}
