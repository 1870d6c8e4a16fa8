//! Outbound delivery: one shared queue drained by workers that pick a
//! transport by the endpoint's scheme.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use courier_messaging::OutboundMessage;

use crate::error::TransportError;
use crate::sockets::SocketRegistry;

pub mod http;
pub mod ws;

pub use http::HttpOutbound;
pub use ws::WsOutbound;

#[async_trait]
pub trait OutboundTransport: Send + Sync {
    /// URL schemes this transport delivers to.
    fn schemes(&self) -> &'static [&'static str];

    async fn deliver(&self, payload: &str, endpoint: &str) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundConfig {
    pub queue_size: usize,
    /// Deliveries in flight at once.
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            queue_size: 256,
            workers: 8,
            max_attempts: 3,
            retry_backoff_ms: 500,
            timeout_secs: 30,
        }
    }
}

struct Deliverer {
    transports: HashMap<&'static str, Arc<dyn OutboundTransport>>,
    sockets: SocketRegistry,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl Deliverer {
    async fn deliver(&self, message: OutboundMessage) {
        if let Some(socket_id) = &message.reply_socket_id {
            if self.sockets.send(socket_id, message.payload.clone()).await {
                tracing::debug!(socket_id = %socket_id, "reply written to inbound socket");
                return;
            }
        }
        let Some(endpoint) = message.endpoint() else {
            tracing::warn!(connection_id = ?message.connection_id, "outbound message has no endpoint, dropping");
            return;
        };
        let scheme = match url::Url::parse(endpoint) {
            Ok(url) => url.scheme().to_string(),
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "endpoint has no usable scheme, dropping");
                return;
            }
        };
        let Some(transport) = self.transports.get(scheme.as_str()) else {
            tracing::warn!(endpoint = %endpoint, scheme = %scheme, "no transport for scheme, dropping");
            return;
        };

        let max_attempts = self.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match transport.deliver(&message.payload, endpoint).await {
                Ok(()) => {
                    tracing::debug!(endpoint = %endpoint, attempt = attempt, "message delivered");
                    return;
                }
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(endpoint = %endpoint, attempt = attempt, error = %e, "delivery failed, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    tracing::error!(endpoint = %endpoint, attempts = attempt, error = %e, "delivery failed, dropping");
                }
            }
        }
    }
}

/// Wait for a free worker, then deliver in the background. While every
/// worker is busy the pump stalls and messages stay in the bounded queue.
async fn dispatch(
    deliverer: &Arc<Deliverer>,
    permits: &Arc<Semaphore>,
    tasks: &TaskTracker,
    message: OutboundMessage,
) {
    let Ok(permit) = permits.clone().acquire_owned().await else {
        return;
    };
    let deliverer = deliverer.clone();
    tasks.spawn(async move {
        let _permit = permit;
        deliverer.deliver(message).await;
    });
}

pub struct OutboundTransportManager {
    config: OutboundConfig,
    transports: HashMap<&'static str, Arc<dyn OutboundTransport>>,
    sockets: SocketRegistry,
    sender: mpsc::Sender<OutboundMessage>,
    receiver: Option<mpsc::Receiver<OutboundMessage>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl OutboundTransportManager {
    pub fn new(config: OutboundConfig, sockets: SocketRegistry) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        Self {
            config,
            transports: HashMap::new(),
            sockets,
            sender,
            receiver: Some(receiver),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Register a built-in transport by kind.
    pub fn register(&mut self, kind: &str) -> Result<(), TransportError> {
        let transport: Arc<dyn OutboundTransport> = match kind {
            "http" => Arc::new(HttpOutbound::new(Duration::from_secs(self.config.timeout_secs))?),
            "ws" => Arc::new(WsOutbound),
            other => {
                return Err(TransportError::TransportRegistration(format!(
                    "unknown outbound transport: {}",
                    other
                )))
            }
        };
        self.register_transport(transport)
    }

    /// Register a transport for all of its schemes. A scheme can only be
    /// served by one transport.
    pub fn register_transport(&mut self, transport: Arc<dyn OutboundTransport>) -> Result<(), TransportError> {
        if let Some(taken) = transport
            .schemes()
            .iter()
            .find(|s| self.transports.contains_key(*s))
        {
            return Err(TransportError::TransportRegistration(format!(
                "scheme {} is already registered",
                taken
            )));
        }
        for scheme in transport.schemes() {
            self.transports.insert(*scheme, transport.clone());
        }
        tracing::debug!(schemes = ?transport.schemes(), "outbound transport registered");
        Ok(())
    }

    pub fn has_scheme(&self, scheme: &str) -> bool {
        self.transports.contains_key(scheme)
    }

    /// A handle for queueing messages.
    pub fn sender(&self) -> mpsc::Sender<OutboundMessage> {
        self.sender.clone()
    }

    pub async fn enqueue(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| TransportError::Delivery("outbound queue closed".into()))
    }

    /// Start draining the queue.
    pub fn start_all(&mut self) -> Result<(), TransportError> {
        let mut receiver = self
            .receiver
            .take()
            .ok_or_else(|| TransportError::TransportSetup("outbound transports already started".into()))?;
        let deliverer = Arc::new(Deliverer {
            transports: self.transports.clone(),
            sockets: self.sockets.clone(),
            max_attempts: self.config.max_attempts,
            retry_backoff: Duration::from_millis(self.config.retry_backoff_ms),
        });
        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let shutdown = self.shutdown.clone();
        let tasks = self.tasks.clone();

        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    message = receiver.recv() => match message {
                        Some(message) => dispatch(&deliverer, &permits, &tasks, message).await,
                        None => break,
                    },
                }
            }
            receiver.close();
            while let Some(message) = receiver.recv().await {
                dispatch(&deliverer, &permits, &tasks, message).await;
            }
            tracing::debug!("outbound queue drained");
        });
        tracing::info!(schemes = ?self.transports.keys().collect::<Vec<_>>(), "outbound transports started");
        Ok(())
    }

    /// Close the queue and wait for queued messages to be delivered.
    pub async fn stop_all(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!("outbound transports stopped");
    }
}
