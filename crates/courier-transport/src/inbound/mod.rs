//! Inbound transports: listeners that forward raw payloads to the agent.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::TransportError;
use crate::sockets::SocketRegistry;

pub mod http;
pub mod ws;

pub use http::HttpTransport;
pub use ws::WsTransport;

/// Receives every inbound payload. Transports never look inside it.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// `scheme` names how the payload arrived (`http`, `ws`, `invitation`).
    /// `socket_id` is set when replies can go back over the same socket.
    async fn handle_message(
        &self,
        payload: Bytes,
        scheme: &str,
        socket_id: Option<String>,
    ) -> Result<(), TransportError>;
}

#[async_trait]
pub trait InboundTransport: Send + Sync {
    fn scheme(&self) -> &'static str;

    /// Bind the listener and serve until `shutdown` fires. Returns once
    /// listening, with the bound address.
    async fn start(
        &self,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
        tasks: &TaskTracker,
    ) -> Result<SocketAddr, TransportError>;
}

/// Starts and stops every registered inbound transport together.
pub struct InboundTransportManager {
    transports: Vec<Box<dyn InboundTransport>>,
    sockets: SocketRegistry,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl InboundTransportManager {
    pub fn new(sockets: SocketRegistry) -> Self {
        Self {
            transports: Vec::new(),
            sockets,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Register a built-in transport by kind.
    pub fn register(&mut self, kind: &str, host: &str, port: u16) -> Result<(), TransportError> {
        let transport: Box<dyn InboundTransport> = match kind {
            "http" => Box::new(HttpTransport::new(host, port)),
            "ws" => Box::new(WsTransport::new(host, port, self.sockets.clone())),
            other => {
                return Err(TransportError::TransportRegistration(format!(
                    "unknown inbound transport: {}",
                    other
                )))
            }
        };
        tracing::debug!(kind = %kind, host = %host, port = port, "inbound transport registered");
        self.transports.push(transport);
        Ok(())
    }

    pub fn register_transport(&mut self, transport: Box<dyn InboundTransport>) {
        self.transports.push(transport);
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    /// Start every transport. Fails as soon as one cannot listen, stopping
    /// the ones already started.
    pub async fn start_all(
        &self,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Vec<SocketAddr>, TransportError> {
        let starts = self
            .transports
            .iter()
            .map(|t| t.start(handler.clone(), self.shutdown.child_token(), &self.tasks));
        match futures::future::try_join_all(starts).await {
            Ok(addrs) => {
                for (transport, addr) in self.transports.iter().zip(&addrs) {
                    tracing::info!(scheme = transport.scheme(), %addr, "inbound transport listening");
                }
                Ok(addrs)
            }
            Err(e) => {
                self.shutdown.cancel();
                Err(e)
            }
        }
    }

    /// Stop listening and wait for open requests and sockets to finish.
    pub async fn stop_all(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!("inbound transports stopped");
    }
}
