//! WebSocket inbound transport. Each frame is one message; replies for the
//! socket are written back through the [`SocketRegistry`].

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::{InboundTransport, MessageHandler};
use crate::error::TransportError;
use crate::sockets::SocketRegistry;

pub const SCHEME: &str = "ws";

/// Text frame that asks the server to close the socket.
const CLOSE_FRAME: &str = "close";

pub struct WsTransport {
    host: String,
    port: u16,
    sockets: SocketRegistry,
}

impl WsTransport {
    pub fn new(host: impl Into<String>, port: u16, sockets: SocketRegistry) -> Self {
        Self {
            host: host.into(),
            port,
            sockets,
        }
    }
}

#[derive(Clone)]
struct WsState {
    handler: Arc<dyn MessageHandler>,
    sockets: SocketRegistry,
    shutdown: CancellationToken,
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (socket_id, mut outgoing) = state.sockets.open();
    tracing::debug!(socket_id = %socket_id, "websocket connected");
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            frame = outgoing.recv() => {
                let Some(payload) = frame else { break };
                if sender.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                let payload = match incoming {
                    Some(Ok(Message::Text(text))) if text.as_str() == CLOSE_FRAME => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                    Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_str().as_bytes()),
                    Some(Ok(Message::Binary(data))) => data,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(socket_id = %socket_id, error = %e, "websocket receive error");
                        break;
                    }
                };
                if let Err(e) = state
                    .handler
                    .handle_message(payload, SCHEME, Some(socket_id.clone()))
                    .await
                {
                    tracing::warn!(socket_id = %socket_id, error = %e, "inbound ws message rejected");
                    let reply = json!({"success": false, "message": e.to_string()}).to_string();
                    if sender.send(Message::Text(reply.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    state.sockets.close(&socket_id);
    tracing::debug!(socket_id = %socket_id, "websocket closed");
}

#[async_trait]
impl InboundTransport for WsTransport {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    async fn start(
        &self,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
        tasks: &TaskTracker,
    ) -> Result<SocketAddr, TransportError> {
        let address = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
            TransportError::TransportSetup(format!("unable to start ws on {}: {}", address, e))
        })?;
        let local = listener
            .local_addr()
            .map_err(|e| TransportError::TransportSetup(e.to_string()))?;

        let app = Router::new().route("/", get(upgrade)).with_state(WsState {
            handler,
            sockets: self.sockets.clone(),
            shutdown: shutdown.clone(),
        });
        tasks.spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                tracing::error!(error = %e, "ws inbound transport error");
            }
        });
        Ok(local)
    }
}
