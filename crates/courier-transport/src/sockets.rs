//! Open inbound WebSocket connections that replies can be written to.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

const SOCKET_BUFFER: usize = 64;

/// Outgoing side of every open inbound socket, keyed by socket id.
#[derive(Debug, Clone, Default)]
pub struct SocketRegistry {
    sockets: Arc<DashMap<String, mpsc::Sender<String>>>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new socket. Frames sent to its id arrive on the receiver.
    pub fn open(&self) -> (String, mpsc::Receiver<String>) {
        let id = uuid::Uuid::now_v7().to_string();
        let (tx, rx) = mpsc::channel(SOCKET_BUFFER);
        self.sockets.insert(id.clone(), tx);
        (id, rx)
    }

    pub fn close(&self, socket_id: &str) {
        self.sockets.remove(socket_id);
    }

    pub fn is_open(&self, socket_id: &str) -> bool {
        self.sockets
            .get(socket_id)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Queue a text frame on an open socket. Returns false when the socket
    /// is gone.
    pub async fn send(&self, socket_id: &str, payload: String) -> bool {
        let Some(tx) = self.sockets.get(socket_id).map(|tx| tx.clone()) else {
            return false;
        };
        if tx.send(payload).await.is_err() {
            self.sockets.remove(socket_id);
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}
