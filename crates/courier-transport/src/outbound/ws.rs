use async_trait::async_trait;
use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;

use super::OutboundTransport;
use crate::error::TransportError;

const SCHEMES: &[&str] = &["ws", "wss"];

/// Opens a socket per message and sends it as one text frame.
#[derive(Debug, Default)]
pub struct WsOutbound;

#[async_trait]
impl OutboundTransport for WsOutbound {
    fn schemes(&self) -> &'static [&'static str] {
        SCHEMES
    }

    async fn deliver(&self, payload: &str, endpoint: &str) -> Result<(), TransportError> {
        let (mut socket, _) = tokio_tungstenite::connect_async(endpoint).await?;
        socket.send(Message::Text(payload.to_string())).await?;
        socket.close(None).await?;
        Ok(())
    }
}
