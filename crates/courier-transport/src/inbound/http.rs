//! HTTP inbound transport. `POST /` carries a message, `GET /?c_i=` an
//! invitation.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use courier_crypto::b64url_decode;

use super::{InboundTransport, MessageHandler};
use crate::error::TransportError;

pub const SCHEME: &str = "http";
pub const INVITATION_SCHEME: &str = "invitation";

pub struct HttpTransport {
    host: String,
    port: u16,
}

impl HttpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[derive(Deserialize)]
struct InvitationQuery {
    c_i: Option<String>,
}

fn reject(message: String) -> Response {
    tracing::warn!(error = %message, "inbound http message rejected");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "message": message})),
    )
        .into_response()
}

async fn handle_invitation(
    State(handler): State<Arc<dyn MessageHandler>>,
    Query(query): Query<InvitationQuery>,
) -> Response {
    let Some(encoded) = query.c_i else {
        return "To send an invitation add ?c_i=<base64invite>".into_response();
    };
    let payload = match b64url_decode(&encoded) {
        Ok(payload) => payload,
        Err(e) => return reject(format!("Error decoding invitation: {}", e)),
    };
    match handler
        .handle_message(Bytes::from(payload), INVITATION_SCHEME, None)
        .await
    {
        Ok(()) => "Invitation received".into_response(),
        Err(e) => reject(format!("Error handling invitation: {}", e)),
    }
}

async fn handle_message(
    State(handler): State<Arc<dyn MessageHandler>>,
    body: Bytes,
) -> Response {
    match handler.handle_message(body, SCHEME, None).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => reject(format!("Error handling message: {}", e)),
    }
}

pub fn build_router(handler: Arc<dyn MessageHandler>) -> Router {
    Router::new()
        .route("/", get(handle_invitation).post(handle_message))
        .with_state(handler)
}

#[async_trait]
impl InboundTransport for HttpTransport {
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
            TransportError::TransportSetup(format!("unable to start http on {}: {}", address, e))
        })?;
        let local = listener
            .local_addr()
            .map_err(|e| TransportError::TransportSetup(e.to_string()))?;

        let app = build_router(handler);
        tasks.spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                tracing::error!(error = %e, "http inbound transport error");
            }
        });
        Ok(local)
    }
}
