use std::time::Duration;

use async_trait::async_trait;

use super::OutboundTransport;
use crate::error::TransportError;

const SCHEMES: &[&str] = &["http", "https"];

/// POSTs the payload as JSON.
pub struct HttpOutbound {
    client: reqwest::Client,
}

impl HttpOutbound {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::TransportSetup(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OutboundTransport for HttpOutbound {
    fn schemes(&self) -> &'static [&'static str] {
        SCHEMES
    }

    async fn deliver(&self, payload: &str, endpoint: &str) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Delivery(format!(
                "{} answered {}",
                endpoint,
                resp.status()
            )));
        }
        Ok(())
    }
}
