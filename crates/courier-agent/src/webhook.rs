//! Webhook delivery of agent events to a controller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use courier_protocols::EventHook;

use crate::config::WebhookConfig;

#[derive(Debug, Clone, Serialize)]
struct WebhookEvent {
    topic: String,
    payload: Value,
}

/// Posts each event to `<url>/topic/<topic>/` from a pool of workers.
pub struct WebhookDispatcher {
    // Taken at shutdown; workers exit once the queue is empty.
    sender: StdMutex<Option<mpsc::Sender<WebhookEvent>>>,
    workers: Mutex<JoinSet<()>>,
}

impl WebhookDispatcher {
    pub fn start(url: &str, config: &WebhookConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let base = url.trim_end_matches('/').to_string();
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = JoinSet::new();
        for worker in 0..config.workers.max(1) {
            let receiver = receiver.clone();
            let client = client.clone();
            let base = base.clone();
            workers.spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(event) = next else {
                        break;
                    };
                    post(&client, &base, &event).await;
                }
                tracing::debug!(worker, "webhook worker stopped");
            });
        }
        tracing::info!(url = %base, workers = config.workers.max(1), "webhook delivery started");

        Ok(Self {
            sender: StdMutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    /// Stop accepting events and wait for queued ones to be posted.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let mut workers = self.workers.lock().await;
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "webhook worker panicked");
            }
        }
        tracing::info!("webhook delivery stopped");
    }
}

async fn post(client: &reqwest::Client, base: &str, event: &WebhookEvent) {
    let url = format!("{}/topic/{}/", base, event.topic);
    match client.post(&url).json(event).send().await {
        Ok(response) if response.status().is_success() => {
            tracing::debug!(topic = %event.topic, "webhook delivered");
        }
        Ok(response) => {
            tracing::warn!(topic = %event.topic, status = %response.status(), "webhook rejected");
        }
        Err(e) => {
            tracing::warn!(topic = %event.topic, error = %e, "webhook delivery failed");
        }
    }
}

#[async_trait]
impl EventHook for WebhookDispatcher {
    async fn emit(&self, topic: &str, payload: Value) {
        let event = WebhookEvent {
            topic: topic.to_string(),
            payload,
        };
        let sender = self.sender.lock().ok().and_then(|s| s.clone());
        let Some(sender) = sender else {
            tracing::debug!(topic = %event.topic, "webhook delivery stopped, dropping event");
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(topic = %event.topic, "webhook queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!(topic = %event.topic, "webhook delivery stopped, dropping event");
            }
        }
    }
}
