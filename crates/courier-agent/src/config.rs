//! Agent configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use courier_core::settings::keys;
use courier_core::Settings;
use courier_transport::OutboundConfig;

/// Full configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    /// Identity and advertised addressing.
    #[serde(default)]
    pub agent: IdentityConfig,

    /// Inbound listeners and outbound delivery.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Which protocol steps run without a controller.
    #[serde(default)]
    pub protocols: ProtocolConfig,

    /// Admin API settings.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Webhook delivery of agent events.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Label shown to peers.
    #[serde(default = "default_label")]
    pub label: String,
    /// Endpoint peers send messages to.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Seed for the public DID; no public DID without one.
    #[serde(default)]
    pub seed: Option<String>,
    /// Create an invitation at startup and log its URL.
    #[serde(default)]
    pub invite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundConfig {
    /// Transport kind (`http`, `ws`).
    pub kind: String,
    #[serde(default = "default_listen_addr")]
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_inbound")]
    pub inbound: Vec<InboundConfig>,
    /// Outbound transport kinds.
    #[serde(default = "default_outbound")]
    pub outbound: Vec<String>,
    #[serde(default)]
    pub delivery: OutboundConfig,
    /// Seconds to wait for in-flight messages at shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub accept_invites: bool,
    #[serde(default)]
    pub accept_requests: bool,
    #[serde(default)]
    pub auto_respond_credential_offer: bool,
    #[serde(default)]
    pub auto_verify_presentation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Whether the admin API is served.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_admin_addr")]
    pub listen_addr: String,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

/// Record storage. `rocksdb` persists connection and exchange records, but
/// the wallet holding DIDs, keys and pairwise data is always in memory.
/// Connections stored by an earlier run cannot be resolved after a restart
/// and are reported at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `memory` or `rocksdb`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Path to the data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Base URL events are posted under; no webhooks without one.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_webhook_workers")]
    pub workers: usize,
    #[serde(default = "default_webhook_queue")]
    pub queue_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_label() -> String {
    "Courier Agent".into()
}
fn default_listen_addr() -> String {
    "0.0.0.0".into()
}
fn default_inbound() -> Vec<InboundConfig> {
    vec![
        InboundConfig {
            kind: "http".into(),
            host: default_listen_addr(),
            port: 8020,
        },
        InboundConfig {
            kind: "ws".into(),
            host: default_listen_addr(),
            port: 8021,
        },
    ]
}
fn default_outbound() -> Vec<String> {
    vec!["http".into(), "ws".into()]
}
fn default_shutdown_timeout() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_admin_addr() -> String {
    "127.0.0.1".into()
}
fn default_admin_port() -> u16 {
    8030
}
fn default_backend() -> String {
    "memory".into()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_webhook_workers() -> usize {
    4
}
fn default_webhook_queue() -> usize {
    256
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            endpoint: None,
            seed: None,
            invite: false,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            inbound: default_inbound(),
            outbound: default_outbound(),
            delivery: OutboundConfig::default(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_admin_addr(),
            port: default_admin_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            workers: default_webhook_workers(),
            queue_size: default_webhook_queue(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AgentConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: AgentConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// The endpoint to advertise: the configured one, else the first
    /// inbound http listener.
    pub fn advertised_endpoint(&self) -> Option<String> {
        self.agent.endpoint.clone().or_else(|| {
            self.transport
                .inbound
                .iter()
                .find(|t| t.kind == "http")
                .map(|t| format!("http://{}:{}", t.host, t.port))
        })
    }

    /// Root settings for the injection context.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::new()
            .with(keys::DEFAULT_LABEL, self.agent.label.as_str())
            .with(keys::ACCEPT_INVITES, self.protocols.accept_invites)
            .with(keys::ACCEPT_REQUESTS, self.protocols.accept_requests)
            .with(
                keys::AUTO_RESPOND_CREDENTIAL_OFFER,
                self.protocols.auto_respond_credential_offer,
            )
            .with(keys::AUTO_VERIFY_PRESENTATION, self.protocols.auto_verify_presentation);
        if let Some(endpoint) = self.advertised_endpoint() {
            settings = settings.with(keys::DEFAULT_ENDPOINT, endpoint);
        }
        settings
    }
}
