//! Agent assembly: binds the capabilities, starts the transports and the
//! admin API, and tears everything down in order.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use courier_core::{
    Holder, InjectionContext, Issuer, Ledger, Storage, TagFilter, Verifier, Wallet,
};
use courier_messaging::MessageFactory;
use courier_protocols::{
    ConnectionManager, Dispatcher, DriverMenuService, EventHook, ExchangeLocks, MenuService,
    MessageDelivery,
};
use courier_transport::{
    InboundTransportManager, MessageHandler, OutboundTransportManager, SocketRegistry,
    TransportError,
};
use courier_wallet::{BasicHolder, BasicIssuer, BasicLedger, BasicStorage, BasicVerifier, BasicWallet};

use crate::admin::{self, AdminState};
use crate::config::AgentConfig;
use crate::storage::RocksStorage;
use crate::webhook::WebhookDispatcher;

/// Hands every inbound payload to the dispatcher as its own task.
struct InboundHandler {
    dispatcher: Arc<Dispatcher>,
}

#[async_trait]
impl MessageHandler for InboundHandler {
    async fn handle_message(
        &self,
        payload: Bytes,
        scheme: &str,
        socket_id: Option<String>,
    ) -> Result<(), TransportError> {
        let raw: Value = serde_json::from_slice(&payload)
            .map_err(|e| TransportError::Rejected(format!("payload is not JSON: {}", e)))?;
        let mut delivery = MessageDelivery::new(scheme);
        delivery.socket_id = socket_id;
        self.dispatcher.spawn_dispatch(raw, delivery);
        Ok(())
    }
}

/// A running agent.
/// Stored connections whose local DID the wallet cannot resolve. Keys live
/// in memory only, so persisted connections from an earlier run land here.
pub async fn unresolvable_connections(context: &InjectionContext) -> anyhow::Result<Vec<String>> {
    let wallet = context.inject::<dyn Wallet>()?;
    let records = ConnectionManager::new(context)?
        .list_connections(&TagFilter::new())
        .await?;
    let mut stale = Vec::new();
    for record in records {
        if let Some(did) = &record.my_did {
            if wallet.get_local_did(did).await.is_err() {
                stale.push(record.connection_id);
            }
        }
    }
    Ok(stale)
}

pub struct Conductor {
    config: AgentConfig,
    dispatcher: Arc<Dispatcher>,
    inbound: InboundTransportManager,
    outbound: OutboundTransportManager,
    webhooks: Option<Arc<WebhookDispatcher>>,
    inbound_addrs: Vec<SocketAddr>,
    admin_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Conductor {
    /// Bind every capability in a root context built from `config`.
    async fn build_context(
        config: &AgentConfig,
        webhooks: Option<Arc<WebhookDispatcher>>,
    ) -> anyhow::Result<InjectionContext> {
        let mut context = InjectionContext::new(config.settings());

        let wallet: Arc<dyn Wallet> = Arc::new(BasicWallet::new());
        context.bind_instance::<dyn Wallet>(wallet.clone());

        let storage: Arc<dyn Storage> = match config.storage.backend.as_str() {
            "memory" => Arc::new(BasicStorage::new()),
            "rocksdb" => {
                let path = config.storage.data_dir.join("records");
                Arc::new(
                    RocksStorage::open(&path)
                        .with_context(|| format!("opening storage at {}", path.display()))?,
                )
            }
            other => anyhow::bail!("unknown storage backend: {}", other),
        };
        context.bind_instance::<dyn Storage>(storage);

        let ledger = Arc::new(BasicLedger::new(wallet.clone()));
        if let Some(seed) = &config.agent.seed {
            let public = wallet.create_public_did(Some(seed.as_str())).await?;
            ledger.register_nym(
                &public.did,
                &public.verkey,
                config.advertised_endpoint().as_deref(),
            );
            tracing::info!(did = %public.did, "public DID registered");
        }
        let ledger: Arc<dyn Ledger> = ledger;
        context.bind_instance::<dyn Ledger>(ledger.clone());
        context.bind_instance::<dyn Issuer>(Arc::new(BasicIssuer::new(wallet, ledger)));
        context.bind_instance::<dyn Holder>(Arc::new(BasicHolder::new()));
        context.bind_instance::<dyn Verifier>(Arc::new(BasicVerifier::new()));
        context.bind_instance::<ExchangeLocks>(Arc::new(ExchangeLocks::new()));

        if let Some(webhooks) = webhooks {
            let events: Arc<dyn EventHook> = webhooks;
            context.bind_instance::<dyn EventHook>(events.clone());
            context.bind_instance::<dyn MenuService>(Arc::new(DriverMenuService::new(events)));
        }
        Ok(context)
    }

    /// Start the agent. Returns once every listener is bound.
    pub async fn start(config: AgentConfig) -> anyhow::Result<Self> {
        let webhooks = match &config.webhook.url {
            Some(url) => Some(Arc::new(WebhookDispatcher::start(url, &config.webhook)?)),
            None => None,
        };
        let context = Self::build_context(&config, webhooks.clone()).await?;
        if config.storage.backend == "rocksdb" {
            let stale = unresolvable_connections(&context).await?;
            if !stale.is_empty() {
                tracing::warn!(
                    count = stale.len(),
                    connections = ?stale,
                    "stored connections use DIDs the memory-only wallet no longer holds"
                );
            }
        }

        let sockets = SocketRegistry::new();
        let mut outbound =
            OutboundTransportManager::new(config.transport.delivery.clone(), sockets.clone());
        for kind in &config.transport.outbound {
            outbound.register(kind)?;
        }
        outbound.start_all()?;

        let dispatcher = Arc::new(Dispatcher::new(
            context,
            Arc::new(MessageFactory::new()),
            outbound.sender(),
        ));

        let mut inbound = InboundTransportManager::new(sockets);
        for transport in &config.transport.inbound {
            inbound.register(&transport.kind, &transport.host, transport.port)?;
        }
        let handler = Arc::new(InboundHandler {
            dispatcher: dispatcher.clone(),
        });
        let inbound_addrs = match inbound.start_all(handler).await {
            Ok(addrs) => addrs,
            Err(e) => {
                outbound.stop_all().await;
                return Err(e.into());
            }
        };

        let shutdown = CancellationToken::new();
        let tasks = TaskTracker::new();
        let admin_addr = if config.admin.enabled {
            let listen_addr: SocketAddr =
                format!("{}:{}", config.admin.listen_addr, config.admin.port)
                    .parse()
                    .context("invalid admin listen address")?;
            let state = Arc::new(AdminState {
                dispatcher: dispatcher.clone(),
                outbound: outbound.sender(),
                label: config.agent.label.clone(),
                endpoint: config.advertised_endpoint(),
                start_time: Instant::now(),
            });
            Some(admin::start_admin_server(listen_addr, state, shutdown.child_token(), &tasks).await?)
        } else {
            None
        };

        let conductor = Self {
            config,
            dispatcher,
            inbound,
            outbound,
            webhooks,
            inbound_addrs,
            admin_addr,
            shutdown,
            tasks,
        };
        if conductor.config.agent.invite {
            conductor.log_invitation().await?;
        }
        tracing::info!(label = %conductor.config.agent.label, "agent started");
        Ok(conductor)
    }

    async fn log_invitation(&self) -> anyhow::Result<()> {
        let connections = ConnectionManager::new(self.dispatcher.context())?;
        let (record, invitation) = connections.create_invitation(None, None, None).await?;
        if let Some(url) = admin::invitation_url(&invitation)? {
            tracing::info!(
                connection_id = %record.connection_id,
                invitation_url = %url,
                "invitation ready"
            );
        }
        Ok(())
    }

    pub fn context(&self) -> &InjectionContext {
        self.dispatcher.context()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Bound inbound addresses, in configuration order.
    pub fn inbound_addrs(&self) -> &[SocketAddr] {
        &self.inbound_addrs
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    /// Stop listeners, let in-flight messages finish, drain the outbound
    /// queue, then drain webhooks.
    pub async fn shutdown(self) {
        tracing::info!("agent shutting down");
        self.shutdown.cancel();
        self.tasks.close();
        self.inbound.stop_all().await;
        self.tasks.wait().await;

        let timeout = Duration::from_secs(self.config.transport.shutdown_timeout_secs);
        if !self.dispatcher.shutdown(timeout).await {
            tracing::warn!("in-flight messages abandoned at shutdown");
        }
        self.outbound.stop_all().await;
        if let Some(webhooks) = &self.webhooks {
            webhooks.shutdown().await;
        }
        tracing::info!("agent stopped");
    }
}
