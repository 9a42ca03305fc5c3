//! Bridge facade wiring configuration, routing, the connection runtime,
//! the relay and the command center together.

pub mod command;
pub mod dash;
pub mod event;
pub mod rcon;
pub mod relay;
pub mod route;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::chat::{is_own_echo, ChatSession, RecipientDirectory};
use crate::common::ConfigError;
use crate::config::{BridgeConfig, ConfigHandle};
use crate::runtime::ConnectionRuntime;
use crate::transport::TransportFactory;

use command::CommandCenter;
use relay::RelayOrchestrator;
use route::RoutingTable;

/// One configured bridge instance.
pub struct Bridge {
    config: ConfigHandle,
    routes: RoutingTable,
    runtime: Arc<ConnectionRuntime>,
    relay: Arc<RelayOrchestrator>,
    commands: CommandCenter,
    recipients: Arc<dyn RecipientDirectory>,
    stopping: AtomicBool,
    events: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
    /// Annotated game events re-emitted for host components.
    external: broadcast::Sender<Value>,
}

impl Bridge {
    /// Build a bridge from raw configuration and the two external
    /// capabilities: a transport factory and a recipient directory.
    pub fn new(
        raw_config: Value,
        factory: Arc<dyn TransportFactory>,
        recipients: Arc<dyn RecipientDirectory>,
    ) -> Result<Self, ConfigError> {
        let config = BridgeConfig::load(raw_config)?;
        let routes = RoutingTable::new();
        routes.reset(&config.servers);

        let handle = ConfigHandle::new(config);
        let (runtime, events) = ConnectionRuntime::new(handle.clone(), factory);
        let relay = Arc::new(RelayOrchestrator::new(
            handle.clone(),
            routes.clone(),
            runtime.clone(),
            recipients.clone(),
        ));
        let commands = CommandCenter::new(handle.clone(), routes.clone(), runtime.clone());
        let (external, _) = broadcast::channel(64);

        Ok(Self {
            config: handle,
            routes,
            runtime,
            relay,
            commands,
            recipients,
            stopping: AtomicBool::new(false),
            events: Mutex::new(Some(events)),
            external,
        })
    }

    /// Start the signal loop, the event pump and the transports.
    pub async fn start(&self) -> crate::common::RuntimeResult<()> {
        self.runtime.spawn_signal_loop();

        let receiver = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(mut receiver) = receiver {
            let relay = self.relay.clone();
            let external = self.external.clone();
            tokio::spawn(async move {
                while let Some(event) = receiver.recv().await {
                    // No subscribers is not an error.
                    let _ = external.send(event.clone());
                    relay.on_event(event).await;
                }
            });
        }

        self.runtime.boot().await?;
        info!("Bridge started");
        Ok(())
    }

    /// Handle one inbound chat message: commands first, then relay.
    pub async fn handle_message(&self, session: &dyn ChatSession) {
        if self.stopping.load(Ordering::SeqCst) {
            return;
        }
        if is_own_echo(session, self.recipients.as_ref()) {
            return;
        }
        if self.commands.handle_message(session).await {
            return;
        }
        self.relay.on_group(session).await;
    }

    /// Swap in a new configuration and reconnect with it.
    pub async fn reconfigure(&self, raw_config: Value) -> Result<(), ConfigError> {
        let config = BridgeConfig::load(raw_config)?;
        self.routes.reset(&config.servers);
        self.config.replace(config);
        if let Err(e) = self.runtime.reconnect().await {
            tracing::warn!(error = %e, "Reconnect after reconfiguration failed");
        }
        Ok(())
    }

    /// Subscribe to the annotated game-event stream. Every inbound event
    /// is re-emitted here in addition to being relayed into chat.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.external.subscribe()
    }

    /// Administrative request entry point for host components. When no
    /// server name is given the single connected server is inferred.
    pub async fn request(
        &self,
        server_name: Option<&str>,
        api: &str,
        data: Value,
    ) -> crate::common::RuntimeResult<Value> {
        self.runtime
            .request_auto(server_name, api, data, crate::transport::RequestOptions::default())
            .await
    }

    /// Stop handling messages and close every transport.
    pub async fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.runtime.close().await;
        info!("Bridge stopped");
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn runtime(&self) -> &Arc<ConnectionRuntime> {
        &self.runtime
    }
}
