//! Connection runtime.
//!
//! Owns the forward and reverse transport clients, keeps them in sync with
//! the current configuration and funnels their signals into one place.
//! Requests fail over between the two clients; game events come out the
//! other side as a single annotated stream.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use futures::future::join_all;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::common::text::non_empty;
use crate::common::{RuntimeError, RuntimeResult};
use crate::config::ConfigHandle;
use crate::transport::{
    ConnSpec, ListenSpec, RequestOptions, SignalSender, Transport, TransportFactory,
    TransportSignal,
};

/// Close code sent when the runtime shuts a connection down on purpose.
const CLOSE_NORMAL: u16 = 1000;

#[derive(Default)]
struct RuntimeState {
    forward: Option<Arc<dyn Transport>>,
    reverse: Option<Arc<dyn Transport>>,
    booted: bool,
    /// Servers whose reconnect loop was stopped after exhausting retries.
    paused: HashSet<String>,
}

/// Shared transport orchestrator. One per bridge instance.
pub struct ConnectionRuntime {
    config: ConfigHandle,
    factory: Arc<dyn TransportFactory>,
    event_tx: mpsc::UnboundedSender<Value>,
    signal_tx: SignalSender,
    signal_rx: StdMutex<Option<mpsc::UnboundedReceiver<TransportSignal>>>,
    state: Mutex<RuntimeState>,
    /// Serializes boots so concurrent callers share one attempt.
    boot_gate: Mutex<()>,
}

impl ConnectionRuntime {
    /// Build a runtime and the receiver for annotated game events.
    pub fn new(
        config: ConfigHandle,
        factory: Arc<dyn TransportFactory>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Value>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(Self {
            config,
            factory,
            event_tx,
            signal_tx,
            signal_rx: StdMutex::new(Some(signal_rx)),
            state: Mutex::new(RuntimeState::default()),
            boot_gate: Mutex::new(()),
        });
        (runtime, event_rx)
    }

    /// Drain transport signals on a background task. Holds only a weak
    /// handle so the runtime can be dropped while the task is alive.
    pub fn spawn_signal_loop(self: &Arc<Self>) {
        let receiver = self
            .signal_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(mut receiver) = receiver else {
            return;
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(signal) = receiver.recv().await {
                let Some(runtime) = weak.upgrade() else {
                    break;
                };
                runtime.handle_signal(signal).await;
            }
        });
    }

    /// Connect everything once. Subsequent calls are no-ops until the
    /// runtime is closed or reconnected.
    pub async fn boot(&self) -> RuntimeResult<()> {
        self.boot_with(false).await
    }

    async fn boot_with(&self, force: bool) -> RuntimeResult<()> {
        if !force && self.state.lock().await.booted {
            return Ok(());
        }
        let _gate = self.boot_gate.lock().await;
        if !force && self.state.lock().await.booted {
            return Ok(());
        }
        self.start().await
    }

    /// Tear everything down and boot again from the current configuration.
    pub async fn reconnect(&self) -> RuntimeResult<()> {
        self.state.lock().await.booted = false;
        self.boot_with(true).await
    }

    async fn start(&self) -> RuntimeResult<()> {
        self.teardown().await;
        let config = self.config.get();

        // A forced boot also lifts any retry pauses.
        self.state.lock().await.paused.clear();

        // A listener that cannot start must not take the forward side
        // down with it; the operator sees the warning and can reconnect.
        if config.reverse {
            if let Err(e) = self.start_reverse(&config).await {
                warn!(error = %e, "Reverse listener failed to start, continuing with forward only");
            }
        }
        self.start_forward(&config).await;

        self.state.lock().await.booted = true;
        Ok(())
    }

    async fn start_reverse(&self, config: &crate::config::BridgeConfig) -> RuntimeResult<()> {
        let path = config.listen_path.trim();
        if config.listen_port == 0 || path.is_empty() {
            error!(
                port = config.listen_port,
                path, "Reverse listener misconfigured, skipping"
            );
            return Ok(());
        }
        let listen = ListenSpec {
            port: config.listen_port,
            path: path.to_string(),
            access_token: non_empty(&config.reverse_token).map(str::to_string),
        };
        let client = self.factory.reverse(listen, self.signal_tx.clone());
        client.connect().await?;
        self.state.lock().await.reverse = Some(client);
        Ok(())
    }

    fn build_forward_specs(config: &crate::config::BridgeConfig) -> Vec<ConnSpec> {
        let mut specs: Vec<ConnSpec> = Vec::new();
        let mut index: BTreeMap<String, usize> = BTreeMap::new();
        for route in &config.servers {
            if !route.forward {
                continue;
            }
            let (Some(name), Some(url)) = (non_empty(&route.name), non_empty(&route.url)) else {
                warn!(name = %route.name, "Forward route missing name or url, skipping");
                continue;
            };
            let spec = ConnSpec {
                self_name: name.to_string(),
                url: url.to_string(),
                access_token: non_empty(&route.token).map(str::to_string),
            };
            // Duplicate names keep their first slot but take the last spec.
            match index.get(name) {
                Some(&at) => specs[at] = spec,
                None => {
                    index.insert(name.to_string(), specs.len());
                    specs.push(spec);
                }
            }
        }
        specs
    }

    async fn start_forward(&self, config: &crate::config::BridgeConfig) {
        let specs = Self::build_forward_specs(config);
        if specs.is_empty() {
            return;
        }
        let client = self.factory.forward(specs, self.signal_tx.clone());
        self.state.lock().await.forward = Some(client.clone());
        // The transport retries on its own schedule after a failed dial.
        if let Err(e) = client.connect().await {
            warn!(error = %e, "Forward connect failed, transport will retry");
        }
    }

    async fn teardown(&self) {
        let (forward, reverse) = {
            let mut state = self.state.lock().await;
            state.booted = false;
            (state.forward.take(), state.reverse.take())
        };
        for client in [reverse, forward].into_iter().flatten() {
            if let Err(e) = client.close().await {
                debug!(error = %e, "Transport close reported an error");
            }
        }
    }

    /// Close all transports and forget them. Boot starts fresh afterwards.
    pub async fn close(&self) {
        self.teardown().await;
    }

    /// Permanently close the named sub-connections on every client.
    pub async fn close_connection(&self, names: &[String]) {
        let names: Vec<&str> = names
            .iter()
            .filter_map(|n| non_empty(n))
            .collect();
        if names.is_empty() {
            return;
        }
        let clients = self.clients().await;
        let mut closes = Vec::new();
        for client in &clients {
            for name in &names {
                closes.push(client.close_one(name, CLOSE_NORMAL, "max retry reached"));
            }
        }
        for result in join_all(closes).await {
            if let Err(e) = result {
                debug!(error = %e, "Close reported an error");
            }
        }
    }

    /// Drop and re-dial one server's connections on every client that
    /// knows it.
    pub async fn reconnect_one(&self, server_name: &str) -> RuntimeResult<()> {
        let name = non_empty(server_name).ok_or(RuntimeError::MissingServerName)?;
        self.boot().await?;

        let clients = self.clients().await;
        if clients.is_empty() {
            return Err(RuntimeError::NoConnection {
                server: name.to_string(),
            });
        }

        let mut touched = false;
        for client in &clients {
            if !client.list().iter().any(|n| n == name) {
                continue;
            }
            touched = true;
            if let Err(e) = client.close_one(name, CLOSE_NORMAL, "manual reconnect").await {
                debug!(error = %e, server = name, "Close before reconnect failed");
            }
            if let Err(e) = client.connect_one(name).await {
                warn!(error = %e, server = name, "Reconnect dial failed, transport will retry");
            }
        }
        if !touched {
            return Err(RuntimeError::RouteNotFound {
                server: name.to_string(),
            });
        }
        self.state.lock().await.paused.remove(name);
        Ok(())
    }

    /// Names of servers with at least one open connection, sorted. When no
    /// client can report status, falls back to every known name.
    pub async fn connected_names(&self) -> Vec<String> {
        let clients = self.clients().await;
        let mut open: BTreeMap<String, bool> = BTreeMap::new();
        for client in &clients {
            for status in client.status() {
                let entry = open.entry(status.self_name).or_insert(false);
                *entry |= status.open;
            }
        }
        if open.is_empty() {
            let mut names: Vec<String> = clients.iter().flat_map(|c| c.list()).collect();
            names.sort();
            names.dedup();
            return names;
        }
        open.into_iter()
            .filter_map(|(name, is_open)| is_open.then_some(name))
            .collect()
    }

    /// Send one request, failing over between clients. Clients already
    /// holding the named connection are tried first, reverse before forward.
    pub async fn request(
        &self,
        server_name: &str,
        api: &str,
        data: Value,
        options: RequestOptions,
    ) -> RuntimeResult<Value> {
        self.boot().await?;
        let server = non_empty(server_name).ok_or(RuntimeError::MissingServerName)?;
        let api = non_empty(api).ok_or(RuntimeError::EmptyApi)?;
        if !data.is_object() {
            return Err(RuntimeError::InvalidPayload);
        }

        let clients = self.clients().await;
        if clients.is_empty() {
            return Err(RuntimeError::NoConnection {
                server: server.to_string(),
            });
        }
        let (hits, misses): (Vec<_>, Vec<_>) = clients
            .into_iter()
            .partition(|client| client.list().iter().any(|n| n == server));

        let mut last_error = None;
        for client in hits.into_iter().chain(misses) {
            match client.request(server, api, data.clone(), options.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(error = %e, server, api, "Request failed, trying next client");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .map(RuntimeError::from)
            .unwrap_or(RuntimeError::NoConnection {
                server: server.to_string(),
            }))
    }

    /// Like [`request`](Self::request), but when no server name is given
    /// the single connected server is used. Zero or several connected
    /// servers make the target ambiguous.
    pub async fn request_auto(
        &self,
        server_name: Option<&str>,
        api: &str,
        data: Value,
        options: RequestOptions,
    ) -> RuntimeResult<Value> {
        if let Some(name) = server_name.and_then(non_empty) {
            return self.request(name, api, data, options).await;
        }
        let connected = self.connected_names().await;
        match connected.as_slice() {
            [] => Err(RuntimeError::NoServersOnline),
            [only] => self.request(only, api, data, options).await,
            _ => Err(RuntimeError::AmbiguousServer),
        }
    }

    async fn clients(&self) -> Vec<Arc<dyn Transport>> {
        let state = self.state.lock().await;
        [state.reverse.clone(), state.forward.clone()]
            .into_iter()
            .flatten()
            .collect()
    }

    async fn handle_signal(&self, signal: TransportSignal) {
        match signal {
            TransportSignal::Open { mode, server } => {
                info!(%mode, server, "Connection open");
            }
            TransportSignal::Closed {
                mode,
                server,
                code,
                reason,
            } => {
                warn!(%mode, server, code, reason, "Connection closed");
            }
            TransportSignal::Error {
                mode,
                server,
                message,
            } => {
                warn!(%mode, server, message, "Connection error");
            }
            TransportSignal::Reconnect {
                mode,
                server,
                attempt,
                delay_ms,
            } => {
                debug!(%mode, server, attempt, delay_ms, "Reconnect scheduled");
                self.on_reconnect(&server, attempt).await;
            }
            TransportSignal::Event { mode, payload } => {
                debug!(%mode, "Game event received");
                self.on_transport_event(payload).await;
            }
        }
    }

    /// Stop retrying a server that has exhausted its configured attempts.
    async fn on_reconnect(&self, server: &str, attempt: u32) {
        let Some(name) = non_empty(server) else {
            return;
        };
        let config = self.config.get();
        let max_retries = config
            .servers
            .iter()
            .find(|route| route.name == name)
            .map(|route| route.max_retries)
            .unwrap_or(0);
        if max_retries == 0 || attempt < max_retries {
            return;
        }
        let first_time = self.state.lock().await.paused.insert(name.to_string());
        if !first_time {
            return;
        }
        warn!(
            server = name,
            max_retries, "Retry limit reached, closing the connection"
        );
        self.close_connection(&[name.to_string()]).await;
    }

    async fn on_transport_event(&self, payload: Value) {
        let Some(mut event) = unwrap_event(payload) else {
            debug!("Dropping a transport event with no recognizable envelope");
            return;
        };
        let missing_name = event
            .get("server_name")
            .and_then(Value::as_str)
            .and_then(non_empty)
            .is_none();
        if missing_name {
            let connected = self.connected_names().await;
            if let [only] = connected.as_slice() {
                event["server_name"] = json!(only);
            }
        }
        // The receiver going away just means the bridge is shutting down.
        let _ = self.event_tx.send(event);
    }
}

fn looks_like_event(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        obj.contains_key("post_type")
            || obj.contains_key("sub_type")
            || obj.contains_key("event_name")
    })
}

/// Peel the event out of whatever envelope the transport delivered: a bare
/// object, a JSON string, or a `{"data": ...}` wrapper around either.
fn unwrap_event(payload: Value) -> Option<Value> {
    let payload = match payload {
        Value::String(text) => serde_json::from_str(&text).ok()?,
        other => other,
    };
    if looks_like_event(&payload) {
        return Some(payload);
    }
    let inner = match payload.get("data")? {
        Value::String(text) => serde_json::from_str(text).ok()?,
        other => other.clone(),
    };
    looks_like_event(&inner).then_some(inner)
}
