//! Transport client capability.
//!
//! The actual WebSocket wire protocol belongs to the game-server bridge SDK
//! and lives outside this crate. The runtime consumes it through these
//! traits: a [`Transport`] handle per mode (forward/reverse) and a
//! [`TransportFactory`] that builds them wired to a signal channel.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::common::TransportResult;

/// Which side initiated the underlying network connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// This process dials out to the game server.
    Forward,
    /// The game server dials in to our listener.
    Reverse,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Forward => write!(f, "forward"),
            TransportMode::Reverse => write!(f, "reverse"),
        }
    }
}

/// Outbound connection spec for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnSpec {
    pub self_name: String,
    pub url: String,
    pub access_token: Option<String>,
}

/// Reverse listener spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenSpec {
    pub port: u16,
    pub path: String,
    pub access_token: Option<String>,
}

/// Per-request options. Timeouts are delegated to the transport; the
/// runtime applies no additional layer.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout_ms: Option<u64>,
}

/// Live status of one named sub-connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnStatus {
    pub self_name: String,
    pub open: bool,
}

/// Lifecycle and event signals emitted by a transport client.
#[derive(Debug, Clone)]
pub enum TransportSignal {
    Open {
        mode: TransportMode,
        server: String,
    },
    Closed {
        mode: TransportMode,
        server: String,
        code: u16,
        reason: String,
    },
    Reconnect {
        mode: TransportMode,
        server: String,
        attempt: u32,
        delay_ms: u64,
    },
    Error {
        mode: TransportMode,
        server: String,
        message: String,
    },
    /// An opaque game-event envelope.
    Event {
        mode: TransportMode,
        payload: Value,
    },
}

/// Sender half of the signal channel a transport reports into.
pub type SignalSender = mpsc::UnboundedSender<TransportSignal>;

/// One transport client managing a set of named sub-connections.
///
/// Implementations must stop emitting signals after `close()` returns;
/// reconnect/backoff scheduling for individual sub-connections is the
/// transport's own responsibility.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open every configured sub-connection.
    async fn connect(&self) -> TransportResult<()>;

    /// Open a single named sub-connection.
    async fn connect_one(&self, self_name: &str) -> TransportResult<()>;

    /// Close everything and detach all signal reporting.
    async fn close(&self) -> TransportResult<()>;

    /// Close a single named sub-connection with a close code and reason.
    async fn close_one(&self, self_name: &str, code: u16, reason: &str) -> TransportResult<()>;

    /// Send a request to the named server and await its response.
    async fn request(
        &self,
        self_name: &str,
        api: &str,
        data: Value,
        options: RequestOptions,
    ) -> TransportResult<Value>;

    /// Live per-connection status. May be empty when the client cannot
    /// report status.
    fn status(&self) -> Vec<ConnStatus>;

    /// Names of all known sub-connections, open or not.
    fn list(&self) -> Vec<String>;
}

/// Builds transport clients bound to a signal channel.
pub trait TransportFactory: Send + Sync {
    fn forward(&self, specs: Vec<ConnSpec>, signals: SignalSender) -> Arc<dyn Transport>;

    fn reverse(&self, listen: ListenSpec, signals: SignalSender) -> Arc<dyn Transport>;
}
