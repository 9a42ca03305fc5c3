//! Error types for the relay runtime.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {message}")]
    Parse { message: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors surfaced by transport client implementations.
///
/// The concrete WebSocket client lives outside this crate; these variants
/// are the shape its failures arrive in.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect: {message}")]
    Connect { message: String },

    #[error("Request '{api}' failed: {message}")]
    Request { api: String, message: String },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Connection '{name}' is not open")]
    NotOpen { name: String },

    #[error("Failed to close: {message}")]
    Close { message: String },
}

/// Connection-runtime errors.
///
/// Only single-target operations (`request`, `reconnect_one`) surface these
/// to their caller; fan-out paths downgrade them to log entries.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Missing server name, cannot route the request")]
    MissingServerName,

    #[error("Request api cannot be empty")]
    EmptyApi,

    #[error("Request payload must be a JSON object")]
    InvalidPayload,

    #[error("Server {server} has no available connection")]
    NoConnection { server: String },

    #[error("No connection route found for server {server}")]
    RouteNotFound { server: String },

    #[error("No servers are currently online")]
    NoServersOnline,

    #[error("Several servers are online, an explicit server name is required")]
    AmbiguousServer,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type alias for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Result type alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
