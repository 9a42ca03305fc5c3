//! Shared error types and text utilities.

pub mod error;
pub mod text;

pub use error::{ConfigError, RuntimeError, RuntimeResult, TransportError, TransportResult};
