//! Configuration parsing and the hot-swappable snapshot handle.

pub mod types;
pub mod validate;

pub use types::{BridgeConfig, ServerRouteConfig};
pub use validate::normalize;

use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::common::ConfigError;

impl BridgeConfig {
    /// Build a configuration from raw input, applying defaults, legacy key
    /// aliases and normalization.
    pub fn load(raw: Value) -> Result<Self, ConfigError> {
        let parsed: BridgeConfig =
            serde_json::from_value(raw).map_err(|e| ConfigError::Parse {
                message: e.to_string(),
            })?;
        Ok(normalize(parsed))
    }
}

/// Shared handle to the current configuration snapshot.
///
/// Components read through `get()` rather than holding a `BridgeConfig`
/// directly, so a wholesale replacement is atomic from their point of view.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<BridgeConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Current snapshot; cheap to call on every operation.
    pub fn get(&self) -> Arc<BridgeConfig> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the snapshot wholesale.
    pub fn replace(&self, config: BridgeConfig) {
        let mut slot = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_normalizes() {
        let config = BridgeConfig::load(json!({
            "servers": [{"name": ""}, {"name": "Alpha"}]
        }))
        .unwrap();
        assert_eq!(config.servers.len(), 1);
    }

    #[test]
    fn test_load_rejects_malformed_input() {
        assert!(BridgeConfig::load(json!({"port": "not a number"})).is_err());
    }

    #[test]
    fn test_handle_swap_is_atomic_per_reader() {
        let handle = ConfigHandle::new(BridgeConfig::default());
        let before = handle.get();
        let mut next = BridgeConfig::default();
        next.command_prefix = "#".to_string();
        handle.replace(next);
        // The old snapshot stays intact for readers that captured it
        assert_eq!(before.command_prefix, "mc");
        assert_eq!(handle.get().command_prefix, "#");
    }
}
