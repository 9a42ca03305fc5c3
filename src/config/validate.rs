//! Configuration normalization.
//!
//! Raw input is defaulted and alias-mapped by serde; this pass cleans the
//! result. Offending routes are logged and skipped, never fatal.

use tracing::warn;

use crate::common::text::uniq_texts;
use crate::config::types::BridgeConfig;

/// Normalize a parsed configuration in place.
///
/// - trims and de-duplicates list fields per route
/// - drops routes with an empty name
/// - disables the reverse listener when its port/path are unusable
pub fn normalize(mut config: BridgeConfig) -> BridgeConfig {
    if config.reverse && (config.listen_port == 0 || config.listen_path.trim().is_empty()) {
        warn!(
            port = config.listen_port,
            path = %config.listen_path,
            "Reverse connection requires both a listen port and a path, disabling it"
        );
        config.reverse = false;
    }

    config.servers.retain(|server| {
        if server.name.trim().is_empty() {
            warn!("Skipped a server route with an empty name");
            false
        } else {
            true
        }
    });

    for server in &mut config.servers {
        server.name = server.name.trim().to_string();
        server.url = server.url.trim().to_string();
        server.channels = uniq_texts(&server.channels);
        server.recipients = uniq_texts(&server.recipients);
        server.allowed_users = uniq_texts(&server.allowed_users);
        if server.command_prefix.trim().is_empty() {
            server.command_prefix = "/".to_string();
        }
    }

    config
}
