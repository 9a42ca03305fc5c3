//! Routing table mapping server identities to chat destinations.
//!
//! Built once at startup and rebuilt atomically on every configuration
//! change; queries are constant-time after that.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::common::text::{non_empty, uniq_texts};
use crate::config::ServerRouteConfig;

#[derive(Default)]
struct Indexes {
    by_name: HashMap<String, Arc<ServerRouteConfig>>,
    by_channel: HashMap<String, Vec<Arc<ServerRouteConfig>>>,
    /// Explicit route-name to passthrough-whitelist association,
    /// recomputed on every reset.
    allowed_users: HashMap<String, HashSet<String>>,
}

/// Shared, atomically rebuildable route index.
#[derive(Clone, Default)]
pub struct RoutingTable {
    inner: Arc<RwLock<Indexes>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild both indexes from scratch. Routes with an empty name are
    /// silently skipped; a duplicate name takes the last definition.
    pub fn reset(&self, routes: &[ServerRouteConfig]) {
        let mut next = Indexes::default();

        for route in routes {
            let Some(name) = non_empty(&route.name) else {
                continue;
            };
            let shared = Arc::new(route.clone());
            next.by_name.insert(name.to_string(), shared.clone());
            next.allowed_users.insert(
                name.to_string(),
                route.allowed_users.iter().map(|u| u.trim().to_string()).collect(),
            );
            for channel in uniq_texts(&route.channels) {
                next.by_channel.entry(channel).or_default().push(shared.clone());
            }
        }

        let mut slot = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = next;
    }

    /// Route for a server name, if configured.
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<ServerRouteConfig>> {
        let name = name.trim();
        self.read(|idx| idx.by_name.get(name).cloned())
    }

    /// Routes bound to a channel, matching both the qualified
    /// `platform:channelId` key and the bare `channelId` key, de-duplicated.
    pub fn lookup_by_channel(&self, platform: &str, channel_id: &str) -> Vec<Arc<ServerRouteConfig>> {
        let platform = platform.trim();
        let channel_id = channel_id.trim();
        if channel_id.is_empty() {
            return Vec::new();
        }

        let qualified = format!("{platform}:{channel_id}");
        self.read(|idx| {
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for key in [qualified.as_str(), channel_id] {
                if let Some(list) = idx.by_channel.get(key) {
                    for route in list {
                        if seen.insert(route.name.clone()) {
                            out.push(route.clone());
                        }
                    }
                }
            }
            out
        })
    }

    /// Whether a user may run passthrough commands on the named server.
    pub fn allows_user(&self, server_name: &str, user_id: &str) -> bool {
        let user_id = user_id.trim();
        self.read(|idx| {
            idx.allowed_users
                .get(server_name.trim())
                .is_some_and(|set| set.contains(user_id))
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Indexes) -> T) -> T {
        let guard = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &str, channels: &[&str]) -> ServerRouteConfig {
        ServerRouteConfig {
            name: name.to_string(),
            channels: channels.iter().map(|c| c.to_string()).collect(),
            ..ServerRouteConfig::default()
        }
    }

    #[test]
    fn test_lookup_by_name_after_reset() {
        let table = RoutingTable::new();
        table.reset(&[route("Alpha", &["discord:1"]), route("Beta", &["2"])]);

        assert_eq!(table.lookup_by_name("Alpha").unwrap().name, "Alpha");
        assert_eq!(table.lookup_by_name(" Beta ").unwrap().name, "Beta");
        assert!(table.lookup_by_name("Gamma").is_none());
    }

    #[test]
    fn test_empty_names_skipped() {
        let table = RoutingTable::new();
        table.reset(&[route("", &["1"]), route("Alpha", &["1"])]);
        assert_eq!(table.lookup_by_channel("discord", "1").len(), 1);
    }

    #[test]
    fn test_channel_lookup_qualified_and_bare() {
        let table = RoutingTable::new();
        table.reset(&[route("Alpha", &["discord:1"]), route("Beta", &["1"])]);

        // The qualified key matches Alpha, the bare key matches Beta
        let hits = table.lookup_by_channel("discord", "1");
        assert_eq!(hits.len(), 2);

        // A different platform only matches the bare binding
        let hits = table.lookup_by_channel("telegram", "1");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Beta");
    }

    #[test]
    fn test_channel_lookup_dedupes() {
        let table = RoutingTable::new();
        // A route bound to both forms of the same channel appears once
        table.reset(&[route("Alpha", &["discord:1", "1"])]);
        assert_eq!(table.lookup_by_channel("discord", "1").len(), 1);
    }

    #[test]
    fn test_reset_replaces_everything() {
        let table = RoutingTable::new();
        table.reset(&[route("Alpha", &["1"])]);
        table.reset(&[route("Beta", &["2"])]);

        assert!(table.lookup_by_name("Alpha").is_none());
        assert!(table.lookup_by_channel("discord", "1").is_empty());
        assert_eq!(table.lookup_by_channel("discord", "2").len(), 1);
    }

    #[test]
    fn test_allows_user() {
        let mut r = route("Alpha", &["1"]);
        r.allowed_users = vec!["u1".to_string()];
        let table = RoutingTable::new();
        table.reset(&[r]);

        assert!(table.allows_user("Alpha", "u1"));
        assert!(!table.allows_user("Alpha", "u2"));
        assert!(!table.allows_user("Beta", "u1"));
    }

    #[test]
    fn test_duplicate_name_last_wins() {
        let mut first = route("Alpha", &["1"]);
        first.url = "ws://first".to_string();
        let mut second = route("Alpha", &["2"]);
        second.url = "ws://second".to_string();

        let table = RoutingTable::new();
        table.reset(&[first, second]);
        assert_eq!(table.lookup_by_name("Alpha").unwrap().url, "ws://second");
    }
}
