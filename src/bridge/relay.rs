//! Bidirectional relay between chat channels and game servers.
//!
//! Game events fan out to every configured recipient/channel pair; chat
//! messages fan out to every server routed to the originating channel.
//! Individual delivery failures are logged and never abort the rest of
//! the fan-out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fancy_regex::Regex;
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::bridge::event::{to_chat_text, GameEvent};
use crate::bridge::rcon::run_rcon;
use crate::bridge::route::RoutingTable;
use crate::chat::compose::to_game_message;
use crate::chat::{is_admin, is_group, reply, ChatRecipient, ChatSession, RecipientDirectory};
use crate::common::text::{extract_image, non_empty, parse_channel_ref, uniq_texts};
use crate::config::{BridgeConfig, ConfigHandle, ServerRouteConfig};
use crate::runtime::ConnectionRuntime;
use crate::transport::RequestOptions;

pub struct RelayOrchestrator {
    config: ConfigHandle,
    routes: RoutingTable,
    runtime: Arc<ConnectionRuntime>,
    recipients: Arc<dyn RecipientDirectory>,
    /// Compiled mask cache, keyed by pattern. A failed compile caches as
    /// `None` so the warning fires once per pattern.
    masks: Mutex<HashMap<String, Option<Regex>>>,
}

impl RelayOrchestrator {
    pub fn new(
        config: ConfigHandle,
        routes: RoutingTable,
        runtime: Arc<ConnectionRuntime>,
        recipients: Arc<dyn RecipientDirectory>,
    ) -> Self {
        Self {
            config,
            routes,
            runtime,
            recipients,
            masks: Mutex::new(HashMap::new()),
        }
    }

    /// Relay one annotated game event into chat.
    pub async fn on_event(&self, payload: Value) {
        let config = self.config.get();
        if config.debug {
            debug!(%payload, "Relaying game event");
        }

        let Some(event) = GameEvent::parse(&payload) else {
            return;
        };
        let Some(text) = to_chat_text(&event, &config) else {
            return;
        };
        let Some(server) = event.server() else {
            debug!("Dropping an event with no server name");
            return;
        };
        let Some(route) = self.routes.lookup_by_name(server) else {
            debug!(server, "No route configured for event server");
            return;
        };

        self.deliver(&route, &text, config.debug).await;
    }

    async fn deliver(&self, route: &ServerRouteConfig, text: &str, verbose: bool) {
        let channels = uniq_texts(&route.channels);
        let recipient_ids = uniq_texts(&route.recipients);
        if channels.is_empty() || recipient_ids.is_empty() {
            debug!(server = %route.name, "Route has no delivery targets");
            return;
        }

        let Some(content) = self.apply_mask(&route.mask, text) else {
            debug!(server = %route.name, "Event text fully masked, dropped");
            return;
        };
        let parts = extract_image(&content);
        let content = match &parts.url {
            Some(url) => format!("{} <img src=\"{url}\" />", parts.text)
                .trim()
                .to_string(),
            None => content,
        };

        let online: HashMap<String, Arc<dyn ChatRecipient>> = self
            .recipients
            .online()
            .into_iter()
            .map(|recipient| (recipient.self_id().trim().to_string(), recipient))
            .collect();

        let mut sends = Vec::new();
        for recipient_id in &recipient_ids {
            let Some(recipient) = online.get(recipient_id) else {
                error!(recipient = %recipient_id, "Recipient is not online, skipping");
                continue;
            };
            for channel in &channels {
                let target = parse_channel_ref(channel);
                if let Some(platform) = &target.platform {
                    let own = recipient.platform().trim();
                    if !own.is_empty() && own != platform {
                        continue;
                    }
                }
                let recipient = recipient.clone();
                let content = content.clone();
                sends.push(async move {
                    match recipient
                        .send_to_channel(&target.channel_id, &content)
                        .await
                    {
                        Ok(()) => {
                            if verbose {
                                debug!(
                                    recipient = recipient.self_id(),
                                    channel = %target.channel_id,
                                    "Delivered game event"
                                );
                            }
                        }
                        Err(e) => {
                            error!(
                                error = %e,
                                recipient = recipient.self_id(),
                                channel = %target.channel_id,
                                "Failed to deliver game event"
                            );
                        }
                    }
                });
            }
        }
        join_all(sends).await;
    }

    /// Apply the route's mask pattern. `None` means the whole message was
    /// masked away.
    fn apply_mask(&self, pattern: &str, text: &str) -> Option<String> {
        let Some(mask) = self.mask_for(pattern) else {
            return Some(text.to_string());
        };
        let stripped = mask.replace_all(text, "").trim().to_string();
        non_empty(&stripped)?;
        Some(stripped)
    }

    fn mask_for(&self, pattern: &str) -> Option<Regex> {
        let pattern = non_empty(pattern)?;
        let mut cache = self
            .masks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(cached) = cache.get(pattern) {
            return cached.clone();
        }
        let compiled = match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(error = %e, pattern, "Invalid mask pattern, masking disabled");
                None
            }
        };
        cache.insert(pattern.to_string(), compiled.clone());
        compiled
    }

    /// Relay one group chat message into every server routed to its channel.
    pub async fn on_group(&self, session: &dyn ChatSession) {
        if !is_group(session) {
            return;
        }
        let config = self.config.get();
        let routes = self
            .routes
            .lookup_by_channel(session.platform(), session.channel_id());
        if routes.is_empty() {
            if config.debug {
                debug!(
                    channel = session.channel_id(),
                    "No servers routed to this channel"
                );
            }
            return;
        }

        let syncs = routes
            .iter()
            .map(|route| self.sync_route(session, route, &config));
        join_all(syncs).await;
    }

    async fn sync_route(
        &self,
        session: &dyn ChatSession,
        route: &ServerRouteConfig,
        config: &BridgeConfig,
    ) {
        let content = session.content().trim();
        if let Some(prefix) = non_empty(&route.command_prefix) {
            if let Some(command) = content.strip_prefix(prefix) {
                if is_admin(session) || self.routes.allows_user(&route.name, session.user_id()) {
                    run_rcon(&self.runtime, session, &route.name, command.trim()).await;
                } else {
                    reply(
                        session,
                        "You do not have permission to run commands on this server.",
                    )
                    .await;
                }
                return;
            }
        }

        let nodes = to_game_message(session, config, route.convert_images_to_code);
        let result = self
            .runtime
            .request(
                &route.name,
                "broadcast",
                json!({ "message": nodes }),
                RequestOptions::default(),
            )
            .await;
        if let Err(e) = result {
            if config.debug {
                debug!(error = %e, server = %route.name, "Broadcast failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::{MockDirectory, MockRecipient, MockSession};
    use crate::config::ServerRouteConfig;
    use crate::transport::testing::{MockFactory, MockTransport};

    struct Fixture {
        relay: RelayOrchestrator,
        forward: Arc<MockTransport>,
        recipient: Arc<MockRecipient>,
    }

    fn fixture(route: ServerRouteConfig) -> Fixture {
        fixture_with(route, vec![Arc::new(MockRecipient::new("bot-1", "discord"))])
    }

    fn fixture_with(route: ServerRouteConfig, bots: Vec<Arc<MockRecipient>>) -> Fixture {
        let server_names: Vec<String> = vec![route.name.clone()];
        let name_refs: Vec<&str> = server_names.iter().map(String::as_str).collect();

        let config = BridgeConfig {
            reverse: false,
            include_server_name: false,
            servers: vec![route.clone()],
            ..BridgeConfig::default()
        };
        let handle = ConfigHandle::new(config);
        let routes = RoutingTable::new();
        routes.reset(&[route]);

        let forward = MockTransport::new(&name_refs);
        let factory = MockFactory::new(forward.clone(), MockTransport::new(&[]));
        let (runtime, _events) = ConnectionRuntime::new(handle.clone(), factory);

        let recipient = bots[0].clone();
        let directory = Arc::new(MockDirectory {
            recipients: bots
                .into_iter()
                .map(|r| r as Arc<dyn ChatRecipient>)
                .collect(),
        });
        Fixture {
            relay: RelayOrchestrator::new(handle, routes, runtime, directory),
            forward,
            recipient,
        }
    }

    fn route() -> ServerRouteConfig {
        ServerRouteConfig {
            name: "Alpha".to_string(),
            channels: vec!["discord:chan-1".to_string()],
            recipients: vec!["bot-1".to_string()],
            ..ServerRouteConfig::default()
        }
    }

    fn join_event(server: &str) -> Value {
        json!({
            "server_name": server,
            "sub_type": "player_join",
            "player": {"nickname": "Steve"}
        })
    }

    #[tokio::test]
    async fn test_event_delivered_to_channel() {
        let fx = fixture(route());
        fx.relay.on_event(join_event("Alpha")).await;

        let deliveries = fx.recipient.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, "chan-1");
        assert_eq!(deliveries[0].1, "Steve joined the game");
    }

    #[tokio::test]
    async fn test_unknown_server_dropped() {
        let fx = fixture(route());
        fx.relay.on_event(join_event("Gamma")).await;
        assert!(fx.recipient.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_mask_strips_and_drops() {
        let mut r = route();
        r.mask = "joined".to_string();
        let fx = fixture(r);
        fx.relay.on_event(join_event("Alpha")).await;
        assert_eq!(fx.recipient.deliveries()[0].1, "Steve  the game");

        let mut r = route();
        r.mask = ".*".to_string();
        let fx = fixture(r);
        fx.relay.on_event(join_event("Alpha")).await;
        assert!(fx.recipient.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_mask_disables_masking() {
        let mut r = route();
        r.mask = "(".to_string();
        let fx = fixture(r);
        fx.relay.on_event(join_event("Alpha")).await;
        assert_eq!(fx.recipient.deliveries()[0].1, "Steve joined the game");
    }

    #[tokio::test]
    async fn test_image_markup_becomes_img_tag() {
        let fx = fixture(route());
        fx.relay
            .on_event(json!({
                "server_name": "Alpha",
                "sub_type": "player_chat",
                "player": {"nickname": "Steve"},
                "message": "look [[CICode,url=http://x/p.png,name=pic]]"
            }))
            .await;
        let content = &fx.recipient.deliveries()[0].1;
        assert!(content.contains("<img src=\"http://x/p.png\" />"));
        assert!(!content.contains("CICode"));
    }

    #[tokio::test]
    async fn test_failing_recipient_does_not_block_others() {
        let mut r = route();
        r.recipients = vec!["bad".to_string(), "good".to_string()];
        let good = Arc::new(MockRecipient::new("good", "discord"));
        let fx = fixture_with(
            r,
            vec![Arc::new(MockRecipient::failing("bad", "discord")), good.clone()],
        );
        fx.relay.on_event(join_event("Alpha")).await;
        assert_eq!(good.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn test_platform_qualified_channels_filter_recipients() {
        let mut r = route();
        r.channels = vec!["telegram:chan-9".to_string()];
        let fx = fixture(r);
        fx.relay.on_event(join_event("Alpha")).await;
        // The discord bot never delivers into a telegram-qualified channel
        assert!(fx.recipient.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_group_message_broadcasts() {
        let fx = fixture(route());
        let session = MockSession::group("hello");
        fx.relay.on_group(&session).await;

        let requests = fx.forward.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "Alpha");
        assert_eq!(requests[0].1, "broadcast");
        assert!(requests[0].2["message"].is_array());
    }

    #[tokio::test]
    async fn test_private_message_not_broadcast() {
        let fx = fixture(route());
        let session = MockSession::private("hello");
        fx.relay.on_group(&session).await;
        assert!(fx.forward.requests().is_empty());
    }

    #[tokio::test]
    async fn test_passthrough_requires_permission() {
        let mut r = route();
        r.command_prefix = "/".to_string();
        let fx = fixture(r);

        let session = MockSession::group("/time set day");
        fx.relay.on_group(&session).await;
        assert!(fx.forward.requests().is_empty());
        assert!(session.replies()[0].contains("permission"));
    }

    #[tokio::test]
    async fn test_passthrough_allowed_for_whitelisted_user() {
        let mut r = route();
        r.command_prefix = "/".to_string();
        r.allowed_users = vec!["user-1".to_string()];
        let fx = fixture(r);

        let session = MockSession::group("/time set day");
        fx.relay.on_group(&session).await;

        let requests = fx.forward.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1, "send_rcon_command");
        assert_eq!(requests[0].2["command"], "time set day");
    }

    #[tokio::test]
    async fn test_passthrough_allowed_for_admin() {
        let mut r = route();
        r.command_prefix = "/".to_string();
        let fx = fixture(r);

        let mut session = MockSession::group("/time set day");
        session.authority = crate::chat::ADMIN_AUTHORITY;
        fx.relay.on_group(&session).await;
        assert_eq!(fx.forward.requests().len(), 1);
    }
}
