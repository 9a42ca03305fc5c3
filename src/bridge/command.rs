//! Operator commands issued from chat.
//!
//! Dash shortcuts are rewritten into canonical command text by
//! [`super::dash`]; this module owns permission checks, target resolution
//! and dispatch.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use fancy_regex::Regex;
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::debug;

use crate::bridge::dash::{self, canonical, DashCommand};
use crate::bridge::rcon::run_rcon;
use crate::bridge::route::RoutingTable;
use crate::chat::{is_group, reply, ChatSession};
use crate::config::ConfigHandle;
use crate::runtime::ConnectionRuntime;
use crate::transport::RequestOptions;

/// Authority required for status queries and text actions.
pub const LEVEL_OPERATE: u8 = 2;
/// Authority required for reconnects and server-side commands.
pub const LEVEL_MANAGE: u8 = 4;

pub struct CommandCenter {
    config: ConfigHandle,
    routes: RoutingTable,
    runtime: Arc<ConnectionRuntime>,
}

fn server_flag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^([\s\S]*?)(?:\s+--server\s+(\S+))?$").expect("valid server flag pattern")
    })
}

/// Split a trailing `--server <name>` flag off canonical command text.
fn split_server_flag(text: &str) -> (String, Option<String>) {
    let text = text.trim();
    if let Ok(Some(caps)) = server_flag_regex().captures(text) {
        let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let server = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());
        (body.to_string(), server)
    } else {
        (text.to_string(), None)
    }
}

impl CommandCenter {
    pub fn new(config: ConfigHandle, routes: RoutingTable, runtime: Arc<ConnectionRuntime>) -> Self {
        Self {
            config,
            routes,
            runtime,
        }
    }

    /// Handle a chat message if it is a dash shortcut. Returns whether the
    /// message was consumed.
    pub async fn handle_message(&self, session: &dyn ChatSession) -> bool {
        let config = self.config.get();
        if !dash::is_shortcut(&config.command_prefix, session.content()) {
            return false;
        }
        let body = dash::body_after_prefix(&config.command_prefix, session.content());
        match dash::parse_shortcut(body) {
            DashCommand::Unknown => false,
            DashCommand::Invalid => {
                reply(
                    session,
                    "Invalid command arguments. Check the shortcut syntax and try again.",
                )
                .await;
                true
            }
            DashCommand::Matched(text) => {
                self.execute(session, &text).await;
                true
            }
        }
    }

    async fn execute(&self, session: &dyn ChatSession, text: &str) {
        let (body, server) = split_server_flag(text);
        let (command, args) = match body.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (body.as_str(), ""),
        };
        let server = server.as_deref();

        let required = match command {
            canonical::RECONNECT | canonical::RCON => LEVEL_MANAGE,
            _ => LEVEL_OPERATE,
        };
        if session.authority() < required {
            reply(session, "You do not have permission to use this command.").await;
            return;
        }

        match command {
            canonical::STATUS => self.run_status(session, server).await,
            canonical::RECONNECT => self.run_reconnect(session, server).await,
            canonical::BROADCAST => {
                self.run_text_action(session, server, "broadcast", message_payload(args))
                    .await
            }
            canonical::TITLE => {
                self.run_text_action(
                    session,
                    server,
                    "send_title",
                    json!({"title": {"text": args, "color": "white"}}),
                )
                .await
            }
            canonical::SUBTITLE => {
                self.run_text_action(
                    session,
                    server,
                    "send_title",
                    json!({"subtitle": {"text": args, "color": "white"}}),
                )
                .await
            }
            canonical::ACTIONBAR => {
                self.run_text_action(session, server, "send_actionbar", message_payload(args))
                    .await
            }
            canonical::PRIVATE => self.run_private(session, server, args).await,
            canonical::RCON => self.run_rcon_targets(session, server, args).await,
            other => {
                debug!(command = other, "Unrecognized canonical command");
            }
        }
    }

    async fn run_status(&self, session: &dyn ChatSession, server: Option<&str>) {
        let connected: HashSet<String> = self.runtime.connected_names().await.into_iter().collect();

        let names: Vec<String> = match server {
            Some(name) => {
                if self.routes.lookup_by_name(name).is_none() && !connected.contains(name) {
                    reply(session, &format!("Cannot find the target server: {name}")).await;
                    return;
                }
                vec![name.to_string()]
            }
            None => {
                let mut names: Vec<String> = self
                    .config
                    .get()
                    .servers
                    .iter()
                    .filter_map(|route| crate::common::text::non_empty(&route.name))
                    .map(str::to_string)
                    .collect();
                names.extend(connected.iter().cloned());
                names.sort();
                names.dedup();
                names
            }
        };

        if names.is_empty() {
            reply(session, "No servers are configured.").await;
            return;
        }

        let mut lines = vec!["Current connection status:".to_string()];
        for name in names {
            let status = if connected.contains(&name) {
                "connected"
            } else {
                "disconnected"
            };
            lines.push(format!("- Server: {name}"));
            lines.push(format!("- Status: {status}"));
        }
        reply(session, &lines.join("\n")).await;
    }

    async fn run_reconnect(&self, session: &dyn ChatSession, server: Option<&str>) {
        match server {
            None => {
                reply(session, "Reconnecting all servers...").await;
                if let Err(e) = self.runtime.reconnect().await {
                    reply(session, &format!("Reconnect failed: {e}")).await;
                    return;
                }
                let connected = self.runtime.connected_names().await;
                if connected.is_empty() {
                    reply(session, "Reconnect finished; no servers are connected yet.").await;
                } else {
                    reply(
                        session,
                        &format!("Connected servers: {}", connected.join(", ")),
                    )
                    .await;
                }
            }
            Some(name) => {
                if self.routes.lookup_by_name(name).is_none() {
                    reply(session, &format!("Cannot find the target server: {name}")).await;
                    return;
                }
                match self.runtime.reconnect_one(name).await {
                    Ok(()) => reply(session, &format!("Reconnected {name}.")).await,
                    Err(e) => reply(session, &format!("Failed to reconnect {name}: {e}")).await,
                }
            }
        }
    }

    /// Pick the servers a command applies to: the explicit `--server` flag,
    /// the servers routed to the originating channel, or the single
    /// connected server.
    async fn resolve_targets(
        &self,
        session: &dyn ChatSession,
        server: Option<&str>,
    ) -> Result<Vec<String>, String> {
        if let Some(name) = server {
            if self.routes.lookup_by_name(name).is_none() {
                return Err(format!("Cannot find the target server: {name}"));
            }
            return Ok(vec![name.to_string()]);
        }
        if is_group(session) {
            let routed: Vec<String> = self
                .routes
                .lookup_by_channel(session.platform(), session.channel_id())
                .into_iter()
                .map(|route| route.name.clone())
                .collect();
            if routed.is_empty() {
                return Err("No target server is available.".to_string());
            }
            return Ok(routed);
        }
        let connected = self.runtime.connected_names().await;
        match connected.as_slice() {
            [] => Err("No servers are currently online.".to_string()),
            [only] => Ok(vec![only.clone()]),
            _ => Err("Several servers are online, pick one with --server <name>.".to_string()),
        }
    }

    async fn run_text_action(
        &self,
        session: &dyn ChatSession,
        server: Option<&str>,
        api: &str,
        data: Value,
    ) {
        let targets = match self.resolve_targets(session, server).await {
            Ok(targets) => targets,
            Err(message) => {
                reply(session, &message).await;
                return;
            }
        };
        let verbose = self.config.get().debug;
        let sends = targets.iter().map(|name| {
            let data = data.clone();
            async move {
                let result = self
                    .runtime
                    .request(name, api, data, RequestOptions::default())
                    .await;
                if let Err(e) = result {
                    if verbose {
                        debug!(error = %e, server = %name, api, "Action dispatch failed");
                    }
                }
            }
        });
        join_all(sends).await;
    }

    async fn run_private(&self, session: &dyn ChatSession, server: Option<&str>, args: &str) {
        let Some((player, message)) = args
            .split_once(char::is_whitespace)
            .map(|(p, m)| (p.trim(), m.trim()))
            .filter(|(p, m)| !p.is_empty() && !m.is_empty())
        else {
            reply(
                session,
                "Invalid command arguments. Check the shortcut syntax and try again.",
            )
            .await;
            return;
        };
        let data = json!({
            "nickname": player,
            "message": [{"text": message, "color": "white"}]
        });
        self.run_text_action(session, server, "send_private_msg", data)
            .await;
    }

    async fn run_rcon_targets(&self, session: &dyn ChatSession, server: Option<&str>, args: &str) {
        let targets = match self.resolve_targets(session, server).await {
            Ok(targets) => targets,
            Err(message) => {
                reply(session, &message).await;
                return;
            }
        };
        // Sequential on purpose: each server gets its own reply line.
        for name in targets {
            run_rcon(&self.runtime, session, &name, args).await;
        }
    }
}

fn message_payload(text: &str) -> Value {
    json!({"message": [{"text": text, "color": "white"}]})
}
