//! Configuration type definitions.

use serde::Deserialize;

/// One configured game server: its transport endpoint and chat destinations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerRouteConfig {
    /// Unique server name, also the transport's logical connection name.
    pub name: String,
    /// Whether to open an outbound (forward) connection to this server.
    pub forward: bool,
    /// Forward WebSocket url.
    pub url: String,
    /// Forward connection access token.
    #[serde(alias = "access_token")]
    pub token: String,
    /// Reconnect attempt cap for this server; 0 means unlimited.
    #[serde(alias = "retries")]
    pub max_retries: u32,
    /// Destination channel refs, `platform:channelId` or bare `channelId`.
    pub channels: Vec<String>,
    /// Recipient (bot account) ids allowed to deliver to the channels.
    #[serde(alias = "bots")]
    pub recipients: Vec<String>,
    /// Prefix marking a chat message as a passthrough command.
    #[serde(alias = "rcon")]
    pub command_prefix: String,
    /// User ids allowed to run passthrough commands; admins always bypass.
    #[serde(alias = "users")]
    pub allowed_users: Vec<String>,
    /// Regex stripped from game messages before relaying to chat.
    pub mask: String,
    /// Convert chat images to CICode markup instead of rich hover text.
    #[serde(alias = "ci_image")]
    pub convert_images_to_code: bool,
}

impl Default for ServerRouteConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            forward: true,
            url: "ws://127.0.0.1:8081".to_string(),
            token: String::new(),
            max_retries: 3,
            channels: Vec::new(),
            recipients: Vec::new(),
            command_prefix: "/".to_string(),
            allowed_users: Vec::new(),
            mask: String::new(),
            convert_images_to_code: false,
        }
    }
}

/// Process-wide bridge configuration, replaced wholesale on reconfiguration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Whether to run the reverse (inbound) WebSocket listener.
    pub reverse: bool,
    /// Reverse listener path.
    #[serde(alias = "path")]
    pub listen_path: String,
    /// Reverse listener port.
    #[serde(alias = "port")]
    pub listen_port: u16,
    /// Reverse listener access token.
    #[serde(alias = "token")]
    pub reverse_token: String,
    /// Prefix introducing dash shortcuts, e.g. `mc` for `mc -q`.
    #[serde(alias = "prefix")]
    pub command_prefix: String,
    /// Include the chat group name when relaying chat into the game.
    #[serde(alias = "group_name")]
    pub include_group_name: bool,
    /// Prefix game events with `[serverName]` when relaying to chat.
    #[serde(alias = "server_name")]
    pub include_server_name: bool,
    /// Verb placed between a speaker name and their message.
    #[serde(alias = "verb")]
    pub speech_verb: String,
    /// Emit verbose relay logging.
    pub debug: bool,
    /// Configured game servers.
    pub servers: Vec<ServerRouteConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            reverse: true,
            listen_path: "/minecraft/ws".to_string(),
            listen_port: 8080,
            reverse_token: String::new(),
            command_prefix: "mc".to_string(),
            include_group_name: true,
            include_server_name: true,
            speech_verb: "says:".to_string(),
            debug: false,
            servers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config: BridgeConfig = serde_json::from_value(json!({})).unwrap();
        assert!(config.reverse);
        assert_eq!(config.listen_port, 8080);
        assert_eq!(config.listen_path, "/minecraft/ws");
        assert_eq!(config.command_prefix, "mc");
        assert_eq!(config.speech_verb, "says:");
        assert!(config.include_group_name);
        assert!(config.include_server_name);
        assert!(!config.debug);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_legacy_key_aliases() {
        let config: BridgeConfig = serde_json::from_value(json!({
            "port": 9090,
            "path": "/ws",
            "prefix": "#",
            "verb": "shouts:",
            "servers": [{
                "name": "Alpha",
                "bots": ["1"],
                "rcon": "!",
                "users": ["u1"],
                "retries": 5,
                "ci_image": true
            }]
        }))
        .unwrap();

        assert_eq!(config.listen_port, 9090);
        assert_eq!(config.listen_path, "/ws");
        assert_eq!(config.command_prefix, "#");
        assert_eq!(config.speech_verb, "shouts:");

        let server = &config.servers[0];
        assert_eq!(server.recipients, vec!["1".to_string()]);
        assert_eq!(server.command_prefix, "!");
        assert_eq!(server.allowed_users, vec!["u1".to_string()]);
        assert_eq!(server.max_retries, 5);
        assert!(server.convert_images_to_code);
    }

    #[test]
    fn test_server_defaults() {
        let server: ServerRouteConfig = serde_json::from_value(json!({"name": "A"})).unwrap();
        assert!(server.forward);
        assert_eq!(server.max_retries, 3);
        assert_eq!(server.command_prefix, "/");
        assert!(!server.convert_images_to_code);
    }
}
