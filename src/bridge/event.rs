//! Game event to chat text translation.
//!
//! Events arrive as loosely-typed JSON envelopes keyed by `sub_type`.
//! Unknown shapes are suppressed rather than guessed at, so new event
//! types from the game side never break the relay.

use serde::Deserialize;
use serde_json::Value;

use crate::common::text::{non_empty, plain_raw, text_at, text_field};
use crate::config::BridgeConfig;

/// One inbound game event envelope. Transient, never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct GameEvent {
    #[serde(default)]
    pub post_type: Option<String>,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub player: Option<PlayerInfo>,
    #[serde(flatten)]
    pub body: EventBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerInfo {
    #[serde(default)]
    pub nickname: Option<String>,
}

/// Subtype-specific payload, tagged by `sub_type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "sub_type")]
pub enum EventBody {
    #[serde(rename = "player_join")]
    Join,
    #[serde(rename = "player_quit")]
    Quit,
    #[serde(rename = "player_death")]
    Death {
        #[serde(default)]
        death: Option<DeathInfo>,
    },
    #[serde(rename = "player_command")]
    Command {
        #[serde(default)]
        command: Option<String>,
    },
    #[serde(rename = "player_achievement")]
    Achievement {
        #[serde(default)]
        achievement: Option<Value>,
    },
    #[serde(rename = "player_chat")]
    Chat {
        #[serde(default)]
        message: Option<Value>,
        #[serde(default)]
        raw_message: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeathInfo {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub translate: Option<TranslateText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslateText {
    #[serde(default)]
    pub text: Option<String>,
}

impl GameEvent {
    /// Parse an envelope; anything unparseable (including a missing
    /// `sub_type`) is treated as an event to suppress.
    pub fn parse(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }

    /// The trimmed server name, when present.
    pub fn server(&self) -> Option<&str> {
        self.server_name.as_deref().and_then(non_empty)
    }
}

/// Resolved achievement title plus whether it came from a direct field
/// (in which case it is already a complete sentence).
fn achievement_title(achievement: &Value) -> (String, bool) {
    let direct = {
        let translated = achievement
            .get("translate")
            .map(|t| text_at(t, "text"))
            .unwrap_or_default();
        if translated.is_empty() {
            text_at(achievement, "text")
        } else {
            translated
        }
    };
    if !direct.is_empty() {
        return (direct, true);
    }

    let display = achievement.get("display");
    let title = display.map(|d| d.get("title")).unwrap_or_default();
    let resolved = title
        .map(|t| {
            let own = text_at(t, "text");
            if !own.is_empty() {
                return own;
            }
            let translated = t
                .get("translate")
                .map(|tr| text_at(tr, "text"))
                .unwrap_or_default();
            if !translated.is_empty() {
                return translated;
            }
            text_field(t)
        })
        .unwrap_or_default();
    (resolved, false)
}

/// Translate a game event into chat text. `None` means the event should
/// not be relayed.
pub fn to_chat_text(event: &GameEvent, config: &BridgeConfig) -> Option<String> {
    if let Some(post_type) = event.post_type.as_deref().and_then(non_empty) {
        if post_type != "message" && post_type != "notice" {
            return None;
        }
    }

    let player = event
        .player
        .as_ref()
        .and_then(|p| p.nickname.as_deref())
        .and_then(non_empty)
        .unwrap_or("Unknown player");
    let verb = non_empty(&config.speech_verb).unwrap_or("says:");

    let body = match &event.body {
        EventBody::Join => format!("{player} joined the game"),
        EventBody::Quit => format!("{player} left the game"),
        EventBody::Death { death } => death
            .as_ref()
            .and_then(|d| {
                d.text
                    .as_deref()
                    .and_then(non_empty)
                    .or_else(|| d.translate.as_ref().and_then(|t| t.text.as_deref()).and_then(non_empty))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("{player} died")),
        EventBody::Command { command } => {
            let command = command.as_deref().and_then(non_empty).unwrap_or("");
            format!("{player} ran the command {command}").trim_end().to_string()
        }
        EventBody::Achievement { achievement } => {
            let (title, direct) = achievement
                .as_ref()
                .map(achievement_title)
                .unwrap_or((String::new(), false));
            if title.is_empty() {
                return None;
            }
            if direct {
                title
            } else {
                format!("{player} has made the advancement {title}")
            }
        }
        EventBody::Chat { message, raw_message } => {
            let content = {
                let direct = message.as_ref().map(text_field).unwrap_or_default();
                if direct.is_empty() {
                    raw_message
                        .as_ref()
                        .map(|raw| plain_raw(raw).trim().to_string())
                        .unwrap_or_default()
                } else {
                    direct
                }
            };
            if content.is_empty() {
                return None;
            }
            format!("{player} {verb} {content}")
        }
        EventBody::Unknown => return None,
    };

    if body.is_empty() {
        return None;
    }
    if !config.include_server_name {
        return Some(body);
    }

    let server = event.server().unwrap_or("Unknown server");
    Some(format!("[{server}] {body}"))
}
