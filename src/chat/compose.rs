//! Chat message to game message composition.
//!
//! Lowers a chat session's rich elements into the component-node array the
//! game's `broadcast` api expects. Shaping only; sending happens elsewhere.

use serde_json::{json, Value};

use crate::chat::{display_group, nickname, ChatSession, Element};
use crate::common::text::non_empty;
use crate::config::BridgeConfig;

/// Build the component nodes for one chat message.
pub fn to_game_message(
    session: &dyn ChatSession,
    config: &BridgeConfig,
    convert_images_to_code: bool,
) -> Vec<Value> {
    let mut nodes = Vec::new();

    if config.include_group_name {
        nodes.push(json!({
            "text": format!("[{}] ", display_group(session)),
            "color": "aqua"
        }));
    }

    let verb = non_empty(&config.speech_verb).unwrap_or("says:");
    nodes.push(json!({"text": nickname(session), "color": "green"}));
    nodes.push(json!({"text": format!(" {} ", verb), "color": "white"}));

    let elements = session.elements();
    let elements = if elements.is_empty() {
        vec![Element::Text {
            content: session.content().to_string(),
        }]
    } else {
        elements
    };

    for element in elements {
        match element {
            Element::Text { content } => {
                // Continuation lines get a marker so multi-line chat stays
                // readable in the game console.
                nodes.push(json!({
                    "text": content.replace('\r', "").replace('\n', "\n * "),
                    "color": "white"
                }));
            }
            Element::Image { url } => nodes.push(image_node(&url, convert_images_to_code)),
            Element::Mention { id, name } => {
                let target = non_empty(&name)
                    .or_else(|| non_empty(&id))
                    .unwrap_or("unknown");
                nodes.push(json!({"text": format!("@[{target}]"), "color": "white"}));
            }
            Element::Other { kind } => {
                nodes.push(json!({"text": format!("[{kind}]"), "color": "white"}));
            }
        }
    }

    nodes
}

fn image_node(url: &str, convert_to_code: bool) -> Value {
    match non_empty(url) {
        Some(url) if convert_to_code => {
            json!({"text": format!("[[CICode,url={url},name=image]]")})
        }
        Some(url) => json!({
            "text": "[image]",
            "color": "light_purple",
            "hoverEvent": {
                "action": "show_text",
                "value": {"text": "Click to open in a browser", "color": "light_purple"}
            },
            "clickEvent": {"action": "open_url", "value": url}
        }),
        None => json!({"text": "[image]", "color": "light_purple"}),
    }
}
