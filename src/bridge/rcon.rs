//! Passthrough command execution and reply normalization.

use serde_json::{json, Value};
use tracing::error;

use crate::chat::{reply, ChatSession};
use crate::common::text::non_empty;
use crate::runtime::ConnectionRuntime;
use crate::transport::RequestOptions;

/// Server-side commands get a tighter deadline than ordinary requests.
pub const RCON_TIMEOUT_MS: u64 = 5000;

/// Flatten whatever the server answered into one human-readable line.
pub fn normalize_reply(value: &Value) -> String {
    match value {
        Value::Null => "Command executed successfully".to_string(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return "Command executed successfully".to_string();
            }
            // Some servers answer with a JSON object serialized as a string.
            match serde_json::from_str::<Value>(trimmed) {
                Ok(inner @ Value::Object(_)) => normalize_reply(&inner),
                _ => trimmed.to_string(),
            }
        }
        Value::Object(fields) => {
            // Empty data falls through to the status/message fields.
            match fields.get("data") {
                Some(Value::Null) | None => {}
                Some(Value::String(text)) if text.trim().is_empty() => {}
                Some(Value::String(text)) => return text.clone(),
                Some(other) => return other.to_string(),
            }
            let status = fields.get("status").and_then(Value::as_str).unwrap_or("");
            let message = fields
                .get("message")
                .and_then(Value::as_str)
                .and_then(non_empty);
            if !status.is_empty() && !status.eq_ignore_ascii_case("SUCCESS") {
                return message
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Command failed ({status})"));
            }
            message
                .map(str::to_string)
                .unwrap_or_else(|| "Command executed successfully".to_string())
        }
        other => other.to_string(),
    }
}

/// Run one command on the named server and reply with the outcome.
pub async fn run_rcon(
    runtime: &ConnectionRuntime,
    session: &dyn ChatSession,
    server_name: &str,
    command_text: &str,
) {
    let Some(command) = non_empty(command_text) else {
        reply(session, "Enter a command to run.").await;
        return;
    };

    let options = RequestOptions {
        timeout_ms: Some(RCON_TIMEOUT_MS),
    };
    let result = runtime
        .request(
            server_name,
            "send_rcon_command",
            json!({ "command": command }),
            options,
        )
        .await;

    match result {
        Ok(value) => reply(session, &normalize_reply(&value)).await,
        Err(e) => {
            error!(error = %e, server = server_name, "Command dispatch failed");
            reply(
                session,
                &format!("Failed to send the command to {server_name}: {e}"),
            )
            .await;
        }
    }
}
