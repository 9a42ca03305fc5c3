//! Chat-platform capability.
//!
//! The bot/session framework of the chat platform is an external
//! collaborator; the relay consumes it through these traits.

pub mod compose;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

/// Minimum authority level treated as an administrator.
pub const ADMIN_AUTHORITY: u8 = 4;

/// A rich-message element lowered from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Text { content: String },
    Image { url: String },
    Mention { id: String, name: String },
    /// Anything the relay has no special handling for.
    Other { kind: String },
}

/// One inbound chat message plus enough session context to reply.
#[async_trait]
pub trait ChatSession: Send + Sync {
    fn platform(&self) -> &str;
    fn channel_id(&self) -> &str;
    fn guild_id(&self) -> Option<&str>;
    fn user_id(&self) -> &str;
    fn username(&self) -> Option<&str>;
    fn group_name(&self) -> Option<&str>;
    fn content(&self) -> &str;
    fn elements(&self) -> Vec<Element>;
    /// Platform permission level of the sender.
    fn authority(&self) -> u8;
    fn is_private(&self) -> bool;
    /// Reply into the originating conversation.
    async fn send(&self, text: &str) -> anyhow::Result<()>;
}

/// A bot account able to deliver into channels.
#[async_trait]
pub trait ChatRecipient: Send + Sync {
    fn self_id(&self) -> &str;
    fn platform(&self) -> &str;
    async fn send_to_channel(&self, channel_id: &str, content: &str) -> anyhow::Result<()>;
}

/// Lists the recipient accounts currently online.
pub trait RecipientDirectory: Send + Sync {
    fn online(&self) -> Vec<Arc<dyn ChatRecipient>>;
}

/// Whether the sender is an administrator.
pub fn is_admin(session: &dyn ChatSession) -> bool {
    session.authority() >= ADMIN_AUTHORITY
}

/// Whether this is a group conversation. Private messages and self-DM
/// shaped sessions are filtered so they are never synced into the game.
pub fn is_group(session: &dyn ChatSession) -> bool {
    if session.channel_id().trim().is_empty() {
        return false;
    }
    if session.is_private() {
        return false;
    }
    if session.guild_id().is_none() && session.channel_id() == session.user_id() {
        return false;
    }
    true
}

/// Whether the message came from one of our own recipient accounts.
/// Stops the bot from re-reading what it just sent.
pub fn is_own_echo(session: &dyn ChatSession, directory: &dyn RecipientDirectory) -> bool {
    let user_id = session.user_id().trim();
    if user_id.is_empty() {
        return false;
    }
    let platform = session.platform().trim();
    directory.online().iter().any(|recipient| {
        if recipient.self_id().trim() != user_id {
            return false;
        }
        let bot_platform = recipient.platform().trim();
        platform.is_empty() || bot_platform.is_empty() || bot_platform == platform
    })
}

/// Display name for the sender, with id fallback.
pub fn nickname(session: &dyn ChatSession) -> String {
    session
        .username()
        .and_then(|n| crate::common::text::non_empty(n))
        .map(str::to_string)
        .unwrap_or_else(|| {
            crate::common::text::non_empty(session.user_id())
                .map(str::to_string)
                .unwrap_or_else(|| "Unknown user".to_string())
        })
}

/// Display name for the originating group, with channel-id fallback.
pub fn display_group(session: &dyn ChatSession) -> String {
    session
        .group_name()
        .and_then(|n| crate::common::text::non_empty(n))
        .map(str::to_string)
        .unwrap_or_else(|| {
            crate::common::text::non_empty(session.channel_id())
                .map(str::to_string)
                .unwrap_or_else(|| "Unknown group".to_string())
        })
}

/// Reply into the session, downgrading a send failure to a log entry.
pub async fn reply(session: &dyn ChatSession, text: &str) {
    if let Err(e) = session.send(text).await {
        warn!(error = %e, "Failed to send chat reply");
    }
}
