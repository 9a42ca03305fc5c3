//! Waystone bridges chat platforms and Minecraft-style game servers.
//!
//! Game events flow in over forward or reverse WebSocket transports and
//! fan out to chat channels; chat messages flow back as in-game broadcasts
//! or operator commands. The WebSocket wire protocol and the chat-platform
//! SDK are external capabilities, consumed through the [`transport`] and
//! [`chat`] traits.

pub mod bridge;
pub mod chat;
pub mod common;
pub mod config;
pub mod runtime;
pub mod transport;

pub use bridge::Bridge;
