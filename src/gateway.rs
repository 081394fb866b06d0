//! Chat-platform boundary
//!
//! The engine never holds a live handle into a chat library; everything
//! crosses this trait as opaque string ids. Reaction traffic comes back as a
//! plain event stream so voting logic stays testable without a transport.
//!
//! `ConsoleGateway` is the observe-only implementation used when no chat
//! transport is wired up: outbound traffic goes to the log, message ids are
//! synthesized, and no reactions ever arrive.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Structured announcement content; transports render it natively (an embed
/// on Discord-likes, plain text on the console).
#[derive(Debug, Clone, Serialize)]
pub struct Announcement {
    pub title: String,
    pub description: String,
    pub fields: Vec<EmbedField>,
    pub footer: String,
    pub url: String,
    pub color: u32,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Added,
    Removed,
}

#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub kind: ReactionKind,
    pub message_id: String,
    pub emoji_id: String,
    pub user_id: String,
    pub user_is_bot: bool,
}

#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn list_guilds(&self) -> Result<Vec<String>>;

    /// Find a text channel by name in the guild, creating it if absent.
    async fn find_or_create_channel(&self, guild_id: &str, name: &str) -> Result<String>;

    /// Returns the posted message's id.
    async fn send_announcement(&self, channel_id: &str, announcement: &Announcement) -> Result<String>;

    async fn send_text(&self, channel_id: &str, content: &str) -> Result<String>;

    /// Append a line to an existing message, keeping its original content.
    async fn append_to_message(&self, channel_id: &str, message_id: &str, line: &str) -> Result<()>;

    async fn react(&self, channel_id: &str, message_id: &str, emoji_markdown: &str) -> Result<()>;

    /// Revoke one user's reaction.
    async fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji_id: &str,
        user_id: &str,
    ) -> Result<()>;

    /// Single global reaction stream, handed over once at startup. `None` for
    /// transports that cannot produce reactions.
    async fn take_reaction_events(&self) -> Option<mpsc::UnboundedReceiver<ReactionEvent>>;
}

// ── Console (observe-only) transport ──────────────────────────────────────────

pub struct ConsoleGateway {
    guilds: Vec<String>,
    next_message_id: AtomicU64,
}

impl ConsoleGateway {
    pub fn new(guilds: Vec<String>) -> Self {
        Self {
            guilds,
            next_message_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> String {
        format!("msg-{}", self.next_message_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl ChatGateway for ConsoleGateway {
    async fn list_guilds(&self) -> Result<Vec<String>> {
        Ok(self.guilds.clone())
    }

    async fn find_or_create_channel(&self, guild_id: &str, name: &str) -> Result<String> {
        Ok(format!("{guild_id}/{name}"))
    }

    async fn send_announcement(&self, channel_id: &str, announcement: &Announcement) -> Result<String> {
        let id = self.next_id();
        info!(
            "[{channel_id}] {id} announce: {}",
            serde_json::to_string(announcement).unwrap_or_default()
        );
        Ok(id)
    }

    async fn send_text(&self, channel_id: &str, content: &str) -> Result<String> {
        let id = self.next_id();
        info!("[{channel_id}] {id} send: {content}");
        Ok(id)
    }

    async fn append_to_message(&self, channel_id: &str, message_id: &str, line: &str) -> Result<()> {
        info!("[{channel_id}] {message_id} append: {line}");
        Ok(())
    }

    async fn react(&self, channel_id: &str, message_id: &str, emoji_markdown: &str) -> Result<()> {
        info!("[{channel_id}] {message_id} react: {emoji_markdown}");
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji_id: &str,
        user_id: &str,
    ) -> Result<()> {
        info!("[{channel_id}] {message_id} remove reaction {emoji_id} from {user_id}");
        Ok(())
    }

    async fn take_reaction_events(&self) -> Option<mpsc::UnboundedReceiver<ReactionEvent>> {
        None
    }
}
