//! Message Platform Capability
//!
//! Thin I/O boundary to the social platform: fetch inbound items, reply,
//! mark read, look up users.
//!
//! Implementations:
//! - [`RedditClient`] - Reddit OAuth API
//! - [`RecordingPlatform`] - scripted inbox that records replies (tests)

pub mod memory;
pub mod reddit;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use memory::RecordingPlatform;
pub use reddit::RedditClient;

/// Platform errors
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("platform API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("platform unavailable: {0}")]
    Unavailable(String),
}

/// Kind of inbound item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Private message
    Message,
    /// Public comment
    Comment,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Message => write!(f, "message"),
            ItemKind::Comment => write!(f, "comment"),
        }
    }
}

/// Where a reply goes; captured at request time and persisted with pending operations
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplyTarget {
    /// Platform-wide item id (e.g. `t4_abc`)
    pub item_id: String,
    pub kind: ItemKind,
}

/// Message or comment received by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundItem {
    /// Platform-wide item id
    pub id: String,
    pub kind: ItemKind,
    pub author: String,
    pub body: String,
    /// Item this one replies to (comments only)
    pub parent_id: Option<String>,
}

impl InboundItem {
    pub fn message(id: &str, author: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: ItemKind::Message,
            author: author.to_string(),
            body: body.to_string(),
            parent_id: None,
        }
    }

    pub fn comment(id: &str, author: &str, body: &str, parent_id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: ItemKind::Comment,
            author: author.to_string(),
            body: body.to_string(),
            parent_id: Some(parent_id.to_string()),
        }
    }

    pub fn reply_target(&self) -> ReplyTarget {
        ReplyTarget {
            item_id: self.id.clone(),
            kind: self.kind,
        }
    }
}

/// Social platform the bot lives on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    /// Unread inbox items (messages and comment replies)
    async fn fetch_unread(&self) -> Result<Vec<InboundItem>, PlatformError>;

    /// Recent comments in the scanned channels that contain a trigger token
    async fn fetch_triggered_comments(&self) -> Result<Vec<InboundItem>, PlatformError>;

    /// Author of the item a comment replies to, `None` if deleted
    async fn parent_author(&self, item: &InboundItem) -> Result<Option<String>, PlatformError>;

    async fn reply(&self, target: &ReplyTarget, text: &str) -> Result<(), PlatformError>;

    async fn mark_read(&self, items: &[InboundItem]) -> Result<(), PlatformError>;

    /// Whether a user with this name exists on the platform
    async fn user_exists(&self, username: &str) -> Result<bool, PlatformError>;
}
