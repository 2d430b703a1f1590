//! Scripted platform that records everything the bot sends

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{InboundItem, Platform, PlatformError, ReplyTarget};

/// Reply captured by [`RecordingPlatform`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    pub target: ReplyTarget,
    pub text: String,
}

#[derive(Debug, Default)]
struct PlatformState {
    unread: Vec<InboundItem>,
    comments: Vec<InboundItem>,
    authors: HashMap<String, String>,
    users: HashSet<String>,
    replies: Vec<SentReply>,
    read: Vec<String>,
    failing_replies: bool,
    available: bool,
}

/// In-memory platform for tests and dry runs
#[derive(Debug, Clone)]
pub struct RecordingPlatform {
    state: Arc<RwLock<PlatformState>>,
}

impl Default for RecordingPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(PlatformState {
                available: true,
                ..Default::default()
            })),
        }
    }

    /// Register a user; the author of every pushed item is registered too
    pub async fn add_user(&self, username: &str) {
        self.state.write().await.users.insert(username.to_lowercase());
    }

    /// Queue an unread inbox item
    pub async fn push_unread(&self, item: InboundItem) {
        let mut state = self.state.write().await;
        state.users.insert(item.author.to_lowercase());
        state.authors.insert(item.id.clone(), item.author.clone());
        state.unread.push(item);
    }

    /// Publish a channel comment; it stays visible to every later fetch
    pub async fn push_comment(&self, item: InboundItem) {
        let mut state = self.state.write().await;
        state.users.insert(item.author.to_lowercase());
        state.authors.insert(item.id.clone(), item.author.clone());
        state.comments.push(item);
    }

    /// Record the author of an item that comments can reply to
    pub async fn set_author(&self, item_id: &str, author: &str) {
        let mut state = self.state.write().await;
        state.users.insert(author.to_lowercase());
        state.authors.insert(item_id.to_string(), author.to_string());
    }

    pub async fn set_failing_replies(&self, failing: bool) {
        self.state.write().await.failing_replies = failing;
    }

    pub async fn set_available(&self, available: bool) {
        self.state.write().await.available = available;
    }

    pub async fn replies(&self) -> Vec<SentReply> {
        self.state.read().await.replies.clone()
    }

    /// Replies sent to one item
    pub async fn replies_to(&self, item_id: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .replies
            .iter()
            .filter(|r| r.target.item_id == item_id)
            .map(|r| r.text.clone())
            .collect()
    }

    /// Ids marked read, in order
    pub async fn read_ids(&self) -> Vec<String> {
        self.state.read().await.read.clone()
    }

    fn check_available(state: &PlatformState) -> Result<(), PlatformError> {
        if state.available {
            Ok(())
        } else {
            Err(PlatformError::Unavailable("recording platform offline".to_string()))
        }
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn fetch_unread(&self) -> Result<Vec<InboundItem>, PlatformError> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        Ok(state.unread.clone())
    }

    async fn fetch_triggered_comments(&self) -> Result<Vec<InboundItem>, PlatformError> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        Ok(state.comments.clone())
    }

    async fn parent_author(&self, item: &InboundItem) -> Result<Option<String>, PlatformError> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        Ok(item
            .parent_id
            .as_ref()
            .and_then(|id| state.authors.get(id).cloned()))
    }

    async fn reply(&self, target: &ReplyTarget, text: &str) -> Result<(), PlatformError> {
        let mut state = self.state.write().await;
        Self::check_available(&state)?;
        if state.failing_replies {
            return Err(PlatformError::Unavailable("reply rejected".to_string()));
        }
        state.replies.push(SentReply {
            target: target.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn mark_read(&self, items: &[InboundItem]) -> Result<(), PlatformError> {
        let mut state = self.state.write().await;
        Self::check_available(&state)?;
        for item in items {
            state.read.push(item.id.clone());
            state.unread.retain(|unread| unread.id != item.id);
        }
        Ok(())
    }

    async fn user_exists(&self, username: &str) -> Result<bool, PlatformError> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        Ok(state.users.contains(&username.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_read_clears_unread() {
        let platform = RecordingPlatform::new();
        let item = InboundItem::message("t4_1", "alice", "wallet");
        platform.push_unread(item.clone()).await;

        assert_eq!(platform.fetch_unread().await.unwrap().len(), 1);
        platform.mark_read(&[item]).await.unwrap();

        assert!(platform.fetch_unread().await.unwrap().is_empty());
        assert_eq!(platform.read_ids().await, vec!["t4_1".to_string()]);
    }

    #[tokio::test]
    async fn test_parent_author_and_users() {
        let platform = RecordingPlatform::new();
        platform.set_author("t3_post", "Carol").await;
        let comment = InboundItem::comment("t1_c", "dave", "!asatip 1", "t3_post");

        assert_eq!(
            platform.parent_author(&comment).await.unwrap(),
            Some("Carol".to_string())
        );
        assert!(platform.user_exists("CAROL").await.unwrap());
        assert!(!platform.user_exists("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_replies() {
        let platform = RecordingPlatform::new();
        platform.set_failing_replies(true).await;
        let target = InboundItem::message("t4_1", "alice", "x").reply_target();

        assert!(platform.reply(&target, "hi").await.is_err());
        assert!(platform.replies().await.is_empty());
    }
}
