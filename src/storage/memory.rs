//! In-Memory Storage Implementation
//!
//! Provides in-memory storage for testing and dry runs.
//! Data is lost when the process exits.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{AccountStore, KeyRecord, PendingStore, StorageError, StorageResult};
use crate::engine::PendingOperation;
use crate::types::AccountId;

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<String, AccountId>,
    keys: HashMap<AccountId, KeyRecord>,
    comments: HashSet<String>,
    pending: HashMap<String, PendingOperation>,
}

/// In-memory store
///
/// Thread-safe; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered accounts
    pub async fn account_count(&self) -> usize {
        self.state.read().await.accounts.len()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_account_id(&self, identity: &str) -> StorageResult<Option<AccountId>> {
        Ok(self.state.read().await.accounts.get(identity).copied())
    }

    async fn insert_account(&self, identity: &str) -> StorageResult<AccountId> {
        let mut state = self.state.write().await;

        if state.accounts.contains_key(identity) {
            return Err(StorageError::Duplicate(identity.to_string()));
        }

        let id = state.accounts.values().max().copied().unwrap_or(0) + 1;
        state.accounts.insert(identity.to_string(), id);
        Ok(id)
    }

    async fn find_keys(&self, id: AccountId) -> StorageResult<Option<KeyRecord>> {
        Ok(self.state.read().await.keys.get(&id).cloned())
    }

    async fn insert_keys(&self, id: AccountId, keys: &KeyRecord) -> StorageResult<()> {
        let mut state = self.state.write().await;

        if state.keys.contains_key(&id) {
            return Err(StorageError::Duplicate(format!("wallet of account {}", id)));
        }

        state.keys.insert(id, keys.clone());
        Ok(())
    }

    async fn processed_comments(&self, ids: &[String]) -> StorageResult<HashSet<String>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter(|id| state.comments.contains(*id))
            .cloned()
            .collect())
    }

    async fn mark_comments_processed(&self, ids: &[String]) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.comments.extend(ids.iter().cloned());
        Ok(())
    }
}

#[async_trait]
impl PendingStore for MemoryStore {
    async fn insert_pending(&self, op: &PendingOperation) -> StorageResult<()> {
        let mut state = self.state.write().await;

        if state.pending.contains_key(&op.tx_id) {
            return Err(StorageError::Duplicate(op.tx_id.clone()));
        }

        state.pending.insert(op.tx_id.clone(), op.clone());
        Ok(())
    }

    async fn remove_pending(&self, tx_id: &str) -> StorageResult<bool> {
        Ok(self.state.write().await.pending.remove(tx_id).is_some())
    }

    async fn load_pending(&self) -> StorageResult<Vec<PendingOperation>> {
        let state = self.state.read().await;
        let mut ops: Vec<PendingOperation> = state.pending.values().cloned().collect();
        ops.sort_by_key(|op| op.submitted_at);
        Ok(ops)
    }
}
