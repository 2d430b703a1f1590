//! Storage Trait Definitions
//!
//! Defines abstract storage interfaces for accounts, wallet keys, the
//! processed-comment cache and pending operations.
//! Implementations can use SQLite (production) or in-memory (testing).

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

use crate::engine::PendingOperation;
use crate::types::AccountId;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persisted wallet key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    /// Base64 private key
    pub private_key: String,
    /// Public address
    pub address: String,
}

/// Account, key and comment-cache storage
///
/// Implementations:
/// - `SqliteStore` - Production storage with SQLite
/// - `MemoryStore` - In-memory storage for testing
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Internal id of a normalized identity
    async fn find_account_id(&self, identity: &str) -> StorageResult<Option<AccountId>>;

    /// Register an identity under the next sequential id (highest id + 1)
    ///
    /// Fails with `Duplicate` if the identity is already registered.
    async fn insert_account(&self, identity: &str) -> StorageResult<AccountId>;

    /// Wallet keys of an account
    async fn find_keys(&self, id: AccountId) -> StorageResult<Option<KeyRecord>>;

    /// Persist the wallet keys of an account; keys are never replaced
    async fn insert_keys(&self, id: AccountId, keys: &KeyRecord) -> StorageResult<()>;

    /// Subset of `ids` already handled
    async fn processed_comments(&self, ids: &[String]) -> StorageResult<HashSet<String>>;

    /// Remember comment ids as handled
    async fn mark_comments_processed(&self, ids: &[String]) -> StorageResult<()>;
}

/// Submitted-but-unconfirmed operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PendingStore: Send + Sync {
    async fn insert_pending(&self, op: &PendingOperation) -> StorageResult<()>;

    /// Returns false if nothing was stored under `tx_id`
    async fn remove_pending(&self, tx_id: &str) -> StorageResult<bool>;

    /// All stored operations, oldest first
    async fn load_pending(&self) -> StorageResult<Vec<PendingOperation>>;
}
