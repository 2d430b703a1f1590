//! SQLite Persistent Storage
//!
//! Provides durable storage for accounts, wallet keys, the comment cache and
//! pending operations, so the bot survives restarts.
//! Uses connection pooling via r2d2.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

use super::traits::{AccountStore, KeyRecord, PendingStore, StorageError, StorageResult};
use crate::engine::PendingOperation;
use crate::types::AccountId;

// SQLITE_CONSTRAINT_PRIMARYKEY / SQLITE_CONSTRAINT_UNIQUE
const CONSTRAINT_CODES: [i32; 2] = [1555, 2067];

/// SQLite-backed store with connection pooling
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                identity TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS wallets (
                account_id INTEGER PRIMARY KEY REFERENCES accounts(id),
                private_key TEXT NOT NULL,
                address TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS processed_comments (
                id TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS pending_operations (
                tx_id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                sender TEXT NOT NULL,
                submitted_at INTEGER NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pending_submitted_at ON pending_operations(submitted_at);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    // Synchronous helper methods for the trait implementations

    fn find_account_id_sync(&self, identity: &str) -> StorageResult<Option<AccountId>> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT id FROM accounts WHERE identity = ?1",
            params![identity],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map(|id| id.map(|id| id as AccountId))
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn insert_account_sync(&self, identity: &str) -> StorageResult<AccountId> {
        let conn = self.conn()?;

        // Single statement: id allocation and insert cannot interleave
        conn.execute(
            r#"
            INSERT INTO accounts (id, identity)
            SELECT COALESCE(MAX(id), 0) + 1, ?1 FROM accounts
            "#,
            params![identity],
        )
        .map_err(|e| map_insert_error(e, identity))?;

        let id = conn.last_insert_rowid();
        Ok(id as AccountId)
    }

    fn find_keys_sync(&self, id: AccountId) -> StorageResult<Option<KeyRecord>> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT private_key, address FROM wallets WHERE account_id = ?1",
            params![id as i64],
            |row| {
                Ok(KeyRecord {
                    private_key: row.get(0)?,
                    address: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn insert_keys_sync(&self, id: AccountId, keys: &KeyRecord) -> StorageResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO wallets (account_id, private_key, address) VALUES (?1, ?2, ?3)",
            params![id as i64, keys.private_key, keys.address],
        )
        .map_err(|e| map_insert_error(e, &format!("wallet of account {}", id)))?;

        Ok(())
    }

    fn processed_comments_sync(&self, ids: &[String]) -> StorageResult<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT 1 FROM processed_comments WHERE id = ?1")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut seen = HashSet::new();
        for id in ids {
            let exists = stmt
                .exists(params![id])
                .map_err(|e| StorageError::Database(e.to_string()))?;
            if exists {
                seen.insert(id.clone());
            }
        }

        Ok(seen)
    }

    fn mark_comments_processed_sync(&self, ids: &[String]) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        for id in ids {
            tx.execute(
                "INSERT OR IGNORE INTO processed_comments (id) VALUES (?1)",
                params![id],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        }

        tx.commit()
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn insert_pending_sync(&self, op: &PendingOperation) -> StorageResult<()> {
        let conn = self.conn()?;
        let payload =
            serde_json::to_string(op).map_err(|e| StorageError::InvalidData(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO pending_operations (tx_id, kind, sender, submitted_at, payload)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                op.tx_id,
                op.kind.to_string(),
                op.sender,
                op.submitted_at.timestamp_millis(),
                payload,
            ],
        )
        .map_err(|e| map_insert_error(e, &op.tx_id))?;

        Ok(())
    }

    fn remove_pending_sync(&self, tx_id: &str) -> StorageResult<bool> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                "DELETE FROM pending_operations WHERE tx_id = ?1",
                params![tx_id],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(rows_affected > 0)
    }

    fn load_pending_sync(&self) -> StorageResult<Vec<PendingOperation>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT payload FROM pending_operations ORDER BY submitted_at ASC")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        payloads
            .iter()
            .map(|payload| {
                serde_json::from_str(payload).map_err(|e| StorageError::InvalidData(e.to_string()))
            })
            .collect()
    }
}

fn map_insert_error(e: rusqlite::Error, key: &str) -> StorageError {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e {
        if CONSTRAINT_CODES.contains(&err.extended_code) {
            return StorageError::Duplicate(key.to_string());
        }
    }
    StorageError::Database(e.to_string())
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn find_account_id(&self, identity: &str) -> StorageResult<Option<AccountId>> {
        self.find_account_id_sync(identity)
    }

    async fn insert_account(&self, identity: &str) -> StorageResult<AccountId> {
        self.insert_account_sync(identity)
    }

    async fn find_keys(&self, id: AccountId) -> StorageResult<Option<KeyRecord>> {
        self.find_keys_sync(id)
    }

    async fn insert_keys(&self, id: AccountId, keys: &KeyRecord) -> StorageResult<()> {
        self.insert_keys_sync(id, keys)
    }

    async fn processed_comments(&self, ids: &[String]) -> StorageResult<HashSet<String>> {
        self.processed_comments_sync(ids)
    }

    async fn mark_comments_processed(&self, ids: &[String]) -> StorageResult<()> {
        self.mark_comments_processed_sync(ids)
    }
}

#[async_trait]
impl PendingStore for SqliteStore {
    async fn insert_pending(&self, op: &PendingOperation) -> StorageResult<()> {
        self.insert_pending_sync(op)
    }

    async fn remove_pending(&self, tx_id: &str) -> StorageResult<bool> {
        self.remove_pending_sync(tx_id)
    }

    async fn load_pending(&self) -> StorageResult<Vec<PendingOperation>> {
        self.load_pending_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OperationKind;
    use crate::platform::{ItemKind, ReplyTarget};
    use chrono::{Duration, Utc};

    fn pending(tx_id: &str, age_secs: i64) -> PendingOperation {
        PendingOperation {
            tx_id: tx_id.to_string(),
            kind: OperationKind::Tip,
            sender: "alice".to_string(),
            summary: "tip of 1 AKTA to u/bob".to_string(),
            confirmation: "sent".to_string(),
            reply_to: ReplyTarget {
                item_id: "t4_x".to_string(),
                kind: ItemKind::Message,
            },
            submitted_at: Utc::now() - Duration::seconds(age_secs),
            last_valid: 2000,
        }
    }

    #[tokio::test]
    async fn test_sequential_ids() {
        let store = SqliteStore::in_memory().unwrap();

        assert_eq!(store.insert_account("alice").await.unwrap(), 1);
        assert_eq!(store.insert_account("bob").await.unwrap(), 2);
        assert_eq!(store.find_account_id("bob").await.unwrap(), Some(2));
        assert_eq!(store.find_account_id("carol").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_identity() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_account("alice").await.unwrap();

        let result = store.insert_account("alice").await;
        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_keys_are_never_replaced() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.insert_account("alice").await.unwrap();
        let keys = KeyRecord {
            private_key: "secret".to_string(),
            address: "ADDR1".to_string(),
        };

        store.insert_keys(id, &keys).await.unwrap();
        assert_eq!(store.find_keys(id).await.unwrap(), Some(keys));

        let other = KeyRecord {
            private_key: "other".to_string(),
            address: "ADDR2".to_string(),
        };
        assert!(matches!(
            store.insert_keys(id, &other).await,
            Err(StorageError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_comment_cache() {
        let store = SqliteStore::in_memory().unwrap();
        let ids = vec!["t1_a".to_string(), "t1_b".to_string()];

        store.mark_comments_processed(&ids[..1]).await.unwrap();
        store.mark_comments_processed(&ids[..1]).await.unwrap();

        let seen = store.processed_comments(&ids).await.unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen.contains("t1_a"));
    }

    #[tokio::test]
    async fn test_pending_round_trip_keeps_order() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_pending(&pending("TX_NEW", 10)).await.unwrap();
        store.insert_pending(&pending("TX_OLD", 60)).await.unwrap();

        let loaded = store.load_pending().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].tx_id, "TX_OLD");
        assert_eq!(loaded[1].reply_to.item_id, "t4_x");

        assert!(store.remove_pending("TX_OLD").await.unwrap());
        assert!(!store.remove_pending("TX_OLD").await.unwrap());
        assert_eq!(store.load_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tips.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store.insert_account("alice").await.unwrap();
            store.insert_pending(&pending("TX1", 0)).await.unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.find_account_id("alice").await.unwrap(), Some(1));
        assert_eq!(store.load_pending().await.unwrap()[0].tx_id, "TX1");
    }
}
