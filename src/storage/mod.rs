//! Storage Layer Module
//!
//! Provides persistence for accounts, wallet keys, the processed-comment
//! cache and pending operations.
//!
//! This module contains:
//! - Storage trait definitions for abstraction
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AccountStore, KeyRecord, PendingStore, StorageError, StorageResult};

#[cfg(test)]
pub use traits::MockPendingStore;
