//! Custodial Tip Bot
//!
//! Users on a social platform tip each other, withdraw and opt in to a
//! secondary asset through messages and comments; the bot holds one ledger
//! wallet per user and signs on their behalf.
//!
//! ## Layers
//!
//! 1. **Account Directory** - identity to internal id and custodial wallet
//! 2. **Transaction Engine** - validate, submit and check ledger transfers
//! 3. **Pending Tracker** - confirm or evict submitted operations, notify once
//! 4. **Dispatcher / Service** - command parsing and the ingestion loop

pub mod accounts;
pub mod common;
pub mod dispatcher;
pub mod engine;
pub mod ledger;
pub mod platform;
pub mod service;
pub mod storage;
pub mod templates;
pub mod tracker;
pub mod types;
pub mod wallet;

// Re-exports: core
pub use accounts::{AccountDirectory, Resolved};
pub use engine::{
    EngineError, OperationRequest, OperationStatus, PendingOperation, Rejection,
    TransactionEngine, ValidatedOperation,
};
pub use tracker::{PendingTracker, PollReport};

// Re-exports: edges
pub use dispatcher::{Command, DispatchError, Dispatcher};
pub use ledger::{AlgodClient, InMemoryLedger, LedgerClient, LedgerError};
pub use platform::{InboundItem, Platform, RecordingPlatform, RedditClient};
pub use service::{CycleReport, ServiceSettings, TipBotService};
pub use storage::{MemoryStore, SqliteStore};

// Re-exports: config and errors
pub use common::{TipBotConfig, TipBotError};
