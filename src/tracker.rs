//! Pending Operation Tracker
//!
//! Owns every submitted-but-unconfirmed operation, keyed by transaction id.
//! Each poll asks the engine for the status of every tracked operation:
//!
//! - confirmed: reply with the confirmation, log, forget
//! - dropped by the node: reply with a failure notice, forget
//! - older than the timeout and past its last valid round: same as dropped
//! - otherwise: keep
//!
//! The round is read before any status, so a transfer seen pending after a
//! round at or beyond its last valid round can never commit.
//!
//! Entries are persisted through a [`PendingStore`] so they survive restarts.
//! Forgetting happens only after the reply went out; a failed reply keeps the
//! entry for the next poll. A crash between reply and forget repeats the reply
//! after restart.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::common::log_operation_event;
use crate::engine::{category_of, OperationStatus, PendingOperation, TransactionEngine};
use crate::platform::Platform;
use crate::storage::{PendingStore, StorageResult};

/// Outcome counts of one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub confirmed: usize,
    pub evicted: usize,
    pub still_pending: usize,
    /// Status lookups or replies that failed; those entries are retried next poll
    pub errors: usize,
}

/// Pending operation tracker
pub struct PendingTracker {
    engine: Arc<TransactionEngine>,
    platform: Arc<dyn Platform>,
    store: Arc<dyn PendingStore>,
    pending: HashMap<String, PendingOperation>,
    timeout: Duration,
}

impl PendingTracker {
    pub fn new(
        engine: Arc<TransactionEngine>,
        platform: Arc<dyn Platform>,
        store: Arc<dyn PendingStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            platform,
            store,
            pending: HashMap::new(),
            timeout,
        }
    }

    /// Reload persisted operations, returning how many are tracked afterwards
    pub async fn restore(&mut self) -> StorageResult<usize> {
        for op in self.store.load_pending().await? {
            self.pending.insert(op.tx_id.clone(), op);
        }
        if !self.pending.is_empty() {
            info!(
                target: "tipbot::tracker",
                count = self.pending.len(),
                "restored pending operations"
            );
        }
        Ok(self.pending.len())
    }

    /// Start tracking a submitted operation
    ///
    /// The operation is tracked even if persisting it fails; it is then only
    /// lost on restart.
    pub async fn add(&mut self, op: PendingOperation) {
        if self.pending.contains_key(&op.tx_id) {
            warn!(target: "tipbot::tracker", tx_id = %op.tx_id, "operation already tracked");
            return;
        }

        if let Err(e) = self.store.insert_pending(&op).await {
            error!(
                target: "tipbot::tracker",
                tx_id = %op.tx_id,
                error = %e,
                "failed to persist pending operation"
            );
        }

        debug!(target: "tipbot::tracker", tx_id = %op.tx_id, "tracking operation");
        self.pending.insert(op.tx_id.clone(), op);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.pending.contains_key(tx_id)
    }

    /// Tracked operations, oldest first
    pub fn pending(&self) -> Vec<&PendingOperation> {
        let mut ops: Vec<&PendingOperation> = self.pending.values().collect();
        ops.sort_by_key(|op| op.submitted_at);
        ops
    }

    /// Check every tracked operation once
    pub async fn poll(&mut self) -> PollReport {
        let mut report = PollReport::default();
        let now = Utc::now();

        // Snapshot: entries added while polling wait for the next poll
        let snapshot: Vec<PendingOperation> = self.pending().into_iter().cloned().collect();

        let round = if snapshot.iter().any(|op| self.expired(op, now)) {
            match self.engine.current_round().await {
                Ok(round) => Some(round),
                Err(e) => {
                    warn!(
                        target: "tipbot::tracker",
                        error = %e,
                        "round lookup failed, keeping overdue operations"
                    );
                    report.errors += 1;
                    None
                }
            }
        } else {
            None
        };

        for op in snapshot {
            let status = match self.engine.status(&op).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(
                        target: "tipbot::tracker",
                        tx_id = %op.tx_id,
                        error = %e,
                        "status lookup failed, retrying next poll"
                    );
                    report.errors += 1;
                    continue;
                }
            };

            match status {
                OperationStatus::Confirmed(round) => {
                    if self.notify(&op, &op.confirmation).await {
                        info!(
                            target: "tipbot::tracker",
                            tx_id = %op.tx_id,
                            round,
                            "{} confirmed",
                            op.summary
                        );
                        log_operation_event(
                            category_of(op.kind),
                            "confirmed",
                            &op.tx_id,
                            &op.sender,
                            serde_json::json!({ "round": round, "summary": op.summary }),
                            None,
                        );
                        self.forget(&op.tx_id).await;
                        report.confirmed += 1;
                    } else {
                        report.errors += 1;
                    }
                }
                OperationStatus::Rejected(reason) => {
                    if self.evict(&op, &reason).await {
                        report.evicted += 1;
                    } else {
                        report.errors += 1;
                    }
                }
                OperationStatus::Pending
                    if self.expired(&op, now) && round.map_or(false, |r| op.outlived(r)) =>
                {
                    if self.evict(&op, "not confirmed within its validity window").await {
                        report.evicted += 1;
                    } else {
                        report.errors += 1;
                    }
                }
                OperationStatus::Pending => report.still_pending += 1,
            }
        }

        if report != PollReport::default() {
            debug!(target: "tipbot::tracker", ?report, "poll finished");
        }
        report
    }

    fn expired(&self, op: &PendingOperation, now: DateTime<Utc>) -> bool {
        // Negative ages (clock skew) never expire
        op.age(now)
            .to_std()
            .map(|age| age > self.timeout)
            .unwrap_or(false)
    }

    async fn notify(&self, op: &PendingOperation, text: &str) -> bool {
        match self.platform.reply(&op.reply_to, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    target: "tipbot::tracker",
                    tx_id = %op.tx_id,
                    error = %e,
                    "reply failed, retrying next poll"
                );
                false
            }
        }
    }

    async fn evict(&mut self, op: &PendingOperation, reason: &str) -> bool {
        let notice = self
            .engine
            .templates()
            .operation_failed(&op.summary, &op.tx_id, reason);
        if !self.notify(op, &notice).await {
            return false;
        }

        log_operation_event(
            category_of(op.kind),
            "evicted",
            &op.tx_id,
            &op.sender,
            serde_json::json!({ "summary": op.summary }),
            Some(reason),
        );
        self.forget(&op.tx_id).await;
        true
    }

    async fn forget(&mut self, tx_id: &str) {
        if let Err(e) = self.store.remove_pending(tx_id).await {
            error!(
                target: "tipbot::tracker",
                tx_id = %tx_id,
                error = %e,
                "failed to remove pending operation from storage"
            );
        }
        self.pending.remove(tx_id);
    }
}
