//! Ingestion Loop
//!
//! Drives the bot: polls the tracker every few cycles, fetches inbound
//! items, hands them to the dispatcher and tracks what gets submitted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::accounts::AccountDirectory;
use crate::common::{Result, TipBotConfig};
use crate::dispatcher::Dispatcher;
use crate::engine::TransactionEngine;
use crate::ledger::{AlgodClient, LedgerClient};
use crate::platform::{InboundItem, Platform, RedditClient};
use crate::storage::{AccountStore, SqliteStore};
use crate::templates::Templates;
use crate::tracker::{PendingTracker, PollReport};

/// Loop timing
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub cycle_interval: Duration,
    /// Poll the tracker on every n-th cycle
    pub confirm_every: u32,
}

impl From<&TipBotConfig> for ServiceSettings {
    fn from(config: &TipBotConfig) -> Self {
        Self {
            cycle_interval: config.cycle_interval,
            confirm_every: config.confirm_every,
        }
    }
}

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub items: usize,
    pub submitted: usize,
    pub poll: Option<PollReport>,
}

impl CycleReport {
    pub fn has_activity(&self) -> bool {
        self.items > 0
            || self
                .poll
                .map(|p| p.confirmed + p.evicted + p.errors > 0)
                .unwrap_or(false)
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "items={} submitted={}", self.items, self.submitted)?;
        if let Some(poll) = self.poll {
            write!(
                f,
                " confirmed={} evicted={} pending={}",
                poll.confirmed, poll.evicted, poll.still_pending
            )?;
        }
        Ok(())
    }
}

/// Tip bot service
pub struct TipBotService {
    platform: Arc<dyn Platform>,
    accounts: Arc<dyn AccountStore>,
    dispatcher: Dispatcher,
    tracker: PendingTracker,
    settings: ServiceSettings,
    cycle: u64,
}

impl TipBotService {
    pub fn new(
        platform: Arc<dyn Platform>,
        accounts: Arc<dyn AccountStore>,
        dispatcher: Dispatcher,
        tracker: PendingTracker,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            platform,
            accounts,
            dispatcher,
            tracker,
            settings,
            cycle: 0,
        }
    }

    /// Wire the production stack: algod, Reddit and SQLite
    pub fn from_config(config: &TipBotConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::new(&config.db_path)?);
        let ledger: Arc<dyn LedgerClient> = Arc::new(AlgodClient::from_config(&config.ledger));
        let platform: Arc<dyn Platform> = Arc::new(RedditClient::new(config.reddit.clone())?);

        let templates = Templates::new(
            config.network.explorer_url(),
            &config.ledger.asset_name,
            &config.reddit.username,
        );
        let engine = Arc::new(TransactionEngine::new(
            ledger,
            config.ledger.asset_id,
            templates,
        ));

        let directory = Arc::new(AccountDirectory::new(store.clone()));
        let dispatcher = Dispatcher::new(
            directory,
            engine.clone(),
            platform.clone(),
            config.reddit.triggers.clone(),
        );
        let tracker = PendingTracker::new(
            engine,
            platform.clone(),
            store.clone(),
            config.pending_timeout,
        );

        Ok(Self::new(
            platform,
            store,
            dispatcher,
            tracker,
            ServiceSettings::from(config),
        ))
    }

    pub fn tracker(&self) -> &PendingTracker {
        &self.tracker
    }

    /// Reload persisted pending operations
    pub async fn restore(&mut self) -> Result<usize> {
        Ok(self.tracker.restore().await?)
    }

    /// Run forever
    pub async fn run(&mut self) -> Result<()> {
        let restored = self.restore().await?;
        info!(
            target: "tipbot::service",
            restored,
            interval_ms = self.settings.cycle_interval.as_millis() as u64,
            confirm_every = self.settings.confirm_every,
            "tip bot started"
        );

        loop {
            let report = self.run_cycle().await;
            if report.has_activity() {
                info!(target: "tipbot::service", "[cycle] {}", report);
            }
            tokio::time::sleep(self.settings.cycle_interval).await;
        }
    }

    /// One iteration: tracker poll (every n-th cycle), then inbound items
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        if self.cycle % u64::from(self.settings.confirm_every.max(1)) == 0 {
            report.poll = Some(self.tracker.poll().await);
        }
        self.cycle += 1;

        let items = self.fetch_items().await;
        report.items = items.len();

        for item in &items {
            if let Some(op) = self.dispatcher.handle(item).await {
                self.tracker.add(op).await;
                report.submitted += 1;
            }
        }

        if !items.is_empty() {
            if let Err(e) = self.platform.mark_read(&items).await {
                warn!(target: "tipbot::service", error = %e, "failed to mark items read");
            }
        }

        report
    }

    async fn fetch_items(&self) -> Vec<InboundItem> {
        let mut items = match self.platform.fetch_unread().await {
            Ok(items) => items,
            Err(e) => {
                warn!(target: "tipbot::service", error = %e, "failed to fetch inbox");
                Vec::new()
            }
        };

        match self.new_comments().await {
            Ok(comments) => {
                // A mention can show up in the inbox and in the channel scan
                for comment in comments {
                    if !items.iter().any(|item| item.id == comment.id) {
                        items.push(comment);
                    }
                }
            }
            Err(e) => warn!(target: "tipbot::service", error = %e, "failed to fetch comments"),
        }

        items
    }

    /// Triggered comments not handled before; they are marked processed here
    async fn new_comments(&self) -> Result<Vec<InboundItem>> {
        let comments = self.platform.fetch_triggered_comments().await?;
        if comments.is_empty() {
            return Ok(comments);
        }

        let ids: Vec<String> = comments.iter().map(|c| c.id.clone()).collect();
        let seen = self.accounts.processed_comments(&ids).await?;

        let fresh: Vec<InboundItem> = comments
            .into_iter()
            .filter(|c| !seen.contains(&c.id))
            .collect();
        if fresh.is_empty() {
            return Ok(fresh);
        }

        let fresh_ids: Vec<String> = fresh.iter().map(|c| c.id.clone()).collect();
        if let Err(e) = self.accounts.mark_comments_processed(&fresh_ids).await {
            // Handling them unrecorded could tip twice
            error!(target: "tipbot::service", error = %e, "failed to record processed comments");
            return Err(e.into());
        }

        debug!(target: "tipbot::service", count = fresh.len(), "new triggered comments");
        Ok(fresh)
    }
}
