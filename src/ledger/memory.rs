//! In-process ledger
//!
//! Holds balances in memory and keeps submitted transfers in a pool until
//! they are confirmed or rejected explicitly. Used for dry runs and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{
    AccountInfo, AssetHolding, LedgerClient, LedgerError, SignedTransfer, SuggestedParams,
    TransactionStatus, TransferKind, VALIDITY_WINDOW_ROUNDS,
};

const GENESIS_ID: &str = "inmemory-v1";
const GENESIS_HASH: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

#[derive(Debug, Default, Clone)]
struct AccountState {
    amount: u64,
    assets: HashMap<u64, u64>,
}

#[derive(Debug)]
struct LedgerState {
    accounts: HashMap<String, AccountState>,
    pool: HashMap<String, SignedTransfer>,
    confirmed: HashMap<String, u64>,
    rejected: HashMap<String, String>,
    submitted: Vec<String>,
    round: u64,
    min_fee: u64,
    available: bool,
}

/// In-memory ledger
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState {
                accounts: HashMap::new(),
                pool: HashMap::new(),
                confirmed: HashMap::new(),
                rejected: HashMap::new(),
                submitted: Vec::new(),
                round: 1000,
                min_fee: 1000,
                available: true,
            })),
        }
    }

    /// Credit native micro-units to an address
    pub async fn fund(&self, address: &str, micro: u64) {
        let mut state = self.state.write().await;
        state.accounts.entry(address.to_string()).or_default().amount += micro;
    }

    /// Set the holding of `asset_id`, opting the address in
    pub async fn set_asset(&self, address: &str, asset_id: u64, micro: u64) {
        let mut state = self.state.write().await;
        state
            .accounts
            .entry(address.to_string())
            .or_default()
            .assets
            .insert(asset_id, micro);
    }

    /// Simulate the node going down or coming back
    pub async fn set_available(&self, available: bool) {
        self.state.write().await.available = available;
    }

    /// Let `rounds` empty rounds pass
    pub async fn advance_rounds(&self, rounds: u64) {
        self.state.write().await.round += rounds;
    }

    pub async fn set_min_fee(&self, min_fee: u64) {
        self.state.write().await.min_fee = min_fee;
    }

    /// Ids of every accepted submission, in order
    pub async fn submitted(&self) -> Vec<String> {
        self.state.read().await.submitted.clone()
    }

    /// Transfer still waiting in the pool
    pub async fn pooled(&self, tx_id: &str) -> Option<SignedTransfer> {
        self.state.read().await.pool.get(tx_id).cloned()
    }

    /// Commit a pooled transfer in a new round
    ///
    /// Returns false when the id is not pooled, its validity window has
    /// passed, or the sender cannot cover it; the last two reject the
    /// transfer with a pool error.
    pub async fn confirm(&self, tx_id: &str) -> bool {
        let mut state = self.state.write().await;
        let signed = match state.pool.remove(tx_id) {
            Some(signed) => signed,
            None => return false,
        };

        if state.round >= signed.transfer.last_valid {
            state
                .rejected
                .insert(tx_id.to_string(), "txn dead: round outside of validity window".to_string());
            return false;
        }

        match apply(&mut state.accounts, &signed) {
            Ok(()) => {
                state.round += 1;
                let round = state.round;
                state.confirmed.insert(tx_id.to_string(), round);
                true
            }
            Err(reason) => {
                state.rejected.insert(tx_id.to_string(), reason);
                false
            }
        }
    }

    /// Confirm every pooled transfer, returning how many were committed
    pub async fn confirm_all(&self) -> usize {
        let ids: Vec<String> = self.state.read().await.pool.keys().cloned().collect();
        let mut committed = 0;
        for id in ids {
            if self.confirm(&id).await {
                committed += 1;
            }
        }
        committed
    }

    /// Drop a pooled transfer with a pool error
    pub async fn reject(&self, tx_id: &str, reason: &str) {
        let mut state = self.state.write().await;
        state.pool.remove(tx_id);
        state.rejected.insert(tx_id.to_string(), reason.to_string());
    }

    fn check_available(state: &LedgerState) -> Result<(), LedgerError> {
        if state.available {
            Ok(())
        } else {
            Err(LedgerError::Unavailable("in-memory ledger offline".to_string()))
        }
    }
}

fn apply(
    accounts: &mut HashMap<String, AccountState>,
    signed: &SignedTransfer,
) -> Result<(), String> {
    let transfer = &signed.transfer;
    let sender = accounts.get(&transfer.sender).cloned().unwrap_or_default();

    match &transfer.kind {
        TransferKind::Payment {
            receiver,
            amount,
            close_remainder_to,
        } => {
            let debit = amount + transfer.fee;
            if sender.amount < debit {
                return Err("overspend".to_string());
            }
            let remainder = sender.amount - debit;

            if let Some(close_to) = close_remainder_to {
                accounts.remove(&transfer.sender);
                accounts.entry(receiver.clone()).or_default().amount += amount;
                accounts.entry(close_to.clone()).or_default().amount += remainder;
            } else {
                accounts.entry(transfer.sender.clone()).or_default().amount = remainder;
                accounts.entry(receiver.clone()).or_default().amount += amount;
            }
        }
        TransferKind::AssetTransfer {
            receiver,
            amount,
            asset_id,
        } => {
            if sender.amount < transfer.fee {
                return Err("overspend".to_string());
            }

            if receiver == &transfer.sender && *amount == 0 {
                let entry = accounts.entry(transfer.sender.clone()).or_default();
                entry.amount -= transfer.fee;
                entry.assets.entry(*asset_id).or_insert(0);
                return Ok(());
            }

            let held = match sender.assets.get(asset_id) {
                Some(held) if *held >= *amount => *held,
                Some(_) => return Err("asset overspend".to_string()),
                None => return Err("sender not opted in".to_string()),
            };
            let receiver_opted_in = accounts
                .get(receiver)
                .map(|a| a.assets.contains_key(asset_id))
                .unwrap_or(false);
            if !receiver_opted_in {
                return Err("receiver not opted in".to_string());
            }

            let entry = accounts.entry(transfer.sender.clone()).or_default();
            entry.amount -= transfer.fee;
            entry.assets.insert(*asset_id, held - amount);
            if let Some(held) = accounts
                .entry(receiver.clone())
                .or_default()
                .assets
                .get_mut(asset_id)
            {
                *held += amount;
            }
        }
    }

    Ok(())
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn suggested_params(&self) -> Result<SuggestedParams, LedgerError> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        Ok(SuggestedParams {
            fee: 0,
            min_fee: state.min_fee,
            first_valid: state.round,
            last_valid: state.round + VALIDITY_WINDOW_ROUNDS,
            genesis_id: GENESIS_ID.to_string(),
            genesis_hash: GENESIS_HASH.to_string(),
        })
    }

    async fn account_info(&self, address: &str) -> Result<AccountInfo, LedgerError> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        let account = state.accounts.get(address).cloned().unwrap_or_default();

        let mut assets: Vec<AssetHolding> = account
            .assets
            .into_iter()
            .map(|(asset_id, amount)| AssetHolding { asset_id, amount })
            .collect();
        assets.sort_by_key(|h| h.asset_id);

        Ok(AccountInfo {
            address: address.to_string(),
            amount: account.amount,
            assets,
        })
    }

    async fn submit(&self, signed: &SignedTransfer) -> Result<String, LedgerError> {
        let mut state = self.state.write().await;
        Self::check_available(&state)?;

        if state.pool.contains_key(&signed.tx_id) || state.confirmed.contains_key(&signed.tx_id) {
            return Err(LedgerError::Api {
                status: 400,
                message: format!("transaction already in ledger: {}", signed.tx_id),
            });
        }

        state.pool.insert(signed.tx_id.clone(), signed.clone());
        state.submitted.push(signed.tx_id.clone());
        Ok(signed.tx_id.clone())
    }

    async fn transaction_status(&self, tx_id: &str) -> Result<TransactionStatus, LedgerError> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        Ok(TransactionStatus {
            confirmed_round: state.confirmed.get(tx_id).copied(),
            pool_error: state.rejected.get(tx_id).cloned(),
        })
    }

    async fn current_round(&self) -> Result<u64, LedgerError> {
        let state = self.state.read().await;
        Self::check_available(&state)?;
        Ok(state.round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{KeyPair, LedgerTransfer};

    async fn params(ledger: &InMemoryLedger) -> SuggestedParams {
        ledger.suggested_params().await.unwrap()
    }

    #[tokio::test]
    async fn test_payment_lifecycle() {
        let ledger = InMemoryLedger::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        ledger.fund(alice.address(), 1_000_000).await;

        let signed = LedgerTransfer::payment(alice.address(), bob.address(), 200_000, &params(&ledger).await)
            .sign(&alice)
            .unwrap();
        let tx_id = ledger.submit(&signed).await.unwrap();

        assert!(!ledger.transaction_status(&tx_id).await.unwrap().is_confirmed());
        assert!(ledger.confirm(&tx_id).await);
        assert!(ledger.transaction_status(&tx_id).await.unwrap().is_confirmed());

        assert_eq!(ledger.account_info(alice.address()).await.unwrap().amount, 799_000);
        assert_eq!(ledger.account_info(bob.address()).await.unwrap().amount, 200_000);
    }

    #[tokio::test]
    async fn test_closing_payment_empties_sender() {
        let ledger = InMemoryLedger::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        ledger.fund(alice.address(), 500_000).await;

        let signed = LedgerTransfer::closing_payment(
            alice.address(),
            bob.address(),
            499_000,
            bob.address(),
            &params(&ledger).await,
        )
        .sign(&alice)
        .unwrap();
        let tx_id = ledger.submit(&signed).await.unwrap();
        assert!(ledger.confirm(&tx_id).await);

        assert_eq!(ledger.account_info(alice.address()).await.unwrap().amount, 0);
        assert_eq!(ledger.account_info(bob.address()).await.unwrap().amount, 499_000);
    }

    #[tokio::test]
    async fn test_opt_in_then_asset_transfer() {
        let ledger = InMemoryLedger::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        ledger.fund(alice.address(), 1_000_000).await;
        ledger.fund(bob.address(), 1_000_000).await;
        ledger.set_asset(alice.address(), 9, 5_000_000).await;

        let opt_in = LedgerTransfer::opt_in(bob.address(), 9, &params(&ledger).await)
            .sign(&bob)
            .unwrap();
        ledger.submit(&opt_in).await.unwrap();

        let transfer =
            LedgerTransfer::asset_transfer(alice.address(), bob.address(), 1_500_000, 9, &params(&ledger).await)
                .sign(&alice)
                .unwrap();
        ledger.submit(&transfer).await.unwrap();

        assert!(ledger.confirm(&opt_in.tx_id).await);
        assert!(ledger.confirm(&transfer.tx_id).await);

        let bob_info = ledger.account_info(bob.address()).await.unwrap();
        assert_eq!(bob_info.holding(9).map(|h| h.amount), Some(1_500_000));
    }

    #[tokio::test]
    async fn test_overspend_is_pool_error() {
        let ledger = InMemoryLedger::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let signed = LedgerTransfer::payment(alice.address(), bob.address(), 10, &params(&ledger).await)
            .sign(&alice)
            .unwrap();
        ledger.submit(&signed).await.unwrap();

        assert!(!ledger.confirm(&signed.tx_id).await);
        let status = ledger.transaction_status(&signed.tx_id).await.unwrap();
        assert_eq!(status.pool_error.as_deref(), Some("overspend"));
    }

    #[tokio::test]
    async fn test_dead_transfer_never_commits() {
        let ledger = InMemoryLedger::new();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        ledger.fund(alice.address(), 1_000_000).await;

        let params = params(&ledger).await;
        let signed = LedgerTransfer::payment(alice.address(), bob.address(), 10, &params)
            .sign(&alice)
            .unwrap();
        ledger.submit(&signed).await.unwrap();

        ledger.advance_rounds(VALIDITY_WINDOW_ROUNDS).await;
        assert_eq!(ledger.current_round().await.unwrap(), params.last_valid);
        assert!(!ledger.confirm(&signed.tx_id).await);

        let status = ledger.transaction_status(&signed.tx_id).await.unwrap();
        assert!(!status.is_confirmed());
        assert!(status.pool_error.is_some());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let ledger = InMemoryLedger::new();
        ledger.set_available(false).await;
        assert!(matches!(
            ledger.suggested_params().await,
            Err(LedgerError::Unavailable(_))
        ));
    }
}
