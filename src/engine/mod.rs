//! Transaction Engine
//!
//! Validates a requested operation against live balances and the policy
//! thresholds, submits it, and reports its confirmation status.
//!
//! ```text
//! OperationRequest --validate--> ValidatedOperation --send--> PendingOperation
//!        |                                                         |
//!        +--> Rejection (terminal, never submitted)          status/confirmed
//! ```
//!
//! Balances are read once per party per `validate`; the window between the
//! check and the submission is accepted.

pub mod error;
pub mod operation;
pub mod policy;

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

pub use error::{EngineError, Rejection};
pub use operation::{
    Asset, OperationKind, OperationRequest, OperationStatus, PendingOperation, RequestKind,
    ValidatedOperation, ValidatedTransfer,
};

use crate::common::{log_operation_event, EventCategory};
use crate::ledger::{is_valid_address, LedgerClient, LedgerError, LedgerTransfer, SuggestedParams};
use crate::templates::{Templates, NATIVE_ASSET_NAME};
use crate::types::units::truncate_to_ledger;
use crate::types::{format_amount, micro_to_units, units_to_micro, Account, AmountRequest};
use crate::wallet::{Balances, Wallet};
use policy::{ACTIVATION_RESERVE, MIN_AMOUNT, OPT_IN_BUFFER, TRANSFER_BUFFER};

/// Transaction engine
pub struct TransactionEngine {
    ledger: Arc<dyn LedgerClient>,
    asset_id: u64,
    templates: Templates,
}

impl TransactionEngine {
    pub fn new(ledger: Arc<dyn LedgerClient>, asset_id: u64, templates: Templates) -> Self {
        Self {
            ledger,
            asset_id,
            templates,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn asset_id(&self) -> u64 {
        self.asset_id
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    /// Live balances of an address
    pub async fn balances(&self, address: &str) -> Result<Balances, LedgerError> {
        Balances::fetch(self.ledger.as_ref(), address, self.asset_id).await
    }

    /// Live balances of a custodial wallet
    pub async fn wallet_balances(&self, wallet: &Wallet) -> Result<Balances, LedgerError> {
        wallet.balances(self.ledger.as_ref(), self.asset_id).await
    }

    async fn snapshot_params(&self) -> Result<(SuggestedParams, Decimal), LedgerError> {
        let params = self.ledger.suggested_params().await?;
        let fee = micro_to_units(params.min_fee);
        Ok((params, fee))
    }

    /// Check a request against balances and policy; first failing rule wins
    pub async fn validate(
        &self,
        request: OperationRequest,
    ) -> Result<ValidatedOperation, EngineError> {
        let OperationRequest {
            sender,
            kind,
            note,
            reply_to,
        } = request;

        let (transfer, params, fee) = match kind {
            RequestKind::Tip { receiver, amount } => {
                self.validate_tip(&sender, receiver, amount).await?
            }
            RequestKind::Withdraw {
                destination,
                amount,
                asset,
            } => {
                self.validate_withdraw(&sender, destination, amount, asset)
                    .await?
            }
            RequestKind::OptIn => self.validate_opt_in(&sender).await?,
        };

        debug!(
            target: "tipbot::engine",
            sender = %sender.identity,
            ?transfer,
            "operation validated"
        );

        Ok(ValidatedOperation {
            sender,
            transfer,
            note,
            reply_to,
            params,
            fee,
        })
    }

    async fn validate_tip(
        &self,
        sender: &Account,
        receiver: Account,
        amount: Decimal,
    ) -> Result<(ValidatedTransfer, SuggestedParams, Decimal), EngineError> {
        let sender_balances = self.wallet_balances(&sender.wallet).await?;
        if !sender_balances.asset.is_participating() {
            return Err(Rejection::SenderNotParticipating.into());
        }

        let receiver_balances = self.wallet_balances(&receiver.wallet).await?;
        if !receiver_balances.asset.is_participating() {
            return Err(Rejection::ReceiverNotParticipating.into());
        }

        let (params, fee) = self.snapshot_params().await?;

        if amount < MIN_AMOUNT {
            return Err(Rejection::ZeroAmount.into());
        }

        if fee + TRANSFER_BUFFER > sender_balances.native {
            return Err(Rejection::InsufficientFunds {
                amount,
                balance: sender_balances.native,
            }
            .into());
        }

        if amount + TRANSFER_BUFFER > sender_balances.asset.amount() {
            return Err(Rejection::InsufficientFunds {
                amount,
                balance: sender_balances.asset.amount(),
            }
            .into());
        }

        if receiver_balances.native.is_zero() && amount < ACTIVATION_RESERVE {
            return Err(Rejection::FirstTransferBelowActivation { amount }.into());
        }

        let transfer = ValidatedTransfer::Tip {
            receiver,
            amount: truncate_to_ledger(amount),
        };
        Ok((transfer, params, fee))
    }

    async fn validate_withdraw(
        &self,
        sender: &Account,
        destination: String,
        requested: AmountRequest,
        asset: Asset,
    ) -> Result<(ValidatedTransfer, SuggestedParams, Decimal), EngineError> {
        if !is_valid_address(&destination) {
            return Err(Rejection::InvalidRequest(format!("invalid address: {}", destination)).into());
        }

        let sender_balances = self.wallet_balances(&sender.wallet).await?;
        let destination_balances = self.balances(&destination).await?;

        if asset == Asset::Secondary {
            if !destination_balances.asset.is_participating() {
                return Err(Rejection::ReceiverNotParticipating.into());
            }
            if !sender_balances.asset.is_participating() {
                return Err(Rejection::SenderNotParticipating.into());
            }
        }

        let (params, fee) = self.snapshot_params().await?;

        let available = match asset {
            Asset::Native => sender_balances.native,
            Asset::Secondary => sender_balances.asset.amount(),
        };

        let mut amount = match requested {
            AmountRequest::All => available,
            AmountRequest::Exact(amount) => amount,
        };

        // Emptying the native balance closes the account; the fee comes out of the amount
        // and no buffer is kept. Secondary withdrawals never close.
        let closing = asset == Asset::Native && amount == sender_balances.native;
        if closing {
            amount -= fee;
        }

        if amount < MIN_AMOUNT {
            return Err(Rejection::ZeroAmount.into());
        }

        let buffer = if closing {
            Decimal::ZERO
        } else {
            TRANSFER_BUFFER
        };

        if fee + buffer > sender_balances.native {
            return Err(Rejection::InsufficientFunds {
                amount,
                balance: sender_balances.native,
            }
            .into());
        }

        if amount + buffer > available {
            return Err(Rejection::InsufficientFunds {
                amount,
                balance: available,
            }
            .into());
        }

        if destination_balances.native.is_zero() && amount < ACTIVATION_RESERVE {
            return Err(Rejection::FirstTransferBelowActivation { amount }.into());
        }

        let transfer = ValidatedTransfer::Withdraw {
            destination,
            amount: truncate_to_ledger(amount),
            asset,
            closing,
        };
        Ok((transfer, params, fee))
    }

    async fn validate_opt_in(
        &self,
        sender: &Account,
    ) -> Result<(ValidatedTransfer, SuggestedParams, Decimal), EngineError> {
        let balances = self.wallet_balances(&sender.wallet).await?;
        if balances.asset.is_participating() {
            return Err(Rejection::AlreadyParticipating.into());
        }

        let (params, fee) = self.snapshot_params().await?;

        let required = fee + OPT_IN_BUFFER;
        if required > balances.native {
            return Err(Rejection::InsufficientFunds {
                amount: required,
                balance: balances.native,
            }
            .into());
        }

        Ok((ValidatedTransfer::OptIn, params, fee))
    }

    /// Sign and submit a validated operation
    ///
    /// Consumes the operation: a failed submission is final, a retry needs a
    /// fresh request.
    pub async fn send(&self, op: ValidatedOperation) -> Result<PendingOperation, LedgerError> {
        let kind = op.kind();
        let sender_address = op.sender.address().to_string();
        let micro = |amount: Decimal| {
            units_to_micro(amount)
                .ok_or_else(|| LedgerError::Encoding(format!("amount out of range: {}", amount)))
        };

        let transfer = match &op.transfer {
            ValidatedTransfer::Tip { receiver, amount } => LedgerTransfer::asset_transfer(
                &sender_address,
                receiver.address(),
                micro(*amount)?,
                self.asset_id,
                &op.params,
            ),
            ValidatedTransfer::Withdraw {
                destination,
                amount,
                asset: Asset::Secondary,
                ..
            } => LedgerTransfer::asset_transfer(
                &sender_address,
                destination,
                micro(*amount)?,
                self.asset_id,
                &op.params,
            ),
            ValidatedTransfer::Withdraw {
                destination,
                amount,
                asset: Asset::Native,
                closing,
            } => {
                if *closing {
                    LedgerTransfer::closing_payment(
                        &sender_address,
                        destination,
                        micro(*amount)?,
                        destination,
                        &op.params,
                    )
                } else {
                    LedgerTransfer::payment(
                        &sender_address,
                        destination,
                        micro(*amount)?,
                        &op.params,
                    )
                }
            }
            ValidatedTransfer::OptIn => {
                LedgerTransfer::opt_in(&sender_address, self.asset_id, &op.params)
            }
        };

        let transfer = match &op.note {
            Some(note) => transfer.with_note(note.as_bytes()),
            None => transfer,
        };

        let signed = transfer.sign(op.sender.wallet.keys())?;
        let tx_id = self.ledger.submit(&signed).await?;
        let (summary, confirmation) = self.describe(&op, &tx_id);

        info!(
            target: "tipbot::engine",
            tx_id = %tx_id,
            kind = %kind,
            sender = %op.sender.identity,
            "{} submitted",
            summary
        );
        log_operation_event(
            category_of(kind),
            "submitted",
            &tx_id,
            &op.sender.identity,
            serde_json::json!({
                "kind": kind,
                "summary": summary,
                "fee": op.fee.to_string(),
                "last_valid": op.params.last_valid,
            }),
            None,
        );

        Ok(PendingOperation {
            tx_id,
            kind,
            sender: op.sender.identity.clone(),
            summary,
            confirmation,
            reply_to: op.reply_to,
            submitted_at: Utc::now(),
            last_valid: op.params.last_valid,
        })
    }

    fn describe(&self, op: &ValidatedOperation, tx_id: &str) -> (String, String) {
        let asset_name = self.templates.asset_name();
        match &op.transfer {
            ValidatedTransfer::Tip { receiver, amount } => (
                format!(
                    "tip of {} {} to u/{}",
                    format_amount(*amount),
                    asset_name,
                    receiver.identity
                ),
                self.templates
                    .tip_confirmation(&receiver.identity, *amount, tx_id),
            ),
            ValidatedTransfer::Withdraw {
                destination,
                amount,
                asset,
                ..
            } => {
                let native = *asset == Asset::Native;
                let name = if native { NATIVE_ASSET_NAME } else { asset_name };
                (
                    format!(
                        "withdrawal of {} {} to {}",
                        format_amount(*amount),
                        name,
                        destination
                    ),
                    self.templates
                        .withdrawal_confirmation(*amount, destination, tx_id, native),
                )
            }
            ValidatedTransfer::OptIn => (
                format!("opt-in to {}", asset_name),
                self.templates.opt_in_confirmation(),
            ),
        }
    }

    /// Ledger status of a pending operation; repeatable and side-effect free
    pub async fn status(&self, op: &PendingOperation) -> Result<OperationStatus, LedgerError> {
        let status = self.ledger.transaction_status(&op.tx_id).await?;

        if let Some(round) = status.confirmed_round.filter(|r| *r >= 1) {
            return Ok(OperationStatus::Confirmed(round));
        }
        match status.pool_error {
            Some(error) => Ok(OperationStatus::Rejected(error)),
            None => Ok(OperationStatus::Pending),
        }
    }

    /// Last round committed by the ledger
    pub async fn current_round(&self) -> Result<u64, LedgerError> {
        self.ledger.current_round().await
    }

    /// Whether the ledger has committed the operation
    pub async fn confirmed(&self, op: &PendingOperation) -> Result<bool, LedgerError> {
        Ok(matches!(self.status(op).await?, OperationStatus::Confirmed(_)))
    }
}

/// Log category of an operation kind
pub fn category_of(kind: OperationKind) -> EventCategory {
    match kind {
        OperationKind::Tip => EventCategory::Tip,
        OperationKind::Withdraw | OperationKind::NativeWithdraw => EventCategory::Withdrawal,
        OperationKind::OptIn => EventCategory::OptIn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, KeyPair, MockLedgerClient, TransactionStatus};
    use crate::platform::{ItemKind, ReplyTarget};
    use crate::wallet::Wallet;
    use std::str::FromStr;

    const ASSET: u64 = 10_458_941;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn micro(s: &str) -> u64 {
        units_to_micro(dec(s)).unwrap()
    }

    fn account(id: u64, name: &str) -> Account {
        Account {
            id,
            identity: name.to_string(),
            wallet: Wallet::generate(),
        }
    }

    fn target() -> ReplyTarget {
        ReplyTarget {
            item_id: "t4_req".to_string(),
            kind: ItemKind::Message,
        }
    }

    fn engine(ledger: &InMemoryLedger) -> TransactionEngine {
        TransactionEngine::new(
            Arc::new(ledger.clone()),
            ASSET,
            Templates::new("https://testnet.algoexplorer.io", "AKTA", "tip_bot"),
        )
    }

    async fn participant(ledger: &InMemoryLedger, id: u64, name: &str, native: &str, asset: &str) -> Account {
        let account = account(id, name);
        ledger.fund(account.address(), micro(native)).await;
        ledger.set_asset(account.address(), ASSET, micro(asset)).await;
        account
    }

    fn rejection(result: Result<ValidatedOperation, EngineError>) -> Rejection {
        match result {
            Err(EngineError::Rejected(rejection)) => rejection,
            other => panic!("expected rejection, got {:?}", other.map(|op| op.transfer)),
        }
    }

    #[tokio::test]
    async fn test_tip_sender_not_participating() {
        let ledger = InMemoryLedger::new();
        let alice = account(1, "alice");
        ledger.fund(alice.address(), micro("5")).await;
        let bob = participant(&ledger, 2, "bob", "1", "0").await;

        let result = engine(&ledger)
            .validate(OperationRequest::tip(alice, bob, dec("1"), target()))
            .await;
        assert_eq!(rejection(result), Rejection::SenderNotParticipating);
        assert!(ledger.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn test_tip_receiver_not_participating() {
        let ledger = InMemoryLedger::new();
        let alice = participant(&ledger, 1, "alice", "5", "10").await;
        let bob = account(2, "bob");

        let result = engine(&ledger)
            .validate(OperationRequest::tip(alice, bob, dec("1"), target()))
            .await;
        assert_eq!(rejection(result), Rejection::ReceiverNotParticipating);
    }

    #[tokio::test]
    async fn test_tip_below_smallest_unit() {
        let ledger = InMemoryLedger::new();
        let alice = participant(&ledger, 1, "alice", "5", "10").await;
        let bob = participant(&ledger, 2, "bob", "1", "0").await;

        let result = engine(&ledger)
            .validate(OperationRequest::tip(alice, bob, dec("0.0000009"), target()))
            .await;
        assert_eq!(rejection(result), Rejection::ZeroAmount);
    }

    #[tokio::test]
    async fn test_tip_native_buffer_reports_requested_amount() {
        let ledger = InMemoryLedger::new();
        let alice = participant(&ledger, 1, "alice", "0.05", "10").await;
        let bob = participant(&ledger, 2, "bob", "1", "0").await;

        let result = engine(&ledger)
            .validate(OperationRequest::tip(alice, bob, dec("1"), target()))
            .await;
        assert_eq!(
            rejection(result),
            Rejection::InsufficientFunds {
                amount: dec("1"),
                balance: dec("0.05"),
            }
        );
    }

    #[tokio::test]
    async fn test_tip_asset_buffer() {
        let ledger = InMemoryLedger::new();
        let alice = participant(&ledger, 1, "alice", "5", "1.1").await;
        let bob = participant(&ledger, 2, "bob", "1", "0").await;

        let result = engine(&ledger)
            .validate(OperationRequest::tip(alice, bob, dec("1"), target()))
            .await;
        assert_eq!(
            rejection(result),
            Rejection::InsufficientFunds {
                amount: dec("1"),
                balance: dec("1.1"),
            }
        );
    }

    #[tokio::test]
    async fn test_tip_to_inactive_receiver_needs_reserve() {
        let ledger = InMemoryLedger::new();
        let alice = participant(&ledger, 1, "alice", "5", "10").await;
        let bob = participant(&ledger, 2, "bob", "0", "0").await;

        let result = engine(&ledger)
            .validate(OperationRequest::tip(alice, bob, dec("0.05"), target()))
            .await;
        assert_eq!(
            rejection(result),
            Rejection::FirstTransferBelowActivation {
                amount: dec("0.05")
            }
        );
    }

    #[tokio::test]
    async fn test_tip_truncates_and_submits() {
        let ledger = InMemoryLedger::new();
        let alice = participant(&ledger, 1, "alice", "5", "10").await;
        let bob = participant(&ledger, 2, "bob", "1", "0").await;
        let bob_address = bob.address().to_string();
        let engine = engine(&ledger);

        let validated = engine
            .validate(OperationRequest::tip(alice, bob, dec("1.0000009"), target()).with_note("thanks"))
            .await
            .unwrap();
        assert_eq!(validated.amount(), dec("1"));
        assert_eq!(validated.kind(), OperationKind::Tip);

        let pending = engine.send(validated).await.unwrap();
        assert_eq!(pending.kind, OperationKind::Tip);
        assert_eq!(pending.sender, "alice");
        assert!(pending.confirmation.contains(&pending.tx_id));
        assert_eq!(pending.reply_to, target());

        let pooled = ledger.pooled(&pending.tx_id).await.unwrap();
        assert_eq!(pooled.transfer.receiver(), bob_address);
        assert_eq!(pooled.transfer.amount(), 1_000_000);
        assert_eq!(pooled.transfer.note, b"thanks".to_vec());
    }

    #[tokio::test]
    async fn test_withdraw_all_native_closes_account() {
        let ledger = InMemoryLedger::new();
        let alice = account(1, "alice");
        ledger.fund(alice.address(), micro("5")).await;
        let destination = KeyPair::generate();
        ledger.fund(destination.address(), micro("1")).await;
        let engine = engine(&ledger);

        let validated = engine
            .validate(OperationRequest::withdraw(
                alice,
                destination.address(),
                AmountRequest::All,
                Asset::Native,
                target(),
            ))
            .await
            .unwrap();

        match &validated.transfer {
            ValidatedTransfer::Withdraw { amount, closing, .. } => {
                assert!(*closing);
                assert_eq!(*amount, dec("4.999"));
            }
            other => panic!("unexpected transfer {:?}", other),
        }

        let pending = engine.send(validated).await.unwrap();
        assert_eq!(pending.kind, OperationKind::NativeWithdraw);
        assert!(ledger.confirm(&pending.tx_id).await);
        assert_eq!(
            ledger.account_info(destination.address()).await.unwrap().amount,
            micro("5.999")
        );
    }

    #[tokio::test]
    async fn test_withdraw_partial_native_keeps_buffer() {
        let ledger = InMemoryLedger::new();
        let alice = account(1, "alice");
        ledger.fund(alice.address(), micro("5")).await;
        let destination = KeyPair::generate();
        ledger.fund(destination.address(), micro("1")).await;

        let result = engine(&ledger)
            .validate(OperationRequest::withdraw(
                alice,
                destination.address(),
                AmountRequest::Exact(dec("4.9")),
                Asset::Native,
                target(),
            ))
            .await;
        assert_eq!(
            rejection(result),
            Rejection::InsufficientFunds {
                amount: dec("4.9"),
                balance: dec("5"),
            }
        );
    }

    #[tokio::test]
    async fn test_withdraw_secondary_requires_destination_opt_in() {
        let ledger = InMemoryLedger::new();
        let alice = participant(&ledger, 1, "alice", "5", "10").await;
        let destination = KeyPair::generate();

        let result = engine(&ledger)
            .validate(OperationRequest::withdraw(
                alice,
                destination.address(),
                AmountRequest::Exact(dec("1")),
                Asset::Secondary,
                target(),
            ))
            .await;
        assert_eq!(rejection(result), Rejection::ReceiverNotParticipating);
    }

    #[tokio::test]
    async fn test_withdraw_secondary_all_never_closes() {
        let ledger = InMemoryLedger::new();
        let alice = participant(&ledger, 1, "alice", "5", "5").await;
        let destination = KeyPair::generate();
        ledger.fund(destination.address(), micro("1")).await;
        ledger.set_asset(destination.address(), ASSET, 0).await;

        // "all" of the asset leaves no room for the buffer
        let result = engine(&ledger)
            .validate(OperationRequest::withdraw(
                alice,
                destination.address(),
                AmountRequest::All,
                Asset::Secondary,
                target(),
            ))
            .await;
        assert_eq!(
            rejection(result),
            Rejection::InsufficientFunds {
                amount: dec("5"),
                balance: dec("5"),
            }
        );
    }

    #[tokio::test]
    async fn test_withdraw_invalid_address() {
        let ledger = InMemoryLedger::new();
        let alice = participant(&ledger, 1, "alice", "5", "10").await;

        let result = engine(&ledger)
            .validate(OperationRequest::withdraw(
                alice,
                "nowhere",
                AmountRequest::Exact(dec("1")),
                Asset::Native,
                target(),
            ))
            .await;
        assert!(matches!(rejection(result), Rejection::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_withdraw_below_smallest_unit() {
        let ledger = InMemoryLedger::new();
        let alice = participant(&ledger, 1, "alice", "5", "10").await;
        let destination = KeyPair::generate();
        ledger.fund(destination.address(), micro("1")).await;

        let result = engine(&ledger)
            .validate(OperationRequest::withdraw(
                alice,
                destination.address(),
                AmountRequest::Exact(dec("0.0000001")),
                Asset::Native,
                target(),
            ))
            .await;
        assert_eq!(rejection(result), Rejection::ZeroAmount);
    }

    #[tokio::test]
    async fn test_withdraw_all_native_below_fee() {
        let ledger = InMemoryLedger::new();
        let alice = account(1, "alice");
        ledger.fund(alice.address(), micro("0.0005")).await;
        let destination = KeyPair::generate();
        ledger.fund(destination.address(), micro("1")).await;

        // Closing takes the 0.001 fee out of 0.0005
        let result = engine(&ledger)
            .validate(OperationRequest::withdraw(
                alice,
                destination.address(),
                AmountRequest::All,
                Asset::Native,
                target(),
            ))
            .await;
        assert_eq!(rejection(result), Rejection::ZeroAmount);
    }

    #[tokio::test]
    async fn test_withdraw_secondary_to_unfunded_destination_needs_reserve() {
        let ledger = InMemoryLedger::new();
        let alice = participant(&ledger, 1, "alice", "5", "10").await;
        let destination = KeyPair::generate();
        ledger.set_asset(destination.address(), ASSET, 0).await;

        let result = engine(&ledger)
            .validate(OperationRequest::withdraw(
                alice,
                destination.address(),
                AmountRequest::Exact(dec("0.05")),
                Asset::Secondary,
                target(),
            ))
            .await;
        assert_eq!(
            rejection(result),
            Rejection::FirstTransferBelowActivation { amount: dec("0.05") }
        );
    }

    #[tokio::test]
    async fn test_opt_in_already_participating_with_zero_balance() {
        let ledger = InMemoryLedger::new();
        let alice = participant(&ledger, 1, "alice", "5", "0").await;

        let result = engine(&ledger)
            .validate(OperationRequest::opt_in(alice, target()))
            .await;
        assert_eq!(rejection(result), Rejection::AlreadyParticipating);
    }

    #[tokio::test]
    async fn test_opt_in_needs_fee_and_buffer() {
        let ledger = InMemoryLedger::new();
        let alice = account(1, "alice");
        ledger.fund(alice.address(), micro("0.1")).await;

        let result = engine(&ledger)
            .validate(OperationRequest::opt_in(alice, target()))
            .await;
        assert_eq!(
            rejection(result),
            Rejection::InsufficientFunds {
                amount: dec("0.111"),
                balance: dec("0.1"),
            }
        );
    }

    #[tokio::test]
    async fn test_opt_in_lifecycle() {
        let ledger = InMemoryLedger::new();
        let alice = account(1, "alice");
        let address = alice.address().to_string();
        ledger.fund(&address, micro("0.5")).await;
        let engine = engine(&ledger);

        let validated = engine
            .validate(OperationRequest::opt_in(alice, target()))
            .await
            .unwrap();
        let pending = engine.send(validated).await.unwrap();

        assert!(!engine.confirmed(&pending).await.unwrap());
        assert!(!engine.confirmed(&pending).await.unwrap());
        ledger.confirm_all().await;
        assert!(engine.confirmed(&pending).await.unwrap());
        assert!(engine.confirmed(&pending).await.unwrap());

        assert!(engine.balances(&address).await.unwrap().asset.is_participating());
    }

    #[tokio::test]
    async fn test_status_reports_pool_error() {
        let ledger = InMemoryLedger::new();
        let alice = account(1, "alice");
        ledger.fund(alice.address(), micro("0.5")).await;
        let engine = engine(&ledger);

        let validated = engine
            .validate(OperationRequest::opt_in(alice, target()))
            .await
            .unwrap();
        let pending = engine.send(validated).await.unwrap();
        ledger.reject(&pending.tx_id, "txn dead").await;

        assert_eq!(
            engine.status(&pending).await.unwrap(),
            OperationStatus::Rejected("txn dead".to_string())
        );
    }

    #[tokio::test]
    async fn test_validate_propagates_ledger_outage() {
        let mut ledger = MockLedgerClient::new();
        ledger
            .expect_account_info()
            .returning(|_| Err(LedgerError::Unavailable("node down".to_string())));
        ledger.expect_submit().never();

        let engine = TransactionEngine::new(
            Arc::new(ledger),
            ASSET,
            Templates::new("https://testnet.algoexplorer.io", "AKTA", "tip_bot"),
        );
        let result = engine
            .validate(OperationRequest::opt_in(account(1, "alice"), target()))
            .await;
        assert!(matches!(result, Err(EngineError::Ledger(_))));
    }

    #[tokio::test]
    async fn test_confirmed_is_monotonic() {
        let mut ledger = MockLedgerClient::new();
        let mut calls = 0;
        ledger.expect_transaction_status().times(3).returning(move |_| {
            calls += 1;
            Ok(TransactionStatus {
                confirmed_round: if calls >= 2 { Some(77) } else { None },
                pool_error: None,
            })
        });

        let engine = TransactionEngine::new(
            Arc::new(ledger),
            ASSET,
            Templates::new("https://testnet.algoexplorer.io", "AKTA", "tip_bot"),
        );
        let pending = PendingOperation {
            tx_id: "TX1".to_string(),
            kind: OperationKind::OptIn,
            sender: "alice".to_string(),
            summary: "opt-in to AKTA".to_string(),
            confirmation: "done".to_string(),
            reply_to: target(),
            submitted_at: Utc::now(),
            last_valid: 2000,
        };

        assert!(!engine.confirmed(&pending).await.unwrap());
        assert!(engine.confirmed(&pending).await.unwrap());
        assert_eq!(
            engine.status(&pending).await.unwrap(),
            OperationStatus::Confirmed(77)
        );
    }
}
