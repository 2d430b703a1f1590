//! Operation lifecycle types
//!
//! `OperationRequest` (unvalidated) -> `ValidatedOperation` -> `PendingOperation`.
//! Each step is a distinct type, so an operation cannot be sent without being
//! validated, nor sent twice.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ledger::SuggestedParams;
use crate::platform::ReplyTarget;
use crate::types::{Account, AmountRequest};

/// Asset moved by a withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Asset {
    Native,
    Secondary,
}

/// What the requester asked for
#[derive(Debug, Clone)]
pub enum RequestKind {
    Tip {
        receiver: Account,
        amount: Decimal,
    },
    Withdraw {
        destination: String,
        amount: AmountRequest,
        asset: Asset,
    },
    OptIn,
}

/// Unvalidated operation
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub sender: Account,
    pub kind: RequestKind,
    pub note: Option<String>,
    /// Where the outcome is reported
    pub reply_to: ReplyTarget,
}

impl OperationRequest {
    pub fn tip(sender: Account, receiver: Account, amount: Decimal, reply_to: ReplyTarget) -> Self {
        Self {
            sender,
            kind: RequestKind::Tip { receiver, amount },
            note: None,
            reply_to,
        }
    }

    pub fn withdraw(
        sender: Account,
        destination: &str,
        amount: AmountRequest,
        asset: Asset,
        reply_to: ReplyTarget,
    ) -> Self {
        Self {
            sender,
            kind: RequestKind::Withdraw {
                destination: destination.to_string(),
                amount,
                asset,
            },
            note: None,
            reply_to,
        }
    }

    pub fn opt_in(sender: Account, reply_to: ReplyTarget) -> Self {
        Self {
            sender,
            kind: RequestKind::OptIn,
            note: None,
            reply_to,
        }
    }

    /// Attach a note; blank notes are dropped
    pub fn with_note(mut self, note: &str) -> Self {
        let note = note.trim();
        self.note = (!note.is_empty()).then(|| note.to_string());
        self
    }
}

/// Transfer that passed validation, with its final amount
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedTransfer {
    Tip {
        receiver: Account,
        amount: Decimal,
    },
    Withdraw {
        destination: String,
        amount: Decimal,
        asset: Asset,
        /// Remainder of the sender's native balance goes to `destination`
        closing: bool,
    },
    OptIn,
}

/// Operation ready to be sent, carrying the fee and validity snapshot taken during validation
#[derive(Debug, Clone)]
pub struct ValidatedOperation {
    pub sender: Account,
    pub transfer: ValidatedTransfer,
    pub note: Option<String>,
    pub reply_to: ReplyTarget,
    pub params: SuggestedParams,
    /// Flat fee in asset units
    pub fee: Decimal,
}

impl ValidatedOperation {
    pub fn kind(&self) -> OperationKind {
        match &self.transfer {
            ValidatedTransfer::Tip { .. } => OperationKind::Tip,
            ValidatedTransfer::Withdraw {
                asset: Asset::Secondary,
                ..
            } => OperationKind::Withdraw,
            ValidatedTransfer::Withdraw {
                asset: Asset::Native,
                ..
            } => OperationKind::NativeWithdraw,
            ValidatedTransfer::OptIn => OperationKind::OptIn,
        }
    }

    /// Amount that will be moved, zero for an opt-in
    pub fn amount(&self) -> Decimal {
        match &self.transfer {
            ValidatedTransfer::Tip { amount, .. } => *amount,
            ValidatedTransfer::Withdraw { amount, .. } => *amount,
            ValidatedTransfer::OptIn => Decimal::ZERO,
        }
    }
}

/// Operation label used in logs and storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Tip,
    Withdraw,
    NativeWithdraw,
    OptIn,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Tip => write!(f, "tip"),
            OperationKind::Withdraw => write!(f, "withdraw"),
            OperationKind::NativeWithdraw => write!(f, "native_withdraw"),
            OperationKind::OptIn => write!(f, "opt_in"),
        }
    }
}

/// Submitted operation awaiting confirmation
///
/// Self-contained so it can be persisted and restored: the confirmation
/// reply is rendered at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub tx_id: String,
    pub kind: OperationKind,
    /// Identity of the requester
    pub sender: String,
    /// One-line description, e.g. "tip of 1.5 AKTA to u/bob"
    pub summary: String,
    /// Reply sent once the ledger confirms
    pub confirmation: String,
    pub reply_to: ReplyTarget,
    pub submitted_at: DateTime<Utc>,
    /// Last round the transfer can be included in
    pub last_valid: u64,
}

impl PendingOperation {
    /// Time since submission
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.submitted_at)
    }

    /// The ledger can no longer commit the transfer once `round` reached its last valid round
    pub fn outlived(&self, round: u64) -> bool {
        round >= self.last_valid
    }
}

/// Ledger view of a pending operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Confirmed(u64),
    Pending,
    /// Dropped by the node with this pool error
    Rejected(String),
}
