//! Validation outcomes
//!
//! A [`Rejection`] is a recoverable, user-facing refusal answered with a
//! templated reply. [`EngineError`] adds ledger unavailability on top.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::ledger::LedgerError;

/// Why a request was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Malformed command: argument count, amount or address
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown user: {0}")]
    UnknownIdentity(String),

    #[error("sender is not opted in to the asset")]
    SenderNotParticipating,

    #[error("receiver is not opted in to the asset")]
    ReceiverNotParticipating,

    #[error("already opted in to the asset")]
    AlreadyParticipating,

    #[error("amount is below the smallest transferable unit")]
    ZeroAmount,

    /// `amount` is what the check needed or what was requested; `balance` is what the account holds
    #[error("insufficient funds: needed {amount}, balance {balance}")]
    InsufficientFunds { amount: Decimal, balance: Decimal },

    #[error("first transfer of {amount} would not activate the recipient")]
    FirstTransferBelowActivation { amount: Decimal },
}

impl Rejection {
    /// Short code for structured logs
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InvalidRequest(_) => "INVALID_REQUEST",
            Rejection::UnknownIdentity(_) => "UNKNOWN_IDENTITY",
            Rejection::SenderNotParticipating => "SENDER_NOT_PARTICIPATING",
            Rejection::ReceiverNotParticipating => "RECEIVER_NOT_PARTICIPATING",
            Rejection::AlreadyParticipating => "ALREADY_PARTICIPATING",
            Rejection::ZeroAmount => "ZERO_AMOUNT",
            Rejection::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Rejection::FirstTransferBelowActivation { .. } => "BELOW_ACTIVATION",
        }
    }
}

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl EngineError {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            EngineError::Rejected(rejection) => Some(rejection),
            EngineError::Ledger(_) => None,
        }
    }
}
