//! Ledger Client Capability
//!
//! The engine only talks to the ledger through [`LedgerClient`]:
//!
//! - `suggested_params` - fee and validity window for a new transfer
//! - `account_info` - native balance and asset holdings of an address
//! - `submit` - broadcast a signed transfer
//! - `transaction_status` - confirmation round or pool error of a transfer
//! - `current_round` - last committed round, used to tell when a transfer can no longer commit
//!
//! Implementations:
//! - [`AlgodClient`] - algod v2 REST API
//! - [`InMemoryLedger`] - in-process ledger for dry runs and tests

pub mod algod;
pub mod keys;
pub mod memory;
pub mod transaction;

use async_trait::async_trait;
use thiserror::Error;

pub use algod::AlgodClient;
pub use keys::{decode_address, encode_address, is_valid_address, KeyError, KeyPair};
pub use memory::InMemoryLedger;
pub use transaction::{LedgerTransfer, SignedTransfer, TransferKind};

/// Rounds a transfer stays valid after the round it was built in
pub const VALIDITY_WINDOW_ROUNDS: u64 = 1000;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ledger API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Fee and validity parameters suggested by the node for a new transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedParams {
    /// Fee per byte suggested by the node (micro-units)
    pub fee: u64,
    /// Minimum flat fee (micro-units)
    pub min_fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    /// Base64 encoded genesis hash
    pub genesis_hash: String,
}

/// Holding of one asset by an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetHolding {
    pub asset_id: u64,
    /// Micro-units
    pub amount: u64,
}

/// Balances of one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub address: String,
    /// Native balance in micro-units
    pub amount: u64,
    pub assets: Vec<AssetHolding>,
}

impl AccountInfo {
    /// Holding of `asset_id`, `None` when the account has not opted in
    pub fn holding(&self, asset_id: u64) -> Option<&AssetHolding> {
        self.assets.iter().find(|h| h.asset_id == asset_id)
    }
}

/// Status of a submitted transfer as seen by the node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionStatus {
    /// Round the transfer was committed in
    pub confirmed_round: Option<u64>,
    /// Reason the node dropped the transfer from its pool
    pub pool_error: Option<String>,
}

impl TransactionStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.confirmed_round, Some(round) if round >= 1)
    }
}

/// Remote ledger node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Suggested fee and validity window for a transfer built now
    async fn suggested_params(&self) -> Result<SuggestedParams, LedgerError>;

    /// Balances of an address; unknown addresses report zero balances
    async fn account_info(&self, address: &str) -> Result<AccountInfo, LedgerError>;

    /// Broadcast a signed transfer, returning the ledger transaction id
    async fn submit(&self, signed: &SignedTransfer) -> Result<String, LedgerError>;

    /// Confirmation status of a transaction id
    async fn transaction_status(&self, tx_id: &str) -> Result<TransactionStatus, LedgerError>;

    /// Last committed round
    async fn current_round(&self) -> Result<u64, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_confirmation() {
        assert!(!TransactionStatus::default().is_confirmed());
        assert!(!TransactionStatus {
            confirmed_round: Some(0),
            pool_error: None
        }
        .is_confirmed());
        assert!(TransactionStatus {
            confirmed_round: Some(42),
            pool_error: None
        }
        .is_confirmed());
    }

    #[test]
    fn test_holding_lookup() {
        let info = AccountInfo {
            address: "ADDR".to_string(),
            amount: 0,
            assets: vec![AssetHolding {
                asset_id: 7,
                amount: 0,
            }],
        };
        assert!(info.holding(7).is_some());
        assert!(info.holding(8).is_none());
    }
}
