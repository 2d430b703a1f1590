//! Shared Types
//!
//! - `account`: accounts and identities
//! - `units`: asset amounts and ledger unit conversion

pub mod account;
pub mod units;

pub use account::{normalize_identity, Account, AccountId};
pub use units::{format_amount, micro_to_units, parse_amount, units_to_micro, AmountRequest};
