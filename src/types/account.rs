//! Account types
//!
//! An account ties a platform identity to a stable internal id and exactly
//! one custodial wallet.

use crate::wallet::Wallet;

/// Internal account identifier, assigned sequentially from 1
pub type AccountId = u64;

/// A platform user known to the bot
#[derive(Debug, Clone)]
pub struct Account {
    /// Stable internal id
    pub id: AccountId,
    /// Case-normalized platform username
    pub identity: String,
    /// Custodial wallet
    pub wallet: Wallet,
}

impl Account {
    /// Public ledger address of this account's wallet
    pub fn address(&self) -> &str {
        self.wallet.address()
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.address() == other.address()
    }
}

impl Eq for Account {}

/// Normalize a platform username: surrounding whitespace, a `u/` prefix and case are ignored
pub fn normalize_identity(name: &str) -> String {
    let name = name.trim();
    let name = name
        .strip_prefix("/u/")
        .or_else(|| name.strip_prefix("u/"))
        .unwrap_or(name);
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identity() {
        assert_eq!(normalize_identity("Alice"), "alice");
        assert_eq!(normalize_identity(" u/Bob "), "bob");
        assert_eq!(normalize_identity("/u/CAROL"), "carol");
    }
}
