//! Custodial Wallet
//!
//! A wallet is a capability handle around a key pair. Balances are never
//! cached here: every read goes to the ledger client.

use rust_decimal::Decimal;
use std::fmt;

use crate::ledger::{AccountInfo, KeyError, KeyPair, LedgerClient, LedgerError};
use crate::types::micro_to_units;

const QR_CODE_BASE_URL: &str = "https://api.qrserver.com/v1/create-qr-code/";

/// Secondary asset balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetBalance {
    /// Opted in and holding this amount (possibly zero)
    Participating(Decimal),
    /// Not able to hold the secondary asset yet
    NotParticipating,
}

impl AssetBalance {
    pub fn is_participating(&self) -> bool {
        matches!(self, AssetBalance::Participating(_))
    }

    /// Held amount, zero when not participating
    pub fn amount(&self) -> Decimal {
        match self {
            AssetBalance::Participating(amount) => *amount,
            AssetBalance::NotParticipating => Decimal::ZERO,
        }
    }
}

impl fmt::Display for AssetBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetBalance::Participating(amount) => write!(f, "{}", amount.normalize()),
            AssetBalance::NotParticipating => write!(f, "not opted in"),
        }
    }
}

/// Live balances of one wallet, read in a single ledger query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balances {
    pub native: Decimal,
    pub asset: AssetBalance,
}

impl Balances {
    pub fn from_account_info(info: &AccountInfo, asset_id: u64) -> Self {
        Self {
            native: micro_to_units(info.amount),
            asset: info
                .holding(asset_id)
                .map(|h| AssetBalance::Participating(micro_to_units(h.amount)))
                .unwrap_or(AssetBalance::NotParticipating),
        }
    }

    /// Query the ledger for the balances of `address`
    pub async fn fetch(
        ledger: &dyn LedgerClient,
        address: &str,
        asset_id: u64,
    ) -> Result<Self, LedgerError> {
        let info = ledger.account_info(address).await?;
        Ok(Self::from_account_info(&info, asset_id))
    }
}

/// Custodial wallet
#[derive(Debug, Clone)]
pub struct Wallet {
    keys: KeyPair,
}

impl Wallet {
    /// Provision a wallet with a fresh key pair
    pub fn generate() -> Self {
        Self {
            keys: KeyPair::generate(),
        }
    }

    /// Restore from a persisted private key
    pub fn from_private_key(private_key: &str) -> Result<Self, KeyError> {
        Ok(Self {
            keys: KeyPair::from_private_key(private_key)?,
        })
    }

    pub fn address(&self) -> &str {
        self.keys.address()
    }

    pub fn private_key(&self) -> String {
        self.keys.private_key()
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    /// Both balances from one ledger query
    pub async fn balances(
        &self,
        ledger: &dyn LedgerClient,
        asset_id: u64,
    ) -> Result<Balances, LedgerError> {
        Balances::fetch(ledger, self.address(), asset_id).await
    }

    /// Link to a QR code of the public address
    pub fn qr_code_link(&self) -> String {
        format!(
            "{}?data={}&size=220x220&margin=4",
            QR_CODE_BASE_URL,
            self.address()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    #[tokio::test]
    async fn test_fresh_wallet_balances() {
        let ledger = InMemoryLedger::new();
        let wallet = Wallet::generate();

        let balances = wallet.balances(&ledger, 7).await.unwrap();
        assert_eq!(balances.native, Decimal::ZERO);
        assert_eq!(balances.asset, AssetBalance::NotParticipating);
        assert_eq!(balances.asset.to_string(), "not opted in");
    }

    #[tokio::test]
    async fn test_participating_balance() {
        let ledger = InMemoryLedger::new();
        let wallet = Wallet::generate();
        ledger.fund(wallet.address(), 2_500_000).await;
        ledger.set_asset(wallet.address(), 7, 1_000).await;

        let balances = wallet.balances(&ledger, 7).await.unwrap();
        assert_eq!(balances.native, Decimal::new(25, 1));
        assert_eq!(
            balances.asset,
            AssetBalance::Participating(Decimal::new(1, 3))
        );
    }

    #[test]
    fn test_restore_keeps_address() {
        let wallet = Wallet::generate();
        let restored = Wallet::from_private_key(&wallet.private_key()).unwrap();
        assert_eq!(restored.address(), wallet.address());
        assert!(restored.qr_code_link().contains(wallet.address()));
    }
}
