//! Account Directory
//!
//! Maps a platform identity to a stable internal id and a custodial wallet,
//! provisioning both on first sighting.

use std::sync::Arc;
use tracing::info;

use crate::common::{log_operation_event, EventCategory};
use crate::storage::{AccountStore, KeyRecord, StorageError, StorageResult};
use crate::types::{normalize_identity, Account};
use crate::wallet::Wallet;

/// Result of resolving an identity
#[derive(Debug, Clone)]
pub struct Resolved {
    pub account: Account,
    /// The wallet was provisioned by this call
    pub is_new: bool,
}

/// Account directory backed by an [`AccountStore`]
pub struct AccountDirectory {
    store: Arc<dyn AccountStore>,
}

impl AccountDirectory {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Look up or create the account of `identity`
    ///
    /// The same identity always yields the same id and wallet address.
    pub async fn resolve(&self, identity: &str) -> StorageResult<Resolved> {
        let identity = normalize_identity(identity);

        let id = match self.store.find_account_id(&identity).await? {
            Some(id) => id,
            None => {
                let id = self.store.insert_account(&identity).await?;
                info!(target: "tipbot::accounts", identity = %identity, id, "new user");
                id
            }
        };

        if let Some(keys) = self.store.find_keys(id).await? {
            let wallet = Wallet::from_private_key(&keys.private_key)
                .map_err(|e| StorageError::InvalidData(format!("wallet of account {}: {}", id, e)))?;

            if wallet.address() != keys.address {
                return Err(StorageError::InvalidData(format!(
                    "wallet of account {} does not match its stored address",
                    id
                )));
            }

            return Ok(Resolved {
                account: Account {
                    id,
                    identity,
                    wallet,
                },
                is_new: false,
            });
        }

        let wallet = Wallet::generate();
        self.store
            .insert_keys(
                id,
                &KeyRecord {
                    private_key: wallet.private_key(),
                    address: wallet.address().to_string(),
                },
            )
            .await?;

        info!(
            target: "tipbot::accounts",
            identity = %identity,
            id,
            address = %wallet.address(),
            "wallet created"
        );
        log_operation_event(
            EventCategory::Account,
            "wallet_created",
            "",
            &identity,
            serde_json::json!({ "account_id": id, "address": wallet.address() }),
            None,
        );

        Ok(Resolved {
            account: Account {
                id,
                identity,
                wallet,
            },
            is_new: true,
        })
    }

    /// Account of `identity` if it was seen before; never provisions
    pub async fn find(&self, identity: &str) -> StorageResult<Option<Account>> {
        let identity = normalize_identity(identity);

        let id = match self.store.find_account_id(&identity).await? {
            Some(id) => id,
            None => return Ok(None),
        };
        let keys = match self.store.find_keys(id).await? {
            Some(keys) => keys,
            None => return Ok(None),
        };

        let wallet = Wallet::from_private_key(&keys.private_key)
            .map_err(|e| StorageError::InvalidData(format!("wallet of account {}: {}", id, e)))?;

        Ok(Some(Account {
            id,
            identity,
            wallet,
        }))
    }
}
