//! Command Dispatcher
//!
//! Turns inbound platform items into operation requests and answers them.
//!
//! Messages:
//! - `tip <amount> <username> [note]`
//! - `withdraw <amount|all> <address> [note]` (secondary asset)
//! - `algowithdraw <amount|all> <address> [note]` (native asset)
//! - `optin`
//! - `wallet`
//!
//! Comments: `<trigger> <amount> [note]` tips the author of the parent item.

use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::accounts::AccountDirectory;
use crate::common::log_inbound_event;
use crate::engine::{Asset, EngineError, OperationRequest, PendingOperation, Rejection, TransactionEngine};
use crate::ledger::{is_valid_address, LedgerError};
use crate::platform::{InboundItem, ItemKind, Platform, PlatformError, ReplyTarget};
use crate::storage::StorageError;
use crate::types::{normalize_identity, parse_amount, Account, AmountRequest};

/// Unexpected failures while handling one item
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Parsed message command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tip {
        amount: Decimal,
        username: String,
        note: String,
    },
    Withdraw {
        amount: AmountRequest,
        address: String,
        asset: Asset,
        note: String,
    },
    OptIn,
    Wallet,
}

impl Command {
    /// Parse a message body; the first word selects the command, case-insensitively
    pub fn parse(body: &str) -> Result<Self, Rejection> {
        let invalid = || Rejection::InvalidRequest(body.trim().to_string());
        let mut words = body.split_whitespace();
        let name = words.next().ok_or_else(invalid)?.to_lowercase();
        let args: Vec<&str> = words.collect();

        match name.as_str() {
            "tip" => {
                if args.len() < 2 {
                    return Err(invalid());
                }
                let amount = parse_amount(args[0]).ok_or_else(invalid)?;
                let username = normalize_identity(args[1]);
                if username.is_empty() {
                    return Err(invalid());
                }
                Ok(Command::Tip {
                    amount,
                    username,
                    note: args[2..].join(" "),
                })
            }
            "withdraw" | "algowithdraw" => {
                if args.len() < 2 {
                    return Err(invalid());
                }
                let amount = AmountRequest::parse(args[0]).ok_or_else(invalid)?;
                if !is_valid_address(args[1]) {
                    return Err(invalid());
                }
                let asset = if name == "algowithdraw" {
                    Asset::Native
                } else {
                    Asset::Secondary
                };
                Ok(Command::Withdraw {
                    amount,
                    address: args[1].to_string(),
                    asset,
                    note: args[2..].join(" "),
                })
            }
            "optin" if args.is_empty() => Ok(Command::OptIn),
            "wallet" if args.is_empty() => Ok(Command::Wallet),
            _ => Err(invalid()),
        }
    }
}

/// Parsed comment command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentTip {
    pub amount: Decimal,
    pub note: String,
}

impl CommentTip {
    /// `None` when the comment does not start with a trigger token
    pub fn parse(body: &str, triggers: &[String]) -> Option<Result<Self, Rejection>> {
        let mut words = body.split_whitespace();
        let first = words.next()?.to_lowercase();
        if !triggers.iter().any(|t| t.to_lowercase() == first) {
            return None;
        }

        let invalid = || Rejection::InvalidRequest(body.trim().to_string());
        let args: Vec<&str> = words.collect();
        let parsed = args
            .first()
            .and_then(|raw| parse_amount(raw))
            .map(|amount| CommentTip {
                amount,
                note: args[1..].join(" "),
            })
            .ok_or_else(invalid);
        Some(parsed)
    }
}

/// Handles inbound items one at a time
pub struct Dispatcher {
    directory: Arc<AccountDirectory>,
    engine: Arc<TransactionEngine>,
    platform: Arc<dyn Platform>,
    triggers: Vec<String>,
}

impl Dispatcher {
    pub fn new(
        directory: Arc<AccountDirectory>,
        engine: Arc<TransactionEngine>,
        platform: Arc<dyn Platform>,
        triggers: Vec<String>,
    ) -> Self {
        Self {
            directory,
            engine,
            platform,
            triggers,
        }
    }

    /// Handle one item, returning the operation it submitted, if any
    ///
    /// Never fails: unexpected errors are logged and answered with an apology.
    pub async fn handle(&self, item: &InboundItem) -> Option<PendingOperation> {
        log_inbound_event(&item.kind.to_string(), &item.author, &item.body);

        let result = match item.kind {
            ItemKind::Message => self.handle_message(item).await,
            ItemKind::Comment => self.handle_comment(item).await,
        };

        match result {
            Ok(submitted) => submitted,
            Err(e) => {
                error!(
                    target: "tipbot::dispatcher",
                    item = %item.id,
                    author = %item.author,
                    body = %item.body,
                    error = %e,
                    "failed to handle item"
                );
                let apology = self.engine.templates().unknown_error(&item.body);
                if let Err(e) = self.platform.reply(&item.reply_target(), &apology).await {
                    warn!(target: "tipbot::dispatcher", item = %item.id, error = %e, "apology not delivered");
                }
                None
            }
        }
    }

    async fn handle_message(
        &self,
        item: &InboundItem,
    ) -> Result<Option<PendingOperation>, DispatchError> {
        let target = item.reply_target();
        let author = self.directory.resolve(&item.author).await?;

        if author.is_new {
            let description = self.describe_wallet(&author.account).await?;
            let welcome = self.engine.templates().welcome(&description);
            self.platform.reply(&target, &welcome).await?;
            return Ok(None);
        }
        let sender = author.account;

        let command = match Command::parse(&item.body) {
            Ok(command) => command,
            Err(rejection) => {
                self.reject(&target, &sender, &rejection).await?;
                return Ok(None);
            }
        };

        match command {
            Command::Tip {
                amount,
                username,
                note,
            } => {
                if !self.platform.user_exists(&username).await? {
                    self.reject(&target, &sender, &Rejection::UnknownIdentity(username))
                        .await?;
                    return Ok(None);
                }
                let receiver = self.directory.resolve(&username).await?.account;
                let request =
                    OperationRequest::tip(sender, receiver, amount, target).with_note(&note);
                self.submit(request).await
            }
            Command::Withdraw {
                amount,
                address,
                asset,
                note,
            } => {
                let request = OperationRequest::withdraw(sender, &address, amount, asset, target)
                    .with_note(&note);
                self.submit(request).await
            }
            Command::OptIn => self.submit(OperationRequest::opt_in(sender, target)).await,
            Command::Wallet => {
                let description = self.describe_wallet(&sender).await?;
                self.platform.reply(&target, &description).await?;
                info!(
                    target: "tipbot::dispatcher",
                    user = %sender.identity,
                    id = sender.id,
                    "wallet information sent"
                );
                Ok(None)
            }
        }
    }

    async fn handle_comment(
        &self,
        item: &InboundItem,
    ) -> Result<Option<PendingOperation>, DispatchError> {
        let parsed = match CommentTip::parse(&item.body, &self.triggers) {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        let target = item.reply_target();
        let author = self.directory.resolve(&item.author).await?;
        if author.is_new {
            self.platform
                .reply(&target, &self.engine.templates().no_wallet())
                .await?;
            return Ok(None);
        }
        let sender = author.account;

        let tip = match parsed {
            Ok(tip) => tip,
            Err(rejection) => {
                self.reject(&target, &sender, &rejection).await?;
                return Ok(None);
            }
        };

        let receiver_name = match self.platform.parent_author(item).await? {
            Some(name) => name,
            None => {
                let rejection = Rejection::UnknownIdentity("[deleted]".to_string());
                self.reject(&target, &sender, &rejection).await?;
                return Ok(None);
            }
        };

        let receiver = self.directory.resolve(&receiver_name).await?.account;
        let request =
            OperationRequest::tip(sender, receiver, tip.amount, target).with_note(&tip.note);
        self.submit(request).await
    }

    async fn submit(
        &self,
        request: OperationRequest,
    ) -> Result<Option<PendingOperation>, DispatchError> {
        let target = request.reply_to.clone();
        let sender = request.sender.clone();

        match self.engine.validate(request).await {
            Ok(validated) => Ok(Some(self.engine.send(validated).await?)),
            Err(EngineError::Rejected(rejection)) => {
                self.reject(&target, &sender, &rejection).await?;
                Ok(None)
            }
            Err(EngineError::Ledger(e)) => Err(e.into()),
        }
    }

    async fn reject(
        &self,
        target: &ReplyTarget,
        sender: &Account,
        rejection: &Rejection,
    ) -> Result<(), DispatchError> {
        info!(
            target: "tipbot::dispatcher",
            user = %sender.identity,
            code = rejection.code(),
            reason = %rejection,
            "request rejected"
        );
        let text = self.engine.templates().rejection(rejection);
        self.platform.reply(target, &text).await?;
        Ok(())
    }

    async fn describe_wallet(&self, account: &Account) -> Result<String, DispatchError> {
        let balances = self.engine.wallet_balances(&account.wallet).await?;
        Ok(self
            .engine
            .templates()
            .wallet_description(&account.wallet, &balances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::KeyPair;
    use crate::platform::MockPlatform;
    use crate::storage::MemoryStore;
    use crate::templates::Templates;
    use crate::ledger::InMemoryLedger;

    fn triggers() -> Vec<String> {
        vec!["!asatip".to_string()]
    }

    #[test]
    fn test_parse_tip() {
        assert_eq!(
            Command::parse("TIP 1.5 u/Bob thanks for the help").unwrap(),
            Command::Tip {
                amount: Decimal::new(15, 1),
                username: "bob".to_string(),
                note: "thanks for the help".to_string(),
            }
        );
        assert!(Command::parse("tip 1.5").is_err());
        assert!(Command::parse("tip lots bob").is_err());
        assert!(Command::parse("tip -1 bob").is_err());
    }

    #[test]
    fn test_parse_withdraw() {
        let address = KeyPair::generate().address().to_string();

        assert_eq!(
            Command::parse(&format!("algowithdraw all {}", address)).unwrap(),
            Command::Withdraw {
                amount: AmountRequest::All,
                address: address.clone(),
                asset: Asset::Native,
                note: String::new(),
            }
        );
        assert!(matches!(
            Command::parse(&format!("withdraw 2 {} rent", address)).unwrap(),
            Command::Withdraw {
                asset: Asset::Secondary,
                ..
            }
        ));
        assert!(Command::parse("withdraw 2 not-an-address").is_err());
        assert!(Command::parse(&format!("withdraw half {}", address)).is_err());
    }

    #[test]
    fn test_parse_bare_commands() {
        assert_eq!(Command::parse("Wallet").unwrap(), Command::Wallet);
        assert_eq!(Command::parse("optin").unwrap(), Command::OptIn);
        assert!(Command::parse("optin now").is_err());
        assert!(Command::parse("").is_err());
        assert!(matches!(
            Command::parse("hello there"),
            Err(Rejection::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_parse_comment() {
        assert_eq!(
            CommentTip::parse("!ASATIP 0.5 nice post", &triggers()),
            Some(Ok(CommentTip {
                amount: Decimal::new(5, 1),
                note: "nice post".to_string(),
            }))
        );
        assert_eq!(CommentTip::parse("great, !asatip 1", &triggers()), None);
        assert!(matches!(
            CommentTip::parse("!asatip", &triggers()),
            Some(Err(Rejection::InvalidRequest(_)))
        ));
    }

    #[tokio::test]
    async fn test_platform_failure_gets_apology() {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(AccountDirectory::new(store));
        // Existing user so the welcome path is skipped
        directory.resolve("alice").await.unwrap();

        let engine = Arc::new(TransactionEngine::new(
            Arc::new(InMemoryLedger::new()),
            7,
            Templates::new("https://testnet.algoexplorer.io", "AKTA", "tip_bot"),
        ));

        let mut platform = MockPlatform::new();
        platform
            .expect_user_exists()
            .returning(|_| Err(PlatformError::Unavailable("down".to_string())));
        platform
            .expect_reply()
            .times(1)
            .withf(|target, text| target.item_id == "t4_1" && text.contains("unknown issue"))
            .returning(|_, _| Ok(()));

        let dispatcher = Dispatcher::new(directory, engine, Arc::new(platform), triggers());
        let item = InboundItem::message("t4_1", "alice", "tip 1 bob");

        assert!(dispatcher.handle(&item).await.is_none());
    }
}
