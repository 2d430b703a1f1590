//! Outward-facing reply texts
//!
//! Replies are markdown. Links point at the block explorer of the
//! configured network.

use rust_decimal::Decimal;

use crate::engine::Rejection;
use crate::types::format_amount;
use crate::wallet::{Balances, Wallet};

/// Name the native asset is shown under
pub const NATIVE_ASSET_NAME: &str = "Algos";

/// Renders every reply the bot sends
#[derive(Debug, Clone)]
pub struct Templates {
    explorer_url: String,
    asset_name: String,
    bot_username: String,
}

impl Templates {
    pub fn new(explorer_url: &str, asset_name: &str, bot_username: &str) -> Self {
        Self {
            explorer_url: explorer_url.trim_end_matches('/').to_string(),
            asset_name: asset_name.to_string(),
            bot_username: bot_username.to_string(),
        }
    }

    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    fn tx_link(&self, tx_id: &str) -> String {
        format!("[here]({}/tx/{})", self.explorer_url, tx_id)
    }

    fn address_link(&self, address: &str) -> String {
        format!("[{}]({}/address/{})", address, self.explorer_url, address)
    }

    pub fn tip_confirmation(&self, receiver: &str, amount: Decimal, tx_id: &str) -> String {
        format!(
            "Your tip to {} for {} {} was successfully sent\n\nYou can check the transaction {}",
            receiver,
            format_amount(amount),
            self.asset_name,
            self.tx_link(tx_id)
        )
    }

    /// Withdrawal confirmation; `native` selects the native asset wording
    pub fn withdrawal_confirmation(
        &self,
        amount: Decimal,
        address: &str,
        tx_id: &str,
        native: bool,
    ) -> String {
        let asset = if native {
            NATIVE_ASSET_NAME
        } else {
            self.asset_name.as_str()
        };
        format!(
            "Withdrawal of {} {} to address {} successful\n\nYou can check the transaction {}",
            format_amount(amount),
            asset,
            self.address_link(address),
            self.tx_link(tx_id)
        )
    }

    pub fn opt_in_confirmation(&self) -> String {
        format!(
            "Successfully opted in {}, from now on you can receive tips.",
            self.asset_name
        )
    }

    /// Notice for an operation the ledger never confirmed
    pub fn operation_failed(&self, summary: &str, tx_id: &str, reason: &str) -> String {
        format!(
            "Your {} did not go through: {}.\n\nNothing was taken from your wallet. \
             Transaction id: `{}`",
            summary, reason, tx_id
        )
    }

    /// Public address, QR code, private key and balances
    pub fn wallet_description(&self, wallet: &Wallet, balances: &Balances) -> String {
        format!(
            "Public key : {} [(QR Code)]({})\n\nPrivate key : {}\n\nBalance : {} {}, {} {}",
            self.address_link(wallet.address()),
            wallet.qr_code_link(),
            wallet.private_key(),
            balances.asset,
            self.asset_name,
            format_amount(balances.native),
            NATIVE_ASSET_NAME
        )
    }

    pub fn welcome(&self, wallet_description: &str) -> String {
        format!(
            "Welcome! A wallet was just created for you.\n\n{}\n\n\
             Fund it with at least 0.2 {} and send `optin` to start receiving {}.",
            wallet_description, NATIVE_ASSET_NAME, self.asset_name
        )
    }

    pub fn no_wallet(&self) -> String {
        format!(
            "You do not have an account yet. To open one, click on this \
             [link](https://www.reddit.com/message/compose/?to={}&subject=NewAccount&message=wallet) \
             and send the message",
            self.bot_username
        )
    }

    pub fn invalid_command(&self) -> String {
        format!(
            "Sorry, I didn't understand what you were trying to do.\n\n\
             List of available commands:\n\n\
             **Comment:** - Comment to a post/comment\n\n\
             !asatip *amount* - Give a tip to the author of the post/comment\n\n\
             **Message:** - Send a direct message to the bot\n\n\
             wallet - Get the keys of your wallet and your current balance\n\n\
             optin - Opt in to {asset}, make sure you have at least 0.11 {native} first\n\n\
             withdraw *amount* *address* - Send {asset} to any wallet\n\n\
             algowithdraw *amount* *address* - Send {native} to any wallet\n\n\
             tip *amount* *username* - Send a tip to a user",
            asset = self.asset_name,
            native = NATIVE_ASSET_NAME
        )
    }

    pub fn unknown_error(&self, body: &str) -> String {
        format!(
            "Hello, I'm sorry but an unknown issue occurred when handling\n\n***{}***\n\n\
             Please try again later.",
            body
        )
    }

    /// Reply for a refused request
    pub fn rejection(&self, rejection: &Rejection) -> String {
        match rejection {
            Rejection::InvalidRequest(_) => self.invalid_command(),
            Rejection::UnknownIdentity(username) => format!(
                "Hey, I see that you tried to tip `{}`, but I can't find a user with that name.",
                username
            ),
            Rejection::SenderNotParticipating => format!(
                "You are not opted in to {}. Transfer 0.2+ {} to your wallet and send `optin` to the bot.",
                self.asset_name, NATIVE_ASSET_NAME
            ),
            Rejection::ReceiverNotParticipating => format!(
                "The target is not opted in to {}. Transfer cancelled.",
                self.asset_name
            ),
            Rejection::AlreadyParticipating => {
                "You are already opted in, no need to repeat it.".to_string()
            }
            Rejection::ZeroAmount => format!(
                "I cancelled your transaction because it would move less than 1e-6, the \
                 smallest fraction of an asset. It would send nothing and still cost the fee \
                 in {}.",
                NATIVE_ASSET_NAME
            ),
            Rejection::InsufficientFunds { amount, balance } => format!(
                "You tried to take {} {}/{} out of your wallet but you only have {}, which is \
                 not enough for this transaction.\n\n\
                 You can use `wallet` to get your address and fund your account\n\n\
                 **Note :** the wallet needs to keep 0.1 {} to stay active. \
                 You can still empty it by using `algowithdraw all <address>`",
                format_amount(*amount),
                self.asset_name,
                NATIVE_ASSET_NAME,
                format_amount(*balance),
                NATIVE_ASSET_NAME
            ),
            Rejection::FirstTransferBelowActivation { amount } => format!(
                "The destination wallet is empty and needs at least 0.1 {} to become active. \
                 Your transfer of {} is too small to activate it.",
                NATIVE_ASSET_NAME,
                format_amount(*amount)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::AssetBalance;

    fn templates() -> Templates {
        Templates::new("https://testnet.algoexplorer.io/", "AKTA", "tip_bot")
    }

    #[test]
    fn test_confirmation_links() {
        let text = templates().tip_confirmation("bob", Decimal::new(15, 1), "TXID");
        assert!(text.contains("bob"));
        assert!(text.contains("1.5 AKTA"));
        assert!(text.contains("https://testnet.algoexplorer.io/tx/TXID"));

        let native = templates().withdrawal_confirmation(Decimal::from(2), "ADDR", "TXID", true);
        assert!(native.contains("2 Algos"));
        assert!(native.contains("/address/ADDR"));

        let asset = templates().withdrawal_confirmation(Decimal::from(2), "ADDR", "TXID", false);
        assert!(asset.contains("2 AKTA"));
    }

    #[test]
    fn test_insufficient_funds_reports_amounts() {
        let text = templates().rejection(&Rejection::InsufficientFunds {
            amount: Decimal::new(5, 0),
            balance: Decimal::new(5, 2),
        });
        assert!(text.contains("5 AKTA/Algos"));
        assert!(text.contains("0.05"));
    }

    #[test]
    fn test_wallet_description() {
        let wallet = Wallet::generate();
        let balances = Balances {
            native: Decimal::new(25, 2),
            asset: AssetBalance::NotParticipating,
        };
        let text = templates().wallet_description(&wallet, &balances);
        assert!(text.contains(wallet.address()));
        assert!(text.contains(&wallet.private_key()));
        assert!(text.contains("not opted in AKTA"));
        assert!(text.contains("0.25 Algos"));
    }

    #[test]
    fn test_no_wallet_names_bot() {
        assert!(templates().no_wallet().contains("to=tip_bot"));
    }
}
