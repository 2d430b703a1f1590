//! Environment-based Configuration for the Tip Bot
//!
//! Values are read from the process environment after loading an optional
//! `.env` file. Credentials (platform password, ledger token) MUST come from
//! the environment, never from source.
//!
//! # Ledger
//! - `TIPBOT_NETWORK` - "mainnet" or "testnet" (default: "testnet")
//! - `TIPBOT_ALGOD_URL` - algod REST endpoint (default per network)
//! - `TIPBOT_ALGOD_TOKEN` - API token (default: empty)
//! - `TIPBOT_ALGOD_TOKEN_HEADER` - header carrying the token (default: "X-Algo-API-Token")
//! - `TIPBOT_ASSET_ID` - secondary asset id (default: 10458941)
//! - `TIPBOT_ASSET_NAME` - secondary asset display name (default: "AKTA")
//!
//! # Platform
//! - `TIPBOT_REDDIT_CLIENT_ID`, `TIPBOT_REDDIT_CLIENT_SECRET`
//! - `TIPBOT_REDDIT_USERNAME`, `TIPBOT_REDDIT_PASSWORD`
//! - `TIPBOT_REDDIT_USER_AGENT` (default: "tipbot/0.1")
//! - `TIPBOT_SUBREDDITS` - comma separated channels to scan (default: "bottesting")
//! - `TIPBOT_TRIGGERS` - comma separated comment trigger tokens (default: "!asatip")
//!
//! # Loop
//! - `TIPBOT_CYCLE_MS` - sleep between cycles (default: 500)
//! - `TIPBOT_CONFIRM_EVERY` - poll pending operations every N cycles (default: 5)
//! - `TIPBOT_PENDING_TIMEOUT_SECS` - evict unconfirmed operations after (default: 1800)
//!
//! # Misc
//! - `TIPBOT_DB_PATH` - SQLite database file (default: "tips.db")
//! - `TIPBOT_LOG_LEVEL` - trace, debug, info, warn, error (default: "info")
//! - `TIPBOT_LOG_JSON` - "1" for JSON logs (default: on for mainnet)

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Ledger network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            _ => Err(ConfigError::InvalidValue(
                "TIPBOT_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Default algod endpoint for this network
    pub fn default_algod_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://mainnet-api.algonode.cloud",
            Network::Testnet => "https://testnet-api.algonode.cloud",
        }
    }

    /// Block explorer base URL used in reply links
    pub fn explorer_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://algoexplorer.io",
            Network::Testnet => "https://testnet.algoexplorer.io",
        }
    }
}

/// Ledger connection settings
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub algod_url: String,
    pub token: String,
    pub token_header: String,
    pub asset_id: u64,
    pub asset_name: String,
}

/// Reddit API credentials and scan targets
#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub subreddits: Vec<String>,
    pub triggers: Vec<String>,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct TipBotConfig {
    pub network: Network,
    pub ledger: LedgerConfig,
    pub reddit: RedditConfig,
    pub db_path: String,
    pub cycle_interval: Duration,
    pub confirm_every: u32,
    pub pending_timeout: Duration,
    pub log_level: String,
    pub log_json: bool,
}

impl TipBotConfig {
    /// Load configuration from `.env` and environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let network: Network = env::var("TIPBOT_NETWORK")
            .unwrap_or_else(|_| "testnet".to_string())
            .parse()?;

        let ledger = LedgerConfig {
            algod_url: env::var("TIPBOT_ALGOD_URL")
                .unwrap_or_else(|_| network.default_algod_url().to_string()),
            token: env::var("TIPBOT_ALGOD_TOKEN").unwrap_or_default(),
            token_header: env::var("TIPBOT_ALGOD_TOKEN_HEADER")
                .unwrap_or_else(|_| "X-Algo-API-Token".to_string()),
            asset_id: parse_or("TIPBOT_ASSET_ID", 10_458_941)?,
            asset_name: env::var("TIPBOT_ASSET_NAME").unwrap_or_else(|_| "AKTA".to_string()),
        };

        let reddit = RedditConfig {
            client_id: required("TIPBOT_REDDIT_CLIENT_ID")?,
            client_secret: required("TIPBOT_REDDIT_CLIENT_SECRET")?,
            username: required("TIPBOT_REDDIT_USERNAME")?,
            password: required("TIPBOT_REDDIT_PASSWORD")?,
            user_agent: env::var("TIPBOT_REDDIT_USER_AGENT")
                .unwrap_or_else(|_| "tipbot/0.1".to_string()),
            subreddits: list_or("TIPBOT_SUBREDDITS", "bottesting"),
            triggers: list_or("TIPBOT_TRIGGERS", "!asatip"),
        };

        let confirm_every: u32 = parse_or("TIPBOT_CONFIRM_EVERY", 5)?;
        if confirm_every == 0 {
            return Err(ConfigError::InvalidValue(
                "TIPBOT_CONFIRM_EVERY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let log_json = env::var("TIPBOT_LOG_JSON")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(network == Network::Mainnet);

        Ok(Self {
            network,
            ledger,
            reddit,
            db_path: env::var("TIPBOT_DB_PATH").unwrap_or_else(|_| "tips.db".to_string()),
            cycle_interval: Duration::from_millis(parse_or("TIPBOT_CYCLE_MS", 500)?),
            confirm_every,
            pending_timeout: Duration::from_secs(parse_or("TIPBOT_PENDING_TIMEOUT_SECS", 1800)?),
            log_level: env::var("TIPBOT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json,
        })
    }

    /// Log a configuration summary (credentials hidden)
    pub fn log_summary(&self) {
        tracing::info!(
            target: "tipbot::config",
            network = ?self.network,
            algod = %self.ledger.algod_url,
            asset_id = self.ledger.asset_id,
            asset = %self.ledger.asset_name,
            bot_account = %self.reddit.username,
            subreddits = %self.reddit.subreddits.join("+"),
            db = %self.db_path,
            cycle_ms = self.cycle_interval.as_millis() as u64,
            confirm_every = self.confirm_every,
            "configuration loaded"
        );
    }
}

fn required(var_name: &str) -> Result<String, ConfigError> {
    env::var(var_name).map_err(|_| ConfigError::MissingEnvVar(var_name.to_string()))
}

fn parse_or<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var_name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var_name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

fn list_or(var_name: &str, default: &str) -> Vec<String> {
    let raw = env::var(var_name).unwrap_or_else(|_| default.to_string());
    split_list(&raw)
}

/// Split a comma separated list, dropping blanks
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing() {
        assert!(matches!("mainnet".parse::<Network>(), Ok(Network::Mainnet)));
        assert!(matches!("TestNet".parse::<Network>(), Ok(Network::Testnet)));
        assert!("betanet".parse::<Network>().is_err());
    }

    #[test]
    fn test_explorer_urls() {
        assert_eq!(Network::Mainnet.explorer_url(), "https://algoexplorer.io");
        assert!(Network::Testnet.explorer_url().contains("testnet."));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_list(" , ").is_empty());
    }
}
