//! Common Error Types for the Tip Bot
//!
//! Root error used at process level; per-layer errors convert into it.

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::platform::PlatformError;
use crate::storage::StorageError;

/// Root error type for the tip bot
#[derive(Debug, Error)]
pub enum TipBotError {
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TipBotError {
    /// Whether the failure is transient and the current cycle can simply be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TipBotError::Ledger(_) | TipBotError::Platform(_) | TipBotError::Io(_)
        )
    }

    /// Short code for structured logs
    pub fn error_code(&self) -> &'static str {
        match self {
            TipBotError::Config(_) => "CONFIG_ERROR",
            TipBotError::Logging(_) => "LOGGING_ERROR",
            TipBotError::Ledger(_) => "LEDGER_ERROR",
            TipBotError::Platform(_) => "PLATFORM_ERROR",
            TipBotError::Storage(_) => "STORAGE_ERROR",
            TipBotError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias using TipBotError
pub type Result<T> = std::result::Result<T, TipBotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = TipBotError::from(LedgerError::Unavailable("node down".to_string()));
        assert!(err.to_string().contains("node down"));
        assert_eq!(err.error_code(), "LEDGER_ERROR");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_storage_not_retryable() {
        let err = TipBotError::from(StorageError::Database("disk full".to_string()));
        assert!(!err.is_retryable());
    }
}
