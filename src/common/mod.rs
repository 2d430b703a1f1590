//! Common Infrastructure Module
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - Root error type

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ConfigError, LedgerConfig, Network, RedditConfig, TipBotConfig};
pub use error::{Result, TipBotError};
pub use logging::{
    init_from_config, init_logging, log_inbound_event, log_operation_event, EventCategory,
    LogEvent, LogLevel, LoggingError,
};
