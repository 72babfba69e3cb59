//! ton-skill library
//!
//! Password-protected TON wallet store and a transaction monitor that turns
//! on-chain activity into a JSON-lines event log.

pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod monitor;
pub mod output;
pub mod ton;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
