//! Chain-query collaborator (TonAPI)

pub mod client;
pub mod types;

pub use client::{ChainQuery, RetryPolicy, TonApiClient};
pub use types::{Account, AccountEvent, AccountEvents, Action, Emulation, JettonBalance};

#[cfg(test)]
pub mod mock;
