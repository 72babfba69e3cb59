//! TON primitives: addresses, mnemonics, wallet contracts, amounts

pub mod address;
pub mod contract;
pub mod kit;
pub mod mnemonic;
pub mod units;

pub use address::{is_valid_address, Address, FriendlyFlags};
pub use contract::WalletVersion;
pub use kit::{DerivedWallet, TonWalletKit, WalletKit};
pub use mnemonic::{SecretPhrase, MNEMONIC_WORDS};
pub use units::Amount;
