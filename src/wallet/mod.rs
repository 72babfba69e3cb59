//! Wallet store module
//!
//! Provides password-protected storage of TON wallets:
//! - Encrypted envelope (Argon2id + ChaCha20-Poly1305, versioned header)
//! - Label-keyed records with per-record secret encryption
//! - Locked, atomically replaced store file
//! - Balance snapshots through the chain-query collaborator
//!
//! # Architecture
//!
//! ```text
//! WalletStore → Vault (envelope) → wallets.enc
//!      ↓
//!  WalletKit (mnemonic, address, signing)
//! ```
//!
//! # Security
//!
//! - Listings never include `encrypted_secret` or mnemonics
//! - Decrypted mnemonics only exist inside `export` and `with_secret`
//! - Derived keys are zeroized when each operation returns

pub mod balance;
pub mod envelope;
pub mod store;
pub mod types;

pub use balance::{balance, with_balances, BalanceSnapshot, BalanceTarget, WalletBalance};
pub use store::{validate_label, WalletStore};
pub use types::{CreatedWallet, PublicWallet, SignedPayload, WalletRecord};
