//! Core types for the wallet store
//!
//! Defines the persisted record, the decrypted document and the public views
//! returned by store operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ton::WalletVersion;

/// Wallet record as persisted inside the encrypted store document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Unique name, compared case-insensitively: "alice"
    pub label: String,

    /// User-friendly address, immutable after creation
    pub address: String,

    /// Raw `0:<hex>` form, used for uniqueness and as the monitor key
    pub address_raw: String,

    /// Hex-encoded Ed25519 public key
    pub public_key: String,

    /// Wallet contract version
    pub version: WalletVersion,

    /// Mnemonic encrypted under the record key
    pub encrypted_secret: String,

    /// When the wallet was added
    pub created_at: DateTime<Utc>,

    /// Imported from an existing mnemonic rather than generated
    #[serde(default)]
    pub imported: bool,
}

/// Decrypted store body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDocument {
    /// Document schema version
    pub format: u8,

    pub wallets: Vec<WalletRecord>,
}

pub const DOCUMENT_FORMAT: u8 = 1;

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            format: DOCUMENT_FORMAT,
            wallets: Vec::new(),
        }
    }
}

/// Listing view of a wallet; never carries secret material
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicWallet {
    pub label: String,
    pub address: String,
    pub address_raw: String,
    pub public_key: String,
    pub version: WalletVersion,
    pub created_at: DateTime<Utc>,
    pub imported: bool,
}

impl From<&WalletRecord> for PublicWallet {
    fn from(record: &WalletRecord) -> Self {
        Self {
            label: record.label.clone(),
            address: record.address.clone(),
            address_raw: record.address_raw.clone(),
            public_key: record.public_key.clone(),
            version: record.version,
            created_at: record.created_at,
            imported: record.imported,
        }
    }
}

/// Result of `create`: the mnemonic is handed out exactly this once
#[derive(Debug)]
pub struct CreatedWallet {
    pub wallet: PublicWallet,
    pub mnemonic: crate::ton::SecretPhrase,
}

/// Result of `sign`
#[derive(Debug, Clone, Serialize)]
pub struct SignedPayload {
    pub label: String,
    pub address: String,
    /// Hex-encoded Ed25519 public key
    pub public_key: String,
    /// Hex-encoded 64-byte signature
    pub signature: String,
}
