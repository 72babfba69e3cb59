//! Wallet library capability consumed by the wallet store
//!
//! Key generation, address derivation and signing sit behind [`WalletKit`] so
//! the store never touches key material beyond passing a [`SecretPhrase`]
//! through.

use ed25519_dalek::{Signer, SigningKey};
use serde::Serialize;

use super::address::{Address, FriendlyFlags};
use super::contract::WalletVersion;
use super::mnemonic::{self, SecretPhrase};
use crate::error::Result;

/// Public facts derived from a phrase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedWallet {
    /// User-friendly address
    pub address: String,
    /// Raw `0:<hex>` address
    pub address_raw: String,
    /// Hex-encoded Ed25519 public key
    pub public_key: String,
    pub version: WalletVersion,
}

/// External wallet/crypto library
pub trait WalletKit: Send + Sync {
    fn generate_mnemonic(&self) -> Result<SecretPhrase>;

    /// Fails with `InvalidMnemonic`
    fn validate_mnemonic(&self, phrase: &SecretPhrase) -> Result<()>;

    fn derive(&self, phrase: &SecretPhrase, version: WalletVersion) -> Result<DerivedWallet>;

    /// Ed25519 signature over `payload`
    fn sign(&self, phrase: &SecretPhrase, payload: &[u8]) -> Result<[u8; 64]>;
}

/// TON wallet kit (workchain 0)
#[derive(Debug, Clone, Copy, Default)]
pub struct TonWalletKit {
    pub testnet: bool,
}

impl TonWalletKit {
    pub fn new(testnet: bool) -> Self {
        Self { testnet }
    }

    fn signing_key(phrase: &SecretPhrase) -> SigningKey {
        let seed = mnemonic::to_key_seed(phrase);
        SigningKey::from_bytes(&seed)
    }
}

impl WalletKit for TonWalletKit {
    fn generate_mnemonic(&self) -> Result<SecretPhrase> {
        mnemonic::generate()
    }

    fn validate_mnemonic(&self, phrase: &SecretPhrase) -> Result<()> {
        mnemonic::validate(phrase)
    }

    fn derive(&self, phrase: &SecretPhrase, version: WalletVersion) -> Result<DerivedWallet> {
        let public_key = Self::signing_key(phrase).verifying_key().to_bytes();
        let address: Address = version.address(&public_key, 0);

        Ok(DerivedWallet {
            address: address.to_friendly(FriendlyFlags {
                bounceable: true,
                testnet: self.testnet,
            }),
            address_raw: address.to_raw(),
            public_key: hex::encode(public_key),
            version,
        })
    }

    fn sign(&self, phrase: &SecretPhrase, payload: &[u8]) -> Result<[u8; 64]> {
        Ok(Self::signing_key(phrase).sign(payload).to_bytes())
    }
}
