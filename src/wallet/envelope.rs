//! Encrypted wallet file envelope
//!
//! ```text
//! "TONW" | format u8 | m_cost u32 | t_cost u32 | p_cost u32
//!        | salt[16] | verifier[32] | nonce[12] | ciphertext
//! ```
//!
//! Argon2id(password, salt) yields 96 bytes: file key, record key and check
//! bytes. The verifier (a hash of the check bytes) tells a wrong password
//! apart from a damaged file. The whole header is authenticated as AEAD
//! associated data.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::config::KdfConfig;
use crate::error::{Error, Result};
use crate::ton::SecretPhrase;

pub const MAGIC: &[u8; 4] = b"TONW";
pub const FORMAT_VERSION: u8 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const VERIFIER_LEN: usize = 32;
const KEY_LEN: usize = 32;
pub const HEADER_LEN: usize = 4 + 1 + 12 + SALT_LEN + VERIFIER_LEN + NONCE_LEN;

const VERIFIER_DOMAIN: &[u8] = b"ton-skill/password-check/v1";

/// Keys derived from the password for one store operation.
///
/// Dropping the vault zeroizes both keys.
pub struct Vault {
    kdf: KdfConfig,
    salt: [u8; SALT_LEN],
    verifier: [u8; VERIFIER_LEN],
    file_key: Zeroizing<[u8; KEY_LEN]>,
    record_key: Zeroizing<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").field("kdf", &self.kdf).finish_non_exhaustive()
    }
}

fn derive(password: &str, salt: &[u8; SALT_LEN], kdf: &KdfConfig) -> Result<Vault> {
    let params = Params::new(
        kdf.memory_kib,
        kdf.iterations,
        kdf.parallelism,
        Some(3 * KEY_LEN),
    )
    .map_err(|e| Error::Config(format!("Invalid key derivation parameters: {}", e)))?;

    let mut okm = Zeroizing::new([0u8; 3 * KEY_LEN]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut okm[..])
        .map_err(|e| Error::Internal(format!("Key derivation failed: {}", e)))?;

    let mut file_key = Zeroizing::new([0u8; KEY_LEN]);
    let mut record_key = Zeroizing::new([0u8; KEY_LEN]);
    file_key.copy_from_slice(&okm[..KEY_LEN]);
    record_key.copy_from_slice(&okm[KEY_LEN..2 * KEY_LEN]);

    let mut hasher = Sha256::new();
    hasher.update(VERIFIER_DOMAIN);
    hasher.update(&okm[2 * KEY_LEN..]);

    Ok(Vault {
        kdf: *kdf,
        salt: *salt,
        verifier: hasher.finalize().into(),
        file_key,
        record_key,
    })
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

impl Vault {
    /// Fresh salt for a store that does not exist yet
    pub fn create(password: &str, kdf: &KdfConfig) -> Result<Self> {
        derive(password, &random_bytes::<SALT_LEN>(), kdf)
    }

    /// Authenticate against an existing file and decrypt its body
    pub fn open(bytes: &[u8], password: &str) -> Result<(Self, Zeroizing<Vec<u8>>)> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(Error::StoreCorrupt(
                "not a wallet store file (bad magic)".to_string(),
            ));
        }
        if bytes[4] != FORMAT_VERSION {
            return Err(Error::StoreCorrupt(format!(
                "unsupported store format version {}",
                bytes[4]
            )));
        }

        let kdf = KdfConfig {
            memory_kib: read_u32(bytes, 5),
            iterations: read_u32(bytes, 9),
            parallelism: read_u32(bytes, 13),
        };
        // The header is only authenticated after derivation, so bound its cost first
        kdf.check()
            .map_err(|reason| Error::StoreCorrupt(format!("key derivation parameters: {}", reason)))?;

        let mut offset = 17;
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[offset..offset + SALT_LEN]);
        offset += SALT_LEN;
        let stored_verifier = &bytes[offset..offset + VERIFIER_LEN];
        offset += VERIFIER_LEN;
        let nonce = &bytes[offset..offset + NONCE_LEN];

        let vault = derive(password, &salt, &kdf)
            .map_err(|e| Error::StoreCorrupt(format!("unusable header: {}", e)))?;

        if !constant_time_eq(&vault.verifier, stored_verifier) {
            return Err(Error::AuthenticationFailed);
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&vault.file_key[..]));
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: &bytes[HEADER_LEN..],
                    aad: &bytes[..HEADER_LEN],
                },
            )
            .map_err(|_| Error::StoreCorrupt("body failed authentication".to_string()))?;

        Ok((vault, Zeroizing::new(plaintext)))
    }

    /// Encrypt `plaintext` under a fresh nonce into a complete file image
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = random_bytes::<NONCE_LEN>();

        let mut out = Vec::with_capacity(HEADER_LEN + plaintext.len() + 16);
        out.extend_from_slice(MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&self.kdf.memory_kib.to_le_bytes());
        out.extend_from_slice(&self.kdf.iterations.to_le_bytes());
        out.extend_from_slice(&self.kdf.parallelism.to_le_bytes());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.verifier);
        out.extend_from_slice(&nonce);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.file_key[..]));
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &out[..HEADER_LEN],
                },
            )
            .map_err(|_| Error::Internal("Store encryption failed".to_string()))?;

        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Encrypt a mnemonic bound to its wallet address; base64(nonce | ct)
    pub fn encrypt_secret(&self, phrase: &SecretPhrase, address_raw: &str) -> Result<String> {
        let nonce = random_bytes::<NONCE_LEN>();
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.record_key[..]));
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: phrase.expose().as_bytes(),
                    aad: address_raw.as_bytes(),
                },
            )
            .map_err(|_| Error::Internal("Secret encryption failed".to_string()))?;

        let mut blob = nonce.to_vec();
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    pub fn decrypt_secret(&self, encoded: &str, address_raw: &str) -> Result<SecretPhrase> {
        let blob = STANDARD
            .decode(encoded)
            .map_err(|e| Error::StoreCorrupt(format!("secret for {}: {}", address_raw, e)))?;
        if blob.len() <= NONCE_LEN {
            return Err(Error::StoreCorrupt(format!(
                "secret for {} is truncated",
                address_raw
            )));
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.record_key[..]));
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(&blob[..NONCE_LEN]),
                    Payload {
                        msg: &blob[NONCE_LEN..],
                        aad: address_raw.as_bytes(),
                    },
                )
                .map_err(|_| {
                    Error::StoreCorrupt(format!("secret for {} failed authentication", address_raw))
                })?,
        );

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| Error::StoreCorrupt(format!("secret for {} is not text", address_raw)))?;
        Ok(SecretPhrase::parse(text))
    }
}
