//! TON mnemonics
//!
//! A TON mnemonic is 24 words from the BIP-39 English list, but unlike
//! BIP-39 it carries no checksum. Validity is decided by hashing the phrase:
//!
//! - entropy = HMAC-SHA512(key = phrase, msg = passphrase)
//! - the phrase is a "basic seed" if PBKDF2-HMAC-SHA512(entropy,
//!   "TON seed version", 390 rounds) starts with a zero byte
//! - the Ed25519 key seed is the first 32 bytes of PBKDF2-HMAC-SHA512(entropy,
//!   "TON default seed", 100 000 rounds)

use std::fmt;

use bip39::Language;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha512;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

/// Word count of every TON wallet mnemonic
pub const MNEMONIC_WORDS: usize = 24;

const PBKDF_ITERATIONS: u32 = 100_000;
const BASIC_SEED_SALT: &[u8] = b"TON seed version";
const DEFAULT_SEED_SALT: &[u8] = b"TON default seed";

/// Give up generating after this many candidates (expected: ~256)
const MAX_GENERATE_ATTEMPTS: usize = 100_000;

/// Mnemonic phrase held in zeroize-on-drop memory.
///
/// `Debug` is redacted; the only way to read the words is [`SecretPhrase::expose`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretPhrase {
    phrase: String,
}

impl SecretPhrase {
    /// Normalize whitespace and case; no validation
    pub fn parse(input: &str) -> Self {
        let phrase = input
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        Self { phrase }
    }

    fn from_words(words: &[&str]) -> Self {
        Self {
            phrase: words.join(" "),
        }
    }

    pub fn word_count(&self) -> usize {
        self.phrase.split(' ').filter(|w| !w.is_empty()).count()
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.phrase.split(' ').filter(|w| !w.is_empty())
    }

    /// The space-separated phrase
    pub fn expose(&self) -> &str {
        &self.phrase
    }
}

impl fmt::Debug for SecretPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretPhrase([REDACTED; {} words])", self.word_count())
    }
}

fn entropy(phrase: &SecretPhrase) -> Zeroizing<[u8; 64]> {
    // HMAC accepts keys of any length
    let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(phrase.expose().as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC takes keys of any size"));
    mac.update(b"");
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

fn pbkdf2_sha512(entropy: &[u8], salt: &[u8], rounds: u32) -> Zeroizing<[u8; 64]> {
    let mut out = Zeroizing::new([0u8; 64]);
    pbkdf2::pbkdf2_hmac::<Sha512>(entropy, salt, rounds, &mut out[..]);
    out
}

fn is_basic_seed(entropy: &[u8]) -> bool {
    let rounds = (PBKDF_ITERATIONS / 256).max(1);
    pbkdf2_sha512(entropy, BASIC_SEED_SALT, rounds)[0] == 0
}

/// Check word count, vocabulary and the basic-seed property
pub fn validate(phrase: &SecretPhrase) -> Result<()> {
    let count = phrase.word_count();
    if count != MNEMONIC_WORDS {
        return Err(Error::InvalidMnemonic(format!(
            "expected {} words, got {}",
            MNEMONIC_WORDS, count
        )));
    }

    if let Some(position) = phrase
        .words()
        .position(|w| Language::English.find_word(w).is_none())
    {
        return Err(Error::InvalidMnemonic(format!(
            "word #{} is not in the word list",
            position + 1
        )));
    }

    if !is_basic_seed(&entropy(phrase)[..]) {
        return Err(Error::InvalidMnemonic(
            "phrase is not a valid TON wallet seed".to_string(),
        ));
    }

    Ok(())
}

/// Generate a fresh 24-word phrase that passes [`validate`]
pub fn generate() -> Result<SecretPhrase> {
    let list = Language::English.word_list();
    let mut rng = rand::rngs::OsRng;

    for _ in 0..MAX_GENERATE_ATTEMPTS {
        let words: Vec<&str> = (0..MNEMONIC_WORDS)
            .map(|_| list[rng.gen_range(0..list.len())])
            .collect();
        let candidate = SecretPhrase::from_words(&words);

        if is_basic_seed(&entropy(&candidate)[..]) {
            return Ok(candidate);
        }
    }

    Err(Error::Internal(
        "Failed to generate a valid mnemonic".to_string(),
    ))
}

/// 32-byte Ed25519 secret seed for a phrase
pub fn to_key_seed(phrase: &SecretPhrase) -> Zeroizing<[u8; 32]> {
    let seed = pbkdf2_sha512(&entropy(phrase)[..], DEFAULT_SEED_SALT, PBKDF_ITERATIONS);
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&seed[..32]);
    key
}
