//! Password-protected wallet store
//!
//! Every operation loads the whole file, authenticates, works on the decrypted
//! document and, for mutations, re-encrypts and atomically replaces the file.
//! Reads take a shared lock on the sidecar `.lock` file and mutations an
//! exclusive one, so concurrent CLI invocations serialize.

use std::path::{Path, PathBuf};

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use crate::config::KdfConfig;
use crate::error::{Error, Result};
use crate::fsutil::{atomic_write, FileLock};
use crate::ton::address::{canonical, same_account};
use crate::ton::{SecretPhrase, WalletKit, WalletVersion, MNEMONIC_WORDS};

use super::envelope::Vault;
use super::types::{
    CreatedWallet, PublicWallet, SignedPayload, StoreDocument, WalletRecord, DOCUMENT_FORMAT,
};

lazy_static! {
    static ref LABEL_RE: Regex = Regex::new(r"^[A-Za-z0-9_.\-]{1,64}$").unwrap();
}

/// Check label syntax
pub fn validate_label(label: &str) -> Result<()> {
    if LABEL_RE.is_match(label) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "Invalid label '{}': use 1-64 characters from A-Z a-z 0-9 _ . -",
            label
        )))
    }
}

/// Decrypted document plus the keys needed to write it back
struct Unlocked {
    vault: Vault,
    doc: StoreDocument,
}

impl Unlocked {
    fn position(&self, label: &str) -> Option<usize> {
        self.doc
            .wallets
            .iter()
            .position(|w| w.label.eq_ignore_ascii_case(label))
    }

    fn record(&self, label: &str) -> Result<&WalletRecord> {
        self.position(label)
            .map(|i| &self.doc.wallets[i])
            .ok_or_else(|| Error::WalletNotFound(label.to_string()))
    }

    fn ensure_label_free(&self, label: &str) -> Result<()> {
        if self.position(label).is_some() {
            return Err(Error::DuplicateLabel(label.to_string()));
        }
        Ok(())
    }

    /// `<prefix>_<n>` with the lowest unused n
    fn next_label(&self, prefix: &str) -> String {
        (1..)
            .map(|n| format!("{}_{}", prefix, n))
            .find(|label| self.position(label).is_none())
            .unwrap_or_else(|| prefix.to_string())
    }

    fn pick_label(&self, requested: Option<&str>, prefix: &str) -> Result<String> {
        match requested {
            Some(label) => {
                validate_label(label)?;
                self.ensure_label_free(label)?;
                Ok(label.to_string())
            }
            None => Ok(self.next_label(prefix)),
        }
    }
}

/// Handle on one wallet store file
pub struct WalletStore<K: WalletKit> {
    path: PathBuf,
    kdf: KdfConfig,
    kit: K,
}

impl<K: WalletKit> WalletStore<K> {
    /// `kdf` only applies when the file is first created
    pub fn new(path: impl Into<PathBuf>, kdf: KdfConfig, kit: K) -> Self {
        Self {
            path: path.into(),
            kdf,
            kit,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn kit(&self) -> &K {
        &self.kit
    }

    fn load(&self, password: &str) -> Result<Option<Unlocked>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (vault, plaintext) = Vault::open(&bytes, password)?;
        let doc: StoreDocument = serde_json::from_slice(&plaintext)
            .map_err(|e| Error::StoreCorrupt(format!("invalid store document: {}", e)))?;
        validate_document(&doc)?;

        debug!("Unlocked wallet store with {} wallets", doc.wallets.len());
        Ok(Some(Unlocked { vault, doc }))
    }

    /// Load for a mutation; a missing file starts an empty store keyed by
    /// this password
    fn load_or_init(&self, password: &str) -> Result<Unlocked> {
        match self.load(password)? {
            Some(unlocked) => Ok(unlocked),
            None => {
                if password.is_empty() {
                    return Err(Error::InvalidInput(
                        "A password is required to create the wallet store".to_string(),
                    ));
                }
                info!("Creating new wallet store at {}", self.path.display());
                Ok(Unlocked {
                    vault: Vault::create(password, &self.kdf)?,
                    doc: StoreDocument::default(),
                })
            }
        }
    }

    fn load_existing(&self, password: &str, label: &str) -> Result<Unlocked> {
        self.load(password)?
            .ok_or_else(|| Error::WalletNotFound(label.to_string()))
    }

    fn save(&self, unlocked: &Unlocked) -> Result<()> {
        let body = zeroize::Zeroizing::new(serde_json::to_vec(&unlocked.doc)?);
        let sealed = unlocked.vault.seal(&body)?;
        atomic_write(&self.path, &sealed)
    }

    /// Generate a new wallet; the returned mnemonic is never stored in clear
    pub fn create(
        &self,
        password: &str,
        label: Option<&str>,
        version: WalletVersion,
    ) -> Result<CreatedWallet> {
        let _lock = FileLock::exclusive(&self.path)?;
        let mut unlocked = self.load_or_init(password)?;
        let label = unlocked.pick_label(label, "wallet")?;

        let phrase = self.kit.generate_mnemonic()?;
        let wallet = self.insert(&mut unlocked, label, &phrase, version, false)?;
        self.save(&unlocked)?;

        info!("Created wallet {} ({})", wallet.label, wallet.address);
        Ok(CreatedWallet {
            wallet,
            mnemonic: phrase,
        })
    }

    /// Store an existing 24-word mnemonic
    pub fn import(
        &self,
        password: &str,
        label: Option<&str>,
        phrase: &SecretPhrase,
        version: WalletVersion,
    ) -> Result<PublicWallet> {
        if phrase.word_count() != MNEMONIC_WORDS {
            return Err(Error::InvalidMnemonic(format!(
                "expected {} words, got {}",
                MNEMONIC_WORDS,
                phrase.word_count()
            )));
        }
        self.kit.validate_mnemonic(phrase)?;

        let _lock = FileLock::exclusive(&self.path)?;
        let mut unlocked = self.load_or_init(password)?;
        let label = unlocked.pick_label(label, "imported")?;

        let wallet = self.insert(&mut unlocked, label, phrase, version, true)?;
        self.save(&unlocked)?;

        info!("Imported wallet {} ({})", wallet.label, wallet.address);
        Ok(wallet)
    }

    fn insert(
        &self,
        unlocked: &mut Unlocked,
        label: String,
        phrase: &SecretPhrase,
        version: WalletVersion,
        imported: bool,
    ) -> Result<PublicWallet> {
        let derived = self.kit.derive(phrase, version)?;

        if let Some(existing) = unlocked
            .doc
            .wallets
            .iter()
            .find(|w| same_account(&w.address_raw, &derived.address_raw))
        {
            return Err(Error::DuplicateAddress(format!(
                "{} (label '{}')",
                derived.address, existing.label
            )));
        }

        let record = WalletRecord {
            encrypted_secret: unlocked.vault.encrypt_secret(phrase, &derived.address_raw)?,
            label,
            address: derived.address,
            address_raw: derived.address_raw,
            public_key: derived.public_key,
            version,
            created_at: Utc::now(),
            imported,
        };
        let wallet = PublicWallet::from(&record);
        unlocked.doc.wallets.push(record);
        Ok(wallet)
    }

    /// Public view of every wallet; an absent store lists as empty
    pub fn list(&self, password: &str) -> Result<Vec<PublicWallet>> {
        let _lock = FileLock::shared(&self.path)?;
        Ok(self
            .load(password)?
            .map(|u| u.doc.wallets.iter().map(PublicWallet::from).collect())
            .unwrap_or_default())
    }

    /// Look a wallet up by label (case-insensitive) or by address in any form
    pub fn find(&self, password: &str, query: &str) -> Result<PublicWallet> {
        let wallets = self.list(password)?;
        let query = query.trim();

        wallets
            .iter()
            .find(|w| w.label.eq_ignore_ascii_case(query))
            .or_else(|| {
                let key = canonical(query);
                wallets.iter().find(|w| w.address_raw == key)
            })
            .cloned()
            .ok_or_else(|| Error::WalletNotFound(query.to_string()))
    }

    /// Decrypt and return the mnemonic of one wallet
    pub fn export(&self, password: &str, label: &str) -> Result<(PublicWallet, SecretPhrase)> {
        let _lock = FileLock::shared(&self.path)?;
        let unlocked = self.load_existing(password, label)?;
        let record = unlocked.record(label)?;
        let phrase = unlocked
            .vault
            .decrypt_secret(&record.encrypted_secret, &record.address_raw)?;

        info!("Exported wallet {}", record.label);
        Ok((PublicWallet::from(record), phrase))
    }

    pub fn remove(&self, password: &str, label: &str) -> Result<PublicWallet> {
        let _lock = FileLock::exclusive(&self.path)?;
        let mut unlocked = self.load_existing(password, label)?;
        let index = unlocked
            .position(label)
            .ok_or_else(|| Error::WalletNotFound(label.to_string()))?;

        let record = unlocked.doc.wallets.remove(index);
        self.save(&unlocked)?;

        info!("Removed wallet {}", record.label);
        Ok(PublicWallet::from(&record))
    }

    pub fn relabel(&self, password: &str, old: &str, new: &str) -> Result<PublicWallet> {
        validate_label(new)?;

        let _lock = FileLock::exclusive(&self.path)?;
        let mut unlocked = self.load_existing(password, old)?;
        let index = unlocked
            .position(old)
            .ok_or_else(|| Error::WalletNotFound(old.to_string()))?;

        // Case-only renames of the same wallet are allowed
        if let Some(other) = unlocked.position(new) {
            if other != index {
                return Err(Error::DuplicateLabel(new.to_string()));
            }
        }

        let record = &mut unlocked.doc.wallets[index];
        let previous = std::mem::replace(&mut record.label, new.to_string());
        let wallet = PublicWallet::from(&*record);
        self.save(&unlocked)?;

        info!("Renamed wallet {} -> {}", previous, new);
        Ok(wallet)
    }

    /// Run `f` with the decrypted mnemonic of `label`.
    ///
    /// The phrase and the derived keys are zeroized when this returns, on
    /// success, error or unwind alike.
    pub fn with_secret<T>(
        &self,
        password: &str,
        label: &str,
        f: impl FnOnce(&WalletRecord, &SecretPhrase) -> Result<T>,
    ) -> Result<T> {
        let unlocked = {
            let _lock = FileLock::shared(&self.path)?;
            self.load_existing(password, label)?
        };
        let record = unlocked.record(label)?;
        let phrase = unlocked
            .vault
            .decrypt_secret(&record.encrypted_secret, &record.address_raw)?;
        f(record, &phrase)
    }

    /// Ed25519-sign a prepared payload (usually a message hash)
    pub fn sign(&self, password: &str, label: &str, payload: &[u8]) -> Result<SignedPayload> {
        if payload.is_empty() {
            return Err(Error::InvalidInput("Nothing to sign: payload is empty".to_string()));
        }

        let signed = self.with_secret(password, label, |record, phrase| {
            let signature = self.kit.sign(phrase, payload)?;
            Ok(SignedPayload {
                label: record.label.clone(),
                address: record.address.clone(),
                public_key: record.public_key.clone(),
                signature: hex::encode(signature),
            })
        })?;

        info!("Signed {} bytes with wallet {}", payload.len(), signed.label);
        Ok(signed)
    }
}

/// Reject documents that decrypt but break store invariants
fn validate_document(doc: &StoreDocument) -> Result<()> {
    if doc.format != DOCUMENT_FORMAT {
        return Err(Error::StoreCorrupt(format!(
            "unsupported document format {}",
            doc.format
        )));
    }

    for (i, wallet) in doc.wallets.iter().enumerate() {
        if validate_label(&wallet.label).is_err() {
            return Err(Error::StoreCorrupt(format!(
                "record {} has an invalid label",
                i
            )));
        }
        let rest = &doc.wallets[i + 1..];
        if rest.iter().any(|w| w.label.eq_ignore_ascii_case(&wallet.label)) {
            return Err(Error::StoreCorrupt(format!(
                "duplicate label '{}'",
                wallet.label
            )));
        }
        if rest.iter().any(|w| w.address_raw == wallet.address_raw) {
            return Err(Error::StoreCorrupt(format!(
                "duplicate address {}",
                wallet.address
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ton::address::Address;
    use crate::ton::DerivedWallet;
    use sha2::{Digest, Sha256};
    use tempfile::tempdir;

    /// Deterministic kit: address = sha256(phrase), no real seed checks
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FakeKit;

    impl WalletKit for FakeKit {
        fn generate_mnemonic(&self) -> Result<SecretPhrase> {
            let words: Vec<String> = (0..MNEMONIC_WORDS)
                .map(|_| format!("w{}", rand::random::<u16>()))
                .collect();
            Ok(SecretPhrase::parse(&words.join(" ")))
        }

        fn validate_mnemonic(&self, phrase: &SecretPhrase) -> Result<()> {
            if phrase.words().any(|w| w == "invalid") {
                return Err(Error::InvalidMnemonic("bad word".to_string()));
            }
            Ok(())
        }

        fn derive(&self, phrase: &SecretPhrase, version: WalletVersion) -> Result<DerivedWallet> {
            let mut hasher = Sha256::new();
            hasher.update(phrase.expose());
            hasher.update(version.to_string());
            let address = Address::new(0, hasher.finalize().into());
            Ok(DerivedWallet {
                address: address.to_friendly(Default::default()),
                address_raw: address.to_raw(),
                public_key: hex::encode([7u8; 32]),
                version,
            })
        }

        fn sign(&self, _phrase: &SecretPhrase, payload: &[u8]) -> Result<[u8; 64]> {
            let mut out = [0u8; 64];
            out[..payload.len().min(64)].copy_from_slice(&payload[..payload.len().min(64)]);
            Ok(out)
        }
    }

    pub fn fast_kdf() -> KdfConfig {
        KdfConfig {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    pub fn test_store(dir: &Path) -> WalletStore<FakeKit> {
        WalletStore::new(dir.join("wallets.enc"), fast_kdf(), FakeKit)
    }

    fn mnemonic(seed: &str) -> SecretPhrase {
        let words: Vec<String> = (0..MNEMONIC_WORDS).map(|i| format!("{}{}", seed, i)).collect();
        SecretPhrase::parse(&words.join(" "))
    }

    fn file_hash(path: &Path) -> Vec<u8> {
        Sha256::digest(std::fs::read(path).unwrap()).to_vec()
    }

    #[test]
    fn test_import_export_round_trip() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        let phrase = mnemonic("bob");

        let wallet = store
            .import("pw", Some("bob"), &phrase, WalletVersion::V4R2)
            .unwrap();
        assert!(wallet.imported);

        let (exported_wallet, exported) = store.export("pw", "BOB").unwrap();
        assert_eq!(exported.expose(), phrase.expose());
        assert_eq!(exported_wallet.address, wallet.address);
    }

    #[test]
    fn test_default_labels() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let first = store.create("pw", None, WalletVersion::V4R2).unwrap();
        let second = store.create("pw", None, WalletVersion::V4R2).unwrap();
        let imported = store
            .import("pw", None, &mnemonic("x"), WalletVersion::V3R2)
            .unwrap();

        assert_eq!(first.wallet.label, "wallet_1");
        assert_eq!(second.wallet.label, "wallet_2");
        assert_eq!(imported.label, "imported_1");
    }

    #[test]
    fn test_duplicate_label_leaves_store_unchanged() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        store
            .import("pw", Some("alice"), &mnemonic("a"), WalletVersion::V4R2)
            .unwrap();
        let before = file_hash(store.path());

        let err = store.create("pw", Some("Alice"), WalletVersion::V4R2).unwrap_err();
        assert!(matches!(err, Error::DuplicateLabel(_)));
        let err = store
            .import("pw", Some("alice"), &mnemonic("b"), WalletVersion::V4R2)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateLabel(_)));

        assert_eq!(file_hash(store.path()), before);
        assert_eq!(store.list("pw").unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        store
            .import("pw", Some("one"), &mnemonic("same"), WalletVersion::V4R2)
            .unwrap();
        let err = store
            .import("pw", Some("two"), &mnemonic("same"), WalletVersion::V4R2)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateAddress(_)));

        // Another contract version is another address
        store
            .import("pw", Some("two"), &mnemonic("same"), WalletVersion::V3R2)
            .unwrap();
    }

    #[test]
    fn test_wrong_word_count_performs_no_write() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        for count in [0usize, 12, 23, 25] {
            let words: Vec<String> = (0..count).map(|i| format!("w{}", i)).collect();
            let err = store
                .import("pw", Some("x"), &SecretPhrase::parse(&words.join(" ")), WalletVersion::V4R2)
                .unwrap_err();
            assert!(matches!(err, Error::InvalidMnemonic(_)));
        }
        assert!(!store.exists());

        let mut words: Vec<String> = (0..23).map(|i| format!("w{}", i)).collect();
        words.push("invalid".to_string());
        let err = store
            .import("pw", None, &SecretPhrase::parse(&words.join(" ")), WalletVersion::V4R2)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMnemonic(_)));
        assert!(!store.exists());
    }

    #[test]
    fn test_list_never_contains_secrets() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        assert!(store.list("pw").unwrap().is_empty());

        let created = store.create("pw", Some("alice"), WalletVersion::V4R2).unwrap();
        let phrase = mnemonic("bob");
        store
            .import("pw", Some("bob"), &phrase, WalletVersion::V4R2)
            .unwrap();

        let listed = serde_json::to_string(&store.list("pw").unwrap()).unwrap();
        assert!(!listed.contains("encrypted_secret"));
        assert!(!listed.contains("mnemonic"));
        assert!(!listed.contains(phrase.words().next().unwrap()));
        assert!(!listed.contains(created.mnemonic.words().next().unwrap()));

        // Nor is it in the file itself
        let raw = std::fs::read(store.path()).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("bob0"));
    }

    #[test]
    fn test_wrong_password_leaves_file_unchanged() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        store.create("pw", Some("alice"), WalletVersion::V4R2).unwrap();
        let before = file_hash(store.path());

        let results = [
            store.create("nope", Some("x"), WalletVersion::V4R2).map(|_| ()),
            store
                .import("nope", Some("y"), &mnemonic("y"), WalletVersion::V4R2)
                .map(|_| ()),
            store.remove("nope", "alice").map(|_| ()),
            store.remove("nope", "missing").map(|_| ()),
            store.relabel("nope", "alice", "carol").map(|_| ()),
            store.export("nope", "alice").map(|_| ()),
            store.sign("nope", "alice", b"hash").map(|_| ()),
        ];
        for result in results {
            assert!(matches!(result, Err(Error::AuthenticationFailed)));
        }

        assert_eq!(file_hash(store.path()), before);
    }

    #[test]
    fn test_relabel() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        store.create("pw", Some("alice"), WalletVersion::V4R2).unwrap();
        store.create("pw", Some("bob"), WalletVersion::V4R2).unwrap();

        assert!(matches!(
            store.relabel("pw", "alice", "BOB"),
            Err(Error::DuplicateLabel(_))
        ));
        assert!(matches!(
            store.relabel("pw", "carol", "dave"),
            Err(Error::WalletNotFound(_))
        ));
        assert!(matches!(
            store.relabel("pw", "alice", "has space"),
            Err(Error::InvalidInput(_))
        ));

        let renamed = store.relabel("pw", "alice", "Alice").unwrap();
        assert_eq!(renamed.label, "Alice");
        let renamed = store.relabel("pw", "alice", "carol").unwrap();
        assert_eq!(renamed.label, "carol");
        assert!(store.find("pw", "carol").is_ok());
        assert!(matches!(
            store.find("pw", "alice"),
            Err(Error::WalletNotFound(_))
        ));
    }

    #[test]
    fn test_find_by_address_forms() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        let created = store.create("pw", Some("alice"), WalletVersion::V4R2).unwrap();

        let by_raw = store.find("pw", &created.wallet.address_raw).unwrap();
        let by_friendly = store.find("pw", &created.wallet.address).unwrap();
        assert_eq!(by_raw.label, "alice");
        assert_eq!(by_friendly.label, "alice");
    }

    #[test]
    fn test_sign_uses_secret_scope() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());
        store.create("pw", Some("alice"), WalletVersion::V4R2).unwrap();

        let signed = store.sign("pw", "alice", b"abc").unwrap();
        assert_eq!(signed.label, "alice");
        assert!(signed.signature.starts_with("616263"));

        let err = store.with_secret("pw", "alice", |_, _| -> Result<()> {
            Err(Error::Internal("boom".to_string()))
        });
        assert!(matches!(err, Err(Error::Internal(_))));

        assert!(matches!(
            store.sign("pw", "alice", b""),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.sign("pw", "nobody", b"abc"),
            Err(Error::WalletNotFound(_))
        ));
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        // Valid envelope around a body that is not a store document
        let vault = Vault::create("pw", &fast_kdf()).unwrap();
        atomic_write(store.path(), &vault.seal(b"{\"wallets\": 5}").unwrap()).unwrap();
        let before = file_hash(store.path());

        assert!(matches!(store.list("pw"), Err(Error::StoreCorrupt(_))));
        assert!(matches!(
            store.create("pw", None, WalletVersion::V4R2),
            Err(Error::StoreCorrupt(_))
        ));
        assert_eq!(file_hash(store.path()), before);
    }

    #[test]
    fn test_alice_bob_scenario_store_half() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store.create("pw", Some("alice"), WalletVersion::V4R2).unwrap();
        let phrase = mnemonic("bob");
        store
            .import("pw", Some("bob"), &phrase, WalletVersion::V4R2)
            .unwrap();
        assert_eq!(store.export("pw", "bob").unwrap().1.expose(), phrase.expose());

        assert!(matches!(
            store.import("pw", Some("bob"), &mnemonic("other"), WalletVersion::V4R2),
            Err(Error::DuplicateLabel(_))
        ));

        store.remove("pw", "bob").unwrap();
        assert!(matches!(store.find("pw", "bob"), Err(Error::WalletNotFound(_))));
        assert!(matches!(store.remove("pw", "bob"), Err(Error::WalletNotFound(_))));
    }
}
