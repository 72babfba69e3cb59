//! Error types for the wallet store, chain client and monitor

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // Wallet store errors
    #[error("Authentication failed: wrong password")]
    AuthenticationFailed,

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Wallet label already exists: {0}")]
    DuplicateLabel(String),

    #[error("Wallet address already stored: {0}")]
    DuplicateAddress(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Wallet store is corrupt: {0}")]
    StoreCorrupt(String),

    // Collaborator errors
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("Collaborator rejected request ({status}): {message}")]
    CollaboratorRejected { status: u16, message: String },

    // Input and configuration errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::CollaboratorUnavailable(_))
    }

    /// Stable machine-readable code for the JSON error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Error::AuthenticationFailed => "authentication_failed",
            Error::WalletNotFound(_) => "wallet_not_found",
            Error::DuplicateLabel(_) => "duplicate_label",
            Error::DuplicateAddress(_) => "duplicate_address",
            Error::InvalidMnemonic(_) => "invalid_mnemonic",
            Error::StoreCorrupt(_) => "store_corrupt",
            Error::CollaboratorUnavailable(_) => "collaborator_unavailable",
            Error::CollaboratorRejected { .. } => "collaborator_rejected",
            Error::InvalidInput(_) => "invalid_input",
            Error::Config(_) => "config",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }

    /// Actionable suggestion shown next to the error message
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::AuthenticationFailed => {
                Some("Check the password (--password or WALLET_PASSWORD)")
            }
            Error::WalletNotFound(_) => {
                Some("List wallets with 'wallet list' or pass a full address")
            }
            Error::DuplicateLabel(_) => Some("Pick another label or rename the existing wallet"),
            Error::DuplicateAddress(_) => Some("This wallet is already imported under another label"),
            Error::InvalidMnemonic(_) => Some("A TON mnemonic is exactly 24 space-separated words"),
            Error::StoreCorrupt(_) => {
                Some("Restore the wallet file from a backup; it was not modified")
            }
            Error::CollaboratorUnavailable(_) => {
                Some("Check your internet connection and try again in a few moments")
            }
            Error::CollaboratorRejected { status: 401, .. }
            | Error::CollaboratorRejected { status: 403, .. } => {
                Some("Check the TonAPI key (TONAPI_KEY or tonapi.api_key)")
            }
            Error::CollaboratorRejected { status: 404, .. } => {
                Some("Check that the address or identifier is correct")
            }
            Error::InvalidInput(_) => Some("Run with --help to see the expected arguments"),
            _ => None,
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Transport-level reqwest failures never carry an HTTP answer
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::CollaboratorUnavailable("Request timeout".to_string())
        } else if e.is_connect() {
            Error::CollaboratorUnavailable(format!("Connection error: {}", e))
        } else if e.is_decode() {
            Error::Serialization(format!("Invalid response body: {}", e))
        } else {
            Error::CollaboratorUnavailable(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_collaborator_unavailable_is_retryable() {
        assert!(Error::CollaboratorUnavailable("down".into()).is_retryable());
        assert!(!Error::CollaboratorRejected {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!Error::AuthenticationFailed.is_retryable());
        assert!(!Error::StoreCorrupt("x".into()).is_retryable());
    }

    #[test]
    fn test_codes_and_hints() {
        let err = Error::WalletNotFound("bob".into());
        assert_eq!(err.code(), "wallet_not_found");
        assert_eq!(err.to_string(), "Wallet not found: bob");
        assert!(err.hint().is_some());

        let rejected = Error::CollaboratorRejected {
            status: 401,
            message: "unauthorized".into(),
        };
        assert!(rejected.hint().unwrap().contains("TonAPI key"));
        assert!(Error::Internal("x".into()).hint().is_none());
    }
}
