//! TON address formats
//!
//! Raw form: `<workchain>:<64 hex chars>`.
//! User-friendly form: 36 bytes `tag | workchain | hash[32] | crc16` encoded
//! as base64 (url-safe or standard), 48 characters.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use crc::{Crc, CRC_16_XMODEM};

use crate::error::{Error, Result};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TESTNET: u8 = 0x80;

/// Parsed account address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub workchain: i8,
    pub hash: [u8; 32],
}

/// Flags carried by the user-friendly form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FriendlyFlags {
    pub bounceable: bool,
    pub testnet: bool,
}

impl Default for FriendlyFlags {
    fn default() -> Self {
        Self {
            bounceable: true,
            testnet: false,
        }
    }
}

impl Address {
    pub fn new(workchain: i8, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    /// Parse either form; user-friendly flags are discarded
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.contains(':') {
            Self::parse_raw(input)
        } else {
            Self::parse_friendly(input).map(|(addr, _)| addr)
        }
    }

    pub fn parse_raw(input: &str) -> Result<Self> {
        let (wc, hash_hex) = input
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("Invalid raw address: {}", input)))?;

        let workchain: i8 = wc
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid workchain in address: {}", input)))?;

        let hash_hex = hash_hex.strip_prefix("0x").unwrap_or(hash_hex);
        let bytes = hex::decode(hash_hex)
            .map_err(|_| Error::InvalidInput(format!("Invalid hash in address: {}", input)))?;
        let hash: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::InvalidInput(format!("Hash must be 32 bytes, got {}", b.len()))
        })?;

        Ok(Self { workchain, hash })
    }

    pub fn parse_friendly(input: &str) -> Result<(Self, FriendlyFlags)> {
        let normalized: String = input
            .trim_end_matches('=')
            .chars()
            .map(|c| match c {
                '+' => '-',
                '/' => '_',
                other => other,
            })
            .collect();

        let data = URL_SAFE_NO_PAD
            .decode(normalized.as_bytes())
            .map_err(|_| Error::InvalidInput(format!("Invalid address encoding: {}", input)))?;

        if data.len() != 36 {
            return Err(Error::InvalidInput(format!(
                "Invalid address length: {}, expected 36",
                data.len()
            )));
        }

        let expected = u16::from_be_bytes([data[34], data[35]]);
        if CRC16.checksum(&data[..34]) != expected {
            return Err(Error::InvalidInput(format!(
                "Invalid address checksum: {}",
                input
            )));
        }

        let tag = data[0];
        let flags = FriendlyFlags {
            bounceable: tag & !TAG_TESTNET == TAG_BOUNCEABLE,
            testnet: tag & TAG_TESTNET != 0,
        };
        if tag & !TAG_TESTNET != TAG_BOUNCEABLE && tag & !TAG_TESTNET != TAG_NON_BOUNCEABLE {
            return Err(Error::InvalidInput(format!("Unknown address tag: {:#04x}", tag)));
        }

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&data[2..34]);

        Ok((
            Self {
                workchain: data[1] as i8,
                hash,
            },
            flags,
        ))
    }

    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    /// User-friendly url-safe form
    pub fn to_friendly(&self, flags: FriendlyFlags) -> String {
        let mut data = [0u8; 36];
        data[0] = if flags.bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if flags.testnet {
            data[0] |= TAG_TESTNET;
        }
        data[1] = self.workchain as u8;
        data[2..34].copy_from_slice(&self.hash);
        let crc = CRC16.checksum(&data[..34]);
        data[34..].copy_from_slice(&crc.to_be_bytes());

        URL_SAFE_NO_PAD.encode(data)
    }

    /// User-friendly standard-base64 form (`+` and `/`)
    pub fn to_friendly_std(&self, flags: FriendlyFlags) -> String {
        let url_safe = self.to_friendly(flags);
        let bytes = URL_SAFE_NO_PAD
            .decode(url_safe.as_bytes())
            .unwrap_or_default();
        STANDARD.encode(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_raw())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

/// Check an address in either form
pub fn is_valid_address(input: &str) -> bool {
    Address::parse(input).is_ok()
}

/// Canonical raw form used for comparisons and as state keys.
///
/// Falls back to the lowercased input for strings that do not parse, so
/// opaque identifiers from the indexer still compare consistently.
pub fn canonical(input: &str) -> String {
    Address::parse(input)
        .map(|a| a.to_raw())
        .unwrap_or_else(|_| input.trim().to_lowercase())
}

/// Two addresses name the same account regardless of their encoding
pub fn same_account(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && canonical(a) == canonical(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "0:83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8";

    #[test]
    fn test_raw_friendly_round_trip() {
        let addr = Address::parse(RAW).unwrap();
        let friendly = addr.to_friendly(FriendlyFlags::default());
        assert_eq!(friendly.len(), 48);
        assert!(friendly.starts_with("EQ"));

        let (parsed, flags) = Address::parse_friendly(&friendly).unwrap();
        assert_eq!(parsed, addr);
        assert!(flags.bounceable);
        assert!(!flags.testnet);
        assert_eq!(parsed.to_raw(), RAW);
    }

    #[test]
    fn test_non_bounceable_and_testnet_tags() {
        let addr = Address::parse(RAW).unwrap();
        let flags = FriendlyFlags {
            bounceable: false,
            testnet: true,
        };
        let friendly = addr.to_friendly(flags);
        let (parsed, parsed_flags) = Address::parse_friendly(&friendly).unwrap();
        assert_eq!(parsed, addr);
        assert_eq!(parsed_flags, flags);

        let mainnet = addr.to_friendly(FriendlyFlags {
            bounceable: false,
            testnet: false,
        });
        assert!(mainnet.starts_with("UQ"));
    }

    #[test]
    fn test_standard_base64_accepted() {
        let addr = Address::parse(RAW).unwrap();
        let std_form = addr.to_friendly_std(FriendlyFlags::default());
        assert_eq!(Address::parse(&std_form).unwrap(), addr);
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let addr = Address::parse(RAW).unwrap();
        let mut friendly = addr.to_friendly(FriendlyFlags::default()).into_bytes();
        let last = friendly.len() - 1;
        friendly[last] = if friendly[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(friendly).unwrap();
        assert!(!is_valid_address(&tampered));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(!is_valid_address("alice"));
        assert!(!is_valid_address("0:1234"));
        assert!(!is_valid_address("x:83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8"));
        assert!(!is_valid_address(""));
        assert!(is_valid_address(
            "-1:3333333333333333333333333333333333333333333333333333333333333333"
        ));
    }

    #[test]
    fn test_same_account_across_formats() {
        let addr = Address::parse(RAW).unwrap();
        let friendly = addr.to_friendly(FriendlyFlags::default());
        assert!(same_account(RAW, &friendly));
        assert!(!same_account(RAW, ""));
        assert_eq!(canonical(&friendly), RAW);
    }
}
