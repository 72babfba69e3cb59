//! Wallet contract versions and address derivation
//!
//! A wallet address is the representation hash of its `StateInit` cell:
//! `StateInit { code: ^WalletCode, data: ^InitialData }`. Only the code cell's
//! hash and depth are needed, so they are kept as constants per version.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::address::Address;
use crate::error::{Error, Result};

/// Default subwallet id for workchain 0
pub const DEFAULT_SUBWALLET_ID: u32 = 698_983_191;

/// 84dafa44...d599, a single cell
const WALLET_V3R2_CODE_HASH: [u8; 32] = [
    0x84, 0xda, 0xfa, 0x44, 0x9f, 0x98, 0xa6, 0x98,
    0x77, 0x89, 0xba, 0x23, 0x23, 0x58, 0x07, 0x2b,
    0xc0, 0xf7, 0x6d, 0xc4, 0x52, 0x40, 0x02, 0xa5,
    0xd0, 0x91, 0x8b, 0x9a, 0x75, 0xd2, 0xd5, 0x99,
];

/// feb5ff68...d5c0
const WALLET_V4R2_CODE_HASH: [u8; 32] = [
    0xfe, 0xb5, 0xff, 0x68, 0x20, 0xe2, 0xff, 0x0d,
    0x94, 0x83, 0xe7, 0xe0, 0xd6, 0x2c, 0x81, 0x7d,
    0x84, 0x67, 0x89, 0xfb, 0x4a, 0xe5, 0x80, 0xc8,
    0x78, 0x86, 0x6d, 0x95, 0x9d, 0xab, 0xd5, 0xc0,
];

/// Wallet contract version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WalletVersion {
    V3R2,
    #[default]
    V4R2,
}

impl WalletVersion {
    pub const ALL: [WalletVersion; 2] = [WalletVersion::V3R2, WalletVersion::V4R2];

    /// Representation hash of the contract code cell
    fn code_hash(&self) -> &'static [u8; 32] {
        match self {
            WalletVersion::V3R2 => &WALLET_V3R2_CODE_HASH,
            WalletVersion::V4R2 => &WALLET_V4R2_CODE_HASH,
        }
    }

    /// Depth of the contract code cell tree
    fn code_depth(&self) -> u16 {
        match self {
            WalletVersion::V3R2 => 0,
            WalletVersion::V4R2 => 7,
        }
    }

    /// Initial data cell bits: seqno, subwallet id, public key and, for v4,
    /// an empty plugin dictionary bit
    fn data_bits(&self, public_key: &[u8; 32]) -> BitString {
        let mut bits = BitString::default();
        bits.push_u32(0);
        bits.push_u32(DEFAULT_SUBWALLET_ID);
        bits.push_bytes(public_key);
        if *self == WalletVersion::V4R2 {
            bits.push_bit(false);
        }
        bits
    }

    /// Address of this wallet contract for `public_key` on `workchain`
    pub fn address(&self, public_key: &[u8; 32], workchain: i8) -> Address {
        let data = Cell::leaf(self.data_bits(public_key));

        // split_depth: 0, special: 0, code: 1, data: 1, library: 0
        let mut state_bits = BitString::default();
        for bit in [false, false, true, true, false] {
            state_bits.push_bit(bit);
        }

        let state_init = Cell {
            bits: state_bits,
            refs: vec![
                CellRef {
                    hash: *self.code_hash(),
                    depth: self.code_depth(),
                },
                data.as_ref(),
            ],
        };

        Address::new(workchain, state_init.hash())
    }
}

impl fmt::Display for WalletVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletVersion::V3R2 => write!(f, "v3r2"),
            WalletVersion::V4R2 => write!(f, "v4r2"),
        }
    }
}

impl FromStr for WalletVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "v3r2" => Ok(WalletVersion::V3R2),
            "v4r2" => Ok(WalletVersion::V4R2),
            other => Err(Error::InvalidInput(format!(
                "Unsupported wallet version: {} (expected v3r2 or v4r2)",
                other
            ))),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct BitString {
    bytes: Vec<u8>,
    len: usize,
}

impl BitString {
    fn push_bit(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> (self.len % 8);
        }
        self.len += 1;
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            for i in 0..8 {
                self.push_bit(byte & (0x80 >> i) != 0);
            }
        }
    }

    fn push_u32(&mut self, value: u32) {
        self.push_bytes(&value.to_be_bytes());
    }

    /// Bytes with the completion tag appended when not byte-aligned
    fn padded(&self) -> Vec<u8> {
        let mut out = self.bytes.clone();
        if self.len % 8 != 0 {
            let last = out.len() - 1;
            out[last] |= 0x80 >> (self.len % 8);
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
struct CellRef {
    hash: [u8; 32],
    depth: u16,
}

/// Ordinary cell, just enough to compute representation hashes
#[derive(Debug, Clone)]
struct Cell {
    bits: BitString,
    refs: Vec<CellRef>,
}

impl Cell {
    fn leaf(bits: BitString) -> Self {
        Self {
            bits,
            refs: Vec::new(),
        }
    }

    fn depth(&self) -> u16 {
        self.refs
            .iter()
            .map(|r| r.depth + 1)
            .max()
            .unwrap_or(0)
    }

    fn hash(&self) -> [u8; 32] {
        let d1 = self.refs.len() as u8;
        let d2 = (self.bits.len / 8 + self.bits.len.div_ceil(8)) as u8;

        let mut hasher = Sha256::new();
        hasher.update([d1, d2]);
        hasher.update(self.bits.padded());
        for r in &self.refs {
            hasher.update(r.depth.to_be_bytes());
        }
        for r in &self.refs {
            hasher.update(r.hash);
        }
        hasher.finalize().into()
    }

    fn as_ref(&self) -> CellRef {
        CellRef {
            hash: self.hash(),
            depth: self.depth(),
        }
    }
}
