//! Exact decimal adjustment of integer base units

use serde::{Deserialize, Serialize};

/// Nanotons per TON
pub const TON_DECIMALS: u8 = 9;

/// An asset amount in base units plus its human-readable decimal value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// Asset symbol ("TON", "USDT", ...)
    pub asset: String,
    /// Decimal-adjusted value, e.g. "1.5"
    pub value: String,
    /// Integer base units as reported by the chain
    pub raw: String,
    pub decimals: u8,
}

impl Amount {
    pub fn new(asset: impl Into<String>, raw: impl Into<String>, decimals: u8) -> Self {
        let raw = raw.into();
        Self {
            asset: asset.into(),
            value: format_units(&raw, decimals),
            raw,
            decimals,
        }
    }

    pub fn ton(nano: i64) -> Self {
        Self::new("TON", nano.to_string(), TON_DECIMALS)
    }
}

/// Format an integer string of base units with `decimals` fractional digits.
///
/// Trailing fractional zeros are trimmed. Input that is not an integer is
/// returned unchanged.
pub fn format_units(raw: &str, decimals: u8) -> String {
    let raw = raw.trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return raw.to_string();
    }

    let digits = digits.trim_start_matches('0');
    let decimals = decimals as usize;

    let (int_part, frac_part) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        (
            "0".to_string(),
            format!("{}{}", "0".repeat(decimals - digits.len()), digits),
        )
    };

    let frac = frac_part.trim_end_matches('0');
    let mut out = if frac.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac)
    };

    if negative && out != "0" {
        out.insert(0, '-');
    }
    out
}

/// Lossy conversion for USD estimates only
pub fn units_to_f64(raw: &str, decimals: u8) -> Option<f64> {
    format_units(raw, decimals).parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        assert_eq!(format_units("1500000000", 9), "1.5");
        assert_eq!(format_units("1000000000", 9), "1");
        assert_eq!(format_units("1", 9), "0.000000001");
        assert_eq!(format_units("0", 9), "0");
        assert_eq!(format_units("", 9), "");
        assert_eq!(format_units("123456", 6), "0.123456");
        assert_eq!(format_units("123456", 0), "123456");
        assert_eq!(format_units("-250000000", 9), "-0.25");
        assert_eq!(format_units("abc", 9), "abc");
    }

    #[test]
    fn test_amount_constructors() {
        let amount = Amount::ton(2_000_000_001);
        assert_eq!(amount.asset, "TON");
        assert_eq!(amount.value, "2.000000001");
        assert_eq!(amount.raw, "2000000001");

        let usdt = Amount::new("USDT", "5000000", 6);
        assert_eq!(usdt.value, "5");
        assert_eq!(units_to_f64(&usdt.raw, 6), Some(5.0));
    }
}
