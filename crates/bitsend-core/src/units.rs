//! Bitcoin unit handling.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Satoshis per bitcoin.
pub const SATS_PER_BTC: u64 = 100_000_000;

const BTC_DECIMALS: usize = 8;

/// Unit amounts of BTC-family coins are shown in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtcUnit {
    /// Decimal BTC with eight fractional digits.
    #[default]
    Default,
    /// Whole satoshis.
    Sat,
}

impl BtcUnit {
    /// Unit label for a coin ticker, e.g. `BTC` or `sat`.
    pub fn label(self, ticker: &str) -> String {
        match self {
            Self::Default => ticker.to_string(),
            Self::Sat => "sat".to_string(),
        }
    }
}

/// Format satoshis in the given unit.
pub fn format_sats(sats: u64, unit: BtcUnit) -> String {
    match unit {
        BtcUnit::Sat => sats.to_string(),
        BtcUnit::Default => format!(
            "{}.{:0width$}",
            sats / SATS_PER_BTC,
            sats % SATS_PER_BTC,
            width = BTC_DECIMALS
        ),
    }
}

/// Parse a user-entered amount into satoshis.
///
/// # Errors
///
/// Returns [`Error::InvalidAmount`] for empty, signed, malformed or
/// out-of-range input, and for more than eight fractional digits.
pub fn parse_amount(input: &str, unit: BtcUnit) -> Result<u64> {
    let input = input.trim();
    let invalid = || Error::InvalidAmount(input.to_string());

    if input.is_empty() {
        return Err(invalid());
    }

    match unit {
        BtcUnit::Sat => {
            if !input.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            input.parse().map_err(|_| invalid())
        }
        BtcUnit::Default => {
            let (whole, frac) = input.split_once('.').unwrap_or((input, ""));
            if whole.is_empty() && frac.is_empty() {
                return Err(invalid());
            }
            if frac.len() > BTC_DECIMALS
                || !whole.bytes().all(|b| b.is_ascii_digit())
                || !frac.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(invalid());
            }

            let whole: u64 = if whole.is_empty() {
                0
            } else {
                whole.parse().map_err(|_| invalid())?
            };
            let frac: u64 = if frac.is_empty() {
                0
            } else {
                format!("{frac:0<width$}", width = BTC_DECIMALS)
                    .parse()
                    .map_err(|_| invalid())?
            };

            whole
                .checked_mul(SATS_PER_BTC)
                .and_then(|sats| sats.checked_add(frac))
                .ok_or_else(invalid)
        }
    }
}

/// Millisatoshis to whole satoshis, rounding down.
pub const fn msat_to_sat(msat: u64) -> u64 {
    msat / 1000
}

/// Convert a decimal BTC float (as printed by bitcoind) to satoshis.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn btc_to_sats(btc: f64) -> u64 {
    (btc.abs() * SATS_PER_BTC as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_default_unit() {
        assert_eq!(format_sats(0, BtcUnit::Default), "0.00000000");
        assert_eq!(format_sats(12_345, BtcUnit::Default), "0.00012345");
        assert_eq!(format_sats(150_000_000, BtcUnit::Default), "1.50000000");
    }

    #[test]
    fn test_format_sat_unit() {
        assert_eq!(format_sats(12_345, BtcUnit::Sat), "12345");
    }

    #[test]
    fn test_parse_btc_decimal() {
        assert_eq!(parse_amount("1", BtcUnit::Default).unwrap(), 100_000_000);
        assert_eq!(parse_amount("0.5", BtcUnit::Default).unwrap(), 50_000_000);
        assert_eq!(parse_amount(".00000001", BtcUnit::Default).unwrap(), 1);
        assert_eq!(parse_amount(" 2. ", BtcUnit::Default).unwrap(), 200_000_000);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", ".", "-1", "1.000000001", "1,5", "abc", "1e3"] {
            assert!(parse_amount(bad, BtcUnit::Default).is_err(), "{bad}");
        }
        assert!(parse_amount("1.5", BtcUnit::Sat).is_err());
        assert!(parse_amount("99999999999999999999", BtcUnit::Sat).is_err());
    }

    #[test]
    fn test_parse_sats() {
        assert_eq!(parse_amount("21000", BtcUnit::Sat).unwrap(), 21_000);
    }

    #[test]
    fn test_msat_to_sat() {
        assert_eq!(msat_to_sat(1_999), 1);
        assert_eq!(msat_to_sat(0), 0);
    }

    #[test]
    fn test_btc_to_sats() {
        assert_eq!(btc_to_sats(0.000_012_34), 1_234);
        assert_eq!(btc_to_sats(-0.5), 50_000_000);
    }
}
