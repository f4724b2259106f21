//! Hex quantity and denomination helpers.
//!
//! Conversions between ether and wei work on decimal strings so amounts
//! survive the round trip exactly; the chain's 18-decimal fixed point does
//! not fit binary floats.

use alloy::primitives::U256;

use crate::domain::{AppError, ConfigError};

const WEI_PER_ETHER_DECIMALS: usize = 18;

/// Render a quantity as a minimal hex string; zero is `"0x0"`.
#[must_use]
pub fn number_to_hex(value: u64) -> String {
    if value == 0 {
        "0x0".to_string()
    } else {
        format!("0x{:x}", value)
    }
}

/// Render a 256-bit quantity as a minimal hex string; zero is `"0x0"`.
#[must_use]
pub fn u256_to_hex(value: U256) -> String {
    if value.is_zero() {
        "0x0".to_string()
    } else {
        format!("0x{:x}", value)
    }
}

/// Parse a hex quantity (`0x` prefix optional) into `u64`.
pub fn hex_to_number(hex: &str) -> Result<u64, AppError> {
    let trimmed = strip_hex_prefix(hex);
    u64::from_str_radix(trimmed, 16)
        .map_err(|e| ConfigError::invalid("hex quantity", format!("{}: {}", hex, e)).into())
}

/// Parse a hex quantity (`0x` prefix optional) into `U256`.
pub fn hex_to_u256(hex: &str) -> Result<U256, AppError> {
    let trimmed = strip_hex_prefix(hex);
    U256::from_str_radix(trimmed, 16)
        .map_err(|e| ConfigError::invalid("hex quantity", format!("{}: {}", hex, e)).into())
}

/// Convert a decimal ether amount (`"0.1"`, `"2"`, `"1.000000000000000001"`)
/// into wei. Fails on more than 18 fractional digits.
pub fn ether_to_wei(ether: &str) -> Result<U256, AppError> {
    let ether = ether.trim();
    let (int_part, frac_part) = match ether.split_once('.') {
        Some((i, f)) => (i, f),
        None => (ether, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(ConfigError::invalid("ether amount", "empty value").into());
    }
    if frac_part.len() > WEI_PER_ETHER_DECIMALS {
        return Err(ConfigError::invalid(
            "ether amount",
            format!("{} exceeds 18 decimal places", ether),
        )
        .into());
    }

    let int_str = if int_part.is_empty() { "0" } else { int_part };
    let int_wei = parse_decimal(int_str)?
        .checked_mul(wei_per_ether())
        .ok_or_else(|| {
            AppError::from(ConfigError::invalid("ether amount", "overflows 256 bits"))
        })?;

    let mut padded = frac_part.to_string();
    while padded.len() < WEI_PER_ETHER_DECIMALS {
        padded.push('0');
    }
    let frac_wei = if padded.is_empty() {
        U256::ZERO
    } else {
        parse_decimal(&padded)?
    };

    Ok(int_wei + frac_wei)
}

/// Convert wei into a decimal ether string with trailing zeros trimmed,
/// e.g. `100000000000000000 → "0.1"`.
#[must_use]
pub fn wei_to_ether(wei: U256) -> String {
    let divisor = wei_per_ether();
    let int_part = wei / divisor;
    let frac_part = wei % divisor;

    if frac_part.is_zero() {
        return int_part.to_string();
    }

    let mut frac = format!("{:0>width$}", frac_part, width = WEI_PER_ETHER_DECIMALS);
    while frac.ends_with('0') {
        frac.pop();
    }
    format!("{}.{}", int_part, frac)
}

/// Convert a hex wei quantity straight to a decimal ether string.
pub fn hex_to_ether(hex: &str) -> Result<String, AppError> {
    Ok(wei_to_ether(hex_to_u256(hex)?))
}

/// Extract the 20-byte address from a 32-byte ABI word, lower-cased with a
/// `0x` prefix.
pub fn format_address(word: &str) -> Result<String, AppError> {
    let trimmed = strip_hex_prefix(word);
    if trimmed.len() < 64 {
        return Err(ConfigError::invalid(
            "address word",
            format!("expected 32 bytes, got {} hex chars", trimmed.len()),
        )
        .into());
    }
    Ok(format!("0x{}", trimmed[24..64].to_lowercase()))
}

fn strip_hex_prefix(hex: &str) -> &str {
    hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")).unwrap_or(hex)
}

fn parse_decimal(value: &str) -> Result<U256, AppError> {
    U256::from_str_radix(value, 10)
        .map_err(|e| ConfigError::invalid("decimal quantity", format!("{}: {}", value, e)).into())
}

fn wei_per_ether() -> U256 {
    U256::from(10_u64).pow(U256::from(WEI_PER_ETHER_DECIMALS as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_to_hex() {
        assert_eq!(number_to_hex(0), "0x0");
        assert_eq!(number_to_hex(256), "0x100");
        assert_eq!(u256_to_hex(U256::ZERO), "0x0");
        assert_eq!(u256_to_hex(U256::from(256)), "0x100");
    }

    #[test]
    fn test_hex_to_number() {
        assert_eq!(hex_to_number("0x100").unwrap(), 256);
        assert_eq!(hex_to_number("100").unwrap(), 256);
        assert_eq!(hex_to_number("0x0").unwrap(), 0);
        assert!(hex_to_number("0xzz").is_err());
    }

    #[test]
    fn test_ether_to_wei() {
        assert_eq!(
            ether_to_wei("0.1").unwrap(),
            U256::from(100_000_000_000_000_000_u64)
        );
        assert_eq!(
            ether_to_wei("1").unwrap(),
            U256::from(1_000_000_000_000_000_000_u64)
        );
        assert_eq!(ether_to_wei("0").unwrap(), U256::ZERO);
        assert_eq!(
            ether_to_wei("1.000000000000000001").unwrap(),
            U256::from(1_000_000_000_000_000_001_u64)
        );
        assert!(ether_to_wei("0.0000000000000000001").is_err());
        assert!(ether_to_wei("").is_err());
    }

    #[test]
    fn test_wei_to_ether() {
        assert_eq!(wei_to_ether(U256::from(100_000_000_000_000_000_u64)), "0.1");
        assert_eq!(wei_to_ether(U256::from(1_000_000_000_000_000_000_u64)), "1");
        assert_eq!(wei_to_ether(U256::ZERO), "0");
        assert_eq!(
            wei_to_ether(U256::from(1_000_000_000_000_000_001_u64)),
            "1.000000000000000001"
        );
    }

    #[test]
    fn test_ether_wei_round_trip() {
        for amount in ["0.1", "12.345", "0.000000000000000001", "1000000"] {
            assert_eq!(wei_to_ether(ether_to_wei(amount).unwrap()), amount);
        }
    }

    #[test]
    fn test_hex_to_ether() {
        assert_eq!(hex_to_ether("0x16345785d8a0000").unwrap(), "0.1");
    }

    #[test]
    fn test_format_address() {
        let word = "0x000000000000000000000000ac05d75850dfed2d94a940fcb60b038818ad9a7e";
        assert_eq!(
            format_address(word).unwrap(),
            "0xac05d75850dfed2d94a940fcb60b038818ad9a7e"
        );

        let upper = "0x000000000000000000000000AC05D75850DFED2D94A940FCB60B038818AD9A7E";
        assert_eq!(
            format_address(upper).unwrap(),
            "0xac05d75850dfed2d94a940fcb60b038818ad9a7e"
        );

        assert!(format_address("0x1234").is_err());
    }
}
