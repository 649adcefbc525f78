//! Fixed-point amount codec
//!
//! The chain stores balances as integers scaled by 10^18. The model holds them
//! as exact [`Decimal`] values. A `Decimal` carries at most 28 significant
//! digits, so [`from_wire`] is exact for any amount below ~7.9 * 10^10 tokens
//! and rounds off the least significant fractional digits above that.
//!
//! Interest rates are annual percentages on the model side and integer basis
//! points on the wire; precision beyond two decimal places of a percent is lost.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::constants::CHAIN_DECIMALS;
use crate::{Error, Result};

/// Largest mantissa a `Decimal` can hold (2^96 - 1)
const MAX_MANTISSA: u128 = 79_228_162_514_264_337_593_543_950_335;

/// Largest scale a `Decimal` can hold
const MAX_SCALE: u32 = 28;

/// Convert a token amount to its on-chain integer representation (18 decimals)
pub fn to_wire(amount: Decimal) -> Result<u128> {
    to_wire_with_decimals(amount, CHAIN_DECIMALS)
}

/// Convert a token amount to an integer scaled by `10^decimals`.
///
/// Digits beyond `decimals` are rounded half-to-even.
pub fn to_wire_with_decimals(amount: Decimal, decimals: u32) -> Result<u128> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(Error::invalid_amount(format!(
            "amount must not be negative, got {}",
            amount
        )));
    }

    let rounded = amount.round_dp(decimals);
    let mantissa = rounded.mantissa().unsigned_abs();
    let factor = 10u128
        .checked_pow(decimals - rounded.scale())
        .ok_or_else(|| overflow(amount, decimals))?;

    mantissa
        .checked_mul(factor)
        .ok_or_else(|| overflow(amount, decimals))
}

/// Convert an on-chain integer (18 decimals) back to a token amount
pub fn from_wire(raw: u128) -> Result<Decimal> {
    from_wire_with_decimals(raw, CHAIN_DECIMALS)
}

/// Convert an integer scaled by `10^decimals` back to a token amount.
///
/// Low-order digits that do not fit a `Decimal` are rounded half-to-even.
/// Fails only when the integer part alone exceeds `Decimal::MAX`.
pub fn from_wire_with_decimals(raw: u128, decimals: u32) -> Result<Decimal> {
    let mut dropped = decimals.saturating_sub(MAX_SCALE);

    loop {
        let divisor = 10u128
            .checked_pow(dropped)
            .ok_or_else(|| wire_overflow(raw, decimals))?;
        let mut quotient = raw / divisor;
        let remainder = raw % divisor;
        if dropped > 0 {
            let half = divisor / 2;
            if remainder > half || (remainder == half && quotient % 2 == 1) {
                quotient += 1;
            }
        }

        if quotient <= MAX_MANTISSA && dropped <= decimals {
            let value = Decimal::try_from_i128_with_scale(quotient as i128, decimals - dropped)
                .map_err(|_| wire_overflow(raw, decimals))?;
            return Ok(value.normalize());
        }
        if dropped >= decimals {
            return Err(wire_overflow(raw, decimals));
        }
        dropped += 1;
    }
}

/// Convert an annual percentage rate to integer basis points (5.0 -> 500)
pub fn rate_to_basis_points(rate: Decimal) -> Result<u32> {
    if rate.is_sign_negative() && !rate.is_zero() {
        return Err(Error::invalid_amount(format!(
            "interest rate must not be negative, got {}",
            rate
        )));
    }

    rate.checked_mul(Decimal::ONE_HUNDRED)
        .map(|bp| bp.round())
        .and_then(|bp| bp.to_u32())
        .ok_or_else(|| Error::invalid_amount(format!("interest rate {} out of range", rate)))
}

/// Convert integer basis points back to an annual percentage rate (500 -> 5.00)
pub fn basis_points_to_rate(bp: u32) -> Decimal {
    Decimal::new(bp as i64, 2)
}

fn overflow(amount: Decimal, decimals: u32) -> Error {
    Error::invalid_amount(format!(
        "amount {} does not fit a 128-bit integer at {} decimals",
        amount, decimals
    ))
}

fn wire_overflow(raw: u128, decimals: u32) -> Error {
    Error::invalid_amount(format!(
        "on-chain value {} at {} decimals exceeds the decimal range",
        raw, decimals
    ))
}

/// Serde adapter for on-chain integer amounts.
///
/// Accepts a JSON number, a decimal string, or a `0x`-prefixed hex string.
/// Serializes as a decimal string so values above 2^53 survive JSON tooling.
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct RawOrder {
///     #[serde(with = "wire_amount")]
///     principal: u128,
/// }
/// ```
pub mod wire_amount {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    /// Largest integer an f64 represents exactly
    const MAX_SAFE_FLOAT: f64 = 9_007_199_254_740_992.0;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        deserializer.deserialize_any(WireAmountVisitor)
    }

    /// Parse a textual wire amount (decimal or 0x-hex)
    pub fn parse(s: &str) -> Result<u128, String> {
        let s = s.trim();
        if let Some(hex_digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            if hex_digits.is_empty() {
                return Ok(0);
            }
            u128::from_str_radix(hex_digits, 16)
                .map_err(|e| format!("invalid hex amount {}: {}", s, e))
        } else {
            s.replace('_', "")
                .parse::<u128>()
                .map_err(|e| format!("invalid amount {}: {}", s, e))
        }
    }

    struct WireAmountVisitor;

    impl<'de> Visitor<'de> for WireAmountVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer, decimal string, or 0x-hex string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(v as u128)
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative amount {}", v)))
        }

        fn visit_i128<E: de::Error>(self, v: i128) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative amount {}", v)))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u128, E> {
            if v < 0.0 || v.fract() != 0.0 || v > MAX_SAFE_FLOAT {
                return Err(E::custom(format!(
                    "amount {} is not an exact non-negative integer",
                    v
                )));
            }
            Ok(v as u128)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            parse(v).map_err(E::custom)
        }
    }

    /// Same as the parent module for `Option<u128>`; `null` and missing map to `None`
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<u128>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u128>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] u128);

            let value: Option<Wrapper> = Option::deserialize(deserializer)?;
            Ok(value.map(|Wrapper(v)| v))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde::{Deserialize, Serialize};

    #[test]
    fn test_to_wire() {
        assert_eq!(to_wire(dec!(1000)).unwrap(), 1_000 * 10u128.pow(18));
        assert_eq!(to_wire(dec!(0.5)).unwrap(), 5 * 10u128.pow(17));
        assert_eq!(to_wire(Decimal::ZERO).unwrap(), 0);
        assert_eq!(to_wire(dec!(0.000000000000000001)).unwrap(), 1);
    }

    #[test]
    fn test_to_wire_rounds_half_even() {
        assert_eq!(to_wire_with_decimals(dec!(1.25), 1).unwrap(), 12);
        assert_eq!(to_wire_with_decimals(dec!(1.35), 1).unwrap(), 14);
        assert_eq!(to_wire_with_decimals(dec!(1.351), 1).unwrap(), 14);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let err = to_wire(dec!(-1)).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount { .. }));
    }

    #[test]
    fn test_round_trip_exact_up_to_18_places() {
        for amount in [
            dec!(1000),
            dec!(123.456),
            dec!(0.000000000000000001),
            dec!(98765.432109876543210987),
            dec!(1.0000000000000000005),
            dec!(2.1234567890123456789),
        ] {
            let back = from_wire(to_wire(amount).unwrap()).unwrap();
            if amount.scale() <= 18 {
                assert_eq!(back, amount);
            } else {
                assert!((back - amount).abs() <= dec!(0.000000000000000001));
            }
        }
    }

    #[test]
    fn test_from_wire_large_value_rounds_low_digits() {
        // 10^12 tokens plus one base unit: 31 significant digits
        let raw = 10u128.pow(30) + 1;
        let value = from_wire(raw).unwrap();
        assert_eq!(value, dec!(1000000000000));
    }

    #[test]
    fn test_from_wire_max_u128() {
        let value = from_wire(u128::MAX).unwrap();
        assert!(value > dec!(340282366920938463463));
    }

    #[test]
    fn test_rate_conversion() {
        assert_eq!(rate_to_basis_points(dec!(5.0)).unwrap(), 500);
        assert_eq!(rate_to_basis_points(dec!(7.25)).unwrap(), 725);
        assert_eq!(rate_to_basis_points(dec!(0)).unwrap(), 0);
        assert_eq!(basis_points_to_rate(500), dec!(5.00));
        assert_eq!(
            basis_points_to_rate(rate_to_basis_points(dec!(12.34)).unwrap()),
            dec!(12.34)
        );
        assert!(rate_to_basis_points(dec!(-0.5)).is_err());
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Record {
        #[serde(with = "wire_amount")]
        amount: u128,
        #[serde(default, with = "wire_amount::option")]
        extra: Option<u128>,
    }

    #[test]
    fn test_wire_amount_accepts_number_string_and_hex() {
        let r: Record = serde_json::from_str(r#"{"amount": 42}"#).unwrap();
        assert_eq!(r.amount, 42);
        assert_eq!(r.extra, None);

        let r: Record =
            serde_json::from_str(r#"{"amount": "1000000000000000000000", "extra": "0x10"}"#)
                .unwrap();
        assert_eq!(r.amount, 1_000 * 10u128.pow(18));
        assert_eq!(r.extra, Some(16));

        assert!(serde_json::from_str::<Record>(r#"{"amount": -3}"#).is_err());
        assert!(serde_json::from_str::<Record>(r#"{"amount": "ten"}"#).is_err());
    }

    #[test]
    fn test_wire_amount_serializes_as_string() {
        let r = Record {
            amount: u128::MAX,
            extra: None,
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["amount"], serde_json::json!(u128::MAX.to_string()));
    }
}
