//! 48-bit floating point encoding of the F register.
//!
//! Layout, most significant bit first: sign (1), exponent (15, biased by
//! 16383), fraction (32, hidden leading one).

use crate::{Error, Result};

pub const EXPONENT_BIAS: i64 = 16383;
const EXPONENT_MAX: u64 = 0x7FFF;
const FRACTION_BITS: u32 = 32;
const FRACTION_MASK: u64 = 0xFFFF_FFFF;

/// Encodes a decimal string into the raw 48-bit pattern.
///
/// Values too large for the exponent field saturate to the largest pattern
/// with the same sign; values too small flush to zero.
pub fn encode(decimal: &str) -> Result<u64> {
    let value: f64 = decimal
        .trim()
        .parse()
        .map_err(|_| Error::InvalidFloat(decimal.to_string()))?;
    if value.is_nan() {
        return Err(Error::InvalidFloat(decimal.to_string()));
    }
    Ok(encode_f64(value))
}

pub fn encode_f64(value: f64) -> u64 {
    let bits = value.to_bits();
    let sign = bits >> 63;
    let saturated = (sign << 47) | (EXPONENT_MAX << FRACTION_BITS) | FRACTION_MASK;

    if value.is_infinite() {
        return saturated;
    }
    if value == 0.0 {
        return 0;
    }

    let raw_exponent = ((bits >> 52) & 0x7FF) as i64;
    let mut fraction = bits & ((1u64 << 52) - 1);
    let mut exponent = if raw_exponent == 0 {
        // subnormal: shift the leading one into the hidden position
        let shift = fraction.leading_zeros() as i64 - 11;
        fraction = (fraction << shift) & ((1u64 << 52) - 1);
        -1022 - shift
    } else {
        raw_exponent - 1023
    };

    // round the 52-bit fraction to 32 bits, carrying into the exponent
    let mut fraction32 = (fraction + (1 << 19)) >> 20;
    if fraction32 > FRACTION_MASK {
        fraction32 = 0;
        exponent += 1;
    }

    let biased = exponent + EXPONENT_BIAS;
    if biased >= EXPONENT_MAX as i64 {
        return saturated;
    }
    if biased <= 0 {
        return 0;
    }
    (sign << 47) | ((biased as u64) << FRACTION_BITS) | fraction32
}

/// Formats the raw pattern as `0x` plus twelve upper-case hex digits.
pub fn to_hex(raw: u64) -> String {
    format!("0x{:012X}", raw & 0xFFFF_FFFF_FFFF)
}

pub fn decimal_to_hex(decimal: &str) -> Result<String> {
    encode(decimal).map(to_hex)
}

/// Splits a raw pattern into `(sign, biased exponent, fraction)`.
pub fn decompose(raw: u64) -> (u8, u16, u32) {
    (
        ((raw >> 47) & 1) as u8,
        ((raw >> FRACTION_BITS) & EXPONENT_MAX) as u16,
        (raw & FRACTION_MASK) as u32,
    )
}

pub fn parse_hex(text: &str) -> Result<u64> {
    let digits = text
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u64::from_str_radix(digits, 16).map_err(|_| Error::InvalidFloat(text.to_string()))
}

pub fn decode(raw: u64) -> f64 {
    let (sign, exponent, fraction) = decompose(raw);
    if exponent == 0 && fraction == 0 {
        return if sign == 1 { -0.0 } else { 0.0 };
    }
    let mantissa = 1.0 + fraction as f64 / (1u64 << FRACTION_BITS) as f64;
    let magnitude = mantissa * 2f64.powi((exponent as i64 - EXPONENT_BIAS) as i32);
    if sign == 1 {
        -magnitude
    } else {
        magnitude
    }
}
