//! IEEE 754 half-precision encoding for float immediates.
//!
//! Layout: 1 sign bit, 5 exponent bits (bias 15), 10 fraction bits. Rounding
//! is to nearest with ties to even. Exponent `0x1F` is reserved for infinity
//! and NaN.

const SIGN: u16 = 0x8000;
const INFINITY: u16 = 0x7C00;
const NAN: u16 = 0x7E00;

const F64_FRACTION_BITS: u32 = 52;
const F64_BIAS: i32 = 1023;
const HALF_FRACTION_BITS: u32 = 10;
const HALF_BIAS: i32 = 15;

/// Encode `value` as a 16-bit half-precision word.
pub fn encode(value: f64) -> u16 {
  let sign = if value.is_sign_negative() { SIGN } else { 0 };
  if value.is_nan() {
    return NAN;
  }
  if value.is_infinite() {
    return sign | INFINITY;
  }
  if value == 0.0 {
    return sign;
  }

  let bits = value.abs().to_bits();
  let raw_exponent = ((bits >> F64_FRACTION_BITS) & 0x7FF) as i32;
  let fraction = bits & ((1u64 << F64_FRACTION_BITS) - 1);

  // f64 subnormals are far below the half range.
  if raw_exponent == 0 {
    return sign;
  }

  let mantissa = fraction | (1u64 << F64_FRACTION_BITS);
  let exponent = raw_exponent - F64_BIAS + HALF_BIAS;

  if exponent >= 0x1F {
    return sign | INFINITY;
  }

  if exponent <= 0 {
    // Subnormal: value = q * 2^-24.
    let shift = (F64_FRACTION_BITS - HALF_FRACTION_BITS) as i32 + 1 - exponent;
    if shift > F64_FRACTION_BITS as i32 + 1 {
      return sign;
    }
    let q = round_shift(mantissa, shift as u32);
    // A carry into bit 10 lands on the smallest normal, which is the right encoding.
    return sign | q as u16;
  }

  // q keeps the implicit leading bit; a rounding carry out of the fraction
  // adds one to the exponent field, possibly reaching infinity.
  let q = round_shift(mantissa, F64_FRACTION_BITS - HALF_FRACTION_BITS);
  let encoded = ((exponent as u64) << HALF_FRACTION_BITS) + (q - (1u64 << HALF_FRACTION_BITS));
  if encoded >= u64::from(INFINITY) {
    return sign | INFINITY;
  }
  sign | encoded as u16
}

/// Shift `value` right by `shift` bits rounding to nearest, ties to even.
fn round_shift(value: u64, shift: u32) -> u64 {
  if shift == 0 {
    return value;
  }
  let quotient = value >> shift;
  let remainder = value & ((1u64 << shift) - 1);
  let halfway = 1u64 << (shift - 1);
  if remainder > halfway || (remainder == halfway && quotient & 1 == 1) {
    quotient + 1
  } else {
    quotient
  }
}
