//! DECFLOAT and INT128 wire values
//!
//! DECFLOAT(16) and DECFLOAT(34) travel as IEEE 754-2008 decimal64 and
//! decimal128 in the DPD interchange encoding:
//!
//! ```text
//! | sign | combination (5) | exponent continuation (w) | coefficient declets |
//! ```
//!
//! The combination field carries the two exponent MSBs and the leading
//! coefficient digit, or flags Infinity/NaN.

use num_bigint::BigInt;
use num_traits::Signed;

use super::dpd::DenselyPackedDecimal;
use crate::error::{Error, Result};

/// Layout of one decimal interchange format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalFormat {
    /// Encoded size in bytes
    pub bytes: usize,
    /// Coefficient precision in digits
    pub digits: usize,
    /// Width of the exponent continuation
    pub exponent_bits: u32,
    /// Exponent bias
    pub bias: i32,
}

/// decimal64, used by DECFLOAT(16)
pub const DECIMAL64: DecimalFormat = DecimalFormat {
    bytes: 8,
    digits: 16,
    exponent_bits: 8,
    bias: 398,
};

/// decimal128, used by DECFLOAT(34)
pub const DECIMAL128: DecimalFormat = DecimalFormat {
    bytes: 16,
    digits: 34,
    exponent_bits: 12,
    bias: 6176,
};

/// A decoded decimal floating point value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decimal {
    /// `coefficient * 10^exponent`; negative zero decodes as zero
    Finite { coefficient: BigInt, exponent: i32 },
    /// Positive or negative infinity
    Infinity { negative: bool },
    /// Quiet or signaling NaN
    NaN { negative: bool, signaling: bool },
}

impl Decimal {
    /// Finite value from coefficient and exponent
    pub fn new(coefficient: impl Into<BigInt>, exponent: i32) -> Self {
        Decimal::Finite {
            coefficient: coefficient.into(),
            exponent,
        }
    }
}

impl DecimalFormat {
    fn total_bits(&self) -> u32 {
        self.bytes as u32 * 8
    }

    fn max_biased_exponent(&self) -> i32 {
        (3 << self.exponent_bits) - 1
    }

    /// Smallest representable exponent
    pub fn min_exponent(&self) -> i32 {
        -self.bias
    }

    /// Largest representable exponent
    pub fn max_exponent(&self) -> i32 {
        self.max_biased_exponent() - self.bias
    }

    /// Encode a value into the interchange format
    pub fn encode(&self, value: &Decimal) -> Result<Vec<u8>> {
        let top = self.total_bits() - 1;
        let comb_shift = top - 5;
        let exp_shift = comb_shift - self.exponent_bits;
        let mut bits: u128 = 0;
        match value {
            Decimal::Infinity { negative } => {
                bits |= (*negative as u128) << top;
                bits |= 0b11110 << comb_shift;
                return Ok(self.to_bytes(bits));
            }
            Decimal::NaN { negative, signaling } => {
                bits |= (*negative as u128) << top;
                bits |= 0b11111 << comb_shift;
                bits |= (*signaling as u128) << (comb_shift - 1);
                return Ok(self.to_bytes(bits));
            }
            Decimal::Finite {
                coefficient,
                exponent,
            } => {
                if *exponent < self.min_exponent() || *exponent > self.max_exponent() {
                    return Err(Error::protocol(format!(
                        "exponent {} outside {}..={}",
                        exponent,
                        self.min_exponent(),
                        self.max_exponent()
                    )));
                }
                let biased = (*exponent + self.bias) as u128;
                let msb = biased >> self.exponent_bits;
                let continuation = biased & ((1u128 << self.exponent_bits) - 1);

                let codec = DenselyPackedDecimal::new(self.digits)?;
                let mut out = vec![0u8; self.bytes];
                let first = codec.encode(coefficient, &mut out)? as u128;
                let combination = if first < 8 {
                    (msb << 3) | first
                } else {
                    0b11000 | (msb << 1) | (first & 1)
                };
                bits |= (coefficient.is_negative() as u128) << top;
                bits |= combination << comb_shift;
                bits |= continuation << exp_shift;
                // Declets and the high fields occupy disjoint bits
                for (byte, high) in out.iter_mut().zip(self.to_bytes(bits)) {
                    *byte |= high;
                }
                Ok(out)
            }
        }
    }

    /// Decode a value from the interchange format
    pub fn decode(&self, bytes: &[u8]) -> Result<Decimal> {
        if bytes.len() != self.bytes {
            return Err(Error::protocol(format!(
                "decimal needs {} bytes, got {}",
                self.bytes,
                bytes.len()
            )));
        }
        let bits = bytes.iter().fold(0u128, |acc, b| (acc << 8) | *b as u128);
        let top = self.total_bits() - 1;
        let comb_shift = top - 5;
        let exp_shift = comb_shift - self.exponent_bits;
        let negative = (bits >> top) & 1 == 1;
        let combination = (bits >> comb_shift) & 0b11111;

        if combination >> 1 == 0b1111 {
            return Ok(if combination & 1 == 0 {
                Decimal::Infinity { negative }
            } else {
                Decimal::NaN {
                    negative,
                    signaling: (bits >> (comb_shift - 1)) & 1 == 1,
                }
            });
        }

        let (msb, first) = if combination >> 3 == 0b11 {
            ((combination >> 1) & 0b11, 8 + (combination & 1))
        } else {
            (combination >> 3, combination & 0b111)
        };
        let continuation = (bits >> exp_shift) & ((1u128 << self.exponent_bits) - 1);
        let exponent = ((msb << self.exponent_bits) | continuation) as i32 - self.bias;

        let codec = DenselyPackedDecimal::new(self.digits)?;
        let signum = if negative { -1 } else { 1 };
        let coefficient = codec.decode_with_first_digit(signum, first as u8, bytes)?;
        Ok(Decimal::Finite {
            coefficient,
            exponent,
        })
    }

    fn to_bytes(&self, bits: u128) -> Vec<u8> {
        bits.to_be_bytes()[16 - self.bytes..].to_vec()
    }
}

/// INT128 field bytes (big-endian two's complement)
pub fn int128_to_bytes(value: i128) -> [u8; 16] {
    value.to_be_bytes()
}

/// INT128 from field bytes
pub fn int128_from_bytes(bytes: &[u8]) -> Result<i128> {
    let arr: [u8; 16] = bytes
        .try_into()
        .map_err(|_| Error::protocol(format!("INT128 needs 16 bytes, got {}", bytes.len())))?;
    Ok(i128::from_be_bytes(arr))
}
