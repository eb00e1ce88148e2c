//! Densely packed decimal (DPD) coefficient codec
//!
//! Three decimal digits pack into one 10-bit declet. A codec for `N = 3k + 1`
//! digits stores `k` declets in the least significant `10k` bits of a
//! big-endian byte array and carries the leading digit separately; decimal
//! floating point formats fold it into their combination field.
//!
//! Both lookup tables are generated at compile time.

use num_bigint::{BigInt, BigUint, Sign};

use crate::error::{Error, Result};

/// Declet for a value in `0..1000`
static BIN2DPD: [u16; 1000] = {
    let mut table = [0u16; 1000];
    let mut i = 0;
    while i < 1000 {
        table[i] = encode_declet(i as u16);
        i += 1;
    }
    table
};

/// Value in `0..1000` for any 10-bit declet, including non-canonical ones
static DPD2BIN: [u16; 1024] = {
    let mut table = [0u16; 1024];
    let mut i = 0;
    while i < 1024 {
        table[i] = decode_declet(i as u16);
        i += 1;
    }
    table
};

const fn encode_declet(n: u16) -> u16 {
    let h = n / 100;
    let t = (n / 10) % 10;
    let u = n % 10;
    let d = h & 1;
    let ht = t & 1;
    let m = u & 1;
    let (pqr, stu, wxy) = match (h >= 8, t >= 8, u >= 8) {
        (false, false, false) => (h, t, u),
        (false, false, true) => (h, t, 0b1000 | m),
        (false, true, false) => (h, ((u >> 1) & 3) << 1 | ht, 0b1010 | m),
        (true, false, false) => (((u >> 1) & 3) << 1 | d, t, 0b1100 | m),
        (false, true, true) => (h, 0b100 | ht, 0b1110 | m),
        (true, false, true) => (((t >> 1) & 3) << 1 | d, 0b010 | ht, 0b1110 | m),
        (true, true, false) => (((u >> 1) & 3) << 1 | d, ht, 0b1110 | m),
        (true, true, true) => (d, 0b110 | ht, 0b1110 | m),
    };
    // wxy carries the v bit in position 3
    (pqr << 7) | (stu << 4) | wxy
}

const fn decode_declet(declet: u16) -> u16 {
    let pqr = (declet >> 7) & 7;
    let stu = (declet >> 4) & 7;
    let v = (declet >> 3) & 1;
    let wxy = declet & 7;
    let m = wxy & 1;
    let (h, t, u) = if v == 0 {
        (pqr, stu, wxy)
    } else {
        match wxy >> 1 {
            0b00 => (pqr, stu, 8 + m),
            0b01 => (pqr, 8 + (stu & 1), ((stu >> 1) & 3) << 1 | m),
            0b10 => (8 + (pqr & 1), stu, ((pqr >> 1) & 3) << 1 | m),
            _ => match stu >> 1 {
                0b00 => (8 + (pqr & 1), 8 + (stu & 1), ((pqr >> 1) & 3) << 1 | m),
                0b01 => (8 + (pqr & 1), ((pqr >> 1) & 3) << 1 | (stu & 1), 8 + m),
                0b10 => (pqr, 8 + (stu & 1), 8 + m),
                _ => (8 + (pqr & 1), 8 + (stu & 1), 8 + m),
            },
        }
    };
    h * 100 + t * 10 + u
}

/// Codec for coefficients of `3k + 1` decimal digits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenselyPackedDecimal {
    digits: usize,
    declets: usize,
}

impl DenselyPackedDecimal {
    /// Create a codec for `digits` decimal digits (must be `3k + 1`)
    pub fn new(digits: usize) -> Result<Self> {
        if digits == 0 || digits % 3 != 1 {
            return Err(Error::protocol(format!(
                "DPD digit count must be 3k+1, got {}",
                digits
            )));
        }
        Ok(Self {
            digits,
            declets: digits / 3,
        })
    }

    /// Maximum number of digits including the leading digit
    pub fn max_digits(&self) -> usize {
        self.digits
    }

    /// Bytes needed to hold the packed declets
    pub fn byte_len(&self) -> usize {
        (self.declets * 10).div_ceil(8)
    }

    /// Pack the magnitude of `value` into the low bits of `out`
    ///
    /// Only the declet bits of `out` are touched. Returns the leading digit,
    /// which the caller stores elsewhere.
    pub fn encode(&self, value: &BigInt, out: &mut [u8]) -> Result<u8> {
        self.check_len(out.len())?;
        let mut digits = value.magnitude().to_radix_le(10);
        if digits.len() > self.digits {
            return Err(Error::protocol(format!(
                "coefficient has {} digits, at most {} allowed",
                digits.len(),
                self.digits
            )));
        }
        digits.resize(self.digits, 0);
        for j in 0..self.declets {
            let n = digits[3 * j + 2] as u16 * 100 + digits[3 * j + 1] as u16 * 10 + digits[3 * j] as u16;
            write_bits(out, j * 10, BIN2DPD[n as usize]);
        }
        Ok(digits[self.declets * 3])
    }

    /// Unpack a coefficient whose leading digit was stored outside the declets
    ///
    /// `signum < 0` yields a negative result; zero magnitude is always zero.
    pub fn decode_with_first_digit(&self, signum: i32, first_digit: u8, bytes: &[u8]) -> Result<BigInt> {
        self.check_len(bytes.len())?;
        if first_digit > 9 {
            return Err(Error::protocol(format!("invalid leading digit {}", first_digit)));
        }
        let mut digits = Vec::with_capacity(self.digits);
        for j in 0..self.declets {
            let n = DPD2BIN[read_bits(bytes, j * 10) as usize];
            digits.push((n % 10) as u8);
            digits.push(((n / 10) % 10) as u8);
            digits.push((n / 100) as u8);
        }
        digits.push(first_digit);
        let magnitude = BigUint::from_radix_le(&digits, 10)
            .ok_or_else(|| Error::protocol("invalid DPD digits"))?;
        let sign = if signum < 0 { Sign::Minus } else { Sign::Plus };
        Ok(BigInt::from_biguint(sign, magnitude))
    }

    /// Unpack a coefficient with an implicit leading digit of zero
    pub fn decode(&self, signum: i32, bytes: &[u8]) -> Result<BigInt> {
        self.decode_with_first_digit(signum, 0, bytes)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len < self.byte_len() {
            return Err(Error::BufferUnderflow {
                needed: self.byte_len(),
                available: len,
            });
        }
        Ok(())
    }
}

/// Write a declet at `offset` bits from the least significant end
fn write_bits(bytes: &mut [u8], offset: usize, declet: u16) {
    let last = bytes.len() - 1;
    for bit in 0..10 {
        let pos = offset + bit;
        let idx = last - pos / 8;
        let mask = 1u8 << (pos % 8);
        if declet & (1 << bit) != 0 {
            bytes[idx] |= mask;
        } else {
            bytes[idx] &= !mask;
        }
    }
}

/// Read a declet at `offset` bits from the least significant end
fn read_bits(bytes: &[u8], offset: usize) -> u16 {
    let last = bytes.len() - 1;
    let mut declet = 0u16;
    for bit in 0..10 {
        let pos = offset + bit;
        if bytes[last - pos / 8] & (1 << (pos % 8)) != 0 {
            declet |= 1 << bit;
        }
    }
    declet
}
