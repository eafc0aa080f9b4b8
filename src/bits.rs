//! Fixed-width bit vectors over GF(2).
//!
//! [`BitVector32`] doubles as a CRC register, a basis row and a certificate
//! (a set of insertion indices). Bit 0 is the least significant bit.

use std::fmt;
use std::ops::{BitXor, BitXorAssign};
use std::str::FromStr;
use thiserror::Error;

/// Number of addressable bits in a [`BitVector32`].
pub const WIDTH: u32 = 32;

/// A 32-bit vector over GF(2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BitVector32(u32);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseBitsError {
    #[error("bit string longer than {WIDTH} characters: {len}")]
    TooLong { len: usize },

    #[error("invalid bit character {found:?} at index {index} (expected '1', '0' or '.')")]
    InvalidChar { index: usize, found: char },
}

impl BitVector32 {
    /// The zero vector.
    pub const ZERO: Self = Self(0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Vector with only bit `i` set.
    pub const fn unit(i: u32) -> Self {
        Self(1 << i)
    }

    #[inline]
    pub const fn get(self, i: u32) -> bool {
        self.0 & (1 << i) != 0
    }

    #[inline]
    pub fn set(&mut self, i: u32, value: bool) {
        if value {
            self.0 |= 1 << i;
        } else {
            self.0 &= !(1 << i);
        }
    }

    #[inline]
    pub fn xor(&mut self, other: Self) {
        self.0 ^= other.0;
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Index of the lowest set bit, or `None` for the zero vector.
    #[inline]
    pub const fn first_one(self) -> Option<u32> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros())
        }
    }

    pub const fn count_ones(self) -> u32 {
        self.0.count_ones()
    }

    /// Indices of set bits in ascending order.
    pub fn iter_ones(self) -> impl Iterator<Item = u32> {
        let mut rest = self.0;
        std::iter::from_fn(move || {
            if rest == 0 {
                return None;
            }
            let i = rest.trailing_zeros();
            rest &= rest - 1;
            Some(i)
        })
    }
}

impl From<u32> for BitVector32 {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl From<BitVector32> for u32 {
    fn from(v: BitVector32) -> Self {
        v.0
    }
}

impl BitXor for BitVector32 {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for BitVector32 {
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

/// Renders index 0 first, `1` for set bits and `.` for clear ones.
impl fmt::Display for BitVector32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..WIDTH {
            f.write_str(if self.get(i) { "1" } else { "." })?;
        }
        Ok(())
    }
}

/// Parses the [`Display`](fmt::Display) form. Shorter strings leave the
/// remaining high bits clear, so `"1..1"` is `0b1001`.
impl FromStr for BitVector32 {
    type Err = ParseBitsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let len = s.chars().count();
        if len > WIDTH as usize {
            return Err(ParseBitsError::TooLong { len });
        }

        let mut v = Self::ZERO;
        for (index, c) in s.chars().enumerate() {
            match c {
                '1' => v.set(index as u32, true),
                '0' | '.' => {}
                found => return Err(ParseBitsError::InvalidChar { index, found }),
            }
        }
        Ok(v)
    }
}
