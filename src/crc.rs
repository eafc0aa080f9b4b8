//! Reflected CRC-32 (polynomial `0xEDB88320`) with the algebra exposed.
//!
//! Nothing here applies the conventional pre/post complement except
//! [`checksum`]. With `init = 0` the register update is linear over GF(2):
//! `hash(a ^ b, 0) == hash(a, 0) ^ hash(b, 0)` for equal-length `a`, `b`.
//! That property, together with [`shift`], lets the patch engines compute the
//! checksum effect of an edit without rehashing the buffer.
//!
//! # Example
//!
//! ```
//! use crc_patcher::crc::{checksum, hash, shift, INITIAL};
//!
//! assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
//!
//! // Appending zero bytes is the same as shifting the register.
//! let head = hash(b"abc", INITIAL);
//! assert_eq!(shift(head, 5), hash(b"abc\0\0\0\0\0", INITIAL));
//! ```

use std::sync::OnceLock;

/// Reflected CRC-32 polynomial.
pub const POLY: u32 = 0xEDB8_8320;

/// Register value the conventional CRC-32 starts from.
pub const INITIAL: u32 = 0xFFFF_FFFF;

/// Doubling tables cover shifts of `2^0 ..= 2^30` bytes.
pub const SHIFT_LEVELS: usize = 31;

static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
static SHIFT_TABLES: OnceLock<Vec<LaneTable>> = OnceLock::new();

fn table() -> &'static [u32; 256] {
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut hash = i as u32;
            for _ in 0..8 {
                if hash & 1 != 0 {
                    hash = (hash >> 1) ^ POLY;
                } else {
                    hash >>= 1;
                }
            }
            *entry = hash;
        }
        table
    })
}

/// Feed `data` into a register holding `init`.
pub fn hash(data: &[u8], init: u32) -> u32 {
    hash_iter(data.iter().copied(), init)
}

/// [`hash`] over any byte stream, for callers that combine buffers on the fly.
pub fn hash_iter<I>(bytes: I, init: u32) -> u32
where
    I: IntoIterator<Item = u8>,
{
    let table = table();
    bytes.into_iter().fold(init, |hash, byte| {
        table[usize::from(byte ^ hash as u8)] ^ (hash >> 8)
    })
}

/// Single-byte register step.
#[inline]
pub fn hash_byte(byte: u8, register: u32) -> u32 {
    table()[usize::from(byte ^ register as u8)] ^ (register >> 8)
}

/// Conventional CRC-32 of `data` (init `0xFFFFFFFF`, final complement).
pub fn checksum(data: &[u8]) -> u32 {
    !hash(data, INITIAL)
}

/// Linear-domain difference between two conventional checksums of
/// equal-length buffers: the XOR any edit must contribute to move a buffer
/// from `current` to `target`.
pub fn linear_delta(current: u32, target: u32) -> u32 {
    current ^ target
}

/// One row per byte value; column `k` is the register after shifting a
/// register whose only nonzero byte is lane `k` holding that value.
#[derive(Clone)]
struct LaneTable([[u32; 4]; 256]);

impl LaneTable {
    /// Shift by a single zero byte.
    fn single_step() -> Self {
        let mut lanes = [[0u32; 4]; 256];
        for (value, row) in lanes.iter_mut().enumerate() {
            for (lane, entry) in row.iter_mut().enumerate() {
                *entry = hash_byte(0, (value as u32) << (8 * lane));
            }
        }
        LaneTable(lanes)
    }

    #[inline]
    fn apply(&self, crc: u32) -> u32 {
        self.0[usize::from(crc as u8)][0]
            ^ self.0[usize::from((crc >> 8) as u8)][1]
            ^ self.0[usize::from((crc >> 16) as u8)][2]
            ^ self.0[usize::from((crc >> 24) as u8)][3]
    }

    /// Table for twice this table's shift amount.
    fn squared(&self) -> Self {
        let mut lanes = [[0u32; 4]; 256];
        for (row, src) in lanes.iter_mut().zip(self.0.iter()) {
            for (entry, &value) in row.iter_mut().zip(src.iter()) {
                *entry = self.apply(value);
            }
        }
        LaneTable(lanes)
    }
}

fn shift_tables() -> &'static [LaneTable] {
    SHIFT_TABLES.get_or_init(|| {
        let mut levels = Vec::with_capacity(SHIFT_LEVELS);
        levels.push(LaneTable::single_step());
        while levels.len() < SHIFT_LEVELS {
            let next = levels[levels.len() - 1].squared();
            levels.push(next);
        }
        levels
    })
}

/// Register after appending `n` zero bytes to a stream whose register is `crc`.
///
/// Equivalent to `hash(&vec![0; n], crc)` in O(log n) table lookups.
pub fn shift(crc: u32, n: usize) -> u32 {
    let tables = shift_tables();
    let mut hash = crc;
    let mut rest = n;

    for table in tables {
        if rest == 0 {
            return hash;
        }
        if rest & 1 != 0 {
            hash = table.apply(hash);
        }
        rest >>= 1;
    }

    // 2^31 bytes and beyond: keep squaring past the cached levels.
    let mut table = tables[SHIFT_LEVELS - 1].squared();
    while rest != 0 {
        if rest & 1 != 0 {
            hash = table.apply(hash);
        }
        rest >>= 1;
        if rest != 0 {
            table = table.squared();
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slow_shift(crc: u32, n: usize) -> u32 {
        hash(&vec![0u8; n], crc)
    }

    #[test]
    fn test_table_known_entries() {
        let table = table();
        assert_eq!(table[0], 0);
        assert_eq!(table[1], 0x7707_3096);
        assert_eq!(table[255], 0x2D02_EF8D);
    }

    #[test]
    fn test_zero_data_linear_domain() {
        assert_eq!(hash_byte(0, 0), 0);
        assert_eq!(hash(&[0u8; 5], 0), 0);
        assert_eq!(hash(&[0u8; 13], 0), 0);
    }

    #[test]
    fn test_checksum_check_value() {
        assert_eq!(checksum(b""), 0);
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
        assert_eq!(checksum(b"The quick brown fox jumps over the lazy dog"), 0x414F_A339);
    }

    #[test]
    fn test_hash_byte_matches_hash() {
        assert_eq!(!hash_byte(0x23, INITIAL), checksum(&[0x23]));
    }

    #[test]
    fn test_shift_zero_register() {
        assert_eq!(shift(0, 1), 0);
        assert_eq!(shift(0, 100), 0);
    }

    #[test]
    fn test_shift_matches_zero_append() {
        for n in [0usize, 1, 2, 3, 7, 8, 50, 255, 256, 1000, 4097] {
            assert_eq!(shift(0x1234_5678, n), slow_shift(0x1234_5678, n), "n = {n}");
        }
    }

    #[test]
    fn test_shift_completes_partial_hash() {
        let mut data = vec![0u8; 100];
        for (i, b) in data.iter_mut().take(50).enumerate() {
            *b = (i as u8).wrapping_mul(37).wrapping_add(11);
        }
        let head = hash(&data[..50], INITIAL);
        assert_eq!(!shift(head, 50), checksum(&data));
    }

    #[test]
    fn test_shift_composes() {
        let crc = 0xDEAD_BEEF;
        assert_eq!(shift(shift(crc, 123), 456), shift(crc, 579));
        assert_eq!(shift(shift(crc, 1 << 20), 1 << 20), shift(crc, 1 << 21));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_shift_beyond_cached_levels() {
        let crc = 0x0BAD_F00D;
        let top = 1usize << 30;
        let expected = shift(shift(shift(crc, top), top), 5);
        assert_eq!(shift(crc, (1usize << 31) + 5), expected);
        assert_eq!(shift(crc, 1usize << 32), shift(shift(crc, 1usize << 31), 1usize << 31));
    }

    #[test]
    fn test_linear_delta() {
        let a = b"hello world";
        let b = b"hellO world";
        let diff: Vec<u8> = a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect();
        assert_eq!(linear_delta(checksum(a), checksum(b)), hash(&diff, 0));
    }
}
