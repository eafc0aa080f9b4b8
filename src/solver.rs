//! Online Gaussian elimination over GF(2).
//!
//! [`LinearBasis`] accepts vectors one at a time and keeps the accepted set
//! in reduced row echelon form. Every row carries a *certificate*: the set
//! of accepted vectors (by acceptance index) whose XOR equals that row. A
//! query can therefore be answered in terms of the original inputs.
//!
//! Worked example on 10-bit vectors (index 0 printed first):
//!
//! ```text
//! add 1..1....11    1.11. | 1.......1.
//! add 11111111..    11..1 | .11.1.111.
//! add .....1....    ...11 | ...1......
//! add ...1.1...1    ..1.. | .....1....
//! add .....1...1    ..1.1 | .........1
//! ```
//!
//! Querying `1....1..11` XORs rows 0, 3 and 4, whose certificates combine to
//! `1.111`: inputs 0, 2, 3 and 4.

use crate::bits::{BitVector32, WIDTH};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("basis capacity must be between 1 and {WIDTH}, got {0}")]
    InvalidCapacity(usize),
}

/// Outcome of [`LinearBasis::test_vector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// The queried vector is zero; the empty combination represents it.
    IsZero,
    /// XOR of the accepted vectors named by the certificate.
    Found(BitVector32),
    /// Outside the span of the accepted vectors.
    NotInSpan,
}

impl Representation {
    pub fn certificate(self) -> Option<BitVector32> {
        match self {
            Representation::Found(certificate) => Some(certificate),
            Representation::IsZero | Representation::NotInSpan => None,
        }
    }
}

/// Incrementally built basis in reduced row echelon form.
///
/// Rows are sorted by pivot column (the lowest set bit of the row), and no
/// row has another row's pivot column set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearBasis {
    max_count: usize,
    certificates: Vec<BitVector32>,
    rows: Vec<BitVector32>,
    pivots: Vec<u32>,
}

impl Default for LinearBasis {
    /// A basis sized for CRC-32 effect vectors.
    fn default() -> Self {
        Self::with_capacity_unchecked(WIDTH as usize)
    }
}

impl LinearBasis {
    pub fn new(max_count: usize) -> Result<Self, SolverError> {
        if max_count == 0 || max_count > WIDTH as usize {
            return Err(SolverError::InvalidCapacity(max_count));
        }
        Ok(Self::with_capacity_unchecked(max_count))
    }

    fn with_capacity_unchecked(max_count: usize) -> Self {
        Self {
            max_count,
            certificates: Vec::with_capacity(max_count),
            rows: Vec::with_capacity(max_count),
            pivots: Vec::with_capacity(max_count),
        }
    }

    /// Number of accepted vectors.
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() == self.max_count
    }

    pub fn pivots(&self) -> &[u32] {
        &self.pivots
    }

    pub fn rows(&self) -> &[BitVector32] {
        &self.rows
    }

    pub fn certificates(&self) -> &[BitVector32] {
        &self.certificates
    }

    /// Try to extend the basis with `vector`.
    ///
    /// Returns `true` when `vector` was independent of the accepted set and
    /// has been added as acceptance index `count() - 1`. Returns `false`
    /// without touching the basis for the zero vector, for a full basis and
    /// for a vector already in the span; [`dependency`](Self::dependency)
    /// recovers the combination in the last case.
    pub fn add_vector(&mut self, vector: BitVector32) -> bool {
        if vector.is_empty() || self.is_full() {
            return false;
        }

        // Rows never share pivot columns, so a single ascending pass clears
        // every pivot bit of `reduced`.
        let mut reduced = vector;
        let mut certificate = BitVector32::unit(self.count() as u32);
        for ((row, row_certificate), &pivot) in
            self.rows.iter().zip(&self.certificates).zip(&self.pivots)
        {
            if reduced.get(pivot) {
                reduced ^= *row;
                certificate ^= *row_certificate;
            }
        }

        let Some(pivot) = reduced.first_one() else {
            return false;
        };

        for (row, row_certificate) in self.rows.iter_mut().zip(self.certificates.iter_mut()) {
            if row.get(pivot) {
                *row ^= reduced;
                *row_certificate ^= certificate;
            }
        }

        let position = self.pivots.partition_point(|&p| p < pivot);
        self.pivots.insert(position, pivot);
        self.rows.insert(position, reduced);
        self.certificates.insert(position, certificate);

        debug_assert!(self.pivots.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(self.rows.len() <= self.max_count);
        true
    }

    /// Express `vector` as an XOR of accepted vectors.
    pub fn test_vector(&self, vector: BitVector32) -> Representation {
        if vector.is_empty() {
            return Representation::IsZero;
        }

        let mut residual = vector;
        let mut certificate = BitVector32::ZERO;
        while let Some(bit) = residual.first_one() {
            match self.pivots.binary_search(&bit) {
                Ok(index) => {
                    residual ^= self.rows[index];
                    certificate ^= self.certificates[index];
                }
                Err(_) => return Representation::NotInSpan,
            }
        }
        Representation::Found(certificate)
    }

    /// Certificate of the accepted vectors summing to a nonzero `vector`
    /// that [`add_vector`](Self::add_vector) rejected as dependent.
    pub fn dependency(&self, vector: BitVector32) -> Option<BitVector32> {
        self.test_vector(vector).certificate()
    }
}

/// `certificate | row` per line, `1`/`.` per bit, lowest index first.
impl fmt::Display for LinearBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.count() as u32;
        for (certificate, row) in self.certificates.iter().zip(&self.rows) {
            for col in 0..count {
                f.write_str(if certificate.get(col) { "1" } else { "." })?;
            }
            f.write_str(" | ")?;
            for col in 0..self.max_count as u32 {
                f.write_str(if row.get(col) { "1" } else { "." })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(s: &str) -> BitVector32 {
        s.parse().unwrap()
    }

    fn worked_example() -> LinearBasis {
        let mut basis = LinearBasis::new(10).unwrap();
        assert!(basis.add_vector(bits("1..1....11")));
        assert!(basis.add_vector(bits("11111111..")));
        assert!(basis.add_vector(bits(".....1....")));
        assert!(basis.add_vector(bits("...1.1...1")));
        assert!(!basis.add_vector(bits("...1.1...1")));
        assert!(basis.add_vector(bits(".....1...1")));
        basis
    }

    #[test]
    fn test_invalid_capacity() {
        assert_eq!(LinearBasis::new(0), Err(SolverError::InvalidCapacity(0)));
        assert_eq!(LinearBasis::new(33), Err(SolverError::InvalidCapacity(33)));
        assert_eq!(LinearBasis::default().max_count(), 32);
    }

    #[test]
    fn test_worked_example_state() {
        let basis = worked_example();
        assert_eq!(basis.count(), 5);
        assert_eq!(basis.pivots(), &[0, 1, 3, 5, 9]);
        assert_eq!(
            basis.to_string(),
            "1.11. | 1.......1.\n\
             11..1 | .11.1.111.\n\
             ...11 | ...1......\n\
             ..1.. | .....1....\n\
             ..1.1 | .........1\n"
        );
    }

    #[test]
    fn test_worked_example_query() {
        let basis = worked_example();
        assert_eq!(
            basis.test_vector(bits("1....1..11")),
            Representation::Found(bits("1.111"))
        );
    }

    #[test]
    fn test_zero_and_full() {
        let mut basis = LinearBasis::new(2).unwrap();
        assert!(!basis.add_vector(BitVector32::ZERO));
        assert!(basis.add_vector(bits("1")));
        assert!(basis.add_vector(bits(".1")));
        assert!(basis.is_full());
        assert!(!basis.add_vector(bits("..1")));
        assert_eq!(basis.count(), 2);
    }

    #[test]
    fn test_query_outcomes() {
        let mut basis = LinearBasis::default();
        assert_eq!(basis.test_vector(BitVector32::ZERO), Representation::IsZero);
        assert_eq!(basis.test_vector(bits("1")), Representation::NotInSpan);

        basis.add_vector(bits("11"));
        assert_eq!(basis.test_vector(bits("11")), Representation::Found(bits("1")));
        assert_eq!(basis.test_vector(bits("1")), Representation::NotInSpan);
        assert_eq!(basis.test_vector(BitVector32::ZERO), Representation::IsZero);
    }

    #[test]
    fn test_dependency_certificate() {
        let mut basis = LinearBasis::default();
        let a = BitVector32::from_bits(0x0000_00F0);
        let b = BitVector32::from_bits(0x0001_0010);
        let c = BitVector32::from_bits(0x8000_0000);
        assert!(basis.add_vector(a));
        assert!(basis.add_vector(b));
        assert!(basis.add_vector(c));

        let rejected = a ^ c;
        assert!(!basis.add_vector(rejected));
        assert_eq!(basis.count(), 3);
        assert_eq!(basis.dependency(rejected), Some(BitVector32::from_bits(0b101)));
    }

    #[test]
    fn test_reduced_row_echelon_invariant() {
        let mut basis = LinearBasis::default();
        let mut state = 0x1234_5678u32;
        for _ in 0..200 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            basis.add_vector(BitVector32::from_bits(state & 0x00FF_F0F0));
        }

        for (i, (&pivot, row)) in basis.pivots().iter().zip(basis.rows()).enumerate() {
            assert_eq!(row.first_one(), Some(pivot));
            for (j, other) in basis.rows().iter().enumerate() {
                if i != j {
                    assert!(!other.get(pivot));
                }
            }
        }
    }
}
