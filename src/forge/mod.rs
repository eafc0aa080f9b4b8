//! CRC-32 forging engines.
//!
//! Both engines walk the overwrite specs in order, turn every permitted
//! edit into the vector it XORs into the final CRC register, and feed those
//! vectors to a [`LinearBasis`](crate::solver::LinearBasis):
//!
//! - [`hack`] stops once the required checksum delta is in the span and
//!   rewrites the source accordingly.
//! - [`zero`] stops at the first dependent edit and returns the nonzero
//!   XOR patch whose CRC effect cancels out.
//!
//! Freeform regions contribute one candidate per editable bit; regions with
//! replacement data contribute a single all-or-nothing candidate.

mod hack;
mod zero;

pub use hack::hack;
pub use zero::zero;

use crate::crc;
use crate::overwrite::{OverwriteSpec, SpecError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForgeError {
    #[error("invalid overwrite configuration: {0}")]
    Spec(#[from] SpecError),
}

/// An accepted edit, in the order it entered the basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    /// Toggle bit `bit_offset % 8` of byte `bit_offset / 8`.
    BitFlip { bit_offset: usize },
    /// Swap the region over to the spec's replacement data.
    Overwrite(&'a OverwriteSpec),
}

impl Operation<'_> {
    pub fn apply(&self, buffer: &mut [u8]) {
        match self {
            Operation::BitFlip { bit_offset } => {
                buffer[bit_offset >> 3] ^= 1 << (bit_offset & 7);
            }
            Operation::Overwrite(spec) => spec.apply(buffer),
        }
    }
}

/// Editable bits of a freeform spec with the CRC effect of flipping each,
/// in byte-then-bit order. Bits with no effect are skipped.
fn bit_candidates(
    spec: &OverwriteSpec,
    buffer_len: usize,
) -> impl Iterator<Item = (Operation<'_>, u32)> + '_ {
    (0..spec.length()).flat_map(move |i| {
        let mask = spec.mask_at(i);
        let byte_offset = spec.offset() + i;
        let trailing = buffer_len - byte_offset - 1;
        (0..8u8).filter_map(move |bit| {
            let flip = 1u8 << bit;
            if mask & flip == 0 {
                return None;
            }
            let effect = crc::shift(crc::hash_byte(flip, 0), trailing);
            (effect != 0).then_some((
                Operation::BitFlip {
                    bit_offset: byte_offset * 8 + usize::from(bit),
                },
                effect,
            ))
        })
    })
}
