//! Editable regions for the forging engines, with bounds and overlap checks.

use thiserror::Error;

/// One region the forging engines are allowed to modify.
///
/// A spec names a byte range and optionally narrows what may change there:
///
/// - `data`: the region may only switch between its current bytes and these
///   replacement bytes (one all-or-nothing candidate).
/// - `mask`: only bits set in the mask may change. Without a mask every bit
///   in the range is editable.
///
/// A spec whose mask is entirely zero permits nothing and is skipped by the
/// engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverwriteSpec {
    offset: usize,
    length: usize,
    data: Option<Vec<u8>>,
    mask: Option<Vec<u8>>,
    inert: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("overwrite region at offset {offset} has zero length")]
    ZeroLength { offset: usize },

    #[error("replacement data is {actual} bytes, region length is {expected}")]
    DataLengthMismatch { expected: usize, actual: usize },

    #[error("mask is {actual} bytes, region length is {expected}")]
    MaskLengthMismatch { expected: usize, actual: usize },

    #[error("overwrite region [{offset}, {end}) exceeds buffer of length {buffer_len}")]
    OutOfBounds {
        offset: usize,
        end: usize,
        buffer_len: usize,
    },

    #[error("overwrite regions [{first_offset}, {first_end}) and [{second_offset}, {second_end}) overlap")]
    Overlap {
        first_offset: usize,
        first_end: usize,
        second_offset: usize,
        second_end: usize,
    },
}

impl OverwriteSpec {
    /// Create a spec with every bit of `[offset, offset + length)` editable.
    pub fn new(offset: usize, length: usize) -> Result<Self, SpecError> {
        Self::build(offset, length, None, None)
    }

    /// Create a spec that offers `data` as the replacement for the region.
    pub fn with_data(offset: usize, data: impl Into<Vec<u8>>) -> Result<Self, SpecError> {
        let data = data.into();
        Self::build(offset, data.len(), Some(data), None)
    }

    /// Create a spec whose editable bits are restricted by `mask`.
    pub fn with_mask(offset: usize, mask: impl Into<Vec<u8>>) -> Result<Self, SpecError> {
        let mask = mask.into();
        Self::build(offset, mask.len(), None, Some(mask))
    }

    /// Create a spec from all parts. `data` and `mask`, when present, must
    /// both be exactly `length` bytes.
    pub fn build(
        offset: usize,
        length: usize,
        data: Option<Vec<u8>>,
        mask: Option<Vec<u8>>,
    ) -> Result<Self, SpecError> {
        if length == 0 {
            return Err(SpecError::ZeroLength { offset });
        }
        if let Some(data) = &data {
            if data.len() != length {
                return Err(SpecError::DataLengthMismatch {
                    expected: length,
                    actual: data.len(),
                });
            }
        }
        if let Some(mask) = &mask {
            if mask.len() != length {
                return Err(SpecError::MaskLengthMismatch {
                    expected: length,
                    actual: mask.len(),
                });
            }
        }

        let inert = mask.as_deref().is_some_and(|m| m.iter().all(|&b| b == 0));
        Ok(Self {
            offset,
            length,
            data,
            mask,
            inert,
        })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Exclusive end offset. Saturates so bounds checks report instead of
    /// wrapping on absurd offsets.
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.length)
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn mask(&self) -> Option<&[u8]> {
        self.mask.as_deref()
    }

    /// Editable bits of the byte at `index` within the region.
    pub fn mask_at(&self, index: usize) -> u8 {
        self.mask.as_ref().map_or(0xFF, |m| m[index])
    }

    /// True when the mask clears every bit.
    pub fn is_inert(&self) -> bool {
        self.inert
    }

    /// Check that the region fits in a buffer of `buffer_len` bytes.
    pub fn check_bounds(&self, buffer_len: usize) -> Result<(), SpecError> {
        if self.offset.checked_add(self.length).map_or(true, |end| end > buffer_len) {
            return Err(SpecError::OutOfBounds {
                offset: self.offset,
                end: self.end(),
                buffer_len,
            });
        }
        Ok(())
    }

    /// Whether the two specs could both change some bit.
    ///
    /// Disjoint byte ranges never overlap. Shared bytes overlap when either
    /// side is unmasked, or when both masks share a set bit at some shared
    /// position.
    pub fn overlaps(&self, other: &OverwriteSpec) -> bool {
        let start = self.offset.max(other.offset);
        let end = self.end().min(other.end());
        if start >= end {
            return false;
        }

        match (&self.mask, &other.mask) {
            (Some(a), Some(b)) => {
                let a = &a[start - self.offset..end - self.offset];
                let b = &b[start - other.offset..end - other.offset];
                a.iter().zip(b).any(|(x, y)| x & y != 0)
            }
            _ => true,
        }
    }

    /// Write this spec's replacement into `buffer`, touching only masked
    /// bits. A spec without data leaves the buffer unchanged.
    ///
    /// The caller guarantees the region fits (see
    /// [`check_bounds`](Self::check_bounds)).
    pub fn apply(&self, buffer: &mut [u8]) {
        let Some(data) = &self.data else {
            return;
        };
        let region = &mut buffer[self.offset..self.offset + self.length];
        match &self.mask {
            None => region.copy_from_slice(data),
            Some(mask) => {
                for ((r, &d), &m) in region.iter_mut().zip(data).zip(mask) {
                    *r ^= m & (d ^ *r);
                }
            }
        }
    }

    /// The XOR this spec's replacement would make against `current`, the
    /// region's present contents (masked bits only).
    pub fn difference<'a>(&'a self, current: &'a [u8]) -> impl Iterator<Item = u8> + 'a {
        let data = self.data.as_deref().unwrap_or(current);
        current
            .iter()
            .zip(data)
            .enumerate()
            .map(move |(i, (&c, &d))| (c ^ d) & self.mask_at(i))
    }

    /// Replacement bytes restricted to the mask; empty for a spec without data.
    pub fn masked_data(&self) -> impl Iterator<Item = u8> + '_ {
        self.data
            .iter()
            .flatten()
            .enumerate()
            .map(move |(i, &d)| d & self.mask_at(i))
    }
}

/// Check every non-inert spec fits in `buffer_len` bytes and that no two
/// overlap. Inert specs are only bounds-checked.
pub fn validate_specs(specs: &[OverwriteSpec], buffer_len: usize) -> Result<(), SpecError> {
    for spec in specs {
        spec.check_bounds(buffer_len)?;
    }

    let live: Vec<&OverwriteSpec> = specs.iter().filter(|s| !s.is_inert()).collect();
    for (i, first) in live.iter().enumerate() {
        for second in &live[i + 1..] {
            if first.overlaps(second) {
                return Err(SpecError::Overlap {
                    first_offset: first.offset,
                    first_end: first.end(),
                    second_offset: second.offset,
                    second_end: second.end(),
                });
            }
        }
    }
    Ok(())
}
