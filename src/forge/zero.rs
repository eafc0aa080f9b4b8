use super::{bit_candidates, ForgeError, Operation};
use crate::bits::BitVector32;
use crate::crc;
use crate::overwrite::{validate_specs, OverwriteSpec};
use crate::solver::LinearBasis;
use tracing::{debug, trace};

/// Find a nonzero patch of `length` bytes, confined to `specs`, whose
/// zero-initial CRC register is zero.
///
/// XORing the patch into any buffer of `length` bytes changes the buffer
/// but not its CRC-32. Freeform regions may take any bit pattern under
/// their mask; a region with data may only carry `data & mask` or zeros.
/// Returns `Ok(None)` when every permitted edit is linearly independent of
/// the others, or when `length` is zero.
///
/// # Errors
///
/// [`ForgeError::Spec`] when a spec exceeds `length` or two live specs overlap.
pub fn zero(length: usize, specs: &[OverwriteSpec]) -> Result<Option<Vec<u8>>, ForgeError> {
    validate_specs(specs, length)?;
    if length == 0 {
        return Ok(None);
    }

    let mut search = ZeroSearch {
        length,
        basis: LinearBasis::default(),
        operations: Vec::new(),
    };

    for spec in specs.iter().filter(|s| !s.is_inert()) {
        let found = match spec.data() {
            Some(_) => search.offer_region(spec),
            None => search.offer_bits(spec),
        };
        if let Some(patch) = found {
            return Ok(Some(patch));
        }
    }

    debug!(
        length,
        rank = search.basis.count(),
        "no dependent edit among the allowed regions"
    );
    Ok(None)
}

struct ZeroSearch<'a> {
    length: usize,
    basis: LinearBasis,
    operations: Vec<Operation<'a>>,
}

impl<'a> ZeroSearch<'a> {
    fn offer_region(&mut self, spec: &'a OverwriteSpec) -> Option<Vec<u8>> {
        let effect = crc::shift(
            crc::hash_iter(spec.masked_data(), 0),
            self.length - spec.end(),
        );
        self.offer(Operation::Overwrite(spec), effect)
    }

    fn offer_bits(&mut self, spec: &'a OverwriteSpec) -> Option<Vec<u8>> {
        for (operation, effect) in bit_candidates(spec, self.length) {
            if let Some(patch) = self.offer(operation, effect) {
                return Some(patch);
            }
        }
        None
    }

    /// Feed one candidate; returns the patch at the first dependency.
    fn offer(&mut self, operation: Operation<'a>, effect: u32) -> Option<Vec<u8>> {
        if effect == 0 {
            trace!(?operation, "edit has no checksum effect");
            return None;
        }

        let vector = BitVector32::from_bits(effect);
        if self.basis.add_vector(vector) {
            self.operations.push(operation);
            trace!(?operation, effect, rank = self.basis.count(), "edit accepted");
            return None;
        }

        // A full basis spans every vector, so a rejected nonzero vector
        // always has a certificate.
        let certificate = self.basis.dependency(vector)?;
        debug!(
            length = self.length,
            edits = certificate.count_ones() + 1,
            "found checksum-neutral combination"
        );

        let mut patch = vec![0u8; self.length];
        for index in certificate.iter_ones() {
            self.operations[index as usize].apply(&mut patch);
        }
        operation.apply(&mut patch);
        Some(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::checksum;

    fn assert_neutral(patch: &[u8]) {
        assert!(patch.iter().any(|&b| b != 0));
        assert_eq!(crc::hash(patch, 0), 0);
    }

    #[test]
    fn test_zero_freeform() {
        let patch = zero(5, &[OverwriteSpec::new(0, 5).unwrap()]).unwrap().unwrap();
        assert_neutral(&patch);

        let data = b"abcde";
        let patched: Vec<u8> = data.iter().zip(&patch).map(|(a, b)| a ^ b).collect();
        assert_ne!(&patched[..], &data[..]);
        assert_eq!(checksum(&patched), checksum(data));
    }

    #[test]
    fn test_zero_mixed_specs() {
        let mut specs: Vec<OverwriteSpec> = (0..9)
            .map(|i| OverwriteSpec::with_data(i, vec![i as u8 + 1]).unwrap())
            .collect();
        specs.push(OverwriteSpec::with_mask(9, vec![0b1111_1100; 4]).unwrap());

        let patch = zero(20, &specs).unwrap().unwrap();
        assert_neutral(&patch);
        for (i, &b) in patch.iter().enumerate().take(9) {
            assert!(b == 0 || b == i as u8 + 1);
        }
        for &b in &patch[9..13] {
            assert_eq!(b & 0b0000_0011, 0);
        }
        assert!(patch[13..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_too_few_bits() {
        let spec = OverwriteSpec::new(0, 4).unwrap();
        assert_eq!(zero(4, &[spec]).unwrap(), None);
    }

    #[test]
    fn test_zero_length() {
        assert_eq!(zero(0, &[]).unwrap(), None);
    }

    #[test]
    fn test_zero_rejects_overlap() {
        let specs = [
            OverwriteSpec::new(0, 3).unwrap(),
            OverwriteSpec::with_mask(2, vec![0x01]).unwrap(),
        ];
        assert!(matches!(zero(8, &specs), Err(ForgeError::Spec(_))));
    }
}
