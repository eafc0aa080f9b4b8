use super::{bit_candidates, ForgeError, Operation};
use crate::bits::BitVector32;
use crate::crc;
use crate::overwrite::{validate_specs, OverwriteSpec};
use crate::solver::{LinearBasis, Representation};
use tracing::{debug, trace};

/// Rewrite `source` inside the regions allowed by `specs` so that its
/// conventional CRC-32 becomes `target_crc32`.
///
/// Returns `Ok(None)` when the allowed edits cannot reach the target. The
/// output always has the same length as `source` and differs from it only
/// in permitted bits. Specs are scanned in order and scanning stops as soon
/// as the accepted edits suffice, so later specs may be left untouched.
///
/// # Errors
///
/// [`ForgeError::Spec`] when a spec exceeds `source` or two live specs overlap.
pub fn hack(
    source: &[u8],
    target_crc32: u32,
    specs: &[OverwriteSpec],
) -> Result<Option<Vec<u8>>, ForgeError> {
    validate_specs(specs, source.len())?;

    let delta = !target_crc32 ^ crc::hash(source, crc::INITIAL);
    if delta == 0 {
        debug!(target_crc32, "source already has the target checksum");
        return Ok(Some(source.to_vec()));
    }

    let mut search = HackSearch {
        source,
        delta: BitVector32::from_bits(delta),
        basis: LinearBasis::default(),
        operations: Vec::new(),
    };

    for spec in specs.iter().filter(|s| !s.is_inert()) {
        let found = match spec.data() {
            Some(_) => search.offer_region(spec),
            None => search.offer_bits(spec),
        };
        if let Some(certificate) = found {
            debug!(
                target_crc32,
                edits = certificate.count_ones(),
                accepted = search.operations.len(),
                "target checksum reached"
            );
            return Ok(Some(search.materialize(certificate)));
        }
    }

    debug!(
        target_crc32,
        rank = search.basis.count(),
        "allowed edits cannot reach the target checksum"
    );
    Ok(None)
}

/// Per-call scan state: the basis and the operations behind its rows.
struct HackSearch<'a> {
    source: &'a [u8],
    delta: BitVector32,
    basis: LinearBasis,
    operations: Vec<Operation<'a>>,
}

impl<'a> HackSearch<'a> {
    fn offer_region(&mut self, spec: &'a OverwriteSpec) -> Option<BitVector32> {
        let current = &self.source[spec.offset()..spec.end()];
        let effect = crc::shift(
            crc::hash_iter(spec.difference(current), 0),
            self.source.len() - spec.end(),
        );
        self.offer(Operation::Overwrite(spec), effect)
    }

    fn offer_bits(&mut self, spec: &'a OverwriteSpec) -> Option<BitVector32> {
        for (operation, effect) in bit_candidates(spec, self.source.len()) {
            if let Some(certificate) = self.offer(operation, effect) {
                return Some(certificate);
            }
        }
        None
    }

    /// Feed one candidate; returns the certificate once `delta` is reachable.
    fn offer(&mut self, operation: Operation<'a>, effect: u32) -> Option<BitVector32> {
        if effect == 0 {
            trace!(?operation, "edit has no checksum effect");
            return None;
        }
        if !self.basis.add_vector(BitVector32::from_bits(effect)) {
            trace!(?operation, effect, "edit is dependent on accepted edits");
            return None;
        }
        self.operations.push(operation);
        trace!(?operation, effect, rank = self.basis.count(), "edit accepted");

        match self.basis.test_vector(self.delta) {
            Representation::Found(certificate) => Some(certificate),
            Representation::IsZero | Representation::NotInSpan => None,
        }
    }

    fn materialize(&self, certificate: BitVector32) -> Vec<u8> {
        let mut output = self.source.to_vec();
        for index in certificate.iter_ones() {
            self.operations[index as usize].apply(&mut output);
        }
        output
    }
}
