//! Plan applicator - runs a forge plan against a source buffer
//!
//! This module:
//! - Verifies the source against the plan's recorded digest
//! - Builds the overwrite specs from the plan's regions
//! - Dispatches to the hack or zero engine
//! - Reports the outcome without touching the filesystem

use crate::config::schema::{ForgeMode, PlanConfig, ValidationError};
use crate::crc;
use crate::forge::{self, ForgeError};
use std::fmt;
use tracing::{debug, info};

/// Result of running a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PlanOutcome should be checked for success/unsatisfiable"]
pub enum PlanOutcome {
    /// Hack mode rewrote the source to the target checksum
    Forged { output: Vec<u8>, crc32: u32 },
    /// Hack mode found the source already at the target checksum
    AlreadyMatching { crc32: u32 },
    /// Zero mode found a checksum-neutral patch; `twin` is the source with
    /// the patch applied when a source was given
    Neutral { patch: Vec<u8>, twin: Option<Vec<u8>> },
    /// The allowed regions cannot produce a solution
    Unsatisfiable,
}

impl fmt::Display for PlanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOutcome::Forged { output, crc32 } => {
                write!(f, "Forged {} bytes to crc32 {:08x}", output.len(), crc32)
            }
            PlanOutcome::AlreadyMatching { crc32 } => {
                write!(f, "Already at crc32 {:08x}", crc32)
            }
            PlanOutcome::Neutral { patch, .. } => {
                let changed = patch.iter().filter(|&&b| b != 0).count();
                write!(f, "Neutral patch touching {} of {} bytes", changed, patch.len())
            }
            PlanOutcome::Unsatisfiable => write!(f, "No solution within the allowed regions"),
        }
    }
}

/// Errors during plan application
#[derive(Debug)]
pub enum ApplicationError {
    /// Plan failed validation
    Validation(ValidationError),
    /// Engine rejected the overwrite configuration
    Forge(ForgeError),
    /// Source does not match the plan's recorded digest
    VerifyMismatch {
        method: &'static str,
        expected: u64,
        found: u64,
    },
    /// Hack mode needs a source buffer
    MissingSource,
    /// Hack mode needs a target checksum
    MissingTarget,
    /// Zero mode needs a length or a source to take it from
    MissingLength,
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Validation(e) => write!(f, "invalid plan: {}", e),
            ApplicationError::Forge(e) => write!(f, "forge error: {}", e),
            ApplicationError::VerifyMismatch {
                method,
                expected,
                found,
            } => write!(
                f,
                "source verification failed ({}): expected {:x}, found {:x}",
                method, expected, found
            ),
            ApplicationError::MissingSource => write!(f, "hack mode requires a source buffer"),
            ApplicationError::MissingTarget => write!(f, "hack mode requires forge.target"),
            ApplicationError::MissingLength => {
                write!(f, "zero mode requires forge.length or a source buffer")
            }
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Validation(e) => Some(e),
            ApplicationError::Forge(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for ApplicationError {
    fn from(e: ValidationError) -> Self {
        ApplicationError::Validation(e)
    }
}

impl From<ForgeError> for ApplicationError {
    fn from(e: ForgeError) -> Self {
        ApplicationError::Forge(e)
    }
}

/// Run `plan` against `source`.
///
/// # Arguments
///
/// * `plan` - A validated forge plan
/// * `source` - The buffer to forge; optional in zero mode when the plan
///   sets `forge.length`
pub fn apply_plan(
    plan: &PlanConfig,
    source: Option<&[u8]>,
) -> Result<PlanOutcome, ApplicationError> {
    plan.validate()?;

    if let (Some(verify), Some(source)) = (&plan.verify, source) {
        let expected = verify.expected_value().unwrap_or_default();
        let found = verify.digest(source);
        if expected != found {
            return Err(ApplicationError::VerifyMismatch {
                method: verify.method(),
                expected,
                found,
            });
        }
        debug!(method = verify.method(), "source verified");
    }

    let specs = plan.specs()?;
    info!(
        plan = %plan.meta.name,
        mode = %plan.forge.mode,
        regions = specs.len(),
        "applying forge plan"
    );

    match plan.forge.mode {
        ForgeMode::Hack => {
            let source = source.ok_or(ApplicationError::MissingSource)?;
            let target = plan.target().ok_or(ApplicationError::MissingTarget)?;
            // The engine checks the regions against the source before it
            // looks at the checksum.
            Ok(match forge::hack(source, target, &specs)? {
                Some(output) if output == source => {
                    PlanOutcome::AlreadyMatching { crc32: target }
                }
                Some(output) => PlanOutcome::Forged {
                    crc32: crc::checksum(&output),
                    output,
                },
                None => PlanOutcome::Unsatisfiable,
            })
        }
        ForgeMode::Zero => {
            let length = plan
                .forge
                .length
                .or(source.map(<[u8]>::len))
                .ok_or(ApplicationError::MissingLength)?;
            Ok(match forge::zero(length, &specs)? {
                Some(patch) => {
                    let twin = source
                        .filter(|s| s.len() == patch.len())
                        .map(|s| s.iter().zip(&patch).map(|(a, b)| a ^ b).collect());
                    PlanOutcome::Neutral { patch, twin }
                }
                None => PlanOutcome::Unsatisfiable,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_from_str;
    use crate::overwrite::SpecError;

    #[test]
    fn test_apply_hack_plan() {
        let plan = load_from_str(
            r#"
[forge]
target = "0x01020304"

[[regions]]
offset = 2
length = 4
"#,
        )
        .unwrap();
        let source = b"xxxxxxxx".to_vec();

        let outcome = apply_plan(&plan, Some(&source)).unwrap();
        let PlanOutcome::Forged { output, crc32 } = outcome else {
            panic!("expected forged outcome");
        };
        assert_eq!(crc32, 0x0102_0304);
        assert_eq!(&output[..2], b"xx");
        assert_eq!(&output[6..], b"xx");
    }

    #[test]
    fn test_apply_hack_already_matching() {
        let source = b"hello".to_vec();
        let plan = load_from_str(&format!(
            "[forge]\ntarget = {}\n[[regions]]\noffset = 0\nlength = 1\n",
            crc::checksum(&source)
        ))
        .unwrap();
        assert!(matches!(
            apply_plan(&plan, Some(&source)).unwrap(),
            PlanOutcome::AlreadyMatching { .. }
        ));
    }

    #[test]
    fn test_apply_hack_already_matching_still_checks_regions() {
        let source = b"hello".to_vec();
        let plan = load_from_str(&format!(
            "[forge]\ntarget = {}\n\n\
             [[regions]]\noffset = 100\nlength = 4\n\n\
             [[regions]]\noffset = 0\nlength = 2\n\n\
             [[regions]]\noffset = 1\nlength = 2\n",
            crc::checksum(&source)
        ))
        .unwrap();

        let err = apply_plan(&plan, Some(&source)).unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Forge(ForgeError::Spec(SpecError::OutOfBounds {
                offset: 100,
                buffer_len: 5,
                ..
            }))
        ));

        let overlapping = load_from_str(&format!(
            "[forge]\ntarget = {}\n\n\
             [[regions]]\noffset = 0\nlength = 2\n\n\
             [[regions]]\noffset = 1\nlength = 2\n",
            crc::checksum(&source)
        ))
        .unwrap();
        assert!(matches!(
            apply_plan(&overlapping, Some(&source)),
            Err(ApplicationError::Forge(ForgeError::Spec(SpecError::Overlap { .. })))
        ));
    }

    #[test]
    fn test_apply_hack_without_source() {
        let plan =
            load_from_str("[forge]\ntarget = 1\n[[regions]]\noffset = 0\nlength = 4\n").unwrap();
        assert!(matches!(
            apply_plan(&plan, None),
            Err(ApplicationError::MissingSource)
        ));
    }

    #[test]
    fn test_apply_verify_mismatch() {
        let plan = load_from_str(
            r#"
[forge]
target = 0

[verify]
method = "crc32"
expected = "0x00000001"

[[regions]]
offset = 0
length = 4
"#,
        )
        .unwrap();
        assert!(matches!(
            apply_plan(&plan, Some(&b"abcdef"[..])),
            Err(ApplicationError::VerifyMismatch { method: "crc32", .. })
        ));
    }

    #[test]
    fn test_apply_zero_plan_with_twin() {
        let plan = load_from_str(
            r#"
[forge]
mode = "zero"

[[regions]]
offset = 0
length = 6
"#,
        )
        .unwrap();
        let source = b"abcdef".to_vec();

        let PlanOutcome::Neutral { patch, twin } = apply_plan(&plan, Some(&source)).unwrap() else {
            panic!("expected neutral outcome");
        };
        let twin = twin.unwrap();
        assert_eq!(crc::hash(&patch, 0), 0);
        assert_ne!(twin, source);
        assert_eq!(crc::checksum(&twin), crc::checksum(&source));
    }

    #[test]
    fn test_apply_zero_plan_needs_length() {
        let plan =
            load_from_str("[forge]\nmode = \"zero\"\n[[regions]]\noffset = 0\nlength = 6\n")
                .unwrap();
        assert!(matches!(
            apply_plan(&plan, None),
            Err(ApplicationError::MissingLength)
        ));
    }
}
