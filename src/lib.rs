//! CRC Patcher: forge CRC-32 checksums by editing permitted bits
//!
//! Given a buffer and a map of which byte ranges (and which bits inside them)
//! may change, compute edits that give the buffer any chosen CRC-32, or find
//! a nonzero patch that leaves every buffer's CRC-32 unchanged.
//!
//! # Architecture
//!
//! CRC-32 without its pre/post complement is linear over GF(2). Every
//! permitted edit therefore has a fixed effect vector on the final register,
//! computed with [`crc::shift`] in O(log n). The [`solver::LinearBasis`]
//! collects effect vectors until the required delta is in their span, and
//! the certificate it returns names exactly which edits to apply.
//!
//! - [`bits`]: 32-bit GF(2) vectors
//! - [`crc`]: table-driven CRC-32, zero-byte shift tables
//! - [`solver`]: online Gaussian elimination with certificates
//! - [`overwrite`]: editable region specs and their validation
//! - [`forge`]: the [`hack`] and [`zero`] engines
//! - [`config`]: TOML forge plans
//! - [`output`]: atomic writes of forged files
//!
//! # Example
//!
//! ```
//! use crc_patcher::{crc, hack, OverwriteSpec};
//!
//! let source = [0x12, 0x23, 0x34, 0x45, 0, 0, 0, 0, 0x99, 0x88, 0x77];
//! let spec = OverwriteSpec::new(4, 4)?;
//!
//! let output = hack(&source, 0xDEAD_BEEF, &[spec])?.expect("four free bytes reach any crc");
//! assert_eq!(crc::checksum(&output), 0xDEAD_BEEF);
//! assert_eq!(output[..4], source[..4]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bits;
pub mod config;
pub mod crc;
pub mod forge;
pub mod output;
pub mod overwrite;
pub mod solver;

// Re-exports
pub use bits::BitVector32;
pub use config::{
    apply_plan, load_from_path, load_from_str, ApplicationError, ConfigError, PlanConfig,
    PlanOutcome,
};
pub use forge::{hack, zero, ForgeError, Operation};
pub use output::{atomic_write, OutputError};
pub use overwrite::{validate_specs, OverwriteSpec, SpecError};
pub use solver::{LinearBasis, Representation, SolverError};
