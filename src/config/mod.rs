pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{apply_plan, ApplicationError, PlanOutcome};
pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{
    parse_number, ForgeMode, ForgeSection, Metadata, NumberLiteral, PlanConfig, RegionDefinition,
    ValidationError, ValidationIssue, Verify,
};
