//! Reading forge plans from TOML.
//!
//! Validation failures point at the line of the `[[regions]]` table they
//! came from.

use crate::config::schema::{PlanConfig, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
        /// 1-based line of each `[[regions]]` header, in declaration order
        region_lines: Vec<usize>,
    },
}

impl ConfigError {
    /// Line of the `[[regions]]` header for region `index`.
    pub fn region_line(&self, index: usize) -> Option<usize> {
        match self {
            ConfigError::Validation { region_lines, .. } => region_lines.get(index).copied(),
            _ => None,
        }
    }

    fn at(self, plan_path: &Path) -> Self {
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(plan_path.to_path_buf()),
                source,
            },
            ConfigError::Validation {
                path: None,
                source,
                region_lines,
            } => ConfigError::Validation {
                path: Some(plan_path.to_path_buf()),
                source,
                region_lines,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read forge plan {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => {
                write!(f, "forge plan is not valid TOML")?;
                if let Some(path) = path {
                    write!(f, " ({})", path.display())?;
                }
                write!(f, ": {}", source)
            }
            ConfigError::Validation { path, source, .. } => {
                write!(f, "invalid forge plan")?;
                if let Some(path) = path {
                    write!(f, " ({})", path.display())?;
                }
                write!(f, ":")?;
                for issue in &source.issues {
                    write!(f, "\n  - {}", issue)?;
                    if let Some(line) = issue.region().and_then(|idx| self.region_line(idx)) {
                        write!(f, " (line {})", line)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

/// Header lines of the `[[regions]]` array, matching the order serde
/// deserializes the entries in.
fn region_lines(input: &str) -> Vec<usize> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let header = line.split('#').next().unwrap_or_default().trim();
            header
                .strip_prefix("[[")
                .and_then(|rest| rest.strip_suffix("]]"))
                .is_some_and(|name| name.trim() == "regions")
        })
        .map(|(idx, _)| idx + 1)
        .collect()
}

pub fn load_from_str(input: &str) -> Result<PlanConfig, ConfigError> {
    let plan: PlanConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    plan.validate()
        .map_err(|source| ConfigError::Validation {
            path: None,
            source,
            region_lines: region_lines(input),
        })?;
    Ok(plan)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PlanConfig, ConfigError> {
    let path = path.as_ref();
    let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&input).map_err(|error| error.at(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ForgeMode, ValidationIssue};

    #[test]
    fn test_load_hack_plan() {
        let plan = load_from_str(
            r#"
[meta]
name = "trailer"

[forge]
mode = "hack"
target = "0xdeadbeef"

[[regions]]
offset = 4
length = 4

[[regions]]
offset = 10
length = 2
mask = "0f0f"
data = "4142"
"#,
        )
        .unwrap();

        assert_eq!(plan.meta.name, "trailer");
        assert_eq!(plan.forge.mode, ForgeMode::Hack);
        assert_eq!(plan.target(), Some(0xDEAD_BEEF));
        let specs = plan.specs().unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].mask(), Some(&[0x0F, 0x0F][..]));
    }

    #[test]
    fn test_integer_target() {
        let plan =
            load_from_str("[forge]\ntarget = 305419896\n\n[[regions]]\noffset = 0\nlength = 4\n")
                .unwrap();
        assert_eq!(plan.forge.mode, ForgeMode::Hack);
        assert_eq!(plan.target(), Some(0x1234_5678));
    }

    #[test]
    fn test_validation_collects_issues() {
        let err = load_from_str(
            r#"
[forge]
mode = "hack"
length = 8

[[regions]]
offset = 0
length = 2
mask = "ff"
"#,
        )
        .unwrap_err();

        let ConfigError::Validation { source, .. } = &err else {
            panic!("expected validation error, got {err}");
        };
        assert_eq!(source.issues.len(), 3);
        assert!(source
            .issues
            .iter()
            .any(|i| matches!(i, ValidationIssue::MissingField { field: "forge.target", .. })));
        assert!(source
            .issues
            .iter()
            .any(|i| matches!(i, ValidationIssue::InvalidCombo { .. })));
        assert!(source
            .issues
            .iter()
            .any(|i| matches!(
                i,
                ValidationIssue::InvalidValue {
                    region: Some(0),
                    field: "mask",
                    ..
                }
            )));
    }

    #[test]
    fn test_region_issues_carry_line_numbers() {
        let input = "\
[forge]
target = 1

[[regions]]
offset = 0
length = 4

# second region has a bad hex string
[[regions]]
offset = 8
length = 2
data = \"xyz\"
";
        let err = load_from_str(input).unwrap_err();
        assert_eq!(err.region_line(0), Some(4));
        assert_eq!(err.region_line(1), Some(9));

        let message = err.to_string();
        assert!(message.contains("region #1 has invalid 'data'"));
        assert!(message.contains("(line 9)"));
        assert!(!message.contains("(line 4)"));
    }

    #[test]
    fn test_region_lines_ignore_other_tables() {
        let input = "[meta]\n[[regions]]\n[forge]\n  [[regions]] # trailing\n[[regionsx]]\n";
        assert_eq!(region_lines(input), vec![2, 4]);
    }

    #[test]
    fn test_zero_plan_rejects_target() {
        let err = load_from_str(
            r#"
[forge]
mode = "zero"
target = 1

[[regions]]
offset = 0
length = 5
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("only applies to hack mode"));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            load_from_str("[forge"),
            Err(ConfigError::Toml { path: None, .. })
        ));
    }

    #[test]
    fn test_load_from_path_attaches_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.toml");
        fs::write(&path, "[forge]\nmode = \"zero\"\n").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { path: Some(_), .. }));
        assert!(err.to_string().contains("no regions"));

        let missing = load_from_path(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
