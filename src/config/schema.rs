use crate::crc;
use crate::overwrite::{OverwriteSpec, SpecError};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use xxhash_rust::xxh3::xxh3_64;

/// A forge plan: one hack or zero job over one buffer.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PlanConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub forge: ForgeSection,
    #[serde(default)]
    pub verify: Option<Verify>,
    #[serde(default)]
    pub regions: Vec<RegionDefinition>,
}

impl PlanConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.regions.is_empty() {
            issues.push(ValidationIssue::EmptyRegionList);
        }

        match self.forge.mode {
            ForgeMode::Hack => {
                match &self.forge.target {
                    None => issues.push(ValidationIssue::MissingField {
                        region: None,
                        field: "forge.target",
                    }),
                    Some(target) => {
                        if let Err(message) = target.as_u32() {
                            issues.push(ValidationIssue::InvalidValue {
                                region: None,
                                field: "forge.target",
                                message,
                            });
                        }
                    }
                }
                if self.forge.length.is_some() {
                    issues.push(ValidationIssue::InvalidCombo {
                        message: "forge.length only applies to zero mode".to_string(),
                    });
                }
            }
            ForgeMode::Zero => {
                if self.forge.target.is_some() {
                    issues.push(ValidationIssue::InvalidCombo {
                        message: "forge.target only applies to hack mode".to_string(),
                    });
                }
                if self.forge.length == Some(0) {
                    issues.push(ValidationIssue::InvalidValue {
                        region: None,
                        field: "forge.length",
                        message: "must be greater than zero".to_string(),
                    });
                }
            }
        }

        if let Some(verify) = &self.verify {
            if let Err(message) = verify.expected_value() {
                issues.push(ValidationIssue::InvalidValue {
                    region: None,
                    field: "verify.expected",
                    message,
                });
            }
        }

        for (index, region) in self.regions.iter().enumerate() {
            if let Err(issue) = region.to_spec_at(Some(index)) {
                issues.push(issue);
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Target checksum for hack mode.
    pub fn target(&self) -> Option<u32> {
        self.forge.target.as_ref().and_then(|t| t.as_u32().ok())
    }

    /// Build the overwrite specs in declaration order.
    pub fn specs(&self) -> Result<Vec<OverwriteSpec>, ValidationError> {
        let mut specs = Vec::with_capacity(self.regions.len());
        let mut issues = Vec::new();
        for (index, region) in self.regions.iter().enumerate() {
            match region.to_spec_at(Some(index)) {
                Ok(spec) => specs.push(spec),
                Err(issue) => issues.push(issue),
            }
        }
        if issues.is_empty() {
            Ok(specs)
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ForgeSection {
    #[serde(default)]
    pub mode: ForgeMode,
    /// Conventional CRC-32 the output must have (hack mode).
    #[serde(default)]
    pub target: Option<NumberLiteral>,
    /// Patch length (zero mode); defaults to the source length.
    #[serde(default)]
    pub length: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ForgeMode {
    #[default]
    Hack,
    Zero,
}

impl fmt::Display for ForgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForgeMode::Hack => write!(f, "hack"),
            ForgeMode::Zero => write!(f, "zero"),
        }
    }
}

/// An integer written either natively or as a string (`"0xdeadbeef"`, `"42"`).
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum NumberLiteral {
    Int(u64),
    Text(String),
}

impl NumberLiteral {
    pub fn as_u64(&self) -> Result<u64, String> {
        match self {
            NumberLiteral::Int(value) => Ok(*value),
            NumberLiteral::Text(text) => parse_number(text),
        }
    }

    pub fn as_u32(&self) -> Result<u32, String> {
        let value = self.as_u64()?;
        u32::try_from(value).map_err(|_| format!("{value:#x} does not fit in 32 bits"))
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number(text: &str) -> Result<u64, String> {
    let trimmed = text.trim().replace('_', "");
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid number '{text}': {e}"))
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Verify {
    /// Conventional CRC-32 of the source.
    Crc32 { expected: NumberLiteral },
    /// xxh3-64 of the source, hex encoded.
    Xxh3 { expected: String },
}

impl Verify {
    pub fn method(&self) -> &'static str {
        match self {
            Verify::Crc32 { .. } => "crc32",
            Verify::Xxh3 { .. } => "xxh3",
        }
    }

    pub fn expected_value(&self) -> Result<u64, String> {
        match self {
            Verify::Crc32 { expected } => expected.as_u32().map(u64::from),
            Verify::Xxh3 { expected } => {
                let hex = expected.trim();
                let hex = hex.strip_prefix("0x").unwrap_or(hex);
                u64::from_str_radix(hex, 16)
                    .map_err(|e| format!("invalid xxh3 digest '{expected}': {e}"))
            }
        }
    }

    /// Digest of `data` under this verification method.
    pub fn digest(&self, data: &[u8]) -> u64 {
        match self {
            Verify::Crc32 { .. } => u64::from(crc::checksum(data)),
            Verify::Xxh3 { .. } => xxh3_64(data),
        }
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        self.expected_value()
            .is_ok_and(|expected| expected == self.digest(data))
    }
}

/// One `[[regions]]` entry. `data` and `mask` are hex strings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RegionDefinition {
    pub offset: usize,
    pub length: usize,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
}

impl RegionDefinition {
    pub fn to_spec(&self) -> Result<OverwriteSpec, ValidationIssue> {
        self.to_spec_at(None)
    }

    fn to_spec_at(&self, region: Option<usize>) -> Result<OverwriteSpec, ValidationIssue> {
        let decode = |field: &'static str, text: &Option<String>| {
            text.as_deref()
                .map(|t| hex::decode(t.trim()))
                .transpose()
                .map_err(|e| ValidationIssue::InvalidValue {
                    region,
                    field,
                    message: e.to_string(),
                })
        };
        let data = decode("data", &self.data)?;
        let mask = decode("mask", &self.mask)?;

        OverwriteSpec::build(self.offset, self.length, data, mask).map_err(|e| {
            let field = match e {
                SpecError::DataLengthMismatch { .. } => "data",
                SpecError::MaskLengthMismatch { .. } => "mask",
                SpecError::OutOfBounds { .. } => "offset",
                SpecError::ZeroLength { .. } | SpecError::Overlap { .. } => "length",
            };
            ValidationIssue::InvalidValue {
                region,
                field,
                message: e.to_string(),
            }
        })
    }
}

/// Command-line form: `OFFSET:LENGTH[:mask=HEX][:data=HEX]`.
impl FromStr for RegionDefinition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let offset = parts
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| format!("region '{s}' is missing an offset"))?;
        let length = parts
            .next()
            .ok_or_else(|| format!("region '{s}' is missing a length"))?;

        let to_usize = |text: &str| {
            parse_number(text).and_then(|v| {
                usize::try_from(v).map_err(|_| format!("{v} does not fit in usize"))
            })
        };

        let mut region = RegionDefinition {
            offset: to_usize(offset)?,
            length: to_usize(length)?,
            data: None,
            mask: None,
        };

        for option in parts {
            match option.split_once('=') {
                Some(("data", hex)) => region.data = Some(hex.to_string()),
                Some(("mask", hex)) => region.mask = Some(hex.to_string()),
                _ => {
                    return Err(format!(
                        "unknown region option '{option}' (expected data=HEX or mask=HEX)"
                    ))
                }
            }
        }

        Ok(region)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyRegionList,
    MissingField {
        region: Option<usize>,
        field: &'static str,
    },
    InvalidValue {
        region: Option<usize>,
        field: &'static str,
        message: String,
    },
    InvalidCombo {
        message: String,
    },
}

impl ValidationIssue {
    /// Index of the `[[regions]]` entry the issue belongs to, if any.
    pub fn region(&self) -> Option<usize> {
        match self {
            ValidationIssue::MissingField { region, .. }
            | ValidationIssue::InvalidValue { region, .. } => *region,
            ValidationIssue::EmptyRegionList | ValidationIssue::InvalidCombo { .. } => None,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyRegionList => write!(f, "forge plan contains no regions"),
            ValidationIssue::MissingField { region, field } => match region {
                Some(idx) => write!(f, "region #{idx} missing required field '{field}'"),
                None => write!(f, "plan missing required field '{field}'"),
            },
            ValidationIssue::InvalidValue {
                region,
                field,
                message,
            } => match region {
                Some(idx) => write!(f, "region #{idx} has invalid '{field}': {message}"),
                None => write!(f, "plan has invalid '{field}': {message}"),
            },
            ValidationIssue::InvalidCombo { message } => {
                write!(f, "invalid plan configuration: {message}")
            }
        }
    }
}
