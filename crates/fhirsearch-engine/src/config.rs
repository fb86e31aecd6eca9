//! Search settings.
//!
//! Process-wide constants (control parameters, page sizes, inclusion depth) are
//! resolved once into an immutable [`SearchSettings`] shared by every request.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// FHIR schema version handed to the inclusion query builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FhirVersion {
    #[serde(rename = "3.0.1", alias = "STU3")]
    Stu3,
    #[default]
    #[serde(rename = "4.0.1", alias = "R4")]
    R4,
    #[serde(rename = "4.3.0", alias = "R4B")]
    R4B,
    #[serde(rename = "5.0.0", alias = "R5")]
    R5,
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FhirVersion::Stu3 => write!(f, "3.0.1"),
            FhirVersion::R4 => write!(f, "4.0.1"),
            FhirVersion::R4B => write!(f, "4.3.0"),
            FhirVersion::R5 => write!(f, "5.0.0"),
        }
    }
}

impl FromStr for FhirVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3.0.1" | "STU3" => Ok(FhirVersion::Stu3),
            "4.0.1" | "R4" => Ok(FhirVersion::R4),
            "4.3.0" | "R4B" => Ok(FhirVersion::R4B),
            "5.0.0" | "R5" => Ok(FhirVersion::R5),
            _ => Err(ConfigError::parse(format!("Unknown FHIR version: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Page size used when the request carries no `_count`.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    /// Upper bound for `_count`; larger values are clamped.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// Maximum number of `:iterate` expansion rounds.
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
    /// Size of every inclusion query.
    #[serde(default = "default_max_inclusion_results")]
    pub max_inclusion_results: usize,
    #[serde(default = "default_offset_param")]
    pub offset_param: String,
    #[serde(default = "default_count_param")]
    pub count_param: String,
    /// Control parameters never turned into match clauses.
    #[serde(default = "default_non_searchable_params")]
    pub non_searchable_params: Vec<String>,
    /// Base URLs of absolute references stored in documents; reverse includes
    /// also match `{base}/Type/id`.
    #[serde(default)]
    pub reference_base_urls: Vec<String>,
    /// Storage-internal document fields removed before resources are returned.
    #[serde(default = "default_internal_fields")]
    pub internal_fields: Vec<String>,
    #[serde(default)]
    pub fhir_version: FhirVersion,
}

fn default_page_size() -> usize {
    20
}
fn default_max_page_size() -> usize {
    1000
}
fn default_max_include_depth() -> usize {
    5
}
fn default_max_inclusion_results() -> usize {
    10_000
}
fn default_offset_param() -> String {
    "_getpagesoffset".into()
}
fn default_count_param() -> String {
    "_count".into()
}
fn default_non_searchable_params() -> Vec<String> {
    [
        "_getpagesoffset",
        "_count",
        "_format",
        "_include",
        "_revinclude",
        "_include:iterate",
        "_revinclude:iterate",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_internal_fields() -> Vec<String> {
    ["documentStatus", "lockEndTs", "vid", "_references", "_tenantId"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            max_include_depth: default_max_include_depth(),
            max_inclusion_results: default_max_inclusion_results(),
            offset_param: default_offset_param(),
            count_param: default_count_param(),
            non_searchable_params: default_non_searchable_params(),
            reference_base_urls: Vec::new(),
            internal_fields: default_internal_fields(),
            fhir_version: FhirVersion::default(),
        }
    }
}

impl SearchSettings {
    /// Parses settings from TOML; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content).map_err(|e| ConfigError::parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads and parses a TOML settings file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::validation("default_page_size must be > 0"));
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::validation("max_page_size must be > 0"));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::validation(
                "default_page_size must be <= max_page_size",
            ));
        }
        if self.max_include_depth == 0 {
            return Err(ConfigError::validation("max_include_depth must be > 0"));
        }
        if self.max_inclusion_results == 0 {
            return Err(ConfigError::validation("max_inclusion_results must be > 0"));
        }
        Ok(())
    }

    /// Returns `true` if `name` is a control parameter.
    pub fn is_non_searchable(&self, name: &str) -> bool {
        self.non_searchable_params.iter().any(|p| p == name)
    }
}
