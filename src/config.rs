// ==============================================================================
// config.rs - Identity Vigilance Configuration
// ==============================================================================
// Description: Immutable configuration (schema, markers, keywords, matrix budget)
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Number of "Allele N" columns a GeneMapper export must carry
pub const REQUIRED_ALLELE_COLUMNS: usize = 34;

/// Errors raised while loading or checking a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Fixed constants of the QC engine, passed explicitly into every component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilanceConfig {
    /// Prefix shared by every allele-call column (e.g., "Allele 12")
    pub allele_prefix: String,

    /// Column carrying the X sex marker
    pub sex_marker_x: String,

    /// Column carrying the Y sex marker
    pub sex_marker_y: String,

    /// Expected call in the X-marker column
    pub x_call: String,

    /// Expected call in the Y-marker column
    pub y_call: String,

    /// Column holding the sample identifier
    pub sample_name_column: String,

    /// Case-insensitive substrings flagging a negative control
    pub negative_keywords: Vec<String>,

    /// Trailing markers of a repeated sample ("P1bis" belongs to "P1")
    pub repeat_suffixes: Vec<String>,

    /// Columns the input file must provide
    pub required_columns: Vec<String>,

    /// Columns removed before analysis (absent ones are ignored)
    pub columns_to_drop: Vec<String>,

    /// Similarity matrix budget and parallelism
    pub similarity: SimilarityConfig,
}

/// Budget for the all-pairs similarity step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Wall-clock limit for the matrix step, in seconds
    pub max_duration_secs: Option<u64>,

    /// Maximum number of off-diagonal pairs (i < j) to compute
    pub max_pairs: Option<usize>,

    /// Worker threads for the matrix (None = rayon default)
    pub threads: Option<usize>,
}

impl SimilarityConfig {
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs)
    }
}

impl Default for VigilanceConfig {
    fn default() -> Self {
        let allele_prefix = "Allele".to_string();

        let mut required_columns: Vec<String> = ["Sample File", "Sample Name", "Panel", "Marker", "Dye"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        required_columns.extend(
            (1..=REQUIRED_ALLELE_COLUMNS).map(|i| format!("{} {}", allele_prefix, i)),
        );

        let columns_to_drop = [
            "Sample File",
            "Panel",
            "Marker",
            "Dye",
            "Allele 31",
            "Allele 32",
            "Unnamed: 39",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            allele_prefix,
            sex_marker_x: "Allele 29".to_string(),
            sex_marker_y: "Allele 30".to_string(),
            x_call: "X".to_string(),
            y_call: "Y".to_string(),
            sample_name_column: "Sample Name".to_string(),
            negative_keywords: vec!["neg".to_string(), "tem".to_string()],
            repeat_suffixes: vec!["bis".to_string(), "ter".to_string()],
            required_columns,
            columns_to_drop,
            similarity: SimilarityConfig::default(),
        }
    }
}

impl VigilanceConfig {
    /// Load a configuration from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: VigilanceConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allele_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("allele_prefix must not be empty".into()));
        }

        if self.sex_marker_x == self.sex_marker_y {
            return Err(ConfigError::Invalid(format!(
                "sex marker columns must differ (both '{}')",
                self.sex_marker_x
            )));
        }

        if self.sample_name_column.trim().is_empty() {
            return Err(ConfigError::Invalid("sample_name_column must not be empty".into()));
        }

        if self.negative_keywords.iter().any(|k| k.is_empty()) {
            // An empty keyword would match every sample name
            return Err(ConfigError::Invalid("negative_keywords must not contain empty strings".into()));
        }

        if self.repeat_suffixes.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::Invalid("repeat_suffixes must not contain empty strings".into()));
        }

        if self.similarity.threads == Some(0) {
            return Err(ConfigError::Invalid("similarity.threads must be at least 1".into()));
        }

        Ok(())
    }

    /// True when the column name belongs to the allele-call run
    pub fn is_allele_column(&self, column: &str) -> bool {
        column.starts_with(&self.allele_prefix)
    }

    /// True when the column is one of the two sex-marker slots
    pub fn is_sex_marker(&self, column: &str) -> bool {
        column == self.sex_marker_x || column == self.sex_marker_y
    }
}
