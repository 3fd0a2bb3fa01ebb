// ==============================================================================
// signature.rs - Genetic Signature Derivation
// ==============================================================================
// Description: Per-sample signature, hash, sex call, patient id and control flag
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Algorithm:
//   - Canonical allele columns: every "Allele N" column except the two
//     sex markers, ordered by N
//   - Signature: trimmed calls in canonical order, empty/"nan" removed
//   - Hash: SHA-256 over the signature's canonical (length-prefixed) string
//   - Sex: X-marker == "X" and Y-marker empty  -> female
//          X-marker == "X" and Y-marker == "Y" -> male
//          anything else                      -> undetermined
// ==============================================================================

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::VigilanceConfig;
use crate::models::{
    normalize_call, ComparisonStatus, PreparedBatch, PreparedSample, SampleTable, Sex, Signature,
    SignatureHash,
};
use crate::parsers::FormatError;

/// Maps a sample name to its patient by stripping one trailing repeat
/// marker. Only the configured literal suffixes ("bis", "ter") are
/// recognized; "P1bis" and "P1ter" belong to "P1", "P1-2" stays "P1-2".
/// Matching is case-sensitive.
#[derive(Debug, Clone)]
pub struct PatientIdMatcher {
    suffixes: Vec<String>,
}

impl PatientIdMatcher {
    pub fn new(suffixes: Vec<String>) -> Self {
        Self { suffixes }
    }

    pub fn from_config(config: &VigilanceConfig) -> Self {
        Self::new(config.repeat_suffixes.clone())
    }

    pub fn patient_id<'n>(&self, sample_name: &'n str) -> &'n str {
        self.suffixes
            .iter()
            .find_map(|suffix| sample_name.strip_suffix(suffix.as_str()))
            .unwrap_or(sample_name)
    }
}

/// Derives everything the comparison engine needs from a cleaned table
pub struct SignatureDeriver<'a> {
    config: &'a VigilanceConfig,
    patients: PatientIdMatcher,
}

impl<'a> SignatureDeriver<'a> {
    pub fn new(config: &'a VigilanceConfig) -> Self {
        Self {
            config,
            patients: PatientIdMatcher::from_config(config),
        }
    }

    /// Allele columns used for signatures, sex markers excluded.
    ///
    /// Ordered by the numeric part of the column name so that the order,
    /// and every hash derived from it, does not depend on the file's
    /// column layout. Names without a numeric part keep table order, last.
    pub fn canonical_allele_columns(&self, table: &SampleTable) -> Vec<String> {
        let mut columns: Vec<(Option<u32>, usize, &String)> = table
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| self.config.is_allele_column(c) && !self.config.is_sex_marker(c))
            .map(|(idx, c)| (self.allele_number(c), idx, c))
            .collect();

        columns.sort_by_key(|(number, idx, _)| (number.is_none(), *number, *idx));
        columns.into_iter().map(|(_, _, c)| c.clone()).collect()
    }

    fn allele_number(&self, column: &str) -> Option<u32> {
        column
            .strip_prefix(self.config.allele_prefix.as_str())
            .and_then(|rest| rest.trim().parse().ok())
    }

    /// Sex call from the X and Y marker slots (exact string comparison)
    pub fn determine_sex(&self, x_marker: Option<&str>, y_marker: Option<&str>) -> Sex {
        let x_is_x = x_marker == Some(self.config.x_call.as_str());
        let y_missing = y_marker.and_then(normalize_call).is_none();

        match (x_is_x, y_missing, y_marker) {
            (true, true, _) => Sex::Female,
            (true, false, Some(y)) if y == self.config.y_call => Sex::Male,
            _ => Sex::Undetermined,
        }
    }

    /// Ordered tuple of non-missing calls
    pub fn compute_signature<I, S>(&self, calls: I) -> Signature
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Signature::new(
            calls
                .into_iter()
                .filter_map(|c| normalize_call(c.as_ref()))
                .collect(),
        )
    }

    /// Signature rebuilt from already-normalized calls
    pub fn signature_from_calls(&self, calls: &[Option<String>]) -> Signature {
        Signature::new(calls.iter().flatten().cloned().collect())
    }

    pub fn compute_signature_hash(&self, signature: &Signature) -> SignatureHash {
        let mut hasher = Sha256::new();
        hasher.update(signature.canonical_string().as_bytes());
        SignatureHash::from_hex(format!("{:x}", hasher.finalize()))
    }

    /// Case-insensitive keyword match on the sample name; empty names are
    /// never controls
    pub fn is_negative_control(&self, sample_name: &str) -> bool {
        if sample_name.is_empty() {
            return false;
        }
        let name = sample_name.to_lowercase();
        self.config
            .negative_keywords
            .iter()
            .any(|k| name.contains(&k.to_lowercase()))
    }

    pub fn patient_id<'n>(&self, sample_name: &'n str) -> &'n str {
        self.patients.patient_id(sample_name)
    }

    /// Derive every per-sample field and initialize statuses to success
    pub fn prepare(&self, table: &SampleTable) -> Result<PreparedBatch, FormatError> {
        let name_idx = table
            .column_index(&self.config.sample_name_column)
            .ok_or_else(|| FormatError::MissingColumns(vec![self.config.sample_name_column.clone()]))?;

        let allele_columns = self.canonical_allele_columns(table);
        let allele_idx: Vec<usize> = allele_columns
            .iter()
            .filter_map(|c| table.column_index(c))
            .collect();
        let x_idx = table.column_index(&self.config.sex_marker_x);
        let y_idx = table.column_index(&self.config.sex_marker_y);

        debug!(
            "Canonical allele columns: {} (first: {:?}, last: {:?})",
            allele_columns.len(),
            allele_columns.first(),
            allele_columns.last()
        );

        let samples: Vec<PreparedSample> = (0..table.len())
            .map(|row| {
                let sample_name = table.cell(row, name_idx).to_string();
                let alleles: Vec<Option<String>> = allele_idx
                    .iter()
                    .map(|&col| normalize_call(table.cell(row, col)))
                    .collect();

                let signature = self.signature_from_calls(&alleles);
                let signature_hash = self.compute_signature_hash(&signature);
                let sex = self.determine_sex(
                    x_idx.map(|col| table.cell(row, col)),
                    y_idx.map(|col| table.cell(row, col)),
                );

                PreparedSample {
                    row_index: row,
                    patient_id: self.patient_id(&sample_name).to_string(),
                    is_negative_control: self.is_negative_control(&sample_name),
                    sample_name,
                    alleles,
                    signature,
                    signature_hash,
                    sex,
                    status: ComparisonStatus::Success,
                }
            })
            .collect();

        let controls = samples.iter().filter(|s| s.is_negative_control).count();
        info!(
            "Prepared {} samples ({} negative controls, {} canonical allele columns)",
            samples.len(),
            controls,
            allele_columns.len()
        );

        Ok(PreparedBatch {
            allele_columns,
            samples,
        })
    }
}
