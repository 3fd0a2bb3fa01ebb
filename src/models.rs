// ==============================================================================
// models.rs - Identity Vigilance Data Models
// ==============================================================================
// Description: Sample table, signatures, sex calls and comparison statuses
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Normalize one allele call: trimmed value, or None when the cell is
/// empty or holds the literal "nan" (any case)
pub fn normalize_call(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(value.to_string())
    }
}

/// In-memory tab-delimited table: one header, one row per sample
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SampleTable {
    /// Build a table, padding short rows with empty cells
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Raw cell value; empty string for out-of-range access
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Raw cell value by column name
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        self.column_index(column).map(|idx| self.cell(row, idx))
    }

    /// Remove the named columns, ignoring names that are absent.
    /// Returns the number of columns actually removed.
    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !names.iter().any(|n| n.as_ref() == c))
            .collect();
        let removed = keep.iter().filter(|k| !**k).count();
        if removed == 0 {
            return 0;
        }

        self.columns = filter_by_mask(std::mem::take(&mut self.columns), &keep);
        self.rows = std::mem::take(&mut self.rows)
            .into_iter()
            .map(|row| filter_by_mask(row, &keep))
            .collect();

        removed
    }
}

fn filter_by_mask(values: Vec<String>, keep: &[bool]) -> Vec<String> {
    values
        .into_iter()
        .zip(keep.iter())
        .filter_map(|(v, k)| if *k { Some(v) } else { None })
        .collect()
}

/// Sex inferred from the two sex-marker slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Undetermined,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
            Sex::Undetermined => "undetermined",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered tuple of observed allele calls (canonical column order, gaps removed)
///
/// Equality is element-wise and order-sensitive: the same calls spread over
/// different columns form different signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Signature(Vec<String>);

impl Signature {
    pub fn new(alleles: Vec<String>) -> Self {
        Self(alleles)
    }

    pub fn alleles(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical string form used for hashing: each call as
    /// `<byte length>:<call>`, separated by tabs. The length prefix keeps
    /// the encoding unambiguous even when a quoted cell carries a tab.
    pub fn canonical_string(&self) -> String {
        self.0
            .iter()
            .map(|call| format!("{}:{}", call.len(), call))
            .collect::<Vec<_>>()
            .join("\t")
    }
}

/// Hex SHA-256 digest of a signature's canonical string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureHash(String);

impl SignatureHash {
    pub fn from_hex(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignatureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Severity of a comparison status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusType {
    Success,
    Warning,
    Info,
    Error,
}

impl StatusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusType::Success => "success",
            StatusType::Warning => "warning",
            StatusType::Info => "info",
            StatusType::Error => "error",
        }
    }
}

/// Why a sample did not come out as a plain success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
    NoAllelesFound,
    UniqueSample,
    NegativeControl,
    NegativeControlWithAlleles,
    InconsistentSnps,
    SexInconsistency,
}

impl StatusReason {
    pub fn description(&self) -> &'static str {
        match self {
            StatusReason::NoAllelesFound => "no alleles found",
            StatusReason::UniqueSample => "unique sample",
            StatusReason::NegativeControl => "negative control",
            StatusReason::NegativeControlWithAlleles => "negative control with alleles present",
            StatusReason::InconsistentSnps => "inconsistent SNPs",
            StatusReason::SexInconsistency => "sex inconsistency",
        }
    }
}

/// Outcome of the intra-patient comparison for one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(into = "StatusRecord")]
pub enum ComparisonStatus {
    #[default]
    Success,
    Warning(StatusReason),
    Info(StatusReason),
    Error(StatusReason),
}

impl ComparisonStatus {
    pub fn status_type(&self) -> StatusType {
        match self {
            ComparisonStatus::Success => StatusType::Success,
            ComparisonStatus::Warning(_) => StatusType::Warning,
            ComparisonStatus::Info(_) => StatusType::Info,
            ComparisonStatus::Error(_) => StatusType::Error,
        }
    }

    pub fn reason(&self) -> Option<StatusReason> {
        match self {
            ComparisonStatus::Success => None,
            ComparisonStatus::Warning(r) | ComparisonStatus::Info(r) | ComparisonStatus::Error(r) => {
                Some(*r)
            }
        }
    }

    /// Free-text description ("" for success)
    pub fn description(&self) -> &'static str {
        self.reason().map(|r| r.description()).unwrap_or("")
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ComparisonStatus::Success)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ComparisonStatus::Error(_))
    }
}

/// Flat serialized form of a status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status_type: StatusType,
    pub status_description: String,
}

impl From<ComparisonStatus> for StatusRecord {
    fn from(status: ComparisonStatus) -> Self {
        Self {
            status_type: status.status_type(),
            status_description: status.description().to_string(),
        }
    }
}

/// One input row after signature derivation
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSample {
    /// Position of the row in the input table
    pub row_index: usize,

    /// Sample identifier as found in the file (e.g., "P12bis")
    pub sample_name: String,

    /// Sample name with a trailing repeat suffix removed (e.g., "P12")
    pub patient_id: String,

    /// Normalized calls for every canonical allele column (None = missing)
    pub alleles: Vec<Option<String>>,

    pub signature: Signature,
    pub signature_hash: SignatureHash,
    pub sex: Sex,
    pub is_negative_control: bool,

    /// Initial status before any comparison runs
    pub status: ComparisonStatus,
}

impl PreparedSample {
    pub fn signature_len(&self) -> usize {
        self.signature.len()
    }
}

/// Prepared table shared by every comparison step
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreparedBatch {
    /// Canonical allele columns (sex markers excluded), in signature order
    pub allele_columns: Vec<String>,
    pub samples: Vec<PreparedSample>,
}

impl PreparedBatch {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample indices grouped by patient, in sorted patient order
    pub fn patient_groups(&self) -> BTreeMap<&str, Vec<usize>> {
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, sample) in self.samples.iter().enumerate() {
            groups.entry(sample.patient_id.as_str()).or_default().push(idx);
        }
        groups
    }
}
