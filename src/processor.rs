// ==============================================================================
// processor.rs - Identity Vigilance Batch Pipeline
// ==============================================================================
// Description: Runs one batch from upload to report (intra, inter, similarity)
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Pipeline:
//   validate upload -> load -> check columns -> drop columns -> prepare
//   -> intra-patient -> inter-patient -> similarity matrix
// A missing required column stops the batch. An exhausted similarity
// budget does not: the report is produced without a matrix.
// ==============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use crate::comparison::{ComparisonEngine, InterComparison, IntraComparison};
use crate::config::VigilanceConfig;
use crate::models::SampleTable;
use crate::parsers::{FormatError, GenemapperParser};
use crate::signature::SignatureDeriver;
use crate::similarity::{SimilarityBuilder, SimilarityMatrix};
use crate::validator::{FileValidator, TableValidator, ValidatedFile};

/// Free-text fields of the QC report form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportInfo {
    pub interpreter: Option<String>,
    pub week: Option<String>,
    pub series: Option<String>,
    pub comment: Option<String>,
}

/// Run metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub run_id: Uuid,
    pub processed_at: DateTime<Utc>,
    pub tool_version: String,
    pub input_file: Option<String>,
    pub input_sha256: Option<String>,
    pub sample_count: usize,
    pub allele_columns: usize,
    #[serde(flatten)]
    pub info: ReportInfo,
}

/// Everything produced for one batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub metadata: ReportMetadata,
    pub intra: IntraComparison,
    pub inter: InterComparison,
    pub errors_intra: usize,
    pub errors_inter: usize,
    pub negative_control_clean: bool,
    /// None when the matrix budget ran out
    pub similarity: Option<SimilarityMatrix>,
}

impl BatchReport {
    /// No intra-patient error and no inter-patient collision
    pub fn passed(&self) -> bool {
        self.errors_intra == 0 && self.errors_inter == 0
    }
}

pub struct VigilanceProcessor {
    config: VigilanceConfig,
    file_validator: FileValidator,
    info: ReportInfo,
}

impl VigilanceProcessor {
    pub fn new(config: VigilanceConfig) -> Self {
        Self {
            config,
            file_validator: FileValidator::new(),
            info: ReportInfo::default(),
        }
    }

    pub fn with_report_info(mut self, info: ReportInfo) -> Self {
        self.info = info;
        self
    }

    pub fn with_file_validator(mut self, file_validator: FileValidator) -> Self {
        self.file_validator = file_validator;
        self
    }

    pub fn config(&self) -> &VigilanceConfig {
        &self.config
    }

    /// Main processing pipeline for an exported file
    pub fn process(&self, path: &Path) -> Result<BatchReport> {
        info!("Starting identity vigilance for {:?}", path);

        // 1. Upload checks and fingerprint
        let validated = self
            .file_validator
            .validate_upload(path)
            .context("Input file rejected")?;

        // 2. Load
        let table = GenemapperParser::new()
            .parse(path)
            .with_context(|| format!("Failed to load {}", validated.original_name))?;
        info!(
            "Loaded {} rows x {} columns from {}",
            table.len(),
            table.columns.len(),
            validated.original_name
        );

        // 3. Comparisons
        let report = self.run(table, Some(&validated))?;

        info!(
            "Batch {} {}: {} intra error(s), {} inter error(s)",
            report.metadata.run_id,
            if report.passed() { "passed" } else { "failed" },
            report.errors_intra,
            report.errors_inter
        );
        Ok(report)
    }

    /// Same pipeline on an already-loaded table
    pub fn process_table(&self, table: SampleTable) -> Result<BatchReport, FormatError> {
        self.run(table, None)
    }

    fn run(
        &self,
        table: SampleTable,
        source: Option<&ValidatedFile>,
    ) -> Result<BatchReport, FormatError> {
        let validator = TableValidator::new(&self.config);

        let missing = validator.validate(&table);
        if !missing.is_empty() {
            return Err(FormatError::MissingColumns(missing));
        }
        let table = validator.clean(table);

        let batch = SignatureDeriver::new(&self.config).prepare(&table)?;
        let engine = ComparisonEngine::new(&batch);

        let intra = engine.perform_intra_comparison();
        let inter = engine.perform_inter_comparison();

        if !intra.negative_control_clean {
            warn!("Negative controls are missing or carry alleles");
        }

        let similarity = match SimilarityBuilder::from_config(&self.config.similarity).build(&batch) {
            Ok(matrix) => Some(matrix),
            Err(e) => {
                warn!("Similarity matrix skipped: {}", e);
                None
            }
        };

        let metadata = ReportMetadata {
            run_id: Uuid::new_v4(),
            processed_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            input_file: source.map(|f| f.original_name.clone()),
            input_sha256: source.map(|f| f.hash_sha256.clone()),
            sample_count: batch.len(),
            allele_columns: batch.allele_columns.len(),
            info: self.info.clone(),
        };

        Ok(BatchReport {
            metadata,
            errors_intra: intra.error_count,
            errors_inter: inter.error_count,
            negative_control_clean: intra.negative_control_clean,
            intra,
            inter,
            similarity,
        })
    }
}
