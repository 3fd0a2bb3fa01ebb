// ==============================================================================
// output.rs - Multi-Format Report Output
// ==============================================================================
// Description: Writes batch reports as JSON, TSV tables or a SQLite database
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

// SQLite for queryable database
use rusqlite::{params, Connection};

use crate::processor::BatchReport;

/// Supported report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Whole report, pretty-printed (web front-ends, archiving)
    Json,
    /// One tab-separated table per section (spreadsheets, heatmap tools)
    Tsv,
    /// SQLite database (querying across sections)
    Sqlite,
}

impl OutputFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Tsv => "tsv",
            OutputFormat::Sqlite => "db",
        }
    }

    /// Get MIME type for HTTP downloads
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Json => "application/json",
            OutputFormat::Tsv => "text/tab-separated-values",
            OutputFormat::Sqlite => "application/vnd.sqlite3",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Json => "json",
            OutputFormat::Tsv => "tsv",
            OutputFormat::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "tsv" => Ok(OutputFormat::Tsv),
            "sqlite" | "db" => Ok(OutputFormat::Sqlite),
            other => anyhow::bail!("Unknown output format '{}' (expected json, tsv or sqlite)", other),
        }
    }
}

fn format_identity(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

pub struct OutputGenerator {
    output_dir: PathBuf,
}

impl OutputGenerator {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Write the report in every requested format
    ///
    /// # Returns
    /// * Files written per format (TSV produces one file per section)
    pub fn generate(
        &self,
        formats: &[OutputFormat],
        report: &BatchReport,
    ) -> Result<HashMap<OutputFormat, Vec<PathBuf>>> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create output directory {:?}", self.output_dir))?;

        let mut result = HashMap::new();
        for format in formats {
            if result.contains_key(format) {
                continue;
            }
            let paths = match format {
                OutputFormat::Json => vec![self.generate_json(&self.path_for(report, None, format), report)?],
                OutputFormat::Tsv => self.generate_tsv(report)?,
                OutputFormat::Sqlite => vec![self.generate_sqlite(&self.path_for(report, None, format), report)?],
            };
            result.insert(*format, paths);
        }

        Ok(result)
    }

    fn path_for(&self, report: &BatchReport, section: Option<&str>, format: &OutputFormat) -> PathBuf {
        let stem = match section {
            Some(section) => format!("IdentityVigilance_{}_{}", report.metadata.run_id, section),
            None => format!("IdentityVigilance_{}", report.metadata.run_id),
        };
        self.output_dir.join(format!("{}.{}", stem, format.extension()))
    }

    fn generate_json(&self, path: &Path, report: &BatchReport) -> Result<PathBuf> {
        info!("Generating JSON output: {:?}", path);

        let file = std::fs::File::create(path)
            .context("Failed to create JSON output file")?;

        serde_json::to_writer_pretty(file, report)
            .context("Failed to write JSON output")?;

        Ok(path.to_path_buf())
    }

    fn generate_tsv(&self, report: &BatchReport) -> Result<Vec<PathBuf>> {
        let intra_path = self.path_for(report, Some("intra"), &OutputFormat::Tsv);
        let inter_path = self.path_for(report, Some("inter"), &OutputFormat::Tsv);

        info!("Generating TSV output: {:?}", intra_path);
        let mut writer = tsv_writer(&intra_path)?;
        let mut header = vec![
            "Patient ID".to_string(),
            "Sample Name".to_string(),
            "Sex".to_string(),
            "Status".to_string(),
            "Status Description".to_string(),
        ];
        header.extend(report.intra.locus_labels.iter().cloned());
        writer.write_record(&header)?;

        for row in &report.intra.rows {
            let mut record = vec![
                row.patient_id.clone(),
                row.sample_name.clone(),
                row.sex.to_string(),
                row.status.status_type().as_str().to_string(),
                row.status.description().to_string(),
            ];
            record.extend(row.loci.iter().cloned());
            writer.write_record(&record)?;
        }
        writer.flush().context("Failed to write intra TSV")?;

        info!("Generating TSV output: {:?}", inter_path);
        let mut writer = tsv_writer(&inter_path)?;
        let mut header = vec![
            "Patient ID".to_string(),
            "Sample Name".to_string(),
            "Sex".to_string(),
            "Signature Hash".to_string(),
        ];
        header.extend(report.inter.locus_labels.iter().cloned());
        writer.write_record(&header)?;

        for row in &report.inter.rows {
            let mut record = vec![
                row.patient_id.clone(),
                row.sample_name.clone(),
                row.sex.to_string(),
                row.signature_hash.to_string(),
            ];
            record.extend(row.loci.iter().cloned());
            writer.write_record(&record)?;
        }
        writer.flush().context("Failed to write inter TSV")?;

        let mut paths = vec![intra_path, inter_path];

        // Heatmap input, in display order
        if let Some(matrix) = &report.similarity {
            let matrix = matrix.natural_order();
            let path = self.path_for(report, Some("similarity"), &OutputFormat::Tsv);
            info!("Generating TSV output: {:?}", path);

            let mut writer = tsv_writer(&path)?;
            let mut header = vec![String::new()];
            header.extend(matrix.labels().iter().cloned());
            writer.write_record(&header)?;

            for (label, row) in matrix.labels().iter().zip(matrix.rows()) {
                let mut record = vec![label.clone()];
                record.extend(row.iter().map(|v| format_identity(*v)));
                writer.write_record(&record)?;
            }
            writer.flush().context("Failed to write similarity TSV")?;
            paths.push(path);
        }

        Ok(paths)
    }

    fn generate_sqlite(&self, path: &Path, report: &BatchReport) -> Result<PathBuf> {
        info!("Generating SQLite output: {:?}", path);

        if path.exists() {
            std::fs::remove_file(path).context("Failed to replace existing SQLite database")?;
        }
        let mut conn = Connection::open(path).context("Failed to create SQLite database")?;

        conn.execute_batch(
            "CREATE TABLE metadata (
                key TEXT PRIMARY KEY,
                value TEXT
            );
            CREATE TABLE intra (
                row_index INTEGER PRIMARY KEY,
                patient_id TEXT NOT NULL,
                sample_name TEXT NOT NULL,
                sex TEXT NOT NULL,
                status_type TEXT NOT NULL,
                status_description TEXT NOT NULL
            );
            CREATE TABLE inter (
                row_index INTEGER PRIMARY KEY,
                patient_id TEXT NOT NULL,
                sample_name TEXT NOT NULL,
                sex TEXT NOT NULL,
                signature_hash TEXT NOT NULL
            );
            CREATE TABLE genotypes (
                section TEXT NOT NULL,
                row_index INTEGER NOT NULL,
                locus TEXT NOT NULL,
                genotype TEXT NOT NULL,
                PRIMARY KEY (section, row_index, locus)
            );
            CREATE TABLE similarity (
                row_a INTEGER NOT NULL,
                row_b INTEGER NOT NULL,
                sample_a TEXT NOT NULL,
                sample_b TEXT NOT NULL,
                identity REAL,
                PRIMARY KEY (row_a, row_b)
            );",
        )
        .context("Failed to create report tables")?;

        let meta = &report.metadata;
        let metadata_items: Vec<(&str, Option<String>)> = vec![
            ("run_id", Some(meta.run_id.to_string())),
            ("processed_at", Some(meta.processed_at.to_rfc3339())),
            ("tool_version", Some(meta.tool_version.clone())),
            ("input_file", meta.input_file.clone()),
            ("input_sha256", meta.input_sha256.clone()),
            ("sample_count", Some(meta.sample_count.to_string())),
            ("allele_columns", Some(meta.allele_columns.to_string())),
            ("interpreter", meta.info.interpreter.clone()),
            ("week", meta.info.week.clone()),
            ("series", meta.info.series.clone()),
            ("comment", meta.info.comment.clone()),
            ("errors_intra", Some(report.errors_intra.to_string())),
            ("errors_inter", Some(report.errors_inter.to_string())),
            ("negative_control_clean", Some(report.negative_control_clean.to_string())),
            ("passed", Some(report.passed().to_string())),
        ];

        let tx = conn.transaction().context("Failed to start transaction")?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO metadata (key, value) VALUES (?1, ?2)")
                .context("Failed to prepare metadata insert")?;
            for (key, value) in &metadata_items {
                stmt.execute(params![key, value])
                    .context("Failed to insert metadata")?;
            }

            let mut intra_stmt = tx
                .prepare(
                    "INSERT INTO intra (row_index, patient_id, sample_name, sex, status_type, status_description)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .context("Failed to prepare intra insert")?;
            let mut inter_stmt = tx
                .prepare(
                    "INSERT INTO inter (row_index, patient_id, sample_name, sex, signature_hash)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .context("Failed to prepare inter insert")?;
            let mut genotype_stmt = tx
                .prepare("INSERT INTO genotypes (section, row_index, locus, genotype) VALUES (?1, ?2, ?3, ?4)")
                .context("Failed to prepare genotype insert")?;

            for (idx, row) in report.intra.rows.iter().enumerate() {
                intra_stmt
                    .execute(params![
                        idx as i64,
                        row.patient_id,
                        row.sample_name,
                        row.sex.as_str(),
                        row.status.status_type().as_str(),
                        row.status.description(),
                    ])
                    .context("Failed to insert intra row")?;

                for (locus, genotype) in report.intra.locus_labels.iter().zip(&row.loci) {
                    genotype_stmt
                        .execute(params!["intra", idx as i64, locus, genotype])
                        .context("Failed to insert intra genotype")?;
                }
            }

            for (idx, row) in report.inter.rows.iter().enumerate() {
                inter_stmt
                    .execute(params![
                        idx as i64,
                        row.patient_id,
                        row.sample_name,
                        row.sex.as_str(),
                        row.signature_hash.as_str(),
                    ])
                    .context("Failed to insert inter row")?;

                for (locus, genotype) in report.inter.locus_labels.iter().zip(&row.loci) {
                    genotype_stmt
                        .execute(params!["inter", idx as i64, locus, genotype])
                        .context("Failed to insert inter genotype")?;
                }
            }

            if let Some(matrix) = &report.similarity {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO similarity (row_a, row_b, sample_a, sample_b, identity)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )
                    .context("Failed to prepare similarity insert")?;

                // Upper triangle only; the matrix is symmetric
                for (a, label_a) in matrix.labels().iter().enumerate() {
                    for (b, label_b) in matrix.labels().iter().enumerate().skip(a) {
                        stmt.execute(params![a as i64, b as i64, label_a, label_b, matrix.get(a, b)])
                            .context("Failed to insert similarity cell")?;
                    }
                }
            }
        }
        tx.commit().context("Failed to commit report")?;

        conn.execute("CREATE INDEX idx_intra_patient ON intra(patient_id)", [])
            .context("Failed to create patient index")?;

        info!(
            "SQLite output complete: {} intra rows, {} inter rows",
            report.intra.rows.len(),
            report.inter.rows.len()
        );

        Ok(path.to_path_buf())
    }
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("Failed to create TSV output file {:?}", path))
}
