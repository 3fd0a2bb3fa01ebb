// ==============================================================================
// genemapper.rs - GeneMapper Allele Table Parser
// ==============================================================================
// Description: Parser for tab-delimited GeneMapper allele-call exports
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Format: Tab-delimited text, first line is the header, one sample per row
// Example:
//   Sample File    Sample Name    Panel    Marker    Dye    Allele 1    Allele 2 ...
//   run1.fsa       P12            SNPX     SNP01     B      01_C        01_T     ...
//   run2.fsa       P12bis         SNPX     SNP01     B      01_C        01_T     ...
// ==============================================================================

use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::models::SampleTable;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors that stop a batch before any comparison runs
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tab-delimited parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("File is empty or malformed")]
    EmptyTable,

    #[error("Row at line {line} has {found} fields, header has {expected}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("File does not have the expected format. Missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// Parser for GeneMapper allele tables
#[derive(Debug, Clone, Default)]
pub struct GenemapperParser;

impl GenemapperParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a GeneMapper export from disk (plain or gzip-compressed)
    ///
    /// # Returns
    /// * `Ok(SampleTable)` - Header plus one row per sample
    /// * `Err(FormatError)` - Unreadable, empty or ragged input
    pub fn parse(&self, path: impl AsRef<Path>) -> Result<SampleTable, FormatError> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);

        let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
        if is_gzip {
            debug!("Detected gzip-compressed input: {:?}", path.as_ref());
            self.parse_reader(GzDecoder::new(reader))
        } else {
            self.parse_reader(reader)
        }
    }

    /// Parse an in-memory export
    pub fn parse_str(&self, contents: &str) -> Result<SampleTable, FormatError> {
        self.parse_reader(contents.as_bytes())
    }

    /// Parse from any reader
    ///
    /// Blank header cells become `Unnamed: <index>` (exports end with a
    /// trailing tab). Short rows are padded with empty cells.
    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<SampleTable, FormatError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = reader.records();

        let header = match records.next() {
            Some(record) => record?,
            None => return Err(FormatError::EmptyTable),
        };

        let columns: Vec<String> = header
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                if name.trim().is_empty() {
                    format!("Unnamed: {}", idx)
                } else {
                    name.to_string()
                }
            })
            .collect();

        let width = columns.len();
        let mut rows = Vec::new();

        for record_result in records {
            let record = record_result?;

            if record.len() > width {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                return Err(FormatError::RaggedRow {
                    line,
                    expected: width,
                    found: record.len(),
                });
            }

            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        if rows.is_empty() {
            return Err(FormatError::EmptyTable);
        }

        debug!("Parsed {} rows x {} columns", rows.len(), width);

        Ok(SampleTable::new(columns, rows))
    }
}
