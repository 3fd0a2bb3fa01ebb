// ==============================================================================
// validator.rs - Input File and Schema Validation
// ==============================================================================
// Description: Validates uploaded allele tables (size, type, content, columns)
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// Security: Allowlist-only file types, magic number verification
// ==============================================================================

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::config::VigilanceConfig;
use crate::models::SampleTable;

const MAX_FILE_SIZE: usize = 50 * 1024 * 1024; // 50 MB

#[derive(Debug, Clone)]
pub struct ValidatedFile {
    pub original_name: String,
    pub safe_name: String,
    pub extension: String,
    pub size: u64,
    pub hash_sha256: String,
    pub validated_at: chrono::DateTime<chrono::Utc>,
}

pub struct FileValidator {
    max_file_size: usize,
    allowed_types: HashMap<String, Vec<u8>>,
}

impl FileValidator {
    pub fn new() -> Self {
        let mut allowed_types = HashMap::new();

        // GeneMapper tab-delimited exports (plain text, no magic number)
        allowed_types.insert("txt".to_string(), vec![]);
        allowed_types.insert("tsv".to_string(), vec![]);

        // Gzip-compressed exports
        allowed_types.insert("txt.gz".to_string(), vec![0x1f, 0x8b, 0x08]);
        allowed_types.insert("tsv.gz".to_string(), vec![0x1f, 0x8b, 0x08]);

        Self {
            max_file_size: MAX_FILE_SIZE,
            allowed_types,
        }
    }

    pub fn with_max_file_size(mut self, max_file_size: usize) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn validate_upload(&self, file_path: &Path) -> Result<ValidatedFile> {
        let file_name = file_path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid file path"))?
            .to_string_lossy()
            .to_string();

        info!("Validating file: {}", file_name);

        // 1. Size check
        let metadata = std::fs::metadata(file_path)
            .context("Failed to get file metadata")?;
        let size = metadata.len() as usize;

        if size == 0 {
            anyhow::bail!("File is empty");
        }

        if size > self.max_file_size {
            anyhow::bail!(
                "File too large: {} bytes (max: {} bytes)",
                size,
                self.max_file_size
            );
        }
        debug!("Size check passed: {} bytes", size);

        // 2. Filename sanitization
        let safe_name = self.sanitize_filename(&file_name)?;
        debug!("Sanitized filename: {}", safe_name);

        // 3. Extension check (allowlist)
        let ext = self.get_extension(&safe_name)?;
        let expected_magic = self
            .allowed_types
            .get(&ext)
            .ok_or_else(|| anyhow::anyhow!("Invalid file type: {}", ext))?;
        debug!("Extension check passed: {}", ext);

        // 4. Magic number verification
        if !expected_magic.is_empty() {
            let actual_magic = self.read_magic_number(file_path)?;
            if !self.verify_magic_number(expected_magic, &actual_magic) {
                anyhow::bail!("Magic number mismatch for .{} file", ext);
            }
            debug!("Magic number check passed");
        }

        // 5. Compute SHA-256 hash
        let hash = self.compute_sha256(file_path)?;
        debug!("SHA-256: {}", hash);

        Ok(ValidatedFile {
            original_name: file_name,
            safe_name,
            extension: ext,
            size: metadata.len(),
            hash_sha256: hash,
            validated_at: chrono::Utc::now(),
        })
    }

    fn sanitize_filename(&self, name: &str) -> Result<String> {
        // Remove path separators, null bytes, control characters
        let safe = name
            .replace(['/', '\\', '\0'], "_")
            .chars()
            .filter(|c| {
                c.is_ascii_alphanumeric()
                    || *c == '_'
                    || *c == '.'
                    || *c == '-'
            })
            .collect::<String>();

        // Limit length to 255 characters
        let truncated: String = safe.chars().take(255).collect();

        if truncated.is_empty() {
            anyhow::bail!("Invalid filename after sanitization");
        }

        Ok(truncated)
    }

    fn get_extension(&self, filename: &str) -> Result<String> {
        let lower = filename.to_lowercase();

        // Compound extensions first
        for compound in ["txt.gz", "tsv.gz"] {
            if lower.ends_with(&format!(".{}", compound)) {
                return Ok(compound.to_string());
            }
        }

        match lower.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => Ok(ext.to_string()),
            _ => anyhow::bail!("No file extension found"),
        }
    }

    fn read_magic_number(&self, path: &Path) -> Result<Vec<u8>> {
        let mut file = File::open(path)?;
        let mut buffer = Vec::with_capacity(4);
        file.by_ref().take(4).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn verify_magic_number(&self, expected: &[u8], actual: &[u8]) -> bool {
        expected.len() <= actual.len()
            && expected.iter().zip(actual.iter()).all(|(e, a)| e == a)
    }

    fn compute_sha256(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 8192];

        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Schema checks and column cleanup on a loaded table
pub struct TableValidator<'a> {
    config: &'a VigilanceConfig,
}

impl<'a> TableValidator<'a> {
    pub fn new(config: &'a VigilanceConfig) -> Self {
        Self { config }
    }

    /// Required columns absent from the table, in configuration order.
    /// An empty list means the table is valid; the caller decides whether
    /// to block on a non-empty one.
    pub fn validate(&self, table: &SampleTable) -> Vec<String> {
        let missing: Vec<String> = self
            .config
            .required_columns
            .iter()
            .filter(|col| !table.has_column(col))
            .cloned()
            .collect();

        if missing.is_empty() {
            debug!("Schema check passed: {} columns", table.columns.len());
        } else {
            info!("Schema check failed: {} missing column(s)", missing.len());
        }

        missing
    }

    /// Drop the always-irrelevant columns; absent ones are ignored
    pub fn clean(&self, mut table: SampleTable) -> SampleTable {
        let removed = table.drop_columns(&self.config.columns_to_drop);
        debug!(
            "Dropped {} irrelevant column(s), {} remain",
            removed,
            table.columns.len()
        );
        table
    }
}
