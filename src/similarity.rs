// ==============================================================================
// similarity.rs - Pairwise Genetic Similarity Matrix
// ==============================================================================
// Description: All-pairs percent identity over allele calls and sex, in parallel
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Algorithm:
//   1. Encode every sample once into a row of k integer codes: one per
//      canonical allele column plus the sex call (0 = missing)
//   2. For each pair i < j (rayon, rows split across workers):
//        common = positions with equal codes (missing == missing matches)
//        identity = 100 * common / k
//   3. Mirror into the lower triangle; the diagonal is a self-comparison
// Budget: an optional pair limit is checked before any work starts; an
// optional time limit is checked at the start of every row. Exhausting
// either returns BudgetExceeded.
// ==============================================================================

use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SimilarityConfig;
use crate::models::PreparedBatch;

#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("Similarity budget exhausted after {computed} of {total} pairs")]
    BudgetExceeded { computed: usize, total: usize },

    #[error("Failed to build similarity thread pool: {0}")]
    ThreadPool(String),
}

/// Percent identity between two encoded samples; None when nothing is compared
///
/// # Examples
/// ```
/// use identity_vigilance::similarity::identity_percent;
///
/// assert_eq!(identity_percent(&[1, 2, 0, 4], &[1, 2, 0, 3]), Some(75.0));
/// assert_eq!(identity_percent(&[], &[]), None);
/// ```
pub fn identity_percent(a: &[u32], b: &[u32]) -> Option<f64> {
    let total = a.len().min(b.len());
    if total == 0 {
        return None;
    }
    let common = a.iter().zip(b).filter(|(x, y)| x == y).count();
    Some(100.0 * common as f64 / total as f64)
}

/// Symmetric n x n percent-identity matrix, one entry per input row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "MatrixRecord")]
pub struct SimilarityMatrix {
    labels: Vec<String>,
    values: Vec<Option<f64>>,
}

/// Serialized form: labels plus one row per sample
#[derive(Debug, Clone, Serialize)]
pub struct MatrixRecord {
    pub labels: Vec<String>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl From<SimilarityMatrix> for MatrixRecord {
    fn from(matrix: SimilarityMatrix) -> Self {
        let rows = matrix.rows().map(<[Option<f64>]>::to_vec).collect();
        Self {
            labels: matrix.labels,
            rows,
        }
    }
}

impl SimilarityMatrix {
    fn empty(labels: Vec<String>) -> Self {
        let n = labels.len();
        Self {
            labels,
            values: vec![None; n * n],
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Sample names, in row order (duplicates allowed)
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        let n = self.len();
        if row >= n || col >= n {
            return None;
        }
        self.values[row * n + col]
    }

    /// Lookup by sample name (first row carrying each name)
    pub fn get_by_name(&self, a: &str, b: &str) -> Option<f64> {
        let row = self.labels.iter().position(|l| l == a)?;
        let col = self.labels.iter().position(|l| l == b)?;
        self.get(row, col)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Option<f64>]> {
        // chunks() rejects a zero chunk size
        self.values.chunks(self.len().max(1))
    }

    fn set_pair(&mut self, i: usize, j: usize, value: Option<f64>) {
        let n = self.len();
        self.values[i * n + j] = value;
        self.values[j * n + i] = value;
    }

    /// Copy with rows and columns in natural label order ("S2" before "S10")
    pub fn natural_order(&self) -> Self {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| natural_cmp(&self.labels[a], &self.labels[b]));

        let n = self.len();
        let labels = order.iter().map(|&i| self.labels[i].clone()).collect();
        let values = order
            .iter()
            .flat_map(|&r| order.iter().map(move |&c| self.values[r * n + c]))
            .collect();

        Self { labels, values }
    }
}

/// Compare two labels chunk by chunk, digit runs by numeric value
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = chunks(a).into_iter();
    let mut right = chunks(b).into_iter();

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (is_digits(x), is_digits(y)) {
                    (true, true) => cmp_digits(x, y),
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// Numeric comparison of unbounded digit runs
fn cmp_digits(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}

/// Split into maximal runs of ASCII digits and non-digits
fn chunks(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev: Option<bool> = None;

    for (idx, ch) in s.char_indices() {
        let digit = ch.is_ascii_digit();
        if prev.is_some_and(|p| p != digit) {
            out.push(&s[start..idx]);
            start = idx;
        }
        prev = Some(digit);
    }
    if start < s.len() {
        out.push(&s[start..]);
    }
    out
}

/// Encode each sample as a row of integer codes, row-major.
/// Codes are assigned per column in first-seen order; 0 is missing.
fn encode(batch: &PreparedBatch) -> (Vec<u32>, usize) {
    let k = batch.allele_columns.len() + 1;
    let mut dictionaries: Vec<HashMap<&str, u32>> = vec![HashMap::new(); k];
    let mut codes = Vec::with_capacity(batch.len() * k);

    for sample in &batch.samples {
        let values = sample
            .alleles
            .iter()
            .map(Option::as_deref)
            .chain(std::iter::once(Some(sample.sex.as_str())));

        for (dict, value) in dictionaries.iter_mut().zip(values) {
            let code = match value {
                None => 0,
                Some(v) => {
                    let next = dict.len() as u32 + 1;
                    *dict.entry(v).or_insert(next)
                }
            };
            codes.push(code);
        }
    }

    (codes, k)
}

/// Builds a `SimilarityMatrix` under an optional time and pair budget
#[derive(Debug, Clone, Default)]
pub struct SimilarityBuilder {
    max_duration: Option<Duration>,
    max_pairs: Option<usize>,
    threads: Option<usize>,
}

impl SimilarityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SimilarityConfig) -> Self {
        Self {
            max_duration: config.max_duration(),
            max_pairs: config.max_pairs,
            threads: config.threads,
        }
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    pub fn with_max_pairs(mut self, max_pairs: usize) -> Self {
        self.max_pairs = Some(max_pairs);
        self
    }

    /// Run on a dedicated pool of `threads` workers instead of the global one
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn build(&self, batch: &PreparedBatch) -> Result<SimilarityMatrix, SimilarityError> {
        let n = batch.len();
        let total = n * n.saturating_sub(1) / 2;

        if let Some(max_pairs) = self.max_pairs {
            if total > max_pairs {
                warn!(
                    "Similarity matrix needs {} pairs, limit is {}",
                    total, max_pairs
                );
                return Err(SimilarityError::BudgetExceeded { computed: 0, total });
            }
        }

        let labels = batch.samples.iter().map(|s| s.sample_name.clone()).collect();
        let mut matrix = SimilarityMatrix::empty(labels);
        let (codes, k) = encode(batch);
        debug!("Encoded {} samples x {} positions", n, k);

        let start = Instant::now();
        let deadline = self.max_duration.map(|d| start + d);
        let computed = AtomicUsize::new(0);
        let expired = AtomicBool::new(false);

        let compute = || -> Vec<(usize, usize, Option<f64>)> {
            let codes = &codes;
            let computed = &computed;
            let expired = &expired;

            (0..n)
                .into_par_iter()
                .flat_map(|i| {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        expired.store(true, AtomicOrdering::Relaxed);
                    }
                    let skip = expired.load(AtomicOrdering::Relaxed);
                    let row_i = &codes[i * k..(i + 1) * k];

                    (i + 1..n).into_par_iter().filter_map(move |j| {
                        if skip {
                            return None;
                        }
                        computed.fetch_add(1, AtomicOrdering::Relaxed);
                        let row_j = &codes[j * k..(j + 1) * k];
                        Some((i, j, identity_percent(row_i, row_j)))
                    })
                })
                .collect()
        };

        let upper_triangle = match self.threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("similarity-{}", i))
                .build()
                .map_err(|e| SimilarityError::ThreadPool(e.to_string()))?
                .install(compute),
            None => compute(),
        };

        let computed = computed.into_inner();
        if computed < total {
            warn!(
                "Similarity matrix stopped after {:.2}s: {}/{} pairs",
                start.elapsed().as_secs_f64(),
                computed,
                total
            );
            return Err(SimilarityError::BudgetExceeded { computed, total });
        }

        for i in 0..n {
            let row_i = &codes[i * k..(i + 1) * k];
            matrix.set_pair(i, i, identity_percent(row_i, row_i));
        }
        for (i, j, value) in upper_triangle {
            matrix.set_pair(i, j, value);
        }

        info!(
            "Similarity matrix: {} samples, {} pairs in {:.2}s",
            n,
            total,
            start.elapsed().as_secs_f64()
        );

        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VigilanceConfig;
    use crate::models::SampleTable;
    use crate::signature::SignatureDeriver;

    /// Samples over `n_alleles` allele columns plus both sex markers
    fn batch(n_alleles: usize, samples: &[(&str, Vec<&str>, &str, &str)]) -> PreparedBatch {
        let mut columns = vec!["Sample Name".to_string()];
        columns.extend((1..=n_alleles).map(|i| format!("Allele {}", i)));
        columns.push("Allele 29".to_string());
        columns.push("Allele 30".to_string());

        let rows = samples
            .iter()
            .map(|(name, alleles, x, y)| {
                let mut row = vec![name.to_string()];
                row.extend(alleles.iter().map(|a| a.to_string()));
                row.resize(1 + n_alleles, String::new());
                row.push(x.to_string());
                row.push(y.to_string());
                row
            })
            .collect();

        let config = VigilanceConfig::default();
        SignatureDeriver::new(&config)
            .prepare(&SampleTable::new(columns, rows))
            .unwrap()
    }

    fn calls(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{:02}_A", i)).collect()
    }

    #[test]
    fn test_identity_percent() {
        assert_eq!(identity_percent(&[1, 1], &[1, 1]), Some(100.0));
        assert_eq!(identity_percent(&[0, 0], &[0, 0]), Some(100.0));
        assert_eq!(identity_percent(&[1, 0], &[1, 2]), Some(50.0));
        assert_eq!(identity_percent(&[1], &[2]), Some(0.0));
    }

    #[test]
    fn test_diagonal_is_100() {
        let b = batch(
            4,
            &[
                ("S1", vec!["01_A", "01_C", "", "nan"], "X", "Y"),
                ("S2", vec!["", "", "", ""], "", ""),
                ("S3", vec!["01_A", "01_A", "02_G", "02_T"], "X", ""),
            ],
        );
        let matrix = SimilarityBuilder::new().build(&b).unwrap();

        assert_eq!(matrix.len(), 3);
        for i in 0..3 {
            assert_eq!(matrix.get(i, i), Some(100.0));
        }
    }

    #[test]
    fn test_one_mismatch_in_sixteen() {
        let base = calls(15);
        let mut other = base.clone();
        other[7] = "08_T".to_string();

        let b = batch(
            15,
            &[
                ("S1", base.iter().map(String::as_str).collect::<Vec<_>>(), "X", "Y"),
                ("S2", other.iter().map(String::as_str).collect::<Vec<_>>(), "X", "Y"),
            ],
        );
        let matrix = SimilarityBuilder::new().build(&b).unwrap();

        assert_eq!(matrix.get_by_name("S1", "S2"), Some(93.75));
        assert_eq!(matrix.get_by_name("S2", "S1"), Some(93.75));
    }

    #[test]
    fn test_missing_matches_missing_but_not_a_value() {
        let b = batch(
            3,
            &[
                ("S1", vec!["01_A", "", "02_C"], "X", ""),
                ("S2", vec!["01_A", "", "02_C"], "X", ""),
                ("S3", vec!["01_A", "01_G", "02_C"], "X", ""),
            ],
        );
        let matrix = SimilarityBuilder::new().build(&b).unwrap();

        // 3 alleles + sex
        assert_eq!(matrix.get_by_name("S1", "S2"), Some(100.0));
        assert_eq!(matrix.get_by_name("S1", "S3"), Some(75.0));
    }

    #[test]
    fn test_sex_is_compared() {
        let b = batch(
            3,
            &[
                ("S1", vec!["01_A", "01_G", "02_C"], "X", "Y"),
                ("S2", vec!["01_A", "01_G", "02_C"], "X", ""),
            ],
        );
        let matrix = SimilarityBuilder::new().build(&b).unwrap();
        assert_eq!(matrix.get(0, 1), Some(75.0));
    }

    #[test]
    fn test_matrix_is_symmetric_with_duplicate_names() {
        let b = batch(
            2,
            &[
                ("P1", vec!["01_A", "01_C"], "X", "Y"),
                ("P1", vec!["01_A", "01_T"], "X", "Y"),
                ("P2", vec!["", "01_C"], "X", ""),
            ],
        );
        let matrix = SimilarityBuilder::new().with_threads(2).build(&b).unwrap();

        assert_eq!(matrix.labels(), &["P1", "P1", "P2"]);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(matrix.get(i, j), matrix.get(j, i));
            }
        }
        assert_eq!(matrix.get(0, 1), Some(200.0 / 3.0));
    }

    #[test]
    fn test_parallel_matches_single_thread() {
        let samples: Vec<(String, Vec<String>)> = (0..12)
            .map(|i| {
                let alleles = (0..6)
                    .map(|c| if (i + c) % 3 == 0 { String::new() } else { format!("{}_{}", c, i % 4) })
                    .collect();
                (format!("S{}", i), alleles)
            })
            .collect();
        let rows: Vec<(&str, Vec<&str>, &str, &str)> = samples
            .iter()
            .map(|(name, alleles)| (name.as_str(), alleles.iter().map(String::as_str).collect(), "X", ""))
            .collect();
        let b = batch(6, &rows);

        let single = SimilarityBuilder::new().with_threads(1).build(&b).unwrap();
        let multi = SimilarityBuilder::new().with_threads(4).build(&b).unwrap();
        assert_eq!(single, multi);
    }

    #[test]
    fn test_pair_budget() {
        let b = batch(
            1,
            &[
                ("S1", vec!["01_A"], "X", ""),
                ("S2", vec!["01_A"], "X", ""),
                ("S3", vec!["01_A"], "X", ""),
            ],
        );

        match SimilarityBuilder::new().with_max_pairs(2).build(&b) {
            Err(SimilarityError::BudgetExceeded { computed, total }) => {
                assert_eq!(computed, 0);
                assert_eq!(total, 3);
            }
            other => panic!("Expected BudgetExceeded, got {:?}", other),
        }
        assert!(SimilarityBuilder::new().with_max_pairs(3).build(&b).is_ok());
    }

    #[test]
    fn test_time_budget() {
        let b = batch(
            1,
            &[
                ("S1", vec!["01_A"], "X", ""),
                ("S2", vec!["01_A"], "X", ""),
                ("S3", vec!["01_A"], "X", ""),
            ],
        );

        let result = SimilarityBuilder::new()
            .with_max_duration(Duration::ZERO)
            .build(&b);
        assert!(matches!(
            result,
            Err(SimilarityError::BudgetExceeded { total: 3, .. })
        ));
    }

    #[test]
    fn test_empty_and_single_sample() {
        let empty = SimilarityBuilder::new().build(&PreparedBatch::default()).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.rows().count(), 0);

        let b = batch(1, &[("S1", vec!["01_A"], "X", "")]);
        let single = SimilarityBuilder::new()
            .with_max_duration(Duration::ZERO)
            .build(&b)
            .unwrap();
        assert_eq!(single.get(0, 0), Some(100.0));
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("S2", "S10"), Ordering::Less);
        assert_eq!(natural_cmp("S10", "S2"), Ordering::Greater);
        assert_eq!(natural_cmp("P1", "P1bis"), Ordering::Less);
        assert_eq!(natural_cmp("P007", "P7"), Ordering::Less);
        assert_eq!(natural_cmp("A", "B"), Ordering::Less);
        assert_eq!(natural_cmp("S1", "S1"), Ordering::Equal);
    }

    #[test]
    fn test_natural_order_permutes_both_axes() {
        let b = batch(
            2,
            &[
                ("S10", vec!["01_A", "01_C"], "X", ""),
                ("S2", vec!["01_A", "01_T"], "X", ""),
                ("S1", vec!["01_G", "01_T"], "X", ""),
            ],
        );
        let matrix = SimilarityBuilder::new().build(&b).unwrap();
        let ordered = matrix.natural_order();

        assert_eq!(ordered.labels(), &["S1", "S2", "S10"]);
        for a in ["S1", "S2", "S10"] {
            for c in ["S1", "S2", "S10"] {
                assert_eq!(ordered.get_by_name(a, c), matrix.get_by_name(a, c));
            }
        }
    }

    #[test]
    fn test_serializes_as_rows() {
        let b = batch(1, &[("S1", vec!["01_A"], "X", ""), ("S2", vec!["01_C"], "X", "")]);
        let matrix = SimilarityBuilder::new().build(&b).unwrap();

        let json = serde_json::to_value(&matrix).unwrap();
        assert_eq!(json["labels"], serde_json::json!(["S1", "S2"]));
        assert_eq!(json["rows"][0][0], 100.0);
        assert_eq!(json["rows"][0][1], 50.0);
    }
}
