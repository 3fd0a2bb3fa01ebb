// ==============================================================================
// comparison.rs - Intra- and Inter-Patient Comparison
// ==============================================================================
// Description: Per-patient consistency checks and cross-patient collision search
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Intra-patient rules (first match wins, per patient group):
//   0. empty signature, not a negative control  -> error   "no alleles found"
//      (per sample, takes precedence over every group rule)
//   1. single sample, not a negative control     -> warning "unique sample"
//   2. single negative control with alleles      -> error   "negative control with alleles present"
//      single negative control without alleles   -> info    "negative control"
//   3. several samples, signatures differ        -> error   "inconsistent SNPs"
//   4. several samples, sex calls differ         -> error   "sex inconsistency"
//   otherwise                                    -> success
// Inter-patient: samples with a non-empty signature are bucketed by hash;
// a bucket holding more than one patient is a collision and all of its
// rows are reported.
// ==============================================================================

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::genotype::{locus_labels, merge_genotypes};
use crate::models::{
    ComparisonStatus, PreparedBatch, PreparedSample, Sex, SignatureHash, StatusReason,
};

/// One row of the intra-patient table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntraRow {
    pub patient_id: String,
    pub sample_name: String,
    pub sex: Sex,
    pub status: ComparisonStatus,
    /// Merged genotypes, aligned with `IntraComparison::locus_labels`
    pub loci: Vec<String>,
}

/// Intra-patient comparison result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntraComparison {
    pub locus_labels: Vec<String>,
    pub rows: Vec<IntraRow>,
    /// Rows with an error status (batch pass/fail signal)
    pub error_count: usize,
    /// True when the batch holds negative controls and none has alleles
    pub negative_control_clean: bool,
}

/// One row of the inter-patient collision table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterRow {
    pub patient_id: String,
    pub sample_name: String,
    pub sex: Sex,
    pub loci: Vec<String>,
    pub signature_hash: SignatureHash,
}

/// Inter-patient comparison result; rows of one collision are contiguous
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterComparison {
    pub locus_labels: Vec<String>,
    pub rows: Vec<InterRow>,
    /// Total rows across colliding buckets
    pub error_count: usize,
    /// Number of distinct colliding signatures
    pub collision_count: usize,
}

impl InterComparison {
    pub fn has_collisions(&self) -> bool {
        !self.rows.is_empty()
    }
}

/// Members of one patient group
struct PatientGroup<'b> {
    members: Vec<&'b PreparedSample>,
}

impl PatientGroup<'_> {
    fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    fn signatures_differ(&self) -> bool {
        let first = &self.members[0].signature;
        self.members.iter().any(|m| &m.signature != first)
    }

    fn sexes_differ(&self) -> bool {
        let first = self.members[0].sex;
        self.members.iter().any(|m| m.sex != first)
    }
}

type GroupRule = fn(&PatientGroup<'_>) -> Option<ComparisonStatus>;

/// Group rules in priority order
const GROUP_RULES: [GroupRule; 4] = [
    unique_sample,
    singleton_negative_control,
    inconsistent_snps,
    sex_inconsistency,
];

fn unique_sample(group: &PatientGroup<'_>) -> Option<ComparisonStatus> {
    (group.is_singleton() && !group.members[0].is_negative_control)
        .then_some(ComparisonStatus::Warning(StatusReason::UniqueSample))
}

fn singleton_negative_control(group: &PatientGroup<'_>) -> Option<ComparisonStatus> {
    if !(group.is_singleton() && group.members[0].is_negative_control) {
        return None;
    }
    if group.members[0].signature_len() > 0 {
        Some(ComparisonStatus::Error(StatusReason::NegativeControlWithAlleles))
    } else {
        Some(ComparisonStatus::Info(StatusReason::NegativeControl))
    }
}

fn inconsistent_snps(group: &PatientGroup<'_>) -> Option<ComparisonStatus> {
    (!group.is_singleton() && group.signatures_differ())
        .then_some(ComparisonStatus::Error(StatusReason::InconsistentSnps))
}

fn sex_inconsistency(group: &PatientGroup<'_>) -> Option<ComparisonStatus> {
    (!group.is_singleton() && group.sexes_differ())
        .then_some(ComparisonStatus::Error(StatusReason::SexInconsistency))
}

/// Verdict shared by every member of a group
fn evaluate_group(group: &PatientGroup<'_>) -> ComparisonStatus {
    GROUP_RULES
        .iter()
        .find_map(|rule| rule(group))
        .unwrap_or(ComparisonStatus::Success)
}

/// Per-sample verdict that overrides the group verdict
fn sample_precheck(sample: &PreparedSample) -> Option<ComparisonStatus> {
    (sample.signature.is_empty() && !sample.is_negative_control)
        .then_some(ComparisonStatus::Error(StatusReason::NoAllelesFound))
}

/// Comparison engine over one prepared batch
pub struct ComparisonEngine<'a> {
    batch: &'a PreparedBatch,
}

impl<'a> ComparisonEngine<'a> {
    pub fn new(batch: &'a PreparedBatch) -> Self {
        Self { batch }
    }

    /// One status per sample, in batch order
    pub fn classify(&self) -> Vec<ComparisonStatus> {
        let mut statuses: Vec<ComparisonStatus> = self
            .batch
            .samples
            .iter()
            .map(|s| s.status)
            .collect();

        for (patient_id, indices) in self.batch.patient_groups() {
            let group = PatientGroup {
                members: indices.iter().map(|&i| &self.batch.samples[i]).collect(),
            };
            // The group verdict is computed over every member, flagged ones
            // included; only the members without a precheck verdict take it
            let verdict = evaluate_group(&group);
            debug!("Patient '{}' ({} samples): {:?}", patient_id, indices.len(), verdict);

            for &i in &indices {
                statuses[i] = sample_precheck(&self.batch.samples[i]).unwrap_or(verdict);
            }
        }

        statuses
    }

    /// Intra-patient table with merged genotypes
    pub fn perform_intra_comparison(&self) -> IntraComparison {
        let statuses = self.classify();
        let labels = locus_labels(self.batch.allele_columns.len());

        let rows: Vec<IntraRow> = self
            .batch
            .samples
            .iter()
            .zip(statuses)
            .map(|(sample, status)| IntraRow {
                patient_id: sample.patient_id.clone(),
                sample_name: sample.sample_name.clone(),
                sex: sample.sex,
                status,
                loci: merge_genotypes(&sample.alleles),
            })
            .collect();

        let error_count = rows.iter().filter(|r| r.status.is_error()).count();
        let negative_control_clean = self.negative_control_clean();

        if error_count > 0 {
            warn!("Intra-patient comparison: {} sample(s) in error", error_count);
        } else {
            info!("Intra-patient comparison: all {} samples consistent", rows.len());
        }

        IntraComparison {
            locus_labels: labels,
            rows,
            error_count,
            negative_control_clean,
        }
    }

    /// Negative controls exist and none of them carries an allele
    pub fn negative_control_clean(&self) -> bool {
        let mut controls = self
            .batch
            .samples
            .iter()
            .filter(|s| s.is_negative_control)
            .peekable();

        if controls.peek().is_none() {
            debug!("No negative control in batch");
            return false;
        }
        controls.all(|s| s.signature_len() == 0)
    }

    /// Hash buckets (non-empty signatures only) spanning several patients
    pub fn collisions(&self) -> Vec<(&'a SignatureHash, Vec<usize>)> {
        let batch = self.batch;
        let mut buckets: BTreeMap<&'a SignatureHash, Vec<usize>> = BTreeMap::new();
        for (idx, sample) in batch.samples.iter().enumerate() {
            if sample.signature_len() > 0 {
                buckets.entry(&sample.signature_hash).or_default().push(idx);
            }
        }

        buckets
            .into_iter()
            .filter(|(_, indices)| {
                let patients: BTreeSet<&str> = indices
                    .iter()
                    .map(|&i| batch.samples[i].patient_id.as_str())
                    .collect();
                patients.len() > 1
            })
            .collect()
    }

    /// Rows of every colliding bucket; empty when no collision
    pub fn perform_inter_comparison(&self) -> InterComparison {
        let collisions = self.collisions();
        let labels = locus_labels(self.batch.allele_columns.len());

        let rows: Vec<InterRow> = collisions
            .iter()
            .flat_map(|(_, indices)| indices.iter())
            .map(|&i| {
                let sample = &self.batch.samples[i];
                InterRow {
                    patient_id: sample.patient_id.clone(),
                    sample_name: sample.sample_name.clone(),
                    sex: sample.sex,
                    loci: merge_genotypes(&sample.alleles),
                    signature_hash: sample.signature_hash.clone(),
                }
            })
            .collect();

        if rows.is_empty() {
            info!("Inter-patient comparison: no shared signature");
        } else {
            warn!(
                "Inter-patient comparison: {} sample(s) share {} signature(s) across patients",
                rows.len(),
                collisions.len()
            );
        }

        InterComparison {
            locus_labels: labels,
            error_count: rows.len(),
            collision_count: collisions.len(),
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VigilanceConfig;
    use crate::models::{SampleTable, StatusType};
    use crate::signature::SignatureDeriver;

    /// Build a prepared batch from (name, comma-separated alleles, x, y)
    fn batch(samples: &[(&str, &str, &str, &str)]) -> PreparedBatch {
        let n_alleles = samples
            .iter()
            .map(|s| s.1.split(',').count())
            .max()
            .unwrap_or(0);
        let mut columns = vec!["Sample Name".to_string()];
        columns.extend((1..=n_alleles).map(|i| format!("Allele {}", i)));
        columns.push("Allele 29".to_string());
        columns.push("Allele 30".to_string());

        let rows = samples
            .iter()
            .map(|(name, alleles, x, y)| {
                let mut row = vec![name.to_string()];
                row.extend(alleles.split(',').map(str::to_string));
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

    fn status_of(result: &IntraComparison, name: &str) -> ComparisonStatus {
        result
            .rows
            .iter()
            .find(|r| r.sample_name == name)
            .map(|r| r.status)
            .unwrap()
    }

    const SIG: &str = "01_C,01_T,02_G,02_G";
    const NONE: &str = ",,,";

    #[test]
    fn test_consistent_repeat_is_success() {
        let b = batch(&[("P1", SIG, "X", "Y"), ("P1bis", SIG, "X", "Y")]);
        let result = ComparisonEngine::new(&b).perform_intra_comparison();

        assert_eq!(status_of(&result, "P1"), ComparisonStatus::Success);
        assert_eq!(status_of(&result, "P1bis"), ComparisonStatus::Success);
        assert_eq!(result.error_count, 0);
    }

    #[test]
    fn test_inconsistent_snps() {
        let b = batch(&[
            ("P1", SIG, "X", "Y"),
            ("P1bis", "01_C,01_T,02_G,02_A", "X", "Y"),
        ]);
        let result = ComparisonEngine::new(&b).perform_intra_comparison();

        let expected = ComparisonStatus::Error(StatusReason::InconsistentSnps);
        assert_eq!(status_of(&result, "P1"), expected);
        assert_eq!(status_of(&result, "P1bis"), expected);
        assert_eq!(result.error_count, 2);
    }

    #[test]
    fn test_sex_inconsistency() {
        let b = batch(&[("P1", SIG, "X", "Y"), ("P1bis", SIG, "X", "")]);
        let result = ComparisonEngine::new(&b).perform_intra_comparison();

        let expected = ComparisonStatus::Error(StatusReason::SexInconsistency);
        assert_eq!(status_of(&result, "P1"), expected);
        assert_eq!(status_of(&result, "P1bis"), expected);
        assert_eq!(status_of(&result, "P1").description(), "sex inconsistency");
    }

    #[test]
    fn test_snp_rule_takes_priority_over_sex_rule() {
        let b = batch(&[
            ("P1", SIG, "X", "Y"),
            ("P1ter", "01_C,01_C,02_G,02_G", "X", ""),
        ]);
        let result = ComparisonEngine::new(&b).perform_intra_comparison();

        assert_eq!(
            status_of(&result, "P1ter"),
            ComparisonStatus::Error(StatusReason::InconsistentSnps)
        );
    }

    #[test]
    fn test_unique_sample_warning() {
        let b = batch(&[("P7", SIG, "X", "")]);
        let result = ComparisonEngine::new(&b).perform_intra_comparison();

        let status = status_of(&result, "P7");
        assert_eq!(status.status_type(), StatusType::Warning);
        assert_eq!(status.description(), "unique sample");
        assert_eq!(result.error_count, 0);
    }

    #[test]
    fn test_singleton_negative_control() {
        let clean = batch(&[("neg_ctrl", NONE, "", "")]);
        let result = ComparisonEngine::new(&clean).perform_intra_comparison();
        assert_eq!(
            status_of(&result, "neg_ctrl"),
            ComparisonStatus::Info(StatusReason::NegativeControl)
        );
        assert!(result.negative_control_clean);

        let dirty = batch(&[("neg_ctrl", ",01_T,,", "", "")]);
        let result = ComparisonEngine::new(&dirty).perform_intra_comparison();
        assert_eq!(
            status_of(&result, "neg_ctrl"),
            ComparisonStatus::Error(StatusReason::NegativeControlWithAlleles)
        );
        assert_eq!(
            status_of(&result, "neg_ctrl").description(),
            "negative control with alleles present"
        );
        assert!(!result.negative_control_clean);
        assert_eq!(result.error_count, 1);
    }

    #[test]
    fn test_no_alleles_found_keeps_own_status_and_others_get_group_verdict() {
        // Singleton: the group rule alone would say "unique sample"
        let b = batch(&[("P9", NONE, "X", "")]);
        let result = ComparisonEngine::new(&b).perform_intra_comparison();
        assert_eq!(
            status_of(&result, "P9"),
            ComparisonStatus::Error(StatusReason::NoAllelesFound)
        );

        // Group: the empty member keeps its own error
        let b = batch(&[("P2", NONE, "X", "Y"), ("P2bis", SIG, "X", "Y")]);
        let result = ComparisonEngine::new(&b).perform_intra_comparison();
        assert_eq!(
            status_of(&result, "P2"),
            ComparisonStatus::Error(StatusReason::NoAllelesFound)
        );
        assert_eq!(
            status_of(&result, "P2bis"),
            ComparisonStatus::Error(StatusReason::InconsistentSnps)
        );
    }

    #[test]
    fn test_flagged_member_still_counts_in_group_verdict() {
        // Two matching repeats plus one empty run of the same patient
        let b = batch(&[
            ("P5", SIG, "X", "Y"),
            ("P5bis", SIG, "X", "Y"),
            ("P5ter", NONE, "X", "Y"),
        ]);
        let result = ComparisonEngine::new(&b).perform_intra_comparison();

        assert_eq!(
            status_of(&result, "P5ter"),
            ComparisonStatus::Error(StatusReason::NoAllelesFound)
        );
        assert_eq!(
            status_of(&result, "P5"),
            ComparisonStatus::Error(StatusReason::InconsistentSnps)
        );
        assert_eq!(
            status_of(&result, "P5bis"),
            ComparisonStatus::Error(StatusReason::InconsistentSnps)
        );
        assert_eq!(result.error_count, 3);
    }

    #[test]
    fn test_every_row_gets_one_status() {
        let b = batch(&[
            ("P1", SIG, "X", "Y"),
            ("P1bis", SIG, "X", "Y"),
            ("P2", SIG, "X", ""),
            ("neg", NONE, "", ""),
            ("P3", NONE, "X", ""),
        ]);
        let statuses = ComparisonEngine::new(&b).classify();
        assert_eq!(statuses.len(), 5);
        assert_eq!(statuses[0], ComparisonStatus::Success);
        assert_eq!(statuses[2], ComparisonStatus::Warning(StatusReason::UniqueSample));
        assert_eq!(statuses[3], ComparisonStatus::Info(StatusReason::NegativeControl));
        assert_eq!(statuses[4], ComparisonStatus::Error(StatusReason::NoAllelesFound));

        assert_eq!(statuses, ComparisonEngine::new(&b).classify());
    }

    #[test]
    fn test_negative_control_clean_requires_controls() {
        let b = batch(&[("P1", SIG, "X", "Y")]);
        assert!(!ComparisonEngine::new(&b).negative_control_clean());

        let b = batch(&[("neg1", NONE, "", ""), ("temoin", NONE, "", "")]);
        assert!(ComparisonEngine::new(&b).negative_control_clean());
    }

    #[test]
    fn test_intra_rows_carry_merged_loci() {
        let b = batch(&[("P1", SIG, "X", "Y")]);
        let result = ComparisonEngine::new(&b).perform_intra_comparison();

        assert_eq!(result.locus_labels, vec!["Locus 1", "Locus 2"]);
        assert_eq!(result.rows[0].loci, vec!["C/T", "G"]);
        assert_eq!(result.rows[0].patient_id, "P1");
        assert_eq!(result.rows[0].sex, Sex::Male);
    }

    #[test]
    fn test_inter_collision_reports_whole_bucket() {
        let b = batch(&[
            ("A1", SIG, "X", "Y"),
            ("B1", SIG, "X", "Y"),
            ("C1", "01_A,01_A,02_G,02_G", "X", ""),
        ]);
        let result = ComparisonEngine::new(&b).perform_inter_comparison();

        let names: Vec<&str> = result.rows.iter().map(|r| r.sample_name.as_str()).collect();
        assert_eq!(names, vec!["A1", "B1"]);
        assert_eq!(result.error_count, 2);
        assert_eq!(result.collision_count, 1);
        assert_eq!(result.rows[0].signature_hash, result.rows[1].signature_hash);
        assert_eq!(result.rows[0].loci, vec!["C/T", "G"]);
    }

    #[test]
    fn test_inter_same_patient_is_not_a_collision() {
        let b = batch(&[("A1", SIG, "X", "Y"), ("A1bis", SIG, "X", "Y")]);
        let result = ComparisonEngine::new(&b).perform_inter_comparison();

        assert!(!result.has_collisions());
        assert_eq!(result.error_count, 0);
    }

    #[test]
    fn test_inter_counts_rows_not_collisions() {
        let b = batch(&[
            ("A1", SIG, "X", "Y"),
            ("A1bis", SIG, "X", "Y"),
            ("B1", SIG, "X", "Y"),
        ]);
        let result = ComparisonEngine::new(&b).perform_inter_comparison();

        // The whole bucket is reported, A1's own repeat included
        assert_eq!(result.error_count, 3);
        assert_eq!(result.collision_count, 1);
    }

    #[test]
    fn test_inter_ignores_empty_signatures() {
        let b = batch(&[("neg1", NONE, "", ""), ("neg2", NONE, "", ""), ("P4", NONE, "X", "")]);
        let result = ComparisonEngine::new(&b).perform_inter_comparison();
        assert!(!result.has_collisions());
    }
}
