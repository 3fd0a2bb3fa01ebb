// ==============================================================================
// genotype.rs - Allele Pair to Locus Genotype Merge
// ==============================================================================
// Description: Merges adjacent allele columns into one genotype per locus
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Algorithm:
//   Columns are paired in canonical order: (1,2) -> Locus 1, (3,4) -> Locus 2
//   An odd trailing column has no partner and is not reported.
//   Each call is trimmed and reduced to the text after its last "_"
//   ("05_T" -> "T"); "nan" counts as empty.
//   - both empty         -> ""
//   - one empty          -> the other value
//   - equal values       -> that value        (homozygous)
//   - different values   -> "v1/v2"           (heterozygous, column order kept)
// ==============================================================================

/// Reduce a raw call to its genotype letter(s)
///
/// # Examples
/// ```
/// use identity_vigilance::genotype::clean_call;
///
/// assert_eq!(clean_call(" 05_T "), "T");
/// assert_eq!(clean_call("A"), "A");
/// assert_eq!(clean_call("nan"), "");
/// ```
pub fn clean_call(raw: &str) -> String {
    let value = raw.trim();
    let value = value.rsplit('_').next().unwrap_or(value);
    if value.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        value.to_string()
    }
}

/// Combine the two calls of one locus
///
/// # Examples
/// ```
/// use identity_vigilance::genotype::combine_pair;
///
/// assert_eq!(combine_pair("01_C", "01_T"), "C/T");
/// assert_eq!(combine_pair("01_C", "01_C"), "C");
/// assert_eq!(combine_pair("", "01_T"), "T");
/// assert_eq!(combine_pair("", ""), "");
/// ```
pub fn combine_pair(first: &str, second: &str) -> String {
    let first = clean_call(first);
    let second = clean_call(second);

    match (first.is_empty(), second.is_empty()) {
        (true, true) => String::new(),
        (false, true) => first,
        (true, false) => second,
        (false, false) if first == second => first,
        (false, false) => format!("{}/{}", first, second),
    }
}

/// Number of loci produced from `n_columns` allele columns
pub fn locus_count(n_columns: usize) -> usize {
    n_columns / 2
}

/// Column labels for the merged genotypes ("Locus 1", "Locus 2", ...)
pub fn locus_labels(n_columns: usize) -> Vec<String> {
    (1..=locus_count(n_columns))
        .map(|i| format!("Locus {}", i))
        .collect()
}

/// Merge a sample's calls (canonical order, None = missing) into loci
pub fn merge_genotypes(calls: &[Option<String>]) -> Vec<String> {
    calls
        .chunks_exact(2)
        .map(|pair| {
            combine_pair(
                pair[0].as_deref().unwrap_or(""),
                pair[1].as_deref().unwrap_or(""),
            )
        })
        .collect()
}
