//! Fuzzy matching primitives
//!
//! Two phases: a cheap pre-filter (normalized length window, shared token,
//! trigram similarity) and an exact Levenshtein distance over the shortlist.

use crate::config::ResolverConfig;
use gleaner_domain::text::{normalize, tokens};
use gleaner_domain::traits::FuzzyCandidate;
use gleaner_domain::RowId;
use std::collections::HashSet;

/// Guards `floor` against products like 20 × 0.15 landing a hair under 3
const FLOOR_EPSILON: f64 = 1e-9;

/// Maximum accepted distance (and length difference) for a search text
///
/// # Examples
///
/// ```
/// use gleaner_resolver::fuzzy::tolerance;
///
/// assert_eq!(tolerance(28, 0.15), 4);
/// assert_eq!(tolerance(20, 0.15), 3);
/// assert_eq!(tolerance(6, 0.15), 0);
/// ```
pub fn tolerance(search_len: usize, ratio: f64) -> usize {
    (search_len as f64 * ratio + FLOOR_EPSILON).floor() as usize
}

/// Padded trigram set of an already-normalized string
///
/// Padding follows the usual convention of two leading blanks and one
/// trailing blank, so short strings still produce trigrams.
pub fn trigrams(normalized: &str) -> HashSet<[char; 3]> {
    if normalized.is_empty() {
        return HashSet::new();
    }
    let padded: Vec<char> = "  ".chars().chain(normalized.chars()).chain(" ".chars()).collect();
    padded.windows(3).map(|w| [w[0], w[1], w[2]]).collect()
}

/// Shared trigrams over all distinct trigrams of both strings (0.0-1.0)
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(&normalize(a));
    let tb = trigrams(&normalize(b));
    set_similarity(&ta, &tb)
}

fn set_similarity(ta: &HashSet<[char; 3]>, tb: &HashSet<[char; 3]>) -> f64 {
    let union = ta.union(tb).count();
    if union == 0 {
        return 0.0;
    }
    ta.intersection(tb).count() as f64 / union as f64
}

/// The accepted fuzzy match
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatch {
    /// Matched row
    pub row_id: RowId,
    /// Levenshtein distance between normalized texts
    pub distance: usize,
    /// Trigram similarity between normalized texts
    pub similarity: f64,
}

/// A prepared search text, reusable across candidate lists
#[derive(Debug, Clone)]
pub struct FuzzyQuery {
    normalized: String,
    len: usize,
    tolerance: usize,
    tokens: HashSet<String>,
    trigrams: HashSet<[char; 3]>,
    trigram_threshold: f64,
    min_token_len: usize,
}

impl FuzzyQuery {
    /// Prepare a query; `None` when the text normalizes to nothing
    pub fn new(search_text: &str, config: &ResolverConfig) -> Option<Self> {
        let normalized = normalize(search_text);
        if normalized.is_empty() {
            return None;
        }
        let len = normalized.chars().count();
        Some(Self {
            trigrams: trigrams(&normalized),
            tokens: tokens(search_text, config.min_token_len).into_iter().collect(),
            tolerance: tolerance(len, config.fuzzy_tolerance),
            trigram_threshold: config.trigram_threshold,
            min_token_len: config.min_token_len,
            normalized,
            len,
        })
    }

    /// Inclusive normalized-length window for the store range query
    pub fn length_window(&self) -> (usize, usize) {
        (self.len.saturating_sub(self.tolerance), self.len + self.tolerance)
    }

    /// Maximum accepted distance
    pub fn tolerance(&self) -> usize {
        self.tolerance
    }

    /// Pre-filter: length window, shared long token, trigram similarity
    ///
    /// Returns the similarity when the candidate passes.
    pub fn prefilter(&self, display: &str) -> Option<f64> {
        let normalized = normalize(display);
        let len = normalized.chars().count();
        if len.abs_diff(self.len) > self.tolerance {
            return None;
        }

        if !self.tokens.is_empty() {
            let shares_token = tokens(display, self.min_token_len)
                .iter()
                .any(|t| self.tokens.contains(t));
            if !shares_token {
                return None;
            }
        }

        let similarity = set_similarity(&self.trigrams, &trigrams(&normalized));
        (similarity > self.trigram_threshold).then_some(similarity)
    }

    /// Pick the closest pre-filtered candidate within tolerance
    ///
    /// Candidates are ordered by `(distance, row_id)`, so ties go to the
    /// oldest row.
    pub fn best_match(&self, candidates: &[FuzzyCandidate]) -> Option<FuzzyMatch> {
        let mut shortlist: Vec<FuzzyMatch> = candidates
            .iter()
            .filter_map(|candidate| {
                let similarity = self.prefilter(&candidate.display)?;
                let distance = strsim::levenshtein(&self.normalized, &normalize(&candidate.display));
                Some(FuzzyMatch {
                    row_id: candidate.row_id,
                    distance,
                    similarity,
                })
            })
            .collect();

        shortlist.sort_by_key(|m| (m.distance, m.row_id));
        shortlist.into_iter().next().filter(|m| m.distance <= self.tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(row_id: RowId, display: &str) -> FuzzyCandidate {
        FuzzyCandidate {
            row_id,
            display: display.to_string(),
        }
    }

    fn query(text: &str) -> FuzzyQuery {
        FuzzyQuery::new(text, &ResolverConfig::default()).unwrap()
    }

    #[test]
    fn test_trigram_similarity_bounds() {
        assert_eq!(trigram_similarity("biology", "biology"), 1.0);
        assert_eq!(trigram_similarity("", "biology"), 0.0);
        assert!(trigram_similarity("abc", "xyz") < 0.01);
    }

    #[test]
    fn test_max_planck_spellings_pass_prefilter() {
        let q = query("Max Planck Institute for Biology");
        assert_eq!(q.tolerance(), 4);
        let similarity = q.prefilter("Max-Planck-Institut für Biologie").unwrap();
        assert!(similarity > 0.25, "similarity was {}", similarity);
    }

    #[test]
    fn test_prefilter_requires_shared_long_token() {
        // Close in length and letters, but no token of length >= 4 in common.
        let q = query("Nord University");
        assert!(q.prefilter("Nrod Universty").is_none());
    }

    #[test]
    fn test_short_texts_skip_token_rule() {
        let q = query("UCL");
        assert_eq!(q.tolerance(), 0);
        assert!(q.prefilter("U.C.L.").is_some());
    }

    #[test]
    fn test_best_match_prefers_lowest_distance() {
        let q = query("Karolinska Institutet");
        let candidates = vec![
            candidate(1, "Karolinska Institute"),
            candidate(2, "Karolinska Institutet"),
        ];
        let m = q.best_match(&candidates).unwrap();
        assert_eq!(m.row_id, 2);
        assert_eq!(m.distance, 0);
    }

    #[test]
    fn test_best_match_ties_go_to_lowest_row_id() {
        let q = query("Karolinska Institutet");
        let candidates = vec![
            candidate(9, "Karolinska Institutex"),
            candidate(4, "Karolinska Institutey"),
        ];
        assert_eq!(q.best_match(&candidates).unwrap().row_id, 4);
    }

    #[test]
    fn test_best_match_rejects_distance_over_tolerance() {
        // 18 normalized chars → tolerance 2; this candidate is 3 edits away.
        let q = query("University of Bergen");
        assert_eq!(q.tolerance(), 2);
        assert!(q.best_match(&[candidate(1, "University of Bremen1")]).is_none());
    }

    #[test]
    fn test_length_window() {
        let q = query("Max Planck Institute for Biology");
        assert_eq!(q.length_window(), (24, 32));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: an accepted match is never farther than the tolerance
        #[test]
        fn test_accepted_distance_within_tolerance(
            search in "[a-z]{5,30}( [a-z]{4,10}){0,3}",
            others in proptest::collection::vec("[a-z]{5,30}( [a-z]{4,10}){0,3}", 1..8),
        ) {
            let q = FuzzyQuery::new(&search, &ResolverConfig::default()).unwrap();
            let candidates: Vec<FuzzyCandidate> = others
                .iter()
                .enumerate()
                .map(|(i, d)| FuzzyCandidate { row_id: i as RowId, display: d.clone() })
                .collect();
            if let Some(m) = q.best_match(&candidates) {
                prop_assert!(m.distance <= q.tolerance());
                // No pre-filtered candidate is strictly closer.
                for c in &candidates {
                    if q.prefilter(&c.display).is_some() {
                        let d = strsim::levenshtein(&normalize(&search), &normalize(&c.display));
                        prop_assert!(d >= m.distance);
                    }
                }
            }
        }
    }
}
