//! Uniqueness classification of freshly retrieved records.
//!
//! Given a reference corpus of already-known records, the classifier decides
//! for each retrieved record whether it is new or a duplicate of a reference
//! record, and records the provenance of every duplicate verdict.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeSet;
//! use projlink::{ReferenceRecord, RetrievedRecord, UniquenessClassifier};
//!
//! let references = vec![ReferenceRecord {
//!     title: "Labor Market Dynamics in Census Data".into(),
//!     year: 2021,
//!     pi: "Dr. Smith".into(),
//! }];
//! let retrieved = vec![RetrievedRecord {
//!     title: "Labor market dynamics in census data".into(),
//!     year: Some(2021),
//!     researcher: "Dr. Smith".into(),
//!     authors: BTreeSet::new(),
//! }];
//!
//! let classification = UniquenessClassifier::new().classify(&retrieved, &references);
//! assert!(classification.matches.contains_key(&0));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use crate::similarity::token_sort_ratio;

/// Default similarity threshold for both PI and title comparison.
pub const DEFAULT_UNIQUENESS_THRESHOLD: f64 = 90.0;

/// A record already present in the reference corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRecord {
    pub title: String,
    pub year: i32,
    pub pi: String,
}

/// A freshly retrieved record awaiting classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedRecord {
    pub title: String,
    pub year: Option<i32>,
    /// The researcher this record was retrieved for.
    pub researcher: String,
    /// Lower-cased, trimmed author names.
    pub authors: BTreeSet<String>,
}

/// Why a retrieved record was judged a duplicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceMatch {
    /// Index of the retrieved record.
    pub source_index: usize,
    /// Index of the matched reference record.
    pub matched_reference_index: usize,
    /// Title of the matched reference record.
    pub matched_title: String,
    /// Best title similarity score.
    pub score: f64,
}

/// Partition of a retrieved batch into new and already-known records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Indices of retrieved records judged new.
    pub unique: BTreeSet<usize>,
    /// Duplicate verdicts, keyed by retrieved-record index.
    pub matches: BTreeMap<usize, ReferenceMatch>,
}

impl Classification {
    #[must_use]
    pub fn is_unique(&self, index: usize) -> bool {
        self.unique.contains(&index)
    }
}

/// Decides whether retrieved records already exist in a reference corpus.
///
/// Classification is three steps. A retrieved record whose year appears
/// nowhere in the reference corpus is unique outright, with no similarity
/// scoring at all. Otherwise, reference records are narrowed to those of
/// the same year whose PI matches the retrieved record (exact author
/// membership, exact researcher equality, or fuzzy at the threshold), and
/// the best title score over that subset decides the verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniquenessClassifier {
    threshold: f64,
}

impl Default for UniquenessClassifier {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_UNIQUENESS_THRESHOLD,
        }
    }
}

impl UniquenessClassifier {
    /// Classifier with the default threshold (90).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier with an explicit similarity threshold.
    #[must_use]
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Partitions `retrieved` into new records and duplicates of
    /// `references`.
    #[must_use]
    pub fn classify(
        &self,
        retrieved: &[RetrievedRecord],
        references: &[ReferenceRecord],
    ) -> Classification {
        let reference_years: HashSet<i32> = references.iter().map(|r| r.year).collect();
        let mut classification = Classification::default();

        for (index, record) in retrieved.iter().enumerate() {
            // Year short-circuit: nothing in the corpus shares this year.
            let Some(year) = record.year.filter(|y| reference_years.contains(y)) else {
                classification.unique.insert(index);
                continue;
            };

            // Scoring runs against same-year references only.
            let mut best: Option<(usize, f64)> = None;
            for (ref_index, reference) in references.iter().enumerate() {
                if reference.year != year {
                    continue;
                }
                if !self.pi_matches(record, &reference.pi) {
                    continue;
                }
                let score = token_sort_ratio(record.title.trim(), reference.title.trim());
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((ref_index, score));
                }
            }

            match best {
                Some((ref_index, score)) if score >= self.threshold => {
                    classification.matches.insert(
                        index,
                        ReferenceMatch {
                            source_index: index,
                            matched_reference_index: ref_index,
                            matched_title: references[ref_index].title.clone(),
                            score,
                        },
                    );
                }
                _ => {
                    classification.unique.insert(index);
                }
            }
        }

        debug!(
            unique = classification.unique.len(),
            duplicates = classification.matches.len(),
            "classified retrieved records"
        );
        classification
    }

    /// A reference PI matches when it is a member of the record's author
    /// set, equals the record's researcher, or fuzzily matches either at
    /// the threshold.
    fn pi_matches(&self, record: &RetrievedRecord, pi: &str) -> bool {
        let pi_norm = pi.trim().to_lowercase();
        if record.authors.contains(&pi_norm) {
            return true;
        }
        if record.researcher.trim().to_lowercase() == pi_norm {
            return true;
        }
        if token_sort_ratio(record.researcher.trim(), pi) >= self.threshold {
            return true;
        }
        record
            .authors
            .iter()
            .any(|author| token_sort_ratio(author, pi) >= self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reference(title: &str, year: i32, pi: &str) -> ReferenceRecord {
        ReferenceRecord {
            title: title.to_string(),
            year,
            pi: pi.to_string(),
        }
    }

    fn retrieved(title: &str, year: Option<i32>, researcher: &str) -> RetrievedRecord {
        RetrievedRecord {
            title: title.to_string(),
            year,
            researcher: researcher.to_string(),
            authors: BTreeSet::new(),
        }
    }

    fn references() -> Vec<ReferenceRecord> {
        vec![
            reference("Labor Market Dynamics in Census Data", 2021, "Dr. Smith"),
            reference("Firm Entry and Wage Growth", 2019, "Dr. Jones"),
        ]
    }

    #[test]
    fn unseen_year_is_unique_without_any_scoring() {
        // 2025 appears nowhere in the corpus, so even an identical title
        // never reaches the similarity step.
        let retrieved_records = vec![retrieved(
            "Labor Market Dynamics in Census Data",
            Some(2025),
            "Dr. Smith",
        )];
        let classification = UniquenessClassifier::new().classify(&retrieved_records, &references());
        assert!(classification.is_unique(0));
        assert!(classification.matches.is_empty());
    }

    #[test]
    fn missing_year_is_unique() {
        let retrieved_records = vec![retrieved(
            "Labor Market Dynamics in Census Data",
            None,
            "Dr. Smith",
        )];
        let classification = UniquenessClassifier::new().classify(&retrieved_records, &references());
        assert!(classification.is_unique(0));
    }

    #[test]
    fn near_identical_title_with_matching_pi_is_a_duplicate() {
        let retrieved_records = vec![retrieved(
            "Labor market dynamics in census data",
            Some(2021),
            "Dr. Smith",
        )];
        let classification = UniquenessClassifier::new().classify(&retrieved_records, &references());

        let matched = classification.matches.get(&0).unwrap();
        assert_eq!(matched.matched_reference_index, 0);
        assert_eq!(matched.matched_title, "Labor Market Dynamics in Census Data");
        assert!(matched.score >= 90.0);
        assert!(!classification.is_unique(0));
    }

    #[test]
    fn pi_mismatch_filters_out_the_matching_title() {
        // Same title and year, but neither the researcher nor any author
        // resembles the reference PI.
        let retrieved_records = vec![retrieved(
            "Labor Market Dynamics in Census Data",
            Some(2021),
            "Dr. Completely Different",
        )];
        let classification = UniquenessClassifier::new().classify(&retrieved_records, &references());
        assert!(classification.is_unique(0));
    }

    #[test]
    fn pi_may_match_through_the_author_set() {
        let mut record = retrieved(
            "Labor Market Dynamics in Census Data",
            Some(2021),
            "Some Other Researcher",
        );
        record.authors = BTreeSet::from(["dr. smith".to_string()]);
        let classification = UniquenessClassifier::new().classify(&[record], &references());
        assert!(classification.matches.contains_key(&0));
    }

    #[test]
    fn scoring_is_restricted_to_same_year_references() {
        // The corpus knows 2021, so no short-circuit, but the matching
        // title belongs to a 2019 reference and must not be consulted.
        let refs = vec![
            reference("Some Other Study", 2021, "Dr. Brown"),
            reference("Labor Market Dynamics in Census Data", 2019, "Dr. Smith"),
        ];
        let retrieved_records = vec![retrieved(
            "Labor market dynamics in census data",
            Some(2021),
            "Dr. Smith",
        )];
        let classification = UniquenessClassifier::new().classify(&retrieved_records, &refs);
        assert!(classification.is_unique(0));
        assert!(classification.matches.is_empty());
    }

    #[test]
    fn dissimilar_title_stays_unique_despite_pi_match() {
        let retrieved_records = vec![retrieved(
            "A Totally Different Manuscript",
            Some(2021),
            "Dr. Smith",
        )];
        let classification = UniquenessClassifier::new().classify(&retrieved_records, &references());
        assert!(classification.is_unique(0));
    }

    #[test]
    fn title_threshold_is_inclusive() {
        // Titles of lengths 11 and 9 at edit distance 2 score exactly
        // 100 * 18 / 20 = 90.0, which must count as a duplicate.
        let refs = vec![reference("aaaaaaaaaaa", 2021, "Dr. Smith")];
        let retrieved_records = vec![retrieved("aaaaaaaaa", Some(2021), "Dr. Smith")];
        let classification = UniquenessClassifier::new().classify(&retrieved_records, &refs);
        let matched = classification.matches.get(&0).unwrap();
        assert_eq!(matched.score, 90.0);
    }

    #[test]
    fn batch_partition_covers_every_record_exactly_once() {
        let retrieved_records = vec![
            retrieved("Labor market dynamics in census data", Some(2021), "Dr. Smith"),
            retrieved("Brand new manuscript", Some(2021), "Dr. Smith"),
            retrieved("Anything at all", Some(1980), "Dr. Smith"),
        ];
        let classification = UniquenessClassifier::new().classify(&retrieved_records, &references());

        for index in 0..retrieved_records.len() {
            let unique = classification.is_unique(index);
            let matched = classification.matches.contains_key(&index);
            assert!(unique != matched, "record {index} must be in exactly one partition");
        }
        assert_eq!(classification.matches.len(), 1);
        assert_eq!(classification.unique.len(), 2);
    }
}
