//! Constraint filters over the project registry.
//!
//! A [`CandidateFilter`] narrows the registry to the rows satisfying a
//! conjunction of independent equality constraints. Registry row order is
//! preserved throughout: it is the tie-break order when the cascade later
//! selects a max-score candidate.

use std::collections::BTreeSet;

use crate::Registry;
use crate::similarity::token_sort_ratio;

/// An ordered subset of registry row indices.
///
/// Constraint methods consume and return the filter so calls chain; each
/// keeps only the rows passing its predicate, except [`pi_in_or_fuzzy`]
/// which falls back to the unfiltered input when its own threshold is not
/// met (a candidate reduction, not an elimination).
///
/// [`pi_in_or_fuzzy`]: CandidateFilter::pi_in_or_fuzzy
#[derive(Debug, Clone)]
pub struct CandidateFilter<'a> {
    registry: &'a Registry,
    indices: Vec<usize>,
}

impl<'a> CandidateFilter<'a> {
    /// Starts from the full registry, in row order.
    #[must_use]
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            indices: (0..registry.len()).collect(),
        }
    }

    /// Keeps rows whose `rdc` equals `rdc` exactly.
    #[must_use]
    pub fn rdc_equals(mut self, rdc: &str) -> Self {
        self.indices.retain(|&idx| self.registry.rows()[idx].rdc == rdc);
        self
    }

    /// Keeps rows whose start and end years integer-cast to `(start, end)`.
    ///
    /// Rows whose year fields cannot be cast are dropped from the candidate
    /// set; they are treated as non-matching, not as an error.
    #[must_use]
    pub fn year_range_equals(mut self, start: i32, end: i32) -> Self {
        self.indices.retain(|&idx| {
            let row = &self.registry.rows()[idx];
            row.year_started_int() == Some(start) && row.year_ended_int() == Some(end)
        });
        self
    }

    /// Keeps rows whose `pi` equals `pi` exactly.
    #[must_use]
    pub fn pi_equals(mut self, pi: &str) -> Self {
        self.indices.retain(|&idx| self.registry.rows()[idx].pi == pi);
        self
    }

    /// Keeps rows whose normalized PI appears in `authors`; falls back to
    /// the single best fuzzy-PI row when none does.
    ///
    /// The fallback retains only the highest-scoring row (strict `>`, first
    /// row wins ties) and only if `relax` is set or the score exceeds
    /// `threshold`. When the fallback fails its threshold, or the candidate
    /// set is already empty, the filter passes through unchanged.
    #[must_use]
    pub fn pi_in_or_fuzzy(mut self, authors: &BTreeSet<String>, threshold: f64, relax: bool) -> Self {
        let members: Vec<usize> = self
            .indices
            .iter()
            .copied()
            .filter(|&idx| {
                let pi = normalize_pi(&self.registry.rows()[idx].pi);
                authors.contains(&pi)
            })
            .collect();
        if !members.is_empty() {
            self.indices = members;
            return self;
        }

        let mut best_idx = None;
        let mut best_score = 0.0_f64;
        for &idx in &self.indices {
            let pi = normalize_pi(&self.registry.rows()[idx].pi);
            let mut row_score = 0.0_f64;
            for author in authors {
                let score = token_sort_ratio(author, &pi);
                if score > row_score {
                    row_score = score;
                }
            }
            if row_score > best_score {
                best_idx = Some(idx);
                best_score = row_score;
            }
        }

        if let Some(idx) = best_idx
            && (relax || best_score > threshold)
        {
            self.indices = vec![idx];
        }
        self
    }

    /// The surviving row indices, in registry order.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Consumes the filter, yielding the surviving indices.
    #[must_use]
    pub fn into_indices(self) -> Vec<usize> {
        self.indices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

fn normalize_pi(pi: &str) -> String {
    pi.trim().to_lowercase()
}
