//! Progressive project attribution.
//!
//! The cascade tries eight strategies in order of decreasing confidence.
//! Tier 0 is an exact project-id join; tiers 1 and 2 infer a project from a
//! PI who owns exactly one registry row (optionally disambiguated by RDC);
//! tiers 3 through 7 fuzzy-match the output title against registry project
//! titles under progressively looser constraint filters. A record attributed
//! by one tier is never touched by a later tier.
//!
//! # Example
//!
//! ```rust
//! use projlink::{AttributionCascade, OutputRecord, ProjectRecord, Registry, SourceGroup};
//!
//! let registry = Registry::new(vec![ProjectRecord {
//!     proj_id: "P001".into(),
//!     status: "Active".into(),
//!     title: "Labor Market Dynamics".into(),
//!     rdc: "Census RDC".into(),
//!     year_started: Some("2019".into()),
//!     year_ended: Some("2021".into()),
//!     pi: "Dr. Smith".into(),
//! }]);
//!
//! let mut record = OutputRecord::new(SourceGroup::new(1).unwrap(), 0);
//! record.output_title = Some("Labor market dynamics".into());
//!
//! let mut records = vec![record];
//! let report = AttributionCascade::new().attribute(&mut records, &registry);
//! assert_eq!(records[0].project_id.as_deref(), Some("P001"));
//! assert_eq!(report.unattributed, 0);
//! ```

use rayon::prelude::*;
use tracing::debug;

use crate::filter::CandidateFilter;
use crate::similarity::token_sort_ratio;
use crate::{OutputRecord, Registry};

/// Default acceptance threshold for fuzzy title tiers.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 80.0;

/// Score recorded when a constraint filter narrows to a single candidate
/// and the title is not scored at all.
const SINGLETON_SCORE: f64 = 100.0;

/// Cascade-wide settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeConfig {
    /// Fuzzy tiers accept only scores strictly above this value.
    pub match_threshold: f64,
    /// Score records within each fuzzy tier in parallel. Results are
    /// identical either way; records never observe one another.
    pub run_in_parallel: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            run_in_parallel: false,
        }
    }
}

/// Constraint-filter switches for one fuzzy tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyTierOptions {
    pub match_threshold: f64,
    /// Restrict candidates to the record's claimed RDC.
    pub use_rdc: bool,
    /// Restrict candidates to the record's claimed project year range.
    pub use_year: bool,
    /// Restrict candidates to the record's claimed PI, exactly.
    pub use_pi: bool,
    /// Restrict candidates by PI membership in the record's author set,
    /// with fuzzy single-best fallback.
    pub use_authors: bool,
    /// Let the author-set fuzzy fallback keep its best row even below the
    /// threshold.
    pub relax_author_threshold: bool,
    /// Accept the best-scoring title unconditionally.
    pub relax_threshold: bool,
}

impl FuzzyTierOptions {
    /// RDC, year range and exact PI must all match.
    #[must_use]
    pub fn rdc_year_pi(match_threshold: f64) -> Self {
        Self {
            match_threshold,
            use_rdc: true,
            use_year: true,
            use_pi: true,
            use_authors: false,
            relax_author_threshold: false,
            relax_threshold: false,
        }
    }

    /// RDC must match and the PI must appear in (or fuzzily match) the
    /// author set.
    #[must_use]
    pub fn rdc_authors(match_threshold: f64) -> Self {
        Self {
            match_threshold,
            use_rdc: true,
            use_year: false,
            use_pi: false,
            use_authors: true,
            relax_author_threshold: false,
            relax_threshold: false,
        }
    }

    /// Author-set constraint only, with the fuzzy-PI threshold relaxed.
    #[must_use]
    pub fn authors_only(match_threshold: f64) -> Self {
        Self {
            match_threshold,
            use_rdc: false,
            use_year: false,
            use_pi: false,
            use_authors: true,
            relax_author_threshold: true,
            relax_threshold: false,
        }
    }

    /// Unconstrained title match, threshold enforced.
    #[must_use]
    pub fn title_only(match_threshold: f64) -> Self {
        Self {
            match_threshold,
            use_rdc: false,
            use_year: false,
            use_pi: false,
            use_authors: false,
            relax_author_threshold: false,
            relax_threshold: false,
        }
    }

    /// Unconstrained title match that always accepts the best candidate.
    #[must_use]
    pub fn title_unconditional(match_threshold: f64) -> Self {
        Self {
            match_threshold,
            use_rdc: false,
            use_year: false,
            use_pi: false,
            use_authors: false,
            relax_author_threshold: false,
            relax_threshold: true,
        }
    }
}

/// Outcome counters for one [`AttributionCascade::attribute`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Records attributed at each tier, indexed by tier number.
    pub tier_attributed: [usize; 8],
    /// Fuzzy-tier visits that skipped a record for lack of a title.
    pub skipped_missing_title: usize,
    /// Fuzzy-tier visits whose constraint filter left no candidates.
    pub empty_candidates: usize,
    /// Fuzzy-tier visits whose best score failed the threshold.
    pub below_threshold: usize,
    /// Records still without a project id after tier 7.
    pub unattributed: usize,
}

impl CascadeReport {
    /// Total records attributed across all tiers.
    #[must_use]
    pub fn attributed(&self) -> usize {
        self.tier_attributed.iter().sum()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TierStats {
    attributed: usize,
    skipped_missing_title: usize,
    empty_candidates: usize,
    below_threshold: usize,
}

impl TierStats {
    fn merge(self, other: Self) -> Self {
        Self {
            attributed: self.attributed + other.attributed,
            skipped_missing_title: self.skipped_missing_title + other.skipped_missing_title,
            empty_candidates: self.empty_candidates + other.empty_candidates,
            below_threshold: self.below_threshold + other.below_threshold,
        }
    }
}

/// Runs the eight-tier attribution cascade over a record set.
#[derive(Debug, Clone, Default)]
pub struct AttributionCascade {
    config: CascadeConfig,
}

impl AttributionCascade {
    /// Cascade with the default configuration (threshold 80, sequential).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cascade with explicit configuration.
    #[must_use]
    pub fn with_config(config: CascadeConfig) -> Self {
        Self { config }
    }

    /// Attributes every record it can, in place, and reports per-tier
    /// counts. Records that already carry a project id are resolved against
    /// the registry at tier 0 and never reattributed.
    pub fn attribute(&self, records: &mut [OutputRecord], registry: &Registry) -> CascadeReport {
        let mut report = CascadeReport::default();

        report.tier_attributed[0] = self.tier_exact_id(records, registry);
        debug!(attributed = report.tier_attributed[0], "tier 0: exact project-id join");

        report.tier_attributed[1] = self.tier_pi_singleton(records, registry);
        debug!(attributed = report.tier_attributed[1], "tier 1: unique-PI inference");

        report.tier_attributed[2] = self.tier_pi_rdc_singleton(records, registry);
        debug!(attributed = report.tier_attributed[2], "tier 2: unique (PI, RDC) inference");

        let threshold = self.config.match_threshold;
        let fuzzy_tiers = [
            FuzzyTierOptions::rdc_year_pi(threshold),
            FuzzyTierOptions::rdc_authors(threshold),
            FuzzyTierOptions::authors_only(threshold),
            FuzzyTierOptions::title_only(threshold),
            FuzzyTierOptions::title_unconditional(threshold),
        ];
        for (offset, options) in fuzzy_tiers.into_iter().enumerate() {
            let tier = 3 + offset;
            let stats = self.run_fuzzy_tier(records, registry, options);
            report.tier_attributed[tier] = stats.attributed;
            report.skipped_missing_title += stats.skipped_missing_title;
            report.empty_candidates += stats.empty_candidates;
            report.below_threshold += stats.below_threshold;
            debug!(
                tier,
                attributed = stats.attributed,
                empty = stats.empty_candidates,
                below_threshold = stats.below_threshold,
                "fuzzy title tier"
            );
        }

        report.unattributed = records.iter().filter(|r| r.project_id.is_none()).count();
        report
    }

    /// Tier 0: resolves records that arrived with a project id. The id is
    /// kept verbatim; companion fields are filled only on a registry hit.
    fn tier_exact_id(&self, records: &mut [OutputRecord], registry: &Registry) -> usize {
        let mut attributed = 0;
        for record in records.iter_mut() {
            let Some(proj_id) = record.project_id.clone() else {
                continue;
            };
            if let Some(project) = registry.find_by_id(&proj_id) {
                record.set_project(project);
            }
            attributed += 1;
        }
        attributed
    }

    /// Tier 1: a record whose claimed PI owns exactly one registry row is
    /// attributed to that row.
    fn tier_pi_singleton(&self, records: &mut [OutputRecord], registry: &Registry) -> usize {
        let singletons = registry.pi_singletons();
        let mut attributed = 0;
        for record in records.iter_mut() {
            if record.project_id.is_some() {
                continue;
            }
            if let Some(pi) = record.project_pi.as_deref()
                && let Some(&idx) = singletons.get(pi)
            {
                record.set_project(&registry.rows()[idx]);
                attributed += 1;
            }
        }
        attributed
    }

    /// Tier 2: like tier 1, but the PI is disambiguated by RDC. Null key
    /// components join as the empty string.
    fn tier_pi_rdc_singleton(&self, records: &mut [OutputRecord], registry: &Registry) -> usize {
        let singletons = registry.pi_rdc_singletons();
        let mut attributed = 0;
        for record in records.iter_mut() {
            if record.project_id.is_some() {
                continue;
            }
            let pi = record.project_pi.as_deref().unwrap_or("");
            let rdc = record.project_rdc.as_deref().unwrap_or("");
            if let Some(&idx) = singletons.get(&(pi, rdc)) {
                record.set_project(&registry.rows()[idx]);
                attributed += 1;
            }
        }
        attributed
    }

    fn run_fuzzy_tier(
        &self,
        records: &mut [OutputRecord],
        registry: &Registry,
        options: FuzzyTierOptions,
    ) -> TierStats {
        if self.config.run_in_parallel {
            records
                .par_iter_mut()
                .map(|record| Self::fuzzy_match_record(record, registry, options))
                .reduce(TierStats::default, TierStats::merge)
        } else {
            records
                .iter_mut()
                .map(|record| Self::fuzzy_match_record(record, registry, options))
                .fold(TierStats::default(), TierStats::merge)
        }
    }

    /// Applies one fuzzy tier to one record.
    ///
    /// Each enabled constraint is applied only when the record field(s) it
    /// reads are present; a null field skips that constraint, never the
    /// record. A filter that narrows to a single row is accepted without
    /// scoring the title. Otherwise the best candidate is selected by
    /// strict maximum over registry-order candidates (first row wins ties)
    /// and accepted when the score strictly exceeds the threshold, or
    /// unconditionally under `relax_threshold`.
    fn fuzzy_match_record(
        record: &mut OutputRecord,
        registry: &Registry,
        options: FuzzyTierOptions,
    ) -> TierStats {
        let mut stats = TierStats::default();
        if record.project_id.is_some() {
            return stats;
        }
        let Some(title) = record.output_title.clone() else {
            stats.skipped_missing_title = 1;
            return stats;
        };

        let mut filter = CandidateFilter::new(registry);
        if options.use_rdc && let Some(rdc) = record.project_rdc.as_deref() {
            filter = filter.rdc_equals(rdc);
        }
        if options.use_year
            && let (Some(start), Some(end)) =
                (record.project_year_started, record.project_year_ended)
        {
            filter = filter.year_range_equals(start, end);
        }
        if options.use_pi && let Some(pi) = record.project_pi.as_deref() {
            filter = filter.pi_equals(pi);
        }
        if options.use_authors && !record.authors_set.is_empty() {
            filter = filter.pi_in_or_fuzzy(
                &record.authors_set,
                options.match_threshold,
                options.relax_author_threshold,
            );
        }

        let candidates = filter.into_indices();
        match candidates.as_slice() {
            [] => {
                stats.empty_candidates = 1;
            }
            [only] => {
                record.set_project(&registry.rows()[*only]);
                record.best_match_score = Some(SINGLETON_SCORE);
                stats.attributed = 1;
            }
            _ => {
                let needle = title.trim();
                let mut best_idx = candidates[0];
                let mut best_score = f64::MIN;
                for &idx in &candidates {
                    let score = token_sort_ratio(needle, registry.rows()[idx].title.trim());
                    if score > best_score {
                        best_idx = idx;
                        best_score = score;
                    }
                }
                if options.relax_threshold || best_score > options.match_threshold {
                    record.set_project(&registry.rows()[best_idx]);
                    record.best_match_score = Some(best_score);
                    stats.attributed = 1;
                } else {
                    stats.below_threshold = 1;
                }
            }
        }
        stats
    }
}
