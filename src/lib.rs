//! A record-linkage engine for harvested research outputs.
//!
//! `projlink` attributes bibliographic output records collected from multiple
//! heterogeneous sources to canonical sponsored-research projects drawn from a
//! reference registry, and removes duplicate records that describe the same
//! output across sources.
//!
//! # Key Features
//!
//! - **Source-aware deduplication**: collapses overlapping per-source record
//!   sets into one record per logical output, driven by a fixed source-group
//!   priority and per-group uniqueness keys (DOI, then title).
//! - **Progressive attribution**: an eight-tier cascade that tries
//!   increasingly uncertain strategies, from exact project-id join through
//!   unique-PI inference to fuzzy title matching under configurable
//!   constraint filters and thresholds.
//! - **Uniqueness classification**: decides whether a freshly retrieved
//!   record already exists in a reference corpus, with match provenance for
//!   every duplicate.
//!
//! # Basic Usage
//!
//! ```rust
//! use projlink::{AttributionCascade, OutputRecord, ProjectRecord, Registry, SourceGroup};
//!
//! let registry = Registry::new(vec![ProjectRecord {
//!     proj_id: "P001".into(),
//!     status: "Active".into(),
//!     title: "Economic Analysis of Census Data".into(),
//!     rdc: "Census RDC".into(),
//!     year_started: Some("2020".into()),
//!     year_ended: Some("2022".into()),
//!     pi: "Dr. Smith".into(),
//! }]);
//!
//! let mut record = OutputRecord::new(SourceGroup::new(2).unwrap(), 0);
//! record.output_title = Some("Economic Analysis of Census Data".into());
//! record.project_pi = Some("Dr. Smith".into());
//!
//! let mut records = vec![record];
//! let report = AttributionCascade::new().attribute(&mut records, &registry);
//! assert_eq!(records[0].project_id.as_deref(), Some("P001"));
//! assert_eq!(report.unattributed, 0);
//! ```
//!
//! # Deduplication
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use projlink::{Deduplicator, OutputRecord, SourceGroup};
//!
//! let anchor = SourceGroup::new(2).unwrap();
//! let mut rec = OutputRecord::new(anchor, 0);
//! rec.output_title = Some("Example Paper".into());
//! rec.doi = Some("https://doi.org/10.1234/example".into());
//!
//! let mut groups = BTreeMap::new();
//! groups.insert(anchor, vec![rec.clone(), rec]);
//!
//! let survivors = Deduplicator::new().dedupe(groups);
//! assert_eq!(survivors.len(), 1);
//! ```
//!
//! # Determinism
//!
//! Every filtering and scoring step preserves a single canonical iteration
//! order (source row order or registry row order); ties are broken by the
//! first candidate to reach the maximum score. Re-running any stage on the
//! same inputs yields the same result.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cascade;
pub mod dedupe;
pub mod filter;
pub mod registry;
pub mod schema;
pub mod similarity;
pub mod uniqueness;

// Reexports
pub use cascade::{AttributionCascade, CascadeConfig, CascadeReport, FuzzyTierOptions};
pub use dedupe::Deduplicator;
pub use filter::CandidateFilter;
pub use registry::Registry;
pub use schema::SourceTable;
pub use uniqueness::{
    Classification, ReferenceMatch, ReferenceRecord, RetrievedRecord, UniquenessClassifier,
};

/// A specialized Result type for linkage operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Represents errors that can occur during record linkage.
///
/// Conditions that can be recovered locally (a record missing a title, a
/// year that fails integer coercion, an empty candidate set) are not errors;
/// the affected record is simply skipped and the skip is counted in the
/// relevant report.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("missing required column `{column}` in table `{table}`")]
    SchemaViolation { table: String, column: String },

    #[error("invalid source group {0}: group ids range from 1 to 8")]
    InvalidSourceGroup(u8),
}

/// Identifies which of the eight harvest sources a record came from.
///
/// Group 2 is the anchor group: it has top priority in deduplication and is
/// the only group whose DOI-less records are retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SourceGroup(pub(crate) u8);

impl SourceGroup {
    /// Creates a source group, validating that the id is in `1..=8`.
    pub fn new(id: u8) -> Result<Self> {
        if (1..=8).contains(&id) {
            Ok(Self(id))
        } else {
            Err(LinkError::InvalidSourceGroup(id))
        }
    }

    /// The numeric group id.
    #[must_use]
    pub fn id(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for SourceGroup {
    type Error = LinkError;

    fn try_from(id: u8) -> Result<Self> {
        Self::new(id)
    }
}

impl From<SourceGroup> for u8 {
    fn from(group: SourceGroup) -> u8 {
        group.0
    }
}

impl std::fmt::Display for SourceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group {}", self.0)
    }
}

/// One research output harvested from a source group.
///
/// Instances are created once per source row, eliminated (removed, not
/// copied) by the [`Deduplicator`], and have their project fields populated
/// by the [`AttributionCascade`]. Once `project_id` is non-null it is never
/// overwritten by a later, lower-confidence tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Title of the output; records without one are dropped before
    /// deduplication and skipped by every fuzzy tier.
    pub output_title: Option<String>,
    /// Publication year, if it could be coerced to an integer.
    pub output_year: Option<i32>,
    /// DOI in full-URI form (`https://doi.org/<id>`).
    pub doi: Option<String>,
    /// Semicolon-joined raw author names (researcher field included).
    pub authors_all: String,
    /// Lower-cased, trimmed author tokens; empty tokens filtered out.
    pub authors_set: BTreeSet<String>,
    /// Canonical project id, set at most once by the cascade.
    pub project_id: Option<String>,
    pub project_status: Option<String>,
    pub project_title: Option<String>,
    pub project_rdc: Option<String>,
    pub project_year_started: Option<i32>,
    pub project_year_ended: Option<i32>,
    pub project_pi: Option<String>,
    /// Which source this record was harvested from.
    pub source_group: SourceGroup,
    /// Stable tie-break key: the record's row index within its group.
    pub source_row_index: usize,
    /// Similarity score of the accepted match; set only by fuzzy tiers.
    pub best_match_score: Option<f64>,
}

impl OutputRecord {
    /// Creates an empty record for the given source position.
    #[must_use]
    pub fn new(source_group: SourceGroup, source_row_index: usize) -> Self {
        Self {
            output_title: None,
            output_year: None,
            doi: None,
            authors_all: String::new(),
            authors_set: BTreeSet::new(),
            project_id: None,
            project_status: None,
            project_title: None,
            project_rdc: None,
            project_year_started: None,
            project_year_ended: None,
            project_pi: None,
            source_group,
            source_row_index,
            best_match_score: None,
        }
    }

    /// Populates the project fields from a registry row.
    ///
    /// Callers are responsible for the monotonic-attribution invariant: the
    /// cascade only invokes this on records whose `project_id` is still null
    /// (tier 0's key join re-applies the same id it found).
    pub(crate) fn set_project(&mut self, project: &ProjectRecord) {
        self.project_id = Some(project.proj_id.clone());
        self.project_status = Some(project.status.clone());
        self.project_title = Some(project.title.clone());
        self.project_rdc = Some(project.rdc.clone());
        self.project_year_started = project.year_started_int();
        self.project_year_ended = project.year_ended_int();
        self.project_pi = Some(project.pi.clone());
    }
}

/// One canonical sponsored-research project from the reference registry.
///
/// Year fields are kept as the raw registry values: integer coercion is
/// attempted at match time, so a row whose years are malformed is merely
/// excluded from year-range matching instead of being dropped from the
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub proj_id: String,
    pub status: String,
    pub title: String,
    pub rdc: String,
    pub year_started: Option<String>,
    pub year_ended: Option<String>,
    pub pi: String,
}

impl ProjectRecord {
    /// Start year as an integer, if it can be coerced.
    #[must_use]
    pub fn year_started_int(&self) -> Option<i32> {
        self.year_started.as_deref().and_then(coerce_year)
    }

    /// End year as an integer, if it can be coerced.
    #[must_use]
    pub fn year_ended_int(&self) -> Option<i32> {
        self.year_ended.as_deref().and_then(coerce_year)
    }
}

/// Coerces a raw year value to an integer.
///
/// Registry exports frequently carry years as floats ("2020.0"); those are
/// accepted. Anything non-numeric ("Ongoing", "") yields `None`.
pub(crate) fn coerce_year(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i32>().ok().or_else(|| {
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0)
            .map(|f| f as i32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn source_group_validates_range() {
        assert!(SourceGroup::new(1).is_ok());
        assert!(SourceGroup::new(8).is_ok());
        assert!(matches!(SourceGroup::new(0), Err(LinkError::InvalidSourceGroup(0))));
        assert!(matches!(SourceGroup::new(9), Err(LinkError::InvalidSourceGroup(9))));
    }

    #[test]
    fn schema_violation_names_table_and_column() {
        let err = LinkError::SchemaViolation {
            table: "outputs_group3".to_string(),
            column: "title".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "missing required column `title` in table `outputs_group3`"
        );
    }

    #[test]
    fn coerce_year_accepts_ints_and_floats() {
        assert_eq!(coerce_year("2020"), Some(2020));
        assert_eq!(coerce_year(" 2020.0 "), Some(2020));
        assert_eq!(coerce_year("Ongoing"), None);
        assert_eq!(coerce_year(""), None);
        assert_eq!(coerce_year("2020.5"), None);
    }

    #[test]
    fn set_project_coerces_registry_years() {
        let project = ProjectRecord {
            proj_id: "P010".into(),
            status: "Active".into(),
            title: "Project Ten".into(),
            rdc: "Boston".into(),
            year_started: Some("2018".into()),
            year_ended: Some("Ongoing".into()),
            pi: "Dr. Lee".into(),
        };
        let mut record = OutputRecord::new(SourceGroup::new(2).unwrap(), 0);
        record.set_project(&project);
        assert_eq!(record.project_id.as_deref(), Some("P010"));
        assert_eq!(record.project_year_started, Some(2018));
        assert_eq!(record.project_year_ended, None);
    }
}
