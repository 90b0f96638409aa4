//! Cross-source deduplication of output records.
//!
//! Overlapping per-source-group record sets are collapsed to one record per
//! logical output. The group priority is fixed by design: the anchor group
//! (2) wins every tie, then group 1, then group 6, then all remaining groups
//! jointly. Within the anchor group, records are keyed by DOI when they have
//! one and by title otherwise; outside the anchor group only records with a
//! DOI are ever retained.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use projlink::{Deduplicator, OutputRecord, SourceGroup};
//!
//! let anchor = SourceGroup::new(2).unwrap();
//! let secondary = SourceGroup::new(1).unwrap();
//!
//! let mut a = OutputRecord::new(anchor, 0);
//! a.output_title = Some("Shared Output".into());
//! a.doi = Some("https://doi.org/10.1/x".into());
//! let mut b = OutputRecord::new(secondary, 0);
//! b.output_title = Some("Shared Output".into());
//! b.doi = Some("https://doi.org/10.1/x".into());
//!
//! let mut groups = BTreeMap::new();
//! groups.insert(anchor, vec![a]);
//! groups.insert(secondary, vec![b]);
//!
//! let survivors = Deduplicator::new().dedupe(groups);
//! assert_eq!(survivors.len(), 1);
//! assert_eq!(survivors[0].source_group, anchor);
//! ```

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::{OutputRecord, SourceGroup};

/// Top priority in deduplication; the only group whose DOI-less records
/// survive.
pub const ANCHOR_GROUP: SourceGroup = SourceGroup(2);
/// Second priority.
pub const SECONDARY_GROUP: SourceGroup = SourceGroup(1);
/// Third priority.
pub const TERTIARY_GROUP: SourceGroup = SourceGroup(6);

/// Collapses grouped records into one record per logical output.
///
/// The "already seen" DOI set is an explicit accumulator threaded through
/// the sequential group passes; eliminated records are dropped, never
/// copied. Output order is anchor survivors first, then group 1, group 6,
/// and the remaining groups, each block preserving original row order.
#[derive(Debug, Default, Clone)]
pub struct Deduplicator;

impl Deduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs the deduplication cascade over per-group record lists.
    ///
    /// Records without an `output_title` are dropped globally before any
    /// group is processed.
    #[must_use]
    pub fn dedupe(&self, mut groups: BTreeMap<SourceGroup, Vec<OutputRecord>>) -> Vec<OutputRecord> {
        for records in groups.values_mut() {
            records.retain(|record| record.output_title.is_some());
        }

        let mut survivors = Vec::new();
        let mut seen_dois: HashSet<String> = HashSet::new();

        let anchor = groups.remove(&ANCHOR_GROUP).unwrap_or_default();
        let anchor_kept = Self::keep_anchor(anchor, &mut seen_dois, &mut survivors);
        debug!(group = %ANCHOR_GROUP, kept = anchor_kept, "deduplicated anchor group");

        for group in [SECONDARY_GROUP, TERTIARY_GROUP] {
            let records = groups.remove(&group).unwrap_or_default();
            let kept = Self::keep_with_doi(records, &mut seen_dois, &mut survivors);
            debug!(group = %group, kept, "deduplicated group");
        }

        // Remaining groups are processed jointly, ascending by group id.
        let rest: Vec<OutputRecord> = groups.into_values().flatten().collect();
        let kept = Self::keep_with_doi(rest, &mut seen_dois, &mut survivors);
        debug!(kept, total = survivors.len(), "deduplicated remaining groups");

        survivors
    }

    /// Anchor-group pass: DOI records deduplicated by DOI, DOI-less records
    /// deduplicated by title, DOI block first.
    fn keep_anchor(
        records: Vec<OutputRecord>,
        seen_dois: &mut HashSet<String>,
        survivors: &mut Vec<OutputRecord>,
    ) -> usize {
        let before = survivors.len();
        let (with_doi, without_doi): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|record| record.doi.is_some());

        for record in with_doi {
            let doi = record.doi.clone().unwrap_or_default();
            if seen_dois.insert(doi) {
                survivors.push(record);
            }
        }

        let mut seen_titles: HashSet<String> = HashSet::new();
        for record in without_doi {
            let title = record.output_title.clone().unwrap_or_default();
            if seen_titles.insert(title) {
                survivors.push(record);
            }
        }
        survivors.len() - before
    }

    /// Non-anchor pass: keeps only records carrying a DOI not yet in the
    /// accumulator (first occurrence wins within the block).
    fn keep_with_doi(
        records: Vec<OutputRecord>,
        seen_dois: &mut HashSet<String>,
        survivors: &mut Vec<OutputRecord>,
    ) -> usize {
        let before = survivors.len();
        for record in records {
            if let Some(doi) = record.doi.clone()
                && seen_dois.insert(doi)
            {
                survivors.push(record);
            }
        }
        survivors.len() - before
    }
}
