//! Reference registry of canonical projects.
//!
//! The registry is read-only after construction and is shared by every
//! matching stage. Row order is preserved from the input because it is the
//! tie-break order for max-score selection in the cascade.

use std::collections::HashMap;

use itertools::Itertools;

use crate::ProjectRecord;

/// The project reference registry.
///
/// Built by de-duplicating the input on the full
/// `(proj_id, status, title, rdc, year_started, year_ended, pi)` tuple; no
/// two kept rows are identical across all fields. A project id can still own
/// several rows (e.g. the same project under two statuses); the id index
/// points at the first.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    rows: Vec<ProjectRecord>,
    by_id: HashMap<String, usize>,
}

impl Registry {
    /// Builds a registry from raw rows, dropping full-tuple duplicates
    /// (first occurrence wins, order preserved).
    #[must_use]
    pub fn new(rows: Vec<ProjectRecord>) -> Self {
        let rows: Vec<ProjectRecord> = rows.into_iter().unique().collect();
        let mut by_id = HashMap::new();
        for (idx, row) in rows.iter().enumerate() {
            by_id.entry(row.proj_id.clone()).or_insert(idx);
        }
        Self { rows, by_id }
    }

    /// Number of registry rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows in canonical order.
    #[must_use]
    pub fn rows(&self) -> &[ProjectRecord] {
        &self.rows
    }

    /// The row at `idx`, if in range.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&ProjectRecord> {
        self.rows.get(idx)
    }

    /// Looks a project up by id (first row with that id).
    #[must_use]
    pub fn find_by_id(&self, proj_id: &str) -> Option<&ProjectRecord> {
        self.by_id.get(proj_id).map(|&idx| &self.rows[idx])
    }

    /// PIs that own exactly one registry row, mapped to that row's index.
    ///
    /// Used by the unique-PI inference tier: a PI with two rows is
    /// ambiguous and excluded, even when both rows share a project id.
    #[must_use]
    pub fn pi_singletons(&self) -> HashMap<&str, usize> {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (idx, row) in self.rows.iter().enumerate() {
            let entry = counts.entry(row.pi.as_str()).or_insert((0, idx));
            entry.0 += 1;
        }
        counts
            .into_iter()
            .filter(|(_, (count, _))| *count == 1)
            .map(|(pi, (_, idx))| (pi, idx))
            .collect()
    }

    /// `(pi, rdc)` pairs that own exactly one registry row.
    #[must_use]
    pub fn pi_rdc_singletons(&self) -> HashMap<(&str, &str), usize> {
        let mut counts: HashMap<(&str, &str), (usize, usize)> = HashMap::new();
        for (idx, row) in self.rows.iter().enumerate() {
            let entry = counts
                .entry((row.pi.as_str(), row.rdc.as_str()))
                .or_insert((0, idx));
            entry.0 += 1;
        }
        counts
            .into_iter()
            .filter(|(_, (count, _))| *count == 1)
            .map(|(key, (_, idx))| (key, idx))
            .collect()
    }

    /// Whether any registry title equals `title` after trimming and
    /// lower-casing. Backstop check for source-claimed project titles.
    #[must_use]
    pub fn contains_title(&self, title: &str) -> bool {
        let needle = title.trim().to_lowercase();
        self.rows
            .iter()
            .any(|row| row.title.trim().to_lowercase() == needle)
    }
}
