//! Typed-table seam between upstream source exports and the linkage core.
//!
//! Upstream harvesters deliver per-source tables already renamed to a common
//! column vocabulary. This module validates that vocabulary and converts a
//! table into the core's record types, applying the normalizations the rest
//! of the crate relies on: DOI completion to full-URI form, author-set
//! construction, and year coercion.
//!
//! A missing required column is fatal ([`LinkError::SchemaViolation`]); a
//! malformed cell is not. A year that fails coercion yields `None` and the
//! record merely drops out of year-based matching.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::{LinkError, OutputRecord, ProjectRecord, Registry, Result, SourceGroup, coerce_year};

static DOI_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(?:dx\.)?doi\.org/(.+)$").unwrap());

/// Column required in every output table.
pub const OUTPUT_TITLE: &str = "title";
/// Optional output-table columns the conversion understands.
pub const OUTPUT_COLUMNS: &[&str] = &[
    OUTPUT_TITLE,
    "year",
    "doi",
    "researcher",
    "authors",
    "projid",
    "status",
    "proj_title",
    "rdc",
    "year_started",
    "year_ended",
    "pi",
];
/// Columns required in the registry table.
pub const REGISTRY_COLUMNS: &[&str] = &[
    "projid",
    "status",
    "title",
    "rdc",
    "year_started",
    "year_ended",
    "pi",
];

/// A named table of string cells, as delivered by upstream normalization.
///
/// Rows shorter than the header are padded with empty cells; an empty cell
/// reads as an absent value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTable {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl SourceTable {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Index of `column`, or a [`LinkError::SchemaViolation`] naming this
    /// table and the missing column.
    fn require(&self, column: &str) -> Result<usize> {
        self.column_index(column).ok_or_else(|| LinkError::SchemaViolation {
            table: self.name.clone(),
            column: column.to_string(),
        })
    }

    /// Non-empty trimmed cell value at `(row, column)`, when the column
    /// exists.
    fn cell(&self, row: &[String], column: &str) -> Option<String> {
        let idx = self.column_index(column)?;
        let value = row.get(idx)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    /// Converts an output table into records for the given source group.
    ///
    /// Only the title column is required; every other recognized column is
    /// optional and absent columns simply leave their fields `None`.
    pub fn output_records(&self, group: SourceGroup) -> Result<Vec<OutputRecord>> {
        self.require(OUTPUT_TITLE)?;

        let mut records = Vec::with_capacity(self.rows.len());
        for (row_index, row) in self.rows.iter().enumerate() {
            let mut record = OutputRecord::new(group, row_index);
            record.output_title = self.cell(row, OUTPUT_TITLE);
            record.output_year = self.cell(row, "year").as_deref().and_then(coerce_year);
            record.doi = self.cell(row, "doi").as_deref().and_then(normalize_doi);

            let researcher = self.cell(row, "researcher");
            let authors = self.cell(row, "authors");
            record.authors_all = join_authors(researcher.as_deref(), authors.as_deref());
            record.authors_set = split_author_set(&record.authors_all);

            record.project_id = self.cell(row, "projid");
            record.project_status = self.cell(row, "status");
            record.project_title = self.cell(row, "proj_title");
            record.project_rdc = self.cell(row, "rdc");
            record.project_year_started =
                self.cell(row, "year_started").as_deref().and_then(coerce_year);
            record.project_year_ended =
                self.cell(row, "year_ended").as_deref().and_then(coerce_year);
            record.project_pi = self.cell(row, "pi");

            if record.output_title.is_none() {
                warn!(table = %self.name, row = row_index, "row has no title and will be dropped downstream");
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Converts a registry table into project rows.
    ///
    /// All seven registry columns are required. Year cells are kept as raw
    /// strings; rows with malformed years stay in the registry and are
    /// excluded from year matching only.
    pub fn project_records(&self) -> Result<Vec<ProjectRecord>> {
        for column in REGISTRY_COLUMNS {
            self.require(column)?;
        }

        let rows = self
            .rows
            .iter()
            .map(|row| ProjectRecord {
                proj_id: self.cell(row, "projid").unwrap_or_default(),
                status: self.cell(row, "status").unwrap_or_default(),
                title: self.cell(row, "title").unwrap_or_default(),
                rdc: self.cell(row, "rdc").unwrap_or_default(),
                year_started: self.cell(row, "year_started"),
                year_ended: self.cell(row, "year_ended"),
                pi: self.cell(row, "pi").unwrap_or_default(),
            })
            .collect();
        Ok(rows)
    }
}

/// Normalizes a raw DOI cell to the canonical `https://doi.org/<id>` form.
///
/// Accepts bare DOIs, `doi:` prefixes, and existing URL forms; anything
/// without a `10.`-prefixed identifier is treated as absent.
#[must_use]
pub fn normalize_doi(raw: &str) -> Option<String> {
    let doi = raw
        .trim()
        .trim_end_matches("[doi]")
        .trim()
        .replace(|c: char| c.is_whitespace(), "")
        .to_lowercase();

    let start = doi.find("10.")?;
    let doi = &doi[start..];
    let id = match DOI_URL_REGEX.captures(doi) {
        Some(captures) => captures[1].to_string(),
        None => doi.to_string(),
    };
    Some(format!("https://doi.org/{id}"))
}

/// Clears source-claimed project titles that cannot be verified.
///
/// A record with no project id keeps its claimed `project_title` only if
/// that title occurs in the registry. Run before attribution so stale
/// source claims do not masquerade as attributed projects.
pub fn clear_unverified_project_titles(records: &mut [OutputRecord], registry: &Registry) {
    for record in records.iter_mut() {
        if record.project_id.is_some() {
            continue;
        }
        if let Some(title) = record.project_title.as_deref()
            && !registry.contains_title(title)
        {
            record.project_title = None;
        }
    }
}

fn join_authors(researcher: Option<&str>, authors: Option<&str>) -> String {
    match (researcher, authors) {
        (Some(r), Some(a)) => format!("{r}; {a}"),
        (Some(r), None) => r.to_string(),
        (None, Some(a)) => a.to_string(),
        (None, None) => String::new(),
    }
}

fn split_author_set(authors_all: &str) -> BTreeSet<String> {
    authors_all
        .split(';')
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn group() -> SourceGroup {
        SourceGroup::new(3).unwrap()
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_title_column_is_a_schema_violation() {
        let table = SourceTable::new("outputs_group3", strings(&["year", "doi"]), vec![]);
        let err = table.output_records(group()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required column `title` in table `outputs_group3`"
        );
    }

    #[test]
    fn missing_registry_column_names_the_column() {
        let table = SourceTable::new(
            "registry",
            strings(&["projid", "status", "title", "rdc", "year_started", "year_ended"]),
            vec![],
        );
        let err = table.project_records().unwrap_err();
        assert!(matches!(
            err,
            LinkError::SchemaViolation { ref column, .. } if column == "pi"
        ));
    }

    #[test]
    fn converts_rows_with_normalization() {
        let table = SourceTable::new(
            "outputs_group3",
            strings(&["title", "year", "doi", "researcher", "authors"]),
            vec![strings(&[
                " A Paper ",
                "2021.0",
                "doi:10.1000/TEST",
                "Dr. Smith",
                "Jones A; ; Brown B",
            ])],
        );
        let records = table.output_records(group()).unwrap();
        let record = &records[0];

        assert_eq!(record.output_title.as_deref(), Some("A Paper"));
        assert_eq!(record.output_year, Some(2021));
        assert_eq!(record.doi.as_deref(), Some("https://doi.org/10.1000/test"));
        assert_eq!(record.authors_all, "Dr. Smith; Jones A; ; Brown B");
        // Empty tokens vanish; names are lowered and trimmed.
        let expected: BTreeSet<String> =
            ["dr. smith", "jones a", "brown b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(record.authors_set, expected);
        assert_eq!(record.source_row_index, 0);
    }

    #[test]
    fn uncoercible_year_becomes_none_not_an_error() {
        let table = SourceTable::new(
            "outputs_group3",
            strings(&["title", "year"]),
            vec![strings(&["A Paper", "in press"])],
        );
        let records = table.output_records(group()).unwrap();
        assert_eq!(records[0].output_year, None);
    }

    #[test]
    fn short_rows_read_as_absent_values() {
        let table = SourceTable::new(
            "outputs_group3",
            strings(&["title", "year", "doi"]),
            vec![strings(&["A Paper"])],
        );
        let records = table.output_records(group()).unwrap();
        assert_eq!(records[0].output_title.as_deref(), Some("A Paper"));
        assert_eq!(records[0].doi, None);
    }

    #[rstest]
    #[case("10.1000/test", Some("https://doi.org/10.1000/test"))]
    #[case("https://doi.org/10.1000/test", Some("https://doi.org/10.1000/test"))]
    #[case("http://dx.doi.org/10.1000/test", Some("https://doi.org/10.1000/test"))]
    #[case("DOI: 10.1000/TEST", Some("https://doi.org/10.1000/test"))]
    #[case("10.1000/test [doi]", Some("https://doi.org/10.1000/test"))]
    #[case("", None)]
    #[case("not a doi", None)]
    fn doi_normalization(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize_doi(raw).as_deref(), expected);
    }

    #[test]
    fn registry_rows_keep_raw_year_strings() {
        let table = SourceTable::new(
            "registry",
            strings(REGISTRY_COLUMNS),
            vec![strings(&["P001", "Active", "Project A", "Census", "2020.0", "Ongoing", "Dr. Smith"])],
        );
        let rows = table.project_records().unwrap();
        assert_eq!(rows[0].year_started.as_deref(), Some("2020.0"));
        assert_eq!(rows[0].year_ended.as_deref(), Some("Ongoing"));
        assert_eq!(rows[0].year_started_int(), Some(2020));
        assert_eq!(rows[0].year_ended_int(), None);
    }

    #[test]
    fn unverified_claimed_titles_are_cleared() {
        let registry = Registry::new(vec![ProjectRecord {
            proj_id: "P001".into(),
            status: "Active".into(),
            title: "Known Project".into(),
            rdc: "Census".into(),
            year_started: None,
            year_ended: None,
            pi: "Dr. Smith".into(),
        }]);

        let mut verified = OutputRecord::new(group(), 0);
        verified.project_title = Some("known project".into());
        let mut bogus = OutputRecord::new(group(), 1);
        bogus.project_title = Some("Made-Up Project".into());
        let mut attributed = OutputRecord::new(group(), 2);
        attributed.project_id = Some("P001".into());
        attributed.project_title = Some("Made-Up Project".into());

        let mut records = vec![verified, bogus, attributed];
        clear_unverified_project_titles(&mut records, &registry);

        assert_eq!(records[0].project_title.as_deref(), Some("known project"));
        assert_eq!(records[1].project_title, None);
        // A record with a project id keeps its title for tier 0 to resolve.
        assert_eq!(records[2].project_title.as_deref(), Some("Made-Up Project"));
    }
}
