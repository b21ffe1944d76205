//! Incremental, idempotent merge of records into a sheet document.
//!
//! # Algorithm
//!
//! 1. Order candidates chronologically (stable, so equal timestamps keep
//!    source order) and group them by target sub-sheet.
//! 2. Make sure each target sheet exists and starts with the declared header.
//!    A mismatched header is rebuilt destructively, optionally archiving the
//!    old rows to a sibling sheet first (see [`HeaderPolicy`]).
//! 3. Index the dedup keys of the sheet's existing data rows.
//! 4. Render each candidate, key the rendered row and append it only if the
//!    key is new. Appended keys join the index, so duplicates inside one batch
//!    collapse too.
//! 5. Drop empty placeholder sheets left over from document creation.
//!
//! Running the same batch twice appends nothing the second time.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dedup::DedupKey;
use crate::error::MergeError;
use crate::record::Record;
use crate::schema::SheetLayout;
use crate::sheet::{MAX_SHEET_NAME_LEN, Sheet, SheetDocument, row_is_blank};

/// Placeholder sheet names removed once they are empty.
pub const DEFAULT_PLACEHOLDER_SHEETS: [&str; 2] = ["TMP", "Sheet"];

/// What to do when an existing sheet's header differs from the schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// Clear the sheet and write the declared header. Existing rows are lost.
    #[default]
    Rebuild,
    /// Copy the sheet to `{name}~{n}` first, then rebuild.
    Archive,
}

/// Counts and structural changes produced by a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Rows appended.
    pub appended: usize,
    /// Candidates skipped as duplicates.
    pub skipped: usize,
    /// Sheets created.
    pub created_sheets: Vec<String>,
    /// Sheets whose header was (re)written.
    pub rebuilt_sheets: Vec<String>,
    /// Archive sheets written before a rebuild.
    pub archived_sheets: Vec<String>,
    /// Placeholder sheets removed.
    pub removed_placeholders: Vec<String>,
}

impl MergeReport {
    /// Returns true if the merge left the document unchanged.
    pub fn is_noop(&self) -> bool {
        self.appended == 0
            && self.created_sheets.is_empty()
            && self.rebuilt_sheets.is_empty()
            && self.archived_sheets.is_empty()
            && self.removed_placeholders.is_empty()
    }
}

/// The merged document together with its report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The updated document.
    pub document: SheetDocument,
    /// What changed.
    pub report: MergeReport,
}

impl MergeOutcome {
    /// Rows appended.
    pub fn appended_count(&self) -> usize {
        self.report.appended
    }

    /// Candidates skipped as duplicates.
    pub fn skipped_count(&self) -> usize {
        self.report.skipped
    }
}

/// Computes the deduplicated delta between a document and new records.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    layout: SheetLayout,
    header_policy: HeaderPolicy,
    placeholder_sheets: Vec<String>,
}

impl MergeEngine {
    /// Creates an engine for the given layout.
    pub fn new(layout: SheetLayout) -> Self {
        Self {
            layout,
            header_policy: HeaderPolicy::default(),
            placeholder_sheets: DEFAULT_PLACEHOLDER_SHEETS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Builder method to set the header mismatch policy.
    pub fn with_header_policy(mut self, policy: HeaderPolicy) -> Self {
        self.header_policy = policy;
        self
    }

    /// Builder method to set which sheet names count as placeholders.
    pub fn with_placeholder_sheets(mut self, names: Vec<String>) -> Self {
        self.placeholder_sheets = names;
        self
    }

    /// Returns the layout.
    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    /// Merges `candidates` into `existing`.
    ///
    /// Candidates may be in any order; rows are appended oldest first.
    pub fn merge(
        &self,
        existing: SheetDocument,
        candidates: &[Record],
    ) -> Result<MergeOutcome, MergeError> {
        let mut document = existing;
        let mut report = MergeReport::default();

        for (name, records) in self.partition(candidates) {
            self.prepare_sheet(&mut document, &name, &mut report)?;
            let sheet = document
                .sheet_mut(&name)
                .ok_or_else(|| MergeError::invalid_sheet_name(&name, "sheet vanished"))?;
            let (appended, skipped) = self.append_new(sheet, &records);
            debug!(sheet = %name, appended, skipped, "merged sheet");
            report.appended += appended;
            report.skipped += skipped;
        }

        self.remove_placeholders(&mut document, &mut report);

        info!(
            appended = report.appended,
            skipped = report.skipped,
            created = report.created_sheets.len(),
            rebuilt = report.rebuilt_sheets.len(),
            "merge complete"
        );
        Ok(MergeOutcome { document, report })
    }

    /// Sorts candidates oldest first and groups them by sheet name.
    ///
    /// Groups are returned in order of their first record.
    fn partition<'r>(&self, candidates: &'r [Record]) -> Vec<(String, Vec<&'r Record>)> {
        let mut ordered: Vec<&Record> = candidates.iter().collect();
        ordered.sort_by_key(|r| r.timestamp);

        let mut groups: Vec<(String, Vec<&Record>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for record in ordered {
            let name = self.layout.sheet_name_for(record);
            match index.get(&name.to_lowercase()) {
                Some(&i) => groups[i].1.push(record),
                None => {
                    index.insert(name.to_lowercase(), groups.len());
                    groups.push((name, vec![record]));
                }
            }
        }
        groups
    }

    /// Ensures the sheet exists and its first row is the declared header.
    fn prepare_sheet(
        &self,
        document: &mut SheetDocument,
        name: &str,
        report: &mut MergeReport,
    ) -> Result<(), MergeError> {
        let target = self.layout.target(name);
        let header = target.schema.header();

        let Some(sheet) = document.sheet(name) else {
            let mut sheet = Sheet::new(name);
            sheet.reset_with_header(header);
            document.add_sheet(sheet)?;
            info!(sheet = %name, "created sheet");
            report.created_sheets.push(name.to_string());
            return Ok(());
        };

        if sheet
            .header()
            .is_some_and(|row| target.schema.matches_header(row))
        {
            return Ok(());
        }

        if !sheet.is_blank() && self.header_policy == HeaderPolicy::Archive {
            let archive_name = archive_name(document, sheet.name());
            let archive = Sheet::new(&archive_name).with_rows(sheet.rows().to_vec());
            document.add_sheet(archive)?;
            warn!(sheet = %name, archive = %archive_name, "archived sheet with mismatched header");
            report.archived_sheets.push(archive_name);
        } else if !sheet.is_blank() {
            warn!(
                sheet = %name,
                rows = sheet.rows().len(),
                "header does not match schema, clearing sheet"
            );
        }

        if let Some(sheet) = document.sheet_mut(name) {
            sheet.reset_with_header(header);
        }
        report.rebuilt_sheets.push(name.to_string());
        Ok(())
    }

    /// Appends rows whose key is not yet present. Returns (appended, skipped).
    fn append_new(&self, sheet: &mut Sheet, records: &[&Record]) -> (usize, usize) {
        let schema = &self.layout.schema;
        let mut index: HashSet<DedupKey> = sheet
            .data_rows()
            .iter()
            .filter(|row| !row_is_blank(row))
            .map(|row| schema.dedup_key(row))
            .collect();

        let mut appended = 0;
        let mut skipped = 0;
        for record in records {
            let row = self.layout.render(record);
            if index.insert(schema.dedup_key(&row)) {
                sheet.push_row(row);
                appended += 1;
            } else {
                skipped += 1;
            }
        }
        (appended, skipped)
    }

    /// Removes blank placeholder sheets, never the last sheet.
    fn remove_placeholders(&self, document: &mut SheetDocument, report: &mut MergeReport) {
        for name in &self.placeholder_sheets {
            let removable = document.sheet(name).is_some_and(Sheet::is_blank);
            if removable && document.sheets().len() > 1 {
                if let Some(sheet) = document.remove_sheet(name) {
                    debug!(sheet = %sheet.name(), "removed placeholder sheet");
                    report.removed_placeholders.push(sheet.name().to_string());
                }
            }
        }
    }
}

/// Picks the first free `{base}~{n}` name, shortening `base` to fit.
fn archive_name(document: &SheetDocument, base: &str) -> String {
    (1..)
        .map(|n| {
            let suffix = format!("~{}", n);
            let room = MAX_SHEET_NAME_LEN - suffix.chars().count();
            let stem: String = base.chars().take(room).collect();
            format!("{}{}", stem, suffix)
        })
        .find(|candidate| !document.contains(candidate))
        .unwrap_or_else(|| unreachable!("sheet names are finite"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Origin;
    use crate::schema::{Partition, SheetSchema};
    use chrono::{DateTime, TimeZone, Utc};
    use url::Url;

    fn ts(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, h, 0, 0).unwrap()
    }

    fn msg(at: DateTime<Utc>, text: &str) -> Record {
        Record::new(at, Origin::External, text)
    }

    fn linked(at: DateTime<Utc>, text: &str, link: &str) -> Record {
        msg(at, text).with_source_ref(Url::parse(link).unwrap())
    }

    fn engine() -> MergeEngine {
        MergeEngine::new(SheetLayout::default())
    }

    fn header() -> Vec<String> {
        SheetSchema::default().header()
    }

    fn texts(doc: &SheetDocument, sheet: &str) -> Vec<String> {
        doc.sheet(sheet)
            .unwrap()
            .data_rows()
            .iter()
            .map(|r| r[2].clone())
            .collect()
    }

    #[test]
    fn merge_is_idempotent() {
        let records = vec![msg(ts(1, 9), "a"), msg(ts(2, 9), "b"), msg(ts(3, 9), "c")];

        let first = engine().merge(SheetDocument::new(), &records).unwrap();
        assert_eq!(first.appended_count(), 3);
        assert_eq!(first.skipped_count(), 0);

        let second = engine().merge(first.document.clone(), &records).unwrap();
        assert_eq!(second.appended_count(), 0);
        assert_eq!(second.skipped_count(), 3);
        assert!(second.report.is_noop());
        assert_eq!(second.document, first.document);
    }

    #[test]
    fn rows_follow_chronological_order() {
        // Source order is newest first.
        let records = vec![msg(ts(3, 9), "t3"), msg(ts(1, 9), "t1"), msg(ts(2, 9), "t2")];
        let out = engine().merge(SheetDocument::new(), &records).unwrap();
        assert_eq!(texts(&out.document, "2025-03"), vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn order_is_kept_across_runs() {
        let first = engine()
            .merge(SheetDocument::new(), &[msg(ts(1, 9), "t1")])
            .unwrap();
        let second = engine()
            .merge(first.document, &[msg(ts(2, 9), "t2"), msg(ts(1, 9), "t1")])
            .unwrap();
        assert_eq!(texts(&second.document, "2025-03"), vec!["t1", "t2"]);
        assert_eq!(second.appended_count(), 1);
        assert_eq!(second.skipped_count(), 1);
    }

    #[test]
    fn same_reference_different_text_is_one_row() {
        let link = "https://acme.slack.com/archives/C1/p100";
        let records = vec![
            linked(ts(1, 9), "original", link),
            linked(ts(1, 10), "edited", link),
        ];
        let out = engine().merge(SheetDocument::new(), &records).unwrap();
        assert_eq!(out.appended_count(), 1);
        assert_eq!(out.skipped_count(), 1);
        assert_eq!(texts(&out.document, "2025-03"), vec!["original"]);
    }

    #[test]
    fn same_text_without_reference_is_one_row() {
        let records = vec![msg(ts(1, 9), "server down"), msg(ts(1, 10), " server   down ")];
        let out = engine().merge(SheetDocument::new(), &records).unwrap();
        assert_eq!(out.appended_count(), 1);
        assert_eq!(out.skipped_count(), 1);
    }

    #[test]
    fn same_text_with_distinct_references_are_kept() {
        let records = vec![
            linked(ts(1, 9), "+1", "https://acme.slack.com/archives/C1/p1"),
            linked(ts(1, 10), "+1", "https://acme.slack.com/archives/C1/p2"),
        ];
        let out = engine().merge(SheetDocument::new(), &records).unwrap();
        assert_eq!(out.appended_count(), 2);
    }

    #[test]
    fn existing_rows_are_deduplicated() {
        let mut doc = SheetDocument::new();
        doc.add_sheet(Sheet::new("2025-03").with_rows(vec![
            header(),
            vec![
                "2025-03-01 09:00:00".into(),
                "External".into(),
                "already\nthere".into(),
                String::new(),
            ],
        ]))
        .unwrap();

        let out = engine()
            .merge(doc, &[msg(ts(2, 9), "already there"), msg(ts(2, 10), "new")])
            .unwrap();
        assert_eq!(out.appended_count(), 1);
        assert_eq!(texts(&out.document, "2025-03"), vec!["already\nthere", "new"]);
    }

    #[test]
    fn records_are_split_by_month() {
        let april = Utc.with_ymd_and_hms(2025, 4, 2, 9, 0, 0).unwrap();
        let records = vec![msg(april, "april"), msg(ts(31, 9), "march")];
        let out = engine().merge(SheetDocument::new(), &records).unwrap();

        assert_eq!(out.document.sheet_names(), vec!["2025-03", "2025-04"]);
        assert_eq!(out.report.created_sheets, vec!["2025-03", "2025-04"]);
        assert_eq!(texts(&out.document, "2025-04"), vec!["april"]);
    }

    #[test]
    fn single_partition_uses_one_sheet() {
        let layout = SheetLayout {
            partition: Partition::Single("Datos".to_string()),
            ..SheetLayout::default()
        };
        let april = Utc.with_ymd_and_hms(2025, 4, 2, 9, 0, 0).unwrap();
        let out = MergeEngine::new(layout)
            .merge(
                SheetDocument::new(),
                &[msg(ts(1, 9), "a"), msg(april, "b")],
            )
            .unwrap();
        assert_eq!(out.document.sheet_names(), vec!["Datos"]);
        assert_eq!(texts(&out.document, "Datos"), vec!["a", "b"]);
    }

    #[test]
    fn mismatched_header_is_rebuilt() {
        let mut doc = SheetDocument::new();
        doc.add_sheet(Sheet::new("2025-03").with_rows(vec![
            vec!["Fecha".into(), "Origen".into()],
            vec!["x".into(), "y".into()],
        ]))
        .unwrap();

        let out = engine().merge(doc, &[]).unwrap();
        // No candidates for the sheet: it is untouched.
        assert!(out.report.rebuilt_sheets.is_empty());

        let out = engine().merge(out.document, &[msg(ts(1, 9), "a")]).unwrap();
        let sheet = out.document.sheet("2025-03").unwrap();
        assert_eq!(sheet.header(), Some(&header()[..]));
        assert_eq!(texts(&out.document, "2025-03"), vec!["a"]);
        assert_eq!(out.report.rebuilt_sheets, vec!["2025-03"]);
    }

    #[test]
    fn mismatched_header_alone_leaves_header_only() {
        let mut doc = SheetDocument::new();
        doc.add_sheet(Sheet::new("2025-03").with_rows(vec![
            vec!["Timestamp".into(), "Origin".into()],
            vec!["old".into()],
        ]))
        .unwrap();

        // The only candidate duplicates nothing, so the sheet ends up with
        // exactly the header plus the new row; the old data row is gone.
        let out = engine().merge(doc, &[msg(ts(1, 9), "old")]).unwrap();
        let sheet = out.document.sheet("2025-03").unwrap();
        assert_eq!(sheet.rows().len(), 2);
        assert_eq!(sheet.header(), Some(&header()[..]));
    }

    #[test]
    fn archive_policy_preserves_old_rows() {
        let old_rows = vec![
            vec!["Fecha".to_string(), "SLACK".to_string()],
            vec!["2025-03-01".to_string(), "legacy".to_string()],
        ];
        let mut doc = SheetDocument::new();
        doc.add_sheet(Sheet::new("2025-03").with_rows(old_rows.clone()))
            .unwrap();
        doc.add_sheet(Sheet::new("2025-03~1")).unwrap();

        let out = engine()
            .with_header_policy(HeaderPolicy::Archive)
            .merge(doc, &[msg(ts(1, 9), "a")])
            .unwrap();

        assert_eq!(out.report.archived_sheets, vec!["2025-03~2"]);
        assert_eq!(out.document.sheet("2025-03~2").unwrap().rows(), &old_rows[..]);
        assert_eq!(texts(&out.document, "2025-03"), vec!["a"]);
    }

    #[test]
    fn empty_existing_sheet_gets_header() {
        let mut doc = SheetDocument::new();
        doc.add_sheet(Sheet::new("2025-03")).unwrap();
        let out = engine().merge(doc, &[msg(ts(1, 9), "a")]).unwrap();
        let sheet = out.document.sheet("2025-03").unwrap();
        assert_eq!(sheet.header(), Some(&header()[..]));
        assert!(out.report.archived_sheets.is_empty());
    }

    #[test]
    fn blank_placeholder_is_removed() {
        let doc = SheetDocument::with_placeholder("TMP");
        let out = engine().merge(doc, &[msg(ts(1, 9), "a")]).unwrap();
        assert_eq!(out.document.sheet_names(), vec!["2025-03"]);
        assert_eq!(out.report.removed_placeholders, vec!["TMP"]);
    }

    #[test]
    fn report_for_first_run_into_new_workbook() {
        let doc = SheetDocument::with_placeholder("TMP");
        let records = vec![msg(ts(1, 9), "a"), msg(ts(1, 10), "a"), msg(ts(2, 9), "b")];
        let out = engine().merge(doc, &records).unwrap();

        insta::assert_json_snapshot!(out.report, @r#"
        {
          "appended": 2,
          "skipped": 1,
          "created_sheets": [
            "2025-03"
          ],
          "rebuilt_sheets": [],
          "archived_sheets": [],
          "removed_placeholders": [
            "TMP"
          ]
        }
        "#);
    }

    #[test]
    fn placeholder_with_content_or_alone_is_kept() {
        let mut doc = SheetDocument::new();
        doc.add_sheet(Sheet::new("Sheet").with_rows(vec![vec!["notes".into()]]))
            .unwrap();
        let out = engine().merge(doc, &[msg(ts(1, 9), "a")]).unwrap();
        assert!(out.document.contains("Sheet"));

        // Nothing to merge: the placeholder is the only sheet and stays.
        let out = engine()
            .merge(SheetDocument::with_placeholder("TMP"), &[])
            .unwrap();
        assert_eq!(out.document.sheet_names(), vec!["TMP"]);
        assert!(out.report.is_noop());
    }

    #[test]
    fn archive_name_is_shortened_to_fit() {
        let doc = SheetDocument::new();
        let long = "x".repeat(31);
        let name = archive_name(&doc, &long);
        assert_eq!(name.chars().count(), 31);
        assert!(name.ends_with("~1"));
    }
}
