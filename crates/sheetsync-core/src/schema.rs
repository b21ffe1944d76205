//! Sheet layout: column schema, row rendering and sub-sheet partitioning.

use std::collections::HashSet;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dedup::DedupKey;
use crate::error::SchemaError;
use crate::record::{Origin, Record};

/// Longest string a spreadsheet cell may hold.
pub const MAX_CELL_CHARS: usize = 32_767;

/// What a column is filled with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSource {
    /// The record timestamp, rendered in the layout's zone and format.
    Timestamp,
    /// The origin label.
    Origin,
    /// The message text.
    Text,
    /// The reference link, or empty.
    Link,
    /// A named extra field, or empty.
    Extra(String),
}

/// A declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Header text.
    pub name: String,
    /// Cell contents.
    pub source: ColumnSource,
}

impl Column {
    /// Creates a column.
    pub fn new(name: impl Into<String>, source: ColumnSource) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

/// The fixed, ordered column schema shared by every sub-sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSchema {
    columns: Vec<Column>,
    text_index: usize,
    link_index: Option<usize>,
}

impl SheetSchema {
    /// Builds a schema, checking that rows can be keyed.
    ///
    /// A schema needs exactly one [`ColumnSource::Text`] column and at most one
    /// [`ColumnSource::Link`] column. Without a link column rows are keyed by
    /// text alone.
    pub fn new(columns: Vec<Column>) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut seen = HashSet::new();
        for (index, column) in columns.iter().enumerate() {
            let name = column.name.trim();
            if name.is_empty() {
                return Err(SchemaError::BlankName { index });
            }
            if !seen.insert(name.to_string()) {
                return Err(SchemaError::DuplicateName {
                    name: name.to_string(),
                });
            }
        }

        let positions = |source: &ColumnSource| -> Vec<usize> {
            columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.source == *source)
                .map(|(i, _)| i)
                .collect()
        };

        let text = positions(&ColumnSource::Text);
        if text.len() != 1 {
            return Err(SchemaError::TextColumn { found: text.len() });
        }
        let link = positions(&ColumnSource::Link);
        if link.len() > 1 {
            return Err(SchemaError::LinkColumn { found: link.len() });
        }

        Ok(Self {
            text_index: text[0],
            link_index: link.first().copied(),
            columns,
        })
    }

    /// The default columns: timestamp, origin, message and link.
    pub fn default_columns() -> Vec<Column> {
        vec![
            Column::new("Timestamp", ColumnSource::Timestamp),
            Column::new("Origin", ColumnSource::Origin),
            Column::new("Message", ColumnSource::Text),
            Column::new("Link", ColumnSource::Link),
        ]
    }

    /// Returns the declared columns.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns true if rows carry a reference link to key on.
    pub fn has_link_column(&self) -> bool {
        self.link_index.is_some()
    }

    /// Returns the header row.
    pub fn header(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Returns true if `row` is exactly the declared header.
    ///
    /// Surrounding whitespace and trailing empty cells are ignored.
    pub fn matches_header(&self, row: &[String]) -> bool {
        let trimmed_len = row
            .iter()
            .rposition(|cell| !cell.trim().is_empty())
            .map_or(0, |i| i + 1);
        trimmed_len == self.columns.len()
            && row
                .iter()
                .zip(&self.columns)
                .all(|(cell, column)| cell.trim() == column.name.trim())
    }

    /// Computes the dedup key of a row.
    ///
    /// Used for existing rows and for freshly rendered candidate rows alike.
    pub fn dedup_key(&self, row: &[String]) -> DedupKey {
        let cell = |i: usize| row.get(i).map(String::as_str);
        DedupKey::from_cells(
            self.link_index.and_then(cell),
            cell(self.text_index).unwrap_or_default(),
        )
    }

    /// Renders a record as a row in schema order.
    pub fn render(&self, record: &Record, options: &RenderOptions) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| {
                let value = match &column.source {
                    ColumnSource::Timestamp => options.format_timestamp(record.timestamp),
                    ColumnSource::Origin => options.origin_label(record.origin).to_string(),
                    ColumnSource::Text => record.source_text.clone(),
                    ColumnSource::Link => record
                        .source_ref
                        .as_ref()
                        .map(|u| u.as_str().to_string())
                        .unwrap_or_default(),
                    ColumnSource::Extra(name) => {
                        record.extra_field(name).unwrap_or_default().to_string()
                    }
                };
                truncate_cell(value)
            })
            .collect()
    }
}

impl Default for SheetSchema {
    fn default() -> Self {
        Self {
            columns: Self::default_columns(),
            text_index: 2,
            link_index: Some(3),
        }
    }
}

/// Cuts a value down to the cell size limit, on a character boundary.
fn truncate_cell(value: String) -> String {
    match value.char_indices().nth(MAX_CELL_CHARS) {
        Some((byte_index, _)) => value[..byte_index].to_string(),
        None => value,
    }
}

/// How record values are turned into cell text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Zone timestamps are shown in, and months are cut in.
    pub zone: SheetZone,
    /// `chrono` format string for the timestamp column.
    pub timestamp_format: String,
    /// Label for [`Origin::Internal`].
    pub internal_label: String,
    /// Label for [`Origin::External`].
    pub external_label: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            zone: SheetZone::default(),
            timestamp_format: Self::DEFAULT_TIMESTAMP_FORMAT.to_string(),
            internal_label: "Internal".to_string(),
            external_label: "External".to_string(),
        }
    }
}

impl RenderOptions {
    /// Default timestamp format.
    pub const DEFAULT_TIMESTAMP_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";

    /// Returns true if `format` is a well-formed `chrono` format string.
    ///
    /// Formatting with a malformed string panics, so configuration must be
    /// checked with this before it reaches [`Self::format_timestamp`].
    pub fn is_valid_timestamp_format(format: &str) -> bool {
        !format.is_empty() && StrftimeItems::new(format).all(|item| !matches!(item, Item::Error))
    }

    /// Formats a timestamp in the configured zone.
    pub fn format_timestamp(&self, ts: DateTime<Utc>) -> String {
        self.zone.format(ts, &self.timestamp_format)
    }

    /// Returns the label for an origin.
    pub fn origin_label(&self, origin: Origin) -> &str {
        match origin {
            Origin::Internal => &self.internal_label,
            Origin::External => &self.external_label,
        }
    }
}

/// Where local wall-clock time is taken from.
///
/// A named zone follows its daylight-saving rules, so the same instant can
/// land in a different hour (and month) than under the zone's standard offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetZone {
    /// A constant offset from UTC.
    Fixed(FixedOffset),
    /// An IANA zone such as `America/Santiago`.
    Named(Tz),
}

impl Default for SheetZone {
    fn default() -> Self {
        Self::Fixed(Utc.fix())
    }
}

impl SheetZone {
    /// Looks up an IANA zone name.
    pub fn named(name: &str) -> Option<Self> {
        name.parse::<Tz>().ok().map(Self::Named)
    }

    /// Formats `ts` as local time in this zone.
    pub fn format(&self, ts: DateTime<Utc>, format: &str) -> String {
        match self {
            Self::Fixed(offset) => ts.with_timezone(offset).format(format).to_string(),
            Self::Named(tz) => ts.with_timezone(tz).format(format).to_string(),
        }
    }
}

/// How records are split into sub-sheets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// One sheet per calendar month, named `YYYY-MM`.
    #[default]
    Monthly,
    /// Everything goes into one named sheet.
    Single(String),
}

impl Partition {
    /// Returns the sheet name a timestamp belongs to.
    pub fn sheet_name(&self, ts: DateTime<Utc>, zone: &SheetZone) -> String {
        match self {
            Self::Monthly => zone.format(ts, "%Y-%m"),
            Self::Single(name) => name.clone(),
        }
    }
}

/// The sub-sheet a record is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetTarget<'a> {
    /// Sheet name.
    pub name: &'a str,
    /// Column schema of the sheet.
    pub schema: &'a SheetSchema,
}

/// Everything needed to turn records into rows of a given sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetLayout {
    /// Column schema shared by all sub-sheets.
    pub schema: SheetSchema,
    /// Sub-sheet selection.
    pub partition: Partition,
    /// Cell rendering.
    pub render: RenderOptions,
}

impl SheetLayout {
    /// Creates a layout.
    pub fn new(schema: SheetSchema, partition: Partition, render: RenderOptions) -> Self {
        Self {
            schema,
            partition,
            render,
        }
    }

    /// Returns the sheet name for a record.
    pub fn sheet_name_for(&self, record: &Record) -> String {
        self.partition.sheet_name(record.timestamp, &self.render.zone)
    }

    /// Returns the target for a sheet name under this layout.
    pub fn target<'a>(&'a self, name: &'a str) -> SheetTarget<'a> {
        SheetTarget {
            name,
            schema: &self.schema,
        }
    }

    /// Renders a record as a row.
    pub fn render(&self, record: &Record) -> Vec<String> {
        self.schema.render(record, &self.render)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use url::Url;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn default_schema_matches_new() {
        let built = SheetSchema::new(SheetSchema::default_columns()).unwrap();
        assert_eq!(built, SheetSchema::default());
    }

    #[test]
    fn schema_validation() {
        assert_eq!(SheetSchema::new(vec![]), Err(SchemaError::Empty));

        let no_text = vec![Column::new("When", ColumnSource::Timestamp)];
        assert_eq!(
            SheetSchema::new(no_text),
            Err(SchemaError::TextColumn { found: 0 })
        );

        let dup = vec![
            Column::new("A", ColumnSource::Text),
            Column::new("A", ColumnSource::Link),
        ];
        assert_eq!(
            SheetSchema::new(dup),
            Err(SchemaError::DuplicateName {
                name: "A".to_string()
            })
        );

        let two_links = vec![
            Column::new("T", ColumnSource::Text),
            Column::new("L1", ColumnSource::Link),
            Column::new("L2", ColumnSource::Link),
        ];
        assert_eq!(
            SheetSchema::new(two_links),
            Err(SchemaError::LinkColumn { found: 2 })
        );

        let blank = vec![Column::new(" ", ColumnSource::Text)];
        assert_eq!(
            SheetSchema::new(blank),
            Err(SchemaError::BlankName { index: 0 })
        );
    }

    #[test]
    fn header_matching() {
        let schema = SheetSchema::default();
        assert!(schema.matches_header(&row(&["Timestamp", "Origin", "Message", "Link"])));
        assert!(schema.matches_header(&row(&[" Timestamp", "Origin", "Message", "Link", ""])));
        assert!(!schema.matches_header(&row(&["Timestamp", "Origin", "Message"])));
        assert!(!schema.matches_header(&row(&["Timestamp", "Origin", "Link", "Message"])));
        assert!(!schema.matches_header(&row(&[])));
    }

    #[test]
    fn render_row() {
        let layout = SheetLayout {
            render: RenderOptions {
                zone: SheetZone::Fixed(FixedOffset::west_opt(3 * 3600).unwrap()),
                internal_label: "Producto".to_string(),
                external_label: "Otras áreas".to_string(),
                ..RenderOptions::default()
            },
            ..SheetLayout::default()
        };
        let record = Record::new(ts(2025, 3, 1, 2), Origin::Internal, "hola")
            .with_source_ref(Url::parse("https://acme.slack.com/archives/C1/p1").unwrap());

        assert_eq!(
            layout.render(&record),
            row(&[
                "2025-02-28 23:00:00",
                "Producto",
                "hola",
                "https://acme.slack.com/archives/C1/p1"
            ])
        );
    }

    #[test]
    fn timestamp_format_validation() {
        assert!(RenderOptions::is_valid_timestamp_format("%Y-%m-%d %H:%M:%S"));
        assert!(RenderOptions::is_valid_timestamp_format("%d/%m/%Y"));
        assert!(!RenderOptions::is_valid_timestamp_format("%Q"));
        assert!(!RenderOptions::is_valid_timestamp_format(""));
    }

    #[test]
    fn render_extra_fields_and_missing_values() {
        let schema = SheetSchema::new(vec![
            Column::new("Text", ColumnSource::Text),
            Column::new("User", ColumnSource::Extra("user".to_string())),
            Column::new("Thread", ColumnSource::Extra("thread".to_string())),
        ])
        .unwrap();
        let record =
            Record::new(ts(2025, 3, 1, 2), Origin::External, "x").with_extra_field("user", "U1");

        assert_eq!(
            schema.render(&record, &RenderOptions::default()),
            row(&["x", "U1", ""])
        );
    }

    #[test]
    fn render_truncates_oversized_text() {
        let schema = SheetSchema::default();
        let record = Record::new(ts(2025, 3, 1, 2), Origin::External, "é".repeat(40_000));
        let rendered = schema.render(&record, &RenderOptions::default());
        assert_eq!(rendered[2].chars().count(), MAX_CELL_CHARS);
    }

    #[test]
    fn dedup_key_uses_schema_positions() {
        let schema = SheetSchema::default();
        assert_eq!(
            schema.dedup_key(&row(&["t", "o", "text", "https://x/p1"])),
            DedupKey::Ref("https://x/p1".to_string())
        );
        assert_eq!(
            schema.dedup_key(&row(&["t", "o", " some  text "])),
            DedupKey::Text("some text".to_string())
        );
        assert_eq!(schema.dedup_key(&row(&[])), DedupKey::Text(String::new()));
    }

    #[test]
    fn dedup_key_without_link_column_ignores_links() {
        let schema = SheetSchema::new(vec![Column::new("Text", ColumnSource::Text)]).unwrap();
        assert_eq!(
            schema.dedup_key(&row(&["hello"])),
            DedupKey::Text("hello".to_string())
        );
        assert!(!schema.has_link_column());
        assert!(SheetSchema::default().has_link_column());
    }

    #[test]
    fn monthly_partition_uses_offset() {
        let offset = SheetZone::Fixed(FixedOffset::west_opt(3 * 3600).unwrap());
        // 02:00 UTC on March 1st is still February at UTC-3.
        assert_eq!(
            Partition::Monthly.sheet_name(ts(2025, 3, 1, 2), &offset),
            "2025-02"
        );
        assert_eq!(
            Partition::Monthly.sheet_name(ts(2025, 3, 1, 4), &offset),
            "2025-03"
        );
        assert_eq!(
            Partition::Single("Datos".to_string()).sheet_name(ts(2025, 3, 1, 4), &offset),
            "Datos"
        );
    }

    #[test]
    fn named_zone_follows_daylight_saving() {
        let santiago = SheetZone::named("America/Santiago").unwrap();
        let summer = Utc.with_ymd_and_hms(2025, 2, 1, 3, 30, 0).unwrap();
        let winter = Utc.with_ymd_and_hms(2025, 7, 15, 12, 0, 0).unwrap();

        // UTC-3 in the southern summer, UTC-4 in winter.
        assert_eq!(santiago.format(summer, "%Y-%m-%d %H:%M"), "2025-02-01 00:30");
        assert_eq!(santiago.format(winter, "%Y-%m-%d %H:%M"), "2025-07-15 08:00");
        assert_eq!(Partition::Monthly.sheet_name(summer, &santiago), "2025-02");

        let standard = SheetZone::Fixed(FixedOffset::west_opt(4 * 3600).unwrap());
        assert_eq!(Partition::Monthly.sheet_name(summer, &standard), "2025-01");
    }

    #[test]
    fn unknown_zone_name() {
        assert_eq!(SheetZone::named("Mars/Olympus_Mons"), None);
        assert_eq!(SheetZone::named(""), None);
    }

    #[test]
    fn column_source_deserializes_from_toml_shapes() {
        let unit: ColumnSource = serde_json::from_str("\"timestamp\"").unwrap();
        assert_eq!(unit, ColumnSource::Timestamp);
        let extra: ColumnSource = serde_json::from_str(r#"{"extra":"user"}"#).unwrap();
        assert_eq!(extra, ColumnSource::Extra("user".to_string()));
    }
}
