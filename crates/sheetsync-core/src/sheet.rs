//! In-memory spreadsheet document.
//!
//! [`SheetDocument`] is a snapshot of the remote workbook: an ordered list of
//! named sheets, each a grid of string cells. Row 0 of a sheet is its header.
//! Styling, formulas and cell types are not modelled.

use crate::error::MergeError;

/// Maximum sheet name length accepted by spreadsheet applications.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Characters that may not appear in a sheet name.
const FORBIDDEN_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Checks that a sheet name is acceptable to spreadsheet applications.
pub fn validate_sheet_name(name: &str) -> Result<(), MergeError> {
    if name.trim().is_empty() {
        return Err(MergeError::invalid_sheet_name(name, "name is blank"));
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(MergeError::invalid_sheet_name(
            name,
            "name is longer than 31 characters",
        ));
    }
    if name.contains(FORBIDDEN_SHEET_CHARS) {
        return Err(MergeError::invalid_sheet_name(
            name,
            "name contains one of []:*?/\\",
        ));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(MergeError::invalid_sheet_name(
            name,
            "name starts or ends with an apostrophe",
        ));
    }
    Ok(())
}

/// A named grid of string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    name: String,
    rows: Vec<Vec<String>>,
}

impl Sheet {
    /// Creates an empty sheet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Builder method to set the rows.
    pub fn with_rows(mut self, rows: Vec<Vec<String>>) -> Self {
        self.rows = rows;
        self
    }

    /// Returns the sheet name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all rows, header included.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Returns the first row, if any.
    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Returns every row after the header.
    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or_default()
    }

    /// Returns true if no cell in the sheet has content.
    pub fn is_blank(&self) -> bool {
        self.rows.iter().all(|row| row_is_blank(row))
    }

    /// Appends a row.
    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Removes every row and writes `header` as the only row.
    pub fn reset_with_header(&mut self, header: Vec<String>) {
        self.rows.clear();
        self.rows.push(header);
    }

    fn has_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// Returns true if every cell in the row is empty.
pub fn row_is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// An ordered collection of sheets.
///
/// Sheet names are unique, compared case-insensitively as spreadsheet
/// applications do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetDocument {
    sheets: Vec<Sheet>,
}

impl SheetDocument {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document whose only sheet is an empty placeholder.
    pub fn with_placeholder(name: impl Into<String>) -> Self {
        Self {
            sheets: vec![Sheet::new(name)],
        }
    }

    /// Returns the sheets in workbook order.
    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Returns the sheet names in workbook order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(Sheet::name).collect()
    }

    /// Returns true if the document has no sheets.
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Returns true if a sheet with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s.has_name(name))
    }

    /// Looks up a sheet by name.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.has_name(name))
    }

    /// Looks up a sheet by name, mutably.
    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.has_name(name))
    }

    /// Appends a sheet at the end of the workbook.
    pub fn add_sheet(&mut self, sheet: Sheet) -> Result<&mut Sheet, MergeError> {
        validate_sheet_name(sheet.name())?;
        if self.contains(sheet.name()) {
            return Err(MergeError::DuplicateSheet {
                name: sheet.name().to_string(),
            });
        }
        self.sheets.push(sheet);
        let last = self.sheets.len() - 1;
        Ok(&mut self.sheets[last])
    }

    /// Removes a sheet by name, returning it.
    pub fn remove_sheet(&mut self, name: &str) -> Option<Sheet> {
        let index = self.sheets.iter().position(|s| s.has_name(name))?;
        Some(self.sheets.remove(index))
    }
}
