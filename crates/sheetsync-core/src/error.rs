//! Error types for the sheet model, merge engine and codec.

use thiserror::Error;

/// Errors raised while building a [`SheetSchema`](crate::SheetSchema).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The schema has no columns at all.
    #[error("schema must declare at least one column")]
    Empty,

    /// A column name is blank.
    #[error("column {index} has an empty name")]
    BlankName { index: usize },

    /// Two columns share a name.
    #[error("duplicate column name: {name}")]
    DuplicateName { name: String },

    /// The schema has no message text column, so rows cannot be keyed.
    #[error("schema must contain exactly one text column (found {found})")]
    TextColumn { found: usize },

    /// More than one link column.
    #[error("schema may contain at most one link column (found {found})")]
    LinkColumn { found: usize },
}

/// Errors raised while manipulating a [`SheetDocument`](crate::SheetDocument).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// The sheet name is not acceptable to spreadsheet applications.
    #[error("invalid sheet name {name:?}: {reason}")]
    InvalidSheetName { name: String, reason: &'static str },

    /// A sheet with this name already exists (names compare case-insensitively).
    #[error("sheet already exists: {name}")]
    DuplicateSheet { name: String },
}

impl MergeError {
    /// Creates an invalid sheet name error.
    pub fn invalid_sheet_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidSheetName {
            name: name.into(),
            reason,
        }
    }
}

/// Errors raised while reading or writing xlsx bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes are not a readable workbook.
    #[error("failed to read workbook: {0}")]
    Read(#[from] calamine::XlsxError),

    /// The workbook could not be serialized.
    #[error("failed to write workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),

    /// A sheet in the workbook cannot be represented in a document.
    #[error(transparent)]
    Sheet(#[from] MergeError),

    /// A sheet exceeds the format's grid limits.
    #[error("sheet {sheet:?} exceeds the {limit} limit")]
    TooLarge { sheet: String, limit: &'static str },
}
