//! Core types: records, sheet documents, schemas, dedup and merge, xlsx codec

pub mod dedup;
pub mod error;
pub mod merge;
pub mod record;
pub mod redact;
pub mod schema;
pub mod sheet;
pub mod tracing;
pub mod window;
pub mod xlsx;

pub use dedup::{DedupKey, normalize_text};
pub use error::{CodecError, MergeError, SchemaError};
pub use merge::{
    DEFAULT_PLACEHOLDER_SHEETS, HeaderPolicy, MergeEngine, MergeOutcome, MergeReport,
};
pub use record::{Origin, Record};
pub use redact::{Redacted, redact};
pub use schema::{
    Column, ColumnSource, MAX_CELL_CHARS, Partition, RenderOptions,
    SheetLayout, SheetSchema, SheetTarget, SheetZone,
};
pub use sheet::{MAX_SHEET_NAME_LEN, Sheet, SheetDocument, validate_sheet_name};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use window::{FetchWindow, InvalidWindow};
pub use xlsx::{PLACEHOLDER_SHEET, XLSX_CONTENT_TYPE, decode_xlsx, encode_xlsx, placeholder_document};
