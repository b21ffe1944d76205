//! Workbook bytes to and from [`SheetDocument`].
//!
//! Reading goes through `calamine`, writing through `rust_xlsxwriter`. Only
//! cell text survives a round trip; numbers read from a workbook are turned
//! into their textual form.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use tracing::debug;

use crate::error::CodecError;
use crate::sheet::{Sheet, SheetDocument};

/// MIME type of an xlsx workbook.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Name of the sheet written into a freshly created workbook.
pub const PLACEHOLDER_SHEET: &str = "TMP";

const MAX_ROWS: usize = 1_048_576;
const MAX_COLS: usize = 16_384;

/// Decodes workbook bytes.
///
/// Zero bytes decode to an empty document: a newly created remote file may
/// exist before anything was written into it.
pub fn decode_xlsx(bytes: &[u8]) -> Result<SheetDocument, CodecError> {
    if bytes.is_empty() {
        debug!("empty workbook bytes, starting from an empty document");
        return Ok(SheetDocument::new());
    }

    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    let mut document = SheetDocument::new();

    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        // used_cells() yields coordinates relative to range.start()
        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));

        let mut rows: Vec<Vec<String>> = Vec::new();
        for (row, col, value) in range.used_cells() {
            let text = cell_text(value);
            if text.is_empty() {
                continue;
            }
            let row = row + row_offset as usize;
            let col = col + col_offset as usize;
            if rows.len() <= row {
                rows.resize_with(row + 1, Vec::new);
            }
            let cells = &mut rows[row];
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = text;
        }

        debug!(sheet = %name, rows = rows.len(), "decoded sheet");
        document.add_sheet(Sheet::new(name).with_rows(rows))?;
    }

    Ok(document)
}

/// Encodes a document as workbook bytes.
///
/// A workbook must contain at least one sheet, so an empty document is
/// written with a single blank placeholder sheet.
pub fn encode_xlsx(document: &SheetDocument) -> Result<Vec<u8>, CodecError> {
    let mut workbook = Workbook::new();

    if document.is_empty() {
        workbook.add_worksheet().set_name(PLACEHOLDER_SHEET)?;
    }

    for sheet in document.sheets() {
        if sheet.rows().len() > MAX_ROWS {
            return Err(CodecError::TooLarge {
                sheet: sheet.name().to_string(),
                limit: "row",
            });
        }
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name())?;

        for (r, row) in sheet.rows().iter().enumerate() {
            if row.len() > MAX_COLS {
                return Err(CodecError::TooLarge {
                    sheet: sheet.name().to_string(),
                    limit: "column",
                });
            }
            for (c, cell) in row.iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                let (Ok(r), Ok(c)) = (u32::try_from(r), u16::try_from(c)) else {
                    return Err(CodecError::TooLarge {
                        sheet: sheet.name().to_string(),
                        limit: "cell index",
                    });
                };
                worksheet.write_string(r, c, cell)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Bytes of a new workbook holding only the placeholder sheet.
pub fn placeholder_document() -> Result<Vec<u8>, CodecError> {
    encode_xlsx(&SheetDocument::with_placeholder(PLACEHOLDER_SHEET))
}

fn cell_text(value: &Data) -> String {
    match value {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}
