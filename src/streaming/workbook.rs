//! Workbook reading and part writing.
//!
//! Rows are streamed cell by cell from the sheet XML so the sheet is never
//! materialized; output parts are written in constant-memory mode.

use std::fs::File;
use std::io::BufReader;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, DataRef, Reader, Xlsx};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::detection::resolve_sheet;
use crate::error::SplitError;
use crate::streaming::table::{FinishedPart, RecordSink, TableFormat};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Name of the single sheet in every output part.
pub const OUTPUT_SHEET_NAME: &str = "Sheet1";

/// Number format applied to date/time cells in outputs.
const DATE_TIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Rows per worksheet.
const MAX_ROWS: u32 = 1_048_576;

/// Columns per worksheet.
const MAX_COLS: usize = 16_384;

// ─────────────────────────────────────────────────────────────────────────────
// Cell values
// ─────────────────────────────────────────────────────────────────────────────

/// An owned cell value, detached from the source workbook.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    String(String),
    Float(f64),
    Int(i64),
    Bool(bool),
    /// Excel serial date/time.
    DateTime(f64),
    /// Error literal such as `#DIV/0!`.
    Error(String),
}

impl From<&DataRef<'_>> for CellValue {
    fn from(value: &DataRef<'_>) -> Self {
        match value {
            DataRef::Empty => CellValue::Empty,
            DataRef::String(s) => CellValue::String(s.clone()),
            DataRef::SharedString(s) => CellValue::String((*s).to_string()),
            DataRef::Float(f) => CellValue::Float(*f),
            DataRef::Int(i) => CellValue::Int(*i),
            DataRef::Bool(b) => CellValue::Bool(*b),
            DataRef::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
            DataRef::DateTimeIso(s) | DataRef::DurationIso(s) => CellValue::String(s.clone()),
            DataRef::Error(e) => CellValue::Error(e.to_string()),
        }
    }
}

/// One sheet row; trailing empty cells may be omitted.
pub type Row = Vec<CellValue>;

// ─────────────────────────────────────────────────────────────────────────────
// Reading
// ─────────────────────────────────────────────────────────────────────────────

/// One sheet of a staged workbook.
#[derive(Debug, Clone)]
pub struct WorkbookTable {
    path: PathBuf,
    sheet: String,
}

fn open_xlsx(path: &Path) -> Result<Xlsx<BufReader<File>>, SplitError> {
    open_workbook(path).map_err(|e| {
        SplitError::UnsupportedFormat(format!("The workbook could not be read: {}", e))
    })
}

impl WorkbookTable {
    /// Opens the workbook at `path` and resolves the sheet to split.
    ///
    /// # Errors
    ///
    /// - `UnsupportedFormat` if the file is not a readable workbook
    /// - `SheetNotFound` if `requested` names a missing sheet
    /// - `EmptyInput` if the workbook has no sheets
    pub fn open(path: impl Into<PathBuf>, requested: Option<&str>) -> Result<Self, SplitError> {
        let path = path.into();
        let workbook = open_xlsx(&path)?;
        let sheet = resolve_sheet(&workbook.sheet_names(), requested)?;

        Ok(Self { path, sheet })
    }

    /// The resolved sheet name.
    pub fn sheet(&self) -> &str {
        &self.sheet
    }
}

impl TableFormat for WorkbookTable {
    type Record = Row;
    type Sink = WorkbookPartWriter;

    /// Yields every sheet row from the first, including empty rows between
    /// populated ones, with missing cells filled as [`CellValue::Empty`].
    fn scan<F>(&self, mut visit: F) -> Result<(), SplitError>
    where
        F: FnMut(u64, &Row) -> Result<ControlFlow<()>, SplitError>,
    {
        let mut workbook = open_xlsx(&self.path)?;
        let mut cells = workbook.worksheet_cells_reader(&self.sheet).map_err(|e| {
            SplitError::UnsupportedFormat(format!("Sheet '{}' could not be read: {}", self.sheet, e))
        })?;

        let mut row: Row = Vec::new();
        let mut row_index: u32 = 0;
        let mut seen_any = false;

        loop {
            let cell = cells.next_cell().map_err(|e| {
                SplitError::malformed(u64::from(row_index) + 1, format!("Unreadable cell: {}", e))
            })?;
            let Some(cell) = cell else {
                break;
            };

            let (cell_row, cell_col) = cell.get_position();
            if cell_row < row_index {
                return Err(SplitError::malformed(
                    u64::from(cell_row) + 1,
                    "Cells are out of row order",
                ));
            }

            while row_index < cell_row {
                if visit(u64::from(row_index) + 1, &row)?.is_break() {
                    return Ok(());
                }
                row.clear();
                row_index += 1;
            }

            let col = cell_col as usize;
            if row.len() <= col {
                row.resize(col + 1, CellValue::Empty);
            }
            row[col] = CellValue::from(cell.get_value());
            seen_any = true;
        }

        if seen_any {
            // Last row; stopping early changes nothing here.
            let _ = visit(u64::from(row_index) + 1, &row)?;
        }

        Ok(())
    }

    fn create_sink(&self, dir: &Path) -> Result<WorkbookPartWriter, SplitError> {
        WorkbookPartWriter::new(dir)
    }

    fn is_blank(record: &Row) -> bool {
        record.iter().all(|cell| match cell {
            CellValue::Empty => true,
            CellValue::String(s) => s.trim().is_empty(),
            _ => false,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Writing
// ─────────────────────────────────────────────────────────────────────────────

fn write_error(ordinal: u64, error: XlsxError) -> SplitError {
    SplitError::malformed(ordinal, format!("Row could not be written: {}", error))
}

/// Writes one workbook output part with a single sheet named `Sheet1`.
pub struct WorkbookPartWriter {
    workbook: Workbook,
    file: NamedTempFile,
    date_format: Format,
    next_row: u32,
}

impl WorkbookPartWriter {
    /// Creates a part spooled to a temporary file in `dir`.
    pub fn new(dir: &Path) -> Result<Self, SplitError> {
        let file = NamedTempFile::new_in(dir).map_err(|e| {
            SplitError::SourceUnavailable(format!("Failed to create output file: {}", e))
        })?;

        let mut workbook = Workbook::new();
        workbook
            .add_worksheet_with_constant_memory()
            .set_name(OUTPUT_SHEET_NAME)
            .map_err(|e| write_error(0, e))?;

        Ok(Self {
            workbook,
            file,
            date_format: Format::new().set_num_format(DATE_TIME_FORMAT),
            next_row: 0,
        })
    }
}

impl RecordSink for WorkbookPartWriter {
    type Record = Row;

    fn write_record(&mut self, record: &Row, ordinal: u64) -> Result<(), SplitError> {
        if self.next_row >= MAX_ROWS {
            return Err(SplitError::malformed(
                ordinal,
                format!("Output exceeds {} rows", MAX_ROWS),
            ));
        }
        if record.len() > MAX_COLS {
            return Err(SplitError::malformed(
                ordinal,
                format!("Row exceeds {} columns", MAX_COLS),
            ));
        }

        let row = self.next_row;
        let worksheet = self
            .workbook
            .worksheet_from_index(0)
            .map_err(|e| write_error(ordinal, e))?;

        for (index, value) in record.iter().enumerate() {
            // Bounded by MAX_COLS above.
            let col = index as u16;
            let written = match value {
                CellValue::Empty => continue,
                CellValue::String(s) | CellValue::Error(s) => worksheet.write_string(row, col, s.as_str()),
                CellValue::Float(f) => worksheet.write_number(row, col, *f),
                CellValue::Int(i) => worksheet.write_number(row, col, *i as f64),
                CellValue::Bool(b) => worksheet.write_boolean(row, col, *b),
                CellValue::DateTime(serial) => {
                    worksheet.write_number_with_format(row, col, *serial, &self.date_format)
                }
            };
            written.map_err(|e| write_error(ordinal, e))?;
        }

        self.next_row += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<FinishedPart, SplitError> {
        self.workbook
            .save_to_writer(&mut self.file)
            .map_err(|e| SplitError::SourceUnavailable(format!("Failed to save output: {}", e)))?;

        debug!(rows = self.next_row, "Workbook part saved");
        Ok(FinishedPart::new(self.file))
    }
}
