//! Streaming passes over a staged table.
//!
//! The counting and writing passes are written once in [`splitter`] against
//! the [`TableFormat`] capability. Delimited text and workbooks each provide
//! a record reader and a spooled part writer that never hold more than one
//! record at a time.

pub mod delimited;
pub mod splitter;
pub mod table;
pub mod workbook;

pub use delimited::{CsvPartWriter, DelimitedTable};
pub use splitter::{run_passes, PassOutcome, PassSummary};
pub use table::{FinishedPart, RecordSink, TableFormat};
pub use workbook::{CellValue, WorkbookPartWriter, WorkbookTable};
