//! Record-aware delimited-text reading and part writing.
//!
//! Uses the `csv` crate so embedded delimiters and newlines inside quoted
//! fields never split a record. Records are handled as raw bytes, which keeps
//! Latin-1 input byte-for-byte intact in the outputs.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use csv::{ByteRecord, Writer};
use tempfile::NamedTempFile;

use crate::config::{TextEncoding, BUFFER_SIZE};
use crate::detection::dialect::UTF8_BOM;
use crate::detection::Dialect;
use crate::error::SplitError;
use crate::streaming::table::{FinishedPart, RecordSink, TableFormat};

/// A staged delimited-text file with its fixed dialect.
#[derive(Debug, Clone)]
pub struct DelimitedTable {
    path: PathBuf,
    dialect: Dialect,
    encoding: TextEncoding,
}

impl DelimitedTable {
    pub fn new(path: impl Into<PathBuf>, dialect: Dialect, encoding: TextEncoding) -> Self {
        Self {
            path: path.into(),
            dialect,
            encoding,
        }
    }

    /// Opens the file positioned after any UTF-8 BOM.
    fn open(&self) -> Result<BufReader<File>, SplitError> {
        let file = File::open(&self.path)
            .map_err(|e| SplitError::SourceUnavailable(format!("Failed to open staged file: {}", e)))?;
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);

        let has_bom = reader
            .fill_buf()
            .map_err(|e| SplitError::SourceUnavailable(format!("Failed to read staged file: {}", e)))?
            .starts_with(UTF8_BOM);
        if has_bom {
            reader.consume(UTF8_BOM.len());
        }

        Ok(reader)
    }
}

/// Maps a `csv` read error to `MalformedRecord` with its position.
fn malformed_from_csv(error: csv::Error, fallback_record: u64) -> SplitError {
    let (record, line) = match error.position() {
        Some(pos) => (pos.record() + 1, Some(pos.line())),
        None => (fallback_record, None),
    };
    SplitError::MalformedRecord {
        record,
        line,
        message: error.to_string(),
    }
}

/// Rejects records with a field that is not valid UTF-8.
fn validate_utf8(record: &ByteRecord, ordinal: u64) -> Result<(), SplitError> {
    for (index, field) in record.iter().enumerate() {
        if let Err(e) = std::str::from_utf8(field) {
            return Err(SplitError::MalformedRecord {
                record: ordinal,
                line: record.position().map(|p| p.line()),
                message: format!("field {} is not valid UTF-8: {}", index + 1, e),
            });
        }
    }
    Ok(())
}

impl TableFormat for DelimitedTable {
    type Record = ByteRecord;
    type Sink = CsvPartWriter;

    fn scan<F>(&self, mut visit: F) -> Result<(), SplitError>
    where
        F: FnMut(u64, &ByteRecord) -> Result<ControlFlow<()>, SplitError>,
    {
        let mut reader = self.dialect.reader_builder().from_reader(self.open()?);
        let mut record = ByteRecord::new();
        let mut ordinal: u64 = 0;

        loop {
            match reader.read_byte_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => return Err(malformed_from_csv(e, ordinal + 1)),
            }
            ordinal += 1;

            if self.encoding.requires_utf8() {
                validate_utf8(&record, ordinal)?;
            }

            if visit(ordinal, &record)?.is_break() {
                break;
            }
        }

        Ok(())
    }

    fn create_sink(&self, dir: &Path) -> Result<CsvPartWriter, SplitError> {
        CsvPartWriter::new(dir, &self.dialect, self.encoding)
    }

    fn is_blank(record: &ByteRecord) -> bool {
        record
            .iter()
            .all(|field| field.iter().all(|b| b.is_ascii_whitespace()))
    }
}

/// Writes one delimited-text output part to a temporary file.
///
/// If dropped before [`finish`](RecordSink::finish), the temporary file is
/// deleted.
pub struct CsvPartWriter {
    writer: Writer<BufWriter<NamedTempFile>>,
}

impl CsvPartWriter {
    /// Creates a part in `dir` using the source dialect.
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` if the temporary file cannot be created.
    pub fn new(dir: &Path, dialect: &Dialect, encoding: TextEncoding) -> Result<Self, SplitError> {
        let temp_file = NamedTempFile::new_in(dir).map_err(|e| {
            SplitError::SourceUnavailable(format!("Failed to create output file: {}", e))
        })?;

        let mut buf_writer = BufWriter::with_capacity(BUFFER_SIZE, temp_file);
        if encoding.writes_bom() {
            buf_writer.write_all(UTF8_BOM).map_err(|e| {
                SplitError::SourceUnavailable(format!("Failed to write output: {}", e))
            })?;
        }

        Ok(Self {
            writer: dialect.writer_builder().from_writer(buf_writer),
        })
    }
}

impl RecordSink for CsvPartWriter {
    type Record = ByteRecord;

    fn write_record(&mut self, record: &ByteRecord, ordinal: u64) -> Result<(), SplitError> {
        self.writer.write_byte_record(record).map_err(|e| {
            SplitError::SourceUnavailable(format!(
                "Failed to write record {} to output: {}",
                ordinal, e
            ))
        })
    }

    fn finish(self) -> Result<FinishedPart, SplitError> {
        // Flush the CSV writer and get the BufWriter
        let buf_writer = self.writer.into_inner().map_err(|e| {
            SplitError::SourceUnavailable(format!("Failed to flush output: {}", e.error()))
        })?;

        // Flush the BufWriter and get the NamedTempFile
        let named_temp = buf_writer.into_inner().map_err(|e| {
            SplitError::SourceUnavailable(format!("Failed to flush output buffer: {}", e.error()))
        })?;

        Ok(FinishedPart::new(named_temp))
    }
}
