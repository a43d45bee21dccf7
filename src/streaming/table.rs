//! Format capability shared by the counting and writing passes.
//!
//! The pass logic is written once against [`TableFormat`]; each container
//! format only supplies record decoding ([`TableFormat::scan`]) and record
//! encoding ([`RecordSink`]).

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::SplitError;

/// A re-readable table of records.
pub trait TableFormat {
    /// One decoded record. Cloned once to hold the header.
    type Record: Clone;
    /// Writer producing one output part.
    type Sink: RecordSink<Record = Self::Record>;

    /// Reads the table from the start, calling `visit` with the 1-based
    /// ordinal of each record, until the end or until `visit` breaks.
    ///
    /// Every call yields the same records in the same order. At most one
    /// decoded record is alive at a time.
    fn scan<F>(&self, visit: F) -> Result<(), SplitError>
    where
        F: FnMut(u64, &Self::Record) -> Result<ControlFlow<()>, SplitError>;

    /// Creates an empty output part spooled to a temporary file in `dir`.
    fn create_sink(&self, dir: &Path) -> Result<Self::Sink, SplitError>;

    /// Whether a record carries no visible content.
    fn is_blank(record: &Self::Record) -> bool;
}

/// Appends records to one output part.
pub trait RecordSink {
    type Record;

    /// Appends `record`; `ordinal` is its position in the source for errors.
    fn write_record(&mut self, record: &Self::Record, ordinal: u64) -> Result<(), SplitError>;

    /// Writes any trailing structure and closes the part.
    fn finish(self) -> Result<FinishedPart, SplitError>;
}

/// A complete output part held in a temporary file.
///
/// Dropping it without [`persist`](Self::persist) deletes the file.
#[derive(Debug)]
pub struct FinishedPart {
    file: NamedTempFile,
}

impl FinishedPart {
    pub(crate) fn new(file: NamedTempFile) -> Self {
        Self { file }
    }

    /// Location of the spooled part.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Size of the part in bytes.
    #[cfg(test)]
    pub(crate) fn len(&self) -> Result<u64, SplitError> {
        self.file
            .as_file()
            .metadata()
            .map(|m| m.len())
            .map_err(|e| SplitError::SourceUnavailable(format!("Failed to inspect output: {}", e)))
    }

    /// Whether the part has no bytes.
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> Result<bool, SplitError> {
        Ok(self.len()? == 0)
    }

    /// Reads the whole part into memory and removes the file.
    pub fn into_bytes(self) -> Result<Vec<u8>, SplitError> {
        std::fs::read(self.file.path())
            .map_err(|e| SplitError::SourceUnavailable(format!("Failed to read output: {}", e)))
    }

    /// Atomically moves the part to `dest`, replacing any existing file.
    ///
    /// `dest` must be on the same filesystem as the spooled file.
    pub fn persist(self, dest: &Path) -> Result<PathBuf, SplitError> {
        self.file.persist(dest).map_err(|e| {
            SplitError::SourceUnavailable(format!(
                "Failed to persist output to {}: {}",
                dest.display(),
                e.error
            ))
        })?;
        Ok(dest.to_path_buf())
    }
}
