//! Splits a large CSV or workbook into two halves without loading it into memory.
//!
//! Input arrives as uploaded bytes (plain, `.gz` or single-member `.zip`) or
//! as an http(s) URL. It is staged to a run-scoped temporary file, read once
//! to count data records and once more to write `part1` and `part2`.

pub mod commands;
pub mod config;
pub mod detection;
pub mod error;
pub mod staging;
pub mod streaming;

pub use crate::commands::{
    part_file_name, split, split_to_dir, split_to_dir_with_config, split_with_config,
    OutputPart, SavedSplit, SplitOutcome, SplitResult,
};
pub use crate::config::{SplitOptions, StagingConfig, TextEncoding};
pub use crate::error::{ErrorPresentation, SplitError};
pub use crate::staging::{InputSource, TableKind};
