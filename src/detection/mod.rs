//! Format detection.
//!
//! Delimited text gets its dialect inferred from a bounded sample; workbooks
//! get their target sheet resolved. Both results are computed once per run
//! and then held fixed for the counting and writing passes.

pub mod dialect;
pub mod sheet;

pub use dialect::{detect, infer, read_sample, Dialect, LineTerminator, Sample};
pub use sheet::resolve_sheet;
