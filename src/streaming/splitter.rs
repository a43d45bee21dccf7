//! The two-pass split.
//!
//! Pass one counts data records; pass two replays the header into both parts
//! and routes the first `total / 2` data records to part A and the rest to
//! part B. Both passes read the table from the start with the same fixed
//! format settings, so neither ever holds more than one record.

use std::ops::ControlFlow;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::SplitError;
use crate::streaming::table::{FinishedPart, RecordSink, TableFormat};

/// Row-count breakdown of a completed split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Data records in the source, header excluded.
    pub total_rows: u64,
    pub count_a: u64,
    pub count_b: u64,
    /// Whether the header was replayed into both parts.
    pub header_written: bool,
}

/// Result of running both passes over a table.
#[derive(Debug)]
pub enum PassOutcome {
    /// No data records; the write pass was skipped.
    Empty { header_found: bool },
    Split {
        part_a: FinishedPart,
        part_b: FinishedPart,
        summary: PassSummary,
    },
}

/// Number of data records routed to part A.
pub fn split_point(total: u64) -> u64 {
    total / 2
}

/// Reads the first record, if any.
///
/// A blank first record is still returned; callers treat it as the header.
pub fn probe_header<T: TableFormat>(table: &T) -> Result<Option<T::Record>, SplitError> {
    let mut first = None;
    table.scan(|_, record| {
        first = Some(record.clone());
        Ok(ControlFlow::Break(()))
    })?;

    if let Some(record) = &first {
        if T::is_blank(record) {
            warn!("[SPLIT] First record is blank; using it as the header");
        }
    }

    Ok(first)
}

/// Counting pass: the number of records after the first `skip`.
pub fn count_records<T: TableFormat>(table: &T, skip: u64) -> Result<u64, SplitError> {
    let mut total: u64 = 0;
    table.scan(|ordinal, _| {
        if ordinal > skip {
            total += 1;
        }
        Ok(ControlFlow::Continue(()))
    })?;
    Ok(total)
}

/// Writing pass: replays `header` into both parts and routes `total` data
/// records between them.
///
/// # Errors
///
/// Returns `MalformedRecord` if the pass reads a different number of data
/// records than `total`.
pub fn write_parts<T: TableFormat>(
    table: &T,
    header: Option<&T::Record>,
    total: u64,
    out_dir: &Path,
) -> Result<(FinishedPart, FinishedPart, PassSummary), SplitError> {
    let half = split_point(total);
    let skip = u64::from(header.is_some());

    let mut sink_a = table.create_sink(out_dir)?;
    let mut sink_b = table.create_sink(out_dir)?;

    if let Some(header) = header {
        sink_a.write_record(header, 1)?;
        sink_b.write_record(header, 1)?;
    }

    let mut routed: u64 = 0;
    table.scan(|ordinal, record| {
        if ordinal <= skip {
            return Ok(ControlFlow::Continue(()));
        }
        if routed < half {
            sink_a.write_record(record, ordinal)?;
        } else {
            sink_b.write_record(record, ordinal)?;
        }
        routed += 1;
        Ok(ControlFlow::Continue(()))
    })?;

    if routed != total {
        return Err(SplitError::malformed(
            routed + skip,
            format!(
                "Source changed between passes: counted {} data records, then read {}",
                total, routed
            ),
        ));
    }

    let part_a = sink_a.finish()?;
    let part_b = sink_b.finish()?;

    Ok((
        part_a,
        part_b,
        PassSummary {
            total_rows: total,
            count_a: half,
            count_b: total - half,
            header_written: header.is_some(),
        },
    ))
}

/// Runs the header probe, the counting pass and, if there is anything to
/// split, the writing pass. Parts are spooled in `out_dir`.
pub fn run_passes<T: TableFormat>(
    table: &T,
    has_header: bool,
    out_dir: &Path,
) -> Result<PassOutcome, SplitError> {
    let header = if has_header {
        probe_header(table)?
    } else {
        None
    };
    let header_found = header.is_some();

    let total = count_records(table, u64::from(header_found))?;
    info!(
        "[SPLIT] Counted {} data records (header: {})",
        total, header_found
    );

    if total == 0 {
        return Ok(PassOutcome::Empty { header_found });
    }

    let (part_a, part_b, summary) = write_parts(table, header.as_ref(), total, out_dir)?;
    debug!(
        count_a = summary.count_a,
        count_b = summary.count_b,
        header_written = summary.header_written,
        "Write pass complete"
    );

    Ok(PassOutcome::Split {
        part_a,
        part_b,
        summary,
    })
}
