//! Sample-based dialect inference for delimited text.
//!
//! Only a bounded leading sample is inspected, so detection is safe for very
//! large files. Each candidate delimiter/quote pair is parsed with the `csv`
//! crate and scored by how uniform the resulting field counts are; the most
//! uniform multi-column reading wins. When nothing qualifies, or two
//! delimiters tie, the comma dialect is used.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder, Terminator, WriterBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::SplitError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// UTF-8 BOM bytes.
pub(crate) const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Delimiters tried, in tie-break order.
const CANDIDATE_DELIMITERS: &[u8] = &[b',', b';', b'\t', b'|'];

/// Quote characters tried, in tie-break order.
const CANDIDATE_QUOTES: &[u8] = &[b'"', b'\''];

/// Minimum share of sampled records that must have the modal field count.
const MIN_CONSISTENCY: f64 = 0.9;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Record terminator written to outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineTerminator {
    /// Unix-style line endings (\n).
    Lf,
    /// Windows-style line endings (\r\n).
    Crlf,
}

/// Parsing and writing conventions of a delimited-text table.
///
/// Built once per run and shared by both passes, so record boundaries are
/// computed identically when counting and when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    /// Whether a doubled quote inside a quoted field is an escaped quote.
    pub double_quote: bool,
    /// Escape character for quotes when `double_quote` is off.
    pub escape: Option<u8>,
    pub terminator: LineTerminator,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            double_quote: true,
            escape: None,
            terminator: LineTerminator::Lf,
        }
    }
}

impl Dialect {
    /// Reader configured for this dialect. Records may vary in length.
    pub(crate) fn reader_builder(&self) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(self.double_quote)
            .escape(self.escape);
        builder
    }

    /// Writer configured for this dialect.
    pub(crate) fn writer_builder(&self) -> WriterBuilder {
        let mut builder = WriterBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(self.double_quote)
            .terminator(match self.terminator {
                LineTerminator::Lf => Terminator::Any(b'\n'),
                LineTerminator::Crlf => Terminator::CRLF,
            });
        if let Some(escape) = self.escape {
            builder.escape(escape);
        }
        builder
    }
}

/// A bounded leading sample of a text file.
#[derive(Debug, Clone)]
pub struct Sample {
    pub bytes: Vec<u8>,
    /// Whether the file continues past the sample.
    pub truncated: bool,
    /// Whether a UTF-8 BOM preceded the sample.
    pub had_bom: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Reads up to `size` bytes from the start of `path`, skipping a UTF-8 BOM.
pub fn read_sample(path: &Path, size: usize) -> Result<Sample, SplitError> {
    let file = File::open(path)
        .map_err(|e| SplitError::SourceUnavailable(format!("Failed to open staged file: {}", e)))?;

    // One extra byte tells whether the file continues past the sample.
    let limit = (size + UTF8_BOM.len() + 1) as u64;
    let mut buffer = Vec::with_capacity(limit as usize);
    file.take(limit)
        .read_to_end(&mut buffer)
        .map_err(|e| SplitError::SourceUnavailable(format!("Failed to read sample: {}", e)))?;

    let had_bom = buffer.starts_with(UTF8_BOM);
    if had_bom {
        buffer.drain(..UTF8_BOM.len());
    }

    let truncated = buffer.len() > size;
    buffer.truncate(size);

    Ok(Sample {
        bytes: buffer,
        truncated,
        had_bom,
    })
}

/// Infers the dialect of `sample`, or `None` if no candidate qualifies or
/// the best delimiters tie.
pub fn infer(sample: &[u8], truncated: bool) -> Option<Dialect> {
    let terminator = terminator_of(sample);

    let mut best: Option<(Score, Dialect)> = None;
    let mut tied = false;

    for &delimiter in CANDIDATE_DELIMITERS {
        let Some((score, dialect)) = best_quote_for(sample, truncated, delimiter, terminator)
        else {
            continue;
        };

        match &best {
            None => best = Some((score, dialect)),
            Some((current, _)) if score > *current => {
                best = Some((score, dialect));
                tied = false;
            }
            Some((current, _)) if score == *current => tied = true,
            Some(_) => {}
        }
    }

    match best {
        Some((score, dialect)) if !tied => {
            debug!(
                delimiter = %(dialect.delimiter as char).escape_default(),
                quote = %(dialect.quote as char),
                fields = score.fields,
                consistency = score.consistency,
                "Inferred dialect"
            );
            Some(dialect)
        }
        _ => None,
    }
}

/// Infers the dialect of `sample`, falling back to the default comma dialect.
///
/// Never fails. The result is a pure function of the sample.
pub fn detect(sample: &[u8], truncated: bool) -> Dialect {
    infer(sample, truncated).unwrap_or_else(|| {
        warn!("[DETECT] No unambiguous dialect found, using comma-delimited default");
        Dialect {
            terminator: terminator_of(sample),
            ..Dialect::default()
        }
    })
}

/// CRLF if the sample contains any, LF otherwise.
fn terminator_of(sample: &[u8]) -> LineTerminator {
    if sample.windows(2).any(|w| w == b"\r\n") {
        LineTerminator::Crlf
    } else {
        LineTerminator::Lf
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scoring
// ─────────────────────────────────────────────────────────────────────────────

/// Uniformity score of one candidate reading.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
struct Score {
    consistency: f64,
    fields: usize,
}

/// Picks the better-scoring quote for `delimiter`, preferring the double quote on ties.
fn best_quote_for(
    sample: &[u8],
    truncated: bool,
    delimiter: u8,
    terminator: LineTerminator,
) -> Option<(Score, Dialect)> {
    let mut best: Option<(Score, Dialect)> = None;

    for &quote in CANDIDATE_QUOTES {
        let (double_quote, escape) = escaping_for(sample, quote);
        let dialect = Dialect {
            delimiter,
            quote,
            double_quote,
            escape,
            terminator,
        };
        let Some(score) = score_dialect(sample, truncated, &dialect) else {
            continue;
        };
        if best.map_or(true, |(current, _)| score > current) {
            best = Some((score, dialect));
        }
    }

    best
}

/// Backslash escaping is assumed only when `\q` occurs and `qq` never does.
fn escaping_for(sample: &[u8], quote: u8) -> (bool, Option<u8>) {
    let backslashed = sample.windows(2).any(|w| w == [b'\\', quote]);
    let doubled = sample.windows(2).any(|w| w == [quote, quote]);
    if backslashed && !doubled {
        (false, Some(b'\\'))
    } else {
        (true, None)
    }
}

/// Parses the sample with `dialect` and scores field-count uniformity.
///
/// Returns `None` if parsing fails or the modal reading has a single column
/// or is not uniform enough.
fn score_dialect(sample: &[u8], truncated: bool, dialect: &Dialect) -> Option<Score> {
    let mut reader = dialect.reader_builder().from_reader(Cursor::new(sample));
    let mut field_counts: Vec<usize> = Vec::new();
    let mut record = ByteRecord::new();

    loop {
        match reader.read_byte_record(&mut record) {
            Ok(true) => field_counts.push(record.len()),
            Ok(false) => break,
            Err(_) => return None,
        }
    }

    // The last record of a cut-off sample is probably incomplete.
    if truncated && field_counts.len() > 1 {
        field_counts.pop();
    }

    if field_counts.is_empty() {
        return None;
    }

    let (fields, frequency) = modal_count(&field_counts);
    let consistency = frequency as f64 / field_counts.len() as f64;

    if fields < 2 || consistency < MIN_CONSISTENCY {
        return None;
    }

    Some(Score {
        consistency,
        fields,
    })
}

/// Most frequent value and its frequency; ties go to the larger value.
fn modal_count(counts: &[usize]) -> (usize, usize) {
    let mut sorted = counts.to_vec();
    sorted.sort_unstable();

    let mut best = (0, 0);
    let mut index = 0;
    while index < sorted.len() {
        let value = sorted[index];
        let run = sorted[index..].iter().take_while(|&&v| v == value).count();
        if run >= best.1 {
            best = (value, run);
        }
        index += run;
    }
    best
}
