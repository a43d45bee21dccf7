//! Split entry points.
//!
//! Each call stages its input, detects the dialect or sheet, runs the two
//! passes on the blocking pool and packages both parts. Every call owns its
//! temporary storage; nothing is shared between concurrent runs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{SplitOptions, StagingConfig};
use crate::detection::{detect, read_sample};
use crate::error::SplitError;
use crate::staging::{stage, InputSource, StagedTable, TableKind};
use crate::streaming::{
    run_passes, DelimitedTable, FinishedPart, PassOutcome, PassSummary, WorkbookTable,
};

// ─────────────────────────────────────────────────────────────────────────────
// Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Either a completed split or the report that there were no data rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitOutcome<T> {
    Split(T),
    /// The table had no data records; no outputs were produced.
    NothingToSplit { header_found: bool },
}

impl<T> SplitOutcome<T> {
    /// The completed split, if any.
    pub fn into_split(self) -> Option<T> {
        match self {
            SplitOutcome::Split(result) => Some(result),
            SplitOutcome::NothingToSplit { .. } => None,
        }
    }
}

/// One output part held in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPart {
    /// Suggested download name, `part1.<ext>` or `part2.<ext>`.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Both parts of an in-memory split with the row-count breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitResult {
    pub part_a: OutputPart,
    pub part_b: OutputPart,
    pub total_rows: u64,
    pub count_a: u64,
    pub count_b: u64,
    pub header_written: bool,
    pub kind: TableKind,
}

/// Both parts of an on-disk split with the row-count breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedSplit {
    pub part_a: PathBuf,
    pub part_b: PathBuf,
    pub total_rows: u64,
    pub count_a: u64,
    pub count_b: u64,
    pub header_written: bool,
    pub kind: TableKind,
}

/// Output file name for the 1-based part `index`.
pub fn part_file_name(index: u8, extension: &str) -> String {
    format!("part{}.{}", index, extension)
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Splits `source` into two in-memory parts with the default staging config.
///
/// # Errors
///
/// Any [`SplitError`]; no partial output is ever returned.
pub async fn split(
    source: InputSource,
    options: SplitOptions,
) -> Result<SplitOutcome<SplitResult>, SplitError> {
    split_with_config(source, options, &StagingConfig::default()).await
}

/// Splits `source` into two in-memory parts.
pub async fn split_with_config(
    source: InputSource,
    options: SplitOptions,
    config: &StagingConfig,
) -> Result<SplitOutcome<SplitResult>, SplitError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("split", run_id = %run_id);

    async move {
        let staged = stage(source, config).await?;
        let sample_size = config.sample_size;

        let outcome = tokio::task::spawn_blocking(move || {
            let outcome = split_staged(&staged, &options, sample_size, staged.workspace())?;
            package_in_memory(outcome, staged.kind(), staged.output_extension())
        })
        .await
        .map_err(|e| SplitError::SourceUnavailable(format!("Split task failed: {}", e)))??;

        if let SplitOutcome::Split(result) = &outcome {
            info!(
                "[SPLIT] Done: {} rows -> {} + {} ({} + {} bytes)",
                result.total_rows,
                result.count_a,
                result.count_b,
                result.part_a.bytes.len(),
                result.part_b.bytes.len()
            );
        }
        Ok(outcome)
    }
    .instrument(span)
    .await
}

/// Splits `source` into `out_dir/part1.<ext>` and `out_dir/part2.<ext>`.
///
/// Each part is spooled beside its destination and atomically renamed into
/// place. Existing parts are replaced. If the second rename fails the first
/// part is removed again.
pub async fn split_to_dir(
    source: InputSource,
    options: SplitOptions,
    out_dir: impl AsRef<Path>,
) -> Result<SplitOutcome<SavedSplit>, SplitError> {
    split_to_dir_with_config(source, options, out_dir, &StagingConfig::default()).await
}

/// [`split_to_dir`] with an explicit staging config.
pub async fn split_to_dir_with_config(
    source: InputSource,
    options: SplitOptions,
    out_dir: impl AsRef<Path>,
    config: &StagingConfig,
) -> Result<SplitOutcome<SavedSplit>, SplitError> {
    let out_dir = out_dir.as_ref().to_path_buf();
    let run_id = Uuid::new_v4();
    let span = info_span!("split_to_dir", run_id = %run_id);

    async move {
        tokio::fs::create_dir_all(&out_dir).await.map_err(|e| {
            SplitError::SourceUnavailable(format!("Failed to create output directory: {}", e))
        })?;

        let staged = stage(source, config).await?;
        let sample_size = config.sample_size;

        let outcome = tokio::task::spawn_blocking(move || {
            let outcome = split_staged(&staged, &options, sample_size, &out_dir)?;
            package_on_disk(outcome, staged.kind(), staged.output_extension(), &out_dir)
        })
        .await
        .map_err(|e| SplitError::SourceUnavailable(format!("Split task failed: {}", e)))??;

        if let SplitOutcome::Split(saved) = &outcome {
            info!(
                "[SPLIT] Saved {} + {} rows to {} and {}",
                saved.count_a,
                saved.count_b,
                saved.part_a.display(),
                saved.part_b.display()
            );
        }
        Ok(outcome)
    }
    .instrument(span)
    .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Internals
// ─────────────────────────────────────────────────────────────────────────────

/// Detects the format settings for `staged` and runs both passes.
///
/// Blocking; parts are spooled in `spool_dir`.
fn split_staged(
    staged: &StagedTable,
    options: &SplitOptions,
    sample_size: usize,
    spool_dir: &Path,
) -> Result<PassOutcome, SplitError> {
    match staged.kind() {
        TableKind::DelimitedText => {
            let sample = read_sample(staged.path(), sample_size)?;
            let dialect = detect(&sample.bytes, sample.truncated);
            info!(
                "[DETECT] '{}': delimiter {:?}, quote {:?}, {:?} ({} byte sample{})",
                staged.source_name(),
                dialect.delimiter as char,
                dialect.quote as char,
                dialect.terminator,
                sample.bytes.len(),
                if sample.had_bom { ", BOM" } else { "" }
            );

            let table = DelimitedTable::new(staged.path(), dialect, options.encoding);
            run_passes(&table, options.has_header, spool_dir)
        }
        TableKind::Workbook => {
            let table = WorkbookTable::open(staged.path(), options.requested_sheet())?;
            info!(
                "[DETECT] '{}': sheet '{}'",
                staged.source_name(),
                table.sheet()
            );
            run_passes(&table, options.has_header, spool_dir)
        }
    }
}

fn package_in_memory(
    outcome: PassOutcome,
    kind: TableKind,
    extension: &str,
) -> Result<SplitOutcome<SplitResult>, SplitError> {
    let (part_a, part_b, summary) = match outcome {
        PassOutcome::Empty { header_found } => {
            return Ok(nothing_to_split(header_found));
        }
        PassOutcome::Split {
            part_a,
            part_b,
            summary,
        } => (part_a, part_b, summary),
    };

    let PassSummary {
        total_rows,
        count_a,
        count_b,
        header_written,
    } = summary;

    Ok(SplitOutcome::Split(SplitResult {
        part_a: OutputPart {
            file_name: part_file_name(1, extension),
            bytes: part_a.into_bytes()?,
        },
        part_b: OutputPart {
            file_name: part_file_name(2, extension),
            bytes: part_b.into_bytes()?,
        },
        total_rows,
        count_a,
        count_b,
        header_written,
        kind,
    }))
}

fn package_on_disk(
    outcome: PassOutcome,
    kind: TableKind,
    extension: &str,
    out_dir: &Path,
) -> Result<SplitOutcome<SavedSplit>, SplitError> {
    let (part_a, part_b, summary) = match outcome {
        PassOutcome::Empty { header_found } => {
            return Ok(nothing_to_split(header_found));
        }
        PassOutcome::Split {
            part_a,
            part_b,
            summary,
        } => (part_a, part_b, summary),
    };

    let (path_a, path_b) = persist_pair(part_a, part_b, extension, out_dir)?;

    Ok(SplitOutcome::Split(SavedSplit {
        part_a: path_a,
        part_b: path_b,
        total_rows: summary.total_rows,
        count_a: summary.count_a,
        count_b: summary.count_b,
        header_written: summary.header_written,
        kind,
    }))
}

/// Persists both parts or neither.
fn persist_pair(
    part_a: FinishedPart,
    part_b: FinishedPart,
    extension: &str,
    out_dir: &Path,
) -> Result<(PathBuf, PathBuf), SplitError> {
    let path_a = part_a.persist(&out_dir.join(part_file_name(1, extension)))?;
    match part_b.persist(&out_dir.join(part_file_name(2, extension))) {
        Ok(path_b) => Ok((path_a, path_b)),
        Err(e) => {
            if let Err(remove_err) = fs::remove_file(&path_a) {
                warn!(
                    "[SPLIT] Failed to remove {} after error: {}",
                    path_a.display(),
                    remove_err
                );
            }
            Err(e)
        }
    }
}

fn nothing_to_split<T>(header_found: bool) -> SplitOutcome<T> {
    info!(
        "[SPLIT] Nothing to split (header found: {})",
        header_found
    );
    SplitOutcome::NothingToSplit { header_found }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TextEncoding;
    use crate::streaming::workbook::tests::write_fixture;
    use crate::staging::{gzip_bytes as gzip, zip_bytes as zip};
    use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tracing_subscriber::fmt::MakeWriter;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SCENARIO: &str = "a,b\n1,2\n3,4\n5,6\n7,8\n9,10\n";

    fn workbook_bytes(dir: &TempDir) -> Vec<u8> {
        let path = dir.path().join("fixture.xlsx");
        write_fixture(
            &path,
            &[
                ("Notes", &[&[Some("ignore me")]]),
                (
                    "Data",
                    &[
                        &[Some("id"), Some("name")],
                        &[Some("1"), Some("Ann")],
                        &[Some("2"), Some("Bob")],
                        &[Some("3"), Some("Cy")],
                        &[Some("4"), Some("Di")],
                    ],
                ),
            ],
        );
        std::fs::read(&path).unwrap()
    }

    fn expect_split<T: std::fmt::Debug>(outcome: SplitOutcome<T>) -> T {
        match outcome {
            SplitOutcome::Split(result) => result,
            other => panic!("Expected a split, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_split_csv_round_trip() {
        let result = expect_split(
            split(InputSource::bytes("data.csv", SCENARIO), SplitOptions::default())
                .await
                .unwrap(),
        );

        assert_eq!(result.part_a.file_name, "part1.csv");
        assert_eq!(result.part_b.file_name, "part2.csv");
        assert_eq!(result.part_a.bytes, b"a,b\n1,2\n3,4\n");
        assert_eq!(result.part_b.bytes, b"a,b\n5,6\n7,8\n9,10\n");
        assert_eq!(
            (result.total_rows, result.count_a, result.count_b),
            (5, 2, 3)
        );
        assert!(result.header_written);
        assert_eq!(result.kind, TableKind::DelimitedText);
    }

    #[tokio::test]
    async fn test_split_keeps_detected_dialect() {
        let input = "x;y\r\n1;\"a;b\"\r\n2;c\r\n";
        let result = expect_split(
            split(InputSource::bytes("semi.csv", input), SplitOptions::default())
                .await
                .unwrap(),
        );

        assert_eq!(result.part_a.bytes, b"x;y\r\n1;\"a;b\"\r\n");
        assert_eq!(result.part_b.bytes, b"x;y\r\n2;c\r\n");
    }

    #[tokio::test]
    async fn test_gzip_and_zip_match_direct_input() {
        let direct = split(InputSource::bytes("data.csv", SCENARIO), SplitOptions::default())
            .await
            .unwrap();
        let gz = split(
            InputSource::bytes("data.csv.gz", gzip(SCENARIO.as_bytes())),
            SplitOptions::default(),
        )
        .await
        .unwrap();
        let zipped = split(
            InputSource::bytes(
                "bundle.zip",
                zip(&[("__MACOSX/._data.csv", "junk"), ("data.csv", SCENARIO)]),
            ),
            SplitOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(direct, gz);
        assert_eq!(direct, zipped);
    }

    #[tokio::test]
    async fn test_zip_member_count_must_be_one() {
        let none = split(
            InputSource::bytes("bundle.zip", zip(&[("readme.md", "hi")])),
            SplitOptions::default(),
        )
        .await;
        let two = split(
            InputSource::bytes("bundle.zip", zip(&[("a.csv", SCENARIO), ("b.csv", SCENARIO)])),
            SplitOptions::default(),
        )
        .await;

        assert!(matches!(none, Err(SplitError::UnsupportedFormat(_))));
        assert!(matches!(two, Err(SplitError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_header_only_is_nothing_to_split() {
        let outcome = split(InputSource::bytes("data.csv", "a,b\n"), SplitOptions::default())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SplitOutcome::NothingToSplit { header_found: true }
        );
    }

    #[tokio::test]
    async fn test_empty_input_fails() {
        let result = split(InputSource::bytes("data.csv", ""), SplitOptions::default()).await;
        assert!(matches!(result, Err(SplitError::EmptyInput)));
    }

    #[tokio::test]
    async fn test_unsupported_extension_fails() {
        let result = split(InputSource::bytes("data.json", "{}"), SplitOptions::default()).await;
        assert!(matches!(result, Err(SplitError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_latin1_bytes_pass_through() {
        let input = b"name\ncaf\xe9\nna\xefve\n".to_vec();
        let options = SplitOptions::default().encoding(TextEncoding::Latin1);

        let result = expect_split(
            split(InputSource::bytes("latin.csv", input.clone()), options)
                .await
                .unwrap(),
        );

        assert_eq!(result.part_a.bytes, b"name\ncaf\xe9\n");
        assert_eq!(result.part_b.bytes, b"name\nna\xefve\n");

        let strict = split(InputSource::bytes("latin.csv", input), SplitOptions::default()).await;
        assert!(matches!(strict, Err(SplitError::MalformedRecord { .. })));
    }

    #[tokio::test]
    async fn test_utf8_sig_writes_bom() {
        let mut input = vec![0xEF, 0xBB, 0xBF];
        input.extend_from_slice(b"h\n1\n2\n");
        let options = SplitOptions::default().encoding(TextEncoding::Utf8Sig);

        let result = expect_split(
            split(InputSource::bytes("bom.csv", input), options)
                .await
                .unwrap(),
        );

        assert_eq!(result.part_a.bytes, b"\xEF\xBB\xBFh\n1\n");
        assert_eq!(result.part_b.bytes, b"\xEF\xBB\xBFh\n2\n");
    }

    #[tokio::test]
    async fn test_split_workbook_named_sheet() {
        let dir = TempDir::new().unwrap();
        let options = SplitOptions::default().sheet_name("Data");

        let result = expect_split(
            split(InputSource::bytes("book.xlsm", workbook_bytes(&dir)), options)
                .await
                .unwrap(),
        );

        assert_eq!(result.part_a.file_name, "part1.xlsx");
        assert_eq!(result.kind, TableKind::Workbook);
        assert_eq!(
            (result.total_rows, result.count_a, result.count_b),
            (4, 2, 2)
        );

        let mut book: Xlsx<_> = open_workbook_from_rs(Cursor::new(result.part_b.bytes)).unwrap();
        let range = book.worksheet_range("Sheet1").unwrap();
        assert_eq!(range.height(), 3);
        assert_eq!(range.get_value((0, 1)), Some(&Data::String("name".into())));
        assert_eq!(range.get_value((1, 1)), Some(&Data::String("Cy".into())));
    }

    #[tokio::test]
    async fn test_split_gzipped_workbook() {
        let dir = TempDir::new().unwrap();
        let options = SplitOptions::default().sheet_name("Data");

        let result = expect_split(
            split(
                InputSource::bytes("book.xlsx.gz", gzip(&workbook_bytes(&dir))),
                options,
            )
            .await
            .unwrap(),
        );

        assert_eq!(result.kind, TableKind::Workbook);
        assert_eq!(result.part_b.file_name, "part2.xlsx");
        assert_eq!(
            (result.total_rows, result.count_a, result.count_b),
            (4, 2, 2)
        );

        let mut book: Xlsx<_> = open_workbook_from_rs(Cursor::new(result.part_a.bytes)).unwrap();
        let range = book.worksheet_range("Sheet1").unwrap();
        assert_eq!(range.height(), 3);
        assert_eq!(range.get_value((0, 0)), Some(&Data::String("id".into())));
        assert_eq!(range.get_value((2, 1)), Some(&Data::String("Bob".into())));
    }

    #[tokio::test]
    async fn test_split_tsv_keeps_extension() {
        let result = expect_split(
            split(
                InputSource::bytes("tabs.tsv", "a\tb\n1\t2\n3\t4\n"),
                SplitOptions::default(),
            )
            .await
            .unwrap(),
        );

        assert_eq!(result.part_a.file_name, "part1.tsv");
        assert_eq!(result.part_b.file_name, "part2.tsv");
        assert_eq!(result.part_a.bytes, b"a\tb\n1\t2\n");
        assert_eq!(result.part_b.bytes, b"a\tb\n3\t4\n");
    }

    #[tokio::test]
    async fn test_split_gzipped_zip_is_unsupported() {
        let archive = zip(&[("data.csv", SCENARIO)]);

        let result = split(
            InputSource::bytes("data.zip.gz", gzip(&archive)),
            SplitOptions::default(),
        )
        .await;

        assert!(matches!(result, Err(SplitError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_split_workbook_missing_sheet() {
        let dir = TempDir::new().unwrap();
        let options = SplitOptions::default().sheet_name("Missing");

        let result = split(InputSource::bytes("book.xlsx", workbook_bytes(&dir)), options).await;

        match result {
            Err(SplitError::SheetNotFound { available, .. }) => {
                assert_eq!(available, vec!["Notes".to_string(), "Data".to_string()]);
            }
            other => panic!("Expected SheetNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_split_to_dir_persists_both_parts() {
        let out = TempDir::new().unwrap();
        let target = out.path().join("nested");

        let saved = expect_split(
            split_to_dir(
                InputSource::bytes("data.csv", SCENARIO),
                SplitOptions::default(),
                &target,
            )
            .await
            .unwrap(),
        );

        assert_eq!(saved.part_a, target.join("part1.csv"));
        assert_eq!(saved.part_b, target.join("part2.csv"));
        assert_eq!(fs::read_to_string(&saved.part_a).unwrap(), "a,b\n1,2\n3,4\n");
        assert_eq!(
            fs::read_to_string(&saved.part_b).unwrap(),
            "a,b\n5,6\n7,8\n9,10\n"
        );
        // No spool files left behind.
        assert_eq!(fs::read_dir(&target).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_split_to_dir_failure_leaves_no_files() {
        let out = TempDir::new().unwrap();

        let result = split_to_dir(
            InputSource::bytes("data.csv", b"a\n1\n\xff\n".to_vec()),
            SplitOptions::default(),
            out.path(),
        )
        .await;

        assert!(matches!(result, Err(SplitError::MalformedRecord { .. })));
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_split_remote_source() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/exports/orders.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SCENARIO))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/exports/orders.csv?sig=abc", mock_server.uri());
        let result = expect_split(
            split(InputSource::url(url), SplitOptions::default())
                .await
                .unwrap(),
        );

        assert_eq!(result.count_a + result.count_b, 5);
        assert_eq!(result.part_a.bytes, b"a,b\n1,2\n3,4\n");
    }

    #[tokio::test]
    async fn test_split_remote_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let url = format!("{}/orders.csv", mock_server.uri());
        let result = split(InputSource::url(url), SplitOptions::default()).await;

        assert!(matches!(result, Err(SplitError::SourceUnavailable(_))));
    }

    /// Captures formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_remote_logs_show_path_only() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exports/orders.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SCENARIO))
            .mount(&mock_server)
            .await;

        let url = format!(
            "{}/exports/orders.csv?X-Amz-Signature=topsecret",
            mock_server.uri()
        );
        split(InputSource::url(url), SplitOptions::default())
            .await
            .unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("[FETCH] GET /exports/orders.csv 200"));
        assert!(output.contains("run_id"));
        assert!(!output.contains("topsecret"));
    }

    #[test]
    fn test_outcome_serializes() {
        let outcome: SplitOutcome<SavedSplit> = SplitOutcome::NothingToSplit { header_found: false };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["nothing_to_split"]["header_found"], false);
    }
}
