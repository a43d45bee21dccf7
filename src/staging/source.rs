//! Input sources and file-name classification.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SplitError;

/// Suffixes accepted for plain delimited text.
const TEXT_SUFFIXES: &[&str] = &[".csv", ".tsv", ".txt"];

/// Suffixes accepted for archive members. Narrower than [`TEXT_SUFFIXES`] so a
/// bundled README does not count as a second table.
pub(crate) const ARCHIVE_MEMBER_SUFFIXES: &[&str] = &[".csv", ".tsv"];

/// Suffixes accepted for spreadsheet workbooks.
const WORKBOOK_SUFFIXES: &[&str] = &[".xlsx", ".xlsm"];

const GZIP_SUFFIX: &str = ".gz";
const TSV_SUFFIX: &str = ".tsv";
const ZIP_SUFFIX: &str = ".zip";

/// What the caller hands over to be split.
#[derive(Debug, Clone)]
pub enum InputSource {
    /// An uploaded file held in memory, with its declared name.
    Bytes { file_name: String, data: Vec<u8> },
    /// A remote http(s) resource to fetch first.
    Url(String),
}

impl InputSource {
    /// Convenience constructor for uploaded content.
    pub fn bytes(file_name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        InputSource::Bytes {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    /// Convenience constructor for a remote source.
    pub fn url(url: impl Into<String>) -> Self {
        InputSource::Url(url.into())
    }
}

/// Base format of the table once decompressed/extracted. Outputs mirror it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    DelimitedText,
    Workbook,
}

impl TableKind {
    /// Extension used for staged files and output parts.
    pub fn extension(self) -> &'static str {
        match self {
            TableKind::DelimitedText => "csv",
            TableKind::Workbook => "xlsx",
        }
    }
}

/// How the table is wrapped on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Container {
    Plain(TableKind),
    Gzip(TableKind),
    Zip,
}

fn has_any_suffix(lower: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|suffix| lower.ends_with(suffix))
}

/// Returns the kind for a plain (unwrapped) file name, if recognized.
fn plain_kind(lower: &str) -> Option<TableKind> {
    if has_any_suffix(lower, TEXT_SUFFIXES) {
        Some(TableKind::DelimitedText)
    } else if has_any_suffix(lower, WORKBOOK_SUFFIXES) {
        Some(TableKind::Workbook)
    } else {
        None
    }
}

/// Classifies an input by its file name.
///
/// A `.gz` file takes its kind from the inner name (`data.xlsx.gz` is a
/// workbook) and defaults to delimited text.
pub(crate) fn classify(file_name: &str) -> Result<Container, SplitError> {
    let lower = file_name.trim().to_ascii_lowercase();

    if let Some(kind) = plain_kind(&lower) {
        return Ok(Container::Plain(kind));
    }

    if let Some(inner) = lower.strip_suffix(GZIP_SUFFIX) {
        if inner.ends_with(ZIP_SUFFIX) || inner.ends_with(GZIP_SUFFIX) {
            return Err(SplitError::UnsupportedFormat(format!(
                "'{}' is a compressed archive; gzip a single table file instead",
                file_name
            )));
        }
        let kind = plain_kind(inner).unwrap_or(TableKind::DelimitedText);
        return Ok(Container::Gzip(kind));
    }

    if lower.ends_with(ZIP_SUFFIX) {
        return Ok(Container::Zip);
    }

    Err(SplitError::UnsupportedFormat(format!(
        "'{}' is not a recognized file type",
        file_name
    )))
}

/// Extension for the output parts of a table named `name`.
///
/// Tab-separated names keep `tsv`; everything else follows the kind.
pub(crate) fn output_extension(kind: TableKind, name: &str) -> &'static str {
    let lower = name.trim().to_ascii_lowercase();
    let inner = lower.strip_suffix(GZIP_SUFFIX).unwrap_or(&lower);
    if kind == TableKind::DelimitedText && inner.ends_with(TSV_SUFFIX) {
        "tsv"
    } else {
        kind.extension()
    }
}

/// Returns true if an archive member name looks like a delimited-text table.
pub(crate) fn is_table_member(name: &str) -> bool {
    if name.ends_with('/') || name.starts_with("__MACOSX/") {
        return false;
    }
    has_any_suffix(&name.to_ascii_lowercase(), ARCHIVE_MEMBER_SUFFIXES)
}

/// Extracts the file name from the last path segment of a URL.
pub(crate) fn file_name_from_url(url: &Url) -> Result<String, SplitError> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            SplitError::UnsupportedFormat("the URL does not name a file".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_plain_files() {
        assert_eq!(
            classify("orders.csv").unwrap(),
            Container::Plain(TableKind::DelimitedText)
        );
        assert_eq!(
            classify("ORDERS.TSV").unwrap(),
            Container::Plain(TableKind::DelimitedText)
        );
        assert_eq!(
            classify("export.txt").unwrap(),
            Container::Plain(TableKind::DelimitedText)
        );
        assert_eq!(
            classify("book.xlsx").unwrap(),
            Container::Plain(TableKind::Workbook)
        );
        assert_eq!(
            classify("macros.XLSM").unwrap(),
            Container::Plain(TableKind::Workbook)
        );
    }

    #[test]
    fn test_classify_wrapped_files() {
        assert_eq!(
            classify("orders.csv.gz").unwrap(),
            Container::Gzip(TableKind::DelimitedText)
        );
        assert_eq!(
            classify("orders.gz").unwrap(),
            Container::Gzip(TableKind::DelimitedText)
        );
        assert_eq!(
            classify("book.xlsx.gz").unwrap(),
            Container::Gzip(TableKind::Workbook)
        );
        assert_eq!(classify("bundle.zip").unwrap(), Container::Zip);
    }

    #[test]
    fn test_classify_rejects_gzipped_archives() {
        for name in ["data.zip.gz", "twice.csv.gz.gz"] {
            match classify(name) {
                Err(SplitError::UnsupportedFormat(msg)) => assert!(msg.contains(name)),
                other => panic!("Expected UnsupportedFormat for {:?}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_classify_rejects_unknown() {
        for name in ["report.pdf", "noextension", "archive.tar", ""] {
            match classify(name) {
                Err(SplitError::UnsupportedFormat(_)) => {}
                other => panic!("Expected UnsupportedFormat for {:?}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_archive_member_filter() {
        assert!(is_table_member("data.csv"));
        assert!(is_table_member("nested/dir/DATA.CSV"));
        assert!(is_table_member("tabs.tsv"));
        assert!(!is_table_member("README.txt"));
        assert!(!is_table_member("folder.csv/"));
        assert!(!is_table_member("__MACOSX/._data.csv"));
    }

    #[test]
    fn test_file_name_from_url() {
        let url = Url::parse("https://example.com/exports/2024/orders.csv.gz?sig=abc").unwrap();
        assert_eq!(file_name_from_url(&url).unwrap(), "orders.csv.gz");

        let url = Url::parse("https://example.com/").unwrap();
        assert!(matches!(
            file_name_from_url(&url),
            Err(SplitError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_output_extension() {
        assert_eq!(TableKind::DelimitedText.extension(), "csv");
        assert_eq!(TableKind::Workbook.extension(), "xlsx");

        let text = TableKind::DelimitedText;
        assert_eq!(output_extension(text, "orders.csv"), "csv");
        assert_eq!(output_extension(text, "export.txt"), "csv");
        assert_eq!(output_extension(text, "Tabs.TSV"), "tsv");
        assert_eq!(output_extension(text, "tabs.tsv.gz"), "tsv");
        assert_eq!(output_extension(TableKind::Workbook, "macros.xlsm"), "xlsx");
    }
}
