//! Per-run configuration.
//!
//! Every value here is built fresh for each call; nothing is shared between runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Buffer size for decompression, extraction and file I/O (64 KB).
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Size of the leading sample used for dialect detection (64 KB).
pub const DETECTION_SAMPLE_SIZE: usize = 64 * 1024;

/// Default timeout for fetching a remote source, in seconds.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

/// User agent string for remote retrieval.
const CLIENT_USER_AGENT: &str = concat!("halfsplit/", env!("CARGO_PKG_VERSION"));

// ─────────────────────────────────────────────────────────────────────────────
// TextEncoding
// ─────────────────────────────────────────────────────────────────────────────

/// Character encoding of a delimited-text source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    /// UTF-8. A leading byte-order mark is tolerated and dropped.
    #[default]
    Utf8,
    /// UTF-8 with a byte-order mark. Outputs are written with one.
    Utf8Sig,
    /// ISO-8859-1. Every byte is a valid character.
    Latin1,
}

impl TextEncoding {
    /// Whether fields must be valid UTF-8.
    pub fn requires_utf8(self) -> bool {
        matches!(self, TextEncoding::Utf8 | TextEncoding::Utf8Sig)
    }

    /// Whether outputs should begin with a UTF-8 byte-order mark.
    pub fn writes_bom(self) -> bool {
        self == TextEncoding::Utf8Sig
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SplitOptions
// ─────────────────────────────────────────────────────────────────────────────

/// Caller-facing options for a split run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOptions {
    /// Sheet to split (workbooks only). `None` or blank selects the first sheet.
    pub sheet_name: Option<String>,
    /// Whether the first record is a header to repeat in both parts.
    pub has_header: bool,
    /// Encoding of delimited-text input. Ignored for workbooks.
    pub encoding: TextEncoding,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            sheet_name: None,
            has_header: true,
            encoding: TextEncoding::default(),
        }
    }
}

impl SplitOptions {
    /// Sets the sheet to split.
    pub fn sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = Some(name.into());
        self
    }

    /// Sets whether the first record is a header.
    pub fn has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Sets the text encoding.
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Returns the requested sheet name, treating blank input as absent.
    pub(crate) fn requested_sheet(&self) -> Option<&str> {
        self.sheet_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StagingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Tuning for the staging and detection steps.
#[derive(Debug, Clone)]
pub struct StagingConfig {
    /// Hard limit for retrieving a remote source.
    pub fetch_timeout: Duration,
    /// Chunk size for decompression and extraction.
    pub buffer_size: usize,
    /// Bytes read from the start of a text source for dialect detection.
    pub sample_size: usize,
    /// User agent sent with remote requests.
    pub user_agent: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            buffer_size: BUFFER_SIZE,
            sample_size: DETECTION_SAMPLE_SIZE,
            user_agent: CLIENT_USER_AGENT.to_string(),
        }
    }
}

impl StagingConfig {
    /// Sets the fetch timeout.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sets the detection sample size.
    pub fn sample_size(mut self, bytes: usize) -> Self {
        self.sample_size = bytes.max(1);
        self
    }

    /// Sets the I/O chunk size.
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes.max(1);
        self
    }
}
