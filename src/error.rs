use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate credentials not safe for UI display.
/// Remote sources are often pre-signed URLs, so fetch errors may carry them.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "x-amz-signature",
    "x-amz-credential",
    "sig=",
    "token=",
    "password",
    "authorization:",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for UI display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// User-friendly error presentation for the calling layer.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Every way a split run can fail.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Sheet '{requested}' not found")]
    SheetNotFound {
        requested: String,
        available: Vec<String>,
    },

    #[error("Malformed record {record}: {message}")]
    MalformedRecord {
        /// 1-based record (or sheet row) number.
        record: u64,
        /// 1-based line number, when the format has lines.
        line: Option<u64>,
        message: String,
    },

    #[error("Input is empty")]
    EmptyInput,
}

impl SplitError {
    pub(crate) fn malformed(record: u64, message: impl Into<String>) -> Self {
        SplitError::MalformedRecord {
            record,
            line: None,
            message: message.into(),
        }
    }

    /// Converts the error into a presentation suitable for UI display.
    /// Never leaks signed URL parameters or tokens.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            SplitError::UnsupportedFormat(msg) => ErrorPresentation {
                title: "Unsupported File".into(),
                message: format!(
                    "{}. Supported inputs are .csv, .tsv, .txt, .gz, .zip, .xlsx and .xlsm files.",
                    msg
                ),
                action: Some("Choose a supported file".into()),
            },

            SplitError::SourceUnavailable(msg) => ErrorPresentation {
                title: "Source Unavailable".into(),
                message: sanitize_message(msg, "The file could not be retrieved."),
                action: Some("Check the link or network and retry".into()),
            },

            SplitError::SheetNotFound {
                requested,
                available,
            } => {
                let message = if available.is_empty() {
                    format!("The workbook has no sheet named '{}'.", requested)
                } else {
                    format!(
                        "The workbook has no sheet named '{}'. Available sheets: {}.",
                        requested,
                        available.join(", ")
                    )
                };
                ErrorPresentation {
                    title: "Sheet Not Found".into(),
                    message,
                    action: Some("Enter an existing sheet name or leave it blank".into()),
                }
            }

            SplitError::MalformedRecord {
                record,
                line,
                message,
            } => {
                let location = match line {
                    Some(line) => format!("record {} (line {})", record, line),
                    None => format!("record {}", record),
                };
                ErrorPresentation {
                    title: "Malformed Data".into(),
                    message: format!("The file could not be read at {}: {}", location, message),
                    action: Some("Fix the file and try again".into()),
                }
            }

            SplitError::EmptyInput => ErrorPresentation {
                title: "Empty File".into(),
                message: "The file does not contain any data.".into(),
                action: None,
            },
        }
    }
}

impl Serialize for SplitError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}
