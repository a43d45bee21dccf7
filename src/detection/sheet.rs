//! Target sheet resolution for workbooks.

use tracing::debug;

use crate::error::SplitError;

/// Picks the sheet to split from the workbook's sheet names.
///
/// An explicit name must match exactly; otherwise the first sheet is used.
///
/// # Errors
///
/// - `SheetNotFound` if `requested` is not among `available`
/// - `EmptyInput` if the workbook has no sheets at all
pub fn resolve_sheet(available: &[String], requested: Option<&str>) -> Result<String, SplitError> {
    match requested {
        Some(name) => {
            if available.iter().any(|sheet| sheet == name) {
                debug!(sheet = name, "Using requested sheet");
                Ok(name.to_string())
            } else {
                Err(SplitError::SheetNotFound {
                    requested: name.to_string(),
                    available: available.to_vec(),
                })
            }
        }
        None => {
            let first = available.first().ok_or(SplitError::EmptyInput)?;
            debug!(sheet = %first, "Using first sheet");
            Ok(first.clone())
        }
    }
}
