//! Input staging: turns any accepted input into one plain local table file.
//!
//! The staged file lives in a run-scoped temporary directory that is removed
//! when the [`StagedTable`] is dropped, whatever way the run ends.

mod archive;
mod fetch;
mod source;

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::config::StagingConfig;
use crate::error::SplitError;

pub use source::{InputSource, TableKind};

use source::Container;

#[cfg(test)]
pub(crate) use archive::tests::{gzip_bytes, zip_bytes};

/// Base name of the staged table inside the run workspace.
const STAGED_STEM: &str = "table";

/// A plain, decompressed table file owned by one run.
#[derive(Debug)]
pub struct StagedTable {
    workspace: TempDir,
    path: PathBuf,
    kind: TableKind,
    output_extension: &'static str,
    source_name: String,
}

impl StagedTable {
    /// Path of the staged table file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base format of the staged table.
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Extension for the output parts (`csv`, `tsv` or `xlsx`).
    pub fn output_extension(&self) -> &'static str {
        self.output_extension
    }

    /// File name the input arrived with.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Run-scoped scratch directory, removed on drop.
    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }
}

/// Creates the run-scoped workspace.
fn create_workspace() -> Result<TempDir, SplitError> {
    tempfile::Builder::new()
        .prefix("halfsplit-")
        .tempdir()
        .map_err(|e| SplitError::SourceUnavailable(format!("Failed to create workspace: {}", e)))
}

/// Stages an input source into a plain local table.
///
/// Remote sources are classified by the last URL path segment before any
/// request is made, then streamed to disk. Decompression and extraction run
/// on the blocking pool.
///
/// # Errors
///
/// - `UnsupportedFormat` for unrecognized names or unreadable containers
/// - `SourceUnavailable` for fetch failures and local staging I/O failures
/// - `EmptyInput` if the staged table has no bytes
pub async fn stage(source: InputSource, config: &StagingConfig) -> Result<StagedTable, SplitError> {
    let buffer_size = config.buffer_size;

    let staged = match source {
        InputSource::Bytes { file_name, data } => {
            let container = source::classify(&file_name)?;
            let workspace = create_workspace()?;
            info!(
                "[STAGE] Staging upload '{}' ({} bytes, {:?})",
                file_name,
                data.len(),
                container
            );

            tokio::task::spawn_blocking(move || {
                stage_container(workspace, Cursor::new(data), None, container, file_name, buffer_size)
            })
            .await
            .map_err(|e| SplitError::SourceUnavailable(format!("Staging task failed: {}", e)))??
        }
        InputSource::Url(raw) => {
            let url = fetch::parse_remote_url(&raw)?;
            let file_name = source::file_name_from_url(&url)?;
            let container = source::classify(&file_name)?;
            let workspace = create_workspace()?;
            info!(
                "[STAGE] Fetching remote '{}' ({:?})",
                fetch::sanitize_url_for_logs(&url),
                container
            );

            let download_path = workspace.path().join("download");
            fetch::download(&url, &download_path, config).await?;

            tokio::task::spawn_blocking(move || {
                let file = File::open(&download_path).map_err(|e| {
                    SplitError::SourceUnavailable(format!("Failed to reopen download: {}", e))
                })?;
                stage_container(
                    workspace,
                    file,
                    Some(download_path),
                    container,
                    file_name,
                    buffer_size,
                )
            })
            .await
            .map_err(|e| SplitError::SourceUnavailable(format!("Staging task failed: {}", e)))??
        }
    };

    let size = std::fs::metadata(staged.path())
        .map_err(|e| SplitError::SourceUnavailable(format!("Failed to inspect staged file: {}", e)))?
        .len();
    if size == 0 {
        return Err(SplitError::EmptyInput);
    }

    debug!(
        path = %staged.path().display(),
        kind = ?staged.kind(),
        bytes = size,
        "Staged table ready"
    );

    Ok(staged)
}

/// Unwraps `reader` according to `container` into the workspace.
///
/// `existing` is the on-disk location of `reader` if it already is a file in
/// the workspace, letting plain downloads skip a copy.
fn stage_container<R: Read + Seek>(
    workspace: TempDir,
    reader: R,
    existing: Option<PathBuf>,
    container: Container,
    source_name: String,
    buffer_size: usize,
) -> Result<StagedTable, SplitError> {
    let kind = match container {
        Container::Plain(kind) | Container::Gzip(kind) => kind,
        Container::Zip => TableKind::DelimitedText,
    };
    let staged_path = workspace
        .path()
        .join(format!("{}.{}", STAGED_STEM, kind.extension()));

    let (path, output_extension) = match (container, existing) {
        (Container::Plain(_), Some(existing)) => {
            (existing, source::output_extension(kind, &source_name))
        }
        (Container::Plain(_), None) => {
            archive::copy_in_chunks(reader, &staged_path, buffer_size, "Input")?;
            (staged_path, source::output_extension(kind, &source_name))
        }
        (Container::Gzip(_), _) => {
            archive::gunzip(reader, &staged_path, buffer_size)?;
            (staged_path, source::output_extension(kind, &source_name))
        }
        (Container::Zip, _) => {
            let member = archive::extract_single_member(reader, &staged_path, buffer_size)?;
            (staged_path, source::output_extension(kind, &member))
        }
    };

    Ok(StagedTable {
        workspace,
        path,
        kind,
        output_extension,
        source_name,
    })
}
