//! Chunked decompression and archive extraction.
//!
//! Everything here streams through a fixed-size buffer; neither the
//! compressed nor the decompressed content is ever held whole in memory.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tracing::debug;
use zip::ZipArchive;

use crate::error::SplitError;
use crate::staging::source::{is_table_member, ARCHIVE_MEMBER_SUFFIXES};

/// Copies `reader` into a new file at `dest` in `buffer_size` chunks.
///
/// Read failures mean the input could not be decoded and map to
/// `UnsupportedFormat`; write failures map to `SourceUnavailable`.
pub(crate) fn copy_in_chunks<R: Read>(
    mut reader: R,
    dest: &Path,
    buffer_size: usize,
    what: &str,
) -> Result<u64, SplitError> {
    let file = File::create(dest).map_err(|e| {
        SplitError::SourceUnavailable(format!("Failed to create staging file: {}", e))
    })?;
    let mut writer = BufWriter::with_capacity(buffer_size, file);
    let mut buffer = vec![0u8; buffer_size];
    let mut total: u64 = 0;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(SplitError::UnsupportedFormat(format!(
                    "{} could not be decoded: {}",
                    what, e
                )))
            }
        };
        writer.write_all(&buffer[..read]).map_err(|e| {
            SplitError::SourceUnavailable(format!("Failed to write staging file: {}", e))
        })?;
        total += read as u64;
    }

    writer.flush().map_err(|e| {
        SplitError::SourceUnavailable(format!("Failed to flush staging file: {}", e))
    })?;

    Ok(total)
}

/// Decompresses a gzip stream (including multi-member streams) into `dest`.
pub(crate) fn gunzip<R: Read>(
    reader: R,
    dest: &Path,
    buffer_size: usize,
) -> Result<u64, SplitError> {
    let decoder = MultiGzDecoder::new(reader);
    let written = copy_in_chunks(decoder, dest, buffer_size, "Gzip stream")?;
    debug!(bytes = written, "Decompressed gzip input");
    Ok(written)
}

/// Extracts the single delimited-text member of a zip archive into `dest`,
/// returning the member's name.
///
/// Fails with `UnsupportedFormat` when the archive is unreadable or has zero
/// or several table members.
pub(crate) fn extract_single_member<R: Read + Seek>(
    reader: R,
    dest: &Path,
    buffer_size: usize,
) -> Result<String, SplitError> {
    let mut archive = ZipArchive::new(reader).map_err(|e| {
        SplitError::UnsupportedFormat(format!("Not a readable zip archive: {}", e))
    })?;

    let mut candidates: Vec<(usize, String)> = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(|e| {
            SplitError::UnsupportedFormat(format!("Corrupt zip entry {}: {}", index, e))
        })?;
        if !entry.is_dir() && is_table_member(entry.name()) {
            candidates.push((index, entry.name().to_string()));
        }
    }

    let (index, name) = match candidates.as_slice() {
        [single] => single.clone(),
        [] => {
            return Err(SplitError::UnsupportedFormat(format!(
                "The zip archive contains no {} file",
                ARCHIVE_MEMBER_SUFFIXES.join(" or ")
            )))
        }
        many => {
            let names: Vec<&str> = many.iter().map(|(_, name)| name.as_str()).collect();
            return Err(SplitError::UnsupportedFormat(format!(
                "The zip archive must contain exactly one table file, found {}: {}",
                many.len(),
                names.join(", ")
            )));
        }
    };

    let entry = archive.by_index(index).map_err(|e| {
        SplitError::UnsupportedFormat(format!("Corrupt zip entry '{}': {}", name, e))
    })?;
    let written = copy_in_chunks(entry, dest, buffer_size, "Zip member")?;

    debug!(member = %name, bytes = written, "Extracted zip member");
    Ok(name)
}
