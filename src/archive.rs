//! Zip container I/O shared by the DOCX and XLSX readers.

use std::io::{Cursor, Read, Seek, Write as _};

use zip::ZipArchive;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;

use crate::error::Error;

/// One zip entry held in memory, in archive order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry bytes, uncompressed.
    pub data: Vec<u8>,
    /// Entry name, e.g. `word/document.xml`.
    pub name: String,
}

/// Read a single entry by name. Returns `None` when the archive lacks it.
///
/// # Errors
///
/// Returns `Error::Zip` for a corrupt entry or `Error::Io` if reading fails.
pub fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<Vec<u8>>, Error> {
    let mut entry = match archive.by_name(name) {
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(Error::Zip(e)),
        Ok(entry) => entry,
    };
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    return Ok(Some(data));
}

/// Read every entry, preserving archive order.
///
/// # Errors
///
/// Returns `Error::Zip` for corrupt entries or `Error::Io` if reading fails.
pub fn read_all<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<Entry>, Error> {
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        entries.push(Entry { data, name });
    }
    return Ok(entries);
}

/// Serialize entries into an in-memory zip.
/// Media is stored uncompressed and everything else deflated, matching the
/// layout Word itself produces.
///
/// # Errors
///
/// Returns `Error::Zip` or `Error::Io` if the writer fails.
pub fn write_all(entries: &[Entry]) -> Result<Vec<u8>, Error> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let deflated = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for entry in entries {
        let options = if entry.name.contains("/media/") { stored } else { deflated };
        zip.start_file(entry.name.as_str(), options)?;
        zip.write_all(&entry.data)?;
    }

    let cursor = zip.finish()?;
    return Ok(cursor.into_inner());
}
