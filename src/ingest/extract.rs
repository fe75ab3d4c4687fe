use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use super::IngestError;
use crate::fs_helpers::ensure_writable_dir;
use crate::ids::InteractionId;

/// Entries are streamed to disk through a buffer of this size.
const COPY_BUFFER_SIZE: usize = 4096;

/// Archive containers we can expand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar_gz",
        }
    }
}

/// What an extraction wrote into the target directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub format: ArchiveFormat,
    pub entries: usize,
    pub files_written: usize,
    pub directories_created: usize,
    pub bytes_written: u64,
}

impl ExtractionSummary {
    fn new(format: ArchiveFormat) -> Self {
        Self {
            format,
            entries: 0,
            files_written: 0,
            directories_created: 0,
            bytes_written: 0,
        }
    }
}

/// Detect the container from magic bytes (NOT the file extension).
pub fn detect_archive_format(path: &Path) -> Result<ArchiveFormat, IngestError> {
    let mut file = File::open(path)?;
    let mut header = [0u8; 4];
    let bytes_read = file.read(&mut header)?;

    match &header[..bytes_read] {
        // Local file header, empty archive (end of central directory), spanned marker
        [0x50, 0x4B, 0x03, 0x04] | [0x50, 0x4B, 0x05, 0x06] | [0x50, 0x4B, 0x07, 0x08] => {
            Ok(ArchiveFormat::Zip)
        }
        // gzip
        [0x1F, 0x8B, ..] => Ok(ArchiveFormat::TarGz),
        _ => Err(IngestError::UnsupportedArchive(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        )),
    }
}

/// Expand `archive_path` into `target_dir`, preserving the archive's directory structure.
///
/// Entries already written are left in place when a later entry fails; the
/// caller's workspace teardown removes them.
pub fn extract(
    archive_path: &Path,
    target_dir: &Path,
    interaction_id: &InteractionId,
) -> Result<ExtractionSummary, IngestError> {
    let size = match fs::metadata(archive_path) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => 0,
    };
    if size == 0 {
        tracing::error!(
            interaction_id = %interaction_id,
            path = %archive_path.display(),
            "Archive does not exist or is empty"
        );
        return Err(IngestError::ArchiveMissingOrEmpty {
            path: archive_path.to_path_buf(),
        });
    }

    ensure_writable_dir(target_dir)?;
    if let Some(parent) = archive_path.parent() {
        ensure_writable_dir(parent)?;
    }

    let format = detect_archive_format(archive_path)?;
    tracing::info!(
        interaction_id = %interaction_id,
        size_bytes = size,
        format = format.as_str(),
        "Extracting archive"
    );

    let result = match format {
        ArchiveFormat::Zip => extract_zip(archive_path, target_dir),
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, target_dir),
    };

    match &result {
        Ok(summary) => tracing::info!(
            interaction_id = %interaction_id,
            entries = summary.entries,
            files = summary.files_written,
            bytes = summary.bytes_written,
            "Archive extracted"
        ),
        Err(IngestError::ArchiveEmpty) => tracing::warn!(
            interaction_id = %interaction_id,
            "Archive contains no entries"
        ),
        Err(e) => tracing::error!(
            interaction_id = %interaction_id,
            error = %e,
            "Archive extraction failed"
        ),
    }
    result
}

fn extract_zip(archive_path: &Path, target_dir: &Path) -> Result<ExtractionSummary, IngestError> {
    let mut archive = zip::ZipArchive::new(File::open(archive_path)?)?;
    if archive.len() == 0 {
        return Err(IngestError::ArchiveEmpty);
    }

    let mut summary = ExtractionSummary::new(ArchiveFormat::Zip);
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let relative = entry_relative_path(Path::new(entry.name()))?;
        let destination = target_dir.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&destination)?;
            summary.directories_created += 1;
        } else {
            if relative.as_os_str().is_empty() {
                return Err(IngestError::UnsafeEntryPath(entry.name().to_string()));
            }
            summary.bytes_written += write_entry(&mut entry, &destination)?;
            summary.files_written += 1;
        }
        summary.entries += 1;
    }
    Ok(summary)
}

fn extract_tar_gz(archive_path: &Path, target_dir: &Path) -> Result<ExtractionSummary, IngestError> {
    let decoder = flate2::read::GzDecoder::new(File::open(archive_path)?);
    let mut archive = tar::Archive::new(decoder);

    let mut summary = ExtractionSummary::new(ArchiveFormat::TarGz);
    // Decode failures surface as io errors from the tar and gzip readers
    for entry in archive.entries().map_err(IngestError::CorruptArchive)? {
        let mut entry = entry.map_err(IngestError::CorruptArchive)?;
        let raw = entry.path().map_err(IngestError::CorruptArchive)?.into_owned();
        let relative = entry_relative_path(&raw)?;
        let destination = target_dir.join(&relative);
        let kind = entry.header().entry_type();

        if kind.is_dir() {
            fs::create_dir_all(&destination)?;
            summary.directories_created += 1;
        } else if kind.is_file() {
            if relative.as_os_str().is_empty() {
                return Err(IngestError::UnsafeEntryPath(raw.display().to_string()));
            }
            summary.bytes_written += write_entry(&mut entry, &destination)?;
            summary.files_written += 1;
        } else {
            tracing::debug!(entry = %raw.display(), "Skipping non-regular tar entry");
        }
        summary.entries += 1;
    }

    if summary.entries == 0 {
        return Err(IngestError::ArchiveEmpty);
    }
    Ok(summary)
}

/// Normalize an entry name to a path relative to the extraction root.
/// Absolute paths and `..` components are rejected.
pub fn entry_relative_path(name: &Path) -> Result<PathBuf, IngestError> {
    let mut relative = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(IngestError::UnsafeEntryPath(name.display().to_string()));
            }
        }
    }
    Ok(relative)
}

/// Stream one entry into a new file. Both ends close when this returns.
///
/// Read errors come from decompression and are reported as a corrupt archive;
/// write errors stay I/O errors.
fn write_entry<R: Read>(reader: &mut R, destination: &Path) -> Result<u64, IngestError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(destination)?);
    let mut buffer = [0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(IngestError::CorruptArchive(e)),
        };
        writer.write_all(&buffer[..read])?;
        total += read as u64;
    }
    writer.flush()?;
    Ok(total)
}
