use std::fmt;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::fs_helpers::sanitize_file_name;

/// Name used when request metadata carries no filename.
pub const DEFAULT_UPLOAD_NAME: &str = "unknown.zip";

static FILENAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"filename="([^"]+)""#).unwrap());

/// Infer the uploaded file name from request metadata
/// (a `Content-Disposition` header or raw multipart preamble).
pub fn infer_file_name(metadata: &str) -> String {
    FILENAME_PATTERN
        .captures(metadata)
        .and_then(|c| c.get(1))
        .map(|m| sanitize_file_name(m.as_str(), DEFAULT_UPLOAD_NAME))
        .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string())
}

/// An uploaded archive held in memory.
///
/// Cloning is cheap: the bytes are shared.
#[derive(Clone)]
pub struct UploadedArchive {
    file_name: String,
    bytes: Arc<[u8]>,
}

impl UploadedArchive {
    pub fn new(file_name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: sanitize_file_name(file_name, DEFAULT_UPLOAD_NAME),
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Build from raw request metadata, inferring the filename.
    pub fn from_request(metadata: &str, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: infer_file_name(metadata),
            bytes: Arc::from(bytes.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn open_stream(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.bytes[..])
    }

    /// Write the full content to `path`, replacing any existing file.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(&self.bytes)?;
        file.flush()
    }

    /// Hex SHA-256 of the content, recorded in the response provenance.
    pub fn sha256_hex(&self) -> String {
        format!("{:x}", Sha256::digest(self.bytes()))
    }
}

impl fmt::Debug for UploadedArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedArchive")
            .field("file_name", &self.file_name)
            .field("size", &self.bytes.len())
            .finish()
    }
}
