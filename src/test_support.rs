//! Shared fixtures for unit tests: archive builders and stub validation engines.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;

use crate::orchestrate::validator::{
    ValidationEngine, ValidationOutcome, ValidationRequest, ValidatorError,
};

pub enum Entry<'a> {
    File(&'a str, &'a [u8]),
    Dir(&'a str),
}

pub fn write_zip(path: &Path, entries: &[Entry<'_>]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    for entry in entries {
        match entry {
            Entry::File(name, content) => {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
            Entry::Dir(name) => {
                writer.add_directory(*name, options).unwrap();
            }
        }
    }
    writer.finish().unwrap();
}

pub fn write_tar_gz(path: &Path, entries: &[Entry<'_>]) {
    let gz = flate2::write::GzEncoder::new(File::create(path).unwrap(), flate2::Compression::default());
    let mut builder = tar::Builder::new(gz);
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        match entry {
            Entry::File(name, content) => {
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_entry_type(tar::EntryType::Regular);
                header.set_cksum();
                builder.append_data(&mut header, name, *content).unwrap();
            }
            Entry::Dir(name) => {
                header.set_size(0);
                header.set_mode(0o755);
                header.set_entry_type(tar::EntryType::Directory);
                header.set_cksum();
                builder.append_data(&mut header, name, std::io::empty()).unwrap();
            }
        }
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// Passes every file, echoing its name in the report.
pub struct PassingEngine;

impl ValidationEngine for PassingEngine {
    fn validate(&self, request: &ValidationRequest) -> Result<ValidationOutcome, ValidatorError> {
        Ok(ValidationOutcome::from_report(json!({
            "report": { "valid": true },
            "file": request.file_name(),
            "tenant": request.tenant_id,
        })))
    }
}

/// Fails files whose name contains `needle` with a validator error; passes the rest.
pub struct FailingOnEngine {
    pub needle: &'static str,
}

impl ValidationEngine for FailingOnEngine {
    fn validate(&self, request: &ValidationRequest) -> Result<ValidationOutcome, ValidatorError> {
        if request.file_name().contains(self.needle) {
            return Err(ValidatorError::NonZeroExit {
                code: Some(2),
                stderr: format!("cannot parse {}", request.file_name()),
            });
        }
        PassingEngine.validate(request)
    }
}

/// Panics on files whose name contains `needle`.
pub struct PanickingOnEngine {
    pub needle: &'static str,
}

impl ValidationEngine for PanickingOnEngine {
    fn validate(&self, request: &ValidationRequest) -> Result<ValidationOutcome, ValidatorError> {
        if request.file_name().contains(self.needle) {
            panic!("validator crashed on {}", request.file_name());
        }
        PassingEngine.validate(request)
    }
}

/// Records peak concurrency while sleeping briefly in every call.
#[derive(Default)]
pub struct ConcurrencyTracker {
    running: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl ValidationEngine for ConcurrencyTracker {
    fn validate(&self, request: &ValidationRequest) -> Result<ValidationOutcome, ValidatorError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(20));
        self.running.fetch_sub(1, Ordering::SeqCst);
        PassingEngine.validate(request)
    }
}
