use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{IngestError, EXPECTED_EXTENSION};

pub const REASON_UNEXPECTED_TYPE: &str = "unexpected file type";
pub const REASON_ASSET_CONFLICT: &str = "conflicts with validation asset";

/// A file present in the archive but excluded from validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotProcessedFile {
    pub file_name: String,
    pub reason: String,
}

impl NotProcessedFile {
    pub fn new(file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            reason: reason.into(),
        }
    }
}

/// Partition of the top-level regular files of a directory.
/// Every file lands in exactly one of the two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Absolute paths, ordered by file name.
    pub processable: Vec<PathBuf>,
    pub not_processed: Vec<NotProcessedFile>,
}

impl Classification {
    pub fn total(&self) -> usize {
        self.processable.len() + self.not_processed.len()
    }

    pub fn processable_names(&self) -> Vec<String> {
        self.processable.iter().map(|p| display_name(p)).collect()
    }
}

/// File name of a path for result keys and logs.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn is_expected_type(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(EXPECTED_EXTENSION))
}

/// Classify the direct children of `directory`. Not recursive.
pub fn classify(directory: &Path) -> Result<Classification, IngestError> {
    classify_reserving(directory, &[])
}

/// Like [`classify`], but files named like a validation asset in `reserved`
/// are reported as not processed, since provisioning replaces them.
pub fn classify_reserving(
    directory: &Path,
    reserved: &[String],
) -> Result<Classification, IngestError> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        files.push((name, entry.path()));
    }
    // read_dir order is platform-dependent
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut classification = Classification::default();
    for (name, path) in files {
        if reserved.iter().any(|r| r == &name) {
            classification
                .not_processed
                .push(NotProcessedFile::new(name, REASON_ASSET_CONFLICT));
        } else if is_expected_type(&path) {
            classification.processable.push(std::path::absolute(&path)?);
        } else {
            classification
                .not_processed
                .push(NotProcessedFile::new(name, REASON_UNEXPECTED_TYPE));
        }
    }

    if classification.processable.is_empty() {
        tracing::warn!(dir = %directory.display(), "No CSV files found in directory");
    } else {
        tracing::debug!(
            dir = %directory.display(),
            processable = classification.processable.len(),
            not_processed = classification.not_processed.len(),
            "Directory classified"
        );
    }
    Ok(classification)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn batch_scenario_partitions_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "patients.csv");
        touch(dir.path(), "notes.txt");
        fs::create_dir(dir.path().join("tmp")).unwrap();

        let result = classify(dir.path()).unwrap();
        assert_eq!(result.processable, vec![dir.path().join("patients.csv")]);
        assert_eq!(
            result.not_processed,
            vec![NotProcessedFile::new("notes.txt", REASON_UNEXPECTED_TYPE)]
        );
        assert_eq!(result.total(), 2);
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "UPPER.CSV");
        touch(dir.path(), "Mixed.Csv");
        touch(dir.path(), "csv");
        touch(dir.path(), "data.csv.bak");

        let result = classify(dir.path()).unwrap();
        assert_eq!(result.processable_names(), vec!["Mixed.Csv", "UPPER.CSV"]);
        let rejected: Vec<_> = result.not_processed.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(rejected, vec!["csv", "data.csv.bak"]);
    }

    #[test]
    fn nested_csvs_are_not_classified() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("group1")).unwrap();
        touch(&dir.path().join("group1"), "inner.csv");
        touch(dir.path(), "top.csv");

        let result = classify(dir.path()).unwrap();
        assert_eq!(result.processable_names(), vec!["top.csv"]);
        assert!(result.not_processed.is_empty());
    }

    #[test]
    fn every_file_lands_in_exactly_one_list() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["a.csv", "b.json", "c.CSV", "d", "e.xlsx", "f.csv"];
        for name in names {
            touch(dir.path(), name);
        }

        let result = classify(dir.path()).unwrap();
        assert_eq!(result.total(), names.len());

        let mut seen: Vec<String> = result.processable_names();
        seen.extend(result.not_processed.iter().map(|f| f.file_name.clone()));
        seen.sort();
        let mut expected: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn ordering_is_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["z.csv", "m.csv", "a.csv", "k.txt", "b.txt"] {
            touch(dir.path(), name);
        }
        let first = classify(dir.path()).unwrap();
        let second = classify(dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.processable_names(), vec!["a.csv", "m.csv", "z.csv"]);
    }

    #[test]
    fn asset_named_files_are_reported_not_processed() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "patients.csv");
        touch(dir.path(), "validate.py");
        touch(dir.path(), "datapackage.json");
        touch(dir.path(), "notes.txt");

        let reserved = vec!["validate.py".to_string(), "datapackage.json".to_string()];
        let result = classify_reserving(dir.path(), &reserved).unwrap();
        assert_eq!(result.processable_names(), vec!["patients.csv"]);
        assert_eq!(
            result.not_processed,
            vec![
                NotProcessedFile::new("datapackage.json", REASON_ASSET_CONFLICT),
                NotProcessedFile::new("notes.txt", REASON_UNEXPECTED_TYPE),
                NotProcessedFile::new("validate.py", REASON_ASSET_CONFLICT),
            ]
        );
        assert_eq!(result.total(), 4);
    }

    #[test]
    fn reserved_name_wins_over_csv_extension() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "schema.csv");

        let result = classify_reserving(dir.path(), &["schema.csv".to_string()]).unwrap();
        assert!(result.processable.is_empty());
        assert_eq!(
            result.not_processed,
            vec![NotProcessedFile::new("schema.csv", REASON_ASSET_CONFLICT)]
        );
    }

    #[test]
    fn empty_directory_yields_empty_classification() {
        let dir = tempfile::tempdir().unwrap();
        let result = classify(dir.path()).unwrap();
        assert_eq!(result, Classification::default());
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            classify(&dir.path().join("missing")),
            Err(IngestError::Io(_))
        ));
    }

    #[test]
    fn not_processed_serializes_camel_case() {
        let json = serde_json::to_string(&NotProcessedFile::new("notes.txt", "unexpected file type")).unwrap();
        assert_eq!(json, r#"{"fileName":"notes.txt","reason":"unexpected file type"}"#);
    }
}
