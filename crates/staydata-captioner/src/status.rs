use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Progress of one input/output file pair, keyed by processing id in the
/// status file. Batches up to `n_batches` are already in the output file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileStatus {
    pub file_path: PathBuf,
    pub out_path: PathBuf,
    pub n_batches: u64,
    pub is_done: bool,
    pub batch_secs: Vec<f64>,
}

impl FileStatus {
    pub fn new(file_path: impl Into<PathBuf>, out_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            out_path: out_path.into(),
            ..Default::default()
        }
    }
}

/// JSON-backed bookkeeping of captioning jobs, saved after every batch so an
/// interrupted run resumes where it stopped.
#[derive(Debug)]
pub struct StatusFile {
    path: PathBuf,
    entries: BTreeMap<String, FileStatus>,
}

impl StatusFile {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("malformed status file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no status file at {}, starting fresh", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("cannot read status file {}", path.display()))
            }
        };
        Ok(Self { path, entries })
    }

    pub fn get(&self, processing_id: &str) -> Option<&FileStatus> {
        self.entries.get(processing_id)
    }

    /// Records the new status for a job and writes the whole file out.
    pub fn record(&mut self, processing_id: impl Into<String>, status: FileStatus) -> Result<()> {
        self.entries.insert(processing_id.into(), status);
        let content = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, content)
            .with_context(|| format!("cannot write status file {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let status = StatusFile::load(tmp.path().join("status.json")).unwrap();
        assert!(status.get("anything").is_none());
    }

    #[test]
    fn survives_a_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("status.json");

        let mut status = StatusFile::load(&path).unwrap();
        let mut entry = FileStatus::new("in.csv", "out.csv");
        entry.n_batches = 3;
        entry.batch_secs = vec![0.5, 0.7, 0.4];
        status.record("model|in.csv|out.csv", entry.clone()).unwrap();

        let reloaded = StatusFile::load(&path).unwrap();
        assert_eq!(reloaded.get("model|in.csv|out.csv"), Some(&entry));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("status.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(StatusFile::load(&path).is_err());
    }
}
