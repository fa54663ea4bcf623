use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::client::CaptionSource;
use crate::status::{FileStatus, StatusFile};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionJobConfig {
    /// Input column holding the image URLs.
    #[serde(default = "default_url_column")]
    pub url_column: String,

    /// Column appended to the output with the generated captions.
    #[serde(default = "default_caption_column")]
    pub caption_column: String,

    /// Number of records between two status checkpoints.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for CaptionJobConfig {
    fn default() -> Self {
        Self {
            url_column: default_url_column(),
            caption_column: default_caption_column(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_url_column() -> String {
    String::from("picture_url")
}

fn default_caption_column() -> String {
    String::from("picture_description")
}

fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub files: usize,
    pub records: usize,
    pub captioned: usize,
    pub failed: usize,
}

/// Captions the images referenced from CSV files, record by record, writing
/// each input record back out with a caption column appended. Progress is
/// checkpointed in a [`StatusFile`] after every batch, so finished files and
/// already written batches are skipped when a run is repeated or resumed.
pub struct CsvCaptionJob<S> {
    config: CaptionJobConfig,
    source: S,
    status: StatusFile,
}

impl<S> CsvCaptionJob<S>
where
    S: CaptionSource,
{
    pub fn new(
        config: CaptionJobConfig,
        source: S,
        status_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            bail!("batch size must be positive");
        }
        Ok(Self {
            config,
            source,
            status: StatusFile::load(status_path)?,
        })
    }

    pub async fn process_files(
        &mut self,
        files: &[PathBuf],
        out_paths: &[PathBuf],
    ) -> Result<JobStats> {
        if files.len() != out_paths.len() {
            bail!(
                "got {} input files but {} output paths",
                files.len(),
                out_paths.len()
            );
        }
        let mut stats = JobStats::default();
        for (file_path, out_path) in files.iter().zip(out_paths) {
            let file_stats = self.process_file(file_path, out_path).await?;
            stats.files += file_stats.files;
            stats.records += file_stats.records;
            stats.captioned += file_stats.captioned;
            stats.failed += file_stats.failed;
        }
        Ok(stats)
    }

    pub async fn process_file(&mut self, file_path: &Path, out_path: &Path) -> Result<JobStats> {
        let mut stats = JobStats::default();
        let pid = self.processing_id(file_path, out_path);
        let mut f_status = self
            .status
            .get(&pid)
            .cloned()
            .unwrap_or_else(|| FileStatus::new(file_path, out_path));

        if f_status.is_done {
            log::info!("skipping {}, already processed", file_path.display());
            return Ok(stats);
        }
        if out_path.exists() && f_status.n_batches == 0 {
            bail!(
                "output file {} already exists with no recorded progress, refusing to append",
                out_path.display()
            );
        }

        let mut reader = csv::Reader::from_path(file_path)
            .with_context(|| format!("cannot open input file {}", file_path.display()))?;
        let headers = reader.headers()?.clone();
        let url_idx = headers
            .iter()
            .position(|h| h == self.config.url_column)
            .with_context(|| {
                format!(
                    "column {} not found in {}",
                    self.config.url_column,
                    file_path.display()
                )
            })?;

        let out_file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(out_path)
            .with_context(|| format!("cannot open output file {}", out_path.display()))?;
        let mut writer = csv::Writer::from_writer(out_file);

        if f_status.n_batches == 0 {
            let mut out_headers = headers.clone();
            out_headers.push_field(&self.config.caption_column);
            writer.write_record(&out_headers)?;
        }

        let mut bid: u64 = 0;
        let mut records = reader.records();
        loop {
            let mut batch = Vec::with_capacity(self.config.batch_size);
            while batch.len() < self.config.batch_size {
                match records.next() {
                    Some(record) => batch.push(record?),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            bid += 1;
            if bid <= f_status.n_batches {
                // Resume: this batch is already in the output file.
                continue;
            }

            let started = Instant::now();
            for record in &batch {
                stats.records += 1;
                let caption = match record.get(url_idx).filter(|url| !url.is_empty()) {
                    Some(url) => match self.source.caption(url).await {
                        Ok(caption) => {
                            log::info!("captioned {url}");
                            stats.captioned += 1;
                            caption
                        }
                        Err(e) => {
                            log::warn!("no caption for {url}: {e}");
                            stats.failed += 1;
                            String::new()
                        }
                    },
                    None => {
                        log::warn!(
                            "record without a {} value in {}",
                            self.config.url_column,
                            file_path.display()
                        );
                        stats.failed += 1;
                        String::new()
                    }
                };
                let mut out_record = record.clone();
                out_record.push_field(&caption);
                writer.write_record(&out_record)?;
            }
            writer.flush()?;

            let elapsed = started.elapsed().as_secs_f64();
            log::info!("done batch {bid} of {} in {elapsed:.2}s", file_path.display());
            f_status.n_batches = bid;
            f_status.batch_secs.push(elapsed);
            self.status.record(pid.clone(), f_status.clone())?;
        }

        f_status.is_done = true;
        self.status.record(pid, f_status)?;
        log::info!("finished {} with {bid} batches", file_path.display());
        stats.files = 1;
        Ok(stats)
    }

    /// Identifier of one processing job. Captioning parameters are part of
    /// it, the same file captioned with another model is another job.
    pub fn processing_id(&self, file_path: &Path, out_path: &Path) -> String {
        format!(
            "{},{}|{}|{}",
            self.source.describe(),
            self.config.batch_size,
            file_path.display(),
            out_path.display()
        )
    }
}
