pub mod client;
pub mod job;
pub mod record;
pub mod status;

pub use client::{CaptionClient, CaptionError, CaptionSource};
pub use job::{CaptionJobConfig, CsvCaptionJob, JobStats};
pub use record::{caption_urls, CaptionRecord};
pub use status::{FileStatus, StatusFile};

pub use anyhow;
