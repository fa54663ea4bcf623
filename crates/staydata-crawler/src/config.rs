use std::cmp;

use serde::{Deserialize, Serialize};

/// Index page of the listings data portal that the crawler walks by default.
pub const DEFAULT_ROOT_URL: &str = "https://insideairbnb.com/get-the-data/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_root_url")]
    pub root_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum number of listing payloads downloaded at once within a country.
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,

    #[serde(default = "default_on_dl_error")]
    pub on_dl_error: OnError,

    #[serde(default = "default_on_parse_error")]
    pub on_parse_error: OnError,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            root_url: default_root_url(),
            user_agent: default_user_agent(),
            concurrent_downloads: default_concurrent_downloads(),
            on_dl_error: default_on_dl_error(),
            on_parse_error: default_on_parse_error(),
        }
    }
}

fn default_root_url() -> String {
    String::from(DEFAULT_ROOT_URL)
}

fn default_user_agent() -> String {
    String::from("staydatabot")
}

fn default_concurrent_downloads() -> usize {
    cmp::max(1, num_cpus::get().saturating_sub(2))
}

fn default_on_dl_error() -> OnError {
    OnError::SkipAndLog
}

fn default_on_parse_error() -> OnError {
    OnError::SkipAndLog
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ArgEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}
