mod config;
mod crawler;
mod fetch;
mod site;
mod store;

pub use config::{CrawlerConfig, OnError, DEFAULT_ROOT_URL};
pub use crawler::{crawl_site, crawl_with, CrawlStats};
pub use fetch::{Fetcher, HttpFetcher};
pub use site::{CountrySection, ListingPage};
pub use store::PageStore;

pub use anyhow;
