use std::io::prelude::*;

use anyhow::Result;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use lazy_static::lazy_static;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};

lazy_static! {
    static ref HTTP_CLI: reqwest::Client = reqwest::ClientBuilder::new()
        .gzip(true)
        .deflate(true)
        .build()
        .unwrap();
}

/// Page retrieval seam, allows swapping the portal for an in-memory fake in
/// tests.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpFetcher {
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = HTTP_CLI
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?
            .error_for_status()?;

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|c| c.to_str().ok())
            .map(str::to_owned);

        let body = resp.bytes().await?;
        decode_body(url, content_type.as_deref(), &body)
    }
}

/// Listing payloads are served gzip-compressed; store them decompressed.
fn decode_body(url: &str, content_type: Option<&str>, body: &[u8]) -> Result<String> {
    let gzipped = url.ends_with(".gz")
        || matches!(
            content_type,
            Some("application/x-gzip") | Some("application/gzip")
        );

    if gzipped {
        let mut gz = GzDecoder::new(body);
        let mut page = String::new();
        gz.read_to_string(&mut page)?;
        Ok(page)
    } else {
        Ok(String::from_utf8_lossy(body).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    #[test]
    fn decodes_gzip_payloads() {
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(b"id,price\n1,42\n").unwrap();
        let compressed = gz.finish().unwrap();

        let by_suffix = decode_body("https://data.test/fr/listings.csv.gz", None, &compressed);
        assert_eq!(by_suffix.unwrap(), "id,price\n1,42\n");

        let by_content_type =
            decode_body("https://data.test/fr/listings", Some("application/gzip"), &compressed);
        assert_eq!(by_content_type.unwrap(), "id,price\n1,42\n");
    }

    #[test]
    fn passes_plain_text_through() {
        let body = decode_body("https://data.test/index.html", Some("text/html"), b"<html/>");
        assert_eq!(body.unwrap(), "<html/>");
    }

    #[test]
    fn rejects_corrupt_gzip() {
        assert!(decode_body("https://data.test/x.gz", None, b"not gzip").is_err());
    }
}
