use serde::{Deserialize, Serialize};

use crate::client::CaptionSource;

/// One successful inference: the image the caption was produced for, and the
/// caption text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionRecord {
    pub source: String,
    pub caption: String,
}

/// Captions a collection of image URLs, one after the other. Failures are
/// logged and the image is skipped, the run continues.
pub async fn caption_urls<S>(source: &S, urls: &[String]) -> Vec<CaptionRecord>
where
    S: CaptionSource,
{
    let mut records = Vec::with_capacity(urls.len());
    for url in urls {
        match source.caption(url).await {
            Ok(caption) => {
                log::info!("captioned {url}");
                records.push(CaptionRecord {
                    source: url.clone(),
                    caption,
                });
            }
            Err(e) => log::warn!("skipping {url}: {e}"),
        }
    }
    records
}
