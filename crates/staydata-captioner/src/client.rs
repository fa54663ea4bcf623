use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaptionError>;

pub const DEFAULT_ENDPOINT: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_MODEL: &str = "Salesforce/blip-image-captioning-large";
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 20;

/// Environment variable holding the bearer token for the inference endpoint.
pub const API_TOKEN_VAR: &str = "CAPTION_API_TOKEN";

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot fetch image {url}: {source}")]
    ImageFetch {
        url: String,
        source: reqwest::Error,
    },

    #[error("inference request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("inference endpoint returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("unexpected inference response: {0}")]
    Parse(String),
}

/// Caption production seam. The model is an opaque collaborator, image in,
/// text out; tests substitute a fake.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Identifies the backend and its generation parameters. Part of the
    /// processing id used by job resume bookkeeping.
    fn describe(&self) -> String;

    async fn caption(&self, image_url: &str) -> Result<String>;
}

/// Client for a hosted image-captioning model: downloads the image bytes and
/// posts them to the inference endpoint.
#[derive(Clone)]
pub struct CaptionClient {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_token: String,
    max_new_tokens: u32,
}

impl CaptionClient {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_token: api_token.into(),
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
        }
    }

    /// Reads the bearer token from [`API_TOKEN_VAR`].
    pub fn from_env() -> Result<Self> {
        let api_token = std::env::var(API_TOKEN_VAR)
            .map_err(|_| CaptionError::Config(format!("{API_TOKEN_VAR} not set")))?;
        Ok(Self::new(api_token))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: u32) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http_client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| CaptionError::ImageFetch {
                url: url.to_string(),
                source,
            })?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Runs inference on raw image bytes and returns the caption text.
    pub async fn caption_image(&self, image: Vec<u8>) -> Result<String> {
        let url = format!("{}/models/{}", self.endpoint, self.model);
        let resp = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_token)
            .query(&[("max_new_tokens", self.max_new_tokens)])
            .body(image)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(CaptionError::Api { status, body });
        }
        parse_generated_text(&body)
    }
}

#[async_trait]
impl CaptionSource for CaptionClient {
    fn describe(&self) -> String {
        format!("{},{},{}", self.endpoint, self.model, self.max_new_tokens)
    }

    async fn caption(&self, image_url: &str) -> Result<String> {
        let image = self.fetch_image(image_url).await?;
        if image.is_empty() {
            return Err(CaptionError::Parse(format!("empty image at {image_url}")));
        }
        self.caption_image(image).await
    }
}

fn parse_generated_text(body: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct Generation {
        generated_text: String,
    }

    let generations: Vec<Generation> = serde_json::from_str(body)
        .map_err(|e| CaptionError::Parse(format!("{e}: {body}")))?;
    generations
        .into_iter()
        .map(|g| g.generated_text.trim().to_string())
        .find(|caption| !caption.is_empty())
        .ok_or_else(|| CaptionError::Parse(format!("no generated text in: {body}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generated_text() {
        let body = r#"[{"generated_text": " a bedroom with a large bed "}]"#;
        assert_eq!(
            parse_generated_text(body).unwrap(),
            "a bedroom with a large bed"
        );
    }

    #[test]
    fn rejects_empty_generations() {
        assert!(parse_generated_text("[]").is_err());
        assert!(parse_generated_text(r#"[{"generated_text": "  "}]"#).is_err());
    }

    #[test]
    fn rejects_non_json_bodies() {
        assert!(parse_generated_text("<html>Bad Gateway</html>").is_err());
    }
}
