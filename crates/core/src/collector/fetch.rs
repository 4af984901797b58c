use crate::error::{PipelineError, Result};
use anyhow::Context;
use encoding_rs::{Encoding, UTF_8};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; stockpipe/0.1)";

// Charset declarations live in <head>; no need to look further.
const META_SNIFF_BYTES: usize = 2048;

#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    /// Retrieve one document and return it decoded to UTF-8.
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    http: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn from_env() -> anyhow::Result<Self> {
        let timeout_secs = std::env::var("FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let user_agent = std::env::var("FETCH_USER_AGENT")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        Self::new(Duration::from_secs(timeout_secs), &user_agent)
    }

    pub fn new(timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("failed to build page fetcher http client")?;

        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        tracing::debug!(%url, "visiting");

        let res = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| PipelineError::fetch(url, e))?;

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let bytes = res.bytes().await.map_err(|e| PipelineError::fetch(url, e))?;
        Ok(decode_body(&bytes, content_type.as_deref()))
    }
}

/// Decode a response body using the `Content-Type` charset, then a `<meta>` charset
/// declaration, falling back to UTF-8. Unknown labels are skipped, not trusted.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| {
            sniff_meta_charset(bytes).and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .unwrap_or(UTF_8);

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!(
            encoding = encoding.name(),
            "page contained malformed byte sequences"
        );
    }
    text.into_owned()
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn sniff_meta_charset(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(META_SNIFF_BYTES)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let start = head.find("charset=")? + "charset=".len();

    let label: String = head[start..]
        .trim_start_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    (!label.is_empty()).then_some(label)
}
