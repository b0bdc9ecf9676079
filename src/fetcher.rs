use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use spider_client::shapes::request::{RequestType, ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ConfigError, FetchError};

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// How long a single fetch, rendering included, may take.
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub budget: Duration,
}

/// Turns a URL into final rendered markup.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, policy: &FetchPolicy) -> Result<String, FetchError>;
}

/// Run `fut` under the policy budget.
async fn bounded<F>(url: &Url, policy: &FetchPolicy, fut: F) -> Result<String, FetchError>
where
    F: Future<Output = Result<String, FetchError>>,
{
    match tokio::time::timeout(policy.budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            secs: policy.budget.as_secs(),
        }),
    }
}

/// Chrome rendering through spider.cloud. A client session lives only for
/// the duration of one `fetch`.
pub struct SpiderFetcher {
    api_key: String,
}

impl SpiderFetcher {
    pub fn new(api_key: Option<String>) -> Result<Self, ConfigError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingSetting("spider_api_key"))?;
        Ok(Self { api_key })
    }

    async fn render_with_retry(&self, url: &Url) -> Result<String, FetchError> {
        let spider = Spider::new(Some(self.api_key.clone()))
            .map_err(|e| FetchError::Unavailable(format!("spider client: {}", e)))?;

        let mut attempt = 0;
        loop {
            match render_once(&spider, url).await {
                Ok(html) => return Ok(html),
                Err(reason) if is_retryable(&reason) && attempt < MAX_RETRIES => {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        "Rate limited on {} (attempt {}/{}), backing off {:.1}s",
                        url,
                        attempt + 1,
                        MAX_RETRIES,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(reason) => {
                    return Err(FetchError::Failed {
                        url: url.to_string(),
                        reason,
                    })
                }
            }
        }
    }
}

#[async_trait]
impl PageFetcher for SpiderFetcher {
    async fn fetch(&self, url: &Url, policy: &FetchPolicy) -> Result<String, FetchError> {
        let result = bounded(url, policy, self.render_with_retry(url)).await;
        debug!("Released spider session for {}", url);
        result
    }
}

fn is_retryable(reason: &str) -> bool {
    ["429", "rate", "500", "502", "503"]
        .iter()
        .any(|code| reason.contains(code))
}

async fn render_once(spider: &Spider, url: &Url) -> Result<String, String> {
    let params = RequestParams {
        request: Some(RequestType::Chrome),
        return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
        ..Default::default()
    };

    let value = spider
        .scrape_url(url.as_str(), Some(params), "application/json")
        .await
        .map_err(|e| e.to_string())?;

    parse_spider_response(value)
}

/// Pull the page markup out of a scrape response. The body may arrive as
/// JSON or as a string holding JSON; either an array of page objects or a
/// single object. Error text carries the upstream status so `is_retryable`
/// can classify it.
fn parse_spider_response(value: serde_json::Value) -> Result<String, String> {
    let parsed = match value {
        serde_json::Value::String(s) => {
            serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s))
        }
        other => other,
    };
    let first = match &parsed {
        serde_json::Value::Array(arr) => arr.first(),
        obj @ serde_json::Value::Object(_) => Some(obj),
        _ => None,
    };

    if let Some(status) = first.and_then(|obj| obj.get("status")).and_then(|s| s.as_i64()) {
        if status >= 400 {
            return Err(format!("upstream status {}", status));
        }
    }

    first
        .and_then(|obj| obj.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| "no content in spider response".to_string())
}

/// Plain GET for pages that render server-side.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, policy: &FetchPolicy) -> Result<String, FetchError> {
        let failed = |e: reqwest::Error| FetchError::Failed {
            url: url.to_string(),
            reason: e.to_string(),
        };
        bounded(url, policy, async {
            self.client
                .get(url.clone())
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(failed)?
                .text()
                .await
                .map_err(failed)
        })
        .await
    }
}

/// Cloudflare interstitials render fine but contain no postings.
pub fn looks_challenged(markup: &str) -> bool {
    let lower = markup.to_lowercase();
    lower.contains("cloudflare") && lower.contains("challenge")
}
