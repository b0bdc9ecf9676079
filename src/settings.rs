use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;
use crate::fetcher::FetchPolicy;
use crate::sites::SiteProfile;

const DEFAULT_CONFIG_NAME: &str = "careers_watch";
const ENV_PREFIX: &str = "WATCH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    /// spider.cloud Chrome rendering
    Spider,
    /// Plain GET, no JavaScript
    Http,
}

/// Per-site overrides, keyed by site key under `sites`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub career_page_url: Option<String>,
}

/// Process-wide settings. Built once before any run and never mutated.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub webhook_url: Option<String>,
    pub webhook_avatar: Option<String>,
    pub webhook_username: String,
    pub webhook_timeout_secs: u64,
    pub history_dir: PathBuf,
    pub fetcher: FetcherKind,
    pub spider_api_key: Option<String>,
    pub fetch_timeout_secs: u64,
    pub suppress_bootstrap_notifications: bool,
    pub sites: HashMap<String, SiteSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_avatar: None,
            webhook_username: "Job Scraper Bot".into(),
            webhook_timeout_secs: 10,
            history_dir: PathBuf::from("job_listings"),
            fetcher: FetcherKind::Spider,
            spider_api_key: None,
            fetch_timeout_secs: 60,
            suppress_bootstrap_notifications: false,
            sites: HashMap::new(),
        }
    }
}

impl Settings {
    /// Layer defaults, the optional config file and `WATCH_*` env vars.
    ///
    /// Nested keys use `__`, e.g. `WATCH_SITES__BOTPRESS__CAREER_PAGE_URL`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let mut settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        if settings.spider_api_key.is_none() {
            settings.spider_api_key = std::env::var("SPIDER_API_KEY").ok();
        }
        Ok(settings)
    }

    /// Resolve and validate the page to fetch for `profile`.
    pub fn career_page_url(&self, profile: &SiteProfile) -> Result<Url, ConfigError> {
        let configured = self
            .sites
            .get(profile.key)
            .and_then(|s| s.career_page_url.as_deref())
            .filter(|s| !s.trim().is_empty());

        let raw = configured
            .or(profile.default_url)
            .ok_or_else(|| ConfigError::MissingUrl(profile.key.to_string()))?;

        parse_http_url(&format!("sites.{}.career_page_url", profile.key), raw)
    }

    /// The webhook endpoint, if one is configured. Empty strings count as unset.
    pub fn webhook(&self) -> Result<Option<Url>, ConfigError> {
        match self.webhook_url.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_http_url("webhook_url", raw).map(Some),
        }
    }

    /// Whole-request bound on one webhook delivery.
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs.max(1))
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            budget: Duration::from_secs(self.fetch_timeout_secs.max(1)),
        }
    }
}

/// Accept only absolute http(s) URLs with a host.
pub fn parse_http_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        field: field.to_string(),
        value: raw.to_string(),
    };

    let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    let has_host = url.host_str().is_some_and(|h| !h.is_empty());
    if !matches!(url.scheme(), "http" | "https") || !has_host {
        return Err(invalid());
    }
    Ok(url)
}
