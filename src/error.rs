use std::path::PathBuf;

use thiserror::Error;

/// Pre-flight configuration problems. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown site '{0}'")]
    UnknownSite(String),

    #[error("no career page URL configured for site '{0}'")]
    MissingUrl(String),

    #[error("missing required setting '{0}'")]
    MissingSetting(&'static str),

    #[error("invalid URL for {field}: {value}")]
    InvalidUrl { field: String, value: String },

    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}

/// Navigation, rendering or timeout failure while fetching a page.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("fetch of {url} exceeded {secs}s budget")]
    Timeout { url: String, secs: u64 },

    #[error("fetch of {url} failed: {reason}")]
    Failed { url: String, reason: String },

    #[error("fetcher unavailable: {0}")]
    Unavailable(String),
}

/// History file problems. `Parse` is recovered by the store's callers.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("history file {path} is corrupt: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Webhook delivery failure. Logged, never propagated past the dispatcher.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook rejected message with status {0}")]
    Status(reqwest::StatusCode),
}

/// The failures that end a pipeline run in the FAILED state.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to persist history: {0}")]
    Persist(#[source] HistoryError),
}
