use thiserror::Error;

/// Failure of a single upstream call, as seen by the orchestrator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("fetch task died: {0}")]
    TaskFailed(String),
}

impl FetchError {
    /// Transport and non-2xx failures may clear up on their own; nothing else will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport { .. } | FetchError::Status { .. })
    }

    pub fn is_deadline(&self) -> bool {
        matches!(self, FetchError::DeadlineExceeded)
    }
}

/// Why a run stopped before anything was rendered.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no library source is configured")]
    NoSourcesConfigured,
    #[error("all library sources failed: {}", failed.join(", "))]
    AllSourcesFailed { failed: Vec<String> },
}
