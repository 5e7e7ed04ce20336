use backon::{ExponentialBuilder, Retryable};
use reqwest::StatusCode;
use std::{
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use thiserror::Error;
use tracing::warn;

pub type Result<T = ()> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("atlas api error (HTTP {status}): {detail}")]
    Api { status: u16, detail: String },
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no API key configured; creating measurements requires one")]
    MissingApiKey,
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<crate::types::ApiErrorBody>(body)
            .map(|parsed| parsed.error.detail)
            .unwrap_or_else(|_| body.trim().to_string());

        Error::Api {
            status: status.as_u16(),
            detail,
        }
    }
}

/// Default policy for Atlas calls: 1s..30s, up to 5 retries.
pub fn default_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(30))
        .with_max_times(5)
        .with_jitter()
}

pub async fn with_retry<F, Fut, T>(
    operation: F,
    backoff: &ExponentialBuilder,
    label: &'static str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut op = operation;
    let attempts = AtomicUsize::new(0);

    (move || op())
        .retry(backoff)
        .when(should_retry)
        .notify(|err: &Error, delay: Duration| {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(attempt, retry_in = ?delay, error = %err, operation = label, "transient Atlas API failure");
        })
        .await
}

fn should_retry(err: &Error) -> bool {
    match err {
        Error::Http(http_err) => {
            if http_err.is_timeout() || http_err.is_connect() {
                return true;
            }
            retryable_status(http_err.status())
        }
        Error::Api { status, .. } => retryable_status(StatusCode::from_u16(*status).ok()),
        _ => false,
    }
}

fn retryable_status(status: Option<StatusCode>) -> bool {
    match status {
        Some(code) => code.is_server_error() || code == StatusCode::TOO_MANY_REQUESTS,
        None => false,
    }
}
