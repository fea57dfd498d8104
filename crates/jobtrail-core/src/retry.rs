//! Bounded retries around a [`Fetcher`], returning an explicit outcome.

use std::time::Duration;

use crate::error::AppError;
use crate::traits::Fetcher;

/// Retry policy for page fetches.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub pause: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            pause: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

/// Result of fetching one page with retries.
#[derive(Debug)]
pub enum FetchOutcome {
    Success(String),
    /// The page is gone; the ad should be recorded as closed.
    NotFound,
    Failed { attempts: u32, error: AppError },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }
}

/// A [`Fetcher`] wrapper that retries failed requests a bounded number of times.
#[derive(Clone)]
pub struct RetryingFetcher<F> {
    inner: F,
    config: RetryConfig,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Fetch `url`, retrying every error except [`AppError::NotFound`].
    ///
    /// Error statuses such as 403 or 503 are retried like network errors;
    /// only a vanished page ends the loop early.
    pub async fn fetch_page(&self, url: &str) -> FetchOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.fetch(url).await {
                Ok(body) => return FetchOutcome::Success(body),
                Err(e) if e.is_not_found() => {
                    tracing::debug!(%url, "Page not found");
                    return FetchOutcome::NotFound;
                }
                Err(e) if attempt >= max_attempts => {
                    tracing::warn!(%url, attempts = attempt, error = %e, "Giving up on page");
                    return FetchOutcome::Failed {
                        attempts: attempt,
                        error: e,
                    };
                }
                Err(e) => {
                    tracing::debug!(%url, attempt, error = %e, "Fetch failed, retrying");
                    if !self.config.pause.is_zero() {
                        tokio::time::sleep(self.config.pause).await;
                    }
                }
            }
        }
    }
}
