//! Per-host request spacing for polite crawling.
//!
//! Both sites are crawled by a single sequential task, so the throttle only
//! has to make sure consecutive requests to one host are at least
//! `delay + U[0, jitter)` apart.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use jobtrail_core::throttle::{ThrottleConfig, ThrottledFetcher};
//! # use jobtrail_core::traits::Fetcher;
//! # #[derive(Clone)] struct Http;
//! # impl Fetcher for Http {
//! #     async fn fetch(&self, _: &str) -> Result<String, jobtrail_core::AppError> { todo!() }
//! # }
//!
//! let config = ThrottleConfig::new(Duration::from_secs(1)).with_jitter(Duration::from_secs(2));
//! let fetcher = ThrottledFetcher::new(Http, config);
//! ```

use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::error::AppError;
use crate::traits::Fetcher;

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum spacing between two requests to the same host.
    pub delay: Duration,
    /// Upper bound of the random extra spacing. `Duration::ZERO` disables it.
    pub jitter: Duration,
}

impl ThrottleConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn spacing(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.delay;
        }
        let noise = RandomState::new().hash_one(std::time::SystemTime::now());
        self.delay + Duration::from_millis(noise % jitter_ms)
    }
}

impl Default for ThrottleConfig {
    /// One to three seconds between requests.
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            jitter: Duration::from_secs(2),
        }
    }
}

/// A [`Fetcher`] that spaces out requests per host.
#[derive(Clone)]
pub struct ThrottledFetcher<F> {
    inner: F,
    config: ThrottleConfig,
    /// Earliest instant the next request to each host may start.
    next_slot: Arc<Mutex<HashMap<String, Instant>>>,
}

impl<F: Fetcher> ThrottledFetcher<F> {
    pub fn new(inner: F, config: ThrottleConfig) -> Self {
        Self {
            inner,
            config,
            next_slot: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn host_key(url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let host = url.host_str()?;
        match url.port_or_known_default() {
            Some(port) => Some(format!("{host}:{port}")),
            None => Some(host.to_string()),
        }
    }

    /// Reserve the next slot for `host` and sleep until it opens.
    async fn wait_turn(&self, host: String) {
        let now = Instant::now();
        let start = {
            let mut slots = self.next_slot.lock().await;
            let start = slots.get(&host).copied().filter(|t| *t > now).unwrap_or(now);
            slots.insert(host.clone(), start + self.config.spacing());
            start
        };
        if start > now {
            tracing::debug!(
                %host,
                wait_ms = %(start - now).as_millis(),
                "Throttling request"
            );
            tokio::time::sleep_until(start).await;
        }
    }
}

impl<F: Fetcher> Fetcher for ThrottledFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        if let Some(host) = Self::host_key(url) {
            self.wait_turn(host).await;
        }
        self.inner.fetch(url).await
    }
}
