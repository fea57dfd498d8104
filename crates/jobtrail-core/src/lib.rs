pub mod clock;
pub mod compactor;
pub mod config;
pub mod context;
pub mod crawl;
pub mod dates;
pub mod error;
pub mod models;
pub mod report;
pub mod retry;
pub mod schedule;
pub mod throttle;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use clock::{Clock, FixedClock, SystemClock};
pub use compactor::{CompactionReport, Compactor, FlushReport};
pub use config::{CrawlConfig, SiteProfile};
pub use context::CrawlContext;
pub use crawl::{Crawler, run_site};
pub use error::AppError;
pub use models::{AdRecord, AdStatus, JobSnapshot, Site};
pub use report::{CrawlReporter, RunSummary, TracingCrawlReporter};
pub use retry::{FetchOutcome, RetryConfig, RetryingFetcher};
pub use schedule::RefetchPolicy;
pub use throttle::{ThrottleConfig, ThrottledFetcher};
pub use traits::{CrawlStore, Exporter, Fetcher, SiteAdapter};
