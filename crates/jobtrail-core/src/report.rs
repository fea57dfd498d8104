use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{AdStatus, DiscoveryScope, RefetchTarget, Site};
use crate::schedule::StopReason;

/// Events emitted during a crawl run for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    RunStarted {
        site: Site,
        run_id: Uuid,
    },
    CountsCollected {
        site: Site,
        regions: usize,
        sectors: usize,
    },
    ScanStarted {
        scope: &'a DiscoveryScope,
        cutoff: NaiveDate,
    },
    PageCommitted {
        scope: &'a DiscoveryScope,
        page: u32,
        entries: usize,
        inserted: u64,
    },
    ScanFinished {
        scope: &'a DiscoveryScope,
        pages: u32,
        reason: StopReason,
    },
    ScanFailed {
        scope: &'a DiscoveryScope,
        page: u32,
        error: &'a str,
    },
    RefetchPlanned {
        site: Site,
        due: usize,
    },
    AdCaptured {
        target: &'a RefetchTarget,
        status: AdStatus,
        written: bool,
    },
    AdFailed {
        target: &'a RefetchTarget,
        error: &'a str,
    },
    Cancelled {
        site: Site,
    },
    RunFinished {
        summary: &'a RunSummary,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter;

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::RunStarted { site, run_id } => {
                tracing::info!(%site, %run_id, "Crawl started");
            }
            CrawlEvent::CountsCollected {
                site,
                regions,
                sectors,
            } => {
                tracing::info!(%site, regions, sectors, "Region and sector counts collected");
            }
            CrawlEvent::ScanStarted { scope, cutoff } => {
                tracing::debug!(%scope, %cutoff, "Scanning listing");
            }
            CrawlEvent::PageCommitted {
                scope,
                page,
                entries,
                inserted,
            } => {
                tracing::debug!(%scope, page, entries, inserted, "Listing page committed");
            }
            CrawlEvent::ScanFinished {
                scope,
                pages,
                reason,
            } => {
                tracing::info!(%scope, pages, ?reason, "Listing scan finished");
            }
            CrawlEvent::ScanFailed { scope, page, error } => {
                tracing::warn!(%scope, page, %error, "Listing scan failed");
            }
            CrawlEvent::RefetchPlanned { site, due } => {
                tracing::info!(%site, due, "Ads due for re-fetch");
            }
            CrawlEvent::AdCaptured {
                target,
                status,
                written,
            } => {
                tracing::debug!(
                    ad_id = %target.unique_ad_id,
                    post_date = %target.post_date,
                    %status,
                    written,
                    "Ad captured"
                );
            }
            CrawlEvent::AdFailed { target, error } => {
                tracing::warn!(ad_id = %target.unique_ad_id, url = %target.url, %error, "Ad fetch failed");
            }
            CrawlEvent::Cancelled { site } => {
                tracing::warn!(%site, "Crawl cancelled, remaining work left for the next run");
            }
            CrawlEvent::RunFinished { summary } => {
                tracing::info!(
                    site = %summary.site,
                    run_id = %summary.run_id,
                    attempted = summary.attempted,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    discovered = summary.discovered,
                    closed = summary.closed,
                    snapshots_written = summary.snapshots_written,
                    archived = summary.archived,
                    flushed = ?summary.flushed,
                    "Crawl finished"
                );
            }
        }
    }
}

/// Counters for one site's run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub site: Site,
    pub run_id: Uuid,
    /// Fetch tasks attempted (listing pages and ad pages).
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// New listing references.
    pub discovered: u64,
    /// Ads recorded as closed this run.
    pub closed: u64,
    pub snapshots_written: u64,
    /// Snapshots moved to the archive by compaction.
    pub archived: u64,
    /// Rows written by the monthly flush, when it ran.
    pub flushed: Option<usize>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new(site: Site) -> Self {
        Self {
            site,
            run_id: Uuid::new_v4(),
            attempted: 0,
            succeeded: 0,
            failed: 0,
            discovered: 0,
            closed: 0,
            snapshots_written: 0,
            archived: 0,
            flushed: None,
            cancelled: false,
        }
    }
}
