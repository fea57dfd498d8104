//! One site's crawl: counts, discovery scans, then re-fetches.

use tokio_util::sync::CancellationToken;

use crate::compactor::Compactor;
use crate::context::CrawlContext;
use crate::error::AppError;
use crate::models::{AdRecord, AdStatus, JobSnapshot, ListingReference, RefetchTarget, Site};
use crate::report::{CrawlEvent, CrawlReporter, RunSummary};
use crate::retry::{FetchOutcome, RetryingFetcher};
use crate::schedule::{DiscoveryTask, ScanDecision, Scheduler, scan_decision};
use crate::traits::{CrawlStore, Exporter, Fetcher, SiteAdapter};

/// Drives fetching, parsing and persistence for one site.
///
/// Fetch and parse failures are counted and skipped; store failures abort
/// the run. Every page and ad is committed as soon as it is parsed, so a
/// cancelled run leaves the rest for the next invocation.
pub struct Crawler<F, A, S> {
    fetcher: RetryingFetcher<F>,
    adapter: A,
    ctx: CrawlContext<S>,
}

impl<F, A, S> Crawler<F, A, S>
where
    F: Fetcher,
    A: SiteAdapter,
    S: CrawlStore,
{
    pub fn new(fetcher: RetryingFetcher<F>, adapter: A, ctx: CrawlContext<S>) -> Self {
        Self {
            fetcher,
            adapter,
            ctx,
        }
    }

    pub fn site(&self) -> Site {
        self.adapter.site()
    }

    /// Run the counts, discovery and re-fetch phases.
    pub async fn run<R: CrawlReporter>(
        &self,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<RunSummary, AppError> {
        let site = self.site();
        let mut summary = RunSummary::new(site);
        reporter.report(CrawlEvent::RunStarted {
            site,
            run_id: summary.run_id,
        });

        if !self.collect_counts(&mut summary, cancel, reporter).await? {
            return Ok(self.cancelled(summary, reporter));
        }

        let today = self.ctx.clock.today();
        let profile = self.ctx.profile(site);
        let scheduler = Scheduler::new(&self.ctx.store, &self.adapter, profile);

        for task in scheduler.plan_discovery(today).await? {
            if !self.scan(&task, &mut summary, cancel, reporter).await? {
                return Ok(self.cancelled(summary, reporter));
            }
        }

        // Planned after discovery so today's new ads get their first snapshot.
        let targets = scheduler.plan_refetch(self.ctx.clock.today()).await?;
        reporter.report(CrawlEvent::RefetchPlanned {
            site,
            due: targets.len(),
        });
        for target in &targets {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(summary, reporter));
            }
            self.capture(target, &mut summary, reporter).await?;
        }

        Ok(summary)
    }

    fn cancelled<R: CrawlReporter>(&self, mut summary: RunSummary, reporter: &R) -> RunSummary {
        summary.cancelled = true;
        reporter.report(CrawlEvent::Cancelled { site: summary.site });
        summary
    }

    /// Region and sector counts. Returns `false` when cancelled.
    async fn collect_counts<R: CrawlReporter>(
        &self,
        summary: &mut RunSummary,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<bool, AppError> {
        let Some(index_url) = self.adapter.region_index_url() else {
            return Ok(true);
        };
        if cancel.is_cancelled() {
            return Ok(false);
        }

        let mut regions = 0;
        if let Some(html) = self.fetch_counted(&index_url, summary).await {
            match self.adapter.parse_region_counts(&html, self.ctx.clock.now()) {
                Ok(counts) => {
                    for count in &counts {
                        self.ctx.store.insert_region_count(count).await?;
                    }
                    summary.succeeded += 1;
                    regions = counts.len();
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(url = %index_url, error = %e, "Region index could not be parsed");
                }
            }
        }

        let mut sectors = 0;
        for subregion in self.ctx.store.latest_subregions().await? {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let Some(url) = self.adapter.sector_index_url(&subregion) else {
                continue;
            };
            let Some(html) = self.fetch_counted(&url, summary).await else {
                continue;
            };
            match self
                .adapter
                .parse_sector_counts(&html, &subregion, self.ctx.clock.now())
            {
                Ok(counts) => {
                    for count in &counts {
                        self.ctx.store.insert_region_sector_count(count).await?;
                    }
                    summary.succeeded += 1;
                    sectors += counts.len();
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(%url, error = %e, "Sector index could not be parsed");
                }
            }
        }

        reporter.report(CrawlEvent::CountsCollected {
            site: self.site(),
            regions,
            sectors,
        });
        Ok(true)
    }

    /// Fetch an index page; a missing page counts as a failure.
    async fn fetch_counted(&self, url: &str, summary: &mut RunSummary) -> Option<String> {
        summary.attempted += 1;
        match self.fetcher.fetch_page(url).await {
            FetchOutcome::Success(html) => Some(html),
            FetchOutcome::NotFound => {
                summary.failed += 1;
                tracing::warn!(%url, "Index page not found");
                None
            }
            FetchOutcome::Failed { attempts, error } => {
                summary.failed += 1;
                tracing::warn!(%url, attempts, %error, "Index page failed");
                None
            }
        }
    }

    /// Scan one scope's listing newest-first. Returns `false` when cancelled.
    ///
    /// The scope's progress moves to today only when the scan reaches its
    /// cutoff or the last page; a failed page leaves it where it was.
    async fn scan<R: CrawlReporter>(
        &self,
        task: &DiscoveryTask,
        summary: &mut RunSummary,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<bool, AppError> {
        let site = self.site();
        let scope = &task.scope;
        let max_pages = self.ctx.profile(site).max_listing_pages;
        reporter.report(CrawlEvent::ScanStarted {
            scope,
            cutoff: task.cutoff,
        });

        let mut page_number = 1;
        let mut next = self.adapter.listing_page_url(scope, page_number);
        loop {
            let url = match next {
                Ok(url) => url,
                Err(e) => {
                    summary.failed += 1;
                    reporter.report(CrawlEvent::ScanFailed {
                        scope,
                        page: page_number,
                        error: &e.to_string(),
                    });
                    return Ok(true);
                }
            };
            if cancel.is_cancelled() {
                return Ok(false);
            }

            summary.attempted += 1;
            let html = match self.fetcher.fetch_page(&url).await {
                FetchOutcome::Success(html) => html,
                FetchOutcome::NotFound => {
                    summary.failed += 1;
                    reporter.report(CrawlEvent::ScanFailed {
                        scope,
                        page: page_number,
                        error: "listing page not found",
                    });
                    return Ok(true);
                }
                FetchOutcome::Failed { error, .. } => {
                    summary.failed += 1;
                    reporter.report(CrawlEvent::ScanFailed {
                        scope,
                        page: page_number,
                        error: &error.to_string(),
                    });
                    return Ok(true);
                }
            };

            let page = match self
                .adapter
                .parse_listing_page(&html, self.ctx.clock.today())
            {
                Ok(page) => page,
                Err(e) => {
                    summary.failed += 1;
                    reporter.report(CrawlEvent::ScanFailed {
                        scope,
                        page: page_number,
                        error: &e.to_string(),
                    });
                    return Ok(true);
                }
            };

            let listings: Vec<ListingReference> = task
                .fresh_entries(&page)
                .map(|entry| ListingReference::from_entry(site, scope, entry))
                .collect();
            let inserted = self.ctx.store.insert_listings(&listings).await?;
            summary.succeeded += 1;
            summary.discovered += inserted;
            reporter.report(CrawlEvent::PageCommitted {
                scope,
                page: page_number,
                entries: listings.len(),
                inserted,
            });

            match scan_decision(&page, task.cutoff, page_number, max_pages) {
                ScanDecision::Continue => {
                    page_number += 1;
                    next = match page.next_url {
                        Some(url) => Ok(url),
                        None => self.adapter.listing_page_url(scope, page_number),
                    };
                }
                ScanDecision::Stop(reason) => {
                    if reason.completes_scope() {
                        self.ctx
                            .store
                            .record_scan(site, scope, self.ctx.clock.today())
                            .await?;
                    }
                    reporter.report(CrawlEvent::ScanFinished {
                        scope,
                        pages: page_number,
                        reason,
                    });
                    return Ok(true);
                }
            }
        }
    }

    /// Fetch one known ad and write its snapshot.
    async fn capture<R: CrawlReporter>(
        &self,
        target: &RefetchTarget,
        summary: &mut RunSummary,
        reporter: &R,
    ) -> Result<(), AppError> {
        summary.attempted += 1;
        let outcome = self.fetcher.fetch_page(&target.url).await;
        let now = self.ctx.clock.now();

        let record = match outcome {
            FetchOutcome::Success(html) => match self.adapter.parse_ad_page(&html, target, now) {
                Ok(record) => record,
                Err(e) => {
                    summary.failed += 1;
                    reporter.report(CrawlEvent::AdFailed {
                        target,
                        error: &e.to_string(),
                    });
                    return Ok(());
                }
            },
            FetchOutcome::NotFound => AdRecord::closed(target, now),
            FetchOutcome::Failed { error, .. } => {
                summary.failed += 1;
                reporter.report(CrawlEvent::AdFailed {
                    target,
                    error: &error.to_string(),
                });
                return Ok(());
            }
        };

        let snapshot = JobSnapshot::new(target, now, record);
        let written = match self.ctx.store.insert_snapshot(&snapshot).await {
            Ok(written) => written,
            Err(e @ AppError::OrphanSnapshot { .. }) => {
                summary.failed += 1;
                reporter.report(CrawlEvent::AdFailed {
                    target,
                    error: &e.to_string(),
                });
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        summary.succeeded += 1;
        if written {
            summary.snapshots_written += 1;
            if snapshot.status == AdStatus::Closed {
                summary.closed += 1;
            }
        }
        reporter.report(CrawlEvent::AdCaptured {
            target,
            status: snapshot.status,
            written,
        });
        Ok(())
    }
}

/// Crawl one site, then compact it and flush its archive when due.
///
/// Compaction and flush failures are logged and leave the tables as they
/// were; they do not fail the run.
pub async fn run_site<F, A, S, E, R>(
    crawler: &Crawler<F, A, S>,
    compactor: &Compactor<S, E>,
    cancel: &CancellationToken,
    reporter: &R,
) -> Result<RunSummary, AppError>
where
    F: Fetcher,
    A: SiteAdapter,
    S: CrawlStore,
    E: Exporter,
    R: CrawlReporter,
{
    let site = crawler.site();
    let mut summary = crawler.run(cancel, reporter).await?;

    if !summary.cancelled {
        match compactor.compact(site).await {
            Ok(report) => summary.archived = report.snapshots_archived,
            Err(e) => tracing::error!(%site, error = %e, "Compaction failed, retrying next run"),
        }
        match compactor.flush(site, false).await {
            Ok(report) => summary.flushed = report.map(|r| r.rows),
            Err(e) => tracing::error!(%site, error = %e, "Archive flush failed"),
        }
    }

    reporter.report(CrawlEvent::RunFinished { summary: &summary });
    Ok(summary)
}
