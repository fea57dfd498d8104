//! Freshness scheduling: which listing pages to scan and which ads to re-fetch.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};

use crate::config::SiteProfile;
use crate::error::AppError;
use crate::models::{DiscoveryScope, ListingEntry, ListingPage, RefetchTarget, Site};
use crate::traits::{CrawlStore, SiteAdapter};

/// Weekly re-sampling window for known ads.
///
/// An ad is due when its age in days is a multiple of `cadence_days`, up to
/// `max_weeks` multiples. Older ads are never due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefetchPolicy {
    pub cadence_days: u32,
    pub max_weeks: u32,
}

impl RefetchPolicy {
    pub const fn new(cadence_days: u32, max_weeks: u32) -> Self {
        Self {
            cadence_days,
            max_weeks,
        }
    }

    /// Oldest age (in days) that can still be due.
    pub fn max_age_days(&self) -> i64 {
        i64::from(self.cadence_days) * i64::from(self.max_weeks)
    }

    pub fn is_due(&self, post_date: NaiveDate, today: NaiveDate) -> bool {
        let age = (today - post_date).num_days();
        if age < 0 || age > self.max_age_days() {
            return false;
        }
        if self.cadence_days == 0 {
            return age == 0;
        }
        age % i64::from(self.cadence_days) == 0
    }

    /// Every post date that is due on `today`, newest first.
    pub fn due_post_dates(&self, today: NaiveDate) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = (0..=self.max_weeks)
            .filter_map(|k| {
                today.checked_sub_days(Days::new(u64::from(k) * u64::from(self.cadence_days)))
            })
            .collect();
        dates.dedup();
        dates
    }
}

/// Oldest post date still worth committing for a scope.
pub fn discovery_cutoff(
    last_download: Option<NaiveDate>,
    today: NaiveDate,
    lookback_days: u32,
) -> NaiveDate {
    last_download.unwrap_or_else(|| {
        today
            .checked_sub_days(Days::new(u64::from(lookback_days)))
            .unwrap_or(NaiveDate::MIN)
    })
}

/// One listing scan: a scope and the date below which entries are stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryTask {
    pub scope: DiscoveryScope,
    pub cutoff: NaiveDate,
}

impl DiscoveryTask {
    /// Entries on `page` that are new enough to commit.
    pub fn fresh_entries<'a>(
        &'a self,
        page: &'a ListingPage,
    ) -> impl Iterator<Item = &'a ListingEntry> + 'a {
        page.entries
            .iter()
            .filter(move |entry| entry.post_date >= self.cutoff)
    }
}

/// A unit of fetch work, in the order a run performs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTask {
    Discover(DiscoveryTask),
    Refetch(RefetchTarget),
}

/// Why a listing scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No further page exists.
    Exhausted,
    /// The page reached entries older than the cutoff.
    ReachedCutoff,
    /// The hard page limit was hit.
    PageCap,
}

impl StopReason {
    /// Whether every fresh entry of the scope was seen, so the next run can
    /// start from today.
    pub fn completes_scope(self) -> bool {
        matches!(self, StopReason::Exhausted | StopReason::ReachedCutoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDecision {
    Continue,
    Stop(StopReason),
}

/// Decide whether to fetch the page after `page_number`.
pub fn scan_decision(
    page: &ListingPage,
    cutoff: NaiveDate,
    page_number: u32,
    max_pages: u32,
) -> ScanDecision {
    let Some(min_date) = page.min_post_date() else {
        return ScanDecision::Stop(StopReason::Exhausted);
    };
    if min_date < cutoff {
        return ScanDecision::Stop(StopReason::ReachedCutoff);
    }
    if !page.has_next(page_number) {
        return ScanDecision::Stop(StopReason::Exhausted);
    }
    if page_number >= max_pages {
        return ScanDecision::Stop(StopReason::PageCap);
    }
    ScanDecision::Continue
}

/// Plans discovery scans and re-fetches for one site against the store.
pub struct Scheduler<'a, S, A> {
    store: &'a S,
    adapter: &'a A,
    profile: &'a SiteProfile,
}

impl<'a, S: CrawlStore, A: SiteAdapter> Scheduler<'a, S, A> {
    pub fn new(store: &'a S, adapter: &'a A, profile: &'a SiteProfile) -> Self {
        Self {
            store,
            adapter,
            profile,
        }
    }

    fn site(&self) -> Site {
        self.adapter.site()
    }

    /// Discovery tasks for every known scope, with per-scope cutoffs.
    pub async fn plan_discovery(&self, today: NaiveDate) -> Result<Vec<DiscoveryTask>, AppError> {
        let site = self.site();
        let mut scopes: BTreeSet<DiscoveryScope> = self.adapter.seed_scopes().into_iter().collect();
        if site.tracks_region_counts() {
            scopes.extend(self.store.latest_sector_scopes().await?);
        }

        let mut tasks = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let last = self.store.last_download_date(site, &scope).await?;
            let cutoff = discovery_cutoff(last, today, self.profile.first_crawl_lookback_days);
            tracing::debug!(%site, %scope, ?last, %cutoff, "Planned discovery scan");
            tasks.push(DiscoveryTask { scope, cutoff });
        }
        Ok(tasks)
    }

    /// Known, still-open ads whose age falls on today's re-fetch window.
    pub async fn plan_refetch(&self, today: NaiveDate) -> Result<Vec<RefetchTarget>, AppError> {
        self.store
            .due_for_refetch(self.site(), today, &self.profile.refetch)
            .await
    }
}
