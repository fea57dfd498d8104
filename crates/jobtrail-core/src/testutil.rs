//! Test utilities: in-memory and mock implementations of the core traits.
//!
//! All mocks use `Arc<Mutex<_>>` for interior mutability so clones share
//! state and tests can assert on what was recorded.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};

use crate::compactor::CompactionReport;
use crate::error::AppError;
use crate::models::{
    AdRecord, AdStatus, ClassifiedsAd, DiscoveryScope, JobBoardAd, JobSnapshot, ListingEntry,
    ListingPage, ListingReference, RefetchTarget, RegionCount, RegionSectorCount, Site,
    SnapshotKey, Subregion, TableCounts,
};
use crate::report::{CrawlEvent, CrawlReporter};
use crate::schedule::RefetchPolicy;
use crate::traits::{CrawlStore, ExportReceipt, Exporter, Fetcher, SiteAdapter};

/// Listing entry whose ad lives at `https://jobs.example.com/ad/<id>`.
pub fn entry(id: &str, post_date: NaiveDate) -> ListingEntry {
    ListingEntry {
        unique_ad_id: id.to_string(),
        post_date,
        url: format!("https://jobs.example.com/ad/{id}"),
        has_photo: false,
        is_featured: false,
    }
}

pub fn listing_ref(
    site: Site,
    scope: &DiscoveryScope,
    id: &str,
    post_date: NaiveDate,
) -> ListingReference {
    ListingReference::from_entry(site, scope, &entry(id, post_date))
}

/// An OPEN record with only the identifying fields set.
pub fn open_record(target: &RefetchTarget, at: NaiveDateTime) -> AdRecord {
    match target.site {
        Site::Classifieds => {
            let mut ad = ClassifiedsAd::closed(target, at);
            ad.status = AdStatus::Open;
            AdRecord::Classifieds(ad)
        }
        Site::JobBoard => AdRecord::JobBoard(JobBoardAd::empty(target, at, AdStatus::Open)),
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FetcherState {
    pages: HashMap<String, String>,
    not_found: BTreeSet<String>,
    /// Remaining network failures before a URL starts succeeding.
    failures: HashMap<String, u32>,
    /// Remaining error responses (status, count) before a URL starts succeeding.
    statuses: HashMap<String, (u16, u32)>,
    calls: Vec<String>,
}

/// Mock fetcher keyed by URL. Unknown URLs behave like a 404.
#[derive(Clone, Default)]
pub struct MockFetcher {
    state: Arc<Mutex<FetcherState>>,
    fallback: Option<String>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for every URL.
    pub fn serving(body: &str) -> Self {
        Self {
            state: Arc::default(),
            fallback: Some(body.to_string()),
        }
    }

    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), body.to_string());
        self
    }

    pub fn with_not_found(self, url: &str) -> Self {
        self.state.lock().unwrap().not_found.insert(url.to_string());
        self
    }

    /// Fail the next `times` requests for `url` with a network error.
    pub fn with_failures(self, url: &str, times: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(url.to_string(), times);
        self
    }

    /// Answer the next `times` requests for `url` with HTTP `status`.
    pub fn with_status(self, url: &str, status: u16, times: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(url.to_string(), (status, times));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|u| *u == url).count()
    }

    /// Requests to `base` and any of its paginated variants.
    pub fn listing_calls(&self, base: &str) -> usize {
        self.calls().iter().filter(|u| u.starts_with(base)).count()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(url.to_string());

        if let Some(remaining) = state.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AppError::NetworkError(format!("connection reset: {url}")));
            }
        }
        if let Some((status, remaining)) = state.statuses.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AppError::HttpError(format!("HTTP {status} for {url}")));
            }
        }
        if state.not_found.contains(url) {
            return Err(AppError::NotFound(url.to_string()));
        }
        match state.pages.get(url).or(self.fallback.as_ref()) {
            Some(body) => Ok(body.clone()),
            None => Err(AppError::NotFound(url.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticAdapter
// ---------------------------------------------------------------------------

/// Site adapter whose "HTML" is a lookup key into canned parse results.
#[derive(Clone)]
pub struct StaticAdapter {
    site: Site,
    seeds: Vec<DiscoveryScope>,
    listings: HashMap<String, ListingPage>,
    ads: HashMap<String, AdStatus>,
    region_counts: HashMap<String, Vec<RegionCount>>,
    sector_counts: HashMap<String, Vec<RegionSectorCount>>,
}

impl StaticAdapter {
    pub const REGION_INDEX: &'static str = "https://classifieds.example.com/sitemap/regions/";
    pub const JOB_BOARD_LISTING: &'static str = "https://jobs.example.com/search";

    fn empty(site: Site) -> Self {
        Self {
            site,
            seeds: Vec::new(),
            listings: HashMap::new(),
            ads: HashMap::new(),
            region_counts: HashMap::new(),
            sector_counts: HashMap::new(),
        }
    }

    /// Job board with a single site-wide listing.
    pub fn job_board() -> Self {
        let mut adapter = Self::empty(Site::JobBoard);
        adapter.seeds = vec![DiscoveryScope::site_wide(Self::JOB_BOARD_LISTING)];
        adapter
    }

    /// Classifieds site whose scopes come from the count tables.
    pub fn classifieds() -> Self {
        Self::empty(Site::Classifieds)
    }

    pub fn sector_index(subregion_slug: &str) -> String {
        format!("https://classifieds.example.com/{subregion_slug}/jobs/")
    }

    pub fn with_listing(mut self, body: &str, page: ListingPage) -> Self {
        self.listings.insert(body.to_string(), page);
        self
    }

    pub fn with_ad(mut self, body: &str, status: AdStatus) -> Self {
        self.ads.insert(body.to_string(), status);
        self
    }

    pub fn with_region_counts(mut self, body: &str, counts: Vec<RegionCount>) -> Self {
        self.region_counts.insert(body.to_string(), counts);
        self
    }

    pub fn with_sector_counts(mut self, body: &str, counts: Vec<RegionSectorCount>) -> Self {
        self.sector_counts.insert(body.to_string(), counts);
        self
    }
}

impl SiteAdapter for StaticAdapter {
    fn site(&self) -> Site {
        self.site
    }

    fn seed_scopes(&self) -> Vec<DiscoveryScope> {
        self.seeds.clone()
    }

    fn region_index_url(&self) -> Option<String> {
        self.site
            .tracks_region_counts()
            .then(|| Self::REGION_INDEX.to_string())
    }

    fn parse_region_counts(
        &self,
        html: &str,
        _now: NaiveDateTime,
    ) -> Result<Vec<RegionCount>, AppError> {
        self.region_counts
            .get(html)
            .cloned()
            .ok_or_else(|| AppError::ParseError(format!("no region counts in {html}")))
    }

    fn sector_index_url(&self, subregion: &Subregion) -> Option<String> {
        Some(Self::sector_index(&subregion.subregion_slug))
    }

    fn parse_sector_counts(
        &self,
        html: &str,
        _subregion: &Subregion,
        _now: NaiveDateTime,
    ) -> Result<Vec<RegionSectorCount>, AppError> {
        self.sector_counts
            .get(html)
            .cloned()
            .ok_or_else(|| AppError::ParseError(format!("no sector counts in {html}")))
    }

    fn parse_listing_page(&self, html: &str, _today: NaiveDate) -> Result<ListingPage, AppError> {
        self.listings
            .get(html)
            .cloned()
            .ok_or_else(|| AppError::ParseError(format!("no listing in {html}")))
    }

    fn parse_ad_page(
        &self,
        html: &str,
        target: &RefetchTarget,
        now: NaiveDateTime,
    ) -> Result<AdRecord, AppError> {
        match self.ads.get(html) {
            Some(AdStatus::Open) => Ok(open_record(target, now)),
            Some(AdStatus::Closed) => Ok(AdRecord::closed(target, now)),
            None => Err(AppError::ParseError(format!("no ad in {html}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

type ListingKey = (Site, String, NaiveDate);

#[derive(Default)]
struct Tables {
    region_counts: BTreeMap<(NaiveDate, String, String), RegionCount>,
    sector_counts: BTreeMap<(NaiveDate, String, String, String), RegionSectorCount>,
    listings: BTreeMap<ListingKey, ListingReference>,
    snapshots: BTreeMap<SnapshotKey, JobSnapshot>,
    archive: BTreeMap<SnapshotKey, JobSnapshot>,
    scope_progress: BTreeMap<(Site, String, String, String), NaiveDate>,
    fail_compaction: bool,
}

fn progress_key(site: Site, scope: &DiscoveryScope) -> (Site, String, String, String) {
    (
        site,
        scope.region.clone(),
        scope.subregion.clone(),
        scope.sector.clone(),
    )
}

/// In-memory [`CrawlStore`] with the same insert-if-absent and integrity
/// rules as the Postgres repository.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an OPEN snapshot of `listing` taken at `at`.
    pub async fn seed_snapshot(&self, listing: &ListingReference, at: NaiveDateTime) {
        let target = RefetchTarget::from(listing);
        let snapshot = JobSnapshot::new(&target, at, open_record(&target, at));
        self.insert_snapshot(&snapshot).await.unwrap();
    }

    /// Register `scope` as part of today's sector count snapshot.
    pub fn seed_sector_scope(&self, scope: DiscoveryScope) {
        let count = RegionSectorCount {
            download_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            download_time: chrono::NaiveTime::MIN,
            region: scope.region.clone(),
            region_slug: scope.region.to_lowercase(),
            subregion: scope.subregion.clone(),
            subregion_slug: scope.subregion.to_lowercase(),
            sector: scope.sector.clone(),
            listing_url: scope.listing_url,
            total_posts: None,
        };
        let key = (
            count.download_date,
            count.region.clone(),
            count.subregion.clone(),
            count.sector.clone(),
        );
        self.tables.lock().unwrap().sector_counts.insert(key, count);
    }

    /// Put `snapshot` straight into the archive.
    pub fn seed_archived(&self, snapshot: JobSnapshot) {
        self.tables
            .lock()
            .unwrap()
            .archive
            .insert(snapshot.key(), snapshot);
    }

    /// Make the next `compact` call fail without touching any table.
    pub fn fail_next_compaction(&self) {
        self.tables.lock().unwrap().fail_compaction = true;
    }

    pub fn listings(&self, site: Site) -> Vec<ListingReference> {
        let tables = self.tables.lock().unwrap();
        tables
            .listings
            .values()
            .filter(|l| l.site == site)
            .cloned()
            .collect()
    }

    pub fn listing_ids(&self, site: Site) -> Vec<String> {
        self.listings(site)
            .into_iter()
            .map(|l| l.unique_ad_id)
            .collect()
    }

    pub fn snapshots(&self, site: Site) -> Vec<JobSnapshot> {
        let tables = self.tables.lock().unwrap();
        tables
            .snapshots
            .values()
            .filter(|s| s.site == site)
            .cloned()
            .collect()
    }
}

impl CrawlStore for MemoryStore {
    async fn insert_region_count(&self, count: &RegionCount) -> Result<bool, AppError> {
        let key = (
            count.download_date,
            count.region.clone(),
            count.subregion.clone(),
        );
        let mut tables = self.tables.lock().unwrap();
        if tables.region_counts.contains_key(&key) {
            return Ok(false);
        }
        tables.region_counts.insert(key, count.clone());
        Ok(true)
    }

    async fn insert_region_sector_count(&self, count: &RegionSectorCount) -> Result<bool, AppError> {
        let key = (
            count.download_date,
            count.region.clone(),
            count.subregion.clone(),
            count.sector.clone(),
        );
        let mut tables = self.tables.lock().unwrap();
        if tables.sector_counts.contains_key(&key) {
            return Ok(false);
        }
        tables.sector_counts.insert(key, count.clone());
        Ok(true)
    }

    async fn insert_listings(&self, listings: &[ListingReference]) -> Result<u64, AppError> {
        let mut tables = self.tables.lock().unwrap();
        let mut inserted = 0;
        for listing in listings {
            let key = (listing.site, listing.unique_ad_id.clone(), listing.post_date);
            if !tables.listings.contains_key(&key) {
                tables.listings.insert(key, listing.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn insert_snapshot(&self, snapshot: &JobSnapshot) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().unwrap();
        let listing_key = (
            snapshot.site,
            snapshot.unique_ad_id.clone(),
            snapshot.post_date,
        );
        if !tables.listings.contains_key(&listing_key) {
            return Err(AppError::OrphanSnapshot {
                unique_ad_id: snapshot.unique_ad_id.clone(),
                post_date: snapshot.post_date,
            });
        }
        let key = snapshot.key();
        if tables.snapshots.contains_key(&key) {
            return Ok(false);
        }
        tables.snapshots.insert(key, snapshot.clone());
        Ok(true)
    }

    async fn latest_subregions(&self) -> Result<Vec<Subregion>, AppError> {
        let tables = self.tables.lock().unwrap();
        let Some(latest) = tables.region_counts.keys().map(|k| k.0).max() else {
            return Ok(Vec::new());
        };
        Ok(tables
            .region_counts
            .values()
            .filter(|c| c.download_date == latest)
            .map(|c| Subregion {
                region: c.region.clone(),
                region_slug: c.region_slug.clone(),
                subregion: c.subregion.clone(),
                subregion_slug: c.subregion_slug.clone(),
            })
            .collect())
    }

    async fn latest_sector_scopes(&self) -> Result<Vec<DiscoveryScope>, AppError> {
        let tables = self.tables.lock().unwrap();
        let Some(latest) = tables.sector_counts.keys().map(|k| k.0).max() else {
            return Ok(Vec::new());
        };
        Ok(tables
            .sector_counts
            .values()
            .filter(|c| c.download_date == latest)
            .map(|c| DiscoveryScope::new(&c.region, &c.subregion, &c.sector, &c.listing_url))
            .collect())
    }

    async fn last_download_date(
        &self,
        site: Site,
        scope: &DiscoveryScope,
    ) -> Result<Option<NaiveDate>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.scope_progress.get(&progress_key(site, scope)).copied())
    }

    async fn record_scan(
        &self,
        site: Site,
        scope: &DiscoveryScope,
        download_date: NaiveDate,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        let last = tables
            .scope_progress
            .entry(progress_key(site, scope))
            .or_insert(download_date);
        *last = (*last).max(download_date);
        Ok(())
    }

    async fn due_for_refetch(
        &self,
        site: Site,
        today: NaiveDate,
        policy: &RefetchPolicy,
    ) -> Result<Vec<RefetchTarget>, AppError> {
        let tables = self.tables.lock().unwrap();
        let closed: BTreeSet<(String, NaiveDate)> = tables
            .snapshots
            .values()
            .filter(|s| s.site == site && s.status == AdStatus::Closed)
            .map(|s| (s.unique_ad_id.clone(), s.post_date))
            .collect();

        let mut due: Vec<RefetchTarget> = tables
            .listings
            .values()
            .filter(|l| l.site == site && policy.is_due(l.post_date, today))
            .filter(|l| !closed.contains(&(l.unique_ad_id.clone(), l.post_date)))
            .map(RefetchTarget::from)
            .collect();
        due.sort_by(|a, b| {
            b.post_date
                .cmp(&a.post_date)
                .then_with(|| a.unique_ad_id.cmp(&b.unique_ad_id))
        });
        Ok(due)
    }

    async fn compact(&self, site: Site, cutoff: NaiveDate) -> Result<CompactionReport, AppError> {
        let mut tables = self.tables.lock().unwrap();
        if std::mem::take(&mut tables.fail_compaction) {
            return Err(AppError::DatabaseError("simulated compaction failure".into()));
        }

        let mut doomed: BTreeSet<(String, NaiveDate)> = tables
            .snapshots
            .values()
            .filter(|s| s.site == site && (s.status == AdStatus::Closed || s.post_date < cutoff))
            .map(|s| (s.unique_ad_id.clone(), s.post_date))
            .collect();
        doomed.extend(
            tables
                .listings
                .values()
                .filter(|l| l.site == site && l.post_date < cutoff)
                .map(|l| (l.unique_ad_id.clone(), l.post_date)),
        );

        let moving: Vec<SnapshotKey> = tables
            .snapshots
            .keys()
            .filter(|k| k.site == site && doomed.contains(&(k.unique_ad_id.clone(), k.post_date)))
            .cloned()
            .collect();
        let mut report = CompactionReport {
            ads: doomed.len() as u64,
            ..CompactionReport::default()
        };
        for key in moving {
            if let Some(snapshot) = tables.snapshots.remove(&key) {
                tables.archive.entry(key).or_insert(snapshot);
                report.snapshots_archived += 1;
            }
        }
        for (id, post_date) in doomed {
            if tables.listings.remove(&(site, id, post_date)).is_some() {
                report.listings_removed += 1;
            }
        }
        Ok(report)
    }

    async fn archived_snapshots(&self, site: Site) -> Result<Vec<JobSnapshot>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .archive
            .values()
            .filter(|s| s.site == site)
            .cloned()
            .collect())
    }

    async fn clear_archive(&self, site: Site, keys: &[SnapshotKey]) -> Result<u64, AppError> {
        let mut tables = self.tables.lock().unwrap();
        let mut removed = 0;
        for key in keys.iter().filter(|k| k.site == site) {
            if tables.archive.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn table_counts(&self, site: Site) -> Result<TableCounts, AppError> {
        let tables = self.tables.lock().unwrap();
        let (region_counts, sector_counts) = if site.tracks_region_counts() {
            (
                tables.region_counts.len() as i64,
                tables.sector_counts.len() as i64,
            )
        } else {
            (0, 0)
        };
        Ok(TableCounts {
            region_counts,
            sector_counts,
            listings: tables.listings.values().filter(|l| l.site == site).count() as i64,
            snapshots: tables.snapshots.values().filter(|s| s.site == site).count() as i64,
            archived: tables.archive.values().filter(|s| s.site == site).count() as i64,
        })
    }
}

// ---------------------------------------------------------------------------
// MockExporter
// ---------------------------------------------------------------------------

/// Recorded export: (site, date, rows).
pub type ExportRecord = (Site, NaiveDate, usize);

#[derive(Clone, Default)]
pub struct MockExporter {
    exports: Arc<Mutex<Vec<ExportRecord>>>,
    fail: bool,
}

impl MockExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn exports(&self) -> Vec<ExportRecord> {
        self.exports.lock().unwrap().clone()
    }
}

impl Exporter for MockExporter {
    fn export(
        &self,
        site: Site,
        date: NaiveDate,
        snapshots: &[JobSnapshot],
    ) -> Result<ExportReceipt, AppError> {
        if self.fail {
            return Err(AppError::ExportError("disk full".into()));
        }
        self.exports
            .lock()
            .unwrap()
            .push((site, date, snapshots.len()));
        Ok(ExportReceipt {
            path: PathBuf::from(format!("archived_{site}_{}.csv", date.format("%m%d%Y"))),
            rows: snapshots.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that records the name of every event it receives.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl CrawlReporter for RecordingReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let name = match event {
            CrawlEvent::RunStarted { .. } => "run_started",
            CrawlEvent::CountsCollected { .. } => "counts_collected",
            CrawlEvent::ScanStarted { .. } => "scan_started",
            CrawlEvent::PageCommitted { .. } => "page_committed",
            CrawlEvent::ScanFinished { .. } => "scan_finished",
            CrawlEvent::ScanFailed { .. } => "scan_failed",
            CrawlEvent::RefetchPlanned { .. } => "refetch_planned",
            CrawlEvent::AdCaptured { .. } => "ad_captured",
            CrawlEvent::AdFailed { .. } => "ad_failed",
            CrawlEvent::Cancelled { .. } => "cancelled",
            CrawlEvent::RunFinished { .. } => "run_finished",
        };
        self.events.lock().unwrap().push(name.to_string());
    }
}
