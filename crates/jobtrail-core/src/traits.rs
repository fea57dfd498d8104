use std::future::Future;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use url::Url;

use crate::compactor::CompactionReport;
use crate::error::AppError;
use crate::models::{
    AdRecord, DiscoveryScope, JobSnapshot, ListingPage, ListingReference, RefetchTarget,
    RegionCount, RegionSectorCount, Site, SnapshotKey, Subregion, TableCounts,
};
use crate::schedule::RefetchPolicy;

/// Fetches raw HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// URL construction and page parsing for one site.
///
/// Parsing is pure: adapters never fetch or persist anything themselves.
pub trait SiteAdapter: Send + Sync + Clone {
    fn site(&self) -> Site;

    /// Listings scanned on every run regardless of the count tables.
    fn seed_scopes(&self) -> Vec<DiscoveryScope> {
        Vec::new()
    }

    /// Page listing every region with its ad counts, if the site has one.
    fn region_index_url(&self) -> Option<String> {
        None
    }

    fn parse_region_counts(
        &self,
        _html: &str,
        _now: NaiveDateTime,
    ) -> Result<Vec<RegionCount>, AppError> {
        Ok(Vec::new())
    }

    /// Page listing the job sectors of one subregion.
    fn sector_index_url(&self, _subregion: &Subregion) -> Option<String> {
        None
    }

    fn parse_sector_counts(
        &self,
        _html: &str,
        _subregion: &Subregion,
        _now: NaiveDateTime,
    ) -> Result<Vec<RegionSectorCount>, AppError> {
        Ok(Vec::new())
    }

    /// URL of the 1-based `page` of a scope's listing.
    fn listing_page_url(&self, scope: &DiscoveryScope, page: u32) -> Result<String, AppError> {
        if page <= 1 {
            return Ok(scope.listing_url.clone());
        }
        let mut url = Url::parse(&scope.listing_url)
            .map_err(|e| AppError::ParseError(format!("{}: {e}", scope.listing_url)))?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "page")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("page", &page.to_string());
        Ok(url.into())
    }

    fn parse_listing_page(&self, html: &str, today: NaiveDate) -> Result<ListingPage, AppError>;

    /// Parse a live ad page. The record's identity comes from `target`.
    fn parse_ad_page(
        &self,
        html: &str,
        target: &RefetchTarget,
        now: NaiveDateTime,
    ) -> Result<AdRecord, AppError>;
}

/// Insert-if-absent persistence for crawl results.
pub trait CrawlStore: Send + Sync + Clone {
    /// Returns `false` when the key already existed.
    fn insert_region_count(
        &self,
        count: &RegionCount,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn insert_region_sector_count(
        &self,
        count: &RegionSectorCount,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Insert one listing page atomically. Returns the number of new rows.
    fn insert_listings(
        &self,
        listings: &[ListingReference],
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Fails with [`AppError::OrphanSnapshot`] when no listing reference
    /// matches the snapshot's `(site, unique_ad_id, post_date)`.
    fn insert_snapshot(
        &self,
        snapshot: &JobSnapshot,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Subregions of the most recent region count snapshot.
    fn latest_subregions(&self) -> impl Future<Output = Result<Vec<Subregion>, AppError>> + Send;

    /// Listing scopes of the most recent sector count snapshot.
    fn latest_sector_scopes(
        &self,
    ) -> impl Future<Output = Result<Vec<DiscoveryScope>, AppError>> + Send;

    /// Download date of the last scan of `scope` that reached its cutoff or
    /// the end of the listing.
    fn last_download_date(
        &self,
        site: Site,
        scope: &DiscoveryScope,
    ) -> impl Future<Output = Result<Option<NaiveDate>, AppError>> + Send;

    /// Mark `scope` as scanned up to `download_date`. A later date never
    /// moves back.
    fn record_scan(
        &self,
        site: Site,
        scope: &DiscoveryScope,
        download_date: NaiveDate,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Ads that are not closed and whose post date falls on today's window.
    fn due_for_refetch(
        &self,
        site: Site,
        today: NaiveDate,
        policy: &RefetchPolicy,
    ) -> impl Future<Output = Result<Vec<RefetchTarget>, AppError>> + Send;

    /// Move closed ads and ads posted before `cutoff` to the archive, in one
    /// transaction.
    fn compact(
        &self,
        site: Site,
        cutoff: NaiveDate,
    ) -> impl Future<Output = Result<CompactionReport, AppError>> + Send;

    fn archived_snapshots(
        &self,
        site: Site,
    ) -> impl Future<Output = Result<Vec<JobSnapshot>, AppError>> + Send;

    /// Delete the given archived snapshots of `site`. Rows archived after
    /// the keys were read stay in place. Returns the number of rows removed.
    fn clear_archive(
        &self,
        site: Site,
        keys: &[SnapshotKey],
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn table_counts(&self, site: Site)
    -> impl Future<Output = Result<TableCounts, AppError>> + Send;
}

/// Where an export landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReceipt {
    pub path: PathBuf,
    pub rows: usize,
}

/// Writes archived snapshots out of the database.
pub trait Exporter: Send + Sync {
    fn export(
        &self,
        site: Site,
        date: NaiveDate,
        snapshots: &[JobSnapshot],
    ) -> Result<ExportReceipt, AppError>;
}
