//! Archival compaction and the monthly archive flush.
//!
//! Compaction moves every snapshot of a finished ad (closed, or posted before
//! the site's retention window) from the live tables to the archive in one
//! store transaction. On the first day of each month the archive is exported
//! to CSV and, only once the export succeeded, the exported rows are removed.
//! Rows archived while the export ran wait for the next flush.

use std::path::PathBuf;

use chrono::{Datelike, Days};
use serde::Serialize;

use crate::context::CrawlContext;
use crate::error::AppError;
use crate::models::{JobSnapshot, Site, SnapshotKey};
use crate::traits::{CrawlStore, Exporter};

/// What one compaction moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    /// Distinct `(unique_ad_id, post_date)` pairs retired.
    pub ads: u64,
    pub snapshots_archived: u64,
    pub listings_removed: u64,
}

/// Result of a monthly flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub path: PathBuf,
    pub rows: usize,
    pub cleared: u64,
}

pub struct Compactor<S, E> {
    ctx: CrawlContext<S>,
    exporter: E,
}

impl<S: CrawlStore, E: Exporter> Compactor<S, E> {
    pub fn new(ctx: CrawlContext<S>, exporter: E) -> Self {
        Self { ctx, exporter }
    }

    /// Archive closed and expired ads for `site`.
    pub async fn compact(&self, site: Site) -> Result<CompactionReport, AppError> {
        let today = self.ctx.clock.today();
        let retention = self.ctx.profile(site).retention_days;
        let cutoff = today
            .checked_sub_days(Days::new(u64::from(retention)))
            .ok_or_else(|| AppError::Generic(format!("Retention of {retention} days underflows")))?;

        let report = self.ctx.store.compact(site, cutoff).await?;
        tracing::info!(
            %site,
            %cutoff,
            ads = report.ads,
            snapshots = report.snapshots_archived,
            listings = report.listings_removed,
            "Compaction finished"
        );
        Ok(report)
    }

    /// Export and clear the archive on the first day of the month, or any day
    /// when `force` is set. Returns `None` when no flush was due.
    pub async fn flush(&self, site: Site, force: bool) -> Result<Option<FlushReport>, AppError> {
        let today = self.ctx.clock.today();
        if !force && today.day() != 1 {
            tracing::debug!(%site, %today, "Archive flush not due");
            return Ok(None);
        }

        let snapshots = self.ctx.store.archived_snapshots(site).await?;
        let receipt = self.exporter.export(site, today, &snapshots)?;
        let exported: Vec<SnapshotKey> = snapshots.iter().map(JobSnapshot::key).collect();
        let cleared = self.ctx.store.clear_archive(site, &exported).await?;
        if cleared != exported.len() as u64 {
            tracing::warn!(
                %site,
                exported = exported.len(),
                cleared,
                "Some exported rows had already left the archive"
            );
        }

        tracing::info!(%site, path = %receipt.path.display(), rows = receipt.rows, "Archive flushed");
        Ok(Some(FlushReport {
            path: receipt.path,
            rows: receipt.rows,
            cleared,
        }))
    }
}
