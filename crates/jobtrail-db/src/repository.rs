use chrono::{NaiveDate, NaiveTime};
use jobtrail_core::compactor::CompactionReport;
use jobtrail_core::error::AppError;
use jobtrail_core::models::{
    AdRecord, AdStatus, DiscoveryScope, JobSnapshot, ListingReference, RefetchTarget, RegionCount,
    RegionSectorCount, Site, SnapshotKey, Subregion, TableCounts,
};
use jobtrail_core::schedule::RefetchPolicy;
use jobtrail_core::traits::CrawlStore;
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};

/// PostgreSQL-backed [`CrawlStore`].
///
/// Every insert is `ON CONFLICT DO NOTHING`, so re-running a crawl on the
/// same day never duplicates rows.
#[derive(Clone)]
pub struct CrawlRepository {
    pool: Pool<Postgres>,
}

impl CrawlRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    site: String,
    download_date: NaiveDate,
    download_time: NaiveTime,
    unique_ad_id: String,
    post_date: NaiveDate,
    status: String,
    record: Json<AdRecord>,
}

impl TryFrom<SnapshotRow> for JobSnapshot {
    type Error = AppError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(JobSnapshot {
            site: row.site.parse::<Site>().map_err(AppError::DatabaseError)?,
            download_date: row.download_date,
            download_time: row.download_time,
            unique_ad_id: row.unique_ad_id,
            post_date: row.post_date,
            status: row.status.parse::<AdStatus>().map_err(AppError::DatabaseError)?,
            record: row.record.0,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TargetRow {
    site: String,
    unique_ad_id: String,
    post_date: NaiveDate,
    url: String,
}

impl TryFrom<TargetRow> for RefetchTarget {
    type Error = AppError;

    fn try_from(row: TargetRow) -> Result<Self, Self::Error> {
        Ok(RefetchTarget {
            site: row.site.parse::<Site>().map_err(AppError::DatabaseError)?,
            unique_ad_id: row.unique_ad_id,
            post_date: row.post_date,
            url: row.url,
        })
    }
}

// -- Trait implementation --

impl CrawlStore for CrawlRepository {
    async fn insert_region_count(&self, count: &RegionCount) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO region_ad_counts
                (download_date, download_time, region, region_slug, subregion, subregion_slug,
                 total_region_posts, subregion_posts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(count.download_date)
        .bind(count.download_time)
        .bind(&count.region)
        .bind(&count.region_slug)
        .bind(&count.subregion)
        .bind(&count.subregion_slug)
        .bind(count.total_region_posts)
        .bind(count.subregion_posts)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_region_sector_count(&self, count: &RegionSectorCount) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO region_sector_counts
                (download_date, download_time, region, region_slug, subregion, subregion_slug,
                 sector, listing_url, total_posts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(count.download_date)
        .bind(count.download_time)
        .bind(&count.region)
        .bind(&count.region_slug)
        .bind(&count.subregion)
        .bind(&count.subregion_slug)
        .bind(&count.sector)
        .bind(&count.listing_url)
        .bind(count.total_posts)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_listings(&self, listings: &[ListingReference]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut inserted = 0;
        for listing in listings {
            let result = sqlx::query(
                r#"
                INSERT INTO listing_references
                    (site, unique_ad_id, post_date, region, subregion, sector,
                     has_photo, is_featured, url)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(listing.site.as_str())
            .bind(&listing.unique_ad_id)
            .bind(listing.post_date)
            .bind(&listing.region)
            .bind(&listing.subregion)
            .bind(&listing.sector)
            .bind(listing.has_photo)
            .bind(listing.is_featured)
            .bind(&listing.url)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            inserted += result.rows_affected();
        }
        tx.commit().await.map_err(db_err)?;
        Ok(inserted)
    }

    async fn insert_snapshot(&self, snapshot: &JobSnapshot) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_snapshots
                (site, download_date, download_time, unique_ad_id, post_date, status, record)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(snapshot.site.as_str())
        .bind(snapshot.download_date)
        .bind(snapshot.download_time)
        .bind(&snapshot.unique_ad_id)
        .bind(snapshot.post_date)
        .bind(snapshot.status.as_str())
        .bind(Json(&snapshot.record))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e
                && db.is_foreign_key_violation()
            {
                return AppError::OrphanSnapshot {
                    unique_ad_id: snapshot.unique_ad_id.clone(),
                    post_date: snapshot.post_date,
                };
            }
            db_err(e)
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn latest_subregions(&self) -> Result<Vec<Subregion>, AppError> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT region, region_slug, subregion, subregion_slug
            FROM region_ad_counts
            WHERE download_date = (SELECT MAX(download_date) FROM region_ad_counts)
            ORDER BY region, subregion
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(region, region_slug, subregion, subregion_slug)| Subregion {
                region,
                region_slug,
                subregion,
                subregion_slug,
            })
            .collect())
    }

    async fn latest_sector_scopes(&self) -> Result<Vec<DiscoveryScope>, AppError> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT region, subregion, sector, listing_url
            FROM region_sector_counts
            WHERE download_date = (SELECT MAX(download_date) FROM region_sector_counts)
            ORDER BY region, subregion, sector
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(region, subregion, sector, listing_url)| {
                DiscoveryScope::new(region, subregion, sector, listing_url)
            })
            .collect())
    }

    async fn last_download_date(
        &self,
        site: Site,
        scope: &DiscoveryScope,
    ) -> Result<Option<NaiveDate>, AppError> {
        sqlx::query_scalar(
            r#"
            SELECT last_download_date FROM scope_progress
            WHERE site = $1 AND region = $2 AND subregion = $3 AND sector = $4
            "#,
        )
        .bind(site.as_str())
        .bind(&scope.region)
        .bind(&scope.subregion)
        .bind(&scope.sector)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn record_scan(
        &self,
        site: Site,
        scope: &DiscoveryScope,
        download_date: NaiveDate,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO scope_progress (site, region, subregion, sector, last_download_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (site, region, subregion, sector) DO UPDATE
            SET last_download_date = GREATEST(scope_progress.last_download_date,
                                              EXCLUDED.last_download_date),
                updated_at = NOW()
            "#,
        )
        .bind(site.as_str())
        .bind(&scope.region)
        .bind(&scope.subregion)
        .bind(&scope.sector)
        .bind(download_date)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn due_for_refetch(
        &self,
        site: Site,
        today: NaiveDate,
        policy: &RefetchPolicy,
    ) -> Result<Vec<RefetchTarget>, AppError> {
        let due_dates = policy.due_post_dates(today);
        let rows = sqlx::query_as::<_, TargetRow>(
            r#"
            SELECT l.site, l.unique_ad_id, l.post_date, l.url
            FROM listing_references l
            WHERE l.site = $1
              AND l.post_date = ANY($2)
              AND NOT EXISTS (
                  SELECT 1 FROM job_snapshots s
                  WHERE s.site = l.site
                    AND s.unique_ad_id = l.unique_ad_id
                    AND s.post_date = l.post_date
                    AND s.status = 'CLOSED'
              )
            ORDER BY l.post_date DESC, l.unique_ad_id
            "#,
        )
        .bind(site.as_str())
        .bind(&due_dates)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(RefetchTarget::try_from).collect()
    }

    async fn compact(&self, site: Site, cutoff: NaiveDate) -> Result<CompactionReport, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let finished: Vec<(String, NaiveDate)> = sqlx::query_as(
            r#"
            SELECT unique_ad_id, post_date FROM job_snapshots
            WHERE site = $1 AND (status = 'CLOSED' OR post_date < $2)
            UNION
            SELECT unique_ad_id, post_date FROM listing_references
            WHERE site = $1 AND post_date < $2
            "#,
        )
        .bind(site.as_str())
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let (ids, post_dates): (Vec<String>, Vec<NaiveDate>) = finished.into_iter().unzip();

        sqlx::query(
            r#"
            INSERT INTO archived_snapshots
                (site, download_date, download_time, unique_ad_id, post_date, status, record)
            SELECT s.site, s.download_date, s.download_time, s.unique_ad_id, s.post_date,
                   s.status, s.record
            FROM job_snapshots s
            JOIN UNNEST($2::text[], $3::date[]) AS f(unique_ad_id, post_date)
              ON s.unique_ad_id = f.unique_ad_id AND s.post_date = f.post_date
            WHERE s.site = $1
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(site.as_str())
        .bind(&ids)
        .bind(&post_dates)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let snapshots = sqlx::query(
            r#"
            DELETE FROM job_snapshots s
            USING UNNEST($2::text[], $3::date[]) AS f(unique_ad_id, post_date)
            WHERE s.site = $1 AND s.unique_ad_id = f.unique_ad_id AND s.post_date = f.post_date
            "#,
        )
        .bind(site.as_str())
        .bind(&ids)
        .bind(&post_dates)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let listings = sqlx::query(
            r#"
            DELETE FROM listing_references l
            USING UNNEST($2::text[], $3::date[]) AS f(unique_ad_id, post_date)
            WHERE l.site = $1 AND l.unique_ad_id = f.unique_ad_id AND l.post_date = f.post_date
            "#,
        )
        .bind(site.as_str())
        .bind(&ids)
        .bind(&post_dates)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(CompactionReport {
            ads: ids.len() as u64,
            snapshots_archived: snapshots.rows_affected(),
            listings_removed: listings.rows_affected(),
        })
    }

    async fn archived_snapshots(&self, site: Site) -> Result<Vec<JobSnapshot>, AppError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT site, download_date, download_time, unique_ad_id, post_date, status, record
            FROM archived_snapshots
            WHERE site = $1
            ORDER BY download_date, unique_ad_id, post_date
            "#,
        )
        .bind(site.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(JobSnapshot::try_from).collect()
    }

    async fn clear_archive(&self, site: Site, keys: &[SnapshotKey]) -> Result<u64, AppError> {
        let keys: Vec<&SnapshotKey> = keys.iter().filter(|k| k.site == site).collect();
        if keys.is_empty() {
            return Ok(0);
        }
        let download_dates: Vec<NaiveDate> = keys.iter().map(|k| k.download_date).collect();
        let ids: Vec<&str> = keys.iter().map(|k| k.unique_ad_id.as_str()).collect();
        let post_dates: Vec<NaiveDate> = keys.iter().map(|k| k.post_date).collect();

        let result = sqlx::query(
            r#"
            DELETE FROM archived_snapshots a
            USING UNNEST($2::date[], $3::text[], $4::date[])
                AS k(download_date, unique_ad_id, post_date)
            WHERE a.site = $1
              AND a.download_date = k.download_date
              AND a.unique_ad_id = k.unique_ad_id
              AND a.post_date = k.post_date
            "#,
        )
        .bind(site.as_str())
        .bind(&download_dates)
        .bind(&ids)
        .bind(&post_dates)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn table_counts(&self, site: Site) -> Result<TableCounts, AppError> {
        let (region_counts, sector_counts, listings, snapshots, archived): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM region_ad_counts),
                (SELECT COUNT(*) FROM region_sector_counts),
                (SELECT COUNT(*) FROM listing_references WHERE site = $1),
                (SELECT COUNT(*) FROM job_snapshots WHERE site = $1),
                (SELECT COUNT(*) FROM archived_snapshots WHERE site = $1)
            "#,
        )
        .bind(site.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        // Region tables belong to the classifieds site only.
        let (region_counts, sector_counts) = if site.tracks_region_counts() {
            (region_counts, sector_counts)
        } else {
            (0, 0)
        };

        Ok(TableCounts {
            region_counts,
            sector_counts,
            listings,
            snapshots,
            archived,
        })
    }
}
