use chrono::NaiveTime;
use jobtrail_core::error::AppError;
use jobtrail_core::models::{AdStatus, DiscoveryScope, RegionCount, RegionSectorCount, Site};
use jobtrail_core::schedule::RefetchPolicy;
use jobtrail_core::traits::CrawlStore;

use crate::integration::common::{date, listing, scope, setup_test_db, snapshot};

fn region_count(day: u32, subregion: &str) -> RegionCount {
    RegionCount {
        download_date: date(2024, 1, day),
        download_time: NaiveTime::from_hms_opt(0, 10, 0).unwrap(),
        region: "Cairo".into(),
        region_slug: "cairo".into(),
        subregion: subregion.into(),
        subregion_slug: subregion.to_lowercase().replace(' ', "-"),
        total_region_posts: Some(1200),
        subregion_posts: None,
    }
}

fn sector_count(day: u32, sector: &str) -> RegionSectorCount {
    RegionSectorCount {
        download_date: date(2024, 1, day),
        download_time: NaiveTime::from_hms_opt(0, 20, 0).unwrap(),
        region: "Cairo".into(),
        region_slug: "cairo".into(),
        subregion: "Nasr City".into(),
        subregion_slug: "nasr-city".into(),
        sector: sector.into(),
        listing_url: format!("https://classifieds.example.com/en/jobs-services/{sector}/nasr-city/"),
        total_posts: Some(42),
    }
}

#[tokio::test]
async fn count_inserts_ignore_duplicates_and_latest_snapshot_wins() {
    let (repo, _container) = setup_test_db().await;

    assert!(repo.insert_region_count(&region_count(16, "Maadi")).await.unwrap());
    assert!(!repo.insert_region_count(&region_count(16, "Maadi")).await.unwrap());
    assert!(repo.insert_region_count(&region_count(17, "Nasr City")).await.unwrap());

    let subregions = repo.latest_subregions().await.unwrap();
    assert_eq!(subregions.len(), 1);
    assert_eq!(subregions[0].subregion, "Nasr City");
    assert_eq!(subregions[0].subregion_slug, "nasr-city");

    assert!(repo.insert_region_sector_count(&sector_count(16, "sales")).await.unwrap());
    assert!(repo.insert_region_sector_count(&sector_count(17, "accounting")).await.unwrap());
    assert!(repo.insert_region_sector_count(&sector_count(17, "drivers")).await.unwrap());
    assert!(!repo.insert_region_sector_count(&sector_count(17, "drivers")).await.unwrap());

    let scopes = repo.latest_sector_scopes().await.unwrap();
    let sectors: Vec<&str> = scopes.iter().map(|s| s.sector.as_str()).collect();
    assert_eq!(sectors, vec!["accounting", "drivers"]);
}

#[tokio::test]
async fn listing_batch_is_insert_if_absent() {
    let (repo, _container) = setup_test_db().await;
    let batch = vec![listing("a", date(2024, 1, 10)), listing("b", date(2024, 1, 10))];

    assert_eq!(repo.insert_listings(&batch).await.unwrap(), 2);
    assert_eq!(repo.insert_listings(&batch).await.unwrap(), 0);

    // Same id with a new post date is a separate ad.
    assert_eq!(
        repo.insert_listings(&[listing("a", date(2024, 1, 11))]).await.unwrap(),
        1
    );
    assert_eq!(repo.table_counts(Site::Classifieds).await.unwrap().listings, 3);
}

#[tokio::test]
async fn snapshot_requires_listing_reference() {
    let (repo, _container) = setup_test_db().await;
    let orphan = snapshot(&listing("x", date(2024, 1, 10)), date(2024, 1, 17), AdStatus::Open);

    let err = repo.insert_snapshot(&orphan).await.unwrap_err();
    match err {
        AppError::OrphanSnapshot {
            unique_ad_id,
            post_date,
        } => {
            assert_eq!(unique_ad_id, "x");
            assert_eq!(post_date, date(2024, 1, 10));
        }
        other => panic!("expected OrphanSnapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn snapshot_insert_is_idempotent() {
    let (repo, _container) = setup_test_db().await;
    let ad = listing("a", date(2024, 1, 10));
    repo.insert_listings(std::slice::from_ref(&ad)).await.unwrap();

    let snap = snapshot(&ad, date(2024, 1, 17), AdStatus::Open);
    assert!(repo.insert_snapshot(&snap).await.unwrap());
    assert!(!repo.insert_snapshot(&snap).await.unwrap());

    let counts = repo.table_counts(Site::Classifieds).await.unwrap();
    assert_eq!(counts.snapshots, 1);
    assert_eq!(repo.table_counts(Site::JobBoard).await.unwrap().snapshots, 0);
}

#[tokio::test]
async fn refetch_window_and_closed_exclusion() {
    let (repo, _container) = setup_test_db().await;
    let policy = RefetchPolicy::new(7, 14);
    let due = listing("due", date(2024, 1, 1));
    let off_cadence = listing("off", date(2024, 1, 2));
    let closed = listing("closed", date(2024, 1, 1));
    repo.insert_listings(&[due.clone(), off_cadence, closed.clone()])
        .await
        .unwrap();
    repo.insert_snapshot(&snapshot(&closed, date(2024, 1, 15), AdStatus::Closed))
        .await
        .unwrap();

    let targets = repo
        .due_for_refetch(Site::Classifieds, date(2024, 2, 26), &policy)
        .await
        .unwrap();
    let ids: Vec<&str> = targets.iter().map(|t| t.unique_ad_id.as_str()).collect();
    assert_eq!(ids, vec!["due"]);
    assert_eq!(targets[0].url, due.url);

    // 105 days is past the last window.
    let targets = repo
        .due_for_refetch(Site::Classifieds, date(2024, 4, 15), &policy)
        .await
        .unwrap();
    assert!(targets.is_empty());
}

#[tokio::test]
async fn last_download_date_is_per_scope() {
    let (repo, _container) = setup_test_db().await;
    assert_eq!(
        repo.last_download_date(Site::Classifieds, &scope()).await.unwrap(),
        None
    );

    repo.record_scan(Site::Classifieds, &scope(), date(2024, 1, 12))
        .await
        .unwrap();
    // An older date never moves progress back.
    repo.record_scan(Site::Classifieds, &scope(), date(2024, 1, 10))
        .await
        .unwrap();
    assert_eq!(
        repo.last_download_date(Site::Classifieds, &scope()).await.unwrap(),
        Some(date(2024, 1, 12))
    );

    let other = DiscoveryScope::new("Cairo", "Nasr City", "Sales", "https://x.example.com/");
    assert_eq!(
        repo.last_download_date(Site::Classifieds, &other).await.unwrap(),
        None
    );
    assert_eq!(
        repo.last_download_date(Site::JobBoard, &scope()).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn snapshots_and_compaction_do_not_move_scan_progress() {
    let (repo, _container) = setup_test_db().await;
    repo.record_scan(Site::Classifieds, &scope(), date(2024, 1, 10))
        .await
        .unwrap();

    let ad = listing("a", date(2024, 1, 10));
    repo.insert_listings(std::slice::from_ref(&ad)).await.unwrap();
    repo.insert_snapshot(&snapshot(&ad, date(2024, 1, 17), AdStatus::Open))
        .await
        .unwrap();
    assert_eq!(
        repo.last_download_date(Site::Classifieds, &scope()).await.unwrap(),
        Some(date(2024, 1, 10))
    );

    repo.compact(Site::Classifieds, date(2024, 3, 1)).await.unwrap();
    assert_eq!(repo.table_counts(Site::Classifieds).await.unwrap().listings, 0);
    assert_eq!(
        repo.last_download_date(Site::Classifieds, &scope()).await.unwrap(),
        Some(date(2024, 1, 10))
    );
}
