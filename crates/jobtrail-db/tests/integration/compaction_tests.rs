use jobtrail_core::models::{AdRecord, AdStatus, JobSnapshot, Site, SnapshotKey};
use jobtrail_core::traits::CrawlStore;

use crate::integration::common::{date, listing, setup_test_db, snapshot};

#[tokio::test]
async fn compaction_moves_finished_ads_in_full() {
    let (repo, _container) = setup_test_db().await;
    let cutoff = date(2024, 1, 1);

    let live = listing("live", date(2024, 1, 20));
    let closed = listing("closed", date(2024, 1, 15));
    let expired = listing("expired", date(2023, 12, 20));
    let never_fetched = listing("never", date(2023, 12, 1));
    repo.insert_listings(&[
        live.clone(),
        closed.clone(),
        expired.clone(),
        never_fetched,
    ])
    .await
    .unwrap();

    repo.insert_snapshot(&snapshot(&live, date(2024, 1, 20), AdStatus::Open))
        .await
        .unwrap();
    repo.insert_snapshot(&snapshot(&closed, date(2024, 1, 15), AdStatus::Open))
        .await
        .unwrap();
    repo.insert_snapshot(&snapshot(&closed, date(2024, 1, 22), AdStatus::Closed))
        .await
        .unwrap();
    repo.insert_snapshot(&snapshot(&expired, date(2023, 12, 27), AdStatus::Open))
        .await
        .unwrap();

    let report = repo.compact(Site::Classifieds, cutoff).await.unwrap();
    assert_eq!(report.ads, 3);
    assert_eq!(report.snapshots_archived, 3);
    assert_eq!(report.listings_removed, 3);

    let counts = repo.table_counts(Site::Classifieds).await.unwrap();
    assert_eq!(counts.listings, 1);
    assert_eq!(counts.snapshots, 1);
    assert_eq!(counts.archived, 3);

    let archived = repo.archived_snapshots(Site::Classifieds).await.unwrap();
    let keys: Vec<(&str, _)> = archived
        .iter()
        .map(|s| (s.unique_ad_id.as_str(), s.download_date))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("expired", date(2023, 12, 27)),
            ("closed", date(2024, 1, 15)),
            ("closed", date(2024, 1, 22)),
        ]
    );

    // The record survives the JSONB round trip.
    let AdRecord::Classifieds(ad) = &archived[0].record else {
        panic!("expected a classifieds record");
    };
    assert_eq!(ad.title.as_deref(), Some("Ad expired"));
    assert_eq!(archived[2].status, AdStatus::Closed);

    // Nothing left to move.
    let again = repo.compact(Site::Classifieds, cutoff).await.unwrap();
    assert_eq!(again.ads, 0);
    assert_eq!(again.snapshots_archived, 0);
}

#[tokio::test]
async fn compaction_is_scoped_to_site() {
    let (repo, _container) = setup_test_db().await;
    let old = listing("old", date(2023, 10, 1));
    repo.insert_listings(std::slice::from_ref(&old)).await.unwrap();

    let report = repo.compact(Site::JobBoard, date(2024, 1, 1)).await.unwrap();
    assert_eq!(report.ads, 0);
    assert_eq!(repo.table_counts(Site::Classifieds).await.unwrap().listings, 1);
}

#[tokio::test]
async fn clear_archive_after_export() {
    let (repo, _container) = setup_test_db().await;
    let closed = listing("closed", date(2024, 1, 15));
    repo.insert_listings(std::slice::from_ref(&closed)).await.unwrap();
    repo.insert_snapshot(&snapshot(&closed, date(2024, 1, 22), AdStatus::Closed))
        .await
        .unwrap();
    repo.compact(Site::Classifieds, date(2024, 1, 1)).await.unwrap();

    let archived = repo.archived_snapshots(Site::Classifieds).await.unwrap();
    assert_eq!(archived.len(), 1);
    let keys: Vec<SnapshotKey> = archived.iter().map(JobSnapshot::key).collect();

    assert_eq!(repo.clear_archive(Site::JobBoard, &keys).await.unwrap(), 0);
    assert_eq!(repo.clear_archive(Site::Classifieds, &keys).await.unwrap(), 1);
    assert!(repo.archived_snapshots(Site::Classifieds).await.unwrap().is_empty());
    assert_eq!(repo.clear_archive(Site::Classifieds, &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn clear_archive_keeps_rows_archived_after_export() {
    let (repo, _container) = setup_test_db().await;
    let early = listing("early", date(2024, 1, 15));
    let late = listing("late", date(2024, 1, 20));
    repo.insert_listings(&[early.clone(), late.clone()]).await.unwrap();
    repo.insert_snapshot(&snapshot(&early, date(2024, 1, 22), AdStatus::Closed))
        .await
        .unwrap();
    repo.compact(Site::Classifieds, date(2024, 1, 1)).await.unwrap();

    let exported: Vec<SnapshotKey> = repo
        .archived_snapshots(Site::Classifieds)
        .await
        .unwrap()
        .iter()
        .map(JobSnapshot::key)
        .collect();

    // A compaction lands between the export and the clear.
    repo.insert_snapshot(&snapshot(&late, date(2024, 1, 27), AdStatus::Closed))
        .await
        .unwrap();
    repo.compact(Site::Classifieds, date(2024, 1, 1)).await.unwrap();

    assert_eq!(repo.clear_archive(Site::Classifieds, &exported).await.unwrap(), 1);
    let remaining = repo.archived_snapshots(Site::Classifieds).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].unique_ad_id, "late");
}
