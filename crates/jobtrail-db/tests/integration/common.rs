use chrono::{NaiveDate, NaiveDateTime};
use jobtrail_core::models::{
    AdRecord, AdStatus, ClassifiedsAd, DiscoveryScope, JobSnapshot, ListingReference,
    RefetchTarget, Site,
};
use jobtrail_db::{CrawlRepository, Database};
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// Spins up a PostgreSQL container, runs the workspace migrations and
/// returns a repository on it.
///
/// The `ContainerAsync` must be kept in scope for the test duration;
/// dropping it stops the container.
pub async fn setup_test_db() -> (CrawlRepository, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "jobtrail_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/jobtrail_test");

    // Retry connection until container is fully ready
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    let db = Database::from_pool(pool);
    db.migrate().await.expect("Failed to run migrations");

    (db.crawl_repo(), container)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(day: NaiveDate) -> NaiveDateTime {
    day.and_hms_opt(9, 0, 0).unwrap()
}

pub fn scope() -> DiscoveryScope {
    DiscoveryScope::new(
        "Cairo",
        "Nasr City",
        "Accounting",
        "https://classifieds.example.com/en/jobs-services/accounting/nasr-city/",
    )
}

pub fn listing(id: &str, post_date: NaiveDate) -> ListingReference {
    ListingReference {
        site: Site::Classifieds,
        unique_ad_id: id.to_string(),
        post_date,
        region: "Cairo".into(),
        subregion: "Nasr City".into(),
        sector: "Accounting".into(),
        has_photo: true,
        is_featured: false,
        url: format!("https://classifieds.example.com/en/ad/{id}.html"),
    }
}

/// A snapshot of `listing` taken on `day` with the given status.
pub fn snapshot(listing: &ListingReference, day: NaiveDate, status: AdStatus) -> JobSnapshot {
    let target = RefetchTarget::from(listing);
    let record = match status {
        AdStatus::Closed => AdRecord::closed(&target, at(day)),
        AdStatus::Open => {
            let mut ad = ClassifiedsAd::closed(&target, at(day));
            ad.status = AdStatus::Open;
            ad.title = Some(format!("Ad {}", listing.unique_ad_id));
            AdRecord::Classifieds(ad)
        }
    };
    JobSnapshot::new(&target, at(day), record)
}
