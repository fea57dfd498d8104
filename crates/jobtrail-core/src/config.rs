use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;

use crate::clock::SystemClock;
use crate::error::AppError;
use crate::models::Site;
use crate::retry::RetryConfig;
use crate::schedule::RefetchPolicy;
use crate::throttle::ThrottleConfig;

/// Per-site crawl and retention parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteProfile {
    pub refetch: RefetchPolicy,
    /// Ads older than this many days are moved to the archive.
    pub retention_days: u32,
    /// How far back the first scan of a scope reaches.
    pub first_crawl_lookback_days: u32,
    /// Hard limit on listing pages per scan.
    pub max_listing_pages: u32,
}

impl SiteProfile {
    pub fn for_site(site: Site) -> Self {
        match site {
            Site::Classifieds => Self {
                refetch: RefetchPolicy::new(7, 14),
                retention_days: 93,
                first_crawl_lookback_days: 30,
                max_listing_pages: 500,
            },
            Site::JobBoard => Self {
                refetch: RefetchPolicy::new(7, 7),
                retention_days: 56,
                first_crawl_lookback_days: 29,
                max_listing_pages: 500,
            },
        }
    }
}

/// Runtime configuration for crawl, compaction and export.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub classifieds: SiteProfile,
    pub job_board: SiteProfile,
    pub retry: RetryConfig,
    pub throttle: ThrottleConfig,
    /// Directory archive CSV files are written to.
    pub export_dir: PathBuf,
    /// Offset of the sites' local time from UTC.
    pub utc_offset_hours: i32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            classifieds: SiteProfile::for_site(Site::Classifieds),
            job_board: SiteProfile::for_site(Site::JobBoard),
            retry: RetryConfig::default(),
            throttle: ThrottleConfig::default(),
            export_dir: PathBuf::from("."),
            utc_offset_hours: SystemClock::DEFAULT_OFFSET_HOURS,
        }
    }
}

impl CrawlConfig {
    /// Read configuration from environment variables.
    ///
    /// - `JOBTRAIL_EXPORT_DIR` (optional, defaults to the working directory)
    /// - `JOBTRAIL_UTC_OFFSET_HOURS` (optional, defaults to 2)
    /// - `JOBTRAIL_REQUEST_DELAY_MS` (optional, base per-host delay, defaults to 1000)
    /// - `JOBTRAIL_MAX_ATTEMPTS` (optional, defaults to 5)
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("JOBTRAIL_EXPORT_DIR") {
            config.export_dir = PathBuf::from(dir);
        }
        if let Some(hours) = parse_env::<i32>("JOBTRAIL_UTC_OFFSET_HOURS")? {
            config.utc_offset_hours = hours;
        }
        if let Some(ms) = parse_env::<u64>("JOBTRAIL_REQUEST_DELAY_MS")? {
            config.throttle.delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_env::<u32>("JOBTRAIL_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err(AppError::ConfigError(
                    "JOBTRAIL_MAX_ATTEMPTS must be at least 1".into(),
                ));
            }
            config.retry.max_attempts = attempts;
        }

        config.utc_offset()?;
        Ok(config)
    }

    pub fn profile(&self, site: Site) -> &SiteProfile {
        match site {
            Site::Classifieds => &self.classifieds,
            Site::JobBoard => &self.job_board,
        }
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, AppError> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            AppError::ConfigError(format!(
                "Invalid UTC offset {}h: must be between -23 and 23",
                self.utc_offset_hours
            ))
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, AppError> {
    match std::env::var(key) {
        Err(_) => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::ConfigError(format!("Invalid {key} '{raw}'"))),
    }
}
