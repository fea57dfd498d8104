use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Marker written in place of a field the page did not provide.
pub const UNKNOWN: &str = "NA";

/// Scope label used by sites that have a single site-wide listing.
pub const SITE_WIDE: &str = "*";

/// The two job-advertisement sites jobtrail crawls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    /// General classifieds site with per-region and per-sector listings.
    Classifieds,
    /// Dedicated job board with one newest-first listing.
    JobBoard,
}

impl Site {
    pub const ALL: [Site; 2] = [Site::Classifieds, Site::JobBoard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Site::Classifieds => "classifieds",
            Site::JobBoard => "job_board",
        }
    }

    /// Whether discovery scopes come from the region/sector count tables.
    pub fn tracks_region_counts(&self) -> bool {
        matches!(self, Site::Classifieds)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Site {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "classifieds" => Ok(Site::Classifieds),
            "job_board" | "jobboard" => Ok(Site::JobBoard),
            _ => Err(format!("Unknown site: {}", s)),
        }
    }
}

/// Whether an ad was still live when it was scraped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdStatus {
    Open,
    Closed,
}

impl AdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdStatus::Open => "OPEN",
            AdStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for AdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AdStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPEN" => Ok(AdStatus::Open),
            "CLOSED" => Ok(AdStatus::Closed),
            _ => Err(format!("Unknown ad status: {}", s)),
        }
    }
}

/// Daily ad count for one region/subregion pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionCount {
    pub download_date: NaiveDate,
    pub download_time: NaiveTime,
    pub region: String,
    pub region_slug: String,
    pub subregion: String,
    pub subregion_slug: String,
    pub total_region_posts: Option<i64>,
    pub subregion_posts: Option<i64>,
}

/// A subregion known from the latest region count snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subregion {
    pub region: String,
    pub region_slug: String,
    pub subregion: String,
    pub subregion_slug: String,
}

/// Daily job count for one region/subregion/sector, with the sector's listing URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSectorCount {
    pub download_date: NaiveDate,
    pub download_time: NaiveTime,
    pub region: String,
    pub region_slug: String,
    pub subregion: String,
    pub subregion_slug: String,
    pub sector: String,
    pub listing_url: String,
    pub total_posts: Option<i64>,
}

/// A listing to scan for new ads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiscoveryScope {
    pub region: String,
    pub subregion: String,
    pub sector: String,
    pub listing_url: String,
}

impl DiscoveryScope {
    pub fn new(
        region: impl Into<String>,
        subregion: impl Into<String>,
        sector: impl Into<String>,
        listing_url: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            subregion: subregion.into(),
            sector: sector.into(),
            listing_url: listing_url.into(),
        }
    }

    /// Scope covering a site's single newest-first listing.
    pub fn site_wide(listing_url: impl Into<String>) -> Self {
        Self::new(SITE_WIDE, SITE_WIDE, SITE_WIDE, listing_url)
    }
}

impl fmt::Display for DiscoveryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.region, self.subregion, self.sector)
    }
}

/// One ad entry as it appears on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub unique_ad_id: String,
    pub post_date: NaiveDate,
    pub url: String,
    pub has_photo: bool,
    pub is_featured: bool,
}

/// A parsed listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub entries: Vec<ListingEntry>,
    /// Total page count when the site advertises it.
    pub total_pages: Option<u32>,
    /// Explicit link to the next page when the site provides one.
    pub next_url: Option<String>,
}

impl ListingPage {
    pub fn min_post_date(&self) -> Option<NaiveDate> {
        self.entries.iter().map(|e| e.post_date).min()
    }

    /// Whether the site indicates a page after `page_number`.
    pub fn has_next(&self, page_number: u32) -> bool {
        self.next_url.is_some() || self.total_pages.is_some_and(|total| page_number < total)
    }
}

/// A discovered ad. Created once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingReference {
    pub site: Site,
    pub unique_ad_id: String,
    pub post_date: NaiveDate,
    pub region: String,
    pub subregion: String,
    pub sector: String,
    pub has_photo: bool,
    pub is_featured: bool,
    pub url: String,
}

impl ListingReference {
    pub fn from_entry(site: Site, scope: &DiscoveryScope, entry: &ListingEntry) -> Self {
        Self {
            site,
            unique_ad_id: entry.unique_ad_id.clone(),
            post_date: entry.post_date,
            region: scope.region.clone(),
            subregion: scope.subregion.clone(),
            sector: scope.sector.clone(),
            has_photo: entry.has_photo,
            is_featured: entry.is_featured,
            url: entry.url.clone(),
        }
    }
}

/// A known ad due for a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefetchTarget {
    pub site: Site,
    pub unique_ad_id: String,
    /// Post date from the listing reference; ground truth for scheduling.
    pub post_date: NaiveDate,
    pub url: String,
}

impl From<&ListingReference> for RefetchTarget {
    fn from(listing: &ListingReference) -> Self {
        Self {
            site: listing.site,
            unique_ad_id: listing.unique_ad_id.clone(),
            post_date: listing.post_date,
            url: listing.url.clone(),
        }
    }
}

/// A multi-valued field stored as one `>`-separated string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelimitedList(Vec<String>);

impl DelimitedList {
    pub const SEPARATOR: char = '>';

    pub fn new<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self(
            items
                .into_iter()
                .map(|item| item.as_ref().replace(Self::SEPARATOR, " ").trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        )
    }

    pub fn parse(joined: &str) -> Self {
        Self::new(joined.split(Self::SEPARATOR))
    }

    pub fn items(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first `N` items as a fixed-size tuple, padded with `None`.
    pub fn leading<const N: usize>(&self) -> [Option<&str>; N] {
        std::array::from_fn(|i| self.0.get(i).map(String::as_str))
    }
}

impl fmt::Display for DelimitedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = [0u8; 4];
        let sep = Self::SEPARATOR.encode_utf8(&mut sep);
        write!(f, "{}", self.0.join(sep))
    }
}

impl Serialize for DelimitedList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DelimitedList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let joined = String::deserialize(deserializer)?;
        Ok(Self::parse(&joined))
    }
}

/// Full content of one classifieds ad page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedsAd {
    pub download_date: NaiveDate,
    pub download_time: NaiveTime,
    pub unique_ad_id: String,
    pub post_date: NaiveDate,
    pub post_time: Option<NaiveTime>,
    pub page_views: Option<i64>,
    pub title: Option<String>,
    pub experience_level: Option<String>,
    pub education_level: Option<String>,
    #[serde(rename = "type")]
    pub ad_type: Option<String>,
    pub employ_type: Option<String>,
    pub compensation: Option<i64>,
    pub description: Option<String>,
    pub text_language: Option<String>,
    pub user_href: Option<String>,
    pub username: Option<String>,
    pub user_join_month: Option<String>,
    pub user_join_year: Option<i32>,
    pub email_available: bool,
    pub phone_available: bool,
    pub status: AdStatus,
}

impl ClassifiedsAd {
    pub const COLUMNS: [&'static str; 21] = [
        "downloadDate",
        "downloadTime",
        "uniqueAdId",
        "postDate",
        "postTime",
        "pageViews",
        "title",
        "experienceLevel",
        "educationLevel",
        "type",
        "employType",
        "compensation",
        "description",
        "textLanguage",
        "userHref",
        "username",
        "userJoinMonth",
        "userJoinYear",
        "emailAvailable",
        "phoneAvailable",
        "status",
    ];

    /// An empty record for an ad that no longer exists.
    pub fn closed(target: &RefetchTarget, downloaded_at: NaiveDateTime) -> Self {
        Self {
            download_date: downloaded_at.date(),
            download_time: downloaded_at.time(),
            unique_ad_id: target.unique_ad_id.clone(),
            post_date: target.post_date,
            post_time: None,
            page_views: None,
            title: None,
            experience_level: None,
            education_level: None,
            ad_type: None,
            employ_type: None,
            compensation: None,
            description: None,
            text_language: None,
            user_href: None,
            username: None,
            user_join_month: None,
            user_join_year: None,
            email_available: false,
            phone_available: false,
            status: AdStatus::Closed,
        }
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            format_date(self.download_date),
            format_time(self.download_time),
            self.unique_ad_id.clone(),
            format_date(self.post_date),
            or_unknown(self.post_time.map(format_time)),
            or_unknown(self.page_views),
            or_unknown(self.title.as_ref()),
            or_unknown(self.experience_level.as_ref()),
            or_unknown(self.education_level.as_ref()),
            or_unknown(self.ad_type.as_ref()),
            or_unknown(self.employ_type.as_ref()),
            or_unknown(self.compensation),
            or_unknown(self.description.as_ref()),
            or_unknown(self.text_language.as_ref()),
            or_unknown(self.user_href.as_ref()),
            or_unknown(self.username.as_ref()),
            or_unknown(self.user_join_month.as_ref()),
            or_unknown(self.user_join_year),
            flag(self.email_available),
            flag(self.phone_available),
            self.status.to_string(),
        ]
    }
}

/// Full content of one job board ad page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobBoardAd {
    pub unique_id: String,
    pub post_date: NaiveDate,
    pub post_time: Option<NaiveTime>,
    pub download_date: NaiveDate,
    pub download_time: NaiveTime,
    pub status: AdStatus,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub num_applicants: Option<i64>,
    pub num_vacancies: Option<i64>,
    pub num_seen: Option<i64>,
    pub num_shortlisted: Option<i64>,
    pub num_rejected: Option<i64>,
    pub experience_needed: Option<String>,
    pub career_level: Option<String>,
    pub job_type: Option<String>,
    pub salary: Option<String>,
    pub education_level: Option<String>,
    pub gender: Option<String>,
    pub travel_frequency: Option<String>,
    pub languages: DelimitedList,
    pub vacancies: Option<String>,
    pub roles: DelimitedList,
    pub keywords: DelimitedList,
    pub requirements: DelimitedList,
    pub industries: DelimitedList,
}

impl JobBoardAd {
    pub const COLUMNS: [&'static str; 27] = [
        "uniqueId",
        "postDate",
        "postTime",
        "downloadDate",
        "downloadTime",
        "status",
        "jobTitle",
        "company",
        "location",
        "numApplicants",
        "numVacancies",
        "numSeen",
        "numShortlisted",
        "numRejected",
        "experienceNeeded",
        "careerLevel",
        "jobType",
        "salary",
        "educationLevel",
        "gender",
        "travelFrequency",
        "languages",
        "vacancies",
        "roles",
        "keywords",
        "requirements",
        "industries",
    ];

    /// A record with only the identifying fields set.
    pub fn empty(target: &RefetchTarget, downloaded_at: NaiveDateTime, status: AdStatus) -> Self {
        Self {
            unique_id: target.unique_ad_id.clone(),
            post_date: target.post_date,
            post_time: None,
            download_date: downloaded_at.date(),
            download_time: downloaded_at.time(),
            status,
            job_title: None,
            company: None,
            location: None,
            num_applicants: None,
            num_vacancies: None,
            num_seen: None,
            num_shortlisted: None,
            num_rejected: None,
            experience_needed: None,
            career_level: None,
            job_type: None,
            salary: None,
            education_level: None,
            gender: None,
            travel_frequency: None,
            languages: DelimitedList::default(),
            vacancies: None,
            roles: DelimitedList::default(),
            keywords: DelimitedList::default(),
            requirements: DelimitedList::default(),
            industries: DelimitedList::default(),
        }
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.unique_id.clone(),
            format_date(self.post_date),
            or_unknown(self.post_time.map(format_time)),
            format_date(self.download_date),
            format_time(self.download_time),
            self.status.to_string(),
            or_unknown(self.job_title.as_ref()),
            or_unknown(self.company.as_ref()),
            or_unknown(self.location.as_ref()),
            or_unknown(self.num_applicants),
            or_unknown(self.num_vacancies),
            or_unknown(self.num_seen),
            or_unknown(self.num_shortlisted),
            or_unknown(self.num_rejected),
            or_unknown(self.experience_needed.as_ref()),
            or_unknown(self.career_level.as_ref()),
            or_unknown(self.job_type.as_ref()),
            or_unknown(self.salary.as_ref()),
            or_unknown(self.education_level.as_ref()),
            or_unknown(self.gender.as_ref()),
            or_unknown(self.travel_frequency.as_ref()),
            list_or_unknown(&self.languages),
            or_unknown(self.vacancies.as_ref()),
            list_or_unknown(&self.roles),
            list_or_unknown(&self.keywords),
            list_or_unknown(&self.requirements),
            list_or_unknown(&self.industries),
        ]
    }
}

/// The scraped content of an ad, tagged by site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdRecord {
    Classifieds(ClassifiedsAd),
    JobBoard(JobBoardAd),
}

impl AdRecord {
    /// The record written when an ad page is gone.
    pub fn closed(target: &RefetchTarget, downloaded_at: NaiveDateTime) -> Self {
        match target.site {
            Site::Classifieds => AdRecord::Classifieds(ClassifiedsAd::closed(target, downloaded_at)),
            Site::JobBoard => {
                AdRecord::JobBoard(JobBoardAd::empty(target, downloaded_at, AdStatus::Closed))
            }
        }
    }

    pub fn site(&self) -> Site {
        match self {
            AdRecord::Classifieds(_) => Site::Classifieds,
            AdRecord::JobBoard(_) => Site::JobBoard,
        }
    }

    pub fn status(&self) -> AdStatus {
        match self {
            AdRecord::Classifieds(ad) => ad.status,
            AdRecord::JobBoard(ad) => ad.status,
        }
    }

    /// Export header for a site's records.
    pub fn columns(site: Site) -> &'static [&'static str] {
        match site {
            Site::Classifieds => &ClassifiedsAd::COLUMNS,
            Site::JobBoard => &JobBoardAd::COLUMNS,
        }
    }

    /// One export row, in [`AdRecord::columns`] order.
    pub fn csv_row(&self) -> Vec<String> {
        match self {
            AdRecord::Classifieds(ad) => ad.csv_row(),
            AdRecord::JobBoard(ad) => ad.csv_row(),
        }
    }
}

/// Primary key of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub site: Site,
    pub download_date: NaiveDate,
    pub unique_ad_id: String,
    pub post_date: NaiveDate,
}

/// A point-in-time capture of one ad.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub site: Site,
    pub download_date: NaiveDate,
    pub download_time: NaiveTime,
    pub unique_ad_id: String,
    /// Listing post date, not the one scraped from the ad page.
    pub post_date: NaiveDate,
    pub status: AdStatus,
    pub record: AdRecord,
}

impl JobSnapshot {
    pub fn new(target: &RefetchTarget, downloaded_at: NaiveDateTime, record: AdRecord) -> Self {
        Self {
            site: target.site,
            download_date: downloaded_at.date(),
            download_time: downloaded_at.time(),
            unique_ad_id: target.unique_ad_id.clone(),
            post_date: target.post_date,
            status: record.status(),
            record,
        }
    }

    pub fn key(&self) -> SnapshotKey {
        SnapshotKey {
            site: self.site,
            download_date: self.download_date,
            unique_ad_id: self.unique_ad_id.clone(),
            post_date: self.post_date,
        }
    }

    /// The `(unique_ad_id, post_date)` pair shared with the listing reference.
    pub fn ad_key(&self) -> (&str, NaiveDate) {
        (&self.unique_ad_id, self.post_date)
    }
}

/// Row counts per table, for run reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub region_counts: i64,
    pub sector_counts: i64,
    pub listings: i64,
    pub snapshots: i64,
    pub archived: i64,
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn or_unknown<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| UNKNOWN.to_string(), |v| v.to_string())
}

fn list_or_unknown(list: &DelimitedList) -> String {
    if list.is_empty() {
        UNKNOWN.to_string()
    } else {
        list.to_string()
    }
}

fn flag(value: bool) -> String {
    (if value { "1" } else { "0" }).to_string()
}
