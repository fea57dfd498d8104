//! Adapter for the dedicated job board.
//!
//! The board has one newest-first listing for the whole country, paged
//! through explicit "next" links, and ad pages that expose applicant
//! statistics alongside the job summary.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use jobtrail_core::dates::parse_job_board_timestamp;
use jobtrail_core::error::AppError;
use jobtrail_core::models::{
    AdRecord, AdStatus, DelimitedList, DiscoveryScope, JobBoardAd, ListingEntry, ListingPage,
    RefetchTarget, Site,
};
use jobtrail_core::traits::SiteAdapter;
use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use crate::html::{attr, first_text, parse_count, selector, text};

pub const DEFAULT_LISTING_URL: &str =
    "https://wuzzuf.net/search/jobs?start=0&filters%5Bcountry%5D%5B0%5D=Egypt";

static RE_JOB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:jobs/p|internship)/(\d+)-").unwrap());

#[derive(Debug, Clone)]
pub struct JobBoardAdapter {
    listing_url: String,
}

impl Default for JobBoardAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_LISTING_URL)
    }
}

impl JobBoardAdapter {
    pub fn new(listing_url: impl Into<String>) -> Self {
        Self {
            listing_url: listing_url.into(),
        }
    }

    fn absolute(&self, href: &str) -> Option<Url> {
        Url::parse(&self.listing_url).ok()?.join(href).ok()
    }
}

impl SiteAdapter for JobBoardAdapter {
    fn site(&self) -> Site {
        Site::JobBoard
    }

    fn seed_scopes(&self) -> Vec<DiscoveryScope> {
        vec![DiscoveryScope::site_wide(&self.listing_url)]
    }

    fn parse_listing_page(&self, html: &str, _today: NaiveDate) -> Result<ListingPage, AppError> {
        let doc = Html::parse_document(html);
        let Some(card) = doc
            .select(&selector("div.content-card.card-has-jobs")?)
            .next()
        else {
            // Past the last page the board renders no job card at all.
            return Ok(ListingPage::default());
        };

        let link = selector("a[href]")?;
        let time = selector("time[title]")?;
        let mut entries = Vec::new();
        for item in card.select(&selector("div.new-time")?) {
            let Some(url) = item
                .select(&link)
                .next()
                .and_then(|a| attr(a, "href"))
                .and_then(|href| self.absolute(&href))
                .map(without_query)
            else {
                continue;
            };
            let Some(unique_ad_id) = RE_JOB_ID.captures(&url).map(|c| c[1].to_string()) else {
                tracing::debug!(%url, "Job link without an id");
                continue;
            };
            let Some(posted) = item
                .select(&time)
                .next()
                .and_then(|t| attr(t, "title"))
                .and_then(|title| parse_job_board_timestamp(&title))
            else {
                tracing::debug!(%url, "Job link without a parseable post time");
                continue;
            };
            entries.push(ListingEntry {
                unique_ad_id,
                post_date: posted.date(),
                url,
                has_photo: false,
                is_featured: false,
            });
        }

        let next_url = card
            .select(&selector("li.pag-next a[href]")?)
            .next()
            .and_then(|a| attr(a, "href"))
            .and_then(|href| self.absolute(&href))
            .map(String::from);

        Ok(ListingPage {
            entries,
            total_pages: None,
            next_url,
        })
    }

    fn parse_ad_page(
        &self,
        html: &str,
        target: &RefetchTarget,
        now: NaiveDateTime,
    ) -> Result<AdRecord, AppError> {
        let doc = Html::parse_document(html);
        let root = doc.root_element();

        let status = if doc
            .select(&selector("div.alert.alert-danger.alert-job")?)
            .next()
            .is_some()
        {
            AdStatus::Closed
        } else {
            AdStatus::Open
        };
        let mut ad = JobBoardAd::empty(target, now, status);

        // Some postings never filled in the main card; keep the identity only.
        let Some(main) = doc
            .select(&selector("div.job-main-card.content-card")?)
            .next()
        else {
            return Ok(AdRecord::JobBoard(ad));
        };

        ad.job_title = first_text(main, &selector(".job-title")?);
        ad.company = first_text(main, &selector(".job-company-name")?);
        ad.location = first_text(main, &selector(".job-company-location")?);
        ad.num_applicants = count_in(main, "div.applicants-num")?;
        ad.num_vacancies = count_in(main, "span.vacancies-num")?;

        let stats: Vec<Option<i64>> = main
            .select(&selector("div.applicants-stat-num")?)
            .map(|s| parse_count(&text(s)))
            .collect();
        ad.num_seen = stats.first().copied().flatten();
        ad.num_shortlisted = stats.get(1).copied().flatten();
        ad.num_rejected = stats.get(2).copied().flatten();

        ad.post_time = main
            .select(&selector("p.job-post-date")?)
            .next()
            .and_then(|p| attr(p, "title"))
            .and_then(|title| parse_job_board_timestamp(&title))
            .map(|posted| posted.time());

        for dl in doc.select(&selector("div.row.job-summary dl")?) {
            let Some((name, value)) = text(dl).split_once(':').map(|(n, v)| {
                (n.trim().to_lowercase().replace(' ', "_"), v.trim().to_string())
            }) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match name.as_str() {
                "experience_needed" => ad.experience_needed = Some(value),
                "career_level" => ad.career_level = Some(value),
                "job_type" => ad.job_type = Some(value),
                "salary" => ad.salary = Some(salary(&value)),
                "education_level" => ad.education_level = Some(value),
                "gender" => ad.gender = Some(value),
                "travel_frequency" => ad.travel_frequency = Some(value),
                "languages" => ad.languages = DelimitedList::new(value.split(',')),
                "vacancies" => ad.vacancies = Some(value),
                _ => {}
            }
        }

        if let Some(about) = doc.select(&selector("div.about-job.content-card")?).next() {
            ad.roles = labels(about, "div.labels-wrapper a")?;
        }

        if let Some(reqs) = doc
            .select(&selector("div.job-requirements.content-card")?)
            .next()
        {
            ad.keywords = reqs
                .select(&selector("meta[content]")?)
                .next()
                .and_then(|m| attr(m, "content"))
                .map(|content| DelimitedList::new(content.split(", ")))
                .unwrap_or_default();
            ad.requirements = DelimitedList::new(
                reqs.select(&selector("li")?)
                    .map(|li| requirement(&text(li))),
            );
        }

        ad.industries = labels(root, "div.industries.labels-wrapper a")?;

        Ok(AdRecord::JobBoard(ad))
    }
}

fn without_query(mut url: Url) -> String {
    url.set_query(None);
    url.set_fragment(None);
    url.into()
}

fn count_in(scope: ElementRef<'_>, css: &str) -> Result<Option<i64>, AppError> {
    Ok(first_text(scope, &selector(css)?).as_deref().and_then(parse_count))
}

fn labels(scope: ElementRef<'_>, css: &str) -> Result<DelimitedList, AppError> {
    Ok(DelimitedList::new(scope.select(&selector(css)?).map(text)))
}

/// Negotiable ranges keep their parts; plain figures lose separators.
fn salary(value: &str) -> String {
    if value.split(',').any(|part| part.trim() == "Negotiable") {
        DelimitedList::new(value.split(',')).to_string()
    } else {
        value.replace(',', "")
    }
}

fn requirement(item: &str) -> String {
    item.to_lowercase().trim_matches('.').replace(';', "")
}
