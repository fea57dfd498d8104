//! Adapter for the general classifieds site.
//!
//! Discovery on this site is driven by two count pages: a sitemap listing
//! every region and subregion with ad counts, and one jobs page per
//! subregion listing each job sector with its count and listing URL.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use jobtrail_core::dates::{infer_post_date, parse_ad_timestamp};
use jobtrail_core::error::AppError;
use jobtrail_core::models::{
    AdRecord, AdStatus, ClassifiedsAd, ListingEntry, ListingPage, RefetchTarget, RegionCount,
    RegionSectorCount, Site, Subregion,
};
use jobtrail_core::traits::SiteAdapter;
use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use crate::html::{attr, collapse_whitespace, first_text, parse_count, selector, slugify, text};

pub const DEFAULT_BASE_URL: &str = "https://olx.com.eg/en";

/// Sectors listing job seekers rather than job ads.
const EXCLUDED_SECTORS: [&str; 1] = ["Jobs Wanted"];

/// Thumbnail shown in place of a photo.
const NO_PHOTO_MARKER: &str = "jobs-services-thumb.png";

static RE_AD_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{id:(\d+)\}").unwrap());
static RE_AD_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"at (\d+:\d+, \d+ \w+ \d+), Ad ID: (\d+)").unwrap()
});
static RE_VIEWS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Views:\s*<strong>(\d+)</strong>").unwrap());
static RE_JOINED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"On site since\s+(\w+)\s+(\d+)").unwrap());

#[derive(Debug, Clone)]
pub struct ClassifiedsAdapter {
    base_url: String,
}

impl Default for ClassifiedsAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClassifiedsAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a possibly relative link against the site root.
    fn absolute(&self, href: &str) -> Option<String> {
        let base = Url::parse(&format!("{}/", self.base_url)).ok()?;
        base.join(href).ok().map(String::from)
    }
}

impl SiteAdapter for ClassifiedsAdapter {
    fn site(&self) -> Site {
        Site::Classifieds
    }

    fn region_index_url(&self) -> Option<String> {
        Some(format!("{}/sitemap/regions/", self.base_url))
    }

    fn parse_region_counts(
        &self,
        html: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<RegionCount>, AppError> {
        let doc = Html::parse_document(html);
        let content = selector("div.content.text")?;
        let header = selector("div.bgef.pding5_10.marginbott10.margintop20.clr")?;
        let block = selector("div.clr.marginbott10:not(.bgef)")?;
        let item = selector("li")?;

        let Some(content) = doc.select(&content).next() else {
            return Err(AppError::ParseError("Region sitemap has no content block".into()));
        };

        let mut counts = Vec::new();
        for (header, block) in content.select(&header).zip(content.select(&block)) {
            let (region, total_region_posts) = split_label_count(&text(header));
            if region.is_empty() {
                continue;
            }
            let region_slug = slugify(&region);
            for li in block.select(&item) {
                let (subregion, subregion_posts) = split_label_count(&text(li));
                if subregion.is_empty() {
                    continue;
                }
                counts.push(RegionCount {
                    download_date: now.date(),
                    download_time: now.time(),
                    region: region.clone(),
                    region_slug: region_slug.clone(),
                    subregion_slug: slugify(&subregion),
                    subregion,
                    total_region_posts,
                    subregion_posts,
                });
            }
        }

        if counts.is_empty() {
            return Err(AppError::ParseError("Region sitemap lists no subregions".into()));
        }
        Ok(counts)
    }

    fn sector_index_url(&self, subregion: &Subregion) -> Option<String> {
        Some(format!(
            "{}/jobs-services/{}/",
            self.base_url, subregion.subregion_slug
        ))
    }

    fn parse_sector_counts(
        &self,
        html: &str,
        subregion: &Subregion,
        now: NaiveDateTime,
    ) -> Result<Vec<RegionSectorCount>, AppError> {
        let doc = Html::parse_document(html);
        let link = selector("div.wrapper a.topLink.tdnone")?;
        let name = selector("span.link")?;
        let counter = selector("span.counter.nowrap")?;

        let mut counts = Vec::new();
        for a in doc.select(&link) {
            let Some(sector) = first_text(a, &name) else {
                continue;
            };
            if EXCLUDED_SECTORS.contains(&sector.as_str()) {
                continue;
            }
            let Some(listing_url) = attr(a, "href").and_then(|h| self.absolute(&h)) else {
                tracing::debug!(%sector, "Sector link without href");
                continue;
            };
            counts.push(RegionSectorCount {
                download_date: now.date(),
                download_time: now.time(),
                region: subregion.region.clone(),
                region_slug: subregion.region_slug.clone(),
                subregion: subregion.subregion.clone(),
                subregion_slug: subregion.subregion_slug.clone(),
                total_posts: first_text(a, &counter).as_deref().and_then(parse_count),
                sector,
                listing_url,
            });
        }
        // A subregion with no job ads has an empty sector list.
        Ok(counts)
    }

    fn parse_listing_page(&self, html: &str, today: NaiveDate) -> Result<ListingPage, AppError> {
        let doc = Html::parse_document(html);
        let pager = selector("div.pager.rel.clr input[type=submit]")?;
        let photos = selector("div.ads__item__photos-holder")?;
        let infos = selector("div.ads__item__info")?;

        let total_pages = doc
            .select(&pager)
            .filter_map(|input| attr(input, "class").as_deref().and_then(parse_count))
            .filter_map(|n| u32::try_from(n).ok())
            .max()
            .or(Some(1));

        let mut entries = Vec::new();
        for (photo, info) in doc.select(&photos).zip(doc.select(&infos)) {
            match listing_entry(photo, info, today, self)? {
                Some(entry) => entries.push(entry),
                None => tracing::debug!("Skipping listing item without id, link or date"),
            }
        }

        Ok(ListingPage {
            entries,
            total_pages,
            next_url: None,
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

        let stamp = first_text(root, &selector("span.pdingleft10.brlefte5")?);
        let Some(caps) = stamp.as_deref().and_then(|s| RE_AD_STAMP.captures(s)) else {
            // Removed ads still render a page, just without the posting line.
            return Ok(AdRecord::closed(target, now));
        };
        let posted = parse_ad_timestamp(&caps[1]);

        let mut ad = ClassifiedsAd::closed(target, now);
        ad.status = AdStatus::Open;
        ad.post_time = posted.map(|p| p.time());
        ad.title = first_text(root, &selector("div.clr.offerheadinner.pding15.pdingright20 h1")?);

        if let Some(body) = doc.select(&selector("div.clr#textContent")?).next() {
            let description = description_text(body);
            if !description.is_empty() {
                ad.text_language = Some(text_language(&description).to_string());
                ad.description = Some(description);
            }
        }

        let detail = selector("div.clr.descriptioncontent.marginbott20 td.col")?;
        let (th, td) = (selector("th")?, selector("td")?);
        let mut compensation_field = None;
        for cell in doc.select(&detail) {
            let (Some(name), Some(value)) = (first_text(cell, &th), first_text(cell, &td)) else {
                continue;
            };
            match name.as_str() {
                "Experience Level" => ad.experience_level = Some(value),
                "Employment Type" => ad.employ_type = Some(value),
                "Education Level" => ad.education_level = Some(value),
                "Type" => ad.ad_type = Some(value),
                "Compensation" => compensation_field = Some(value),
                _ => {}
            }
        }

        ad.page_views = doc
            .select(&selector("div.pdingtop10")?)
            .find_map(|div| RE_VIEWS.captures(&div.inner_html()).map(|c| c[1].to_string()))
            .and_then(|v| v.parse().ok());

        ad.compensation = first_text(root, &selector("div.pricelabel.tcenter")?)
            .or(compensation_field)
            .and_then(|raw| parse_price(&raw));

        if let Some(user) = doc.select(&selector("div.user-box")?).next() {
            ad.user_href = user
                .select(&selector("a")?)
                .next()
                .and_then(|a| attr(a, "href"));
            ad.username = first_text(user, &selector("p.user-box__info__name")?);
            if let Some(joined) = first_text(user, &selector("p.user-box__info__age")?)
                && let Some(caps) = RE_JOINED.captures(&joined)
            {
                ad.user_join_month = Some(caps[1].to_string());
                ad.user_join_year = caps[2].parse().ok();
            }
        }

        ad.email_available = first_text(root, &selector("div.contactbox.innerbox.br3.bgfff.rel")?)
            .is_some_and(|t| t.contains("Email Seller"));
        ad.phone_available = first_text(root, &selector("div.contactbox-indent.rel.brkword")?)
            .is_some_and(|t| t.contains("Show phone"));

        Ok(AdRecord::Classifieds(ad))
    }
}

fn listing_entry(
    photo: ElementRef<'_>,
    info: ElementRef<'_>,
    today: NaiveDate,
    adapter: &ClassifiedsAdapter,
) -> Result<Option<ListingEntry>, AppError> {
    // Very old ads lose their id marker; they are skipped.
    let Some(unique_ad_id) = photo
        .select(&selector(r#"a[data-statkey="ad.observed.list"]"#)?)
        .next()
        .and_then(|a| attr(a, "class"))
        .and_then(|class| RE_AD_ID.captures(&class).map(|c| c[1].to_string()))
    else {
        return Ok(None);
    };
    let Some(url) = info
        .select(&selector("a.ads__item__title")?)
        .next()
        .and_then(|a| attr(a, "href"))
        .and_then(|href| adapter.absolute(&href))
    else {
        return Ok(None);
    };
    let Some(post_date) = first_text(info, &selector("p.ads__item__date")?)
        .and_then(|label| infer_post_date(&label, today))
    else {
        return Ok(None);
    };

    let has_photo = photo
        .select(&selector("img")?)
        .next()
        .and_then(|img| attr(img, "src"))
        .is_some_and(|src| !src.contains(NO_PHOTO_MARKER));
    let featured = selector("span.ads__item__paidicon.icon.paid")?;
    let is_featured = photo.select(&featured).next().is_some() || info.select(&featured).next().is_some();

    Ok(Some(ListingEntry {
        unique_ad_id,
        post_date,
        url,
        has_photo,
        is_featured,
    }))
}

/// Split `"Cairo (1,234)"` into its name and count.
fn split_label_count(label: &str) -> (String, Option<i64>) {
    match label.rfind('(') {
        Some(idx) => (
            label[..idx].trim().to_string(),
            parse_count(&label[idx..]),
        ),
        None => (label.trim().to_string(), None),
    }
}

/// Ad body with each line kept as one `>`-separated segment.
fn description_text(body: ElementRef<'_>) -> String {
    let raw: String = body.text().collect();
    raw.replace('\r', " ")
        .split('\n')
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(">")
}

fn text_language(text: &str) -> &'static str {
    if text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c)) {
        "AR"
    } else {
        "EN"
    }
}

fn parse_price(raw: &str) -> Option<i64> {
    raw.replace(',', "")
        .replace("EGP", "")
        .trim()
        .parse()
        .ok()
}
