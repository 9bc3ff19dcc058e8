//! Source sites: classification and per-site field extraction.

mod dyreitou;
mod generic;
mod kakuyomu;
mod narou;
mod novelup;
pub mod page;

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone as _, Utc};
use regex::Regex;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use url::Url;

pub use page::Page;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    #[default]
    NotSet,
    Unknown,
    Narou,
    KakuyomuOld,
    Novelup,
    Dyreitou,
    Kakuyomu,
    Novel18,
    Hameln,
    Alphapolis,
}

impl Site {
    /// Infers the site from the URL host.
    ///
    /// `kakuyomu.jp` served two incompatible layouts over time; the older one is
    /// recognized by its `h1#workTitle` marker. Without content the current
    /// layout is assumed.
    pub fn classify(url: &str, page: Option<&Page>) -> Self {
        let host = Url::parse(url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase));

        for (pattern, rule) in URL_RULES {
            let matched = match host.as_deref() {
                Some(host) => host == *pattern || host.ends_with(&format!(".{pattern}")),
                None => url.contains(pattern),
            };
            if !matched {
                continue;
            }
            return match rule {
                UrlRule::Fixed(site) => *site,
                UrlRule::Probe {
                    marker,
                    matched,
                    otherwise,
                } => match page {
                    Some(page) if page.exists(marker) => *matched,
                    _ => *otherwise,
                },
            };
        }

        Self::Unknown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotSet => "not_set",
            Self::Unknown => "unknown",
            Self::Narou => "narou",
            Self::KakuyomuOld => "kakuyomu_old",
            Self::Novelup => "novelup",
            Self::Dyreitou => "dyreitou",
            Self::Kakuyomu => "kakuyomu",
            Self::Novel18 => "novel18",
            Self::Hameln => "hameln",
            Self::Alphapolis => "alphapolis",
        }
    }

    pub fn extractor(self) -> &'static dyn SiteExtractor {
        extractor(self)
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

enum UrlRule {
    Fixed(Site),
    Probe {
        marker: &'static str,
        matched: Site,
        otherwise: Site,
    },
}

const URL_RULES: &[(&str, UrlRule)] = &[
    ("ncode.syosetu.com", UrlRule::Fixed(Site::Narou)),
    ("novel18.syosetu.com", UrlRule::Fixed(Site::Novel18)),
    (
        "kakuyomu.jp",
        UrlRule::Probe {
            marker: "h1#workTitle",
            matched: Site::KakuyomuOld,
            otherwise: Site::Kakuyomu,
        },
    ),
    ("novelup.plus", UrlRule::Fixed(Site::Novelup)),
    ("dyreitou.com", UrlRule::Fixed(Site::Dyreitou)),
    ("syosetu.org", UrlRule::Fixed(Site::Hameln)),
    ("alphapolis.co.jp", UrlRule::Fixed(Site::Alphapolis)),
];

/// Field extraction for one site.
///
/// Work-level methods read the table-of-contents document, unit-level methods
/// read one episode document. Missing markup yields empty values.
pub trait SiteExtractor: Send + Sync {
    fn title(&self, page: &Page) -> String;

    fn author(&self, page: &Page) -> String;

    fn series_title(&self, _page: &Page, _title: &str) -> String {
        String::new()
    }

    fn summary(&self, _page: &Page) -> String {
        String::new()
    }

    fn unit_urls(&self, _page: &Page, _raw: &str, _work_url: &str) -> Vec<String> {
        Vec::new()
    }

    fn unit_updated_at(&self, _page: &Page, _raw: &str, _unit_count: usize) -> Vec<DateTime<Utc>> {
        Vec::new()
    }

    /// Number of pages of the table of contents.
    fn last_page(&self, _page: &Page) -> u32 {
        1
    }

    fn unit_title(&self, _page: &Page) -> String {
        String::new()
    }

    fn unit_body(&self, page: &Page, raw: &str) -> String {
        generic::body(page, raw)
    }

    fn unit_preface(&self, _page: &Page) -> String {
        String::new()
    }

    fn unit_afterword(&self, _page: &Page) -> String {
        String::new()
    }

    fn chapter_label(&self, _page: &Page) -> String {
        String::new()
    }

    fn chapter_sub_label(&self, _page: &Page) -> String {
        String::new()
    }

    fn has_chapter_sub_label(&self) -> bool {
        false
    }
}

static REGISTRY: &[(Site, &dyn SiteExtractor)] = &[
    (Site::Narou, &narou::Narou),
    (Site::Novel18, &narou::Narou),
    (Site::Kakuyomu, &kakuyomu::Kakuyomu::CURRENT),
    (Site::KakuyomuOld, &kakuyomu::Kakuyomu::LEGACY),
    (Site::Novelup, &novelup::Novelup),
    (Site::Dyreitou, &dyreitou::Dyreitou),
];

/// Sites without a dedicated rule set use the generic one.
pub fn extractor(site: Site) -> &'static dyn SiteExtractor {
    REGISTRY
        .iter()
        .find(|(registered, _)| *registered == site)
        .map(|(_, extractor)| *extractor)
        .unwrap_or(&generic::Generic)
}

/// Absolute `href` targets of the given anchors, in document order.
fn resolve_links(anchors: &[ElementRef<'_>], work_url: &str) -> Vec<String> {
    let base = Url::parse(work_url).ok();
    anchors
        .iter()
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
        .filter_map(|href| match &base {
            Some(base) => base.join(href.trim()).ok().map(|url| url.to_string()),
            None => Some(href.trim().to_owned()),
        })
        .collect()
}

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d{4})\s*[/\-年]\s*(\d{1,2})\s*[/\-月]\s*(\d{1,2})\s*日?(?:\s*(\d{1,2}):(\d{2})(?::(\d{2}))?)?",
    )
    .expect("date regex is valid")
});

/// Sources publish in Japan Standard Time.
const SOURCE_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Parses a site-stated timestamp.
///
/// RFC 3339 values keep their offset; anything else is searched for a
/// `YYYY/MM/DD [HH:MM[:SS]]` style date taken to be in Japan Standard Time.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    let caps = DATE_RE.captures(text)?;
    let number = |idx: usize| -> Option<u32> { caps.get(idx)?.as_str().parse().ok() };
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, number(2)?, number(3)?)?;
    let time = NaiveTime::from_hms_opt(
        number(4).unwrap_or(0),
        number(5).unwrap_or(0),
        number(6).unwrap_or(0),
    )?;

    let offset = FixedOffset::east_opt(SOURCE_UTC_OFFSET_SECS)?;
    offset
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()
        .map(|local| local.with_timezone(&Utc))
}
