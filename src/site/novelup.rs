use chrono::{DateTime, Utc};

use super::page::element_text;
use super::{Page, SiteExtractor, parse_timestamp, resolve_links};

pub struct Novelup;

impl SiteExtractor for Novelup {
    fn title(&self, page: &Page) -> String {
        page.text(&["div.novel_title"])
    }

    fn author(&self, page: &Page) -> String {
        page.text(&["div.novel_author"])
    }

    fn summary(&self, page: &Page) -> String {
        page.inner_html(&["div.novel_synopsis"])
    }

    fn unit_urls(&self, page: &Page, _raw: &str, work_url: &str) -> Vec<String> {
        resolve_links(&page.all("div.episode_link a"), work_url)
    }

    fn unit_updated_at(&self, page: &Page, _raw: &str, _unit_count: usize) -> Vec<DateTime<Utc>> {
        page.all("div.update_date span span")
            .iter()
            .filter_map(|span| parse_timestamp(&element_text(span)))
            .collect()
    }

    fn unit_title(&self, page: &Page) -> String {
        page.text(&["div.episode_title"])
    }

    fn unit_body(&self, page: &Page, _raw: &str) -> String {
        page.inner_html(&["div.content"])
    }

    fn chapter_label(&self, page: &Page) -> String {
        page.text(&["div.episode_chapter"])
    }
}
