use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::{Page, SiteExtractor, parse_timestamp, resolve_links};

/// Both layouts of kakuyomu.jp. The current one renders the table of contents
/// client side, so unit links and dates come from the embedded state JSON.
pub struct Kakuyomu {
    legacy: bool,
}

impl Kakuyomu {
    pub const CURRENT: Self = Self { legacy: false };
    pub const LEGACY: Self = Self { legacy: true };
}

static EPISODE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""__typename":"Episode","id":"(\d+)""#).expect("episode regex is valid")
});

static PUBLISHED_AT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""publishedAt":"([^"]+)""#).expect("publishedAt regex is valid")
});

impl SiteExtractor for Kakuyomu {
    fn title(&self, page: &Page) -> String {
        if self.legacy {
            page.text(&["h1#workTitle"])
        } else {
            page.attr(&["h1[class^='Heading_heading'] a[title]"], "title")
        }
    }

    fn author(&self, page: &Page) -> String {
        if self.legacy {
            page.text(&["span#workAuthor-activityName"])
        } else {
            page.text(&["a[href^='/users']"])
        }
    }

    fn summary(&self, page: &Page) -> String {
        if self.legacy {
            page.inner_html(&["p#introduction"])
        } else {
            page.inner_html(&["div[class^='CollapseTextWithKakuyomuLinks_collapseText__']"])
        }
    }

    fn unit_urls(&self, page: &Page, raw: &str, work_url: &str) -> Vec<String> {
        if self.legacy {
            return resolve_links(&page.all("li.widget-toc-episode a"), work_url);
        }

        let base = work_url.trim_end_matches('/');
        let mut seen = HashSet::new();
        EPISODE_ID_RE
            .captures_iter(raw)
            .filter_map(|caps| caps.get(1).map(|id| id.as_str()))
            .filter(|id| seen.insert(*id))
            .map(|id| format!("{base}/episodes/{id}"))
            .collect()
    }

    // The current layout exposes a single publication time for the work.
    fn unit_updated_at(&self, page: &Page, raw: &str, unit_count: usize) -> Vec<DateTime<Utc>> {
        if self.legacy {
            return page
                .all("li.widget-toc-episode time.widget-toc-episode-datePublished")
                .iter()
                .filter_map(|time| time.value().attr("datetime"))
                .filter_map(parse_timestamp)
                .collect();
        }

        PUBLISHED_AT_RE
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_timestamp(m.as_str()))
            .map(|published| vec![published; unit_count])
            .unwrap_or_default()
    }

    fn unit_title(&self, page: &Page) -> String {
        page.text(&["p.widget-episodeTitle.js-vertical-composition-item"])
    }

    fn unit_body(&self, page: &Page, _raw: &str) -> String {
        page.inner_html(&["div.widget-episodeBody.js-episode-body"])
    }

    fn chapter_label(&self, page: &Page) -> String {
        page.text(&["p.chapterTitle.level1"])
    }

    fn chapter_sub_label(&self, page: &Page) -> String {
        page.text(&["p.chapterTitle.level2"])
    }

    fn has_chapter_sub_label(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_layout_reads_embedded_state() {
        let raw = r#"<html><body>
<h1 class="Heading_heading__abc"><a href="/works/1" title="星の海">星の海</a></h1>
<a href="/users/taro">太郎</a>
<div class="CollapseTextWithKakuyomuLinks_collapseText__xyz">紹介文</div>
<script id="__NEXT_DATA__">{"a":{"__typename":"Episode","id":"111","publishedAt":"2024-05-01T03:00:00Z"},"b":{"__typename":"Episode","id":"222"},"c":{"__typename":"Episode","id":"111"}}</script>
</body></html>"#;
        let page = Page::parse(raw);
        let work = Kakuyomu::CURRENT;

        assert_eq!(work.title(&page), "星の海");
        assert_eq!(work.author(&page), "太郎");
        assert_eq!(work.summary(&page), "紹介文");

        let urls = work.unit_urls(&page, raw, "https://kakuyomu.jp/works/1");
        assert_eq!(
            urls,
            vec![
                "https://kakuyomu.jp/works/1/episodes/111".to_owned(),
                "https://kakuyomu.jp/works/1/episodes/222".to_owned(),
            ]
        );

        let dates = work.unit_updated_at(&page, raw, urls.len());
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0], dates[1]);
    }

    #[test]
    fn legacy_layout_reads_toc_markup() {
        let raw = r#"<html><body>
<h1 id="workTitle">旧作</h1><span id="workAuthor-activityName">花子</span>
<ol><li class="widget-toc-episode"><a href="/works/1/episodes/9">一</a>
<time class="widget-toc-episode-datePublished" datetime="2017-01-01T00:00:00Z">1月1日</time></li></ol>
</body></html>"#;
        let page = Page::parse(raw);
        let work = Kakuyomu::LEGACY;

        assert_eq!(work.title(&page), "旧作");
        assert_eq!(work.author(&page), "花子");
        assert_eq!(
            work.unit_urls(&page, raw, "https://kakuyomu.jp/works/1"),
            vec!["https://kakuyomu.jp/works/1/episodes/9".to_owned()]
        );
        assert_eq!(work.unit_updated_at(&page, raw, 1).len(), 1);
    }

    #[test]
    fn episode_has_two_chapter_levels() {
        let page = Page::parse(
            r#"<p class="chapterTitle level1">第一部</p><p class="chapterTitle level2">第一章</p>
<p class="widget-episodeTitle js-vertical-composition-item">出会い</p>
<div class="widget-episodeBody js-episode-body"><p>本文</p></div>"#,
        );
        let work = Kakuyomu::CURRENT;
        assert_eq!(work.chapter_label(&page), "第一部");
        assert_eq!(work.chapter_sub_label(&page), "第一章");
        assert_eq!(work.unit_title(&page), "出会い");
        assert_eq!(work.unit_body(&page, ""), "<p>本文</p>");
    }
}
