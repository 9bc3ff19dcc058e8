use chrono::{DateTime, Utc};

use super::page::element_text;
use super::{Page, SiteExtractor, parse_timestamp, resolve_links};

/// Shared by the general and adult catalogs. Each field lists the legacy
/// layout first and the current one second.
pub struct Narou;

const AUTHOR_PREFIX: &str = "作者：";
const PAGE_QUERY: &str = "?p=";
const REVISION_MARK: &str = "改稿";

impl SiteExtractor for Narou {
    fn title(&self, page: &Page) -> String {
        page.text(&["p.novel_title", "h1.p-novel__title"])
            .replace("&quot;", "\"")
    }

    fn author(&self, page: &Page) -> String {
        page.text(&["div.novel_writername", "div.p-novel__author"])
            .replace(AUTHOR_PREFIX, "")
    }

    fn series_title(&self, page: &Page, _title: &str) -> String {
        page.text(&["p.series_title"])
    }

    fn summary(&self, page: &Page) -> String {
        page.inner_html(&["div#novel_ex", "div#novel_ex.p-novel__summary"])
            .trim()
            .to_owned()
    }

    fn unit_urls(&self, page: &Page, _raw: &str, work_url: &str) -> Vec<String> {
        let anchors = page.all_of_first(&["dl.novel_sublist2 a", "div.p-eplist__sublist a"]);
        resolve_links(&anchors, work_url)
    }

    // A revised episode carries its revision time in a `span[title]`.
    fn unit_updated_at(&self, page: &Page, _raw: &str, _unit_count: usize) -> Vec<DateTime<Utc>> {
        let tags = page.all_of_first(&[
            "dl.novel_sublist2 dt.long_update",
            "div.p-eplist__sublist div.p-eplist__update",
        ]);
        let Ok(revised) = scraper::Selector::parse("span[title]") else {
            return Vec::new();
        };

        tags.iter()
            .filter_map(|tag| {
                let stated = match tag.select(&revised).next() {
                    Some(span) => span
                        .value()
                        .attr("title")
                        .unwrap_or_default()
                        .replace(REVISION_MARK, ""),
                    None => element_text(tag),
                };
                parse_timestamp(&stated)
            })
            .collect()
    }

    fn last_page(&self, page: &Page) -> u32 {
        let href = page.attr(
            &["a.novelview_pager-last", "a.c-pager__item.c-pager__item--last"],
            "href",
        );
        href.rsplit(PAGE_QUERY)
            .next()
            .filter(|_| href.contains(PAGE_QUERY))
            .and_then(|n| n.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }

    fn unit_title(&self, page: &Page) -> String {
        page.text(&["p.novel_subtitle", "h1.p-novel__title"])
    }

    fn unit_body(&self, page: &Page, _raw: &str) -> String {
        page.inner_html(&[
            "div#novel_honbun.novel_view",
            "div.js-novel-text.p-novel__text:not(.p-novel__text--preface):not(.p-novel__text--afterword)",
        ])
    }

    fn unit_preface(&self, page: &Page) -> String {
        page.inner_html(&[
            "div#novel_p.novel_view",
            "div.js-novel-text.p-novel__text.p-novel__text--preface",
        ])
    }

    fn unit_afterword(&self, page: &Page) -> String {
        page.inner_html(&[
            "div#novel_a.novel_view",
            "div.js-novel-text.p-novel__text.p-novel__text--afterword",
        ])
    }

    fn chapter_label(&self, page: &Page) -> String {
        page.text(&[
            "p.chapter_title",
            "div.c-announce:not(.c-announce--note) span:not(.c-announce__emphasis)",
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOC: &str = r#"<html><body>
<h1 class="p-novel__title">勇者の旅</h1>
<div class="p-novel__author">作者：<a href="/u/1">山田太郎</a></div>
<div id="novel_ex" class="p-novel__summary">あらすじ<br>です</div>
<div class="p-eplist">
  <div class="p-eplist__sublist"><a href="/n1234ab/1/">第一話</a><div class="p-eplist__update">2024/01/02 10:00</div></div>
  <div class="p-eplist__sublist"><a href="/n1234ab/2/">第二話</a><div class="p-eplist__update">2024/01/03 10:00 <span title="2024/02/01 08:00 改稿">（改）</span></div></div>
</div>
<div class="c-pager"><a class="c-pager__item c-pager__item--last" href="/n1234ab/?p=7">最後へ</a></div>
</body></html>"#;

    #[test]
    fn extracts_current_layout_toc() {
        let page = Page::parse(TOC);
        let url = "https://ncode.syosetu.com/n1234ab/";

        assert_eq!(Narou.title(&page), "勇者の旅");
        assert_eq!(Narou.author(&page), "山田太郎");
        assert_eq!(Narou.summary(&page), "あらすじ<br>です");
        assert_eq!(
            Narou.unit_urls(&page, TOC, url),
            vec![
                "https://ncode.syosetu.com/n1234ab/1/".to_owned(),
                "https://ncode.syosetu.com/n1234ab/2/".to_owned(),
            ]
        );

        let dates = Narou.unit_updated_at(&page, TOC, 2);
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0].to_rfc3339(), "2024-01-02T01:00:00+00:00");
        assert_eq!(dates[1].to_rfc3339(), "2024-01-31T23:00:00+00:00");
    }

    #[test]
    fn last_page_comes_from_pager() {
        assert_eq!(Narou.last_page(&Page::parse(TOC)), 7);
        assert_eq!(Narou.last_page(&Page::parse("<html></html>")), 1);
        assert_eq!(
            Narou.last_page(&Page::parse(
                r#"<a class="novelview_pager-last" href="/n1/">x</a>"#
            )),
            1
        );
    }

    #[test]
    fn extracts_episode_sections() {
        let episode = r#"<html><body>
<div class="c-announce"><span class="c-announce__emphasis">連載</span><span>第一章 旅立ち</span></div>
<h1 class="p-novel__title">第一話</h1>
<div class="js-novel-text p-novel__text p-novel__text--preface"><p>前書き</p></div>
<div class="js-novel-text p-novel__text"><p>本文</p></div>
<div class="js-novel-text p-novel__text p-novel__text--afterword"><p>後書き</p></div>
</body></html>"#;
        let page = Page::parse(episode);

        assert_eq!(Narou.unit_title(&page), "第一話");
        assert_eq!(Narou.unit_body(&page, episode), "<p>本文</p>");
        assert_eq!(Narou.unit_preface(&page), "<p>前書き</p>");
        assert_eq!(Narou.unit_afterword(&page), "<p>後書き</p>");
        assert_eq!(Narou.chapter_label(&page), "第一章 旅立ち");
    }
}
