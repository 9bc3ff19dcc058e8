use super::{Page, SiteExtractor, resolve_links};

/// A single-author blog; series titles are quoted in 『』 inside the category title.
pub struct Dyreitou;

const AUTHOR: &str = "dy冷凍";

impl SiteExtractor for Dyreitou {
    fn title(&self, page: &Page) -> String {
        page.text(&["div.cat-title"])
    }

    fn author(&self, _page: &Page) -> String {
        AUTHOR.to_owned()
    }

    fn series_title(&self, page: &Page, title: &str) -> String {
        let heading = page.text(&["div.cat-title"]);
        if let Some(start) = heading.find('『')
            && start > 0
            && let Some(end) = heading.find('』')
            && end > start
        {
            return heading[start + '『'.len_utf8()..end].to_owned();
        }
        title.to_owned()
    }

    fn unit_urls(&self, page: &Page, _raw: &str, work_url: &str) -> Vec<String> {
        resolve_links(&page.all("div.mokuji a"), work_url)
    }

    fn unit_title(&self, page: &Page) -> String {
        page.text(&["article h1"])
    }

    fn unit_body(&self, page: &Page, _raw: &str) -> String {
        page.all("article p")
            .iter()
            .map(|p| p.inner_html())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_title_comes_from_quotes() {
        let page = Page::parse(r#"<div class="cat-title">翻訳『竜の国』第二部</div>"#);
        let title = Dyreitou.title(&page);
        assert_eq!(Dyreitou.series_title(&page, &title), "竜の国");
        assert_eq!(Dyreitou.author(&page), "dy冷凍");

        let pair = Page::parse(r#"<div class="cat-title">翻訳『竜の国』と『海の国』</div>"#);
        assert_eq!(Dyreitou.series_title(&pair, "x"), "竜の国");

        let bare = Page::parse(r#"<div class="cat-title">竜の国</div>"#);
        assert_eq!(Dyreitou.series_title(&bare, "竜の国"), "竜の国");
    }

    #[test]
    fn body_joins_paragraphs() {
        let page = Page::parse("<article><h1>一話</h1><p>一</p><p>二</p></article>");
        assert_eq!(Dyreitou.unit_title(&page), "一話");
        assert_eq!(Dyreitou.unit_body(&page, ""), "一\n二");
    }
}
