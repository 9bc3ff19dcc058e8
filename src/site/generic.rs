use super::{Page, SiteExtractor};

/// Rule set for sites without dedicated selectors. Titles and authors come out
/// empty, so the work falls back to its URL.
pub struct Generic;

impl SiteExtractor for Generic {
    fn title(&self, _page: &Page) -> String {
        String::new()
    }

    fn author(&self, _page: &Page) -> String {
        String::new()
    }
}

/// The document body, or the raw content with line breaks when it is plain text.
pub fn body(page: &Page, raw: &str) -> String {
    let Some(body) = page.first("body") else {
        return plain_text_body(raw);
    };
    if body.text().collect::<String>() == raw {
        return plain_text_body(raw);
    }
    body.inner_html()
}

fn plain_text_body(raw: &str) -> String {
    raw.replace('\n', "<br>\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_body_is_kept() {
        let raw = "<html><body><p>一</p></body></html>";
        assert_eq!(Generic.unit_body(&Page::parse(raw), raw), "<p>一</p>");
    }

    #[test]
    fn plain_text_gets_line_breaks() {
        let raw = "一行目\n二行目";
        assert_eq!(Generic.unit_body(&Page::parse(raw), raw), "一行目<br>\n二行目");
    }
}
