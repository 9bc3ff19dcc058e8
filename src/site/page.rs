use scraper::{ElementRef, Html, Selector};

/// A parsed source document with fallback-aware query helpers.
///
/// Every helper takes an ordered list of selectors: the first one yielding a
/// non-empty result wins, and total failure yields an empty value.
pub struct Page {
    document: Html,
}

impl Page {
    pub fn parse(raw: &str) -> Self {
        Self {
            document: Html::parse_document(raw),
        }
    }

    pub fn exists(&self, css: &str) -> bool {
        self.first(css).is_some()
    }

    pub fn first(&self, css: &str) -> Option<ElementRef<'_>> {
        let selector = parse_selector(css)?;
        self.document.select(&selector).next()
    }

    pub fn all(&self, css: &str) -> Vec<ElementRef<'_>> {
        let Some(selector) = parse_selector(css) else {
            return Vec::new();
        };
        self.document.select(&selector).collect()
    }

    /// All elements of the first selector that matches anything.
    pub fn all_of_first(&self, selectors: &[&str]) -> Vec<ElementRef<'_>> {
        for css in selectors {
            let found = self.all(css);
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Trimmed text content.
    pub fn text(&self, selectors: &[&str]) -> String {
        self.first_non_empty(selectors, |element| element_text(&element))
    }

    pub fn inner_html(&self, selectors: &[&str]) -> String {
        self.first_non_empty(selectors, |element| element.inner_html())
    }

    pub fn attr(&self, selectors: &[&str], name: &str) -> String {
        self.first_non_empty(selectors, |element| {
            element.value().attr(name).unwrap_or_default().to_owned()
        })
    }

    fn first_non_empty(
        &self,
        selectors: &[&str],
        extract: impl Fn(ElementRef<'_>) -> String,
    ) -> String {
        for css in selectors {
            let Some(element) = self.first(css) else {
                continue;
            };
            let value = extract(element);
            if !value.trim().is_empty() {
                return value;
            }
        }
        String::new()
    }
}

pub fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(err) => {
            tracing::debug!(css, ?err, "invalid selector");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_when_primary_is_missing_or_empty() {
        let page = Page::parse(
            r#"<html><body><p class="a">  </p><h1 class="b">Title</h1></body></html>"#,
        );
        assert_eq!(page.text(&["p.a", "h1.b"]), "Title");
        assert_eq!(page.text(&["p.missing", "h1.b"]), "Title");
        assert_eq!(page.text(&["p.missing"]), "");
    }

    #[test]
    fn attr_and_lists() {
        let page = Page::parse(
            r#"<div class="x"><a href="/1">1</a><a href="/2">2</a></div><a class="last" href="?p=3">last</a>"#,
        );
        assert_eq!(page.attr(&["a.last"], "href"), "?p=3");
        assert_eq!(page.all_of_first(&["ul.none a", "div.x a"]).len(), 2);
        assert!(page.exists("a.last"));
        assert!(!page.exists("::invalid"));
    }
}
