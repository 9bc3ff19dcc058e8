//! Per-record text correction.
//!
//! Errata are stored as raw multi-line text: one substitution per line, with the
//! search and replacement strings separated by `||`.

pub const SEPARATOR: &str = "||";
pub const TERMINATOR: char = '\n';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Errata {
    pairs: Vec<(String, String)>,
}

impl Errata {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };

        let pairs = raw
            .split(TERMINATOR)
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let (find, replace) = match line.split_once(SEPARATOR) {
                    Some((find, rest)) => {
                        // Anything after a second separator is ignored.
                        let replace = rest.split(SEPARATOR).next().unwrap_or_default();
                        (find, replace)
                    }
                    None => (line, ""),
                };
                // An empty pattern would match between every character.
                if find.is_empty() {
                    return None;
                }
                Some((find.to_owned(), replace.to_owned()))
            })
            .collect();

        Self { pairs }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Normalizes `<br>` to `<br/>`, then applies every substitution in order.
    pub fn correct(&self, text: &str) -> String {
        let mut out = text.replace("<br>", "<br/>");
        if out.is_empty() {
            return out;
        }
        for (find, replace) in &self.pairs {
            out = out.replace(find.as_str(), replace);
        }
        out
    }
}
