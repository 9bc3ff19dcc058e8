use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::DerivedCache;
use crate::errata::Errata;
use crate::normalize::{self, NameOptions};
use crate::site::{Page, Site};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    #[default]
    NotSet,
    Completed,
    PartlyCompleted,
    NoUpdates,
    Updating,
    Disappeared,
}

impl WorkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotSet => "-",
            Self::Completed => "completed",
            Self::PartlyCompleted => "partly_completed",
            Self::NoUpdates => "no_updates",
            Self::Updating => "updating",
            Self::Disappeared => "disappeared",
        }
    }
}

/// Fields derived from a work's table of contents, corrected by its errata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkFields {
    pub site: Site,
    pub title: String,
    pub author: String,
    pub series_title: String,
    pub summary: String,
    pub unit_urls: Vec<String>,
    pub unit_updated_at: Vec<DateTime<Utc>>,
    pub main_title: String,
    pub sub_title: String,
    pub last_page: u32,
    detected_title: String,
    detected_author: String,
}

/// A serialized work as stored.
///
/// `site`, `title` and `author` hold the uncorrected detection results and are
/// only cleared when the raw content is replaced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Work {
    pub id: Option<i64>,
    pub url1: String,
    pub url2: Option<String>,
    html: Option<String>,
    html_backup: Option<String>,
    pub site: Site,
    pub title: Option<String>,
    pub author: Option<String>,
    pub number_of_issued: Option<usize>,
    pub issued_at: Option<DateTime<Utc>>,
    pub read: bool,
    pub bookmark_note: Option<String>,
    pub status: WorkStatus,
    errata: Option<String>,
    pub remarks: Option<String>,
    #[serde(with = "base64_bytes")]
    pub cover_image: Option<Vec<u8>>,
    pub cover_urls: Vec<String>,
    pub cover_selection: Option<usize>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    derived: DerivedCache<WorkFields>,
}

impl Work {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url1: url.into(),
            ..Self::default()
        }
    }

    pub fn url(&self) -> &str {
        &self.url1
    }

    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    pub fn html_backup(&self) -> Option<&str> {
        self.html_backup.as_deref()
    }

    pub fn errata(&self) -> Option<&str> {
        self.errata.as_deref()
    }

    /// Replaces the raw content and returns the previous one.
    ///
    /// Identical content is a no-op: the backup, the detected identity and the
    /// derived fields are kept.
    pub fn replace_content(&mut self, content: Option<String>) -> Option<String> {
        if content == self.html {
            return content;
        }
        let previous = self.html.take();
        self.html_backup = previous.clone();
        self.html = content;

        self.site = Site::NotSet;
        self.title = None;
        self.author = None;

        self.derived.invalidate();
        self.derive_and_persist();
        previous
    }

    pub fn set_errata(&mut self, errata: Option<String>) {
        if self.errata == errata {
            return;
        }
        self.errata = errata;
        self.derived.invalidate();
        self.derive_and_persist();
    }

    pub fn fields(&self) -> &WorkFields {
        self.derived.get_or_derive(|| self.derive())
    }

    /// Derives every field once and copies detected identity onto the
    /// persisted fields.
    pub fn derive_and_persist(&mut self) -> WorkFields {
        let fields = self.fields().clone();
        if self.site == Site::NotSet {
            self.site = fields.site;
        }
        if self.title.as_deref().is_none_or(str::is_empty) && !fields.detected_title.is_empty() {
            self.title = Some(fields.detected_title.clone());
        }
        if self.author.as_deref().is_none_or(str::is_empty) && !fields.detected_author.is_empty()
        {
            self.author = Some(fields.detected_author.clone());
        }
        fields
    }

    /// Number of derivation passes run since this value was created or loaded.
    pub fn derivation_count(&self) -> u64 {
        self.derived.derivations()
    }

    fn derive(&self) -> WorkFields {
        let raw = self.html.as_deref().unwrap_or_default();
        let page = Page::parse(raw);
        let site = match self.site {
            Site::NotSet => Site::classify(&self.url1, (!raw.is_empty()).then_some(&page)),
            site => site,
        };
        let extractor = site.extractor();
        let errata = Errata::parse(self.errata.as_deref());
        tracing::debug!(url = %self.url1, %site, "derive work fields");

        let detected_title = match self.title.as_deref() {
            Some(title) if !title.is_empty() => title.to_owned(),
            _ => {
                let title = if raw.is_empty() {
                    String::new()
                } else {
                    extractor.title(&page)
                };
                normalize::collapse_ideographic_spaces(or_url(&title, &self.url1))
            }
        };
        let detected_author = match self.author.as_deref() {
            Some(author) if !author.is_empty() => author.to_owned(),
            _ => {
                let author = if raw.is_empty() {
                    String::new()
                } else {
                    extractor.author(&page)
                };
                normalize::normalized_name(or_url(&author, &self.url1), NameOptions::AUTHOR)
            }
        };

        let title = errata.correct(&detected_title);
        let author = errata.correct(&detected_author);

        if raw.is_empty() {
            return WorkFields {
                site,
                main_title: main_title(&title, self.id),
                title,
                author,
                last_page: 1,
                detected_title,
                detected_author,
                ..WorkFields::default()
            };
        }

        let series_title = normalize::collapse_ideographic_spaces(
            &errata.correct(&extractor.series_title(&page, &detected_title)),
        );
        let summary = errata.correct(&extractor.summary(&page));
        let unit_urls = extractor.unit_urls(&page, raw, &self.url1);
        let unit_updated_at = extractor.unit_updated_at(&page, raw, unit_urls.len());
        let (_, sub) = normalize::split_title(&title);
        let sub_title = normalize::normalized_name(sub, NameOptions::TITLE);

        WorkFields {
            site,
            main_title: main_title(&title, self.id),
            sub_title,
            title,
            author,
            series_title,
            summary,
            unit_urls,
            unit_updated_at,
            last_page: extractor.last_page(&page),
            detected_title,
            detected_author,
        }
    }

    /// Title with a URL fallback.
    pub fn title(&self) -> &str {
        &self.fields().title
    }

    pub fn author(&self) -> &str {
        &self.fields().author
    }

    pub fn main_title(&self) -> &str {
        &self.fields().main_title
    }

    pub fn unit_count(&self) -> usize {
        self.fields().unit_urls.len()
    }

    /// Latest site-stated unit update, else latest stored unit update, else the
    /// record's own modification time.
    pub fn last_update(&self, units: &[Unit]) -> Option<DateTime<Utc>> {
        self.fields()
            .unit_updated_at
            .iter()
            .max()
            .copied()
            .or_else(|| units.iter().filter_map(|unit| unit.updated_at).max())
            .or(self.modified_at)
    }

    pub fn has_been_issued(&self) -> bool {
        self.number_of_issued.unwrap_or(0) > 0 || self.issued_at.is_some()
    }

    /// Nothing newer than the last issued archive exists.
    pub fn is_up_to_date_with_issued(&self, units: &[Unit]) -> bool {
        let Some(issued) = self.number_of_issued else {
            return false;
        };
        if issued < self.unit_count() {
            return false;
        }
        match (self.issued_at, self.last_update(units)) {
            (Some(issued_at), Some(last_update)) => issued_at >= last_update,
            _ => true,
        }
    }

    /// More units are stored than were issued last time.
    pub fn is_issuable(&self, stored_units: usize) -> bool {
        self.number_of_issued.unwrap_or(0) < stored_units
    }

    /// The source lists units that are not stored yet.
    pub fn is_updatable(&self, stored_units: usize) -> bool {
        stored_units < self.unit_count()
    }

    pub fn reset_issued(&mut self) {
        self.number_of_issued = None;
        self.issued_at = None;
    }

    /// The selected remote cover candidate.
    pub fn selected_cover_url(&self) -> Option<&str> {
        self.cover_selection
            .and_then(|index| self.cover_urls.get(index))
            .map(String::as_str)
    }
}

fn or_url<'a>(value: &'a str, url: &'a str) -> &'a str {
    if value.trim().is_empty() { url } else { value }
}

fn main_title(title: &str, id: Option<i64>) -> String {
    let (main, _) = normalize::split_title(title);
    let main = normalize::normalized_name(main, NameOptions::TITLE);
    if main.is_empty() {
        return format!("novel_{}", id.unwrap_or_default());
    }
    main
}

/// Fields derived from one episode document, corrected by the unit's errata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitFields {
    pub title: String,
    pub body: String,
    pub preface: String,
    pub afterword: String,
    pub original_chapter_label: String,
    pub chapter_sub_label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Unit {
    pub id: Option<i64>,
    pub work_id: Option<i64>,
    pub url: String,
    html: Option<String>,
    /// 1-based position in the source listing.
    pub number: usize,
    pub updated_at: Option<DateTime<Utc>>,
    errata: Option<String>,
    pub remarks: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    /// Copied from the owning work.
    #[serde(skip)]
    site: Site,
    #[serde(skip)]
    derived: DerivedCache<UnitFields>,
}

impl Unit {
    pub fn new(work: &Work, url: impl Into<String>) -> Self {
        Self {
            work_id: work.id,
            url: url.into(),
            site: work.site,
            ..Self::default()
        }
    }

    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    pub fn errata(&self) -> Option<&str> {
        self.errata.as_deref()
    }

    pub fn site(&self) -> Site {
        self.site
    }

    pub fn bind_site(&mut self, site: Site) {
        if self.site != site {
            self.site = site;
            self.derived.invalidate();
        }
    }

    /// Replaces the raw content and returns the previous one.
    pub fn replace_content(&mut self, content: Option<String>) -> Option<String> {
        if content == self.html {
            return content;
        }
        let previous = std::mem::replace(&mut self.html, content);
        self.derived.invalidate();
        self.derive_all();
        previous
    }

    pub fn set_errata(&mut self, errata: Option<String>) {
        if self.errata == errata {
            return;
        }
        self.errata = errata;
        self.derived.invalidate();
        self.derive_all();
    }

    pub fn fields(&self) -> &UnitFields {
        self.derived.get_or_derive(|| self.derive())
    }

    pub fn derive_all(&self) -> UnitFields {
        self.fields().clone()
    }

    pub fn derivation_count(&self) -> u64 {
        self.derived.derivations()
    }

    fn derive(&self) -> UnitFields {
        let Some(raw) = self.html.as_deref().filter(|raw| !raw.is_empty()) else {
            return UnitFields::default();
        };
        let page = Page::parse(raw);
        let extractor = self.site.extractor();
        let errata = Errata::parse(self.errata.as_deref());
        tracing::debug!(url = %self.url, site = %self.site, "derive unit fields");

        let chapter_sub_label = if extractor.has_chapter_sub_label() {
            errata.correct(&extractor.chapter_sub_label(&page))
        } else {
            String::new()
        };

        UnitFields {
            title: errata.correct(&extractor.unit_title(&page)),
            body: errata.correct(&extractor.unit_body(&page, raw)),
            preface: errata.correct(&extractor.unit_preface(&page)),
            afterword: errata.correct(&extractor.unit_afterword(&page)),
            original_chapter_label: errata.correct(&extractor.chapter_label(&page)),
            chapter_sub_label,
        }
    }
}

/// The chapter label of `units[index]`, empty when it repeats the preceding
/// unit's label. `units` is the work's units in ordinal order.
pub fn chapter_label(units: &[Unit], index: usize) -> String {
    let Some(unit) = units.get(index) else {
        return String::new();
    };
    let label = &unit.fields().original_chapter_label;
    let repeated = index
        .checked_sub(1)
        .and_then(|prev| units.get(prev))
        .is_some_and(|prev| &prev.fields().original_chapter_label == label);
    if repeated { String::new() } else { label.clone() }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}
