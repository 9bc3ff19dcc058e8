use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context as _;
use chrono::Utc;
use regex::{Captures, Regex};
use url::Url;
use zip::write::SimpleFileOptions;

use crate::cli::ExportArgs;
use crate::model::{self, Unit, Work};
use crate::publish::archive_file_name;
use crate::settings::Settings;
use crate::store::{self, LocalFsStore};
use crate::transport::{HttpTransport, RequestIdentity, Transport};

const LANG: &str = "ja";
const TITLE_PAGE_LABEL: &str = "本扉";
const SUMMARY_LABEL: &str = "概要";
const HEADING_SEPARATOR: &str = "／";

pub async fn run(args: ExportArgs) -> anyhow::Result<()> {
    let settings = Settings::load(Path::new(&args.work.store.settings))?;
    let store = LocalFsStore::new(&args.work.store.store);
    let transport = HttpTransport::new()?;

    let work = store::require_work(&store, args.work.id).await?;
    let units = store::load_units(&store, &work).await.context("load units")?;
    let out_path = match args.out {
        Some(out) => PathBuf::from(out),
        None => PathBuf::from(archive_file_name(&work)),
    };
    if out_path.exists() && !args.force {
        anyhow::bail!("epub output already exists: {}", out_path.display());
    }

    let report = assemble(&work, &units, &transport, &settings, &out_path).await?;
    for issue in &report.issues {
        eprintln!("{issue}");
    }
    if report.exceeds_limit {
        eprintln!(
            "{} exceeds the size limit ({} > {} bytes)",
            out_path.display(),
            report.size_bytes,
            settings.archive_size_limit
        );
    }
    println!("{}", out_path.display());
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleReport {
    /// Non-fatal problems, in the order they occurred.
    pub issues: Vec<String>,
    pub size_bytes: u64,
    pub exceeds_limit: bool,
}

/// Writes `work` and its `units` (in ordinal order) as an EPUB archive.
///
/// Image failures are recorded as issues. Any other failure aborts and leaves
/// nothing at `out_path`.
pub async fn assemble(
    work: &Work,
    units: &[Unit],
    transport: &dyn Transport,
    settings: &Settings,
    out_path: &Path,
) -> anyhow::Result<AssembleReport> {
    let identity = RequestIdentity::from_settings(settings);
    let mut images = ImageRegistry::default();
    let mut issues = Vec::new();

    tracing::info!(title = %work.title(), units = units.len(), out = %out_path.display(), "assembling archive");

    let cover = load_cover(work, transport, &identity, settings, &mut issues).await;

    let fields = work.fields();
    let mut sections = vec![Section {
        id: "title".to_owned(),
        title: TITLE_PAGE_LABEL.to_owned(),
        body: render_title_page(&fields.title, &fields.author),
    }];
    if !fields.summary.trim().is_empty() {
        sections.push(Section {
            id: "summary".to_owned(),
            title: SUMMARY_LABEL.to_owned(),
            body: compose_chapter(&["", "", SUMMARY_LABEL], "", &fields.summary, ""),
        });
    }

    for (index, unit) in units.iter().enumerate() {
        let unit_fields = unit.fields();
        let chapter = model::chapter_label(units, index);
        let headings = [
            chapter.as_str(),
            unit_fields.chapter_sub_label.as_str(),
            unit_fields.title.as_str(),
        ];

        let mut parts = Vec::with_capacity(3);
        for markup in [&unit_fields.preface, &unit_fields.body, &unit_fields.afterword] {
            let markup = if settings.include_images {
                embed_images(markup, &unit.url, transport, &identity, &mut images, &mut issues).await
            } else {
                markup.clone()
            };
            parts.push(markup);
        }

        let title = headings
            .iter()
            .filter(|h| !h.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(HEADING_SEPARATOR);
        sections.push(Section {
            id: format!("unit-{:04}", index + 1),
            title: if title.is_empty() {
                format!("#{}", unit.number)
            } else {
                title
            },
            body: compose_chapter(&headings, &parts[0], &parts[1], &parts[2]),
        });
    }

    for section in &mut sections {
        section.body = finish_markup(&section.body);
    }

    write_archive(work, cover.as_ref(), &sections, &images, out_path)
        .with_context(|| format!("write archive: {}", out_path.display()))?;

    let size_bytes = std::fs::metadata(out_path)
        .with_context(|| format!("stat archive: {}", out_path.display()))?
        .len();
    let exceeds_limit = size_bytes > settings.archive_size_limit;
    if exceeds_limit {
        tracing::warn!(size_bytes, limit = settings.archive_size_limit, "archive exceeds size limit");
    }
    tracing::info!(size_bytes, images = images.resources.len(), issues = issues.len(), "archive written");

    Ok(AssembleReport {
        issues,
        size_bytes,
        exceeds_limit,
    })
}

#[derive(Debug)]
struct Section {
    id: String,
    title: String,
    body: String,
}

#[derive(Debug)]
struct ImageResource {
    href: String,
    media_type: &'static str,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct ImageRegistry {
    by_url: HashMap<String, String>,
    resources: Vec<ImageResource>,
}

impl ImageRegistry {
    fn register(&mut self, url: &str, content_type: Option<&str>, bytes: Vec<u8>) -> String {
        if let Some(href) = self.by_url.get(url) {
            return href.clone();
        }
        let kind = ImageKind::detect(content_type, &bytes);
        let href = format!("images/img{:04}.{}", self.resources.len() + 1, kind.extension);
        self.resources.push(ImageResource {
            href: href.clone(),
            media_type: kind.media_type,
            bytes,
        });
        self.by_url.insert(url.to_owned(), href.clone());
        href
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ImageKind {
    extension: &'static str,
    media_type: &'static str,
}

impl ImageKind {
    const JPEG: Self = Self {
        extension: "jpg",
        media_type: "image/jpeg",
    };
    const PNG: Self = Self {
        extension: "png",
        media_type: "image/png",
    };
    const GIF: Self = Self {
        extension: "gif",
        media_type: "image/gif",
    };
    const WEBP: Self = Self {
        extension: "webp",
        media_type: "image/webp",
    };
    const SVG: Self = Self {
        extension: "svg",
        media_type: "image/svg+xml",
    };

    /// From the declared content type, else the leading bytes, else JPEG.
    fn detect(content_type: Option<&str>, bytes: &[u8]) -> Self {
        let declared = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());
        match declared.as_deref() {
            Some("image/jpeg" | "image/jpg" | "image/pjpeg") => return Self::JPEG,
            Some("image/png") => return Self::PNG,
            Some("image/gif") => return Self::GIF,
            Some("image/webp") => return Self::WEBP,
            Some("image/svg+xml") => return Self::SVG,
            _ => {}
        }

        if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Self::PNG
        } else if bytes.starts_with(b"GIF8") {
            Self::GIF
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Self::WEBP
        } else {
            Self::JPEG
        }
    }
}

struct Cover {
    kind: ImageKind,
    bytes: Vec<u8>,
}

async fn load_cover(
    work: &Work,
    transport: &dyn Transport,
    identity: &RequestIdentity,
    settings: &Settings,
    issues: &mut Vec<String>,
) -> Option<Cover> {
    if let Some(bytes) = &work.cover_image {
        return Some(Cover {
            kind: ImageKind::detect(None, bytes),
            bytes: bytes.clone(),
        });
    }
    if !settings.include_images {
        return None;
    }
    let url = work.selected_cover_url()?;
    match transport.get(url, identity).await {
        Ok(fetched) if fetched.is_success() => Some(Cover {
            kind: ImageKind::detect(fetched.content_type.as_deref(), &fetched.body),
            bytes: fetched.body,
        }),
        Ok(fetched) => {
            tracing::warn!(url, status = fetched.status, "cover fetch failed");
            issues.push(format!("Failed to get cover: {url} {}", fetched.status));
            None
        }
        Err(err) => {
            tracing::warn!(url, ?err, "cover fetch failed");
            issues.push(format!("Failed to get cover: {url} {err:#}"));
            None
        }
    }
}

// Double-quoted, single-quoted or bare `src` values.
static IMG_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(<img\b[^>]*?\bsrc\s*=\s*)(?:"([^"]*)"|'([^']*)'|([^\s"'>]*[^\s"'>/]))"#)
        .expect("img src regex is valid")
});

fn img_src<'h>(caps: &Captures<'h>) -> Option<&'h str> {
    caps.get(2)
        .or_else(|| caps.get(3))
        .or_else(|| caps.get(4))
        .map(|m| m.as_str())
}

/// Fetches every image referenced by `markup` and points the references at
/// the embedded copies. Failed images keep their original reference.
async fn embed_images(
    markup: &str,
    base_url: &str,
    transport: &dyn Transport,
    identity: &RequestIdentity,
    images: &mut ImageRegistry,
    issues: &mut Vec<String>,
) -> String {
    let sources: Vec<String> = IMG_SRC_RE
        .captures_iter(markup)
        .filter_map(|caps| img_src(&caps).map(str::to_owned))
        .filter(|src| !src.trim().is_empty())
        .collect();
    if sources.is_empty() {
        return markup.to_owned();
    }

    let base = Url::parse(base_url).ok();
    let mut rewrites: HashMap<String, String> = HashMap::new();
    for src in sources {
        if rewrites.contains_key(&src) {
            continue;
        }
        let decoded = src.replace("&amp;", "&");
        let resolved = match &base {
            Some(base) => base.join(decoded.trim()).map(|u| u.to_string()),
            None => Url::parse(decoded.trim()).map(|u| u.to_string()),
        };
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(src, ?err, "unresolvable image reference");
                issues.push(format!("Invalid image URL: {base_url} + {src}"));
                continue;
            }
        };

        if let Some(href) = images.by_url.get(&resolved) {
            tracing::debug!(url = %resolved, href, "image already embedded");
            rewrites.insert(src, href.clone());
            continue;
        }

        match transport.get(&resolved, identity).await {
            Ok(fetched) if fetched.is_success() => {
                let href = images.register(&resolved, fetched.content_type.as_deref(), fetched.body);
                tracing::debug!(url = %resolved, href, "embedded image");
                rewrites.insert(src, href);
            }
            Ok(fetched) => {
                tracing::warn!(url = %resolved, status = fetched.status, "image fetch failed");
                issues.push(format!("Failed to get image: {resolved} {}", fetched.status));
            }
            Err(err) => {
                tracing::warn!(url = %resolved, ?err, "image fetch failed");
                issues.push(format!("Failed to get image: {resolved} {err:#}"));
            }
        }
    }

    IMG_SRC_RE
        .replace_all(markup, |caps: &Captures<'_>| {
            match img_src(caps).and_then(|src| rewrites.get(src)) {
                Some(href) => format!("{}\"{href}\"", &caps[1]),
                None => caps[0].to_owned(),
            }
        })
        .into_owned()
}

fn render_title_page(title: &str, author: &str) -> String {
    format!(
        "<div class=\"title-page\">\n  <div class=\"title\">{}</div>\n  <div class=\"author\">{}</div>\n</div>\n",
        xml_escape(title),
        xml_escape(author)
    )
}

/// Headings are chapter label, chapter sub label and unit title. Empty parts
/// are skipped.
fn compose_chapter(headings: &[&str; 3], preface: &str, body: &str, afterword: &str) -> String {
    let mut out = Vec::new();
    for (level, heading) in headings.iter().enumerate() {
        if !heading.is_empty() {
            out.push(format!("<h{n}>{}</h{n}>", xml_escape(heading), n = level + 1));
        }
    }
    for (class, markup) in [("preface", preface), ("chapter-body", body), ("note", afterword)] {
        if !markup.trim().is_empty() {
            out.push(format!("<div class=\"{class}\">{markup}</div>"));
        }
    }
    out.join("\n")
}

/// Makes extracted HTML fit for XHTML documents.
fn finish_markup(markup: &str) -> String {
    let markup = markup.replace("<br>", "<br/>").replace("&nbsp;", "&#160;");
    ensure_xhtml_void_tags(&markup)
}

fn write_archive(
    work: &Work,
    cover: Option<&Cover>,
    sections: &[Section],
    images: &ImageRegistry,
    out_path: &Path,
) -> anyhow::Result<()> {
    let parent = match out_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("create archive parent dir: {}", parent.display()))?;

    let fields = work.fields();
    let uuid = uuid::Uuid::new_v4();
    let modified = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp archive in {}", parent.display()))?;
    {
        let mut zip = zip::ZipWriter::new(tmp.as_file_mut());

        // `mimetype` comes first and is stored uncompressed.
        let mimetype_options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o644);
        zip.start_file("mimetype", mimetype_options)
            .context("epub start_file mimetype")?;
        zip.write_all(b"application/epub+zip")
            .context("epub write mimetype")?;

        let deflated_options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let mut entries = vec![
            ("META-INF/container.xml".to_owned(), render_container_xml()),
            (
                "OEBPS/content.opf".to_owned(),
                render_content_opf(
                    &fields.title,
                    &fields.author,
                    uuid,
                    &modified,
                    cover,
                    sections,
                    images,
                ),
            ),
            (
                "OEBPS/nav.xhtml".to_owned(),
                render_nav_xhtml(&fields.title, sections),
            ),
            (
                "OEBPS/toc.ncx".to_owned(),
                render_toc_ncx(&fields.title, uuid, sections),
            ),
            ("OEBPS/style.css".to_owned(), default_style_css()),
        ];
        if let Some(cover) = cover {
            entries.push((
                "OEBPS/cover.xhtml".to_owned(),
                wrap_xhtml_document(
                    &fields.title,
                    &format!(
                        "<div class=\"cover\"><img src=\"images/cover.{}\" alt=\"\" /></div>",
                        cover.kind.extension
                    ),
                ),
            ));
        }
        for section in sections {
            entries.push((
                format!("OEBPS/{}.xhtml", section.id),
                wrap_xhtml_document(&section.title, &section.body),
            ));
        }

        for (name, contents) in &entries {
            zip.start_file(name.as_str(), deflated_options)
                .with_context(|| format!("epub start_file {name}"))?;
            zip.write_all(contents.as_bytes())
                .with_context(|| format!("epub write {name}"))?;
        }

        if let Some(cover) = cover {
            let name = format!("OEBPS/images/cover.{}", cover.kind.extension);
            zip.start_file(name.as_str(), deflated_options)
                .with_context(|| format!("epub start_file {name}"))?;
            zip.write_all(&cover.bytes)
                .with_context(|| format!("epub write {name}"))?;
        }
        for image in &images.resources {
            let name = format!("OEBPS/{}", image.href);
            zip.start_file(name.as_str(), deflated_options)
                .with_context(|| format!("epub start_file {name}"))?;
            zip.write_all(&image.bytes)
                .with_context(|| format!("epub write {name}"))?;
        }

        zip.finish().context("epub finish zip")?;
    }

    tmp.persist(out_path)
        .map_err(|err| err.error)
        .with_context(|| format!("persist archive: {}", out_path.display()))?;
    Ok(())
}

fn render_container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    .to_string()
}

fn default_style_css() -> String {
    r#"@charset "utf-8";

html { font-family: serif; }
body { margin: 0; padding: 0 1em; line-height: 1.8; }
img { max-width: 100%; height: auto; }
.title-page { margin-top: 30%; text-align: center; }
.title-page .title { font-size: 1.6em; font-weight: bold; }
.title-page .author { margin-top: 2em; }
.preface, .note { font-size: 0.9em; margin: 1.5em 0; }
.cover { text-align: center; }
"#
    .to_string()
}

fn render_nav_xhtml(title: &str, sections: &[Section]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{LANG}\" xml:lang=\"{LANG}\">\n"
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
    out.push_str(&format!("    <h1>{}</h1>\n", xml_escape(title)));
    out.push_str("    <ol>\n");
    for section in sections {
        out.push_str(&format!(
            "      <li><a href=\"{}.xhtml\">{}</a></li>\n",
            xml_escape(&section.id),
            xml_escape(&section.title)
        ));
    }
    out.push_str("    </ol>\n");
    out.push_str("  </nav>\n");
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn render_toc_ncx(title: &str, uuid: uuid::Uuid, sections: &[Section]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    out.push_str("  <head>\n");
    out.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"urn:uuid:{uuid}\" />\n"
    ));
    out.push_str("    <meta name=\"dtb:depth\" content=\"1\" />\n");
    out.push_str("  </head>\n");
    out.push_str(&format!(
        "  <docTitle><text>{}</text></docTitle>\n",
        xml_escape(title)
    ));
    out.push_str("  <navMap>\n");
    for (idx, section) in sections.iter().enumerate() {
        let play = idx + 1;
        out.push_str(&format!(
            "    <navPoint id=\"navPoint-{play}\" playOrder=\"{play}\">\n"
        ));
        out.push_str(&format!(
            "      <navLabel><text>{}</text></navLabel>\n",
            xml_escape(&section.title)
        ));
        out.push_str(&format!(
            "      <content src=\"{}.xhtml\" />\n",
            xml_escape(&section.id)
        ));
        out.push_str("    </navPoint>\n");
    }
    out.push_str("  </navMap>\n");
    out.push_str("</ncx>\n");
    out
}

fn render_content_opf(
    title: &str,
    author: &str,
    uuid: uuid::Uuid,
    modified: &str,
    cover: Option<&Cover>,
    sections: &[Section],
    images: &ImageRegistry,
) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(&format!(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"3.0\" xml:lang=\"{LANG}\">\n"
    ));
    out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
    out.push_str(&format!(
        "    <dc:identifier id=\"bookid\">urn:uuid:{uuid}</dc:identifier>\n"
    ));
    out.push_str(&format!("    <dc:title>{}</dc:title>\n", xml_escape(title)));
    out.push_str(&format!(
        "    <dc:creator>{}</dc:creator>\n",
        xml_escape(author)
    ));
    out.push_str(&format!("    <dc:language>{LANG}</dc:language>\n"));
    out.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        xml_escape(modified)
    ));
    if cover.is_some() {
        out.push_str("    <meta name=\"cover\" content=\"cover-image\" />\n");
    }
    out.push_str("  </metadata>\n");
    out.push_str("  <manifest>\n");
    out.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\" />\n",
    );
    out.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\" />\n",
    );
    out.push_str("    <item id=\"css\" href=\"style.css\" media-type=\"text/css\" />\n");
    if let Some(cover) = cover {
        out.push_str(&format!(
            "    <item id=\"cover-image\" href=\"images/cover.{}\" media-type=\"{}\" properties=\"cover-image\" />\n",
            cover.kind.extension, cover.kind.media_type
        ));
        out.push_str(
            "    <item id=\"cover\" href=\"cover.xhtml\" media-type=\"application/xhtml+xml\" />\n",
        );
    }
    for section in sections {
        out.push_str(&format!(
            "    <item id=\"{}\" href=\"{}.xhtml\" media-type=\"application/xhtml+xml\" />\n",
            xml_escape(&section.id),
            xml_escape(&section.id)
        ));
    }
    for (idx, image) in images.resources.iter().enumerate() {
        out.push_str(&format!(
            "    <item id=\"image-{}\" href=\"{}\" media-type=\"{}\" />\n",
            idx + 1,
            xml_escape(&image.href),
            image.media_type
        ));
    }
    out.push_str("  </manifest>\n");
    out.push_str("  <spine toc=\"ncx\" page-progression-direction=\"rtl\">\n");
    if cover.is_some() {
        out.push_str("    <itemref idref=\"cover\" />\n");
    }
    for section in sections {
        out.push_str(&format!(
            "    <itemref idref=\"{}\" />\n",
            xml_escape(&section.id)
        ));
    }
    out.push_str("  </spine>\n");
    out.push_str("</package>\n");
    out
}

fn wrap_xhtml_document(title: &str, body_html: &str) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"{LANG}\" xml:lang=\"{LANG}\">\n"
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(body_html);
    if !body_html.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn ensure_xhtml_void_tags(html: &str) -> String {
    const VOID_TAGS: &[&str] = &[
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ];

    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;

    while let Some(rel_lt) = html[cursor..].find('<') {
        let lt = cursor + rel_lt;
        out.push_str(&html[cursor..lt]);

        // Quoted attribute values may contain `>`.
        let mut in_quote: Option<u8> = None;
        let mut gt = lt + 1;
        while gt < bytes.len() {
            let b = bytes[gt];
            match in_quote {
                Some(q) if b == q => in_quote = None,
                Some(_) => {}
                None if b == b'"' || b == b'\'' => in_quote = Some(b),
                None if b == b'>' => break,
                None => {}
            }
            gt += 1;
        }
        if gt >= bytes.len() {
            out.push_str(&html[lt..]);
            return out;
        }

        let raw_tag = &html[lt..=gt];
        let name_start = lt + 1;
        let name_end = html[name_start..gt]
            .find(|c: char| !c.is_ascii_alphabetic())
            .map_or(gt, |offset| name_start + offset);
        let is_void = name_end > name_start
            && VOID_TAGS.contains(&html[name_start..name_end].to_ascii_lowercase().as_str());

        let tag_without_gt = &html[lt..gt];
        if is_void && !tag_without_gt.trim_end().ends_with('/') {
            out.push_str(tag_without_gt);
            out.push_str(" />");
        } else {
            out.push_str(raw_tag);
        }
        cursor = gt + 1;
    }

    out.push_str(&html[cursor..]);
    out
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
