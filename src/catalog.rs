//! Bookkeeping commands over stored works: listing, errata, covers and issue state.

use std::path::Path;

use anyhow::Context as _;

use crate::cli::{CoverArgs, ErrataArgs, SiteArgs, StoreArgs, WorkArgs};
use crate::model::Work;
use crate::site::Site;
use crate::store::{self, LocalFsStore, Store};

pub async fn list(args: StoreArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::new(&args.store);
    for work in store.list_works().await? {
        let stored = store::load_units(&store, &work).await?.len();
        println!("{}", list_line(&work, stored));
    }
    Ok(())
}

/// `id  status  stored/listed  flags  title`; `*` marks an issuable work and
/// `+` one whose source lists unsynchronized units.
fn list_line(work: &Work, stored: usize) -> String {
    let mut flags = String::new();
    if work.is_issuable(stored) {
        flags.push('*');
    }
    if work.is_updatable(stored) {
        flags.push('+');
    }
    if flags.is_empty() {
        flags.push('-');
    }
    format!(
        "{}\t{}\t{}/{}\t{}\t{}",
        work.id.unwrap_or_default(),
        work.status.as_str(),
        stored,
        work.unit_count(),
        flags,
        work.title()
    )
}

pub async fn errata(args: ErrataArgs) -> anyhow::Result<()> {
    let text = errata_text(args.file.as_deref(), args.clear)?;
    let store = LocalFsStore::new(&args.work.store.store);
    let mut work = store::require_work(&store, args.work.id).await?;

    match args.unit {
        None => {
            work.set_errata(text);
            store.update_work(&mut work).await.context("save work")?;
            println!("{}", work.title());
        }
        Some(number) => {
            let mut units = store::load_units(&store, &work).await?;
            let unit = units
                .iter_mut()
                .find(|unit| unit.number == number)
                .ok_or_else(|| anyhow::anyhow!("work {} has no unit {number}", args.work.id))?;
            unit.set_errata(text);
            store.update_unit(unit).await.context("save unit")?;
            println!("{}", unit.fields().title);
        }
    }
    Ok(())
}

fn errata_text(file: Option<&str>, clear: bool) -> anyhow::Result<Option<String>> {
    if clear {
        return Ok(None);
    }
    let Some(file) = file else {
        anyhow::bail!("either --file or --clear is required");
    };
    let text = std::fs::read_to_string(file).with_context(|| format!("read errata: {file}"))?;
    Ok((!text.trim().is_empty()).then_some(text))
}

pub async fn cover(args: CoverArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::new(&args.work.store.store);
    let mut work = store::require_work(&store, args.work.id).await?;

    if args.clear {
        work.cover_image = None;
        work.cover_selection = None;
    }
    if let Some(file) = &args.file {
        let bytes = std::fs::read(Path::new(file)).with_context(|| format!("read cover: {file}"))?;
        if bytes.is_empty() {
            anyhow::bail!("cover image is empty: {file}");
        }
        work.cover_image = Some(bytes);
    }
    if let Some(candidate) = args.candidate {
        select_candidate(&mut work, candidate);
    }

    store.update_work(&mut work).await.context("save work")?;
    tracing::info!(
        id = args.work.id,
        local = work.cover_image.is_some(),
        remote = ?work.selected_cover_url(),
        "cover updated"
    );
    Ok(())
}

fn select_candidate(work: &mut Work, candidate: String) {
    let index = match work.cover_urls.iter().position(|url| *url == candidate) {
        Some(index) => index,
        None => {
            work.cover_urls.push(candidate);
            work.cover_urls.len() - 1
        }
    };
    work.cover_selection = Some(index);
}

pub async fn issue_reset(args: WorkArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::new(&args.store.store);
    let mut work = store::require_work(&store, args.id).await?;
    work.reset_issued();
    store.update_work(&mut work).await.context("save work")?;
    Ok(())
}

pub fn site(args: SiteArgs) -> anyhow::Result<()> {
    url::Url::parse(&args.url).with_context(|| format!("invalid url: {}", args.url))?;
    println!("{}", Site::classify(&args.url, None));
    Ok(())
}
