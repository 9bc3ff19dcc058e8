//! Fetches works and their units from their sources and reconciles them with the store.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::Context as _;
use chrono::Utc;
use url::Url;

use crate::cli::SyncArgs;
use crate::model::{Unit, Work};
use crate::settings::Settings;
use crate::site::{Page, Site};
use crate::store::{self, LocalFsStore, Store};
use crate::transport::{Fetched, HttpTransport, RequestIdentity, Transport};

pub async fn run(args: SyncArgs) -> anyhow::Result<()> {
    let settings = Settings::load(Path::new(&args.store.settings))?;
    let store = LocalFsStore::new(&args.store.store);
    let transport = HttpTransport::new()?;
    let synchronizer = Synchronizer::new(&store, &transport, &settings);

    let request = SyncRequest {
        url: args.url,
        with_units: args.units,
        focus: None,
        expected_id: args.expect_id,
    };
    let mut progress = |current: usize, total: usize| {
        tracing::info!(current, total, "progress");
    };
    let outcome = synchronizer
        .synchronize(&request, &mut progress)
        .await
        .context("synchronize")?;

    for issue in &outcome.issues {
        eprintln!("{issue}");
    }
    if outcome.status == SyncStatus::Failed {
        anyhow::bail!("synchronization failed: {}", request.url);
    }
    println!(
        "{}\t{}\t{}",
        outcome.work.id.unwrap_or_default(),
        outcome.work.unit_count(),
        outcome.work.title()
    );
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub url: String,
    pub with_units: bool,
    /// Work the caller operates on; units of other existing works are left alone.
    pub focus: Option<i64>,
    /// Identity the URL must resolve to.
    pub expected_id: Option<i64>,
}

impl SyncRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            with_units: false,
            focus: None,
            expected_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Success,
    CompletedWithIssues,
    Failed,
}

#[derive(Debug)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub work: Work,
    pub issues: Vec<String>,
}

impl SyncOutcome {
    fn failed(work: Work, issues: Vec<String>) -> Self {
        Self {
            status: SyncStatus::Failed,
            work,
            issues,
        }
    }
}

pub struct Synchronizer<'a> {
    store: &'a dyn Store,
    transport: &'a dyn Transport,
    settings: &'a Settings,
    in_flight: Mutex<HashSet<String>>,
}

impl<'a> Synchronizer<'a> {
    pub fn new(store: &'a dyn Store, transport: &'a dyn Transport, settings: &'a Settings) -> Self {
        Self {
            store,
            transport,
            settings,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Synchronizes one work and, when requested, its units.
    ///
    /// Source and persistence failures are reported in the outcome. `Err` means
    /// the URL resolved to a different work than `expected_id`.
    pub async fn synchronize(
        &self,
        request: &SyncRequest,
        progress: &mut (dyn FnMut(usize, usize) + Send),
    ) -> anyhow::Result<SyncOutcome> {
        let Some(_guard) = InFlight::enter(&self.in_flight, &request.url) else {
            tracing::warn!(url = %request.url, "synchronization already running");
            return Ok(SyncOutcome::failed(
                Work::new(request.url.clone()),
                vec![format!("Already synchronizing: {}", request.url)],
            ));
        };

        let mut issues = Vec::new();

        // Resolve
        let mut work = match self.store.find_work_by_url(&request.url).await {
            Ok(Some(work)) => work,
            Ok(None) => Work::new(request.url.clone()),
            Err(err) => {
                tracing::warn!(url = %request.url, ?err, "failed to look up work");
                issues.push(format!("Failed to find: {} {err:#}", request.url));
                return Ok(SyncOutcome::failed(Work::new(request.url.clone()), issues));
            }
        };
        if let Some(expected) = request.expected_id
            && work.id != Some(expected)
        {
            anyhow::bail!(
                "{} resolved to work {:?}, expected {expected}",
                request.url,
                work.id
            );
        }
        let is_new = work.id.is_none();
        tracing::info!(url = %work.url1, id = ?work.id, "synchronizing work");

        // Root and pagination
        let identity = RequestIdentity::from_settings(self.settings);
        let root_url = work.url().to_owned();
        let root = match self.fetch_ok(&root_url, &identity).await {
            Ok(fetched) => fetched.text(),
            Err(issue) => {
                issues.push(issue);
                return Ok(SyncOutcome::failed(work, issues));
            }
        };

        let last_page = last_page_of(&root_url, work.site, &root);
        let mut pages = vec![root];
        for number in 2..=last_page {
            tokio::time::sleep(self.settings.delay()).await;
            let page_url = paged_url(&root_url, number);
            tracing::info!(url = %page_url, number, last_page, "fetching page");
            match self.fetch_ok(&page_url, &identity).await {
                Ok(fetched) => pages.push(fetched.text()),
                Err(issue) => {
                    issues.push(issue);
                    return Ok(SyncOutcome::failed(work, issues));
                }
            }
        }

        // Upsert work
        work.replace_content(Some(pages.join("\n")));
        let saved = if is_new {
            self.store.insert_work(&mut work).await.map(|_| ())
        } else {
            self.store.update_work(&mut work).await
        };
        if let Err(err) = saved {
            tracing::warn!(url = %root_url, ?err, "failed to save work");
            let verb = if is_new { "add" } else { "update" };
            issues.push(format!("Failed to {verb}: {root_url} {err:#}"));
            return Ok(SyncOutcome::failed(work, issues));
        }
        tracing::info!(id = ?work.id, title = %work.title(), units = work.unit_count(), "saved work");

        let focused = is_new || request.focus.is_none_or(|focus| work.id == Some(focus));
        if !(request.with_units && focused) {
            return Ok(SyncOutcome {
                status: SyncStatus::Success,
                work,
                issues,
            });
        }

        // Units
        if let Err(issue) = self.synchronize_units(&work, &identity, &mut issues, progress).await {
            issues.push(issue);
            return Ok(SyncOutcome::failed(work, issues));
        }

        let status = if issues.is_empty() {
            SyncStatus::Success
        } else {
            SyncStatus::CompletedWithIssues
        };
        tracing::info!(id = ?work.id, ?status, issues = issues.len(), "synchronized work");
        Ok(SyncOutcome {
            status,
            work,
            issues,
        })
    }

    /// Fetches every listed unit in source order. A persistence failure aborts
    /// the batch and is returned as the fatal issue.
    async fn synchronize_units(
        &self,
        work: &Work,
        identity: &RequestIdentity,
        issues: &mut Vec<String>,
        progress: &mut (dyn FnMut(usize, usize) + Send),
    ) -> Result<(), String> {
        let mut existing = store::load_units(self.store, work)
            .await
            .map_err(|err| format!("Failed to load units: {} {err:#}", work.url1))?;

        let urls = work.fields().unit_urls.clone();
        let total = urls.len();
        progress(0, total);

        for (index, url) in urls.iter().enumerate() {
            let position = index + 1;
            tokio::time::sleep(self.settings.delay()).await;

            if url.trim().is_empty() || Url::parse(url).is_err() {
                tracing::warn!(work = %work.url1, url, "invalid unit url");
                issues.push(format!("Invalid unit URL: {} + {url}", work.url1));
                progress(position, total);
                continue;
            }

            let html = match self.fetch_ok(url, identity).await {
                Ok(fetched) => fetched.text(),
                Err(issue) => {
                    issues.push(issue);
                    progress(position, total);
                    continue;
                }
            };

            let mut unit = match existing.iter().position(|unit| unit.url == *url) {
                Some(found) => existing.swap_remove(found),
                None => Unit::new(work, url.clone()),
            };
            unit.work_id = work.id;
            unit.bind_site(work.site);
            unit.number = position;
            unit.replace_content(Some(html));
            unit.updated_at = Some(Utc::now());

            let saved = if unit.id.is_none() {
                self.store.insert_unit(&mut unit).await.map(|_| ())
            } else {
                self.store.update_unit(&mut unit).await
            };
            if let Err(err) = saved {
                tracing::warn!(url, ?err, "failed to save unit");
                return Err(format!("Failed to save: {url} {err:#}"));
            }
            tracing::info!(url, number = position, total, "synchronized unit");
            progress(position, total);
        }

        Ok(())
    }

    /// A successful fetch, or the issue describing the failure.
    async fn fetch_ok(&self, url: &str, identity: &RequestIdentity) -> Result<Fetched, String> {
        match self.transport.get(url, identity).await {
            Ok(fetched) if fetched.is_success() => Ok(fetched),
            Ok(fetched) => {
                tracing::warn!(url, status = fetched.status, "fetch failed");
                Err(format!("Failed to get: {url} {}", fetched.status))
            }
            Err(err) => {
                tracing::warn!(url, ?err, "fetch failed");
                Err(format!("Failed to get: {url} {err:#}"))
            }
        }
    }
}

/// Page count announced by the first table-of-contents page.
fn last_page_of(url: &str, site: Site, raw: &str) -> u32 {
    let page = Page::parse(raw);
    let site = match site {
        Site::NotSet => Site::classify(url, Some(&page)),
        site => site,
    };
    site.extractor().last_page(&page)
}

fn paged_url(url: &str, number: u32) -> String {
    let slash = if url.ends_with('/') { "" } else { "/" };
    format!("{url}{slash}?p={number}")
}

struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    url: String,
}

impl<'a> InFlight<'a> {
    fn enter(set: &'a Mutex<HashSet<String>>, url: &str) -> Option<Self> {
        let mut urls = set.lock().unwrap_or_else(PoisonError::into_inner);
        if !urls.insert(url.to_owned()) {
            return None;
        }
        Some(Self {
            set,
            url: url.to_owned(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paged_url_adds_separator() {
        assert_eq!(
            paged_url("https://ncode.syosetu.com/n1", 2),
            "https://ncode.syosetu.com/n1/?p=2"
        );
        assert_eq!(
            paged_url("https://ncode.syosetu.com/n1/", 3),
            "https://ncode.syosetu.com/n1/?p=3"
        );
    }

    #[test]
    fn in_flight_guard_rejects_duplicates_until_dropped() {
        let set = Mutex::new(HashSet::new());
        let first = InFlight::enter(&set, "https://example.com/a");
        assert!(first.is_some());
        assert!(InFlight::enter(&set, "https://example.com/a").is_none());
        assert!(InFlight::enter(&set, "https://example.com/b").is_some());
        drop(first);
        assert!(InFlight::enter(&set, "https://example.com/a").is_some());
    }
}
