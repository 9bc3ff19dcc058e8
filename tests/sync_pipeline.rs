mod support;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serialbook::model::{Unit, Work};
use serialbook::settings::Settings;
use serialbook::store::{self, LocalFsStore, Store};
use serialbook::sync::{SyncRequest, SyncStatus, Synchronizer};
use support::{ScriptedTransport, narou_episode, narou_toc};

const WORK_URL: &str = "https://ncode.syosetu.com/n1/";

fn settings() -> Settings {
    Settings {
        delay_ms: 0,
        ..Settings::default()
    }
}

fn episode_url(n: u32) -> String {
    format!("https://ncode.syosetu.com/n1/{n}/")
}

fn with_units() -> SyncRequest {
    SyncRequest {
        with_units: true,
        ..SyncRequest::new(WORK_URL)
    }
}

#[tokio::test]
async fn failed_unit_is_reported_and_the_rest_are_stored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LocalFsStore::new(dir.path());
    let transport = ScriptedTransport::default();
    let settings = settings();

    transport.html(
        WORK_URL,
        &narou_toc(
            "勇者の旅",
            &[("/n1/1/", "第一話"), ("/n1/2/", "第二話"), ("/n1/3/", "第三話")],
            None,
        ),
    );
    transport.html(&episode_url(1), &narou_episode("第一話", "<p>一</p>"));
    transport.respond(&episode_url(2), 500, None, b"oops");
    transport.html(&episode_url(3), &narou_episode("第三話", "<p>三</p>"));

    let synchronizer = Synchronizer::new(&store, &transport, &settings);
    let mut seen = Vec::new();
    let mut progress = |current: usize, total: usize| seen.push((current, total));
    let outcome = synchronizer
        .synchronize(&with_units(), &mut progress)
        .await
        .expect("synchronize");

    assert_eq!(outcome.status, SyncStatus::CompletedWithIssues);
    assert_eq!(
        outcome.issues,
        vec![format!("Failed to get: {} 500", episode_url(2))]
    );
    assert_eq!(seen.first(), Some(&(0, 3)));
    assert_eq!(seen.last(), Some(&(3, 3)));

    assert!(outcome.work.id.is_some());
    assert_eq!(outcome.work.title(), "勇者の旅");
    let units = store::load_units(&store, &outcome.work)
        .await
        .expect("load units");
    let numbers: Vec<_> = units.iter().map(|u| (u.number, u.url.clone())).collect();
    assert_eq!(numbers, vec![(1, episode_url(1)), (3, episode_url(3))]);
    assert_eq!(units[0].fields().body, "<p>一</p>");
    assert!(units.iter().all(|u| u.updated_at.is_some()));
    assert_eq!(
        outcome.work.fields().unit_updated_at[2].to_rfc3339(),
        "2024-01-03T01:00:00+00:00"
    );
}

#[tokio::test]
async fn reordered_listing_keeps_unit_identity() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LocalFsStore::new(dir.path());
    let transport = ScriptedTransport::default();
    let settings = settings();

    transport.html(
        WORK_URL,
        &narou_toc("旅", &[("/n1/1/", "A"), ("/n1/2/", "B"), ("/n1/3/", "C")], None),
    );
    for (n, title) in [(1, "A"), (2, "B"), (3, "C")] {
        transport.html(&episode_url(n), &narou_episode(title, "<p>本文</p>"));
    }

    let synchronizer = Synchronizer::new(&store, &transport, &settings);
    let first = synchronizer
        .synchronize(&with_units(), &mut |_, _| {})
        .await
        .expect("first sync");
    assert_eq!(first.status, SyncStatus::Success);
    let work_id = first.work.id.expect("work stored");
    let before = store.list_units(work_id).await.expect("list units");
    let id_of = |url: &str| {
        before
            .iter()
            .find(|u| u.url == url)
            .and_then(|u| u.id)
            .expect("unit id")
    };
    let (a, b, c) = (id_of(&episode_url(1)), id_of(&episode_url(2)), id_of(&episode_url(3)));

    transport.html(
        WORK_URL,
        &narou_toc("旅", &[("/n1/3/", "C"), ("/n1/1/", "A"), ("/n1/2/", "B")], None),
    );
    let second = synchronizer
        .synchronize(&with_units(), &mut |_, _| {})
        .await
        .expect("second sync");
    assert_eq!(second.status, SyncStatus::Success);
    assert_eq!(second.work.id, Some(work_id));

    let after = store.list_units(work_id).await.expect("list units");
    let order: Vec<_> = after.iter().map(|u| (u.number, u.id)).collect();
    assert_eq!(order, vec![(1, Some(c)), (2, Some(a)), (3, Some(b))]);
    assert_eq!(store.list_works().await.expect("list works").len(), 1);
}

#[tokio::test]
async fn paged_listing_is_fetched_and_joined() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LocalFsStore::new(dir.path());
    let transport = ScriptedTransport::default();
    let settings = settings();

    transport.html(
        WORK_URL,
        &narou_toc("長編", &[("/n1/1/", "一"), ("/n1/2/", "二")], Some(2)),
    );
    transport.html(
        "https://ncode.syosetu.com/n1/?p=2",
        &narou_toc("長編", &[("/n1/3/", "三")], Some(2)),
    );

    let synchronizer = Synchronizer::new(&store, &transport, &settings);
    let outcome = synchronizer
        .synchronize(&SyncRequest::new(WORK_URL), &mut |_, _| {})
        .await
        .expect("synchronize");

    assert_eq!(outcome.status, SyncStatus::Success);
    assert_eq!(outcome.work.unit_count(), 3);
    assert_eq!(
        outcome.work.fields().unit_urls.last(),
        Some(&episode_url(3))
    );
    assert_eq!(
        transport.requests(),
        vec![WORK_URL.to_owned(), "https://ncode.syosetu.com/n1/?p=2".to_owned()]
    );
}

#[tokio::test]
async fn unreachable_work_fails_without_storing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LocalFsStore::new(dir.path());
    let transport = ScriptedTransport::default();
    let settings = settings();

    let synchronizer = Synchronizer::new(&store, &transport, &settings);
    let outcome = synchronizer
        .synchronize(&with_units(), &mut |_, _| {})
        .await
        .expect("synchronize");

    assert_eq!(outcome.status, SyncStatus::Failed);
    assert_eq!(outcome.issues, vec![format!("Failed to get: {WORK_URL} 404")]);
    assert!(store.list_works().await.expect("list works").is_empty());
}

#[tokio::test]
async fn mismatched_expected_id_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LocalFsStore::new(dir.path());
    let transport = ScriptedTransport::default();
    let settings = settings();
    transport.html(WORK_URL, &narou_toc("旅", &[], None));

    let synchronizer = Synchronizer::new(&store, &transport, &settings);
    let request = SyncRequest {
        expected_id: Some(9),
        ..SyncRequest::new(WORK_URL)
    };
    assert!(
        synchronizer
            .synchronize(&request, &mut |_, _| {})
            .await
            .is_err()
    );
}

/// Delegates to a real store but fails the `fail_on`-th unit insert.
struct FlakyUnitStore {
    inner: LocalFsStore,
    inserts: AtomicUsize,
    fail_on: usize,
}

#[async_trait]
impl Store for FlakyUnitStore {
    async fn find_work_by_url(&self, url: &str) -> anyhow::Result<Option<Work>> {
        self.inner.find_work_by_url(url).await
    }
    async fn get_work(&self, id: i64) -> anyhow::Result<Option<Work>> {
        self.inner.get_work(id).await
    }
    async fn list_works(&self) -> anyhow::Result<Vec<Work>> {
        self.inner.list_works().await
    }
    async fn insert_work(&self, work: &mut Work) -> anyhow::Result<i64> {
        self.inner.insert_work(work).await
    }
    async fn update_work(&self, work: &mut Work) -> anyhow::Result<()> {
        self.inner.update_work(work).await
    }
    async fn delete_work(&self, id: i64) -> anyhow::Result<()> {
        self.inner.delete_work(id).await
    }
    async fn list_units(&self, work_id: i64) -> anyhow::Result<Vec<Unit>> {
        self.inner.list_units(work_id).await
    }
    async fn insert_unit(&self, unit: &mut Unit) -> anyhow::Result<i64> {
        if self.inserts.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            anyhow::bail!("disk full");
        }
        self.inner.insert_unit(unit).await
    }
    async fn update_unit(&self, unit: &mut Unit) -> anyhow::Result<()> {
        self.inner.update_unit(unit).await
    }
    async fn delete_unit(&self, unit: &Unit) -> anyhow::Result<()> {
        self.inner.delete_unit(unit).await
    }
}

#[tokio::test]
async fn unit_save_failure_aborts_the_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FlakyUnitStore {
        inner: LocalFsStore::new(dir.path()),
        inserts: AtomicUsize::new(0),
        fail_on: 2,
    };
    let transport = ScriptedTransport::default();
    let settings = settings();

    transport.html(
        WORK_URL,
        &narou_toc("旅", &[("/n1/1/", "一"), ("/n1/2/", "二"), ("/n1/3/", "三")], None),
    );
    for n in 1..=3 {
        transport.html(&episode_url(n), &narou_episode("話", "<p>本文</p>"));
    }

    let synchronizer = Synchronizer::new(&store, &transport, &settings);
    let outcome = synchronizer
        .synchronize(&with_units(), &mut |_, _| {})
        .await
        .expect("synchronize");

    assert_eq!(outcome.status, SyncStatus::Failed);
    assert_eq!(
        outcome.issues,
        vec![format!("Failed to save: {} disk full", episode_url(2))]
    );
    assert!(!transport.requests().contains(&episode_url(3)));

    let work_id = outcome.work.id.expect("work stored");
    let units = store.list_units(work_id).await.expect("list units");
    let urls: Vec<_> = units.iter().map(|u| u.url.clone()).collect();
    assert_eq!(urls, vec![episode_url(1)]);
}

#[tokio::test]
async fn failed_later_page_commits_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LocalFsStore::new(dir.path());
    let transport = ScriptedTransport::default();
    let settings = settings();

    transport.html(WORK_URL, &narou_toc("長編", &[("/n1/1/", "一")], Some(3)));
    transport.html(
        "https://ncode.syosetu.com/n1/?p=2",
        &narou_toc("長編", &[("/n1/2/", "二")], Some(3)),
    );

    let synchronizer = Synchronizer::new(&store, &transport, &settings);
    let outcome = synchronizer
        .synchronize(&with_units(), &mut |_, _| {})
        .await
        .expect("synchronize");

    assert_eq!(outcome.status, SyncStatus::Failed);
    assert_eq!(
        outcome.issues,
        vec!["Failed to get: https://ncode.syosetu.com/n1/?p=3 404".to_owned()]
    );
    assert!(outcome.work.id.is_none());
    assert!(store.list_works().await.expect("list works").is_empty());
    assert!(!transport.requests().contains(&episode_url(1)));
}
