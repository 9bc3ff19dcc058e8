use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use crate::model::{Unit, Work};

/// Record persistence. Each call is atomic on its own.
///
/// Inserts assign the identity and record timestamps onto the passed value.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_work_by_url(&self, url: &str) -> anyhow::Result<Option<Work>>;
    async fn get_work(&self, id: i64) -> anyhow::Result<Option<Work>>;
    async fn list_works(&self) -> anyhow::Result<Vec<Work>>;
    async fn insert_work(&self, work: &mut Work) -> anyhow::Result<i64>;
    async fn update_work(&self, work: &mut Work) -> anyhow::Result<()>;
    async fn delete_work(&self, id: i64) -> anyhow::Result<()>;

    /// Units of one work ordered by position.
    async fn list_units(&self, work_id: i64) -> anyhow::Result<Vec<Unit>>;
    async fn insert_unit(&self, unit: &mut Unit) -> anyhow::Result<i64>;
    async fn update_unit(&self, unit: &mut Unit) -> anyhow::Result<()>;
    async fn delete_unit(&self, unit: &Unit) -> anyhow::Result<()>;
}

pub async fn require_work(store: &dyn Store, id: i64) -> anyhow::Result<Work> {
    store
        .get_work(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("work {id} not found"))
}

/// Stored units of `work`, bound to its site.
pub async fn load_units(store: &dyn Store, work: &Work) -> anyhow::Result<Vec<Unit>> {
    let Some(id) = work.id else {
        return Ok(Vec::new());
    };
    let mut units = store.list_units(id).await?;
    for unit in &mut units {
        unit.bind_site(work.site);
    }
    Ok(units)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Counters {
    next_work_id: i64,
    next_unit_id: i64,
}

/// One JSON document per record under `base_dir`.
#[derive(Debug)]
pub struct LocalFsStore {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalFsStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn works_dir(&self) -> PathBuf {
        self.base_dir.join("works")
    }

    fn work_json_path(&self, id: i64) -> PathBuf {
        self.works_dir().join(format!("{id}.json"))
    }

    fn units_dir(&self, work_id: i64) -> PathBuf {
        self.base_dir.join("units").join(work_id.to_string())
    }

    fn unit_json_path(&self, work_id: i64, id: i64) -> PathBuf {
        self.units_dir(work_id).join(format!("{id}.json"))
    }

    fn counters_path(&self) -> PathBuf {
        self.base_dir.join("counters.json")
    }

    async fn next_id(&self, pick: impl FnOnce(&mut Counters) -> &mut i64) -> anyhow::Result<i64> {
        let path = self.counters_path();
        let mut counters: Counters = read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?
            .unwrap_or_default();
        let slot = pick(&mut counters);
        *slot += 1;
        let id = *slot;
        write_json_atomic(&path, &counters)
            .await
            .context("write counters.json")?;
        Ok(id)
    }
}

#[async_trait]
impl Store for LocalFsStore {
    async fn find_work_by_url(&self, url: &str) -> anyhow::Result<Option<Work>> {
        let works = self.list_works().await?;
        Ok(works
            .into_iter()
            .find(|work| work.url1 == url || work.url2.as_deref() == Some(url)))
    }

    async fn get_work(&self, id: i64) -> anyhow::Result<Option<Work>> {
        let path = self.work_json_path(id);
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn list_works(&self) -> anyhow::Result<Vec<Work>> {
        let mut works: Vec<Work> = read_json_dir(&self.works_dir()).await?;
        works.sort_by_key(|work| work.id);
        Ok(works)
    }

    async fn insert_work(&self, work: &mut Work) -> anyhow::Result<i64> {
        let _guard = self.write_lock.lock().await;
        if let Some(id) = work.id {
            anyhow::bail!("work already has id {id}");
        }
        let id = self.next_id(|c| &mut c.next_work_id).await?;
        let now = Utc::now();
        work.id = Some(id);
        work.created_at = Some(now);
        work.modified_at = Some(now);
        write_json_atomic(&self.work_json_path(id), work)
            .await
            .with_context(|| format!("write work {id}"))?;
        tracing::debug!(id, url = %work.url1, "inserted work");
        Ok(id)
    }

    async fn update_work(&self, work: &mut Work) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let id = work
            .id
            .ok_or_else(|| anyhow::anyhow!("work has no id: {}", work.url1))?;
        let path = self.work_json_path(id);
        if fs::metadata(&path).await.is_err() {
            anyhow::bail!("work {id} does not exist");
        }
        work.modified_at = Some(Utc::now());
        write_json_atomic(&path, work)
            .await
            .with_context(|| format!("write work {id}"))?;
        Ok(())
    }

    async fn delete_work(&self, id: i64) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.work_json_path(id);
        fs::remove_file(&path)
            .await
            .with_context(|| format!("remove: {}", path.display()))?;
        let units_dir = self.units_dir(id);
        match fs::remove_dir_all(&units_dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("remove: {}", units_dir.display()));
            }
        }
        Ok(())
    }

    async fn list_units(&self, work_id: i64) -> anyhow::Result<Vec<Unit>> {
        let mut units: Vec<Unit> = read_json_dir(&self.units_dir(work_id)).await?;
        units.sort_by_key(|unit| (unit.number, unit.id));
        Ok(units)
    }

    async fn insert_unit(&self, unit: &mut Unit) -> anyhow::Result<i64> {
        let _guard = self.write_lock.lock().await;
        let work_id = unit
            .work_id
            .ok_or_else(|| anyhow::anyhow!("unit has no work id: {}", unit.url))?;
        if let Some(id) = unit.id {
            anyhow::bail!("unit already has id {id}");
        }
        let id = self.next_id(|c| &mut c.next_unit_id).await?;
        let now = Utc::now();
        unit.id = Some(id);
        unit.created_at = Some(now);
        unit.modified_at = Some(now);
        write_json_atomic(&self.unit_json_path(work_id, id), unit)
            .await
            .with_context(|| format!("write unit {id}"))?;
        Ok(id)
    }

    async fn update_unit(&self, unit: &mut Unit) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let (Some(work_id), Some(id)) = (unit.work_id, unit.id) else {
            anyhow::bail!("unit is not persisted: {}", unit.url);
        };
        let path = self.unit_json_path(work_id, id);
        if fs::metadata(&path).await.is_err() {
            anyhow::bail!("unit {id} does not exist");
        }
        unit.modified_at = Some(Utc::now());
        write_json_atomic(&path, unit)
            .await
            .with_context(|| format!("write unit {id}"))?;
        Ok(())
    }

    async fn delete_unit(&self, unit: &Unit) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let (Some(work_id), Some(id)) = (unit.work_id, unit.id) else {
            anyhow::bail!("unit is not persisted: {}", unit.url);
        };
        let path = self.unit_json_path(work_id, id);
        fs::remove_file(&path)
            .await
            .with_context(|| format!("remove: {}", path.display()))?;
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

async fn read_json_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> anyhow::Result<Vec<T>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read dir: {}", dir.display())),
    };

    let mut values = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("read dir: {}", dir.display()))?
    {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        if let Some(value) = read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?
        {
            values.push(value);
        }
    }
    Ok(values)
}

async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
