//! Issuing: assemble a work into a temporary archive and hand it to a delivery channel.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sha2::Digest as _;
use tokio::fs;

use crate::cli::IssueArgs;
use crate::epub::{self, AssembleReport};
use crate::model::{Unit, Work};
use crate::settings::{MailSettings, Settings};
use crate::store::{self, LocalFsStore, Store};
use crate::transport::{HttpTransport, Transport};

pub async fn run(args: IssueArgs) -> anyhow::Result<()> {
    let settings = Settings::load(Path::new(&args.work.store.settings))?;
    let store = LocalFsStore::new(&args.work.store.store);
    let transport = HttpTransport::new()?;
    let delivery = OutboxDelivery::new(&args.outbox);

    let mut work = store::require_work(&store, args.work.id).await?;
    let units = store::load_units(&store, &work).await.context("load units")?;
    let outcome = issue(&mut work, &units, &store, &transport, &delivery, &settings).await?;

    for issue in &outcome.issues {
        eprintln!("{issue}");
    }
    if !outcome.delivered {
        anyhow::bail!("failed to issue {}", outcome.file_name);
    }
    println!("{}", outcome.file_name);
    Ok(())
}

#[async_trait]
pub trait Delivery: Send + Sync {
    /// Sends the finished archive at `archive` as `file_name`.
    async fn deliver(&self, archive: &Path, file_name: &str, mail: &MailSettings) -> anyhow::Result<()>;
}

/// Drops each archive into a directory next to a JSON envelope describing
/// the message. An external mailer picks them up from there.
#[derive(Debug, Clone)]
pub struct OutboxDelivery {
    dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    file_name: &'a str,
    sha256: String,
    size_bytes: u64,
    from: &'a str,
    to: &'a str,
    cc: Option<&'a str>,
    bcc: Option<&'a str>,
    subject: &'a str,
    body: &'a str,
    server: &'a str,
    port: u16,
    username: Option<&'a str>,
    queued_at: chrono::DateTime<Utc>,
}

impl OutboxDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Delivery for OutboxDelivery {
    async fn deliver(&self, archive: &Path, file_name: &str, mail: &MailSettings) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create outbox dir: {}", self.dir.display()))?;

        let bytes = fs::read(archive)
            .await
            .with_context(|| format!("read archive: {}", archive.display()))?;
        let target = self.dir.join(file_name);
        fs::write(&target, &bytes)
            .await
            .with_context(|| format!("write: {}", target.display()))?;

        let envelope = Envelope {
            file_name,
            sha256: hex::encode(sha2::Sha256::digest(&bytes)),
            size_bytes: bytes.len() as u64,
            from: &mail.from,
            to: &mail.to,
            cc: mail.cc.as_deref(),
            bcc: mail.bcc.as_deref(),
            subject: &mail.subject,
            body: &mail.body,
            server: &mail.server,
            port: mail.port,
            username: mail.username.as_deref(),
            queued_at: Utc::now(),
        };
        let envelope_path = self.dir.join(format!("{file_name}.mail.json"));
        let json = serde_json::to_vec_pretty(&envelope).context("serialize envelope")?;
        fs::write(&envelope_path, json)
            .await
            .with_context(|| format!("write: {}", envelope_path.display()))?;

        tracing::info!(target = %target.display(), to = %mail.to, "queued archive");
        Ok(())
    }
}

#[derive(Debug)]
pub struct IssueOutcome {
    pub file_name: String,
    pub delivered: bool,
    pub report: AssembleReport,
    pub issues: Vec<String>,
}

/// `{main title}.epub` with path separators replaced.
pub fn archive_file_name(work: &Work) -> String {
    let stem: String = work
        .main_title()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '\0') { '_' } else { c })
        .collect();
    format!("{stem}.epub")
}

/// Assembles `work` and delivers it. On delivery the publish bookkeeping is
/// recorded and saved.
///
/// Exceeding the size limit only adds an issue. Missing or incomplete mail
/// settings are an error; nothing is assembled then.
pub async fn issue(
    work: &mut Work,
    units: &[Unit],
    store: &dyn Store,
    transport: &dyn Transport,
    delivery: &dyn Delivery,
    settings: &Settings,
) -> anyhow::Result<IssueOutcome> {
    let mail = settings
        .mail
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("mail settings are not configured"))?;
    if mail.from.is_empty() || mail.to.is_empty() || mail.server.is_empty() || mail.port == 0 {
        anyhow::bail!("mail settings need from, to, server and port");
    }

    let file_name = archive_file_name(work);
    let dir = tempfile::tempdir().context("create temp dir")?;
    let archive = dir.path().join(&file_name);

    let report = epub::assemble(work, units, transport, settings, &archive)
        .await
        .with_context(|| format!("assemble {file_name}"))?;
    let mut issues = report.issues.clone();
    if report.exceeds_limit {
        issues.push(format!(
            "{file_name} exceeds the size limit ({} > {} bytes)",
            report.size_bytes, settings.archive_size_limit
        ));
    }

    if let Err(err) = delivery.deliver(&archive, &file_name, mail).await {
        tracing::warn!(file_name, ?err, "delivery failed");
        issues.push(format!("Failed to deliver: {file_name} {err:#}"));
        return Ok(IssueOutcome {
            file_name,
            delivered: false,
            report,
            issues,
        });
    }

    work.number_of_issued = Some(units.len());
    work.issued_at = Some(Utc::now());
    if let Err(err) = store.update_work(work).await {
        tracing::warn!(file_name, ?err, "failed to record issue");
        issues.push(format!("Failed to update: {} {err:#}", work.url1));
    }
    tracing::info!(file_name, units = units.len(), "issued");

    Ok(IssueOutcome {
        file_name,
        delivered: true,
        report,
        issues,
    })
}
