use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch or refresh a work (and optionally its units) from its source.
    Sync(SyncArgs),
    /// Assemble a stored work into an EPUB file.
    Export(ExportArgs),
    /// Assemble a stored work and hand it to the outbox.
    Issue(IssueArgs),
    /// Clear the publish bookkeeping of a work.
    IssueReset(WorkArgs),
    /// List stored works.
    List(StoreArgs),
    /// Replace the errata of a work or one of its units.
    Errata(ErrataArgs),
    /// Set or clear the cover of a work.
    Cover(CoverArgs),
    /// Print the site a URL belongs to.
    Site(SiteArgs),
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Directory holding stored records.
    #[arg(long, default_value = "serialbook-data")]
    pub store: String,

    /// Settings file (YAML). Defaults apply when it does not exist.
    #[arg(long, default_value = "serialbook.yaml")]
    pub settings: String,
}

#[derive(Debug, Args)]
pub struct WorkArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Work id.
    #[arg(long)]
    pub id: i64,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Work URL (table of contents).
    #[arg(long)]
    pub url: String,

    /// Also fetch every unit listed by the work.
    #[arg(long)]
    pub units: bool,

    /// Abort unless the URL resolves to this work id.
    #[arg(long)]
    pub expect_id: Option<i64>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub work: WorkArgs,

    /// Output EPUB path. Defaults to `{main title}.epub` in the current directory.
    #[arg(long)]
    pub out: Option<String>,

    /// Overwrite the output file if it exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct IssueArgs {
    #[command(flatten)]
    pub work: WorkArgs,

    /// Directory receiving issued archives and their mail envelopes.
    #[arg(long, default_value = "serialbook-outbox")]
    pub outbox: String,
}

#[derive(Debug, Args)]
pub struct ErrataArgs {
    #[command(flatten)]
    pub work: WorkArgs,

    /// Unit position; the work itself when omitted.
    #[arg(long)]
    pub unit: Option<usize>,

    /// File with one `find||replace` pair per line.
    #[arg(long, conflicts_with = "clear")]
    pub file: Option<String>,

    /// Remove all errata.
    #[arg(long)]
    pub clear: bool,
}

#[derive(Debug, Args)]
pub struct CoverArgs {
    #[command(flatten)]
    pub work: WorkArgs,

    /// Image file stored as the local cover.
    #[arg(long, conflicts_with_all = ["clear", "candidate"])]
    pub file: Option<String>,

    /// Remote cover URL, added to the candidates and selected.
    #[arg(long, conflicts_with = "clear")]
    pub candidate: Option<String>,

    /// Remove the local cover and the candidate selection.
    #[arg(long)]
    pub clear: bool,
}

#[derive(Debug, Args)]
pub struct SiteArgs {
    #[arg(long)]
    pub url: String,
}
