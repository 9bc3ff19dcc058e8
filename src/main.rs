use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use serialbook::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    serialbook::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Sync(args) => {
            serialbook::sync::run(args).await.context("sync")?;
        }
        Command::Export(args) => {
            serialbook::epub::run(args).await.context("export")?;
        }
        Command::Issue(args) => {
            serialbook::publish::run(args).await.context("issue")?;
        }
        Command::IssueReset(args) => {
            serialbook::catalog::issue_reset(args)
                .await
                .context("issue-reset")?;
        }
        Command::List(args) => {
            serialbook::catalog::list(args).await.context("list")?;
        }
        Command::Errata(args) => {
            serialbook::catalog::errata(args).await.context("errata")?;
        }
        Command::Cover(args) => {
            serialbook::catalog::cover(args).await.context("cover")?;
        }
        Command::Site(args) => {
            serialbook::catalog::site(args).context("site")?;
        }
    }

    Ok(())
}
