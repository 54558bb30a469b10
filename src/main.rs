use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = sitemd::cli::Cli::parse();
    sitemd::logging::init(&cli.log_level).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    sitemd::crawl::run(cli.crawl).await.context("crawl")?;

    Ok(())
}
