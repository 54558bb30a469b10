use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` when set, otherwise `fallback` (the `--log-level` value).
fn build_filter(rust_log: Option<&str>, fallback: &str) -> anyhow::Result<EnvFilter> {
    match rust_log.map(str::trim).filter(|v| !v.is_empty()) {
        Some(directives) => {
            EnvFilter::try_new(directives).with_context(|| format!("parse RUST_LOG={directives:?}"))
        }
        None => EnvFilter::try_new(fallback).with_context(|| format!("parse --log-level={fallback:?}")),
    }
}

/// Installs the stderr subscriber used for crawl progress.
pub fn init(fallback: &str) -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(rust_log.as_deref(), fallback).context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
