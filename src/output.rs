use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, TimeZone};
use url::Url;

pub const IMAGES_DIR: &str = "images";
pub const IMAGE_SOURCES_FILE: &str = "image_sources.txt";
pub const CRAWL_LOG_FILE: &str = "crawl.jsonl";

/// Parses a target, treating a bare host such as `example.com` as `https://example.com`.
pub fn parse_target_url(input: &str) -> anyhow::Result<Url> {
    let input = input.trim();
    let candidate = if input.contains("://") {
        input.to_owned()
    } else {
        format!("https://{input}")
    };
    let url = Url::parse(&candidate).with_context(|| format!("parse target url: {input}"))?;
    if url.host_str().is_none() {
        anyhow::bail!("target url must have a host: {input}");
    }
    Ok(url)
}

/// Default output directory for a run: `{host}_{YYYYmmdd_HHMMSS}`.
pub fn resolve_output_directory<Tz>(target: &str, started_at: &DateTime<Tz>) -> anyhow::Result<PathBuf>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let url = parse_target_url(target)?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("target url must have a host: {url}"))?;
    let stamp = started_at.format("%Y%m%d_%H%M%S");
    Ok(PathBuf::from(format!("{host}_{stamp}")))
}

/// Paths of everything a crawl writes under its output directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn create(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create output dir: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn page_path(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{stem}.md"))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn image_sources_path(&self) -> PathBuf {
        self.images_dir().join(IMAGE_SOURCES_FILE)
    }

    pub fn crawl_log_path(&self) -> PathBuf {
        self.root.join(CRAWL_LOG_FILE)
    }
}

pub fn write_page(path: &Path, markdown: &str) -> anyhow::Result<()> {
    std::fs::write(path, markdown).with_context(|| format!("write page: {}", path.display()))
}
