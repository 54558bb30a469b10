use clap::{Args, Parser};

use crate::slug::SlugCollision;

pub const DEFAULT_SEED_URL: &str = "https://example.com";

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub crawl: CrawlArgs,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Start URL. A bare host is crawled over https.
    #[arg(default_value = DEFAULT_SEED_URL)]
    pub url: String,

    /// Output directory (default: `{host}_{timestamp}` in the working directory).
    #[arg(long)]
    pub out: Option<String>,

    /// Timeout for each page request.
    #[arg(long, default_value_t = 30)]
    pub page_timeout_secs: u64,

    /// Timeout for each image download.
    #[arg(long, default_value_t = 10)]
    pub image_timeout_secs: u64,

    /// What to do when two URLs produce the same page file name.
    #[arg(long, value_enum, default_value_t = SlugCollision::Hash)]
    pub on_slug_collision: SlugCollision,
}
