use std::collections::{HashSet, VecDeque};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write as _};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::cli::CrawlArgs;
use crate::document::{ParseMode, parse_resource};
use crate::fetch::{Fetcher, HttpFetcher, PAGE_ACCEPT};
use crate::formats::CrawlRecord;
use crate::images::{ImageStore, externalize_images};
use crate::links::extract_links;
use crate::markdown::to_markdown;
use crate::output::{OutputLayout, parse_target_url, resolve_output_directory, write_page};
use crate::slug::{SlugCollision, SlugRegistry};

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub page_timeout: Duration,
    pub image_timeout: Duration,
    pub slug_collision: SlugCollision,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(30),
            image_timeout: Duration::from_secs(10),
            slug_collision: SlugCollision::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub pages_written: usize,
    pub fetch_failures: usize,
    pub images_saved: u64,
}

pub async fn run(args: CrawlArgs) -> anyhow::Result<()> {
    let start_url = parse_target_url(&args.url).context("parse start url")?;
    let out_dir = match args.out.as_deref() {
        Some(out) => PathBuf::from(out),
        None => resolve_output_directory(&args.url, &chrono::Local::now())
            .context("resolve output directory")?,
    };
    let layout = OutputLayout::create(&out_dir)?;
    let fetcher = HttpFetcher::new()?;

    let options = CrawlOptions {
        page_timeout: Duration::from_secs(args.page_timeout_secs),
        image_timeout: Duration::from_secs(args.image_timeout_secs),
        slug_collision: args.on_slug_collision,
    };

    tracing::info!(url = %start_url, out = %out_dir.display(), "crawl: start");
    let summary = crawl(&start_url, &layout, &fetcher, &options).await?;
    tracing::info!(
        pages = summary.pages_written,
        failures = summary.fetch_failures,
        images = summary.images_saved,
        "crawl: finished"
    );

    Ok(())
}

/// Breadth-first crawl of every page reachable from `start_url` on the same
/// host. Each URL is fetched at most once; fetch failures are logged and skipped.
pub async fn crawl(
    start_url: &Url,
    layout: &OutputLayout,
    fetcher: &dyn Fetcher,
    options: &CrawlOptions,
) -> anyhow::Result<CrawlSummary> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut frontier: VecDeque<String> = VecDeque::from([start_url.to_string()]);
    let mut images = ImageStore::new(layout);
    let mut slugs = SlugRegistry::new(options.slug_collision);
    let mut summary = CrawlSummary::default();

    let crawl_log_path = layout.crawl_log_path();
    let crawl_log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&crawl_log_path)
        .with_context(|| format!("open crawl log: {}", crawl_log_path.display()))?;
    let mut crawl_log = BufWriter::new(crawl_log_file);

    while let Some(next) = frontier.pop_front() {
        if visited.contains(&next) {
            continue;
        }
        visited.insert(next.clone());

        let url = match Url::parse(&next) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(url = %next, %err, "skip unparsable url");
                continue;
            }
        };

        let mut record = CrawlRecord {
            url: next.clone(),
            status: None,
            content_type: None,
            parse_mode: None,
            markdown_path: None,
            images: Vec::new(),
            error: None,
            retrieved_at: chrono::Utc::now().to_rfc3339(),
        };

        let resource = match fetcher.fetch(&url, PAGE_ACCEPT, options.page_timeout).await {
            Ok(resource) => resource,
            Err(err) => {
                tracing::warn!(%url, ?err, "failed to fetch page");
                summary.fetch_failures += 1;
                record.error = Some(format!("{err:#}"));
                write_record(&mut crawl_log, &record)?;
                continue;
            }
        };
        if !resource.is_success() {
            tracing::warn!(%url, status = resource.status, "page returned non-success status");
        }

        let mode = select_parse_mode(resource.content_type.as_deref(), &url);
        tracing::debug!(%url, mode = mode.as_str(), "parse page");
        let document = parse_resource(&resource.body, resource.content_type.as_deref(), mode);

        let externalized =
            externalize_images(&document, &url, fetcher, &mut images, options.image_timeout)
                .await
                .with_context(|| format!("externalize images: {url}"))?;
        let document = document.with_attributes(&externalized.rewrites);
        let markdown = to_markdown(&document);

        let stem = slugs.page_stem(&url)?;
        let page_path = layout.page_path(&stem);
        write_page(&page_path, &markdown)?;
        summary.pages_written += 1;
        tracing::info!(
            %url,
            path = %page_path.display(),
            images = externalized.records.len(),
            "page written"
        );

        for link in extract_links(&document, &url, &visited) {
            tracing::debug!(from = %url, to = %link, "enqueue");
            frontier.push_back(link);
        }

        record.status = Some(resource.status);
        record.content_type = resource.content_type;
        record.parse_mode = Some(mode.as_str().to_owned());
        record.markdown_path = Some(page_path.to_string_lossy().to_string());
        record.images = externalized.records;
        write_record(&mut crawl_log, &record)?;
    }

    crawl_log.flush().context("flush crawl log")?;
    summary.images_saved = images.saved();
    Ok(summary)
}

fn write_record(out: &mut impl std::io::Write, record: &CrawlRecord) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, record).context("write crawl record json")?;
    out.write_all(b"\n").context("write crawl record newline")?;
    Ok(())
}

/// XML when the content type mentions xml or the URL path ends in `.xml`.
pub fn select_parse_mode(content_type: Option<&str>, url: &Url) -> ParseMode {
    let xml_content_type = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("xml"))
        .unwrap_or(false);
    let xml_path = url.path().to_ascii_lowercase().ends_with(".xml");
    if xml_content_type || xml_path {
        ParseMode::Xml
    } else {
        ParseMode::Html
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tests::StubFetcher;

    const HTML: &str = "text/html; charset=utf-8";

    #[test]
    fn parse_mode_selection() {
        let page = Url::parse("https://s.example/page").unwrap();
        let sitemap = Url::parse("https://s.example/Sitemap.XML").unwrap();
        assert_eq!(select_parse_mode(Some(HTML), &page), ParseMode::Html);
        assert_eq!(select_parse_mode(None, &page), ParseMode::Html);
        assert_eq!(
            select_parse_mode(Some("Application/XML"), &page),
            ParseMode::Xml
        );
        assert_eq!(
            select_parse_mode(Some("application/rss+xml"), &page),
            ParseMode::Xml
        );
        assert_eq!(select_parse_mode(Some(HTML), &sitemap), ParseMode::Xml);
    }

    fn site() -> StubFetcher {
        StubFetcher::default()
            .with(
                "https://s.example/",
                200,
                HTML,
                br#"<html><body>
                <h1>Home</h1>
                <img src="/logo.png" alt="Logo">
                <img src="https://cdn.example/gone.png">
                <a href="/about">About</a>
                <a href="/about">About again</a>
                <a href="https://elsewhere.example/">Away</a>
                <a href="/down">Down</a>
                </body></html>"#,
            )
            .with(
                "https://s.example/about",
                200,
                HTML,
                br#"<body><p>About us</p><img src="/team.jpg"><a href="/">Home</a><a href="/feed.xml">Feed</a></body>"#,
            )
            .with(
                "https://s.example/feed.xml",
                200,
                "application/xml",
                br#"<rss><channel><title>Feed</title></channel></rss>"#,
            )
            .with("https://s.example/logo.png", 200, "image/png", b"logo")
            .with("https://s.example/team.jpg", 200, "image/jpeg", b"team")
    }

    #[tokio::test]
    async fn crawls_same_host_pages_once() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let layout = OutputLayout::create(temp.path().join("out"))?;
        let start = Url::parse("https://s.example/")?;

        let summary = crawl(&start, &layout, &site(), &CrawlOptions::default()).await?;
        assert_eq!(
            summary,
            CrawlSummary {
                pages_written: 3,
                fetch_failures: 1,
                images_saved: 2,
            }
        );

        let home = std::fs::read_to_string(layout.page_path("index"))?;
        assert!(home.starts_with("# Home\n\n![Logo](images/img1.png)"), "{home}");
        assert!(home.contains("![TODO: add alt text](https://cdn.example/gone.png)"));
        assert!(home.contains("[Away](https://elsewhere.example/)"));

        let about = std::fs::read_to_string(layout.page_path("about"))?;
        assert_eq!(
            about,
            "About us\n\n![TODO: add alt text](images/img2.jpg)\n\n[Home](/)\n\n[Feed](/feed.xml)"
        );

        assert_eq!(std::fs::read_to_string(layout.page_path("feed-xml"))?, "");

        assert_eq!(
            std::fs::read_to_string(layout.image_sources_path())?,
            "img1.png https://s.example/logo.png\nimg2.jpg https://s.example/team.jpg\n"
        );

        let records: Vec<CrawlRecord> = std::fs::read_to_string(layout.crawl_log_path())?
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        let urls: Vec<_> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://s.example/",
                "https://s.example/about",
                "https://s.example/down",
                "https://s.example/feed.xml",
            ]
        );
        assert!(records[2].error.is_some());
        assert_eq!(records[3].parse_mode.as_deref(), Some("xml"));
        Ok(())
    }

    #[tokio::test]
    async fn slug_collision_policy_applies_to_pages() -> anyhow::Result<()> {
        let fetcher = StubFetcher::default()
            .with(
                "https://s.example/list",
                200,
                HTML,
                br#"<body><p>one</p><a href="/list?page=2">next</a></body>"#,
            )
            .with(
                "https://s.example/list?page=2",
                200,
                HTML,
                br#"<body><p>two</p></body>"#,
            );
        let start = Url::parse("https://s.example/list")?;

        let temp = tempfile::TempDir::new()?;
        let layout = OutputLayout::create(temp.path())?;
        let options = CrawlOptions {
            slug_collision: SlugCollision::Overwrite,
            ..CrawlOptions::default()
        };
        crawl(&start, &layout, &fetcher, &options).await?;
        assert_eq!(std::fs::read_to_string(layout.page_path("list"))?, "two");

        let temp = tempfile::TempDir::new()?;
        let layout = OutputLayout::create(temp.path())?;
        let summary = crawl(&start, &layout, &fetcher, &CrawlOptions::default()).await?;
        assert_eq!(summary.pages_written, 2);
        assert_eq!(std::fs::read_to_string(layout.page_path("list"))?, "one");

        let temp = tempfile::TempDir::new()?;
        let layout = OutputLayout::create(temp.path())?;
        let options = CrawlOptions {
            slug_collision: SlugCollision::Error,
            ..CrawlOptions::default()
        };
        let err = crawl(&start, &layout, &fetcher, &options)
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("slug collision"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn hashed_slug_does_not_overwrite_an_existing_page() -> anyhow::Result<()> {
        let mut slugs = SlugRegistry::new(SlugCollision::Hash);
        slugs.page_stem(&Url::parse("https://s.example/list")?)?;
        let hashed = slugs.page_stem(&Url::parse("https://s.example/list?page=2")?)?;
        let start = format!("https://s.example/{hashed}");

        let fetcher = StubFetcher::default()
            .with(
                &start,
                200,
                HTML,
                br#"<body><p>zero</p><a href="/list">list</a></body>"#,
            )
            .with(
                "https://s.example/list",
                200,
                HTML,
                br#"<body><p>one</p><a href="/list?page=2">next</a></body>"#,
            )
            .with(
                "https://s.example/list?page=2",
                200,
                HTML,
                br#"<body><p>two</p></body>"#,
            );

        let temp = tempfile::TempDir::new()?;
        let layout = OutputLayout::create(temp.path())?;
        let start = Url::parse(&start)?;
        let summary = crawl(&start, &layout, &fetcher, &CrawlOptions::default()).await?;
        assert_eq!(summary.pages_written, 3);

        let mut pages: Vec<_> = std::fs::read_dir(layout.root())?
            .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
            .filter(|name| name.ends_with(".md"))
            .collect();
        pages.sort();
        assert_eq!(pages.len(), 3, "{pages:?}");

        assert!(std::fs::read_to_string(layout.page_path(&hashed))?.starts_with("zero"));
        assert_eq!(
            std::fs::read_to_string(layout.page_path("list"))?,
            "one\n\n[next](/list?page=2)"
        );
        assert_eq!(
            std::fs::read_to_string(layout.page_path(&format!("{hashed}-2")))?,
            "two"
        );
        Ok(())
    }

    #[tokio::test]
    async fn pages_decode_with_their_charset_and_ask_for_html() -> anyhow::Result<()> {
        let fetcher = StubFetcher::default().with(
            "https://s.example/cafe",
            200,
            "text/html; charset=iso-8859-1",
            b"<body><p>Caf\xe9 cr\xe8me</p></body>",
        );
        let temp = tempfile::TempDir::new()?;
        let layout = OutputLayout::create(temp.path())?;
        let start = Url::parse("https://s.example/cafe")?;
        crawl(&start, &layout, &fetcher, &CrawlOptions::default()).await?;

        assert_eq!(
            std::fs::read_to_string(layout.page_path("cafe"))?,
            "Caf\u{e9} cr\u{e8}me"
        );
        assert_eq!(
            fetcher.requests(),
            vec![("https://s.example/cafe".to_owned(), PAGE_ACCEPT.to_owned())]
        );
        Ok(())
    }
}
