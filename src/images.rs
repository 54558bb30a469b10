use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::document::{AttributeRewrite, Document};
use crate::fetch::{FetchedResource, Fetcher, IMAGE_ACCEPT};
use crate::formats::ImageRecord;
use crate::output::{IMAGES_DIR, OutputLayout};

const DEFAULT_EXTENSION: &str = ".jpg";

/// Local image storage for one crawl run. Owns the run-wide id counter, so
/// names never repeat across pages.
#[derive(Debug)]
pub struct ImageStore {
    images_dir: PathBuf,
    sources_path: PathBuf,
    next_id: u64,
}

impl ImageStore {
    pub fn new(layout: &OutputLayout) -> Self {
        Self {
            images_dir: layout.images_dir(),
            sources_path: layout.image_sources_path(),
            next_id: 1,
        }
    }

    pub fn saved(&self) -> u64 {
        self.next_id - 1
    }

    fn save(&mut self, origin: &Url, resource: &FetchedResource) -> anyhow::Result<ImageRecord> {
        std::fs::create_dir_all(&self.images_dir)
            .with_context(|| format!("create images dir: {}", self.images_dir.display()))?;

        let record = ImageRecord {
            id: self.next_id,
            extension: image_extension(origin, resource.content_type.as_deref()),
            origin_url: origin.to_string(),
        };

        let path = self.images_dir.join(record.local_name());
        std::fs::write(&path, &resource.body)
            .with_context(|| format!("write image: {}", path.display()))?;
        append_provenance(&self.sources_path, &record)?;

        self.next_id += 1;
        Ok(record)
    }
}

fn append_provenance(path: &Path, record: &ImageRecord) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open image sources: {}", path.display()))?;
    file.write_all(record.provenance_line().as_bytes())
        .with_context(|| format!("append image source: {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct Externalized {
    pub rewrites: Vec<AttributeRewrite>,
    pub records: Vec<ImageRecord>,
}

/// Downloads every `img[src]` of `document` into `store` and returns the
/// `src` rewrites pointing at the local copies. Images that fail to download
/// get no rewrite and keep their remote reference.
pub async fn externalize_images(
    document: &Document,
    origin: &Url,
    fetcher: &dyn Fetcher,
    store: &mut ImageStore,
    timeout: Duration,
) -> anyhow::Result<Externalized> {
    let mut out = Externalized::default();

    for img in document.elements_named(document.root(), "img") {
        let Some(src) = document.attr(img, "src").filter(|s| !s.trim().is_empty()) else {
            continue;
        };
        let image_url = match origin.join(src.trim()) {
            Ok(url) => url,
            Err(err) => {
                tracing::debug!(src, %err, "skip image with unresolvable src");
                continue;
            }
        };

        let resource = match fetcher.fetch(&image_url, IMAGE_ACCEPT, timeout).await {
            Ok(resource) if resource.is_success() => resource,
            Ok(resource) => {
                tracing::warn!(url = %image_url, status = resource.status, "image fetch returned non-success status; keeping remote src");
                continue;
            }
            Err(err) => {
                tracing::warn!(url = %image_url, ?err, "image fetch failed; keeping remote src");
                continue;
            }
        };

        let record = store
            .save(&image_url, &resource)
            .with_context(|| format!("store image: {image_url}"))?;
        tracing::debug!(url = %image_url, local = %record.local_name(), "image saved");

        out.rewrites.push(AttributeRewrite {
            node: img,
            name: "src".to_owned(),
            value: format!("{IMAGES_DIR}/{}", record.local_name()),
        });
        out.records.push(record);
    }

    Ok(out)
}

/// Extension for a stored image: the URL's own extension when it has a
/// plausible one, else a guess from the content type.
fn image_extension(url: &Url, content_type: Option<&str>) -> String {
    let last_segment = url.path().rsplit('/').next().unwrap_or_default();
    if let Some(ext) = Path::new(last_segment).extension().and_then(|e| e.to_str()) {
        if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return format!(".{ext}");
        }
    }

    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    let guessed = if content_type.contains("png") {
        ".png"
    } else if content_type.contains("gif") {
        ".gif"
    } else if content_type.contains("webp") {
        ".webp"
    } else if content_type.contains("svg") {
        ".svg"
    } else if content_type.contains("avif") {
        ".avif"
    } else if content_type.contains("bmp") {
        ".bmp"
    } else {
        DEFAULT_EXTENSION
    };
    guessed.to_owned()
}
