use std::collections::HashMap;

use clap::ValueEnum;
use sha2::Digest as _;

/// Fallback identifier for paths that reduce to nothing.
pub const INDEX_SLUG: &str = "index";

/// Lowercases `text` and turns every run of non-word characters into one `-`.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for ch in text.to_lowercase().chars() {
        if ch.is_alphanumeric() || ch == '_' {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(ch);
        } else {
            pending_hyphen = true;
        }
    }

    if out.is_empty() {
        INDEX_SLUG.to_owned()
    } else {
        out
    }
}

/// What to do when two different URLs map to the same page slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SlugCollision {
    /// Later pages replace earlier ones.
    Overwrite,
    /// Append a short hash of the URL to the later slug.
    #[default]
    Hash,
    /// Abort the crawl.
    Error,
}

/// Hands out page file stems, remembering which URL claimed each slug first.
#[derive(Debug, Default)]
pub struct SlugRegistry {
    policy: SlugCollision,
    claimed: HashMap<String, String>,
}

impl SlugRegistry {
    pub fn new(policy: SlugCollision) -> Self {
        Self {
            policy,
            claimed: HashMap::new(),
        }
    }

    pub fn page_stem(&mut self, url: &url::Url) -> anyhow::Result<String> {
        let slug = slugify(url.path());
        let url = url.as_str();

        let Some(owner) = self.claimed.get(&slug) else {
            self.claimed.insert(slug.clone(), url.to_owned());
            return Ok(slug);
        };
        if owner == url {
            return Ok(slug);
        }

        match self.policy {
            SlugCollision::Overwrite => {
                tracing::warn!(%slug, first = %owner, url, "slug collision; overwriting page");
                Ok(slug)
            }
            SlugCollision::Hash => {
                let base = format!("{slug}-{}", short_hash(url));
                let mut stem = base.clone();
                let mut n = 2_u32;
                while let Some(holder) = self.claimed.get(&stem) {
                    if holder == url {
                        return Ok(stem);
                    }
                    stem = format!("{base}-{n}");
                    n += 1;
                }
                tracing::warn!(%slug, url, %stem, "slug collision; disambiguating");
                self.claimed.insert(stem.clone(), url.to_owned());
                Ok(stem)
            }
            SlugCollision::Error => {
                anyhow::bail!("slug collision on {slug:?}: {owner} and {url}")
            }
        }
    }
}

fn short_hash(input: &str) -> String {
    let digest = sha2::Sha256::digest(input.as_bytes());
    hex::encode(&digest[..4])
}
