use serde::{Deserialize, Serialize};

/// One successfully externalized image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: u64,
    pub extension: String,
    pub origin_url: String,
}

impl ImageRecord {
    pub fn local_name(&self) -> String {
        format!("img{}{}", self.id, self.extension)
    }

    /// Line appended to `image_sources.txt`.
    pub fn provenance_line(&self) -> String {
        format!("{} {}\n", self.local_name(), self.origin_url)
    }
}

/// One line of `crawl.jsonl`, written for every visited URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_path: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retrieved_at: String,
}
