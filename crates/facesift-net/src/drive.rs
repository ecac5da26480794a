//! Candidate discovery from a public Google Drive folder.
//!
//! The folder page is fetched anonymously and scraped for quoted tokens that
//! look like Drive file ids. Each id becomes a direct-download URL. The
//! listing is best effort: private folders and layout changes yield an
//! empty or failed listing, which callers report as "no images found".

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const FOLDER_PAGE_BASE: &str = "https://drive.google.com/drive/folders/";
const DOWNLOAD_BASE: &str = "https://drive.google.com/uc?id=";
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("folder listing failed: {0}")]
    Request(String),
    #[error("folder listing returned HTTP {0}")]
    Status(u16),
}

struct Patterns {
    folder_urls: [Regex; 2],
    folder_id: [Regex; 2],
    file_id: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static pattern is valid");
        Patterns {
            folder_urls: [
                re(r"drive\.google\.com/drive/folders/"),
                re(r"drive\.google\.com/drive/u/\d+/folders/"),
            ],
            folder_id: [re(r"folders/([a-zA-Z0-9_-]+)"), re(r"id=([a-zA-Z0-9_-]+)")],
            file_id: re(r#""([a-zA-Z0-9_-]{25,})""#),
        }
    })
}

/// True for links to a Drive folder (`/drive/folders/` or `/drive/u/<n>/folders/`).
pub fn is_drive_folder_url(url: &str) -> bool {
    patterns().folder_urls.iter().any(|re| re.is_match(url))
}

/// Extract the folder id from a Drive folder link.
pub fn extract_folder_id(url: &str) -> Option<String> {
    patterns()
        .folder_id
        .iter()
        .find_map(|re| re.captures(url))
        .map(|caps| caps[1].to_string())
}

/// Direct-download URL for a Drive file id.
pub fn download_url(file_id: &str) -> String {
    format!("{DOWNLOAD_BASE}{file_id}&export=download")
}

/// Scrape candidate file ids from a folder page, in page order.
///
/// Duplicates and the folder's own id are skipped; at most `limit` ids are
/// returned.
pub fn extract_file_ids(page: &str, folder_id: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    patterns()
        .file_id
        .captures_iter(page)
        .map(|caps| caps[1].to_string())
        .filter(|id| id != folder_id && seen.insert(id.clone()))
        .take(limit)
        .collect()
}

/// Lists the images of a public Drive folder.
pub struct FolderLister {
    client: reqwest::Client,
    page_base: String,
    limit: usize,
}

impl FolderLister {
    pub fn new(timeout: Duration, limit: usize) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(|e| DiscoveryError::Request(e.to_string()))?;
        Ok(Self { client, page_base: FOLDER_PAGE_BASE.to_string(), limit })
    }

    /// Fetch folder pages from `base` + folder id instead of Drive.
    pub fn with_page_base(mut self, base: impl Into<String>) -> Self {
        self.page_base = base.into();
        self
    }

    /// Download URLs for the images in `folder_id`, in listing order.
    pub async fn list(&self, folder_id: &str) -> Result<Vec<String>, DiscoveryError> {
        let url = format!("{}{folder_id}", self.page_base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status(status.as_u16()));
        }

        let page = response.text().await.map_err(|e| DiscoveryError::Request(e.to_string()))?;
        let ids = extract_file_ids(&page, folder_id, self.limit);
        tracing::info!(folder_id, found = ids.len(), limit = self.limit, "listed drive folder");

        Ok(ids.iter().map(|id| download_url(id)).collect())
    }
}
