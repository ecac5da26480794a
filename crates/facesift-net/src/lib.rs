//! facesift-net — Where candidate photos come from.
//!
//! Fetches remote image bytes with a bounded timeout and discovers the
//! images of a shared Drive folder.

pub mod drive;
pub mod fetch;

pub use drive::{download_url, extract_folder_id, is_drive_folder_url, DiscoveryError, FolderLister};
pub use fetch::{FetchError, DEFAULT_FETCH_TIMEOUT, HttpFetcher, ImageFetcher};
