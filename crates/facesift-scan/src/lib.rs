//! facesift-scan — Adaptive face-match scanning over a photo collection.
//!
//! Picks a [`ScanPolicy`] from the collection size, walks candidates one at a
//! time through a fetcher and a face matcher, and packs the matches into a
//! ZIP archive.

pub mod archive;
pub mod policy;
pub mod scan;

pub use archive::{build_archive, ArchiveBuilder, ArchiveError, ARCHIVE_FILE_NAME, ARCHIVE_MIME_TYPE};
pub use policy::{ScanPolicy, Tier};
pub use scan::{
    match_candidate, Candidate, CandidateOutcome, CandidateResult, MatchedImage, ScanReport,
    Scanner, SkipReason,
};
