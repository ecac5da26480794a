//! Sequential face-match scan over an ordered candidate list.
//!
//! One candidate is fetched and compared before the next begins. A failed
//! fetch or comparison forfeits that candidate only; the scan always runs
//! to the policy cap or the early-exit threshold.

use crate::policy::ScanPolicy;
use facesift_core::{FaceMatcher, FaceVerdict, MatchError, NoMatchReason, ReferenceEncoding};
use facesift_net::{FetchError, ImageFetcher};
use std::fmt;

/// One remote photo, identified by its position in the input sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub index: usize,
    pub location: String,
}

impl Candidate {
    /// Number `locations` in input order.
    pub fn sequence<I, S>(locations: I) -> Vec<Candidate>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        locations
            .into_iter()
            .enumerate()
            .map(|(index, location)| Candidate { index, location: location.into() })
            .collect()
    }
}

/// Why a candidate was skipped without a verdict.
#[derive(Debug)]
pub enum SkipReason {
    Fetch(FetchError),
    Compare(MatchError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Fetch(e) => write!(f, "fetch failed: {e}"),
            SkipReason::Compare(e) => write!(f, "compare failed: {e}"),
        }
    }
}

/// What examining a single candidate produced.
#[derive(Debug)]
pub enum CandidateOutcome {
    /// A face matched; carries the photo exactly as downloaded.
    Matched(Vec<u8>),
    NoMatch(NoMatchReason),
    Skipped(SkipReason),
}

/// Per-candidate result, in input order.
#[derive(Debug)]
pub struct CandidateResult {
    pub index: usize,
    pub outcome: CandidateOutcome,
}

impl CandidateResult {
    pub fn is_match(&self) -> bool {
        matches!(self.outcome, CandidateOutcome::Matched(_))
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match &self.outcome {
            CandidateOutcome::Matched(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// A matched photo and the candidate it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedImage {
    pub index: usize,
    pub bytes: Vec<u8>,
}

impl AsRef<[u8]> for MatchedImage {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Summary of a completed scan.
#[derive(Debug)]
pub struct ScanReport {
    pub policy: ScanPolicy,
    pub total: usize,
    pub examined: usize,
    pub skipped: usize,
    pub stopped_early: bool,
    /// Matches in discovery order.
    pub matched: Vec<MatchedImage>,
}

impl ScanReport {
    pub fn has_matches(&self) -> bool {
        !self.matched.is_empty()
    }

    pub fn matched_indices(&self) -> Vec<usize> {
        self.matched.iter().map(|m| m.index).collect()
    }
}

/// Run the face matcher on downloaded bytes, handing the bytes back on a match.
pub fn match_candidate<M: FaceMatcher + ?Sized>(
    matcher: &mut M,
    bytes: Vec<u8>,
    reference: &ReferenceEncoding,
    tolerance: f32,
) -> CandidateOutcome {
    match matcher.compare(&bytes, reference, tolerance) {
        Ok(FaceVerdict::Match { .. }) => CandidateOutcome::Matched(bytes),
        Ok(FaceVerdict::NoMatch(reason)) => CandidateOutcome::NoMatch(reason),
        Err(e) => CandidateOutcome::Skipped(SkipReason::Compare(e)),
    }
}

/// Mutable state of one scan; lives only inside [`Scanner::scan`].
#[derive(Default)]
struct ScanSession {
    examined: usize,
    skipped: usize,
    matched: Vec<MatchedImage>,
}

/// Drives a scan with a fetcher and a matcher.
pub struct Scanner<'a, F, M: ?Sized> {
    fetcher: &'a F,
    matcher: &'a mut M,
}

impl<'a, F, M> Scanner<'a, F, M>
where
    F: ImageFetcher,
    M: FaceMatcher + ?Sized,
{
    pub fn new(fetcher: &'a F, matcher: &'a mut M) -> Self {
        Self { fetcher, matcher }
    }

    /// Fetch and compare a single candidate.
    pub async fn examine(
        &mut self,
        candidate: &Candidate,
        reference: &ReferenceEncoding,
        tolerance: f32,
    ) -> CandidateResult {
        let outcome = match self.fetcher.fetch(&candidate.location).await {
            Ok(bytes) => match_candidate(&mut *self.matcher, bytes, reference, tolerance),
            Err(e) => CandidateOutcome::Skipped(SkipReason::Fetch(e)),
        };
        CandidateResult { index: candidate.index, outcome }
    }

    /// Examine `candidates` in order under `policy`.
    pub async fn scan(
        &mut self,
        candidates: &[Candidate],
        reference: &ReferenceEncoding,
        policy: &ScanPolicy,
    ) -> ScanReport {
        let total = candidates.len();
        let limit = policy.max_to_examine.min(total);
        let mut session = ScanSession::default();
        let mut stopped_early = false;

        tracing::info!(
            total,
            limit,
            tier = ?policy.tier,
            tolerance = policy.tolerance,
            early_exit = ?policy.early_exit_threshold,
            backend = %self.matcher.backend(),
            "scan started"
        );

        for candidate in &candidates[..limit] {
            let position = session.examined + 1;
            let percent = position as f32 / limit as f32 * 100.0;
            tracing::info!(index = candidate.index, position, limit, percent = %format_args!("{percent:.1}"), "examining candidate");

            let result = self.examine(candidate, reference, policy.tolerance).await;
            session.examined += 1;

            match result.outcome {
                CandidateOutcome::Matched(bytes) => {
                    session.matched.push(MatchedImage { index: result.index, bytes });
                    tracing::info!(index = result.index, matches = session.matched.len(), "match found");
                }
                CandidateOutcome::NoMatch(reason) => {
                    tracing::debug!(index = result.index, ?reason, "no match");
                }
                CandidateOutcome::Skipped(reason) => {
                    session.skipped += 1;
                    tracing::warn!(index = result.index, url = %candidate.location, %reason, "candidate skipped");
                }
            }

            if policy.should_stop(session.matched.len()) {
                stopped_early = session.examined < limit;
                tracing::info!(matches = session.matched.len(), examined = session.examined, "early-exit threshold reached");
                break;
            }
        }

        tracing::info!(
            matches = session.matched.len(),
            examined = session.examined,
            skipped = session.skipped,
            total,
            "scan complete"
        );

        ScanReport {
            policy: *policy,
            total,
            examined: session.examined,
            skipped: session.skipped,
            stopped_early,
            matched: session.matched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{build_archive, reader::read_entries};
    use facesift_core::{Backend, Embedding, PlaceholderMatcher};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io::Cursor;

    /// Serves canned bodies by URL and records every request.
    #[derive(Default)]
    struct FakeFetcher {
        bodies: HashMap<String, Vec<u8>>,
        requests: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        fn with(bodies: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
            Self { bodies: bodies.into_iter().collect(), ..Default::default() }
        }

        fn requested(&self) -> Vec<String> {
            self.requests.borrow().clone()
        }
    }

    impl ImageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.requests.borrow_mut().push(url.to_string());
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Transport(format!("connection reset: {url}")))
        }
    }

    /// Matches bodies starting with "match", errors on "boom", no face otherwise.
    struct PrefixMatcher;

    impl FaceMatcher for PrefixMatcher {
        fn backend(&self) -> Backend {
            Backend::Placeholder
        }

        fn encode_reference(&mut self, _: &[u8]) -> Result<Option<ReferenceEncoding>, MatchError> {
            Ok(Some(reference()))
        }

        fn compare(&mut self, image: &[u8], _: &ReferenceEncoding, _: f32) -> Result<FaceVerdict, MatchError> {
            if image.starts_with(b"match") {
                Ok(FaceVerdict::Match { distance: 0.1 })
            } else if image.starts_with(b"boom") {
                Err(MatchError::ModelMismatch { expected: "a".into(), actual: "b".into() })
            } else {
                Ok(FaceVerdict::NoMatch(NoMatchReason::NoFace))
            }
        }
    }

    fn reference() -> ReferenceEncoding {
        ReferenceEncoding::new(Embedding::normalized(vec![1.0, 0.0], "prefix").unwrap())
    }

    fn url(i: usize) -> String {
        format!("https://photos.test/{i}.jpg")
    }

    /// `total` candidates; those in `matching` serve "match-<i>", the rest "miss-<i>".
    fn collection(total: usize, matching: &[usize]) -> (Vec<Candidate>, FakeFetcher) {
        let fetcher = FakeFetcher::with((0..total).map(|i| {
            let body = if matching.contains(&i) { format!("match-{i}") } else { format!("miss-{i}") };
            (url(i), body.into_bytes())
        }));
        (Candidate::sequence((0..total).map(url)), fetcher)
    }

    #[test]
    fn test_candidate_sequence_numbers_in_order() {
        let c = Candidate::sequence(["a", "b"]);
        assert_eq!(c[0], Candidate { index: 0, location: "a".into() });
        assert_eq!(c[1].index, 1);
    }

    #[tokio::test]
    async fn test_matches_keep_discovery_order() {
        let (candidates, fetcher) = collection(12, &[9, 2, 5]);
        let policy = ScanPolicy::for_total(candidates.len());
        let mut matcher = PrefixMatcher;

        let report = Scanner::new(&fetcher, &mut matcher).scan(&candidates, &reference(), &policy).await;

        assert_eq!(report.matched_indices(), vec![2, 5, 9]);
        let bodies: Vec<&[u8]> = report.matched.iter().map(|m| m.bytes.as_slice()).collect();
        assert_eq!(bodies, [&b"match-2"[..], b"match-5", b"match-9"]);
        assert_eq!(report.examined, 12);
        assert!(!report.stopped_early);
    }

    #[tokio::test]
    async fn test_early_exit_after_fifteen_matches() {
        let (candidates, fetcher) = collection(60, &(0..15).collect::<Vec<_>>());
        let policy = ScanPolicy::for_total(candidates.len());
        let mut matcher = PrefixMatcher;

        let report = Scanner::new(&fetcher, &mut matcher).scan(&candidates, &reference(), &policy).await;

        assert_eq!(report.examined, 15);
        assert_eq!(report.matched.len(), 15);
        assert!(report.stopped_early);
        assert_eq!(fetcher.requested().len(), 15, "remaining candidates must not be fetched");
    }

    #[tokio::test]
    async fn test_small_collection_never_exits_early() {
        let all: Vec<usize> = (0..30).collect();
        let (candidates, fetcher) = collection(30, &all);
        let policy = ScanPolicy::for_total(candidates.len());
        let mut matcher = PrefixMatcher;

        let report = Scanner::new(&fetcher, &mut matcher).scan(&candidates, &reference(), &policy).await;

        assert_eq!(report.examined, 30);
        assert_eq!(report.matched.len(), 30);
    }

    #[tokio::test]
    async fn test_large_collection_stops_at_cap() {
        let (candidates, fetcher) = collection(250, &[0, 100, 200]);
        let policy = ScanPolicy::for_total(candidates.len());
        let mut matcher = PrefixMatcher;

        let report = Scanner::new(&fetcher, &mut matcher).scan(&candidates, &reference(), &policy).await;

        assert_eq!(report.examined, 80);
        assert_eq!(report.matched_indices(), vec![0]);
        assert_eq!(fetcher.requested().last(), Some(&url(79)));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_isolated() {
        let (candidates, mut fetcher) = collection(5, &[1, 3]);
        fetcher.bodies.remove(&url(1));
        let policy = ScanPolicy::for_total(candidates.len());
        let mut matcher = PrefixMatcher;

        let report = Scanner::new(&fetcher, &mut matcher).scan(&candidates, &reference(), &policy).await;

        assert_eq!(report.matched_indices(), vec![3]);
        assert_eq!(report.examined, 5);
        assert_eq!(report.skipped, 1);
        assert_eq!(fetcher.requested(), (0..5).map(url).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_compare_failure_is_isolated() {
        let (candidates, mut fetcher) = collection(4, &[3]);
        fetcher.bodies.insert(url(0), b"boom".to_vec());
        let policy = ScanPolicy::for_total(candidates.len());
        let mut matcher = PrefixMatcher;

        let mut scanner = Scanner::new(&fetcher, &mut matcher);
        let first = scanner.examine(&candidates[0], &reference(), policy.tolerance).await;
        assert!(matches!(first.outcome, CandidateOutcome::Skipped(SkipReason::Compare(_))));
        assert!(first.payload().is_none());

        let report = scanner.scan(&candidates, &reference(), &policy).await;
        assert_eq!(report.matched_indices(), vec![3]);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_empty_collection_examines_nothing() {
        let fetcher = FakeFetcher::default();
        let mut matcher = PrefixMatcher;

        let report = Scanner::new(&fetcher, &mut matcher)
            .scan(&[], &reference(), &ScanPolicy::for_total(0))
            .await;

        assert_eq!(report.examined, 0);
        assert!(!report.has_matches());
        assert!(fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn test_examine_returns_bytes_on_match() {
        let (candidates, fetcher) = collection(1, &[0]);
        let mut matcher = PrefixMatcher;

        let result = Scanner::new(&fetcher, &mut matcher).examine(&candidates[0], &reference(), 0.6).await;

        assert!(result.is_match());
        assert_eq!(result.payload(), Some(&b"match-0"[..]));
    }

    fn png(img: RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn checkerboard(invert: bool) -> Vec<u8> {
        png(RgbImage::from_fn(64, 64, |x, y| {
            let light = ((x / 8 + y / 8) % 2 == 0) != invert;
            if light { Rgb([240, 230, 220]) } else { Rgb([20, 25, 30]) }
        }))
    }

    #[tokio::test]
    async fn test_end_to_end_with_placeholder_matcher() {
        let selfie = checkerboard(false);
        let others: Vec<Vec<u8>> = vec![
            png(RgbImage::from_fn(64, 64, |x, _| Rgb([(x * 4) as u8, 80, 80]))),
            png(RgbImage::from_fn(64, 64, |_, y| Rgb([40, (y * 4) as u8, 40]))),
            png(RgbImage::from_fn(64, 64, |x, _| if (x / 8) % 2 == 0 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) })),
            selfie.clone(),
            png(RgbImage::from_fn(64, 64, |_, y| if (y / 8) % 2 == 0 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) })),
            b"<html>quota exceeded</html>".to_vec(),
            png(RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]))),
            selfie.clone(),
            checkerboard(true),
        ];
        // Candidate 9 is never served.
        let fetcher = FakeFetcher::with(others.into_iter().enumerate().map(|(i, body)| (url(i), body)));
        let candidates = Candidate::sequence((0..10).map(url));

        let mut matcher = PlaceholderMatcher;
        let reference = matcher.encode_reference(&selfie).unwrap().unwrap();
        let policy = ScanPolicy::for_total(candidates.len());

        let report = Scanner::new(&fetcher, &mut matcher).scan(&candidates, &reference, &policy).await;

        assert_eq!(report.matched_indices(), vec![3, 7]);
        assert_eq!(report.examined, 10);
        assert_eq!(report.skipped, 1);

        let zip = build_archive(&report.matched).unwrap();
        let entries = read_entries(&zip);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "photo_001.jpg");
        assert_eq!(entries[1].0, "photo_002.jpg");
        assert_eq!(entries[0].1, selfie);
        assert_eq!(entries[1].1, selfie);
    }
}
