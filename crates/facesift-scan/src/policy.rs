//! Size-adaptive scan policy.
//!
//! Larger collections are sampled (capped) and compared with a relaxed
//! tolerance; collections over `EARLY_EXIT_MIN_TOTAL` stop once
//! `EARLY_EXIT_MATCHES` photos have matched.

use serde::Serialize;

const SMALL_MAX_TOTAL: usize = 30;
const MEDIUM_MAX_TOTAL: usize = 100;
const MEDIUM_CAP: usize = 60;
const LARGE_CAP: usize = 80;
const DEFAULT_TOLERANCE: f32 = 0.60;
const RELAXED_TOLERANCE: f32 = 0.65;
const EARLY_EXIT_MIN_TOTAL: usize = 50;
const EARLY_EXIT_MATCHES: usize = 15;

/// Collection size class a policy was derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Small,
    Medium,
    Large,
}

/// How a scan walks its candidates. Fixed for the duration of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanPolicy {
    pub tier: Tier,
    /// Candidates examined at most, counted from the start of the sequence.
    pub max_to_examine: usize,
    /// Largest face distance still counted as a match.
    pub tolerance: f32,
    /// Stop as soon as this many photos matched.
    pub early_exit_threshold: Option<usize>,
}

impl ScanPolicy {
    /// Select the policy for a collection of `total` candidates.
    pub fn for_total(total: usize) -> Self {
        let early_exit_threshold = (total > EARLY_EXIT_MIN_TOTAL).then_some(EARLY_EXIT_MATCHES);

        if total <= SMALL_MAX_TOTAL {
            ScanPolicy {
                tier: Tier::Small,
                max_to_examine: total,
                tolerance: DEFAULT_TOLERANCE,
                early_exit_threshold: None,
            }
        } else if total <= MEDIUM_MAX_TOTAL {
            ScanPolicy {
                tier: Tier::Medium,
                max_to_examine: total.min(MEDIUM_CAP),
                tolerance: DEFAULT_TOLERANCE,
                early_exit_threshold,
            }
        } else {
            ScanPolicy {
                tier: Tier::Large,
                max_to_examine: LARGE_CAP,
                tolerance: RELAXED_TOLERANCE,
                early_exit_threshold,
            }
        }
    }

    /// True once `matched` photos satisfy the early-exit threshold.
    pub fn should_stop(&self, matched: usize) -> bool {
        self.early_exit_threshold.is_some_and(|threshold| matched >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_examines_everything() {
        for total in 0..=30 {
            let p = ScanPolicy::for_total(total);
            assert_eq!(p.tier, Tier::Small);
            assert_eq!(p.max_to_examine, total);
            assert_eq!(p.tolerance, 0.60);
            assert_eq!(p.early_exit_threshold, None);
        }
    }

    #[test]
    fn test_medium_caps_at_sixty() {
        for total in 31..=100 {
            let p = ScanPolicy::for_total(total);
            assert_eq!(p.tier, Tier::Medium);
            assert_eq!(p.max_to_examine, total.min(60));
            assert_eq!(p.tolerance, 0.60);
        }
    }

    #[test]
    fn test_medium_early_exit_only_above_fifty() {
        assert_eq!(ScanPolicy::for_total(50).early_exit_threshold, None);
        assert_eq!(ScanPolicy::for_total(51).early_exit_threshold, Some(15));
        assert_eq!(ScanPolicy::for_total(100).early_exit_threshold, Some(15));
    }

    #[test]
    fn test_large_relaxed_and_capped() {
        for total in [101, 150, 1_000, 100_000] {
            let p = ScanPolicy::for_total(total);
            assert_eq!(p.tier, Tier::Large);
            assert_eq!(p.max_to_examine, 80);
            assert_eq!(p.tolerance, 0.65);
            assert_eq!(p.early_exit_threshold, Some(15));
        }
    }

    #[test]
    fn test_never_examines_more_than_total() {
        for total in 0..300 {
            assert!(ScanPolicy::for_total(total).max_to_examine <= total);
        }
    }

    #[test]
    fn test_should_stop() {
        let medium = ScanPolicy::for_total(60);
        assert!(!medium.should_stop(14));
        assert!(medium.should_stop(15));
        assert!(!ScanPolicy::for_total(10).should_stop(1_000));
    }
}
