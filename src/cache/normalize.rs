//! TTL hierarchy normalization
//!
//! Every breakpoint caches a prefix of the request, and each later breakpoint's
//! prefix contains the earlier ones. If a `5m` breakpoint sits in front of a
//! `1h` breakpoint, the shared bytes are only held for five minutes and the
//! longer retention buys nothing. Normalization upgrades everything up to the
//! last `1h` breakpoint to `1h`, and leaves the tail after it alone.

use super::candidates::CacheCandidate;
use super::RetentionTier;

/// Upgrade every candidate at or before the last `1h` candidate to `1h`.
///
/// Returns the number of candidates that were upgraded. Tiers are never
/// lowered, and applying this twice is the same as applying it once.
pub fn normalize_tiers(candidates: &mut [CacheCandidate]) -> usize {
    let Some(last_long) = candidates
        .iter()
        .rposition(|c| c.tier == RetentionTier::Long)
    else {
        return 0;
    };

    let mut upgraded = 0;
    for candidate in &mut candidates[..last_long] {
        if candidate.tier != RetentionTier::Long {
            candidate.tier = RetentionTier::Long;
            upgraded += 1;
        }
    }
    upgraded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Position;
    use proptest::prelude::{any, prop};
    use proptest::strategy::Strategy;
    use proptest::{prop_assert, prop_assert_eq, proptest};

    use crate::cache::RetentionTier::{Long, Short};

    fn build(spec: &[(RetentionTier, usize)]) -> Vec<CacheCandidate> {
        spec.iter()
            .enumerate()
            .map(|(i, &(tier, tokens))| CacheCandidate::new(Position::Message(i), tier, tokens))
            .collect()
    }

    fn tiers(candidates: &[CacheCandidate]) -> Vec<RetentionTier> {
        candidates.iter().map(|c| c.tier).collect()
    }

    #[test]
    fn test_no_long_tier_leaves_all_short() {
        let mut candidates = build(&[(Short, 1000), (Short, 1500)]);
        assert_eq!(normalize_tiers(&mut candidates), 0);
        assert_eq!(tiers(&candidates), vec![Short, Short]);
    }

    #[test]
    fn test_upgrades_prefix_before_long() {
        let mut candidates = build(&[(Short, 1000), (Short, 1500), (Long, 1200), (Short, 800)]);
        assert_eq!(normalize_tiers(&mut candidates), 2);
        assert_eq!(tiers(&candidates), vec![Long, Long, Long, Short]);
    }

    #[test]
    fn test_upgrades_up_to_last_long() {
        let mut candidates = build(&[
            (Short, 1000),
            (Long, 1500),
            (Short, 1200),
            (Long, 800),
            (Short, 900),
        ]);
        assert_eq!(normalize_tiers(&mut candidates), 2);
        assert_eq!(tiers(&candidates), vec![Long, Long, Long, Long, Short]);
    }

    #[test]
    fn test_empty_is_noop() {
        let mut candidates: Vec<CacheCandidate> = Vec::new();
        assert_eq!(normalize_tiers(&mut candidates), 0);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_only_tier_changes() {
        let original = build(&[(Short, 1000), (Long, 1500)]);
        let mut candidates = original.clone();
        normalize_tiers(&mut candidates);

        for (before, after) in original.iter().zip(&candidates) {
            assert_eq!(before.position, after.position);
            assert_eq!(before.tokens, after.tokens);
            assert_eq!(before.content_type, after.content_type);
        }
    }

    fn arb_tiers() -> impl Strategy<Value = Vec<CacheCandidate>> {
        prop::collection::vec((any::<bool>(), 1usize..10_000), 0..16).prop_map(|items| {
            let spec: Vec<_> = items
                .into_iter()
                .map(|(long, tokens)| (if long { Long } else { Short }, tokens))
                .collect();
            build(&spec)
        })
    }

    proptest! {
        #[test]
        fn prop_never_downgrades(input in arb_tiers()) {
            let mut output = input.clone();
            normalize_tiers(&mut output);
            for (before, after) in input.iter().zip(&output) {
                if before.tier == Long {
                    prop_assert_eq!(after.tier, Long);
                }
            }
        }

        #[test]
        fn prop_idempotent(input in arb_tiers()) {
            let mut once = input;
            normalize_tiers(&mut once);
            let mut twice = once.clone();
            prop_assert_eq!(normalize_tiers(&mut twice), 0);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_long_run_then_untouched_tail(input in arb_tiers()) {
            let last_long = input.iter().rposition(|c| c.tier == Long);
            let mut output = input.clone();
            normalize_tiers(&mut output);

            let run = last_long.map_or(0, |l| l + 1);
            prop_assert!(output[..run].iter().all(|c| c.tier == Long));
            prop_assert_eq!(tiers(&output[run..]), tiers(&input[run..]));
            prop_assert_eq!(output.len(), input.len());
        }
    }
}
