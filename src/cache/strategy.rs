//! Breakpoint strategies and candidate selection

use super::candidates::CacheCandidate;
use super::classifier::Thresholds;
use super::{RetentionTier, MAX_BREAKPOINTS};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How eagerly breakpoints are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Few breakpoints, only on large segments, favoring stable content
    Conservative,
    /// Balanced default
    #[default]
    Moderate,
    /// Use every breakpoint the API allows, including smaller volatile segments
    Aggressive,
}

/// Numeric policy behind a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyProfile {
    /// Minimum tokens for stable (`1h`) segments
    pub min_tokens: usize,
    /// Minimum tokens for volatile (`5m`) segments
    pub volatile_min_tokens: usize,
    /// Breakpoints emitted at most, before the API ceiling applies
    pub max_breakpoints: usize,
}

const CONSERVATIVE: StrategyProfile = StrategyProfile {
    min_tokens: 2048,
    volatile_min_tokens: 4096,
    max_breakpoints: 2,
};

const MODERATE: StrategyProfile = StrategyProfile {
    min_tokens: 1024,
    volatile_min_tokens: 2048,
    max_breakpoints: 3,
};

const AGGRESSIVE: StrategyProfile = StrategyProfile {
    min_tokens: 1024,
    volatile_min_tokens: 1024,
    max_breakpoints: 4,
};

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Conservative, Strategy::Moderate, Strategy::Aggressive];

    pub fn profile(&self) -> StrategyProfile {
        match self {
            Strategy::Conservative => CONSERVATIVE,
            Strategy::Moderate => MODERATE,
            Strategy::Aggressive => AGGRESSIVE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Conservative => "conservative",
            Strategy::Moderate => "moderate",
            Strategy::Aggressive => "aggressive",
        }
    }
}

impl StrategyProfile {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            stable: self.min_tokens,
            volatile: self.volatile_min_tokens,
        }
    }

    /// Breakpoint cap after applying the API ceiling
    pub fn breakpoint_cap(&self) -> usize {
        self.max_breakpoints.min(MAX_BREAKPOINTS)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown strategy '{0}' (expected conservative, moderate or aggressive)")]
pub struct ParseStrategyError(String);

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conservative" => Ok(Strategy::Conservative),
            "moderate" => Ok(Strategy::Moderate),
            "aggressive" => Ok(Strategy::Aggressive),
            _ => Err(ParseStrategyError(s.to_string())),
        }
    }
}

fn tier_rank(tier: RetentionTier) -> u8 {
    match tier {
        RetentionTier::Long => 1,
        RetentionTier::Short => 0,
    }
}

/// Keep at most the strategy's cap of candidates. Ranking prefers the `1h`
/// tier, then larger segments, then earlier positions; the kept candidates
/// stay in wire order.
pub fn select_candidates(candidates: Vec<CacheCandidate>, strategy: Strategy) -> Vec<CacheCandidate> {
    let cap = strategy.profile().breakpoint_cap();
    if candidates.len() <= cap {
        return candidates;
    }

    let mut ranked: Vec<usize> = (0..candidates.len()).collect();
    ranked.sort_by(|&a, &b| compare_rank(&candidates[a], &candidates[b]).then_with(|| a.cmp(&b)));
    ranked.truncate(cap);
    ranked.sort_unstable();

    let mut keep = vec![false; candidates.len()];
    for idx in ranked {
        keep[idx] = true;
    }

    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(candidate, kept)| kept.then_some(candidate))
        .collect()
}

/// `Less` means `a` is the better breakpoint. Position ties are broken by the caller.
fn compare_rank(a: &CacheCandidate, b: &CacheCandidate) -> Ordering {
    tier_rank(b.tier)
        .cmp(&tier_rank(a.tier))
        .then_with(|| b.tokens.cmp(&a.tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Position;
    use proptest::prelude::{any, prop};
    use proptest::strategy::Strategy as PropStrategy;
    use proptest::{prop_assert, prop_assert_eq, prop_assert_ne, proptest};

    fn candidate(idx: usize, tier: RetentionTier, tokens: usize) -> CacheCandidate {
        CacheCandidate::new(Position::Message(idx), tier, tokens)
    }

    #[test]
    fn test_profile_table() {
        assert_eq!(Strategy::Conservative.profile().breakpoint_cap(), 2);
        assert_eq!(Strategy::Moderate.profile().breakpoint_cap(), 3);
        assert_eq!(Strategy::Aggressive.profile().breakpoint_cap(), MAX_BREAKPOINTS);

        for strategy in Strategy::ALL {
            let profile = strategy.profile();
            assert!(profile.volatile_min_tokens >= profile.min_tokens);
            assert!(profile.breakpoint_cap() <= MAX_BREAKPOINTS);
        }
        assert!(
            Strategy::Conservative.profile().min_tokens > Strategy::Aggressive.profile().min_tokens
        );
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!("Aggressive".parse::<Strategy>().unwrap(), Strategy::Aggressive);
        assert_eq!(" moderate ".parse::<Strategy>().unwrap(), Strategy::Moderate);
        assert!("reckless".parse::<Strategy>().is_err());
        assert_eq!(Strategy::default(), Strategy::Moderate);
        assert_eq!(Strategy::Conservative.to_string(), "conservative");
    }

    #[test]
    fn test_under_cap_is_untouched() {
        let input = vec![
            candidate(0, RetentionTier::Short, 1200),
            candidate(1, RetentionTier::Long, 3000),
        ];
        assert_eq!(select_candidates(input.clone(), Strategy::Moderate), input);
    }

    #[test]
    fn test_prefers_long_then_size() {
        let input = vec![
            candidate(0, RetentionTier::Short, 9000),
            candidate(1, RetentionTier::Long, 1100),
            candidate(2, RetentionTier::Short, 5000),
            candidate(3, RetentionTier::Long, 2000),
        ];

        let selected = select_candidates(input, Strategy::Conservative);
        let positions: Vec<_> = selected.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![Position::Message(1), Position::Message(3)]);

        let input = vec![
            candidate(0, RetentionTier::Short, 9000),
            candidate(1, RetentionTier::Long, 1100),
            candidate(2, RetentionTier::Short, 5000),
            candidate(3, RetentionTier::Long, 2000),
        ];
        let selected = select_candidates(input, Strategy::Moderate);
        let positions: Vec<_> = selected.iter().map(|c| c.position).collect();
        assert_eq!(
            positions,
            vec![Position::Message(0), Position::Message(1), Position::Message(3)]
        );
    }

    #[test]
    fn test_ties_go_to_earlier_positions() {
        let input: Vec<_> = (0..6).map(|i| candidate(i, RetentionTier::Short, 1500)).collect();
        let selected = select_candidates(input, Strategy::Aggressive);
        let positions: Vec<_> = selected.iter().map(|c| c.position).collect();
        assert_eq!(
            positions,
            (0..4).map(Position::Message).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(select_candidates(Vec::new(), Strategy::Aggressive).is_empty());
    }

    fn arb_candidates() -> impl PropStrategy<Value = Vec<CacheCandidate>> {
        prop::collection::vec((any::<bool>(), 1usize..20_000), 0..12).prop_map(|items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (long, tokens))| {
                    let tier = if long { RetentionTier::Long } else { RetentionTier::Short };
                    candidate(i, tier, tokens)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_selection_is_ordered_subsequence(input in arb_candidates(), pick in 0usize..3) {
            let strategy = Strategy::ALL[pick];
            let selected = select_candidates(input.clone(), strategy);

            prop_assert!(selected.len() <= strategy.profile().breakpoint_cap());
            prop_assert!(selected.len() <= MAX_BREAKPOINTS);
            prop_assert_eq!(selected.len(), input.len().min(strategy.profile().breakpoint_cap()));

            let mut cursor = input.iter();
            for kept in &selected {
                prop_assert!(cursor.any(|c| c == kept));
            }
        }

        #[test]
        fn prop_dropped_never_outrank_kept(input in arb_candidates()) {
            let selected = select_candidates(input.clone(), Strategy::Conservative);
            for dropped in input.iter().filter(|c| !selected.contains(c)) {
                for kept in &selected {
                    prop_assert_ne!(compare_rank(dropped, kept), Ordering::Less);
                }
            }
        }
    }
}
