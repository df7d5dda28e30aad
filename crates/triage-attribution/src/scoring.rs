use crate::normalize::ClassPathFragment;
use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;
use triage_core::{PositionPolicy, TeamAliasMap};

/// Evidence collected for one alias across one record's fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamMatch {
    pub alias: String,
    pub label: String,
    pub match_count: usize,
    pub fragment_index: usize,
    pub word_offset: usize,
    /// Occurrences on the fragment currently held as the position.
    pub position_occurrences: usize,
    /// Position of the alias in the configured table.
    pub alias_rank: usize,
}

impl TeamMatch {
    fn rank_key(&self) -> (Reverse<usize>, usize, Reverse<usize>) {
        (
            Reverse(self.match_count),
            self.fragment_index,
            Reverse(self.word_offset),
        )
    }
}

/// Highest count first, then earliest fragment, then deepest word offset.
/// Residual ties fall back to alias table order.
pub fn compare_matches(left: &TeamMatch, right: &TeamMatch) -> Ordering {
    left.rank_key()
        .cmp(&right.rank_key())
        .then(left.alias_rank.cmp(&right.alias_rank))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamScores {
    matches: Vec<TeamMatch>,
}

impl TeamScores {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TeamMatch> {
        self.matches.iter()
    }

    pub fn get(&self, alias: &str) -> Option<&TeamMatch> {
        self.matches.iter().find(|entry| entry.alias == alias)
    }

    /// Number of matched aliases mapped to `label`, regardless of how often
    /// each one occurred.
    pub fn label_entry_count(&self, label: &str) -> usize {
        self.matches
            .iter()
            .filter(|entry| entry.label == label)
            .count()
    }

    pub fn ranked(&self) -> Vec<&TeamMatch> {
        let mut ordered = self.matches.iter().collect::<Vec<_>>();
        ordered.sort_by(|left, right| compare_matches(left, right));
        ordered
    }

    pub fn resolve(&self) -> Option<&TeamMatch> {
        self.matches
            .iter()
            .min_by(|left, right| compare_matches(left, right))
    }

    /// The winning label, or an empty string when nothing matched.
    pub fn predicted_owning_team(&self) -> String {
        self.resolve()
            .map(|entry| entry.label.clone())
            .unwrap_or_default()
    }
}

pub fn score_fragments(
    fragments: &[ClassPathFragment],
    aliases: &TeamAliasMap,
    policy: PositionPolicy,
) -> TeamScores {
    let mut by_rank = BTreeMap::<usize, TeamMatch>::new();

    for (fragment_index, fragment) in fragments.iter().enumerate() {
        let lowered = fragment.as_str().to_lowercase();
        for (alias_rank, entry) in aliases.iter().enumerate() {
            let starts = lowered
                .match_indices(entry.alias.as_str())
                .map(|(start, _)| start)
                .collect::<Vec<_>>();
            let Some(&last_start) = starts.last() else {
                continue;
            };
            let occurrences = starts.len();
            let word_offset = lowered[..last_start].split_whitespace().count();

            match by_rank.get_mut(&alias_rank) {
                Some(existing) => {
                    existing.match_count += occurrences;
                    let take_position = match policy {
                        PositionPolicy::EarliestFragment => {
                            fragment_index <= existing.fragment_index
                        }
                        PositionPolicy::MostOccurrences => {
                            occurrences > existing.position_occurrences
                        }
                    };
                    if take_position {
                        existing.fragment_index = fragment_index;
                        existing.word_offset = word_offset;
                        existing.position_occurrences = occurrences;
                    }
                }
                None => {
                    by_rank.insert(
                        alias_rank,
                        TeamMatch {
                            alias: entry.alias.clone(),
                            label: entry.label.clone(),
                            match_count: occurrences,
                            fragment_index,
                            word_offset,
                            position_occurrences: occurrences,
                            alias_rank,
                        },
                    );
                }
            }
        }
    }

    TeamScores {
        matches: by_rank.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::TeamAlias;

    fn aliases(pairs: &[(&str, &str)]) -> TeamAliasMap {
        TeamAliasMap::new(
            pairs
                .iter()
                .map(|(alias, label)| TeamAlias::new(*alias, *label)),
        )
        .expect("alias map")
    }

    fn fragments(lines: &[&str]) -> Vec<ClassPathFragment> {
        lines.iter().map(|line| ClassPathFragment::new(*line)).collect()
    }

    fn score(lines: &[&str], pairs: &[(&str, &str)]) -> TeamScores {
        score_fragments(
            &fragments(lines),
            &aliases(pairs),
            PositionPolicy::EarliestFragment,
        )
    }

    #[test]
    fn earlier_fragment_wins_equal_counts() {
        let scores = score(
            &["pubsub facade handler", "networkanalytics summarize"],
            &[("pubsub", "TeamX"), ("networkanalytics", "TeamY")],
        );
        let pubsub = scores.get("pubsub").expect("pubsub matched");
        let analytics = scores.get("networkanalytics").expect("analytics matched");
        assert_eq!((pubsub.match_count, pubsub.fragment_index), (1, 0));
        assert_eq!((analytics.match_count, analytics.fragment_index), (1, 1));
        assert_eq!(scores.predicted_owning_team(), "TeamX");
    }

    #[test]
    fn higher_count_beats_earlier_position() {
        let scores = score(
            &["nrp nrp internal helper"],
            &[("nrp", "TeamA"), ("nrpinternal", "TeamB")],
        );
        assert_eq!(scores.get("nrp").expect("nrp").match_count, 2);
        assert!(scores.get("nrpinternal").is_none());
        assert_eq!(scores.predicted_owning_team(), "TeamA");

        let scores = score(
            &["slb probe", "nrp frontend", "nrp backend nrp"],
            &[("slb", "TeamS"), ("nrp", "TeamN")],
        );
        assert_eq!(scores.get("nrp").expect("nrp").match_count, 3);
        assert_eq!(scores.predicted_owning_team(), "TeamN");
    }

    #[test]
    fn deeper_word_offset_breaks_same_fragment_ties() {
        let scores = score(
            &["slb manager rnm worker"],
            &[("slb", "TeamS"), ("rnm", "TeamR")],
        );
        assert_eq!(scores.get("slb").expect("slb").word_offset, 0);
        assert_eq!(scores.get("rnm").expect("rnm").word_offset, 2);
        assert_eq!(scores.predicted_owning_team(), "TeamR");
    }

    #[test]
    fn word_offset_counts_tokens_before_last_occurrence() {
        let scores = score(&["nrp alpha beta nrpcore gamma"], &[("nrp", "TeamN")]);
        let nrp = scores.get("nrp").expect("nrp");
        assert_eq!(nrp.match_count, 2);
        assert_eq!(nrp.word_offset, 3);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let scores = score(&["Nrp PubSub Facade"], &[("pubsub", "TeamX")]);
        let pubsub = scores.get("pubsub").expect("pubsub");
        assert_eq!(pubsub.match_count, 1);
        assert_eq!(pubsub.word_offset, 1);
    }

    #[test]
    fn later_fragments_only_add_to_count_under_earliest_policy() {
        let scores = score(
            &["gateway slb", "slb slb slb probe"],
            &[("slb", "TeamS")],
        );
        let slb = scores.get("slb").expect("slb");
        assert_eq!(slb.match_count, 4);
        assert_eq!((slb.fragment_index, slb.word_offset), (0, 1));
    }

    #[test]
    fn most_occurrences_policy_moves_position() {
        let scores = score_fragments(
            &fragments(&["gateway slb", "slb slb slb probe"]),
            &aliases(&[("slb", "TeamS")]),
            PositionPolicy::MostOccurrences,
        );
        let slb = scores.get("slb").expect("slb");
        assert_eq!(slb.match_count, 4);
        assert_eq!((slb.fragment_index, slb.word_offset), (1, 2));
        assert_eq!(slb.position_occurrences, 3);
    }

    #[test]
    fn strictly_later_matches_lose_at_equal_count() {
        let scores = score(
            &["frontend", "frontend", "rnm allocator", "pubsub publisher"],
            &[("pubsub", "TeamLate"), ("rnm", "TeamEarly")],
        );
        assert_eq!(scores.predicted_owning_team(), "TeamEarly");
    }

    #[test]
    fn count_dominates_regardless_of_position() {
        let scores = score(
            &["rnm frontend", "pubsub a", "pubsub b"],
            &[("rnm", "TeamR"), ("pubsub", "TeamP")],
        );
        assert_eq!(scores.predicted_owning_team(), "TeamP");
    }

    #[test]
    fn identical_evidence_falls_back_to_alias_order() {
        let scores = score(
            &["rnmslb probe"],
            &[("rnm", "TeamR"), ("rnmslb", "TeamRS")],
        );
        let ranked = scores.ranked();
        assert_eq!(ranked[0].alias, "rnm");
        assert_eq!(ranked[1].alias, "rnmslb");
        assert_eq!(scores.predicted_owning_team(), "TeamR");

        let swapped = score(
            &["rnmslb probe"],
            &[("rnmslb", "TeamRS"), ("rnm", "TeamR")],
        );
        assert_eq!(swapped.predicted_owning_team(), "TeamRS");
    }

    #[test]
    fn empty_fragments_give_empty_prediction() {
        let scores = score(&[], &[("rnm", "TeamR")]);
        assert!(scores.is_empty());
        assert_eq!(scores.predicted_owning_team(), "");
        assert!(scores.resolve().is_none());
    }

    #[test]
    fn resolution_is_deterministic() {
        let lines = ["nrp pubsub slb", "slb nrp", "pubsub"];
        let pairs = [("nrp", "TeamN"), ("pubsub", "TeamP"), ("slb", "TeamS")];
        let first = score(&lines, &pairs).predicted_owning_team();
        for _ in 0..16 {
            assert_eq!(score(&lines, &pairs).predicted_owning_team(), first);
        }
    }

    #[test]
    fn label_entry_count_counts_aliases_not_occurrences() {
        let scores = score(
            &["nrpinternal cache", "nrp frontend nrp"],
            &[("nrpinternal", "TeamN"), ("nrp", "TeamN"), ("slb", "TeamS")],
        );
        // "nrp" also hits inside "nrpinternal"
        assert_eq!(scores.get("nrp").expect("nrp").match_count, 3);
        assert_eq!(scores.label_entry_count("TeamN"), 2);
        assert_eq!(scores.label_entry_count("TeamS"), 0);
    }
}
