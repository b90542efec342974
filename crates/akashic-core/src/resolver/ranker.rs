//! Multi-signal fuzzy ranking over a code-record candidate set.
//!
//! Base score: token-set similarity (0 - 100) of the query against the display
//! text and every alias, best haystack wins. A query whose tokens are all
//! present in a haystack scores at least [`SUBSET_FLOOR`]. On the LOINC path
//! the [`ScoringPolicy`] adjustment is added before clamping.

use std::cmp::Ordering;

use rapidfuzz::distance::indel;

use super::normalizer::{normalize, token_set};
use super::scoring::ScoringPolicy;
use crate::models::{CodeRecord, RankedCandidate};

/// Minimum base score when every query token appears in a haystack.
pub const SUBSET_FLOOR: i32 = 98;

/// `floor(100 * (1 - dist / lensum))`, 100 when both sides are empty.
fn norm_similarity(dist: usize, lensum: usize) -> u32 {
    if lensum == 0 {
        return 100;
    }
    let dist = dist.min(lensum);
    (100 * (lensum - dist) / lensum) as u32
}

/// Token-set similarity of two normalized strings, 0 - 100.
///
/// Symmetric, insensitive to token order and duplicate tokens. Shared tokens
/// are compared as a common prefix, so `"ldl"` vs `"ldl cholesterol"` is 100.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let tokens_a = token_set(a);
    let tokens_b = token_set(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0;
    }

    let sect: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_ab: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_ba: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !sect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100;
    }

    let diff_ab_joined = diff_ab.join(" ");
    let diff_ba_joined = diff_ba.join(" ");
    let ab_len = diff_ab_joined.chars().count();
    let ba_len = diff_ba_joined.chars().count();
    let sect_len = sect.join(" ").chars().count();

    // sect + " " + diff_xy, the separator only present when sect is non-empty
    let sep = usize::from(sect_len != 0);
    let sect_ab_len = sect_len + sep + ab_len;
    let sect_ba_len = sect_len + sep + ba_len;

    let dist = indel::distance(diff_ab_joined.chars(), diff_ba_joined.chars());
    let mut result = norm_similarity(dist, sect_ab_len + sect_ba_len);

    if sect_len != 0 {
        let sect_ab = norm_similarity(sep + ab_len, sect_len + sect_ab_len);
        let sect_ba = norm_similarity(sep + ba_len, sect_len + sect_ba_len);
        result = result.max(sect_ab).max(sect_ba);
    }

    result.min(100) as u8
}

/// Ranker for one code system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyRanker<'a> {
    policy: Option<&'a ScoringPolicy>,
}

impl<'a> FuzzyRanker<'a> {
    /// Plain similarity ranking (SNOMED path).
    pub fn plain() -> Self {
        Self { policy: None }
    }

    /// Similarity plus keyword adjustments (LOINC path).
    pub fn with_policy(policy: &'a ScoringPolicy) -> Self {
        Self {
            policy: Some(policy),
        }
    }

    /// Best similarity of the query against a record's display and aliases.
    pub fn base_score(&self, query_norm: &str, record: &CodeRecord) -> i32 {
        let query_tokens = token_set(query_norm);
        let mut best = 0i32;
        for hay in record.haystacks() {
            let hay_norm = normalize(hay);
            if hay_norm.is_empty() {
                continue;
            }
            if !query_tokens.is_empty() {
                let hay_tokens = token_set(&hay_norm);
                if query_tokens.is_subset(&hay_tokens) {
                    best = best.max(SUBSET_FLOOR);
                }
            }
            best = best.max(i32::from(token_set_ratio(query_norm, &hay_norm)));
        }
        best
    }

    /// Final clamped score for one record.
    pub fn score(&self, query_norm: &str, record: &CodeRecord) -> u8 {
        let base = self.base_score(query_norm, record);
        let adjustment = self.policy.map(|p| p.adjustment(record)).unwrap_or(0);
        base.saturating_add(adjustment).clamp(0, 100) as u8
    }

    /// Rank candidates: keep `score >= score_cutoff`, highest first, ties by
    /// display then code, at most `max(top_k, 1)` results.
    pub fn rank<'r, I>(
        &self,
        query: &str,
        candidates: I,
        top_k: usize,
        score_cutoff: u8,
    ) -> Vec<RankedCandidate>
    where
        I: IntoIterator<Item = &'r CodeRecord>,
    {
        let query_norm = normalize(query);
        let mut out: Vec<RankedCandidate> = candidates
            .into_iter()
            .filter_map(|record| {
                let score = self.score(&query_norm, record);
                (score >= score_cutoff).then(|| RankedCandidate {
                    code: record.code.clone(),
                    display: record.display.clone(),
                    score,
                })
            })
            .collect();

        out.sort_by(compare_ranked);
        out.truncate(top_k.max(1));
        out
    }
}

fn compare_ranked(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.display.cmp(&b.display))
        .then_with(|| a.code.cmp(&b.code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn records() -> Vec<CodeRecord> {
        vec![
            CodeRecord::new("29857009", "Chest pain").with_aliases(["cp", "chest discomfort"]),
            CodeRecord::new("25064002", "Headache").with_aliases(["head pain"]),
            CodeRecord::new("386661006", "Fever").with_aliases(["pyrexia", "elevated temperature"]),
            CodeRecord::new("38341003", "Hypertension").with_aliases(["high blood pressure", "htn"]),
        ]
    }

    #[test]
    fn test_token_set_ratio_known_values() {
        assert_eq!(token_set_ratio("hemoglobin", "hemoglobin"), 100);
        assert_eq!(token_set_ratio("blood hemoglobin", "hemoglobin blood"), 100);
        assert_eq!(token_set_ratio("ldl", "ldl cholesterol"), 100);
        assert_eq!(token_set_ratio("abc", "abd"), 66);
        assert_eq!(token_set_ratio("chest pain", "chest discomfort"), 66);
        assert_eq!(token_set_ratio("", "anything"), 0);
    }

    #[test]
    fn test_subset_shortcut() {
        let ranker = FuzzyRanker::plain();
        let record = CodeRecord::new("13457-7", "LDL cholesterol mass/volume in serum");
        assert!(ranker.score(&normalize("ldl cholesterol"), &record) >= 98);
    }

    #[test]
    fn test_alias_beats_display() {
        let ranker = FuzzyRanker::plain();
        let ranked = ranker.rank("htn", &records(), 3, 70);
        assert_eq!(ranked[0].code, "38341003");
        assert_eq!(ranked[0].score, 100);
    }

    #[test]
    fn test_cutoff_and_top_k() {
        let ranker = FuzzyRanker::plain();
        let ranked = ranker.rank("pain", &records(), 1, 60);
        assert_eq!(ranked.len(), 1);
        // "chest pain" and "head pain" both contain the token; display order breaks the tie
        assert_eq!(ranked[0].display, "Chest pain");

        assert!(ranker.rank("zzzz", &records(), 5, 60).is_empty());
    }

    #[test]
    fn test_top_k_zero_means_one() {
        let ranker = FuzzyRanker::plain();
        assert_eq!(ranker.rank("pain", &records(), 0, 0).len(), 1);
    }

    #[test]
    fn test_policy_reorders_loinc() {
        let policy = ScoringPolicy::default();
        let ranker = FuzzyRanker::with_policy(&policy);
        let candidates = vec![
            CodeRecord::new("24331-1", "Lipid panel with direct LDL"),
            CodeRecord::new("2089-1", "Cholesterol in LDL [Mass/volume] in Serum or Plasma")
                .with_aliases(["LDL cholesterol"]),
        ];

        let ranked = ranker.rank("ldl", &candidates, 5, 60);
        assert_eq!(ranked[0].code, "2089-1");
        assert_eq!(ranked[0].score, 100);
        assert_eq!(ranked[1].code, "24331-1");
        assert_eq!(ranked[1].score, 80);
    }

    #[test]
    fn test_penalty_can_drop_below_cutoff() {
        let policy = ScoringPolicy::default();
        let ranker = FuzzyRanker::with_policy(&policy);
        let candidates = vec![CodeRecord::new("1", "Hemoglobin panel survey question")];
        assert!(ranker.rank("hemoglobin", &candidates, 5, 60).is_empty());
    }

    #[test]
    fn test_extreme_policy_weights_clamp() {
        let policy: ScoringPolicy = serde_json::from_value(serde_json::json!({
            "version": 3,
            "preferred_codes": ["1"],
            "preferred_bonus": i32::MAX,
            "rules": [{"field": "text", "any_of": ["hemoglobin"], "weight": i32::MIN}]
        }))
        .unwrap();
        let ranker = FuzzyRanker::with_policy(&policy);

        assert_eq!(ranker.score("glucose", &CodeRecord::new("1", "Glucose")), 100);
        assert_eq!(ranker.score("hemoglobin", &CodeRecord::new("2", "Hemoglobin")), 0);
    }

    fn arb_record() -> impl Strategy<Value = CodeRecord> {
        ("[0-9]{3,6}", "[a-z]{2,8}( [a-z]{2,8}){0,3}", proptest::collection::vec("[a-z]{2,8}", 0..3))
            .prop_map(|(code, display, aliases)| CodeRecord::new(code, display).with_aliases(aliases))
    }

    proptest! {
        #[test]
        fn prop_rank_invariants(
            query in "[a-z]{2,8}( [a-z]{2,8}){0,2}",
            recs in proptest::collection::vec(arb_record(), 0..20),
            top_k in 0usize..6,
            cutoff in 0u8..=100,
        ) {
            let ranked = FuzzyRanker::plain().rank(&query, &recs, top_k, cutoff);
            prop_assert!(ranked.len() <= top_k.max(1));
            prop_assert!(ranked.iter().all(|c| c.score >= cutoff));
            prop_assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        }

        #[test]
        fn prop_token_set_ratio_symmetric(a in "[a-z]{1,6}( [a-z]{1,6}){0,3}", b in "[a-z]{1,6}( [a-z]{1,6}){0,3}") {
            prop_assert_eq!(token_set_ratio(&a, &b), token_set_ratio(&b, &a));
        }
    }
}
