//! Choosing one representative LOINC code when no SNOMED answer exists.

use crate::models::RankedCandidate;

/// Conventional default for a bare "hemoglobin" lab query.
const BLOOD_HEMOGLOBIN_CODE: &str = "718-7";

/// Pick one LOINC candidate from a ranked list.
///
/// Deprecated displays are dropped unless nothing else remains. A query about
/// hemoglobin prefers the blood-specimen code; otherwise rank order decides.
pub fn pick_representative_loinc<'a>(
    candidates: &'a [RankedCandidate],
    query: &str,
) -> Option<&'a RankedCandidate> {
    let mut pool: Vec<&RankedCandidate> = candidates
        .iter()
        .filter(|c| {
            let display = c.display.trim();
            !display.is_empty() && !display.to_lowercase().contains("deprecated")
        })
        .collect();
    if pool.is_empty() {
        pool = candidates.iter().collect();
    }

    if query.to_lowercase().contains("hemoglobin") {
        let blood = pool.iter().copied().find(|c| {
            c.display.to_lowercase().contains("in blood") || c.code.trim() == BLOOD_HEMOGLOBIN_CODE
        });
        if blood.is_some() {
            return blood;
        }
    }

    pool.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(code: &str, display: &str, score: u8) -> RankedCandidate {
        RankedCandidate {
            code: code.into(),
            display: display.into(),
            score,
        }
    }

    #[test]
    fn test_hemoglobin_prefers_blood() {
        let candidates = vec![
            cand("XXXX", "Hemoglobin [Deprecated]", 100),
            cand("718-7", "Hemoglobin in Blood", 100),
        ];
        let best = pick_representative_loinc(&candidates, "hemoglobin").unwrap();
        assert_eq!(best.code, "718-7");
    }

    #[test]
    fn test_hemoglobin_blood_beats_rank_order() {
        let candidates = vec![
            cand("4544-3", "Hematocrit and Hemoglobin panel", 100),
            cand("718-7", "Hemoglobin [Mass/volume] in Blood", 90),
        ];
        let best = pick_representative_loinc(&candidates, "Hemoglobin level").unwrap();
        assert_eq!(best.code, "718-7");
    }

    #[test]
    fn test_deprecated_dropped() {
        let candidates = vec![
            cand("1", "Creatinine [Deprecated]", 100),
            cand("2160-0", "Creatinine [Mass/volume] in Serum or Plasma", 95),
        ];
        assert_eq!(pick_representative_loinc(&candidates, "creatinine").unwrap().code, "2160-0");
    }

    #[test]
    fn test_all_deprecated_restores_full_set() {
        let candidates = vec![cand("1", "Old thing DEPRECATED", 90), cand("2", "Older deprecated", 80)];
        assert_eq!(pick_representative_loinc(&candidates, "thing").unwrap().code, "1");
    }

    #[test]
    fn test_empty() {
        assert!(pick_representative_loinc(&[], "hemoglobin").is_none());
    }
}
