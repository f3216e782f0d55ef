//! Muscle field resolution against the PST and isolated-muscle vocabularies.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::normalize::text::{dedupe_case_insensitive, lookup_key, split_muscles};
use crate::normalize::Normalizer;

/// Why a field could not be resolved deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityReason {
    /// The value does not map to a PST label.
    UnmappedValue,
    /// A single PST slot received more than one label.
    MultipleLabels,
    /// Generic shoulder label with no deltoid token in the isolated set.
    ShoulderNoDeltoidEvidence,
    /// Generic shoulder label with more than one deltoid token.
    ShoulderMultipleDeltoids,
    /// An isolated-muscle token outside the granular vocabulary.
    UnmappedIsolatedToken,
}

impl AmbiguityReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmbiguityReason::UnmappedValue => "unmapped_value",
            AmbiguityReason::MultipleLabels => "multiple_labels",
            AmbiguityReason::ShoulderNoDeltoidEvidence => "shoulder_no_deltoid_evidence",
            AmbiguityReason::ShoulderMultipleDeltoids => "shoulder_multiple_deltoids",
            AmbiguityReason::UnmappedIsolatedToken => "unmapped_isolated_token",
        }
    }
}

impl fmt::Display for AmbiguityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving one PST slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PstResolution {
    /// Nothing usable in the value.
    Absent,
    Resolved(String),
    Ambiguous {
        mapped: Option<String>,
        reason: AmbiguityReason,
    },
}

/// Resolve a muscle-group value to one PST label. `evidence` is the row's
/// resolved isolated-muscle set, used to refine the generic shoulder label.
pub fn resolve_pst(normalizer: &Normalizer, value: &str, evidence: &[String]) -> PstResolution {
    let vocab = normalizer.vocabulary();
    let Some(normalized) = normalizer.normalize_muscle(Some(value)) else {
        return PstResolution::Absent;
    };
    let labels: Vec<&str> = normalized.split("; ").collect();
    if labels.len() > 1 {
        return PstResolution::Ambiguous {
            mapped: Some(normalized.clone()),
            reason: AmbiguityReason::MultipleLabels,
        };
    }

    let label = labels[0];
    if label.eq_ignore_ascii_case(&vocab.generic_shoulder) {
        return refine_shoulder(normalizer, evidence);
    }
    if vocab.is_muscle_group(label) {
        PstResolution::Resolved(label.to_string())
    } else {
        PstResolution::Ambiguous {
            mapped: Some(label.to_string()),
            reason: AmbiguityReason::UnmappedValue,
        }
    }
}

/// Refine the generic shoulder label from deltoid tokens. Exactly one
/// distinct deltoid head is required.
pub fn refine_shoulder(normalizer: &Normalizer, evidence: &[String]) -> PstResolution {
    let vocab = normalizer.vocabulary();
    let labels: BTreeSet<&str> = evidence
        .iter()
        .filter_map(|token| vocab.shoulder_label_for(token))
        .collect();

    let mut iter = labels.into_iter();
    match (iter.next(), iter.next()) {
        (Some(label), None) => PstResolution::Resolved(label.to_string()),
        (None, _) => PstResolution::Ambiguous {
            mapped: Some(vocab.generic_shoulder.clone()),
            reason: AmbiguityReason::ShoulderNoDeltoidEvidence,
        },
        (Some(_), Some(_)) => PstResolution::Ambiguous {
            mapped: Some(vocab.generic_shoulder.clone()),
            reason: AmbiguityReason::ShoulderMultipleDeltoids,
        },
    }
}

/// Outcome of resolving an isolated-muscle value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsolatedResolution {
    /// Canonical tokens, first-seen order.
    pub tokens: Vec<String>,
    /// Tokens outside the granular vocabulary.
    pub unmapped: Vec<String>,
    /// Group-level labels that were dropped.
    pub forbidden: Vec<String>,
}

impl IsolatedResolution {
    pub fn is_ambiguous(&self) -> bool {
        !self.unmapped.is_empty()
    }
}

/// Map every token of an isolated-muscle value into the granular vocabulary.
pub fn resolve_isolated(normalizer: &Normalizer, value: &str) -> IsolatedResolution {
    let vocab = normalizer.vocabulary();
    let mut resolution = IsolatedResolution::default();
    let mut mapped = Vec::new();

    for token in split_muscles(value) {
        if vocab.is_forbidden_isolated(&token) {
            resolution.forbidden.push(token);
            continue;
        }
        match vocab.isolated_synonyms.get(&lookup_key(&token)) {
            Some(canonical) if vocab.is_isolated_muscle(canonical) => mapped.push(canonical.clone()),
            _ => resolution.unmapped.push(token),
        }
    }

    resolution.tokens = dedupe_case_insensitive(mapped);
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_resolve_pst_synonyms() {
        let n = Normalizer::default();
        assert_eq!(
            resolve_pst(&n, "quads", &[]),
            PstResolution::Resolved("Quadriceps".into())
        );
        assert_eq!(
            resolve_pst(&n, "rear delts", &[]),
            PstResolution::Resolved("Rear-Shoulder".into())
        );
        assert_eq!(resolve_pst(&n, "n/a", &[]), PstResolution::Absent);
    }

    #[test]
    fn test_resolve_pst_unmapped_and_multiple() {
        let n = Normalizer::default();
        assert_eq!(
            resolve_pst(&n, "brachialis", &[]),
            PstResolution::Ambiguous {
                mapped: Some("Brachialis".into()),
                reason: AmbiguityReason::UnmappedValue
            }
        );
        assert!(matches!(
            resolve_pst(&n, "Chest, Triceps", &[]),
            PstResolution::Ambiguous {
                reason: AmbiguityReason::MultipleLabels,
                ..
            }
        ));
    }

    #[test]
    fn test_shoulder_refinement_each_head() {
        let n = Normalizer::default();
        for (token, label) in [
            ("anterior-deltoid", "Front-Shoulder"),
            ("lateral-deltoid", "Middle-Shoulder"),
            ("posterior-deltoid", "Rear-Shoulder"),
        ] {
            assert_eq!(
                resolve_pst(&n, "Shoulders", &evidence(&[token, "upper-traps"])),
                PstResolution::Resolved(label.into())
            );
        }
    }

    #[test]
    fn test_shoulder_without_evidence_is_ambiguous() {
        let n = Normalizer::default();
        assert!(matches!(
            resolve_pst(&n, "delts", &evidence(&["upper-traps"])),
            PstResolution::Ambiguous {
                reason: AmbiguityReason::ShoulderNoDeltoidEvidence,
                ..
            }
        ));
        assert!(matches!(
            resolve_pst(
                &n,
                "Shoulders",
                &evidence(&["anterior-deltoid", "lateral-deltoid"])
            ),
            PstResolution::Ambiguous {
                reason: AmbiguityReason::ShoulderMultipleDeltoids,
                ..
            }
        ));
    }

    #[test]
    fn test_resolve_isolated() {
        let n = Normalizer::default();
        let res = resolve_isolated(&n, "front delts, chest; upper-pectoralis, mystery muscle");
        assert_eq!(res.tokens, vec!["anterior-deltoid", "upper-pectoralis"]);
        assert_eq!(res.forbidden, vec!["chest"]);
        assert_eq!(res.unmapped, vec!["mystery muscle"]);
        assert!(res.is_ambiguous());
    }

    #[test]
    fn test_resolve_isolated_clean_value() {
        let n = Normalizer::default();
        let res = resolve_isolated(&n, "lateral-deltoid, Lateral-Deltoid, side delts");
        assert_eq!(res.tokens, vec!["lateral-deltoid"]);
        assert!(!res.is_ambiguous());
    }
}
