//! Safety net over merged corrections.
//!
//! Every candidate correction, whether from the local stages or the remote
//! model, runs through this validator before it is considered final. The
//! checks are ordered from absolute (protected vocabulary) to statistical
//! (overall change ratio).

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::text::change_ratio;

/// Domain vocabulary no correction round may remove.
pub static PROTECTED_TERMS: &[&str] = &[
    "需要",
    "供給",
    "法則",
    "経済学",
    "万有引力",
];

/// Known-bad rewrites: if the correct form is present in the original, the
/// forbidden form must never appear in its place.
static FORBIDDEN_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("需要", "雫要"),
    ("需要", "儒要"),
    ("法則", "方則"),
    ("法則", "放則"),
    ("経済学", "経斉学"),
    ("万有引力", "万有引刀"),
];

lazy_static! {
    /// Multi-token idioms that must survive a correction round intact.
    static ref PROTECTED_CONTEXTS: Vec<Regex> = vec![
        Regex::new("需要の法則").unwrap(),
        Regex::new("供給の法則").unwrap(),
        Regex::new("万有引力の法則").unwrap(),
    ];
}

/// Corrections whose change ratio exceeds this are runaway rewrites.
const MAX_CHANGE_RATIO: f32 = 0.5;

/// Outcome of validating one `(original, corrected)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    /// Whether the correction may be kept.
    pub valid: bool,
    /// Confidence in the corrected text, in `[0, 1]`.
    pub confidence: f32,
    /// Human-readable reason, mainly for diagnostics and logs.
    pub reason: String,
}

impl Validation {
    fn reject(reason: impl Into<String>) -> Validation {
        Validation {
            valid: false,
            confidence: 0.0,
            reason: reason.into(),
        }
    }

    fn accept(confidence: f32, reason: impl Into<String>) -> Validation {
        Validation {
            valid: true,
            confidence,
            reason: reason.into(),
        }
    }
}

/// Validator guarding accepted edit sets against known-bad substitutions.
#[derive(Debug, Default)]
pub struct CorrectionValidator;

impl CorrectionValidator {
    /// Create a validator with the built-in protected vocabulary.
    pub fn new() -> CorrectionValidator {
        CorrectionValidator
    }

    fn occurrences(haystack: &str, needle: &str) -> usize {
        haystack.match_indices(needle).count()
    }

    /// Validate a correction round. Never errors: a bad correction is
    /// reported as invalid and the caller reverts to the original text.
    pub fn validate(&self, original: &str, corrected: &str) -> Validation {
        if original == corrected {
            return Validation::accept(1.0, "no change");
        }

        for term in PROTECTED_TERMS {
            if original.contains(term) && !corrected.contains(term) {
                warn!("correction removed protected term {:?}", term);
                return Validation::reject(format!("protected term {} removed", term));
            }
        }

        for pattern in PROTECTED_CONTEXTS.iter() {
            if pattern.is_match(original) && !pattern.is_match(corrected) {
                warn!("correction broke protected context {:?}", pattern.as_str());
                return Validation::reject(format!(
                    "protected context {} broken",
                    pattern.as_str()
                ));
            }
        }

        for (right, wrong) in FORBIDDEN_SUBSTITUTIONS {
            if original.contains(right)
                && !original.contains(wrong)
                && corrected.contains(wrong)
            {
                warn!("correction introduced forbidden form {:?}", wrong);
                return Validation::reject(format!(
                    "forbidden substitution {} introduced",
                    wrong
                ));
            }
        }

        let ratio = change_ratio(original, corrected);
        if ratio > MAX_CHANGE_RATIO {
            debug!("change ratio {:.2} exceeds limit", ratio);
            return Validation::reject(format!("change ratio {:.2} too high", ratio));
        }

        let mut confidence = 1.0 - ratio;
        for term in PROTECTED_TERMS {
            let before = Self::occurrences(original, term);
            let after = Self::occurrences(corrected, term);
            if after > before {
                confidence += 0.2 * (after - before) as f32;
            }
        }
        Validation::accept(confidence.clamp(0.0, 1.0), "accepted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_text_is_fully_trusted() {
        let v = CorrectionValidator::new();
        let result = v.validate("需要の法則", "需要の法則");
        assert!(result.valid);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn removing_a_protected_term_is_rejected() {
        let v = CorrectionValidator::new();
        let result = v.validate("需要の法則", "雫要の法則");
        assert!(!result.valid);
        assert_eq!(result.confidence, 0.0);
        assert!(result.reason.contains("需要"));
    }

    #[test]
    fn breaking_a_protected_context_is_rejected() {
        let v = CorrectionValidator::new();
        let result = v.validate("万有引力の法則です", "万有引力と法則です");
        assert!(!result.valid);
    }

    #[test]
    fn introducing_a_forbidden_form_is_rejected() {
        let v = CorrectionValidator::new();
        // 経済学 was correct already; rewriting it to the known-bad form
        // must fail even though the protected term check alone catches most
        // of these.
        let result = v.validate("経済学の本", "経斉学の本");
        assert!(!result.valid);
    }

    #[test]
    fn runaway_rewrites_are_rejected() {
        let v = CorrectionValidator::new();
        let result = v.validate("これはただの文です", "まったく別のなにか全部");
        assert!(!result.valid);
        assert!(result.reason.contains("ratio"));
    }

    #[test]
    fn small_fixes_score_by_change_ratio() {
        let v = CorrectionValidator::new();
        let result = v.validate("がつこうへ行く", "がっこうへ行く");
        assert!(result.valid);
        // One substituted char over seven.
        assert!((result.confidence - (1.0 - 1.0 / 7.0)).abs() < 1e-5);
    }

    #[test]
    fn restoring_a_protected_term_earns_a_boost() {
        let v = CorrectionValidator::new();
        let plain = v.validate("がつこう", "がっこう");
        let restoring = v.validate("講要の増加", "需要の増加");
        assert!(restoring.valid);
        assert!(restoring.confidence > plain.confidence);
    }
}
