//! Missing-particle detection.
//!
//! OCR drops small kana particles between content words surprisingly often.
//! This detector scans adjacent token pairs whose part-of-speech adjacency
//! normally requires an intervening particle and proposes the best-scoring
//! particle as an *insertion* at the boundary.

use std::sync::Arc;

use log::trace;

use super::{tokens_with_offsets, Detector};
use crate::{
    suggestion::{Stage, Suggestion},
    tokenizer::{PartOfSpeech, Token, Tokenizer},
};

/// Common particles, ranked by base frequency.
static PARTICLES: &[(&str, f32)] = &[
    ("の", 0.9),
    ("を", 0.8),
    ("に", 0.7),
    ("が", 0.7),
    ("で", 0.6),
    ("と", 0.5),
    ("は", 0.5),
];

/// POS adjacencies that normally take a particle between them.
static ADJACENCY_PATTERNS: &[(PartOfSpeech, PartOfSpeech)] = &[
    (PartOfSpeech::Noun, PartOfSpeech::Noun),
    (PartOfSpeech::Noun, PartOfSpeech::Verb),
    (PartOfSpeech::Noun, PartOfSpeech::Adjective),
    (PartOfSpeech::Noun, PartOfSpeech::Auxiliary),
];

/// Detector proposing particle insertions at suspicious boundaries.
pub struct ParticleMissingDetector {
    tokenizer: Arc<dyn Tokenizer>,
    min_confidence: f32,
}

impl ParticleMissingDetector {
    /// Create a detector sharing the pipeline's tokenizer.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, min_confidence: f32) -> ParticleMissingDetector {
        ParticleMissingDetector {
            tokenizer,
            min_confidence,
        }
    }

    /// How well a particle fits between this POS pair.
    fn pos_fit(particle: &str, left: PartOfSpeech, right: PartOfSpeech) -> f32 {
        use PartOfSpeech::*;
        match (left, right) {
            (Noun, Noun) => match particle {
                "の" => 1.0,
                "と" => 0.6,
                _ => 0.2,
            },
            (Noun, Verb) => match particle {
                "を" => 1.0,
                "が" => 0.8,
                "に" => 0.7,
                "は" => 0.5,
                _ => 0.2,
            },
            (Noun, Adjective) => match particle {
                "が" => 0.9,
                "は" => 0.8,
                _ => 0.2,
            },
            // Bare noun + copula is usually fine Japanese; keep the pattern
            // but let it fire only with strong semantic support.
            (Noun, Auxiliary) => 0.1,
            _ => 0.0,
        }
    }

    /// Local-context heuristics: avoid stuttering the same particle twice in
    /// a row, and treat a bare noun before an auxiliary as ordinary copula
    /// usage rather than a dropped particle.
    fn context_score(
        particle: &str,
        prev: Option<&Token>,
        next: Option<&Token>,
        right: &Token,
    ) -> f32 {
        if right.pos == PartOfSpeech::Auxiliary {
            return 0.0;
        }
        let repeats = |t: Option<&Token>| t.map(|t| t.surface == particle).unwrap_or(false);
        if repeats(prev) || repeats(next) {
            0.0
        } else {
            0.8
        }
    }

    /// Simple semantic patterns: an academic-field noun joined to 法則 wants
    /// の ("Xの法則").
    fn semantic_score(particle: &str, left: &Token, right: &Token) -> f32 {
        let academic = left
            .surface
            .chars()
            .last()
            .map(|c| matches!(c, '学' | '論' | '力'))
            .unwrap_or(false);
        if particle == "の" && academic && right.surface == "法則" {
            1.0
        } else if particle == "の" && right.surface == "法則" {
            0.8
        } else {
            0.0
        }
    }
}

impl Detector for ParticleMissingDetector {
    fn stage(&self) -> Stage {
        Stage::ParticleMissing
    }

    fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    fn detect(&self, text: &str) -> Vec<Suggestion> {
        let pairs = tokens_with_offsets(&self.tokenizer, text);
        let mut suggestions = Vec::new();

        for i in 0..pairs.len().saturating_sub(1) {
            let (_, left) = &pairs[i];
            let (right_offset, right) = &pairs[i + 1];
            if !ADJACENCY_PATTERNS
                .iter()
                .any(|&(l, r)| l == left.pos && r == right.pos)
            {
                continue;
            }
            let prev = i.checked_sub(1).map(|j| &pairs[j].1);
            let next = pairs.get(i + 2).map(|p| &p.1);

            let mut best: Option<(&str, f32)> = None;
            for &(particle, base) in PARTICLES {
                let score = 0.4 * base
                    + 0.3 * Self::pos_fit(particle, left.pos, right.pos)
                    + 0.2 * Self::context_score(particle, prev, next, right)
                    + 0.1 * Self::semantic_score(particle, left, right);
                trace!(
                    "particle {:?} between {:?} and {:?}: {:.2}",
                    particle,
                    left.surface,
                    right.surface,
                    score
                );
                if best.map(|(_, s)| score > s).unwrap_or(true) {
                    best = Some((particle, score));
                }
            }

            if let Some((particle, score)) = best {
                if score > 0.4 {
                    suggestions.push(Suggestion::insertion(
                        Stage::ParticleMissing,
                        *right_offset,
                        particle,
                        score,
                        "particle missing at a content-word boundary",
                    ));
                }
            }
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::LexiconTokenizer;

    fn detector() -> ParticleMissingDetector {
        ParticleMissingDetector::new(Arc::new(LexiconTokenizer::new()), 0.4)
    }

    #[test]
    fn inserts_no_between_nouns() {
        let d = detector();
        let suggestions = d.detect("需要法則");
        assert_eq!(suggestions.len(), 1);
        assert!(suggestions[0].is_insertion());
        assert_eq!(suggestions[0].corrected, "の");
        assert_eq!(suggestions[0].position, 2);
        assert_eq!(
            d.apply("需要法則", &suggestions, d.min_confidence()),
            "需要の法則"
        );
    }

    #[test]
    fn academic_noun_before_housoku_scores_high() {
        let d = detector();
        let with_law = d.detect("経済学法則");
        let plain = d.detect("学校先生");
        assert!(!with_law.is_empty());
        assert!(!plain.is_empty());
        assert!(with_law[0].confidence > plain[0].confidence);
    }

    #[test]
    fn inserts_case_particle_before_verb() {
        let d = detector();
        let suggestions = d.detect("本読む");
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].corrected, "を");
        assert_eq!(
            d.apply("本読む", &suggestions, d.min_confidence()),
            "本を読む"
        );
    }

    #[test]
    fn existing_particles_are_respected() {
        let d = detector();
        assert!(d.detect("需要の法則").is_empty());
        assert!(d.detect("本を読む").is_empty());
    }

    #[test]
    fn bare_copula_is_left_alone() {
        let d = detector();
        assert!(d.detect("需要です").is_empty());
    }
}
