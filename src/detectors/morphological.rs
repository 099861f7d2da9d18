//! Morphological anomaly detection.
//!
//! Flags tokens that contain a visually confusable glyph and either are
//! unknown to the tokenizer or have a suspicious known-word shape, then
//! tries substituting each confusable glyph with its alternates and keeps
//! the best candidate that re-tokenizes as a single valid content word.

use std::sync::Arc;

use log::trace;

use super::{has_confusable_char, tokens_with_offsets, visually_similar, Detector};
use crate::{
    suggestion::{Stage, Suggestion},
    tokenizer::{PartOfSpeech, Token, Tokenizer},
};

/// Suffixes of academic terms; a known word ending in one of these is still
/// worth double-checking, since OCR noise inside compounds often leaves a
/// different real word behind.
const SUSPICIOUS_SUFFIXES: &[char] = &['学', '論', '則', '済', '義'];

/// Tokens longer than this are skipped; substitution search over long
/// compounds produces garbage candidates.
const MAX_TOKEN_CHARS: usize = 8;

/// Detector for tokens the morphological analyzer cannot account for.
pub struct MorphologicalDetector {
    tokenizer: Arc<dyn Tokenizer>,
    min_confidence: f32,
}

impl MorphologicalDetector {
    /// Create a detector sharing the pipeline's tokenizer.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, min_confidence: f32) -> MorphologicalDetector {
        MorphologicalDetector {
            tokenizer,
            min_confidence,
        }
    }

    fn is_flagged(token: &Token) -> bool {
        if !has_confusable_char(&token.surface) {
            return false;
        }
        if token.reading.is_none() {
            return true;
        }
        token
            .surface
            .chars()
            .last()
            .map(|c| SUSPICIOUS_SUFFIXES.contains(&c))
            .unwrap_or(false)
    }

    /// Candidate surfaces formed by replacing one confusable glyph with one
    /// of its alternates.
    fn candidates(surface: &str) -> Vec<String> {
        let chars: Vec<char> = surface.chars().collect();
        let mut out = Vec::new();
        for (i, &c) in chars.iter().enumerate() {
            for &alt in visually_similar(c) {
                let mut candidate = chars.clone();
                candidate[i] = alt;
                out.push(candidate.into_iter().collect());
            }
        }
        out
    }

    fn pos_bonus(pos: PartOfSpeech) -> f32 {
        match pos {
            PartOfSpeech::Noun => 0.3,
            PartOfSpeech::Verb => 0.25,
            PartOfSpeech::Adjective => 0.2,
            _ => 0.1,
        }
    }

    /// Score one candidate: validity 0.4, part-of-speech class 0.1–0.3,
    /// known-reading bonus 0.2, weak neighbor-context bonus 0.1.
    fn score_candidate(
        &self,
        candidate: &str,
        prev: Option<&Token>,
        next: Option<&Token>,
    ) -> Option<f32> {
        let tokens = self.tokenizer.tokenize(candidate);
        if tokens.len() != 1 {
            return None;
        }
        let token = &tokens[0];
        if !token.is_valid_content_word() {
            return None;
        }
        let mut score = 0.4 + Self::pos_bonus(token.pos);
        if token.reading.is_some() {
            score += 0.2;
        }
        let neighbor_particle = |t: Option<&Token>| {
            t.map(|t| t.pos == PartOfSpeech::Particle).unwrap_or(false)
        };
        if neighbor_particle(prev) || neighbor_particle(next) {
            score += 0.1;
        }
        Some(score.min(1.0))
    }
}

impl Detector for MorphologicalDetector {
    fn stage(&self) -> Stage {
        Stage::Morphological
    }

    fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    fn detect(&self, text: &str) -> Vec<Suggestion> {
        let pairs = tokens_with_offsets(&self.tokenizer, text);
        let mut suggestions = Vec::new();
        for (i, (offset, token)) in pairs.iter().enumerate() {
            if token.surface.chars().count() > MAX_TOKEN_CHARS || !Self::is_flagged(token) {
                continue;
            }
            let prev = i.checked_sub(1).map(|j| &pairs[j].1);
            let next = pairs.get(i + 1).map(|p| &p.1);

            let mut best: Option<(String, f32)> = None;
            for candidate in Self::candidates(&token.surface) {
                if candidate == token.surface {
                    continue;
                }
                if let Some(score) = self.score_candidate(&candidate, prev, next) {
                    trace!(
                        "morphological candidate {:?} -> {:?}: {:.2}",
                        token.surface,
                        candidate,
                        score
                    );
                    if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                        best = Some((candidate, score));
                    }
                }
            }

            if let Some((candidate, score)) = best {
                if score > 0.6 {
                    suggestions.push(Suggestion::replacement(
                        Stage::Morphological,
                        *offset,
                        &token.surface,
                        candidate,
                        score,
                        "unknown token resolved by confusable-glyph substitution",
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

    fn detector() -> MorphologicalDetector {
        MorphologicalDetector::new(Arc::new(LexiconTokenizer::new()), 0.6)
    }

    #[test]
    fn resolves_unknown_token_with_confusable_glyph() {
        let d = detector();
        let suggestions = d.detect("講要の法則");
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].original, "講要");
        assert_eq!(suggestions[0].corrected, "需要");
        assert!(suggestions[0].confidence > 0.6);

        let fixed = d.apply("講要の法則", &suggestions, d.min_confidence());
        assert_eq!(fixed, "需要の法則");
    }

    #[test]
    fn clean_text_produces_nothing() {
        let d = detector();
        assert!(d.detect("需要の法則は重要です。").is_empty());
    }

    #[test]
    fn unknown_token_without_confusables_is_left_alone() {
        let d = detector();
        // 薔薇 is unknown to the lexicon but contains no confusable glyph.
        assert!(d.detect("薔薇の花").is_empty());
    }

    #[test]
    fn invalid_candidates_are_rejected() {
        let d = detector();
        // 万有引刀 contains 刀 (confusable with 力) but the corrected form is
        // already handled by the pattern stage; here the reverse direction
        // must not produce a nonsense "correction" of valid text.
        let suggestions = d.detect("丈有引刀");
        assert!(suggestions.iter().all(|s| s.confidence <= 1.0));
    }
}
