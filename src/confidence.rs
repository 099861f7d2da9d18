//! OCR-confidence-driven correction.
//!
//! Active only when the OCR collaborator supplies per-element confidence
//! metadata. Elements the engine itself was unsure about, and which contain
//! a visually confusable glyph, get substitution candidates validated
//! through the shared tokenizer.

use std::sync::Arc;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    detectors::{has_confusable_char, visually_similar},
    suggestion::{Stage, Suggestion},
    tokenizer::Tokenizer,
};

/// Pixel rectangle of a recognized element on the captured page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

/// One recognized element from the OCR engine, with its self-reported
/// confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedElement {
    /// The recognized text.
    pub text: String,
    /// OCR confidence in `[0, 1]`.
    pub confidence: f32,
    /// Where the element sat on the page.
    pub bbox: BoundingBox,
}

/// Elements at or above this OCR confidence are trusted as-is.
const LOW_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Elements longer than this are skipped: their segmentation is too
/// ambiguous for single-glyph substitution to be meaningful.
const MAX_ELEMENT_CHARS: usize = 12;

/// How many candidates to keep per element.
const MAX_CANDIDATES_PER_ELEMENT: usize = 3;

/// Analyzer over per-element OCR confidence metadata.
pub struct ConfidenceAnalyzer {
    tokenizer: Arc<dyn Tokenizer>,
}

impl ConfidenceAnalyzer {
    /// Create an analyzer sharing the pipeline's tokenizer.
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> ConfidenceAnalyzer {
        ConfidenceAnalyzer { tokenizer }
    }

    /// Char offset of `needle` within `haystack`, if present.
    fn char_position(haystack: &str, needle: &str) -> Option<usize> {
        let byte_idx = haystack.find(needle)?;
        Some(haystack[..byte_idx].chars().count())
    }

    /// Substitution candidates for one element surface.
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

    /// Propose corrections for low-confidence elements of `text`.
    ///
    /// Scoring: tokenizer validity 0.6, co-occurrence of the candidate
    /// elsewhere in the surrounding text 0.2, and the complement of the
    /// original OCR confidence 0.2 — the less the OCR engine believed in
    /// the original, the more a valid replacement is worth.
    pub fn analyze(&self, text: &str, elements: &[RecognizedElement]) -> Vec<Suggestion> {
        let mut suggestions = Vec::new();
        for element in elements {
            if element.confidence >= LOW_CONFIDENCE_THRESHOLD {
                continue;
            }
            let surface = element.text.trim();
            if surface.is_empty()
                || surface.chars().count() > MAX_ELEMENT_CHARS
                || !has_confusable_char(surface)
            {
                continue;
            }
            let Some(position) = Self::char_position(text, surface) else {
                continue;
            };

            let mut scored: Vec<(String, f32)> = Vec::new();
            for candidate in Self::candidates(surface) {
                if candidate == surface {
                    continue;
                }
                let tokens = self.tokenizer.tokenize(&candidate);
                if tokens.len() != 1 || !tokens[0].is_valid_content_word() {
                    continue;
                }
                let elsewhere = text.match_indices(candidate.as_str()).count() > 0;
                let score = 0.6
                    + if elsewhere { 0.2 } else { 0.0 }
                    + 0.2 * (1.0 - element.confidence);
                trace!(
                    "low-confidence element {:?} -> {:?}: {:.2}",
                    surface,
                    candidate,
                    score
                );
                if score > 0.5 {
                    scored.push((candidate, score));
                }
            }

            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(MAX_CANDIDATES_PER_ELEMENT);
            for (candidate, score) in scored {
                suggestions.push(Suggestion::replacement(
                    Stage::Morphological,
                    position,
                    surface,
                    candidate,
                    score,
                    "low OCR confidence with a confusable glyph",
                ));
            }
        }
        suggestions
    }
}
