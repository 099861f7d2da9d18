//! The statistical detector family.
//!
//! Five detectors share one contract: `detect` proposes [`Suggestion`]s
//! against the text it is given, and `apply` runs the shared ordered-apply
//! pass at the detector's own minimum-confidence gate. Each detector gets
//! the shared [`Tokenizer`] by `Arc` at construction; none of them owns
//! global state.
//!
//! A detector that hits an internal problem (odd token shapes, positions
//! that no longer line up) degrades to "no suggestions" rather than failing
//! the pipeline.

use std::sync::Arc;

use crate::{
    suggestion::{apply_suggestions, Stage, Suggestion},
    tokenizer::{Token, Tokenizer},
};

pub use self::{
    kanji_shape::KanjiShapeDetector, morphological::MorphologicalDetector,
    okurigana::OkuriganaDetector, particle::ParticleMissingDetector,
    sokuon_choon::SokuonChoonDetector,
};

mod kanji_shape;
mod morphological;
mod okurigana;
mod particle;
mod sokuon_choon;

/// The shared detector contract.
pub trait Detector: Send + Sync {
    /// Which pipeline stage this detector implements.
    fn stage(&self) -> Stage;

    /// Propose corrections against `text`. Positions are char offsets into
    /// `text`.
    fn detect(&self, text: &str) -> Vec<Suggestion>;

    /// This detector's default minimum-confidence gate.
    fn min_confidence(&self) -> f32;

    /// Apply `suggestions` to `text` at the given gate, via the shared
    /// offset-tracking pass.
    fn apply(&self, text: &str, suggestions: &[Suggestion], min_confidence: f32) -> String {
        apply_suggestions(text, suggestions, min_confidence)
    }
}

/// Visually similar character alternates, shared by the morphological
/// detector and the OCR-confidence analyzer. Each entry maps a glyph OCR
/// engines emit to the glyphs it plausibly stood for.
static VISUALLY_SIMILAR: &[(char, &[char])] = &[
    ('講', &['需', '構']),
    ('構', &['講', '需']),
    ('洪', &['法', '供']),
    ('烘', &['法']),
    ('雑', &['経', '難']),
    ('稚', &['経', '推']),
    ('斉', &['済', '斎']),
    ('侠', &['供']),
    ('刀', &['力']),
    ('カ', &['力']),
    ('力', &['刀', 'カ']),
    ('ロ', &['口']),
    ('口', &['ロ']),
    ('曰', &['日']),
    ('日', &['曰', '目']),
    ('未', &['末']),
    ('末', &['未']),
    ('士', &['土']),
    ('土', &['士']),
    ('人', &['入', '八']),
    ('入', &['人', '八']),
    ('己', &['巳', '已']),
    ('千', &['干']),
    ('干', &['千']),
    ('夭', &['天']),
    ('天', &['夭']),
    ('ツ', &['シ']),
    ('シ', &['ツ']),
    ('ソ', &['ン']),
    ('ン', &['ソ']),
    ('ク', &['タ', 'ワ']),
];

/// Alternates a glyph may have been misread from, or an empty slice.
pub fn visually_similar(c: char) -> &'static [char] {
    VISUALLY_SIMILAR
        .iter()
        .find(|(orig, _)| *orig == c)
        .map(|(_, alts)| *alts)
        .unwrap_or(&[])
}

/// Does the string contain any glyph with known confusable alternates?
pub fn has_confusable_char(s: &str) -> bool {
    s.chars().any(|c| !visually_similar(c).is_empty())
}

/// Tokenize and pair each token with its starting char offset. Relies on
/// the tokenizer's guarantee that surfaces concatenate back to the input.
pub(crate) fn tokens_with_offsets(
    tokenizer: &Arc<dyn Tokenizer>,
    text: &str,
) -> Vec<(usize, Token)> {
    let mut out = Vec::new();
    let mut offset = 0;
    for token in tokenizer.tokenize(text) {
        let len = token.surface.chars().count();
        out.push((offset, token));
        offset += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::LexiconTokenizer;

    #[test]
    fn confusable_lookup() {
        assert!(visually_similar('講').contains(&'需'));
        assert!(visually_similar('あ').is_empty());
        assert!(has_confusable_char("講要"));
        assert!(!has_confusable_char("これは"));
    }

    #[test]
    fn offsets_are_char_based() {
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(LexiconTokenizer::new());
        let pairs = tokens_with_offsets(&tokenizer, "需要の法則");
        let offsets: Vec<usize> = pairs.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![0, 2, 3]);
    }
}
