//! Okurigana restoration for kana-spelled auxiliaries.
//!
//! OCR output (and sloppy source typesetting) often leaves the auxiliary
//! after a conjunctive verb stem in bare hiragana: 読みはじめた for
//! 読み始めた. When a verb in renyōkei is followed immediately by an
//! all-hiragana token matching a known auxiliary pattern, the kanji spelling
//! is proposed.

use std::sync::Arc;

use log::trace;

use super::{tokens_with_offsets, Detector};
use crate::{
    suggestion::{Stage, Suggestion},
    text::is_hiragana,
    tokenizer::{ConjugationForm, PartOfSpeech, Tokenizer},
};

struct AuxiliaryPattern {
    /// The kana surface as OCR produced it.
    kana: &'static str,
    /// The kanji-spelled replacement.
    kanji: &'static str,
    /// Dictionary form, for the compound allowlist.
    base: &'static str,
    /// How common this auxiliary is after a conjunctive stem, in [0, 1].
    frequency: f32,
}

const fn aux(
    kana: &'static str,
    kanji: &'static str,
    base: &'static str,
    frequency: f32,
) -> AuxiliaryPattern {
    AuxiliaryPattern {
        kana,
        kanji,
        base,
        frequency,
    }
}

static AUXILIARIES: &[AuxiliaryPattern] = &[
    aux("はじめる", "始める", "はじめる", 0.9),
    aux("はじめた", "始めた", "はじめる", 0.9),
    aux("はじめました", "始めました", "はじめる", 0.85),
    aux("つづける", "続ける", "つづける", 0.85),
    aux("つづけた", "続けた", "つづける", 0.85),
    aux("おわる", "終わる", "おわる", 0.7),
    aux("おわった", "終わった", "おわる", 0.7),
    aux("だす", "出す", "だす", 0.75),
    aux("だした", "出した", "だす", 0.75),
    aux("いく", "行く", "いく", 0.8),
    aux("くる", "来る", "くる", 0.6),
];

/// Verb-stem + auxiliary pairs common enough to trust strongly.
static COMMON_COMPOUNDS: &[(&str, &str)] = &[
    ("読み", "はじめる"),
    ("読み", "つづける"),
    ("書き", "はじめる"),
    ("書き", "つづける"),
    ("考え", "はじめる"),
    ("歩き", "だす"),
    ("走り", "だす"),
    ("話し", "はじめる"),
    ("食べ", "おわる"),
    ("降り", "だす"),
];

/// Conjunctive stems frequent enough to count as a weak positive signal.
static COMMON_STEMS: &[&str] = &[
    "読み", "書き", "行き", "食べ", "話し", "歩き", "考え", "使い",
];

/// Detector for auxiliaries that lost their kanji spelling.
pub struct OkuriganaDetector {
    tokenizer: Arc<dyn Tokenizer>,
    min_confidence: f32,
}

impl OkuriganaDetector {
    /// Create a detector sharing the pipeline's tokenizer.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, min_confidence: f32) -> OkuriganaDetector {
        OkuriganaDetector {
            tokenizer,
            min_confidence,
        }
    }
}

impl Detector for OkuriganaDetector {
    fn stage(&self) -> Stage {
        Stage::Okurigana
    }

    fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    fn detect(&self, text: &str) -> Vec<Suggestion> {
        let pairs = tokens_with_offsets(&self.tokenizer, text);
        let mut suggestions = Vec::new();

        for window in pairs.windows(2) {
            let (_, verb) = &window[0];
            let (aux_offset, aux_token) = &window[1];

            if verb.pos != PartOfSpeech::Verb
                || verb.conjugation != ConjugationForm::Renyokei
            {
                continue;
            }
            if !aux_token.surface.chars().all(is_hiragana) {
                continue;
            }
            let Some(pattern) = AUXILIARIES
                .iter()
                .find(|p| p.kana == aux_token.surface)
            else {
                continue;
            };

            let reliability = if verb.known { 1.0 } else { 0.6 };
            let in_allowlist = COMMON_COMPOUNDS
                .iter()
                .any(|(v, a)| *v == verb.surface && *a == pattern.base);
            let common_stem = COMMON_STEMS.contains(&verb.surface.as_str());

            let confidence = 0.4 * pattern.frequency
                + 0.3 * reliability
                + 0.2 * if in_allowlist { 1.0 } else { 0.0 }
                + 0.1 * if common_stem { 1.0 } else { 0.0 };
            trace!(
                "okurigana {}{} -> {}{}: {:.2}",
                verb.surface,
                pattern.kana,
                verb.surface,
                pattern.kanji,
                confidence
            );

            suggestions.push(Suggestion::replacement(
                Stage::Okurigana,
                *aux_offset,
                pattern.kana,
                pattern.kanji,
                confidence,
                "kana auxiliary after a conjunctive stem",
            ));
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::LexiconTokenizer;

    fn detector() -> OkuriganaDetector {
        OkuriganaDetector::new(Arc::new(LexiconTokenizer::new()), 0.55)
    }

    #[test]
    fn restores_kanji_auxiliary_after_renyokei() {
        let d = detector();
        let text = "本を読みはじめた";
        let suggestions = d.detect(text);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].original, "はじめた");
        assert_eq!(suggestions[0].corrected, "始めた");
        assert!(suggestions[0].confidence > 0.9);

        assert_eq!(
            d.apply(text, &suggestions, d.min_confidence()),
            "本を読み始めた"
        );
    }

    #[test]
    fn auxiliary_needs_a_conjunctive_verb_before_it() {
        let d = detector();
        // いく after a particle is an ordinary verb, not a dropped auxiliary.
        assert!(d.detect("学校にいく").is_empty());
    }

    #[test]
    fn unlisted_kana_tokens_are_ignored() {
        let d = detector();
        assert!(d.detect("読みたくない").is_empty());
    }

    #[test]
    fn uncommon_pairs_score_lower() {
        let d = detector();
        let common = d.detect("本を読みはじめた");
        let uncommon = d.detect("使いおわる");
        assert_eq!(uncommon.len(), 1);
        assert!(uncommon[0].confidence < common[0].confidence);
    }
}
