//! Confusable kanji shape correction.
//!
//! A static table of confusable pairs, each with a base frequency (how often
//! OCR actually makes that confusion, 1–10) and a shape-similarity reason.
//! Candidates are whole-token rewrites scored on part-of-speech agreement,
//! dictionary validity, neighbor compatibility, and the pair frequency.

use std::sync::Arc;

use log::trace;

use super::{tokens_with_offsets, Detector};
use crate::{
    suggestion::{Stage, Suggestion},
    text::is_kanji,
    tokenizer::{PartOfSpeech, Token, Tokenizer},
};

struct ConfusablePair {
    wrong: char,
    right: char,
    /// 1–10: how often this confusion shows up in scanned book text.
    frequency: u8,
    reason: &'static str,
}

const fn pair(wrong: char, right: char, frequency: u8, reason: &'static str) -> ConfusablePair {
    ConfusablePair {
        wrong,
        right,
        frequency,
        reason,
    }
}

static CONFUSABLE_PAIRS: &[ConfusablePair] = &[
    pair('講', '需', 8, "言 radical smears into the 雨 crown"),
    pair('構', '需', 5, "木 radical smears into the 雨 crown"),
    pair('洪', '法', 8, "same water radical, similar right side"),
    pair('烘', '法', 4, "fire and water radicals blur at low resolution"),
    pair('雑', '経', 6, "dense left components collapse together"),
    pair('斉', '済', 6, "済 loses its water radical"),
    pair('侠', '供', 5, "identical person radical, similar right side"),
    pair('刀', '力', 7, "one stroke difference"),
    pair('曰', '日', 6, "width ratio is the only distinction"),
    pair('末', '未', 5, "relative stroke length flips"),
    pair('未', '末', 4, "relative stroke length flips"),
    pair('士', '土', 4, "relative stroke length flips"),
    pair('土', '士', 3, "relative stroke length flips"),
    pair('入', '人', 5, "mirror-image strokes"),
    pair('人', '入', 3, "mirror-image strokes"),
    pair('干', '千', 3, "slanted top stroke"),
    pair('夭', '天', 6, "slanted top stroke"),
    pair('巳', '已', 2, "open versus closed upper left"),
];

/// Detector for single-glyph kanji confusions inside tokens.
pub struct KanjiShapeDetector {
    tokenizer: Arc<dyn Tokenizer>,
    min_confidence: f32,
}

impl KanjiShapeDetector {
    /// Create a detector sharing the pipeline's tokenizer.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, min_confidence: f32) -> KanjiShapeDetector {
        KanjiShapeDetector {
            tokenizer,
            min_confidence,
        }
    }

    /// How well a candidate with this part of speech sits between its
    /// neighbors. A cheap stand-in for an n-gram model: particles and
    /// auxiliaries attach well to content words, unknown neighbors are a bad
    /// sign, boundaries are neutral.
    fn ngram_compat(prev: &[&Token], next: &[&Token], cand_pos: PartOfSpeech) -> f32 {
        fn immediate(neighbor: Option<&&Token>, cand_pos: PartOfSpeech) -> f32 {
            match neighbor {
                None => 0.8,
                Some(t) if t.pos == PartOfSpeech::Particle && cand_pos.is_content() => 1.0,
                Some(t) if t.pos == PartOfSpeech::Auxiliary => 0.7,
                Some(t) if t.pos == PartOfSpeech::Symbol => 0.7,
                Some(t) if t.known && t.pos.is_content() => 0.5,
                Some(_) => 0.3,
            }
        }
        fn outer(neighbor: Option<&&Token>) -> f32 {
            match neighbor {
                None => 0.8,
                Some(t) if t.known => 1.0,
                Some(_) => 0.4,
            }
        }
        immediate(prev.last(), cand_pos) * 0.35
            + immediate(next.first(), cand_pos) * 0.35
            + outer(prev.first()) * 0.15
            + outer(next.last()) * 0.15
    }

    fn score(
        &self,
        original: &Token,
        candidate_surface: &str,
        frequency: u8,
        prev: &[&Token],
        next: &[&Token],
    ) -> f32 {
        let candidate_tokens = self.tokenizer.tokenize(candidate_surface);
        let single = candidate_tokens.len() == 1;
        let candidate = candidate_tokens.first();

        let pos_match = match candidate {
            // A known word rewritten into something the dictionary does not
            // recognize is a downgrade, whatever the guessed POS says.
            Some(c) if original.known && !c.known => 0.0,
            Some(c) if single && c.pos == original.pos => 1.0,
            Some(c) if single && c.pos.is_content() && original.pos.is_content() => 0.5,
            _ => 0.0,
        };
        let dict_valid = match candidate {
            Some(c) if single && c.known => 1.0,
            _ => 0.0,
        };
        let cand_pos = candidate.map(|c| c.pos).unwrap_or(PartOfSpeech::Unknown);
        let compat = Self::ngram_compat(prev, next, cand_pos);
        let freq = frequency as f32 / 10.0;

        // Flipping a word the dictionary already knows (入口 to 人口, say)
        // needs far stronger evidence than repairing an unknown one.
        let known_damping = if original.known { 0.6 } else { 1.0 };

        known_damping * (0.30 * pos_match + 0.25 * dict_valid + 0.25 * compat + 0.20 * freq)
    }
}

impl Detector for KanjiShapeDetector {
    fn stage(&self) -> Stage {
        Stage::KanjiShape
    }

    fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    fn detect(&self, text: &str) -> Vec<Suggestion> {
        let pairs = tokens_with_offsets(&self.tokenizer, text);
        let tokens: Vec<&Token> = pairs.iter().map(|(_, t)| t).collect();
        let mut suggestions = Vec::new();

        for (i, (offset, token)) in pairs.iter().enumerate() {
            let chars: Vec<char> = token.surface.chars().collect();
            if !chars.iter().any(|&c| is_kanji(c)) {
                continue;
            }
            let prev = &tokens[i.saturating_sub(2)..i];
            let next = &tokens[(i + 1).min(tokens.len())..(i + 3).min(tokens.len())];

            for (ci, &c) in chars.iter().enumerate() {
                for p in CONFUSABLE_PAIRS.iter().filter(|p| p.wrong == c) {
                    let mut candidate = chars.clone();
                    candidate[ci] = p.right;
                    let candidate: String = candidate.into_iter().collect();
                    let score = self.score(token, &candidate, p.frequency, prev, next);
                    trace!(
                        "kanji-shape {:?} -> {:?} ({}): {:.2}",
                        token.surface,
                        candidate,
                        p.reason,
                        score
                    );
                    if score >= 0.5 {
                        suggestions.push(Suggestion::replacement(
                            Stage::KanjiShape,
                            *offset,
                            &token.surface,
                            candidate,
                            score,
                            p.reason,
                        ));
                    }
                }
            }
        }

        // Highest confidence first; the apply pass re-sorts by position.
        suggestions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::LexiconTokenizer;

    fn detector() -> KanjiShapeDetector {
        KanjiShapeDetector::new(Arc::new(LexiconTokenizer::new()), 0.6)
    }

    #[test]
    fn corrects_confused_glyph_inside_token() {
        let d = detector();
        let suggestions = d.detect("洪則がある");
        let best = suggestions.first().expect("should propose 法則");
        assert_eq!(best.original, "洪則");
        assert_eq!(best.corrected, "法則");
        assert!(best.confidence >= 0.6);

        let fixed = d.apply("洪則がある", &suggestions, d.min_confidence());
        assert_eq!(fixed, "法則がある");
    }

    #[test]
    fn results_are_sorted_by_confidence() {
        let d = detector();
        let suggestions = d.detect("講要と洪則");
        for w in suggestions.windows(2) {
            assert!(w[0].confidence >= w[1].confidence);
        }
    }

    #[test]
    fn valid_words_survive() {
        let d = detector();
        // 未来 and 週末 both contain a flippable glyph; neither flip makes a
        // better word, so nothing above the apply gate comes out.
        let text = "未来と週末";
        let fixed = d.apply(text, &d.detect(text), d.min_confidence());
        assert_eq!(fixed, text);
    }

    #[test]
    fn kana_only_tokens_are_ignored() {
        let d = detector();
        assert!(d.detect("これはどうですか").is_empty());
    }
}
