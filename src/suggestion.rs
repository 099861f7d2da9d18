//! Correction suggestions and the ordered apply pass.
//!
//! Every stage proposes immutable [`Suggestion`] records positioned by char
//! offset into the text it inspected. [`apply_suggestions`] performs one
//! left-to-right pass over the sorted records, maintaining a running length
//! offset so later positions stay valid after earlier substitutions change
//! the text's length. All detectors share this pass; none of them splice
//! text on their own.

use std::fmt;

use log::{trace, warn};
use serde::{Deserialize, Serialize};

/// Which stage of the pipeline produced a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Deterministic pattern rules.
    Pattern,
    /// Morphological anomaly detection.
    Morphological,
    /// Confusable kanji shapes.
    KanjiShape,
    /// Kana auxiliaries that lost their kanji stem.
    Okurigana,
    /// Dropped sokuon or long-vowel marks.
    SokuonChoon,
    /// Missing particles between tokens.
    ParticleMissing,
    /// The remote language model.
    Llm,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pattern => "pattern",
            Stage::Morphological => "morphological",
            Stage::KanjiShape => "kanji-shape",
            Stage::Okurigana => "okurigana",
            Stage::SokuonChoon => "sokuon-choon",
            Stage::ParticleMissing => "particle-missing",
            Stage::Llm => "llm",
        };
        f.write_str(name)
    }
}

/// One proposed edit: replace `original` at char offset `position` with
/// `corrected`. An insertion has an empty `original`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// The stage that proposed this edit.
    pub stage: Stage,
    /// Char offset into the text the stage inspected.
    pub position: usize,
    /// The span being replaced; empty for insertions.
    pub original: String,
    /// The replacement text.
    pub corrected: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Human-readable reason, used in logs and remote-prompt hints.
    pub rationale: String,
}

impl Suggestion {
    /// A replacement edit.
    pub fn replacement(
        stage: Stage,
        position: usize,
        original: impl Into<String>,
        corrected: impl Into<String>,
        confidence: f32,
        rationale: impl Into<String>,
    ) -> Suggestion {
        Suggestion {
            stage,
            position,
            original: original.into(),
            corrected: corrected.into(),
            confidence,
            rationale: rationale.into(),
        }
    }

    /// An insertion at a token boundary.
    pub fn insertion(
        stage: Stage,
        position: usize,
        inserted: impl Into<String>,
        confidence: f32,
        rationale: impl Into<String>,
    ) -> Suggestion {
        Suggestion {
            stage,
            position,
            original: String::new(),
            corrected: inserted.into(),
            confidence,
            rationale: rationale.into(),
        }
    }

    /// Does this suggestion insert rather than replace?
    pub fn is_insertion(&self) -> bool {
        self.original.is_empty()
    }
}

/// Apply `suggestions` to `text`, keeping only those at or above
/// `min_confidence`.
///
/// Suggestions are sorted ascending by position and applied left to right
/// with a running offset. A suggestion whose `original` no longer matches
/// the text at its (adjusted) position — because an earlier edit overlapped
/// it — is skipped with a warning rather than applied blindly.
pub fn apply_suggestions(
    text: &str,
    suggestions: &[Suggestion],
    min_confidence: f32,
) -> String {
    apply_suggestions_with_report(text, suggestions, min_confidence).0
}

/// Like [`apply_suggestions`], but also returns the suggestions that were
/// actually spliced in, for diagnostics and confidence aggregation.
pub fn apply_suggestions_with_report(
    text: &str,
    suggestions: &[Suggestion],
    min_confidence: f32,
) -> (String, Vec<Suggestion>) {
    let mut accepted: Vec<&Suggestion> = suggestions
        .iter()
        .filter(|s| s.confidence >= min_confidence)
        .collect();
    accepted.sort_by_key(|s| s.position);

    let mut chars: Vec<char> = text.chars().collect();
    // Running difference between current and original char positions.
    let mut offset: isize = 0;
    // End (in adjusted coordinates) of the last applied edit, to reject
    // overlapping suggestions.
    let mut last_end: usize = 0;
    let mut applied = Vec::new();

    for s in accepted {
        let adjusted = s.position as isize + offset;
        if adjusted < 0 {
            warn!("suggestion before start of text, skipping: {:?}", s);
            continue;
        }
        let adjusted = adjusted as usize;
        let original: Vec<char> = s.original.chars().collect();
        if adjusted < last_end {
            trace!("suggestion overlaps an earlier edit, skipping: {:?}", s);
            continue;
        }
        if adjusted + original.len() > chars.len() {
            warn!("suggestion runs past end of text, skipping: {:?}", s);
            continue;
        }
        if chars[adjusted..adjusted + original.len()] != original[..] {
            warn!(
                "text at position {} no longer matches {:?}, skipping",
                s.position, s.original
            );
            continue;
        }

        let corrected: Vec<char> = s.corrected.chars().collect();
        trace!(
            "applying {} edit at {}: {:?} -> {:?} ({:.2})",
            s.stage,
            s.position,
            s.original,
            s.corrected,
            s.confidence
        );
        chars.splice(adjusted..adjusted + original.len(), corrected.iter().cloned());
        offset += corrected.len() as isize - original.len() as isize;
        last_end = adjusted + corrected.len();
        applied.push(s.clone());
    }

    (chars.into_iter().collect(), applied)
}
