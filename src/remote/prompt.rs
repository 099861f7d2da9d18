//! Prompt construction and response extraction for the remote model.

use log::trace;
use serde::Deserialize;

use crate::suggestion::Suggestion;

/// Misrecognition exemplars included in every prompt, so the model knows
/// what kind of damage scanned book text typically carries.
static EXEMPLARS: &[(&str, &str, &str)] = &[
    ("講要", "需要", "kanji shape confusion"),
    ("洪則", "法則", "kanji shape confusion"),
    ("万有引刀", "万有引力", "kanji shape confusion"),
    ("がつこう", "がっこう", "dropped small tsu"),
    ("コ1ヒ|", "コーヒー", "long vowel mark read as digit or bar"),
    ("需要法則", "需要の法則", "dropped particle"),
];

/// One change reported by the model.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmChange {
    /// Original fragment.
    #[serde(default)]
    pub from: String,
    /// Replacement fragment.
    #[serde(default)]
    pub to: String,
    /// The model's stated reason.
    #[serde(default)]
    pub reason: String,
}

/// The JSON object the model is instructed to return.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmCorrection {
    /// The corrected text.
    pub corrected: String,
    /// The model's own confidence, in `[0, 1]`.
    #[serde(default)]
    pub confidence: f32,
    /// Individual changes, for diagnostics.
    #[serde(default)]
    pub changes: Vec<LlmChange>,
}

/// Render one suggestion as a compact hint token.
///
/// Replacements become `A→B`; particle insertions become `A[の]B` with a
/// little context from the surrounding text on each side.
pub fn render_hint(text: &str, suggestion: &Suggestion) -> String {
    if suggestion.is_insertion() {
        let chars: Vec<char> = text.chars().collect();
        let pos = suggestion.position.min(chars.len());
        let before: String = chars[pos.saturating_sub(2)..pos].iter().collect();
        let after: String = chars[pos..(pos + 2).min(chars.len())].iter().collect();
        format!("{}[{}]{}", before, suggestion.corrected, after)
    } else {
        format!("{}→{}", suggestion.original, suggestion.corrected)
    }
}

fn exemplar_table() -> String {
    EXEMPLARS
        .iter()
        .map(|(wrong, right, why)| format!("  {} => {} ({})", wrong, right, why))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the primary correction prompt.
pub fn correction_prompt(text: &str, genre: &str, hints: &[String]) -> String {
    let mut prompt = format!(
        "You are correcting OCR misrecognition errors in Japanese text \
         scanned from a printed book ({genre}). Typical damage includes \
         visually confused kanji, dropped small tsu and long vowel marks, \
         and missing particles. Fix only recognition errors. Do not \
         rephrase, summarize, or modernize the text.\n\n\
         Common misrecognitions in this material:\n{}\n",
        exemplar_table()
    );
    if !hints.is_empty() {
        prompt.push_str("\nLocal analysis suspects these spots:\n");
        for hint in hints {
            prompt.push_str("  ");
            prompt.push_str(hint);
            prompt.push('\n');
        }
    }
    prompt.push_str(&format!(
        "\nReturn only a JSON object of the form \
         {{\"corrected\": string, \"confidence\": number, \
         \"changes\": [{{\"from\", \"to\", \"reason\"}}]}}.\n\n\
         Text:\n{}",
        text
    ));
    prompt
}

/// Build the refinement prompt for a second look at a low-confidence result.
///
/// Unlike the primary pass, the model is shown its own previous output and
/// confidence and asked to fix over- or under-correction.
pub fn refinement_prompt(original: &str, corrected: &str, confidence: f32) -> String {
    format!(
        "You previously corrected OCR errors in a Japanese text, with \
         confidence {confidence:.2}. Review your correction. Restore \
         anything you over-corrected and fix anything you missed. Return \
         only a JSON object {{\"corrected\": string, \"confidence\": \
         number, \"changes\": [{{\"from\", \"to\", \"reason\"}}]}}.\n\n\
         Original OCR text:\n{original}\n\nYour correction:\n{corrected}"
    )
}

/// Extract the first JSON value from a model response, tolerating fenced
/// code blocks and surrounding prose.
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let body = after_fence
            .strip_prefix("json")
            .unwrap_or(after_fence)
            .trim_start();
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }
    let open = trimmed.find(['{', '['])?;
    let close = trimmed.rfind(['}', ']'])?;
    if close > open {
        Some(&trimmed[open..=close])
    } else {
        None
    }
}

/// Parse a single-text correction response. Unparsable responses are `None`
/// and treated as no-op by the caller.
pub fn parse_correction(response: &str) -> Option<LlmCorrection> {
    let json = extract_json(response)?;
    match serde_json::from_str::<LlmCorrection>(json) {
        Ok(correction) if !correction.corrected.trim().is_empty() => Some(correction),
        Ok(_) => None,
        Err(err) => {
            trace!("unparsable correction response: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestion::{Stage, Suggestion};

    #[test]
    fn replacement_hints_use_arrow_form() {
        let s = Suggestion::replacement(Stage::KanjiShape, 0, "講要", "需要", 0.8, "");
        assert_eq!(render_hint("講要の法則", &s), "講要→需要");
    }

    #[test]
    fn insertion_hints_show_bracketed_particle_in_context() {
        let s = Suggestion::insertion(Stage::ParticleMissing, 2, "の", 0.7, "");
        assert_eq!(render_hint("需要法則", &s), "需要[の]法則");
    }

    #[test]
    fn extracts_fenced_json() {
        let response = "Here you go:\n```json\n{\"corrected\": \"需要\"}\n```\nDone.";
        assert_eq!(extract_json(response), Some("{\"corrected\": \"需要\"}"));
    }

    #[test]
    fn extracts_bare_json_from_prose() {
        let response = "The result is {\"corrected\": \"需要\", \"confidence\": 0.9} as requested.";
        let correction = parse_correction(response).unwrap();
        assert_eq!(correction.corrected, "需要");
        assert!((correction.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn garbage_responses_parse_to_none() {
        assert!(parse_correction("sorry, I cannot help with that").is_none());
        assert!(parse_correction("{\"corrected\": \"\"}").is_none());
        assert!(parse_correction("").is_none());
    }

    #[test]
    fn prompt_includes_hints_and_text() {
        let prompt = correction_prompt("講要の洪則", "economics", &["講要→需要".to_owned()]);
        assert!(prompt.contains("講要→需要"));
        assert!(prompt.contains("講要の洪則"));
        assert!(prompt.contains("\"corrected\""));
    }
}
