//! Batch sizing and response parsing for multi-text correction calls.
//!
//! Several short texts share one HTTP call. Batch size starts from an
//! average-length heuristic and is halved until the estimated token count
//! fits the budget, so one oversized batch can never blow the request limit.

use log::trace;
use serde::Deserialize;

use super::prompt;

/// Fixed token cost of the instruction and exemplar table.
const PROMPT_OVERHEAD_TOKENS: usize = 400;

/// Token cost of the index wrapper around each batched item.
const PER_ITEM_OVERHEAD_TOKENS: usize = 12;

/// Japanese text runs roughly one and a half tokens per character.
const TOKENS_PER_CHAR: f32 = 1.5;

/// Hard budget for one batched request.
const TOKEN_BUDGET: usize = 4_000;

/// Each halving step when a batch does not fit.
const SHRINK_FACTOR: usize = 2;

/// One corrected item in a batch response.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchItem {
    /// Position of the item in the submitted batch.
    pub index: usize,
    /// The corrected text.
    #[serde(default)]
    pub corrected: String,
}

/// Estimated token count for a batch of texts.
fn estimate_tokens(texts: &[&str]) -> usize {
    let content: usize = texts
        .iter()
        .map(|t| (t.chars().count() as f32 * TOKENS_PER_CHAR).ceil() as usize)
        .sum();
    PROMPT_OVERHEAD_TOKENS + texts.len() * PER_ITEM_OVERHEAD_TOKENS + content
}

/// Initial batch size from the average text length. Short texts pack
/// densely; long texts go one or two at a time.
fn initial_batch_size(texts: &[&str]) -> usize {
    if texts.is_empty() {
        return 1;
    }
    let total: usize = texts.iter().map(|t| t.chars().count()).sum();
    let avg = total / texts.len();
    match avg {
        0..=20 => 10,
        21..=50 => 6,
        51..=100 => 4,
        _ => 2,
    }
}

/// Split `texts` into batches that each fit the token budget.
pub fn plan_batches<'a>(texts: &[&'a str]) -> Vec<Vec<&'a str>> {
    let mut batches = Vec::new();
    let mut remaining = texts;
    while !remaining.is_empty() {
        let mut size = initial_batch_size(remaining).min(remaining.len());
        while size > 1 && estimate_tokens(&remaining[..size]) > TOKEN_BUDGET {
            size = (size / SHRINK_FACTOR).max(1);
        }
        trace!(
            "batch of {} texts, ~{} tokens",
            size,
            estimate_tokens(&remaining[..size])
        );
        batches.push(remaining[..size].to_vec());
        remaining = &remaining[size..];
    }
    batches
}

/// Build the prompt for one batch. The model is asked for a JSON array of
/// `{index, corrected}` objects.
pub fn batch_prompt(texts: &[&str], genre: &str) -> String {
    let mut prompt = format!(
        "You are correcting OCR misrecognition errors in several Japanese \
         text fragments scanned from a printed book ({genre}). Fix only \
         recognition errors; do not rephrase. Return only a JSON array of \
         {{\"index\": number, \"corrected\": string}} objects, one per \
         fragment, keeping each index.\n\nFragments:\n"
    );
    for (i, text) in texts.iter().enumerate() {
        prompt.push_str(&format!("{}: {}\n", i, text));
    }
    prompt
}

/// Parse a batch response into corrected texts, falling back to the original
/// for any index the model skipped or mangled.
pub fn parse_batch_response(response: &str, originals: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = originals.iter().map(|t| (*t).to_owned()).collect();
    let Some(json) = prompt::extract_json(response) else {
        return out;
    };
    let items: Vec<BatchItem> = match serde_json::from_str(json) {
        Ok(items) => items,
        Err(err) => {
            trace!("unparsable batch response: {}", err);
            return out;
        }
    };
    for item in items {
        if item.index < out.len() && !item.corrected.trim().is_empty() {
            out[item.index] = item.corrected;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_texts_pack_into_large_batches() {
        let texts: Vec<&str> = vec!["がっこう"; 25];
        let batches = plan_batches(&texts);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 25);
    }

    #[test]
    fn long_texts_get_small_batches() {
        let long = "需要の法則は経済学における基本的な考え方のひとつである".repeat(8);
        let texts: Vec<&str> = vec![long.as_str(); 6];
        let batches = plan_batches(&texts);
        assert!(batches[0].len() <= 2);
    }

    #[test]
    fn batches_shrink_to_fit_the_token_budget() {
        let big = "あ".repeat(1_500);
        let texts: Vec<&str> = vec![big.as_str(); 4];
        for batch in plan_batches(&texts) {
            assert!(estimate_tokens(&batch) <= TOKEN_BUDGET || batch.len() == 1);
        }
    }

    #[test]
    fn response_indices_map_back_to_items() {
        let originals = ["講要", "洪則", "がつこう"];
        let response = "```json\n[\
            {\"index\": 0, \"corrected\": \"需要\"},\
            {\"index\": 2, \"corrected\": \"がっこう\"}\
        ]\n```";
        let corrected = parse_batch_response(response, &originals);
        assert_eq!(corrected, vec!["需要", "洪則", "がっこう"]);
    }

    #[test]
    fn unparsable_batch_response_keeps_originals() {
        let originals = ["講要", "洪則"];
        let corrected = parse_batch_response("no json here", &originals);
        assert_eq!(corrected, vec!["講要", "洪則"]);
    }

    #[test]
    fn out_of_range_indices_are_ignored() {
        let originals = ["講要"];
        let response = "[{\"index\": 5, \"corrected\": \"なにか\"}]";
        let corrected = parse_batch_response(response, &originals);
        assert_eq!(corrected, vec!["講要"]);
    }
}
