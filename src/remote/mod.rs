//! Remote correction fallback.
//!
//! When the local stages cannot reach a confident result, the text goes to
//! a cloud language model, behind a persistent cache and a daily quota.
//! Every failure mode degrades to "return the input unchanged": the caller
//! never sees an error from this module, only a possibly-uncorrected text.

pub mod batch;
pub mod client;
pub mod prompt;

use std::sync::Arc;

use log::{debug, info, warn};

use crate::{
    cache::CorrectionCache,
    config::{RemoteConfig, Tunables},
    quota::QuotaManager,
    text::change_ratio,
};

pub use client::{RemoteClient, RemoteError, RetryPolicy};
pub use prompt::{render_hint, LlmCorrection};

/// What the remote stage produced for one text.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOutcome {
    /// The corrected (or unchanged) text.
    pub text: String,
    /// Confidence in that text.
    pub confidence: f32,
    /// Whether the text came from the cache rather than a live call.
    pub from_cache: bool,
}

impl RemoteOutcome {
    fn unchanged(text: &str, confidence: f32) -> RemoteOutcome {
        RemoteOutcome {
            text: text.to_owned(),
            confidence,
            from_cache: false,
        }
    }
}

/// Cloud-model fallback with caching, quota control, and refinement.
pub struct RemoteCorrector {
    client: RemoteClient,
    cache: Arc<CorrectionCache>,
    quota: Arc<QuotaManager>,
    tunables: Tunables,
    genre: String,
}

impl RemoteCorrector {
    /// Build a corrector around shared cache and quota state.
    pub fn new(
        config: RemoteConfig,
        cache: Arc<CorrectionCache>,
        quota: Arc<QuotaManager>,
        tunables: Tunables,
        genre: &str,
    ) -> crate::Result<RemoteCorrector> {
        let retry = RetryPolicy {
            max_attempts: tunables.max_retry_attempts,
            initial_delay: tunables.initial_retry_delay,
            max_delay: tunables.max_retry_delay,
        };
        Ok(RemoteCorrector {
            client: RemoteClient::new(config, retry)?,
            cache,
            quota,
            tunables,
            genre: genre.to_owned(),
        })
    }

    fn eligible(&self, text: &str, prior_confidence: f32) -> bool {
        if prior_confidence >= self.tunables.low_confidence_threshold {
            debug!(
                "confidence {:.2} already at threshold, skipping remote",
                prior_confidence
            );
            return false;
        }
        let chars = text.chars().count();
        if chars >= self.tunables.max_remote_text_chars {
            debug!("text of {} chars too long for remote correction", chars);
            return false;
        }
        true
    }

    /// Take quota for one network call. Returns false, with the reset time
    /// logged, when the window is spent.
    fn take_quota(&self) -> bool {
        if !self.quota.can_proceed() {
            let status = self.quota.status();
            info!(
                "remote quota exhausted ({}/{}), resets at {}",
                status.count, status.limit, status.reset_at
            );
            return false;
        }
        if let Err(err) = self.quota.record_call() {
            warn!("could not persist quota state: {}", err);
        }
        true
    }

    /// Correct one text, degrading to the input on any failure.
    pub async fn correct(
        &self,
        text: &str,
        prior_confidence: f32,
        hints: &[String],
    ) -> RemoteOutcome {
        if !self.eligible(text, prior_confidence) {
            return RemoteOutcome::unchanged(text, prior_confidence);
        }

        if let Some(entry) = self.cache.get(text) {
            debug!("remote correction served from cache");
            return RemoteOutcome {
                text: entry.corrected_text,
                confidence: entry.confidence,
                from_cache: true,
            };
        }

        if !self.take_quota() {
            return RemoteOutcome::unchanged(text, prior_confidence);
        }

        let request = prompt::correction_prompt(text, &self.genre, hints);
        let response = match self.client.invoke_with_retry(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!("remote correction failed, keeping local text: {}", err);
                return RemoteOutcome::unchanged(text, prior_confidence);
            }
        };
        let Some(correction) = prompt::parse_correction(&response) else {
            warn!("remote correction response was unusable, keeping local text");
            return RemoteOutcome::unchanged(text, prior_confidence);
        };

        // The model's own confidence is ignored for the primary pass; edit
        // distance against the input is the only measure we trust here.
        let mut corrected = correction.corrected;
        let mut confidence = 1.0 - change_ratio(text, &corrected);
        for change in &correction.changes {
            debug!(
                "remote change {:?} -> {:?} ({})",
                change.from, change.to, change.reason
            );
        }

        if confidence < self.tunables.refinement_threshold {
            if let Some((refined, refined_confidence)) =
                self.refine(text, &corrected, confidence).await
            {
                corrected = refined;
                confidence = refined_confidence;
            }
        }

        if let Err(err) = self.cache.put(text, &corrected, confidence) {
            warn!("could not persist correction cache: {}", err);
        }
        RemoteOutcome {
            text: corrected,
            confidence,
            from_cache: false,
        }
    }

    /// One refinement round. When it parses, it supersedes the primary
    /// result and its reported confidence is trusted directly.
    async fn refine(
        &self,
        original: &str,
        corrected: &str,
        confidence: f32,
    ) -> Option<(String, f32)> {
        if !self.take_quota() {
            return None;
        }
        let request = prompt::refinement_prompt(original, corrected, confidence);
        let response = match self.client.invoke_with_retry(&request).await {
            Ok(response) => response,
            Err(err) => {
                debug!("refinement failed, keeping primary result: {}", err);
                return None;
            }
        };
        let refined = prompt::parse_correction(&response)?;
        debug!(
            "refinement superseded primary result at confidence {:.2}",
            refined.confidence
        );
        Some((refined.corrected, refined.confidence.clamp(0.0, 1.0)))
    }

    /// Correct several texts, sharing network calls between them.
    ///
    /// Cached and already-confident texts never reach the network. The rest
    /// are grouped by [`batch::plan_batches`] and sent one batch per call.
    pub async fn correct_batch(
        &self,
        texts: &[String],
        prior_confidences: &[f32],
    ) -> Vec<RemoteOutcome> {
        let mut outcomes: Vec<Option<RemoteOutcome>> = Vec::with_capacity(texts.len());
        let mut pending: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let prior = prior_confidences.get(i).copied().unwrap_or(0.0);
            if !self.eligible(text, prior) {
                outcomes.push(Some(RemoteOutcome::unchanged(text, prior)));
            } else if let Some(entry) = self.cache.get(text) {
                outcomes.push(Some(RemoteOutcome {
                    text: entry.corrected_text,
                    confidence: entry.confidence,
                    from_cache: true,
                }));
            } else {
                outcomes.push(None);
                pending.push(i);
            }
        }

        let pending_texts: Vec<&str> = pending.iter().map(|&i| texts[i].as_str()).collect();
        let mut cursor = 0;
        for batch in batch::plan_batches(&pending_texts) {
            let indices = &pending[cursor..cursor + batch.len()];
            cursor += batch.len();

            if !self.take_quota() {
                for &i in indices {
                    let prior = prior_confidences.get(i).copied().unwrap_or(0.0);
                    outcomes[i] = Some(RemoteOutcome::unchanged(&texts[i], prior));
                }
                continue;
            }

            let request = batch::batch_prompt(&batch, &self.genre);
            let corrected = match self.client.invoke_with_retry(&request).await {
                Ok(response) => batch::parse_batch_response(&response, &batch),
                Err(err) => {
                    warn!("batched remote correction failed: {}", err);
                    batch.iter().map(|t| (*t).to_owned()).collect()
                }
            };

            for (&i, fixed) in indices.iter().zip(corrected) {
                if fixed == texts[i] {
                    // An unchanged item proves nothing; keep its prior
                    // confidence rather than claiming certainty.
                    let prior = prior_confidences.get(i).copied().unwrap_or(0.0);
                    outcomes[i] = Some(RemoteOutcome::unchanged(&texts[i], prior));
                    continue;
                }
                let confidence = 1.0 - change_ratio(&texts[i], &fixed);
                if let Err(err) = self.cache.put(&texts[i], &fixed, confidence) {
                    warn!("could not persist correction cache: {}", err);
                }
                outcomes[i] = Some(RemoteOutcome {
                    text: fixed,
                    confidence,
                    from_cache: false,
                });
            }
        }

        outcomes
            .into_iter()
            .enumerate()
            .map(|(i, outcome)| {
                outcome.unwrap_or_else(|| {
                    RemoteOutcome::unchanged(
                        &texts[i],
                        prior_confidences.get(i).copied().unwrap_or(0.0),
                    )
                })
            })
            .collect()
    }
}
