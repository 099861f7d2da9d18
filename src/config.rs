//! Tunable constants and remote-endpoint configuration.

use std::{env, time::Duration};

use anyhow::anyhow;

use crate::Result;

/// Every threshold and limit the pipeline uses, in one adjustable place.
///
/// The defaults match the behavior of the production system; tests and the
/// CLI may override individual fields.
#[derive(Debug, Clone)]
pub struct Tunables {
    /// Aggregate confidence below which the remote corrector is consulted.
    pub low_confidence_threshold: f32,
    /// Remote confidence below which a single refinement round runs.
    pub refinement_threshold: f32,
    /// Maximum number of persisted cache entries.
    pub cache_size: usize,
    /// Cache entries older than this many days are dropped on load.
    pub cache_max_age_days: i64,
    /// Remote calls allowed per rolling 24-hour window.
    pub quota_limit: u32,
    /// Maximum remote attempts per call, including the first.
    pub max_retry_attempts: u32,
    /// First backoff delay after a rate-limit response.
    pub initial_retry_delay: Duration,
    /// Backoff delays never exceed this.
    pub max_retry_delay: Duration,
    /// Texts longer than this many characters are never sent to the remote
    /// corrector.
    pub max_remote_text_chars: usize,
    /// Minimum confidence for morphological-detector suggestions.
    pub morphological_min_confidence: f32,
    /// Minimum confidence for kanji-shape suggestions at apply time.
    pub kanji_shape_min_confidence: f32,
    /// Minimum confidence for okurigana suggestions.
    pub okurigana_min_confidence: f32,
    /// Minimum confidence for sokuon/choon suggestions (phase gates are
    /// derived from this).
    pub sokuon_choon_min_confidence: f32,
    /// Minimum confidence for particle insertions.
    pub particle_min_confidence: f32,
    /// Minimum confidence for per-element analyzer suggestions at apply
    /// time.
    pub analyzer_min_confidence: f32,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            low_confidence_threshold: 0.7,
            refinement_threshold: 0.95,
            cache_size: 100,
            cache_max_age_days: 30,
            quota_limit: 20,
            max_retry_attempts: 3,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
            max_remote_text_chars: 500,
            morphological_min_confidence: 0.6,
            kanji_shape_min_confidence: 0.6,
            okurigana_min_confidence: 0.55,
            sokuon_choon_min_confidence: 0.5,
            particle_min_confidence: 0.4,
            analyzer_min_confidence: 0.5,
        }
    }
}

/// Environment variable holding the API key for the remote model.
pub const API_KEY_VAR: &str = "KOSEI_API_KEY";

/// Environment variable overriding the remote endpoint URL.
pub const ENDPOINT_VAR: &str = "KOSEI_ENDPOINT";

/// Default endpoint, a Gemini-style `generateContent` URL.
pub const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

/// Where to reach the remote correction model.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Full URL of the `generateContent`-style endpoint.
    pub endpoint: String,
    /// API key, sent as a query parameter.
    pub api_key: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout, covering the response body.
    pub request_timeout: Duration,
}

impl RemoteConfig {
    /// Build a remote configuration from the environment. Call `dotenv()`
    /// first if you keep the key in a `.env` file.
    pub fn from_env() -> Result<RemoteConfig> {
        let api_key = env::var(API_KEY_VAR)
            .map_err(|_| anyhow!("{} is not set; remote correction is unavailable", API_KEY_VAR))?;
        let endpoint =
            env::var(ENDPOINT_VAR).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_owned());
        Ok(RemoteConfig {
            endpoint,
            api_key,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(45),
        })
    }
}
