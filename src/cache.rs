//! A small persistent correction cache, stored as a JSON blob. This is not
//! built for speed, because it's caching expensive remote model requests that
//! are made over the network. Instead, we focus on reliability.

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Context as _;
use chrono::{DateTime, Duration, Utc};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::Result;

/// One cached correction, keyed by trimmed input text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The corrected text.
    pub corrected_text: String,
    /// Confidence the pipeline had in the correction when it was stored.
    pub confidence: f32,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
}

/// Hit/miss counters, reset with each process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found a usable entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries currently held.
    pub entries: usize,
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Bounded key-value store for remote correction results, persisted across
/// process restarts.
pub struct CorrectionCache {
    path: PathBuf,
    max_entries: usize,
    max_age: Duration,
    state: Mutex<CacheState>,
}

impl CorrectionCache {
    /// Open the cache at `path`, dropping entries older than `max_age_days`.
    ///
    /// A missing or unreadable file starts an empty cache rather than
    /// erroring, since losing cached corrections only costs quota.
    pub fn open(path: &Path, max_entries: usize, max_age_days: i64) -> CorrectionCache {
        let max_age = Duration::days(max_age_days);
        let mut entries: HashMap<String, CacheEntry> = match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|err| {
                warn!("discarding unreadable cache {}: {}", path.display(), err);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        let cutoff = Utc::now() - max_age;
        let before = entries.len();
        entries.retain(|_, entry| entry.timestamp >= cutoff);
        if entries.len() < before {
            debug!("dropped {} expired cache entries", before - entries.len());
        }
        CorrectionCache {
            path: path.to_owned(),
            max_entries,
            max_age,
            state: Mutex::new(CacheState {
                entries,
                hits: 0,
                misses: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        // A poisoned cache mutex means another thread panicked mid-update;
        // the map itself is still a valid map, so keep serving it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a correction for `text`, updating the hit/miss counters.
    pub fn get(&self, text: &str) -> Option<CacheEntry> {
        let key = text.trim();
        let mut state = self.lock();
        let cutoff = Utc::now() - self.max_age;
        let entry = state
            .entries
            .get(key)
            .filter(|entry| entry.timestamp >= cutoff)
            .cloned();
        match entry {
            Some(entry) => {
                state.hits += 1;
                trace!("cache hit for {:?}", key);
                Some(entry)
            }
            None => {
                state.misses += 1;
                trace!("cache miss for {:?}", key);
                None
            }
        }
    }

    /// Store a correction for `text`, evicting the oldest entries if the
    /// cache is full, and persist the whole map.
    pub fn put(&self, text: &str, corrected_text: &str, confidence: f32) -> Result<()> {
        let key = text.trim().to_owned();
        let mut state = self.lock();
        state.entries.insert(
            key,
            CacheEntry {
                corrected_text: corrected_text.to_owned(),
                confidence,
                timestamp: Utc::now(),
            },
        );
        while state.entries.len() > self.max_entries {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.timestamp)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    debug!("evicting oldest cache entry {:?}", key);
                    state.entries.remove(&key);
                }
                None => break,
            }
        }
        self.persist(&state.entries)
    }

    /// Drop every entry and persist the empty map.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock();
        state.entries.clear();
        self.persist(&state.entries)
    }

    /// Current counters and size.
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.entries.len(),
        }
    }

    /// Write the map atomically so a crash mid-write can't corrupt it.
    fn persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create {}", dir.display()))?;
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("could not create temp file in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())
            .context("could not write cache")?;
        tmp.persist(&self.path)
            .with_context(|| format!("could not replace {}", self.path.display()))?;
        Ok(())
    }
}
