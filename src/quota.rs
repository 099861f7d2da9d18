//! Rolling daily budget for remote correction calls.
//!
//! The window state persists across restarts so the budget cannot be reset
//! by relaunching. Resets are lazy: any read or write that observes an
//! expired window zeroes the count before doing anything else.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Context as _;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::Result;

/// Length of one quota window.
fn window() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuotaState {
    count: u32,
    window_start: DateTime<Utc>,
}

impl QuotaState {
    fn fresh() -> QuotaState {
        QuotaState {
            count: 0,
            window_start: Utc::now(),
        }
    }
}

/// Snapshot of the current window, for logging and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    /// Calls made in the current window.
    pub count: u32,
    /// Maximum calls per window.
    pub limit: u32,
    /// When the current window expires.
    pub reset_at: DateTime<Utc>,
}

/// Tracks how many remote calls have been made in the current 24-hour window.
pub struct QuotaManager {
    path: PathBuf,
    limit: u32,
    state: Mutex<QuotaState>,
}

impl QuotaManager {
    /// Open the quota ledger at `path` with the given per-window limit.
    pub fn open(path: &Path, limit: u32) -> QuotaManager {
        let state = match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|err| {
                warn!("discarding unreadable quota state {}: {}", path.display(), err);
                QuotaState::fresh()
            }),
            Err(_) => QuotaState::fresh(),
        };
        QuotaManager {
            path: path.to_owned(),
            limit,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QuotaState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reset the window in place if it has expired. Must be called before
    /// any other read of `state`.
    fn reset_if_expired(state: &mut QuotaState) {
        if Utc::now() >= state.window_start + window() {
            info!("quota window expired, resetting count");
            *state = QuotaState::fresh();
        }
    }

    /// Whether another remote call fits in the current window.
    pub fn can_proceed(&self) -> bool {
        let mut state = self.lock();
        Self::reset_if_expired(&mut state);
        state.count < self.limit
    }

    /// Record one remote call. Persists synchronously so the count survives
    /// a crash between the call and the next mutation.
    pub fn record_call(&self) -> Result<()> {
        let mut state = self.lock();
        Self::reset_if_expired(&mut state);
        state.count += 1;
        debug!("remote call {}/{} this window", state.count, self.limit);
        self.persist(&state)
    }

    /// Current count, limit, and reset time.
    pub fn status(&self) -> QuotaStatus {
        let mut state = self.lock();
        Self::reset_if_expired(&mut state);
        QuotaStatus {
            count: state.count,
            limit: self.limit,
            reset_at: state.window_start + window(),
        }
    }

    fn persist(&self, state: &QuotaState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create {}", dir.display()))?;
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("could not create temp file in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())
            .context("could not write quota state")?;
        tmp.persist(&self.path)
            .with_context(|| format!("could not replace {}", self.path.display()))?;
        Ok(())
    }
}
