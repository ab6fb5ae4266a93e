//! Debounced autosave scheduling.
//!
//! The engine decides *when* committed local state should be persisted;
//! the actual commit is the session's call to the persistence
//! collaborator. `tick` is pure against an injected clock so the schedule
//! is fully deterministic under test.

use chrono::{DateTime, Duration, Utc};

use storyloom_core::error::SyncError;

use crate::sync_manager::RetryPolicy;

/// Autosave timing configuration.
#[derive(Debug, Clone, Copy)]
pub struct AutoSaveConfig {
    /// Quiet period after the last edit before a save fires.
    pub debounce_ms: i64,
    /// Hard ceiling between successful saves regardless of activity;
    /// bounds worst-case data loss on crash.
    pub max_interval_ms: i64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            max_interval_ms: 30_000,
        }
    }
}

/// Why a save attempt fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    /// No new edit for the configured debounce window.
    QuietPeriod,
    /// The maximum interval since the last successful save elapsed.
    ForcedCheckpoint,
}

/// Current durability status, surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// Everything committed state covers is durable.
    Clean,
    /// Unsaved changes exist.
    Dirty,
    /// A save attempt is in flight.
    Saving,
    /// The last attempt failed; a retry is scheduled.
    Failed {
        /// Backend failure description.
        reason: String,
    },
}

/// Debounced scheduler deciding when local committed state is durable
/// enough to persist, independent of explicit user saves.
#[derive(Debug)]
pub struct AutoSave {
    config: AutoSaveConfig,
    retry: RetryPolicy,
    status: SaveStatus,
    last_edit_at: Option<DateTime<Utc>>,
    last_save_at: Option<DateTime<Utc>>,
    /// When the in-flight attempt started; edits after this keep the
    /// document dirty even if the attempt succeeds.
    save_started_at: Option<DateTime<Utc>>,
    failures: u32,
    retry_after: Option<DateTime<Utc>>,
    opened_at: DateTime<Utc>,
}

impl AutoSave {
    /// Creates an idle engine.
    #[must_use]
    pub fn new(config: AutoSaveConfig, retry: RetryPolicy, now: DateTime<Utc>) -> Self {
        Self {
            config,
            retry,
            status: SaveStatus::Clean,
            last_edit_at: None,
            last_save_at: None,
            save_started_at: None,
            failures: 0,
            retry_after: None,
            opened_at: now,
        }
    }

    /// Current durability status.
    #[must_use]
    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    /// Whether unsaved changes exist.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !matches!(self.status, SaveStatus::Clean)
    }

    /// When the last successful save completed.
    #[must_use]
    pub fn last_save_at(&self) -> Option<DateTime<Utc>> {
        self.last_save_at
    }

    /// Records a local edit. Restarts the debounce window.
    pub fn mark_dirty(&mut self, now: DateTime<Utc>) {
        self.last_edit_at = Some(now);
        if !matches!(self.status, SaveStatus::Saving) {
            self.status = SaveStatus::Dirty;
        }
    }

    /// Decides whether a save attempt should fire at `now`. At most one
    /// attempt is in flight at a time; the caller reports the outcome via
    /// [`AutoSave::on_save_result`].
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<SaveTrigger> {
        if self.save_started_at.is_some() || !self.is_dirty() {
            return None;
        }
        if let Some(after) = self.retry_after
            && now < after
        {
            return None;
        }

        let quiet = self
            .last_edit_at
            .is_some_and(|at| now - at >= Duration::milliseconds(self.config.debounce_ms));
        let anchor = self.last_save_at.unwrap_or(self.opened_at);
        let overdue = now - anchor >= Duration::milliseconds(self.config.max_interval_ms);

        let trigger = if quiet {
            SaveTrigger::QuietPeriod
        } else if overdue {
            SaveTrigger::ForcedCheckpoint
        } else {
            return None;
        };

        self.save_started_at = Some(now);
        self.status = SaveStatus::Saving;
        Some(trigger)
    }

    /// Reports the outcome of the save attempt started by the last
    /// [`AutoSave::tick`]. Failures keep the document dirty and schedule
    /// a retry with backoff; they are surfaced, never silently looped.
    pub fn on_save_result(&mut self, now: DateTime<Utc>, result: Result<(), SyncError>) {
        let started = self.save_started_at.take();
        match result {
            Ok(()) => {
                self.failures = 0;
                self.retry_after = None;
                self.last_save_at = Some(now);
                // Edits that landed during the attempt stay unsaved.
                let still_dirty = match (self.last_edit_at, started) {
                    (Some(edit), Some(start)) => edit > start,
                    _ => false,
                };
                self.status = if still_dirty {
                    SaveStatus::Dirty
                } else {
                    SaveStatus::Clean
                };
            }
            Err(err) => {
                self.failures += 1;
                self.retry_after = Some(now + self.retry.delay(self.failures));
                tracing::warn!(failures = self.failures, error = %err, "autosave attempt failed");
                self.status = SaveStatus::Failed {
                    reason: err.to_string(),
                };
            }
        }
    }
}
