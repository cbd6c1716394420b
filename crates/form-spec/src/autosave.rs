use crate::config::EngineConfig;
use crate::persistence::{AutosaveOutcome, KeyValueStore, PersistenceError, SessionPersistence};
use crate::store::FormStore;

/// Periodic autosave driven by the host's timer ticks.
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    interval_ms: i64,
    last_run: Option<i64>,
}

impl AutosaveScheduler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: i64::try_from(interval_ms).unwrap_or(i64::MAX),
            last_run: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.autosave_interval_ms)
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        self.last_run
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.interval_ms)
    }

    /// Runs an autosave when the interval has elapsed. `None` means not due yet.
    pub fn tick<S: KeyValueStore>(
        &mut self,
        now_ms: i64,
        persistence: &mut SessionPersistence<S>,
        store: &mut FormStore,
    ) -> Result<Option<AutosaveOutcome>, PersistenceError> {
        if !self.is_due(now_ms) {
            return Ok(None);
        }
        self.last_run = Some(now_ms);
        persistence.autosave(store).map(Some)
    }

    /// Immediate autosave for teardown hooks, ignoring the interval.
    pub fn flush<S: KeyValueStore>(
        &mut self,
        now_ms: i64,
        persistence: &mut SessionPersistence<S>,
        store: &mut FormStore,
    ) -> Result<AutosaveOutcome, PersistenceError> {
        self.last_run = Some(now_ms);
        persistence.autosave(store)
    }

    pub fn reset(&mut self) {
        self.last_run = None;
    }
}
