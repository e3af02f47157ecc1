//! Polling watcher: a single-threaded, cooperative loop that snapshots every
//! detected source's session list on an interval and emits typed events for
//! new sessions, growth, likely rate-limiting, and idle ticks.
//!
//! Only one watcher may run per process — a second `Watcher::start` call is
//! refused rather than silently sharing state with the first.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::adapters::all_adapters;
use crate::error::HandoffError;
use crate::model::{SessionInfo, Source};

static RUNNING: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone)]
pub enum WatchEvent {
    NewSession { key: String, info: SessionInfo },
    SessionUpdated { key: String, info: SessionInfo, message_delta: i64 },
    RateLimited { key: String },
    Idle,
}

struct SessionState {
    message_count: usize,
    last_changed_at: DateTime<Utc>,
    unchanged_intervals: u32,
    had_growth: bool,
    rate_limit_emitted: bool,
}

/// Released when dropped, freeing the process-wide singleton slot.
pub struct WatchGuard;

impl Drop for WatchGuard {
    fn drop(&mut self) {
        RUNNING.store(false, Ordering::SeqCst);
    }
}

pub struct Watcher {
    states: HashMap<String, SessionState>,
}

impl Watcher {
    /// Claim the process-wide watch slot. Returns `HandoffError::Other` if a
    /// watcher is already running — callers should surface this as a plain
    /// error, not retry.
    pub fn start() -> Result<(Watcher, WatchGuard), HandoffError> {
        if RUNNING.swap(true, Ordering::SeqCst) {
            return Err(HandoffError::Other(
                "a watch session is already running in this process".to_string(),
            ));
        }
        Ok((Watcher { states: HashMap::new() }, WatchGuard))
    }

    /// Take one snapshot across every detected adapter and update internal
    /// state. Exposed separately from `run` so tests can drive it directly.
    pub fn poll(&mut self, project_path: Option<&Path>) -> Vec<WatchEvent> {
        let now = Utc::now();
        let mut infos = Vec::new();
        for adapter in all_adapters().into_iter().filter(|a| a.detect()) {
            let source = adapter.source();
            for info in adapter.list_sessions(project_path) {
                infos.push((source, info));
            }
        }
        snapshot_step(&mut self.states, infos, now)
    }

    /// Poll forever on `interval`, calling `handler` once per event. A
    /// handler panic is caught and logged rather than tearing down the loop.
    pub fn run<F>(&mut self, project_path: Option<&Path>, interval: Duration, mut handler: F)
    where
        F: FnMut(WatchEvent),
    {
        loop {
            for event in self.poll(project_path) {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(event)));
                if let Err(payload) = outcome {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    tracing::error!(%message, "watch handler panicked");
                }
            }
            std::thread::sleep(interval);
        }
    }
}

/// Pure state-machine step, factored out of `Watcher::poll` so it can be
/// driven with synthetic input in tests. Sessions present in a previous
/// snapshot but absent from `infos` are dropped from `states` without an
/// event — a vanished session is not itself news.
fn snapshot_step(
    states: &mut HashMap<String, SessionState>,
    infos: Vec<(Source, SessionInfo)>,
    now: DateTime<Utc>,
) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    let mut seen_keys = HashSet::new();

    for (source, info) in infos {
        let key = format!("{}:{}", source.as_str(), info.id);
        seen_keys.insert(key.clone());

        match states.get_mut(&key) {
            None => {
                events.push(WatchEvent::NewSession { key: key.clone(), info: info.clone() });
                states.insert(
                    key,
                    SessionState {
                        message_count: info.message_count,
                        last_changed_at: now,
                        unchanged_intervals: 0,
                        had_growth: false,
                        rate_limit_emitted: false,
                    },
                );
            }
            Some(state) => {
                if info.message_count != state.message_count {
                    let delta = info.message_count as i64 - state.message_count as i64;
                    events.push(WatchEvent::SessionUpdated { key: key.clone(), info: info.clone(), message_delta: delta });
                    state.had_growth = delta > 0;
                    state.message_count = info.message_count;
                    state.last_changed_at = now;
                    state.unchanged_intervals = 0;
                    state.rate_limit_emitted = false;
                } else {
                    state.unchanged_intervals += 1;
                    if state.had_growth && state.unchanged_intervals >= 2 && !state.rate_limit_emitted {
                        events.push(WatchEvent::RateLimited { key: key.clone() });
                        state.rate_limit_emitted = true;
                    }
                }
            }
        }
    }

    states.retain(|k, _| seen_keys.contains(k));

    if events.is_empty() {
        events.push(WatchEvent::Idle);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str, message_count: usize) -> SessionInfo {
        SessionInfo {
            id: id.to_string(),
            started_at: None,
            last_active_at: Utc::now(),
            message_count,
            project_path: None,
            preview: String::new(),
        }
    }

    #[test]
    fn first_sighting_is_new_session() {
        let mut states = HashMap::new();
        let events = snapshot_step(&mut states, vec![(Source::ClaudeCode, info("s1", 2))], Utc::now());
        assert!(matches!(events.as_slice(), [WatchEvent::NewSession { .. }]));
    }

    #[test]
    fn growth_emits_session_updated() {
        let mut states = HashMap::new();
        snapshot_step(&mut states, vec![(Source::ClaudeCode, info("s1", 2))], Utc::now());
        let events = snapshot_step(&mut states, vec![(Source::ClaudeCode, info("s1", 5))], Utc::now());
        assert!(matches!(events.as_slice(), [WatchEvent::SessionUpdated { message_delta: 3, .. }]));
    }

    #[test]
    fn two_unchanged_polls_after_growth_trigger_rate_limit() {
        let mut states = HashMap::new();
        snapshot_step(&mut states, vec![(Source::ClaudeCode, info("s1", 2))], Utc::now());
        snapshot_step(&mut states, vec![(Source::ClaudeCode, info("s1", 5))], Utc::now());
        snapshot_step(&mut states, vec![(Source::ClaudeCode, info("s1", 5))], Utc::now());
        let events = snapshot_step(&mut states, vec![(Source::ClaudeCode, info("s1", 5))], Utc::now());
        assert!(matches!(events.as_slice(), [WatchEvent::RateLimited { .. }]));
    }

    #[test]
    fn no_sessions_yields_idle() {
        let mut states = HashMap::new();
        let events = snapshot_step(&mut states, Vec::new(), Utc::now());
        assert!(matches!(events.as_slice(), [WatchEvent::Idle]));
    }

    #[test]
    fn vanished_session_is_dropped_without_event() {
        let mut states = HashMap::new();
        snapshot_step(&mut states, vec![(Source::ClaudeCode, info("s1", 2))], Utc::now());
        let events = snapshot_step(&mut states, Vec::new(), Utc::now());
        assert!(matches!(events.as_slice(), [WatchEvent::Idle]));
        assert!(states.is_empty());
    }

    #[test]
    fn second_start_is_refused() {
        let first = Watcher::start();
        assert!(first.is_ok());
        let second = Watcher::start();
        assert!(second.is_err());
    }
}
