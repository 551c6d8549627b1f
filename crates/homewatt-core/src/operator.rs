//! Operator control state for the tick scheduler.
//!
//! This module provides shared atomic state used by the scheduler loop and
//! the operator REST API. The operator can pause/resume broadcasting,
//! change the tick period, and request a clean stop, all without
//! restarting the process.
//!
//! # Architecture
//!
//! All mutable control fields use [`std::sync::atomic`] types so they can
//! be shared between the scheduler task and the Axum handler tasks behind
//! an `Arc` without locks on the hot path. Wake-ups go through
//! [`Notify`]: the stop signal uses `notify_waiters`, which also reaches
//! `Notified` futures that were created but not yet polled, so a stop
//! raised between a check and an await is never lost.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Smallest tick interval the operator may set at runtime.
pub const MIN_TICK_INTERVAL_MS: u64 = 100;

/// Shared operator control state.
#[derive(Debug)]
pub struct OperatorState {
    /// Whether broadcasting is currently paused.
    paused: AtomicBool,

    /// Wakes the scheduler when resumed.
    resume_notify: Notify,

    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes every task waiting on [`stopped`](Self::stopped).
    stop_notify: Notify,

    /// Current tick interval in milliseconds (runtime-adjustable).
    tick_interval_ms: AtomicU64,

    /// Wall-clock time when the process started.
    started_at: DateTime<Utc>,
}

impl OperatorState {
    /// Create operator state with the configured tick interval.
    pub fn new(tick_interval_ms: u64) -> Self {
        Self {
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            tick_interval_ms: AtomicU64::new(tick_interval_ms),
            started_at: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Check whether broadcasting is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause broadcasting. The scheduler idles until resumed or stopped.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resume broadcasting and wake the scheduler.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_one();
    }

    /// Wait until broadcasting is no longer paused.
    ///
    /// Returns immediately if not paused.
    pub async fn wait_if_paused(&self) {
        while self.paused.load(Ordering::Acquire) {
            self.resume_notify.notified().await;
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean stop and wake everything waiting on it.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolve once a stop has been requested.
    pub async fn stopped(&self) {
        loop {
            let notified = self.stop_notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    // -----------------------------------------------------------------------
    // Tick Speed
    // -----------------------------------------------------------------------

    /// Get the current tick interval in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Set the tick interval in milliseconds. Must be at least
    /// [`MIN_TICK_INTERVAL_MS`].
    ///
    /// Returns the previous interval on success, or `None` if the value was
    /// rejected.
    pub fn set_tick_interval_ms(&self, ms: u64) -> Option<u64> {
        if ms < MIN_TICK_INTERVAL_MS {
            return None;
        }
        Some(self.tick_interval_ms.swap(ms, Ordering::AcqRel))
    }

    // -----------------------------------------------------------------------
    // Uptime
    // -----------------------------------------------------------------------

    /// Return the wall-clock start time.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Return elapsed seconds since start.
    pub fn elapsed_seconds(&self) -> u64 {
        let elapsed = Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds();
        u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX)
    }
}

/// JSON-serializable status for the operator API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorStatus {
    /// Whether broadcasting is paused.
    pub paused: bool,
    /// Whether a stop has been requested.
    pub stop_requested: bool,
    /// Current tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Elapsed wall-clock seconds since start.
    pub elapsed_seconds: u64,
    /// ISO 8601 timestamp of when the process started.
    pub started_at: String,
}

impl OperatorStatus {
    /// Capture the current operator status.
    pub fn capture(state: &OperatorState) -> Self {
        Self {
            paused: state.is_paused(),
            stop_requested: state.is_stop_requested(),
            tick_interval_ms: state.tick_interval_ms(),
            elapsed_seconds: state.elapsed_seconds(),
            started_at: state.started_at().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn initial_state_is_running() {
        let state = OperatorState::new(1000);
        assert!(!state.is_paused());
        assert!(!state.is_stop_requested());
    }

    #[test]
    fn pause_and_resume() {
        let state = OperatorState::new(1000);
        state.pause();
        assert!(state.is_paused());
        state.resume();
        assert!(!state.is_paused());
    }

    #[test]
    fn set_tick_interval() {
        let state = OperatorState::new(1000);
        assert_eq!(state.set_tick_interval_ms(2000), Some(1000));
        assert_eq!(state.tick_interval_ms(), 2000);
    }

    #[test]
    fn reject_sub_minimum_interval() {
        let state = OperatorState::new(1000);
        assert!(state.set_tick_interval_ms(50).is_none());
        assert_eq!(state.tick_interval_ms(), 1000);
    }

    #[tokio::test]
    async fn stopped_resolves_after_request() {
        let state = Arc::new(OperatorState::new(1000));
        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.stopped().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.request_stop();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn stopped_returns_immediately_when_already_requested() {
        let state = OperatorState::new(1000);
        state.request_stop();
        let done = tokio::time::timeout(Duration::from_millis(100), state.stopped()).await;
        assert!(done.is_ok());
    }

    #[tokio::test]
    async fn wait_if_paused_returns_after_resume() {
        let state = Arc::new(OperatorState::new(1000));
        state.pause();
        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_if_paused().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.resume();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[test]
    fn status_reflects_state() {
        let state = OperatorState::new(250);
        state.pause();
        let status = OperatorStatus::capture(&state);
        assert!(status.paused);
        assert_eq!(status.tick_interval_ms, 250);
    }
}
