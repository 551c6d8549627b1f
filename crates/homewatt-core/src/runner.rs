//! The perpetual tick scheduler.
//!
//! [`run_scheduler`] drives the fleet once per period:
//!
//! - **Idle skip**: with no subscribers, no snapshot is taken and no
//!   message is built, but the loop still sleeps a full period
//! - **Failure isolation**: errors and panics from device advancement,
//!   assembly, or publishing are logged and the tick is skipped
//! - **Pause/resume**: the operator can halt broadcasting without
//!   stopping the loop
//! - **Cooperative stop**: the stop signal is raced against every sleep,
//!   so the loop exits at its next suspension point with nothing in flight
//!
//! The period is measured from the end of one iteration to the start of
//! the next and is not corrected for the work done inside the iteration.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use homewatt_types::FleetMessage;
use tracing::{debug, info, warn};

use crate::assembler::{AssemblyError, assemble_snapshot};
use crate::clock::Clock;
use crate::fleet::Fleet;
use crate::operator::OperatorState;

/// Errors that can occur during a single tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The snapshot could not be turned into a message.
    #[error("assembly failed: {source}")]
    Assembly {
        /// The underlying assembly error.
        #[from]
        source: AssemblyError,
    },

    /// Something inside the tick panicked.
    #[error("tick panicked: {0}")]
    Panicked(String),
}

/// Destination for assembled messages.
///
/// Both methods are synchronous: publishing must never wait on a single
/// slow receiver.
pub trait TickSink: Send + Sync {
    /// `true` when nobody would receive a message this tick.
    fn is_idle(&self) -> bool;

    /// Deliver `message` to every current receiver and return how many
    /// accepted it.
    fn publish(&self, message: Arc<FleetMessage>) -> usize;
}

/// Counters describing a finished scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Ticks that produced and published a message.
    pub ticks_published: u64,
    /// Ticks skipped because the sink had no receivers.
    pub ticks_idle: u64,
    /// Ticks abandoned after an error or panic.
    pub ticks_failed: u64,
}

/// Run the tick loop until the operator requests a stop.
///
/// # Arguments
///
/// * `fleet` - The simulated fleet, advanced once per published tick
/// * `clock` - Source of "now" for every snapshot
/// * `operator` - Shared pause, speed, and stop controls
/// * `sink` - Receives each assembled message
///
/// # Returns
///
/// Returns a [`SchedulerReport`] once the stop signal has been observed.
pub async fn run_scheduler(
    fleet: &mut Fleet,
    clock: &dyn Clock,
    operator: &OperatorState,
    sink: &dyn TickSink,
) -> SchedulerReport {
    let mut report = SchedulerReport::default();

    info!(
        devices = fleet.len(),
        seed = fleet.seed(),
        tick_interval_ms = operator.tick_interval_ms(),
        "Scheduler starting"
    );

    loop {
        // --- Check stop request (before tick) ---
        if operator.is_stop_requested() {
            break;
        }

        // --- Check pause ---
        if operator.is_paused() {
            info!("Scheduler paused, waiting for resume...");
            tokio::select! {
                () = operator.wait_if_paused() => info!("Scheduler resumed"),
                () = operator.stopped() => break,
            }
            continue;
        }

        // --- Execute tick ---
        if sink.is_idle() {
            report.ticks_idle = report.ticks_idle.saturating_add(1);
        } else {
            match guarded_tick(fleet, clock.now(), sink) {
                Ok(delivered) => {
                    report.ticks_published = report.ticks_published.saturating_add(1);
                    debug!(tick = fleet.ticks(), delivered, "Tick published");
                }
                Err(e) => {
                    report.ticks_failed = report.ticks_failed.saturating_add(1);
                    warn!(error = %e, "Tick failed, skipping");
                }
            }
        }

        // --- Sleep for tick interval ---
        let period = Duration::from_millis(operator.tick_interval_ms());
        tokio::select! {
            () = tokio::time::sleep(period) => {}
            () = operator.stopped() => break,
        }
    }

    report
}

/// Log the scheduler end sequence.
pub fn log_scheduler_end(report: &SchedulerReport) {
    info!(
        ticks_published = report.ticks_published,
        ticks_idle = report.ticks_idle,
        ticks_failed = report.ticks_failed,
        "Scheduler stopped"
    );
}

fn run_tick(
    fleet: &mut Fleet,
    now: DateTime<Utc>,
    sink: &dyn TickSink,
) -> Result<usize, TickError> {
    let snapshot = fleet.snapshot(now);
    let message = assemble_snapshot(&snapshot)?;
    Ok(sink.publish(Arc::new(message)))
}

fn guarded_tick(
    fleet: &mut Fleet,
    now: DateTime<Utc>,
    sink: &dyn TickSink,
) -> Result<usize, TickError> {
    panic::catch_unwind(AssertUnwindSafe(|| run_tick(fleet, now, sink)))
        .unwrap_or_else(|payload| Err(TickError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::TimeDelta;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{ApplianceSpec, default_fleet};
    use crate::device::DeviceParams;

    /// In-memory sink that records what it receives.
    #[derive(Default)]
    struct RecordingSink {
        idle: AtomicBool,
        panic_first: AtomicBool,
        calls: AtomicUsize,
        received: Mutex<Vec<Arc<FleetMessage>>>,
    }

    impl TickSink for RecordingSink {
        fn is_idle(&self) -> bool {
            self.idle.load(Ordering::SeqCst)
        }

        fn publish(&self, message: Arc<FleetMessage>) -> usize {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_first.swap(false, Ordering::SeqCst) {
                panic!("receiver exploded");
            }
            self.received.lock().unwrap().push(message);
            1
        }
    }

    fn fleet() -> Fleet {
        Fleet::new(default_fleet(), DeviceParams::default(), 7, DateTime::UNIX_EPOCH).unwrap()
    }

    /// A single device that flips every tick and whose draw overflows to
    /// infinity while on, so every other tick fails to assemble.
    fn overflowing_fleet() -> Fleet {
        let params = DeviceParams {
            min_dwell: TimeDelta::zero(),
            switch_probability: 1.0,
            weekly_baseline_fraction: 0.0,
            weekly_variation_fraction: 0.0,
            ..DeviceParams::default()
        };
        let spec = ApplianceSpec::new("x", "Overflow", 1e307, "x.png");
        Fleet::new(vec![spec], params, 7, DateTime::UNIX_EPOCH).unwrap()
    }

    async fn stop_after(operator: &OperatorState, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        operator.request_stop();
    }

    #[tokio::test]
    async fn idle_sink_skips_snapshot_work() {
        let mut fleet = fleet();
        let clock = ManualClock::default();
        let operator = OperatorState::new(10);
        let sink = RecordingSink::default();
        sink.idle.store(true, Ordering::SeqCst);

        let (report, ()) = tokio::join!(
            run_scheduler(&mut fleet, &clock, &operator, &sink),
            stop_after(&operator, 60),
        );

        assert!(report.ticks_idle >= 1);
        assert_eq!(report.ticks_published, 0);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fleet.ticks(), 0);
    }

    #[tokio::test]
    async fn panic_in_publish_does_not_end_the_loop() {
        let mut fleet = fleet();
        let clock = ManualClock::default();
        let operator = OperatorState::new(10);
        let sink = RecordingSink::default();
        sink.panic_first.store(true, Ordering::SeqCst);

        let (report, ()) = tokio::join!(
            run_scheduler(&mut fleet, &clock, &operator, &sink),
            stop_after(&operator, 100),
        );

        assert_eq!(report.ticks_failed, 1);
        assert!(report.ticks_published >= 1);
        assert!(!sink.received.lock().unwrap().is_empty());
    }

    #[test]
    fn non_finite_draw_fails_assembly() {
        let mut fleet = overflowing_fleet();
        let sink = RecordingSink::default();

        let on = guarded_tick(&mut fleet, DateTime::UNIX_EPOCH, &sink);
        assert!(matches!(on, Err(TickError::Assembly { .. })));
        let off = guarded_tick(&mut fleet, DateTime::UNIX_EPOCH, &sink);
        assert_eq!(off.unwrap(), 1);
    }

    #[tokio::test]
    async fn assembly_failure_does_not_end_the_loop() {
        let mut fleet = overflowing_fleet();
        let clock = ManualClock::default();
        let operator = OperatorState::new(10);
        let sink = RecordingSink::default();

        let (report, ()) = tokio::join!(
            run_scheduler(&mut fleet, &clock, &operator, &sink),
            stop_after(&operator, 100),
        );

        assert!(report.ticks_failed >= 1);
        assert!(report.ticks_published >= 1);
        let received = sink.received.lock().unwrap();
        assert_eq!(received.len(), usize::try_from(report.ticks_published).unwrap());
        assert!(received.iter().all(|m| m.appliances.iter().all(|a| !a.state)));
    }

    #[tokio::test]
    async fn stop_during_sleep_exits_promptly() {
        let mut fleet = fleet();
        let clock = ManualClock::default();
        let operator = OperatorState::new(60_000);
        let sink = RecordingSink::default();

        let run = async {
            tokio::join!(
                run_scheduler(&mut fleet, &clock, &operator, &sink),
                stop_after(&operator, 50),
            )
        };
        let (report, ()) = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap();

        assert_eq!(report.ticks_published, 1);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_before_start_does_nothing() {
        let mut fleet = fleet();
        let clock = ManualClock::default();
        let operator = OperatorState::new(10);
        operator.request_stop();
        let sink = RecordingSink::default();

        let report = run_scheduler(&mut fleet, &clock, &operator, &sink).await;

        assert_eq!(report, SchedulerReport::default());
        assert_eq!(fleet.ticks(), 0);
    }

    #[tokio::test]
    async fn paused_scheduler_publishes_nothing_and_still_stops() {
        let mut fleet = fleet();
        let clock = ManualClock::default();
        let operator = OperatorState::new(10);
        operator.pause();
        let sink = RecordingSink::default();

        let run = async {
            tokio::join!(
                run_scheduler(&mut fleet, &clock, &operator, &sink),
                stop_after(&operator, 50),
            )
        };
        let (report, ()) = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap();

        assert_eq!(report.ticks_published, 0);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn messages_are_stamped_by_the_injected_clock() {
        let mut fleet = fleet();
        let start = DateTime::UNIX_EPOCH + TimeDelta::days(3);
        let clock = ManualClock::new(start);
        let operator = OperatorState::new(60_000);
        let sink = RecordingSink::default();

        let (_report, ()) = tokio::join!(
            run_scheduler(&mut fleet, &clock, &operator, &sink),
            stop_after(&operator, 30),
        );

        let received = sink.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received.first().unwrap().timestamp, start);
        assert_eq!(received.first().unwrap().appliances.len(), 8);
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(text.as_ref()), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(owned.as_ref()), "bang");
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
