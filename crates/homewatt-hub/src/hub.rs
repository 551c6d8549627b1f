//! Subscriber registry and fan-out.
//!
//! [`SubscriberHub`] maps each live subscriber to a bounded queue. The
//! `WebSocket` task that owns a subscriber drains its queue onto the
//! socket; the scheduler only ever touches the sending half.
//!
//! # Delivery
//!
//! [`SubscriberHub::broadcast`] copies the sender set under the lock,
//! releases it, and offers the same [`Arc`]'d message to every sender with
//! a non-blocking `try_send`. A subscriber whose queue is closed or full is
//! removed after the pass completes, so one dead or slow client can neither
//! stall the others nor disturb the iteration. Subscribers registered after
//! the copy is taken start with the next message.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use homewatt_core::runner::TickSink;
use homewatt_types::{FleetMessage, SubscriberId};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Sending half of a subscriber queue.
pub type SubscriberSender = mpsc::Sender<Arc<FleetMessage>>;

/// Receiving half of a subscriber queue.
pub type SubscriberReceiver = mpsc::Receiver<Arc<FleetMessage>>;

/// Errors returned by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The id is already registered. The existing registration is kept.
    #[error("subscriber {0} is already registered")]
    AlreadyRegistered(SubscriberId),
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers that accepted the message.
    pub delivered: usize,
    /// Subscribers removed because delivery failed.
    pub dropped: usize,
}

/// A freshly registered subscriber and its queue.
#[derive(Debug)]
pub struct Subscription {
    /// The id to deregister with.
    pub id: SubscriberId,
    /// Messages broadcast after registration.
    pub receiver: SubscriberReceiver,
}

/// Registry of live subscribers.
#[derive(Debug)]
pub struct SubscriberHub {
    subscribers: Mutex<HashMap<SubscriberId, SubscriberSender>>,
    latest: Mutex<Option<Arc<FleetMessage>>>,
    buffer: usize,
    published: AtomicU64,
}

impl SubscriberHub {
    /// Create an empty hub whose subscriber queues hold `buffer` messages.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            latest: Mutex::new(None),
            buffer: buffer.max(1),
            published: AtomicU64::new(0),
        }
    }

    /// Create a queue, register it under a new id, and hand back the
    /// receiving half.
    pub fn subscribe(&self) -> Result<Subscription, HubError> {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = SubscriberId::new();
        self.register(id, sender)?;
        Ok(Subscription { id, receiver })
    }

    /// Register `sender` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::AlreadyRegistered`] if `id` is present. The
    /// existing sender is left in place.
    pub fn register(&self, id: SubscriberId, sender: SubscriberSender) -> Result<(), HubError> {
        let mut subscribers = self.subscribers.lock();
        if subscribers.contains_key(&id) {
            return Err(HubError::AlreadyRegistered(id));
        }
        subscribers.insert(id, sender);
        debug!(subscriber = %id, total = subscribers.len(), "Subscriber registered");
        Ok(())
    }

    /// Remove `id`. Returns `false` if it was not registered.
    pub fn deregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let removed = subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, total = subscribers.len(), "Subscriber deregistered");
        }
        removed
    }

    /// Offer `message` to every registered subscriber.
    pub fn broadcast(&self, message: &Arc<FleetMessage>) -> BroadcastReport {
        *self.latest.lock() = Some(Arc::clone(message));
        self.published.fetch_add(1, Ordering::Relaxed);

        let targets: Vec<(SubscriberId, SubscriberSender)> = self
            .subscribers
            .lock()
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (id, sender) in targets {
            match sender.try_send(Arc::clone(message)) {
                Ok(()) => report.delivered = report.delivered.saturating_add(1),
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = %id, "Subscriber queue full, dropping");
                    failed.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(subscriber = %id, "Subscriber channel closed, dropping");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.lock();
            report.dropped = failed
                .iter()
                .filter(|id| subscribers.remove(*id).is_some())
                .count();
        }

        report
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Whether no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().contains_key(&id)
    }

    /// The most recently broadcast message.
    pub fn latest(&self) -> Option<Arc<FleetMessage>> {
        self.latest.lock().clone()
    }

    /// Number of broadcasts so far.
    pub fn ticks_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Drop every sender so each subscriber's queue ends. Returns how many
    /// were registered.
    pub fn close_all(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        let count = subscribers.len();
        subscribers.clear();
        count
    }
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::new(8)
    }
}

impl TickSink for SubscriberHub {
    fn is_idle(&self) -> bool {
        self.is_empty()
    }

    fn publish(&self, message: Arc<FleetMessage>) -> usize {
        let report = self.broadcast(&message);
        if report.dropped > 0 {
            debug!(
                delivered = report.delivered,
                dropped = report.dropped,
                "Broadcast dropped subscribers"
            );
        }
        report.delivered
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::DateTime;
    use homewatt_types::FleetSummary;

    use super::*;

    fn message() -> Arc<FleetMessage> {
        Arc::new(FleetMessage {
            timestamp: DateTime::UNIX_EPOCH,
            appliances: Vec::new(),
            summary: FleetSummary {
                total_consumption: 0.0,
                total_cost_per_hour: 0.0,
                active_appliances: 0,
                anomalies_detected: 0,
            },
        })
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let hub = SubscriberHub::new(4);
        let id = SubscriberId::new();
        let (first, mut first_rx) = mpsc::channel(4);
        let (second, _second_rx) = mpsc::channel(4);

        hub.register(id, first).unwrap();
        assert!(matches!(
            hub.register(id, second),
            Err(HubError::AlreadyRegistered(dup)) if dup == id
        ));
        assert_eq!(hub.len(), 1);

        // The original queue still receives.
        hub.broadcast(&message());
        assert!(first_rx.try_recv().is_ok());
    }

    #[test]
    fn deregister_is_idempotent() {
        let hub = SubscriberHub::new(4);
        let keep = hub.subscribe().unwrap();
        let gone = hub.subscribe().unwrap();

        assert!(hub.deregister(gone.id));
        assert!(!hub.deregister(gone.id));
        assert!(!hub.deregister(SubscriberId::new()));
        assert!(hub.contains(keep.id));
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn closed_subscriber_is_removed_once_and_others_still_receive() {
        let hub = SubscriberHub::new(4);
        let mut live: Vec<Subscription> = (0..4).map(|_| hub.subscribe().unwrap()).collect();
        let dead = hub.subscribe().unwrap();
        let dead_id = dead.id;
        drop(dead);

        let report = hub.broadcast(&message());
        assert_eq!(report, BroadcastReport { delivered: 4, dropped: 1 });
        assert!(!hub.contains(dead_id));
        assert_eq!(hub.len(), 4);

        let report = hub.broadcast(&message());
        assert_eq!(report, BroadcastReport { delivered: 4, dropped: 0 });
        for sub in &mut live {
            assert!(sub.receiver.try_recv().is_ok());
            assert!(sub.receiver.try_recv().is_ok());
        }
    }

    #[test]
    fn full_subscriber_is_dropped() {
        let hub = SubscriberHub::new(1);
        let slow = hub.subscribe().unwrap();
        let mut fast = hub.subscribe().unwrap();

        assert_eq!(hub.broadcast(&message()).delivered, 2);
        fast.receiver.try_recv().unwrap();

        let report = hub.broadcast(&message());
        assert_eq!(report, BroadcastReport { delivered: 1, dropped: 1 });
        assert!(!hub.contains(slow.id));
        assert!(hub.contains(fast.id));
    }

    #[test]
    fn every_subscriber_gets_the_same_instance() {
        let hub = SubscriberHub::new(4);
        let mut a = hub.subscribe().unwrap();
        let mut b = hub.subscribe().unwrap();
        let sent = message();
        hub.broadcast(&sent);

        let got_a = a.receiver.try_recv().unwrap();
        let got_b = b.receiver.try_recv().unwrap();
        assert!(Arc::ptr_eq(&got_a, &sent));
        assert!(Arc::ptr_eq(&got_b, &sent));
    }

    #[test]
    fn latest_and_counters_track_broadcasts() {
        let hub = SubscriberHub::default();
        assert!(hub.latest().is_none());
        hub.broadcast(&message());
        hub.broadcast(&message());
        assert_eq!(hub.ticks_published(), 2);
        assert!(hub.latest().is_some());
    }

    #[tokio::test]
    async fn close_all_ends_every_queue() {
        let hub = SubscriberHub::new(4);
        let mut sub = hub.subscribe().unwrap();
        assert_eq!(hub.close_all(), 1);
        assert!(hub.is_empty());
        assert!(sub.receiver.recv().await.is_none());
    }

    #[test]
    fn tick_sink_reports_idle_and_delivery() {
        let hub = SubscriberHub::new(4);
        assert!(hub.is_idle());
        let _sub = hub.subscribe().unwrap();
        assert!(!hub.is_idle());
        assert_eq!(hub.publish(message()), 1);
    }
}
