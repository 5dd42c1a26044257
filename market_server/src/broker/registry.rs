//! Per-topic subscriber registry with self-healing broadcast.
//!
//! The registry keeps, for each topic, the handles subscribed to it in insertion order.
//! It does not own the connections behind those handles; it only closes a handle when
//! it unsubscribes it, either on request or because a delivery to it failed.
//!
//! `publish` copies the topic's handles under the read lock and releases the lock
//! before any I/O. Deliveries then run on scoped threads, one per handle, so a slow or
//! broken subscriber never holds up the others. The call returns once every delivery
//! has finished and every failed handle has been dropped from the topic.
//!
//! Subscribing the same handle twice yields two entries and double delivery.
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::thread;

use log::{debug, info, warn};
use market_common::{Envelope, Result};

/// Connection-side handle stored in the registry.
///
/// Equality identifies the handle for `unsubscribe`.
pub trait Subscriber: Clone + PartialEq + Send + Sync {
    /// Writes one envelope to the subscriber, bounded by the handle's own timeout.
    fn deliver(&self, envelope: &Envelope) -> Result<()>;

    /// Severs the underlying connection. Must be safe to call more than once.
    fn close(&self);

    /// Short description used in log lines.
    fn describe(&self) -> String;
}

/// Topic → subscribers map guarded by one reader/writer lock.
pub struct TopicRegistry<S: Subscriber> {
    topics: RwLock<HashMap<String, Vec<S>>>,
}

impl<S: Subscriber> Default for TopicRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Subscriber> TopicRegistry<S> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Appends `handle` to `topic`.
    pub fn subscribe(&self, topic: &str, handle: S) {
        info!("New subscriber {} for topic: {}", handle.describe(), topic);
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        topics.entry(topic.to_string()).or_default().push(handle);
    }

    /// Removes the first entry equal to `handle` from `topic` and closes it.
    ///
    /// Returns `false`, without closing anything, when the topic or handle is unknown.
    pub fn unsubscribe(&self, topic: &str, handle: &S) -> bool {
        let removed = {
            let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
            let Some(subscribers) = topics.get_mut(topic) else {
                return false;
            };
            let Some(index) = subscribers.iter().position(|s| s == handle) else {
                return false;
            };
            let removed = subscribers.remove(index);
            if subscribers.is_empty() {
                topics.remove(topic);
            }
            removed
        };
        removed.close();
        info!("Subscriber {} removed from topic: {}", removed.describe(), topic);
        true
    }

    /// Copy of the handles currently subscribed to `topic`.
    pub fn subscribers(&self, topic: &str) -> Vec<S> {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        topics.get(topic).cloned().unwrap_or_default()
    }

    /// Number of entries under `topic`, duplicates included.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        topics.get(topic).map_or(0, Vec::len)
    }

    /// Broadcasts `envelope` to every subscriber of `topic`.
    ///
    /// Returns the number of successful deliveries. Failed subscribers are
    /// unsubscribed before this returns; their errors are not reported to the caller.
    pub fn publish(&self, topic: &str, envelope: &Envelope) -> usize {
        let snapshot = self.subscribers(topic);
        if snapshot.is_empty() {
            debug!("No subscribers on topic {}", topic);
            return 0;
        }

        let failed: Vec<S> = thread::scope(|scope| {
            let deliveries: Vec<_> = snapshot
                .iter()
                .map(|handle| (handle, scope.spawn(move || handle.deliver(envelope))))
                .collect();

            deliveries
                .into_iter()
                .filter_map(|(handle, delivery)| match delivery.join() {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => {
                        warn!("Delivery to {} on {} failed: {}", handle.describe(), topic, e);
                        Some(handle.clone())
                    }
                    Err(_) => {
                        warn!("Delivery to {} on {} panicked", handle.describe(), topic);
                        Some(handle.clone())
                    }
                })
                .collect()
        });

        for handle in &failed {
            self.unsubscribe(topic, handle);
        }

        let delivered = snapshot.len() - failed.len();
        info!(
            "Published message to {} subscribers on topic {} ({} dropped)",
            delivered,
            topic,
            failed.len()
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_common::ServiceError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    #[derive(Clone, Debug)]
    struct FakeSubscriber {
        id: u32,
        closed: Arc<AtomicBool>,
        delay: Duration,
        received: Arc<Mutex<Vec<Envelope>>>,
    }

    impl FakeSubscriber {
        fn new(id: u32) -> Self {
            Self {
                id,
                closed: Arc::new(AtomicBool::new(false)),
                delay: Duration::ZERO,
                received: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn severed(id: u32) -> Self {
            let s = Self::new(id);
            s.closed.store(true, Ordering::SeqCst);
            s
        }

        fn slow(id: u32, delay: Duration) -> Self {
            Self { delay, ..Self::new(id) }
        }

        fn received(&self) -> usize {
            self.received.lock().unwrap().len()
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    impl PartialEq for FakeSubscriber {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl Subscriber for FakeSubscriber {
        fn deliver(&self, envelope: &Envelope) -> Result<()> {
            std::thread::sleep(self.delay);
            if self.is_closed() {
                return Err(ServiceError::ConnectionClosed);
            }
            self.received.lock().unwrap().push(envelope.clone());
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            format!("fake-{}", self.id)
        }
    }

    fn message() -> Envelope {
        Envelope::publish("PETR4", serde_json::json!({"price": 23.4}))
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let registry = TopicRegistry::<FakeSubscriber>::new();
        assert_eq!(registry.publish("PETR4", &message()), 0);
        assert_eq!(registry.subscriber_count("PETR4"), 0);
    }

    #[test]
    fn severed_subscriber_is_dropped_and_live_one_keeps_receiving() {
        let registry = TopicRegistry::new();
        let live = FakeSubscriber::new(1);
        let dead = FakeSubscriber::severed(2);
        registry.subscribe("PETR4", live.clone());
        registry.subscribe("PETR4", dead.clone());

        assert_eq!(registry.publish("PETR4", &message()), 1);
        assert_eq!(registry.subscribers("PETR4"), vec![live.clone()]);
        assert_eq!(live.received(), 1);

        assert_eq!(registry.publish("PETR4", &message()), 1);
        assert_eq!(live.received(), 2);
        assert_eq!(dead.received(), 0);
    }

    #[test]
    fn unsubscribe_removes_first_match_and_closes() {
        let registry = TopicRegistry::new();
        let a = FakeSubscriber::new(1);
        let b = FakeSubscriber::new(2);
        registry.subscribe("PETR4", a.clone());
        registry.subscribe("PETR4", b.clone());

        assert!(registry.unsubscribe("PETR4", &a));
        assert!(a.is_closed());
        assert!(!b.is_closed());
        assert_eq!(registry.subscribers("PETR4"), vec![b]);
    }

    #[test]
    fn unsubscribe_unknown_is_a_noop() {
        let registry = TopicRegistry::new();
        let a = FakeSubscriber::new(1);
        assert!(!registry.unsubscribe("PETR4", &a));
        registry.subscribe("VALE3", a.clone());
        assert!(!registry.unsubscribe("PETR4", &a));
        assert!(!a.is_closed());
    }

    #[test]
    fn duplicate_subscription_delivers_twice() {
        let registry = TopicRegistry::new();
        let a = FakeSubscriber::new(1);
        registry.subscribe("PETR4", a.clone());
        registry.subscribe("PETR4", a.clone());

        assert_eq!(registry.publish("PETR4", &message()), 2);
        assert_eq!(a.received(), 2);

        assert!(registry.unsubscribe("PETR4", &a));
        assert_eq!(registry.subscriber_count("PETR4"), 1);
    }

    #[test]
    fn slow_subscribers_are_delivered_concurrently() {
        let registry = TopicRegistry::new();
        for id in 0..4 {
            registry.subscribe("PETR4", FakeSubscriber::slow(id, Duration::from_millis(150)));
        }
        let started = Instant::now();
        assert_eq!(registry.publish("PETR4", &message()), 4);
        assert!(started.elapsed() < Duration::from_millis(450));
    }

    #[test]
    fn topics_are_independent() {
        let registry = TopicRegistry::new();
        let a = FakeSubscriber::new(1);
        let b = FakeSubscriber::new(2);
        registry.subscribe("PETR4", a.clone());
        registry.subscribe("VALE3", b.clone());

        registry.publish("PETR4", &message());
        assert_eq!(a.received(), 1);
        assert_eq!(b.received(), 0);
    }
}
