//! Connected subscribers and fan-out

use std::collections::BTreeMap;

pub type SubscriberId = u64;

/// Write side of one subscriber connection
pub trait SubscriberSink: Send + Sync {
    fn is_open(&self) -> bool;

    /// Queue one text frame. `false` when the connection refused it.
    fn send_text(&self, text: String) -> bool;
}

/// Outcome of one fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    /// Closed or failing subscribers; they stay registered until they disconnect
    pub skipped: usize,
}

/// Subscriber set. Not synchronised; the feed keeps it behind a lock.
#[derive(Default)]
pub struct SubscriberRegistry {
    sinks: BTreeMap<SubscriberId, Box<dyn SubscriberSink>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the count after insertion.
    pub fn register(&mut self, id: SubscriberId, sink: Box<dyn SubscriberSink>) -> usize {
        self.sinks.insert(id, sink);
        self.sinks.len()
    }

    /// Returns the remaining count, or `None` when `id` was not registered.
    pub fn unregister(&mut self, id: SubscriberId) -> Option<usize> {
        self.sinks.remove(&id).map(|_| self.sinks.len())
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn send_to(&self, id: SubscriberId, text: String) -> bool {
        self.sinks
            .get(&id)
            .is_some_and(|sink| sink.is_open() && sink.send_text(text))
    }

    pub fn broadcast(&self, text: &str) -> Delivery {
        let mut delivery = Delivery::default();

        for sink in self.sinks.values() {
            if sink.is_open() && sink.send_text(text.to_string()) {
                delivery.delivered += 1;
            } else {
                delivery.skipped += 1;
            }
        }

        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    #[test]
    fn test_register_and_unregister_counts() {
        let mut registry = SubscriberRegistry::new();
        assert_eq!(registry.register(1, Box::new(RecordingSink::new())), 1);
        assert_eq!(registry.register(2, Box::new(RecordingSink::new())), 2);

        assert_eq!(registry.unregister(1), Some(1));
        assert_eq!(registry.unregister(1), None);
        assert_eq!(registry.unregister(2), Some(0));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_broadcast_skips_closed_without_removing() {
        let mut registry = SubscriberRegistry::new();
        let open = RecordingSink::new();
        let closed = RecordingSink::new();
        closed.close();

        registry.register(1, Box::new(open.clone()));
        registry.register(2, Box::new(closed.clone()));

        let delivery = registry.broadcast("hello");
        assert_eq!(delivery, Delivery { delivered: 1, skipped: 1 });
        assert_eq!(open.texts(), vec!["hello"]);
        assert!(closed.texts().is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_send_to_single_subscriber() {
        let mut registry = SubscriberRegistry::new();
        let a = RecordingSink::new();
        let b = RecordingSink::new();
        registry.register(1, Box::new(a.clone()));
        registry.register(2, Box::new(b.clone()));

        assert!(registry.send_to(2, "only b".to_string()));
        assert!(!registry.send_to(3, "nobody".to_string()));
        assert!(a.texts().is_empty());
        assert_eq!(b.texts(), vec!["only b"]);
    }
}
