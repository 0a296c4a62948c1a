//! Progress reporting for pipeline updates.
//!
//! Observers subscribe closures that receive [`ProgressEvent`]s synchronously
//! on the thread driving the update. They carry no flow-control semantics.

use crate::core::error::NodeId;
use crate::core::region::Region;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A progress event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A client request has started.
    RequestStarted {
        node_id: NodeId,
        output: usize,
        region: Region,
    },
    /// A stage is about to generate data.
    StageStarted { node_id: NodeId, name: String },
    /// Fraction of a stage's data generation done, in `[0, 1]`.
    StageProgress { node_id: NodeId, fraction: f32 },
    /// A stage generated its outputs.
    StageCompleted { node_id: NodeId, duration_ms: u64 },
    /// A stage failed; its outputs were released.
    StageFailed { node_id: NodeId, message: String },
    /// The client request was rejected or a stage failed.
    RequestFailed { node_id: NodeId, message: String },
    /// The client request has finished.
    RequestCompleted {
        node_id: NodeId,
        stages_executed: usize,
        duration_ms: u64,
    },
}

/// Callback type for progress events.
pub type ProgressCallback = dyn Fn(&ProgressEvent) + Send + Sync;

/// Handle returned by [`ObserverList::add`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Subscription list of progress observers.
#[derive(Default)]
pub struct ObserverList {
    next_id: AtomicU64,
    observers: RwLock<Vec<(ObserverId, Arc<ProgressCallback>)>>,
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.len())
            .finish()
    }
}

impl ObserverList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a callback.
    pub fn add<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, Arc::new(callback)));
        id
    }

    /// Unsubscribe. Returns false if the id was unknown.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(observer, _)| *observer != id);
        observers.len() != before
    }

    /// Number of subscribed observers.
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Whether no observer is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every observer in subscription order.
    pub fn notify(&self, event: &ProgressEvent) {
        // Snapshot so callbacks may subscribe or unsubscribe
        let observers: Vec<Arc<ProgressCallback>> = self
            .observers
            .read()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in observers {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_observers_receive_events_until_removed() {
        let list = ObserverList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let id = list.add(move |_| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        let event = ProgressEvent::StageProgress {
            node_id: NodeId::new(),
            fraction: 0.5,
        };
        list.notify(&event);
        list.notify(&event);
        assert_eq!(count.load(Ordering::Relaxed), 2);

        assert!(list.remove(id));
        assert!(!list.remove(id));
        list.notify(&event);
        assert_eq!(count.load(Ordering::Relaxed), 2);
        assert!(list.is_empty());
    }

    #[test]
    fn test_observer_order_is_subscription_order() {
        let list = ObserverList::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for tag in 0..3 {
            let seen = seen.clone();
            list.add(move |_| seen.lock().push(tag));
        }
        list.notify(&ProgressEvent::StageStarted {
            node_id: NodeId::new(),
            name: "test".to_string(),
        });
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }
}
