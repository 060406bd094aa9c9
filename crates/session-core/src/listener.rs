//! Connection listeners and the broadcast registry.

use std::sync::{Arc, Mutex, MutexGuard};

use camhub_common::error::CamhubResult;

/// A consumer interested in the session's connection state.
///
/// Delivery may fail if the listener endpoint is gone; the registry
/// isolates such failures per listener. Callbacks run with the registry
/// lock held and must not call back into the registry.
pub trait ConnectionListener: Send + Sync {
    fn on_connected(&self) -> CamhubResult<()>;
    fn on_disconnected(&self) -> CamhubResult<()>;
}

/// One registration and its delivery cookie.
///
/// `connected` is true exactly when `on_connected` was delivered more
/// recently than `on_disconnected`, so a broadcast pass never repeats an
/// event a listener has already seen.
struct ListenerEntry {
    listener: Arc<dyn ConnectionListener>,
    connected: bool,
}

/// Thread-safe multiset of connection listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Vec<ListenerEntry>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<ListenerEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a listener. Duplicates are allowed; each registration is
    /// its own entry with its own delivery cookie.
    pub fn register(&self, listener: Arc<dyn ConnectionListener>) {
        self.entries().push(ListenerEntry {
            listener,
            connected: false,
        });
    }

    /// Remove one registration of `listener`. Returns true when the
    /// registry is now empty, the caller's signal to consider releasing
    /// the whole session.
    pub fn unregister(&self, listener: &Arc<dyn ConnectionListener>) -> bool {
        let mut entries = self.entries();
        if let Some(pos) = entries
            .iter()
            .position(|entry| Arc::ptr_eq(&entry.listener, listener))
        {
            entries.remove(pos);
        }
        entries.is_empty()
    }

    /// Number of current registrations.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Deliver `on_connected` to every listener not already marked
    /// connected. A failed delivery is logged and that listener skipped;
    /// its cookie stays unset so a later pass attempts delivery again.
    pub fn broadcast_connected(&self) {
        let mut entries = self.entries();
        for entry in entries.iter_mut() {
            if entry.connected {
                continue;
            }
            match entry.listener.on_connected() {
                Ok(()) => entry.connected = true,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to deliver connected event");
                }
            }
        }
    }

    /// Mirror of `broadcast_connected` for the disconnected event.
    pub fn broadcast_disconnected(&self) {
        let mut entries = self.entries();
        for entry in entries.iter_mut() {
            if !entry.connected {
                continue;
            }
            match entry.listener.on_disconnected() {
                Ok(()) => entry.connected = false,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to deliver disconnected event");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::CountingListener;
    use std::sync::atomic::Ordering;

    fn counting() -> (Arc<CountingListener>, Arc<dyn ConnectionListener>) {
        let listener = Arc::new(CountingListener::default());
        let as_dyn: Arc<dyn ConnectionListener> = Arc::clone(&listener) as _;
        (listener, as_dyn)
    }

    #[test]
    fn broadcast_is_idempotent_per_listener() {
        let registry = ListenerRegistry::new();
        let (counts, listener) = counting();
        registry.register(listener);

        registry.broadcast_connected();
        registry.broadcast_connected();
        assert_eq!(counts.connected.load(Ordering::SeqCst), 1);

        registry.broadcast_disconnected();
        registry.broadcast_disconnected();
        assert_eq!(counts.disconnected.load(Ordering::SeqCst), 1);

        // A full cycle re-arms delivery.
        registry.broadcast_connected();
        assert_eq!(counts.connected.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disconnected_is_skipped_for_never_connected_listener() {
        let registry = ListenerRegistry::new();
        let (counts, listener) = counting();
        registry.register(listener);

        registry.broadcast_disconnected();
        assert_eq!(counts.disconnected.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_delivery_is_isolated_and_retried() {
        let registry = ListenerRegistry::new();
        let (failing_counts, failing) = counting();
        failing_counts.fail_next.store(true, Ordering::SeqCst);
        let (ok_counts, ok) = counting();
        registry.register(failing);
        registry.register(ok);

        registry.broadcast_connected();
        assert_eq!(failing_counts.connected.load(Ordering::SeqCst), 0);
        assert_eq!(ok_counts.connected.load(Ordering::SeqCst), 1);

        // The failing listener's cookie stayed unset, so the next pass
        // attempts it again; the healthy listener is not re-notified.
        registry.broadcast_connected();
        assert_eq!(failing_counts.connected.load(Ordering::SeqCst), 1);
        assert_eq!(ok_counts.connected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_reports_when_registry_drains() {
        let registry = ListenerRegistry::new();
        let (_, first) = counting();
        let (_, second) = counting();
        registry.register(Arc::clone(&first));
        registry.register(Arc::clone(&second));

        assert!(!registry.unregister(&first));
        assert!(registry.unregister(&second));
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_registrations_are_separate_entries() {
        let registry = ListenerRegistry::new();
        let (counts, listener) = counting();
        registry.register(Arc::clone(&listener));
        registry.register(Arc::clone(&listener));
        assert_eq!(registry.len(), 2);

        registry.broadcast_connected();
        assert_eq!(counts.connected.load(Ordering::SeqCst), 2);

        // Unregister removes one entry at a time.
        assert!(!registry.unregister(&listener));
        assert!(registry.unregister(&listener));
    }

    #[test]
    fn unregister_of_unknown_listener_reports_emptiness_only() {
        let registry = ListenerRegistry::new();
        let (_, known) = counting();
        let (_, unknown) = counting();
        registry.register(known);
        assert!(!registry.unregister(&unknown));
        assert_eq!(registry.len(), 1);
    }
}
