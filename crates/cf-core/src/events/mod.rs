use std::sync::Arc;
use parking_lot::Mutex;
use ahash::AHashMap;

/// Typed publish/subscribe bus shared by one dataset and its widgets
///
/// Handlers run synchronously inside `publish`, outside the subscriber map
/// lock, so a handler may publish other events or subscribe on the same bus.
/// A handler that publishes its own event type deadlocks on itself.
pub struct EventBus {
    handlers: Arc<Mutex<AHashMap<std::any::TypeId, Vec<SharedHandler>>>>,
}

type SharedHandler = Arc<Mutex<Box<dyn EventHandler>>>;

/// Event trait that all events must implement
pub trait Event: Send + Sync + 'static {
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&mut self, event: &dyn Event);
}

/// Events raised by the query engine and the coordinator
pub mod events {
    use super::Event;
    use crate::coordinator::PassKind;

    /// A dimension's filter slot went from empty to non-empty
    #[derive(Debug, Clone)]
    pub struct FilterApplied {
        pub slot: u64,
        pub filter: String,
    }

    /// A dimension's filter slot went from non-empty to empty
    #[derive(Debug, Clone)]
    pub struct FilterCleared {
        pub slot: u64,
    }

    /// Column metadata of a dataset was (re)loaded
    #[derive(Debug, Clone)]
    pub struct DataSetLoaded {
        pub tables: Vec<String>,
        pub column_count: usize,
    }

    /// Every widget of a pass reported back
    #[derive(Debug, Clone)]
    pub struct PassCompleted {
        pub kind: PassKind,
        pub group: String,
        pub token: u64,
    }

    // Implement Event trait for all event types
    macro_rules! impl_event {
        ($($t:ty),*) => {
            $(
                impl Event for $t {
                    fn as_any(&self) -> &dyn std::any::Any {
                        self
                    }
                }
            )*
        }
    }

    impl_event!(
        FilterApplied,
        FilterCleared,
        DataSetLoaded,
        PassCompleted
    );
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(AHashMap::new())),
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<E: Event>(&self, handler: Box<dyn EventHandler>) {
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();
        handlers
            .entry(type_id)
            .or_insert_with(Vec::new)
            .push(Arc::new(Mutex::new(handler)));
    }

    /// Publish an event
    pub fn publish<E: Event>(&self, event: E) {
        let type_id = std::any::TypeId::of::<E>();
        let matching: Vec<SharedHandler> = self
            .handlers
            .lock()
            .get(&type_id)
            .cloned()
            .unwrap_or_default();

        for handler in matching {
            handler.lock().handle(&event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: FnMut(&dyn Event) + Send + Sync,
{
    fn handle(&mut self, event: &dyn Event) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Box<dyn EventHandler>
where
    F: FnMut(&dyn Event) + Send + Sync + 'static,
{
    Box::new(ClosureEventHandler { handler: f })
}

#[cfg(test)]
mod tests {
    use super::events::{FilterApplied, FilterCleared};
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_reaches_only_matching_subscribers() {
        let bus = EventBus::new();
        let applied = Arc::new(AtomicUsize::new(0));
        let seen = applied.clone();
        bus.subscribe::<FilterApplied>(handler_from_fn(move |event| {
            if let Some(e) = event.as_any().downcast_ref::<FilterApplied>() {
                assert_eq!(e.slot, 3);
                seen.fetch_add(1, Ordering::SeqCst);
            }
        }));

        bus.publish(FilterApplied { slot: 3, filter: "a = 1".into() });
        bus.publish(FilterCleared { slot: 3 });

        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_publish_and_subscribe_on_the_same_bus() {
        let bus = Arc::new(EventBus::new());
        let cleared = Arc::new(AtomicUsize::new(0));

        let inner_bus = bus.clone();
        let inner_seen = cleared.clone();
        bus.subscribe::<FilterApplied>(handler_from_fn(move |event| {
            if let Some(e) = event.as_any().downcast_ref::<FilterApplied>() {
                inner_bus.publish(FilterCleared { slot: e.slot });
                let seen = inner_seen.clone();
                inner_bus.subscribe::<FilterCleared>(handler_from_fn(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }));
            }
        }));

        bus.publish(FilterApplied { slot: 1, filter: "a = 1".into() });
        // subscribed after the first FilterCleared went out
        assert_eq!(cleared.load(Ordering::SeqCst), 0);

        bus.publish(FilterCleared { slot: 1 });
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }
}
