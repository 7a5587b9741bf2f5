//! Model lifecycle events and observers
//!
//! Observers are registered per model type with [`observe`] or per entity
//! with `Entity::observe`. Hooks run synchronously in registration order and
//! cannot cancel the operation that triggered them.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::model::{Entity, Model};

/// Named points in an entity's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Initialized,
    Saving,
    Creating,
    Created,
    Updating,
    Updated,
    Saved,
}

/// Receives lifecycle notifications; every hook defaults to a no-op
pub trait ModelObserver: Send + Sync {
    fn initialized(&self, _model: &Entity) {}

    fn saving(&self, _model: &mut Entity) {}

    fn creating(&self, _model: &mut Entity) {}

    fn created(&self, _model: &Entity) {}

    fn updating(&self, _model: &mut Entity) {}

    fn updated(&self, _model: &Entity) {}

    fn saved(&self, _model: &Entity) {}
}

static OBSERVERS: Lazy<DashMap<TypeId, Vec<Arc<dyn ModelObserver>>>> = Lazy::new(DashMap::new);

/// Register an observer for every entity of `M` created afterwards
pub fn observe<M: Model>(observer: impl ModelObserver + 'static) {
    OBSERVERS
        .entry(TypeId::of::<M>())
        .or_default()
        .push(Arc::new(observer));
}

/// Remove every observer registered for `M`
pub fn clear_observers<M: Model>() {
    OBSERVERS.remove(&TypeId::of::<M>());
}

/// Per-entity list of observers
#[derive(Clone, Default)]
pub struct EventDispatcher {
    observers: Vec<Arc<dyn ModelObserver>>,
}

impl EventDispatcher {
    /// Snapshot of the observers registered for a model type
    pub(crate) fn for_type(type_id: TypeId) -> Self {
        Self {
            observers: OBSERVERS
                .get(&type_id)
                .map(|entry| entry.value().clone())
                .unwrap_or_default(),
        }
    }

    pub fn add(&mut self, observer: Arc<dyn ModelObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Notify every observer of `event`
    pub fn fire(&self, event: LifecycleEvent, model: &mut Entity) {
        tracing::trace!("Firing {:?} on {}", event, model.class_name());
        for observer in &self.observers {
            match event {
                LifecycleEvent::Initialized => observer.initialized(model),
                LifecycleEvent::Saving => observer.saving(model),
                LifecycleEvent::Creating => observer.creating(model),
                LifecycleEvent::Created => observer.created(model),
                LifecycleEvent::Updating => observer.updating(model),
                LifecycleEvent::Updated => observer.updated(model),
                LifecycleEvent::Saved => observer.saved(model),
            }
        }
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Ticket;

    impl Model for Ticket {
        fn table_name() -> &'static str {
            "tickets"
        }
    }

    #[derive(Clone, Default)]
    struct Tracker {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl ModelObserver for Tracker {
        fn initialized(&self, _model: &Entity) {
            self.events.lock().unwrap().push("initialized".to_string());
        }

        fn creating(&self, model: &mut Entity) {
            model.set("status", "open").unwrap();
            self.events.lock().unwrap().push("creating".to_string());
        }
    }

    #[test]
    fn test_type_observers_are_snapshotted() {
        let tracker = Tracker::default();
        observe::<Ticket>(tracker.clone());

        let mut ticket = Entity::new::<Ticket>();
        assert_eq!(*tracker.events.lock().unwrap(), vec!["initialized"]);

        let dispatcher = EventDispatcher::for_type(TypeId::of::<Ticket>());
        dispatcher.fire(LifecycleEvent::Creating, &mut ticket);
        assert_eq!(
            ticket.get_attribute("status").unwrap(),
            Some(serde_json::json!("open"))
        );

        clear_observers::<Ticket>();
        assert!(EventDispatcher::for_type(TypeId::of::<Ticket>()).is_empty());
    }
}
