//! Synchronous change notification for a [`Store`](crate::store::Store).
//!
//! Every successful mutation emits one or more [`StoreEvent`]s, delivered
//! immediately after the mutation completes. Subscribers run in
//! `(priority, insertion order)` order and may carry a filter predicate.
//!
//! Subscribers only see `&StoreEvent`; they cannot reach the store that
//! emitted the event.

use crate::id::{ObjectHandle, ObjectTypeId, SubscriptionId};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    ObjectAdded {
        handle: ObjectHandle,
        type_id: ObjectTypeId,
    },
    ObjectRemoved {
        handle: ObjectHandle,
        type_id: ObjectTypeId,
        /// True when removed as part of a cascade rather than directly.
        cascaded: bool,
    },
    FieldChanged {
        handle: ObjectHandle,
        field: usize,
        old: Option<String>,
        new: Option<String>,
    },
    ObjectRenamed {
        handle: ObjectHandle,
        old: Option<String>,
        new: Option<String>,
    },
    /// A referencing field was rewritten to follow a rename.
    ReferenceRewritten {
        source: ObjectHandle,
        field: usize,
        target: ObjectHandle,
    },
    ExtensibleGroupsChanged {
        handle: ObjectHandle,
        groups: usize,
    },
    OrderChanged,
}

/// Discriminant tag for store events, used in filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreEventKind {
    ObjectAdded,
    ObjectRemoved,
    FieldChanged,
    ObjectRenamed,
    ReferenceRewritten,
    ExtensibleGroupsChanged,
    OrderChanged,
}

impl StoreEvent {
    pub fn kind(&self) -> StoreEventKind {
        match self {
            StoreEvent::ObjectAdded { .. } => StoreEventKind::ObjectAdded,
            StoreEvent::ObjectRemoved { .. } => StoreEventKind::ObjectRemoved,
            StoreEvent::FieldChanged { .. } => StoreEventKind::FieldChanged,
            StoreEvent::ObjectRenamed { .. } => StoreEventKind::ObjectRenamed,
            StoreEvent::ReferenceRewritten { .. } => StoreEventKind::ReferenceRewritten,
            StoreEvent::ExtensibleGroupsChanged { .. } => StoreEventKind::ExtensibleGroupsChanged,
            StoreEvent::OrderChanged => StoreEventKind::OrderChanged,
        }
    }

    /// The object the event is primarily about, if any.
    pub fn handle(&self) -> Option<ObjectHandle> {
        match self {
            StoreEvent::ObjectAdded { handle, .. }
            | StoreEvent::ObjectRemoved { handle, .. }
            | StoreEvent::FieldChanged { handle, .. }
            | StoreEvent::ObjectRenamed { handle, .. }
            | StoreEvent::ExtensibleGroupsChanged { handle, .. } => Some(*handle),
            StoreEvent::ReferenceRewritten { source, .. } => Some(*source),
            StoreEvent::OrderChanged => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber priorities & filters
// ---------------------------------------------------------------------------

/// A listener receives events read-only.
pub type Listener = Box<dyn FnMut(&StoreEvent)>;

/// Optional predicate that filters events for a subscriber.
pub type EventFilter = Box<dyn Fn(&StoreEvent) -> bool>;

/// Priority level for event subscribers. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubscriberPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct SubscriberEntry {
    id: SubscriptionId,
    listener: Listener,
    priority: SubscriberPriority,
    filter: Option<EventFilter>,
}

impl std::fmt::Debug for SubscriberEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberEntry")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field(
                "filter",
                &if self.filter.is_some() {
                    "Some(<fn>)"
                } else {
                    "None"
                },
            )
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Ordered subscriber list. Kept sorted by `(priority, id)`; ids are handed
/// out in increasing order, so equal priorities run in registration order.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<SubscriberEntry>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event with Normal priority and no filter.
    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        self.subscribe_filtered(SubscriberPriority::Normal, None, listener)
    }

    /// Subscribe with explicit priority and optional filter.
    pub fn subscribe_filtered(
        &mut self,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        listener: Listener,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let at = self
            .subscribers
            .partition_point(|entry| entry.priority <= priority);
        self.subscribers.insert(
            at,
            SubscriberEntry {
                id,
                listener,
                priority,
                filter,
            },
        );
        id
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|entry| entry.id != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver one event to every subscriber whose filter accepts it.
    pub fn dispatch(&mut self, event: &StoreEvent) {
        for entry in &mut self.subscribers {
            if let Some(ref filter) = entry.filter
                && !filter(event)
            {
                continue;
            }
            (entry.listener)(event);
        }
    }
}
