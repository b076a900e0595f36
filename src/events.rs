//! Explicit pub/sub event bus.
//!
//! Widgets and tool windows subscribe to engine events instead of
//! observing state through implicit scope propagation. Publishing is
//! synchronous and single-threaded: subscribers run before `publish`
//! returns, on the engine thread.

use std::cell::RefCell;
use std::rc::Rc;

use uuid::Uuid;

use crate::model::LayerId;

/// Connection status of the streaming job channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Channel is connected and delivering messages.
    Connected,
    /// Channel dropped; the engine is retrying at a fixed interval.
    Reconnecting,
    /// Channel was closed explicitly and will not reconnect.
    Closed,
}

/// Events published by the engine.
#[derive(Debug, Clone)]
pub enum ViewerEvent {
    /// Membership or metadata of a selection changed.
    SelectionChanged {
        /// Object type owning the selection.
        object_type: String,
        /// Id of the changed selection.
        selection_id: u32,
    },
    /// The globally active selection changed (or was cleared).
    ActiveSelectionChanged {
        /// Object type of the newly active selection, if any.
        object_type: Option<String>,
        /// Id of the newly active selection, if any.
        selection_id: Option<u32>,
    },
    /// Marker-pick mode was toggled.
    MarkerModeChanged {
        /// New mode state.
        active: bool,
    },
    /// A layer was attached to the viewport.
    LayerAdded {
        /// Id of the new layer.
        layer_id: LayerId,
    },
    /// A layer was detached from the viewport.
    LayerRemoved {
        /// Id of the removed layer.
        layer_id: LayerId,
    },
    /// A tool request left the engine; bounds the running indicator.
    ToolRequestSent {
        /// Session the request belongs to.
        session: Uuid,
        /// Engine-assigned request id.
        request_id: u64,
    },
    /// A tool request settled (success or failure).
    ToolRequestDone {
        /// Session the request belongs to.
        session: Uuid,
        /// Engine-assigned request id.
        request_id: u64,
        /// Whether the request produced a response.
        success: bool,
    },
    /// A tool result was attached to the viewer.
    ResultAttached {
        /// Id of the new result.
        result_id: u64,
    },
    /// The streaming job channel changed connection status.
    StreamStatusChanged {
        /// New status.
        status: StreamStatus,
    },
    /// A streaming message updated the state of one job.
    JobUpdated {
        /// Id of the updated job.
        job_id: u64,
    },
}

/// Token returned by [`EventBus::subscribe`]; pass to
/// [`EventBus::unsubscribe`] to remove the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber = Rc<dyn Fn(&ViewerEvent)>;

/// Single-threaded publish/subscribe bus for [`ViewerEvent`]s.
#[derive(Default)]
pub struct EventBus {
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber)>>,
    next_id: RefCell<u64>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; it runs on every subsequent publish until
    /// unsubscribed.
    pub fn subscribe(&self, subscriber: impl Fn(&ViewerEvent) + 'static) -> SubscriptionId {
        let mut next_id = self.next_id.borrow_mut();
        let id = SubscriptionId(*next_id);
        *next_id += 1;
        self.subscribers.borrow_mut().push((id, Rc::new(subscriber)));
        id
    }

    /// Remove a subscriber. Unknown tokens are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.borrow_mut().retain(|(sid, _)| *sid != id);
    }

    /// Deliver an event to all current subscribers.
    ///
    /// Subscribers are snapshotted before delivery, so a subscriber may
    /// subscribe or unsubscribe from within its callback.
    pub fn publish(&self, event: &ViewerEvent) {
        let snapshot: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, subscriber)| Rc::clone(subscriber))
            .collect();
        for subscriber in snapshot {
            subscriber(event);
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_publish_reaches_subscribers() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0));

        let count_clone = Rc::clone(&count);
        bus.subscribe(move |_| count_clone.set(count_clone.get() + 1));

        bus.publish(&ViewerEvent::MarkerModeChanged { active: true });
        bus.publish(&ViewerEvent::MarkerModeChanged { active: false });
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0));

        let count_clone = Rc::clone(&count);
        let id = bus.subscribe(move |_| count_clone.set(count_clone.get() + 1));

        bus.publish(&ViewerEvent::MarkerModeChanged { active: true });
        bus.unsubscribe(id);
        bus.publish(&ViewerEvent::MarkerModeChanged { active: false });
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_subscribe_from_callback_does_not_panic() {
        let bus = Rc::new(EventBus::new());
        let bus_clone = Rc::clone(&bus);
        bus.subscribe(move |_| {
            bus_clone.subscribe(|_| {});
        });
        bus.publish(&ViewerEvent::MarkerModeChanged { active: true });
        assert_eq!(bus.subscriber_count(), 2);
    }
}
