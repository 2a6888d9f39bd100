//! Window-level event fan-out.
//!
//! The preview window publishes pointer, resize and visibility events into an
//! [`EventHub`]; every mounted effect holds a scoped [`Subscription`] and reads
//! what it received from its own [`Inbox`] at the start of its next frame.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

/// Pointer position in logical window pixels, with the viewport it was
/// observed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub client_x: f64,
    pub client_y: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    PointerMoved(PointerEvent),
    /// The window (and therefore every full-bleed container) changed size or
    /// scale factor. Containers are re-measured when this is consumed.
    Resized,
    VisibilityChanged(bool),
}

type Queue = Rc<RefCell<VecDeque<HostEvent>>>;

#[derive(Default)]
pub struct EventHub {
    next_id: Cell<u64>,
    subscribers: RefCell<Vec<(u64, Weak<RefCell<VecDeque<HostEvent>>>)>>,
}

impl EventHub {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn subscribe(self: &Rc<Self>) -> (Subscription, Inbox) {
        let id = self.next_id.get().wrapping_add(1);
        self.next_id.set(id);
        let queue: Queue = Rc::new(RefCell::new(VecDeque::new()));
        self.subscribers
            .borrow_mut()
            .push((id, Rc::downgrade(&queue)));
        tracing::trace!(id, "event subscription added");
        (
            Subscription {
                hub: Rc::downgrade(self),
                id,
                active: true,
            },
            Inbox { queue },
        )
    }

    pub fn publish(&self, event: HostEvent) {
        let mut subscribers = self.subscribers.borrow_mut();
        subscribers.retain(|(_, queue)| match queue.upgrade() {
            Some(queue) => {
                queue.borrow_mut().push_back(event);
                true
            }
            None => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|(_, queue)| queue.strong_count() > 0)
            .count()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .borrow_mut()
            .retain(|(existing, _)| *existing != id);
        tracing::trace!(id, "event subscription released");
    }
}

/// Scoped registration with an [`EventHub`]; released on drop.
pub struct Subscription {
    hub: Weak<EventHub>,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct Inbox {
    queue: Queue,
}

impl Inbox {
    pub fn drain(&self) -> Vec<HostEvent> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pointer(x: f64, y: f64) -> HostEvent {
        HostEvent::PointerMoved(PointerEvent {
            client_x: x,
            client_y: y,
            viewport_width: 100.0,
            viewport_height: 100.0,
        })
    }

    #[test]
    fn events_fan_out_to_every_subscriber() {
        let hub = EventHub::new();
        let (_first, first_inbox) = hub.subscribe();
        let (_second, second_inbox) = hub.subscribe();
        hub.publish(pointer(1.0, 2.0));
        hub.publish(HostEvent::VisibilityChanged(false));
        assert_eq!(first_inbox.drain(), vec![pointer(1.0, 2.0), HostEvent::VisibilityChanged(false)]);
        assert_eq!(second_inbox.len(), 2);
        assert!(first_inbox.is_empty());
    }

    #[test]
    fn dropping_a_subscription_unsubscribes() {
        let hub = EventHub::new();
        let (subscription, inbox) = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(subscription);
        assert_eq!(hub.subscriber_count(), 0);
        hub.publish(HostEvent::Resized);
        assert!(inbox.is_empty());
    }

    #[test]
    fn release_is_idempotent() {
        let hub = EventHub::new();
        let (mut subscription, _inbox) = hub.subscribe();
        let (_other, _other_inbox) = hub.subscribe();
        subscription.release();
        subscription.release();
        assert!(!subscription.is_active());
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn dropped_inbox_is_not_kept_alive() {
        let hub = EventHub::new();
        let (_subscription, inbox) = hub.subscribe();
        drop(inbox);
        hub.publish(HostEvent::Resized);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_hub_releases_quietly() {
        let hub = EventHub::new();
        let (mut subscription, _inbox) = hub.subscribe();
        drop(hub);
        subscription.release();
        assert!(!subscription.is_active());
    }
}
