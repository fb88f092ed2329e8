use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use crate::hub::{EventHub, EventKind, ObjectId};

/// Owning handle to a reactor resource registered with the hub
///
/// The surrounding application (or the reactor itself) owns the resource
/// through clones of this handle; wait operations only ever observe it
/// through a [`WatchHandle`]. Dropping the last owner wakes every listener so
/// a suspended wait can resume with a dropped-object failure instead of
/// hanging.
#[must_use]
pub struct Watched<T> {
    inner: Rc<Inner<T>>,
}

struct Inner<T> {
    hub: Rc<EventHub>,
    id: ObjectId,
    value: RefCell<T>,
}

impl<T> Watched<T> {
    pub fn new(hub: Rc<EventHub>, value: T) -> Self {
        let id = hub.register_object();
        Self {
            inner: Rc::new(Inner {
                hub,
                id,
                value: RefCell::new(value),
            }),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub(crate) fn hub(&self) -> &Rc<EventHub> {
        &self.inner.hub
    }

    /// Create a non-owning observer for wait operations
    pub fn observe(&self) -> WatchHandle<T> {
        WatchHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Inspect or mutate the resource
    ///
    /// # Panics
    ///
    /// If the value is currently borrowed by a wait operation being polled
    pub fn with<R>(&self, body: impl FnOnce(&mut T) -> R) -> R {
        body(&mut self.inner.value.borrow_mut())
    }

    /// Deliver a notification for this object to the hub
    pub fn emit(&self, kind: EventKind) -> usize {
        self.inner.hub.emit(self.inner.id, kind)
    }
}

impl<T> Clone for Watched<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        self.hub.invalidate(self.id);
    }
}

/// Non-owning observer held by wait operations
///
/// Never extends the resource's lifetime; a failed upgrade is the terminal
/// "object dropped" condition.
pub struct WatchHandle<T> {
    inner: Weak<Inner<T>>,
}

impl<T> WatchHandle<T> {
    pub(crate) fn upgrade(&self) -> Option<WatchRef<T>> {
        self.inner.upgrade().map(|inner| WatchRef { inner })
    }
}

impl<T> Clone for WatchHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Short-lived strong reference taken for the duration of a single poll
pub(crate) struct WatchRef<T> {
    inner: Rc<Inner<T>>,
}

impl<T> WatchRef<T> {
    pub(crate) fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub(crate) fn with<R>(&self, body: impl FnOnce(&mut T) -> R) -> R {
        body(&mut self.inner.value.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_does_not_keep_the_object_alive() {
        let hub = Rc::new(EventHub::new());
        let watched = Watched::new(hub, 7_u32);
        let handle = watched.observe();

        assert!(handle.upgrade().is_some());
        drop(watched);
        assert!(handle.upgrade().is_none());
    }

    #[test]
    fn clones_share_ownership() {
        let hub = Rc::new(EventHub::new());
        let watched = Watched::new(hub, String::from("alive"));
        let second_owner = watched.clone();
        let handle = watched.observe();

        drop(watched);
        assert!(handle.upgrade().is_some());
        second_owner.with(|value| value.push_str(" still"));
        assert_eq!(second_owner.with(|value| value.clone()), "alive still");
    }

    #[test]
    fn dropping_the_owner_wakes_listeners() {
        let hub = Rc::new(EventHub::new());
        let watched = Watched::new(hub.clone(), ());
        let subscription =
            hub.subscribe(watched.id(), EventKind::ReadyRead, &noop_waker::noop_waker());

        // invalidation wakes but does not mark events as fired
        drop(watched);
        assert!(!hub.take_fired(subscription));
        hub.unsubscribe(subscription);
    }
}
