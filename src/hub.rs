use std::{
    cell::{Cell, RefCell},
    task::Waker,
    time::Duration,
};

use slab::Slab;
use tracing::trace;

use crate::clock::{TimeSource, WallClock};

/// Identity of a watched object registered with the hub
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[must_use]
pub struct ObjectId(u64);

/// Live registration between a reactor event and a waker
#[derive(Clone, Copy, Debug)]
#[must_use]
pub struct SubscriptionId(usize);

/// Handle to an armed timeout timer
#[derive(Clone, Copy, Debug)]
#[must_use]
pub struct TimerId(usize);

/// Kinds of notifications the reactor can deliver for a watched object
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EventKind {
    /// The object's connection state machine moved
    StateChanged,
    /// New bytes arrived in the object's read buffer
    ReadyRead,
    /// Queued bytes were flushed out of the write buffer
    BytesWritten,
    /// The object reported an explicit disconnect
    Disconnected,
    /// A pending remote call finished
    CallFinished,
}

/// Notification hub the external event loop drives
///
/// The hub is the crate-side half of the reactor contract: the reactor (or a
/// test driver) reports state changes through [`EventHub::emit`] and advances
/// timers through [`EventHub::tick`], while wait operations register their
/// wakers through subscriptions. Everything is single threaded; the hub is
/// deliberately `!Send`.
#[must_use]
pub struct EventHub {
    clock: Box<dyn TimeSource>,
    listeners: RefCell<Slab<Listener>>,
    timers: RefCell<Slab<TimerEntry>>,
    next_object: Cell<u64>,
    subscriptions_created: Cell<u64>,
    timers_started: Cell<u64>,
}

struct Listener {
    object: ObjectId,
    kind: EventKind,
    waker: Waker,
    fired: bool,
}

struct TimerEntry {
    deadline: u64,
    waker: Waker,
    fired: bool,
}

impl EventHub {
    /// Create a hub running against the wall clock
    pub fn new() -> Self {
        Self::with_clock(WallClock::new())
    }

    /// Create a hub running against a custom time source
    pub fn with_clock(clock: impl TimeSource + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            listeners: RefCell::new(Slab::new()),
            timers: RefCell::new(Slab::new()),
            next_object: Cell::new(0),
            subscriptions_created: Cell::new(0),
            timers_started: Cell::new(0),
        }
    }

    pub(crate) fn register_object(&self) -> ObjectId {
        let id = self.next_object.get();
        self.next_object.set(id + 1);
        ObjectId(id)
    }

    /// Register a waker for the next matching event on the object
    pub fn subscribe(&self, object: ObjectId, kind: EventKind, waker: &Waker) -> SubscriptionId {
        self.subscriptions_created
            .set(self.subscriptions_created.get() + 1);

        let index = self.listeners.borrow_mut().insert(Listener {
            object,
            kind,
            waker: waker.clone(),
            fired: false,
        });

        trace!(?object, ?kind, index, "subscribed");
        SubscriptionId(index)
    }

    /// Update the waker stored for a live subscription
    ///
    /// # Panics
    ///
    /// If the subscription was already torn down
    pub fn refresh(&self, subscription: SubscriptionId, waker: &Waker) {
        let mut guard = self.listeners.borrow_mut();
        let listener = guard.get_mut(subscription.0).unwrap();

        if !listener.waker.will_wake(waker) {
            waker.clone_into(&mut listener.waker);
        }
    }

    /// Check and reset the fired flag of a subscription
    ///
    /// # Panics
    ///
    /// If the subscription was already torn down
    pub fn take_fired(&self, subscription: SubscriptionId) -> bool {
        let mut guard = self.listeners.borrow_mut();
        let listener = guard.get_mut(subscription.0).unwrap();
        std::mem::take(&mut listener.fired)
    }

    /// Tear down a subscription; a no-op when already gone
    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        self.listeners.borrow_mut().try_remove(subscription.0);
    }

    /// Deliver an event to every listener of the object, returning how many
    /// were woken
    pub fn emit(&self, object: ObjectId, kind: EventKind) -> usize {
        let wakers: Vec<Waker> = {
            let mut guard = self.listeners.borrow_mut();
            guard
                .iter_mut()
                .filter(|(_, listener)| listener.object == object && listener.kind == kind)
                .map(|(_, listener)| {
                    listener.fired = true;
                    listener.waker.clone()
                })
                .collect()
        };

        trace!(?object, ?kind, delivered = wakers.len(), "emit");

        let delivered = wakers.len();
        for waker in wakers {
            waker.wake();
        }

        delivered
    }

    /// Wake everything observing the object; called when its owner drops it
    pub(crate) fn invalidate(&self, object: ObjectId) {
        let wakers: Vec<Waker> = {
            let guard = self.listeners.borrow();
            guard
                .iter()
                .filter(|(_, listener)| listener.object == object)
                .map(|(_, listener)| listener.waker.clone())
                .collect()
        };

        trace!(?object, listeners = wakers.len(), "object invalidated");

        for waker in wakers {
            waker.wake();
        }
    }

    /// Arm a timer expiring after the duration, measured on the hub's clock
    pub fn start_timer(&self, duration: Duration, waker: &Waker) -> TimerId {
        self.timers_started.set(self.timers_started.get() + 1);

        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let deadline = self.clock.now().saturating_add(millis);

        let index = self.timers.borrow_mut().insert(TimerEntry {
            deadline,
            waker: waker.clone(),
            fired: false,
        });

        trace!(index, deadline, "timer armed");
        TimerId(index)
    }

    /// Whether the timer has expired
    ///
    /// # Panics
    ///
    /// If the timer was already cancelled
    pub fn timer_fired(&self, timer: TimerId) -> bool {
        self.timers.borrow().get(timer.0).unwrap().fired
    }

    /// Disarm a timer; a no-op when already gone, even if it fired
    pub fn cancel_timer(&self, timer: TimerId) {
        self.timers.borrow_mut().try_remove(timer.0);
    }

    /// Expire due timers and wake their owners
    ///
    /// The event loop calls this once per turn, after delivering events.
    pub fn tick(&self) {
        let now = self.clock.now();

        let wakers: Vec<Waker> = {
            let mut guard = self.timers.borrow_mut();
            guard
                .iter_mut()
                .filter(|(_, timer)| !timer.fired && timer.deadline <= now)
                .map(|(_, timer)| {
                    timer.fired = true;
                    timer.waker.clone()
                })
                .collect()
        };

        if !wakers.is_empty() {
            trace!(now, expired = wakers.len(), "timers expired");
        }

        for waker in wakers {
            waker.wake();
        }
    }

    /// Number of currently live subscriptions
    pub fn active_subscriptions(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Number of currently armed timers
    pub fn active_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Total subscriptions ever created
    pub fn subscriptions_created(&self) -> u64 {
        self.subscriptions_created.get()
    }

    /// Total timers ever armed
    pub fn timers_started(&self) -> u64 {
        self.timers_started.get()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
