use std::{
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
    time::Duration,
};

use tracing::debug;

use crate::{
    error::{WaitError, WaitResult},
    hub::{EventHub, EventKind, SubscriptionId, TimerId},
    watch::{WatchHandle, Watched},
};

/// Timeout applied when a wait operation does not specify one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Optional deadline for a wait operation
///
/// Zero or negative millisecond values mean "wait indefinitely", matching the
/// convention of the callback APIs this crate adapts.
#[derive(Clone, Copy, Debug)]
#[must_use]
pub struct Timeout(Option<Duration>);

impl Timeout {
    /// The 30 second default
    pub const DEFAULT: Self = Self(Some(DEFAULT_TIMEOUT));

    /// Wait indefinitely
    pub const NONE: Self = Self(None);

    pub fn from_millis(millis: i64) -> Self {
        match u64::try_from(millis) {
            Ok(0) | Err(_) => Self::NONE,
            Ok(millis) => Self(Some(Duration::from_millis(millis))),
        }
    }

    pub(crate) fn duration(self) -> Option<Duration> {
        self.0
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            Self::NONE
        } else {
            Self(Some(duration))
        }
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Self::NONE, Self::from)
    }
}

/// What a fired event means for a suspended wait
pub enum Verdict<T> {
    /// The condition resolved; tear everything down and resume with this
    Resume(T),
    /// Still progressing; stay suspended
    KeepWaiting,
}

/// One wait flavor: a ready-predicate, the events it listens to while
/// suspended, and the decision taken when one of them fires
///
/// Flavors plug into the single [`WaitOperation`] engine instead of each
/// reimplementing suspension, timeout arming, and teardown.
pub trait WaitCondition {
    /// Watched object type
    type Target;
    /// Value produced on success
    type Output;

    /// Fast path: if the target condition already holds, produce the result
    /// without suspending
    fn check(&mut self, target: &mut Self::Target) -> Option<WaitResult<Self::Output>>;

    /// Events subscribed to while suspended
    fn interests(&self) -> &'static [EventKind];

    /// Decide whether a fired event resolves the wait
    fn interpret(
        &mut self,
        target: &mut Self::Target,
        kind: EventKind,
    ) -> Verdict<WaitResult<Self::Output>>;
}

/// Generic suspend/resume engine behind every awaitable in this crate
///
/// Lifecycle: first poll either resolves on the spot (no subscription, no
/// timer) or subscribes the condition's interests, arms the timeout, and
/// suspends. A later poll resolves on whichever of {interest, timer,
/// object dropped} fired first; all registrations are torn down before the
/// result is returned, so at most one resumption can ever be observed.
#[must_use]
pub struct WaitOperation<C: WaitCondition> {
    hub: Rc<EventHub>,
    target: WatchHandle<C::Target>,
    condition: C,
    timeout: Timeout,
    phase: Phase,
}

enum Phase {
    Idle,
    Suspended {
        subscriptions: Vec<(EventKind, SubscriptionId)>,
        timer: Option<TimerId>,
    },
    Resumed,
}

impl<C: WaitCondition> WaitOperation<C> {
    pub fn new(watched: &Watched<C::Target>, condition: C, timeout: Timeout) -> Self {
        Self::from_parts(watched.hub().clone(), watched.observe(), condition, timeout)
    }

    pub(crate) fn from_parts(
        hub: Rc<EventHub>,
        target: WatchHandle<C::Target>,
        condition: C,
        timeout: Timeout,
    ) -> Self {
        Self {
            hub,
            target,
            condition,
            timeout,
            phase: Phase::Idle,
        }
    }
}

// The engine never projects a pin into its condition, so pinning is not
// structural for any field.
impl<C: WaitCondition> Unpin for WaitOperation<C> {}

impl<C: WaitCondition> Future for WaitOperation<C> {
    type Output = WaitResult<C::Output>;

    fn poll(self: Pin<&mut Self>, context: &mut Context) -> Poll<Self::Output> {
        let this = self.get_mut();

        match &this.phase {
            Phase::Idle => {
                let Some(target) = this.target.upgrade() else {
                    this.phase = Phase::Resumed;
                    return Poll::Ready(Err(WaitError::ObjectDropped));
                };

                if let Some(result) = target.with(|value| this.condition.check(value)) {
                    this.phase = Phase::Resumed;
                    return Poll::Ready(result);
                }

                let subscriptions: Vec<_> = this
                    .condition
                    .interests()
                    .iter()
                    .map(|&kind| (kind, this.hub.subscribe(target.id(), kind, context.waker())))
                    .collect();

                // the timer is armed strictly after the interests are live so
                // it can never outlive a synchronously completed wait
                let timer = this
                    .timeout
                    .duration()
                    .map(|duration| this.hub.start_timer(duration, context.waker()));

                debug!(interests = subscriptions.len(), "wait suspended");
                this.phase = Phase::Suspended {
                    subscriptions,
                    timer,
                };
                Poll::Pending
            }
            Phase::Suspended {
                subscriptions,
                timer,
            } => {
                let subscriptions = subscriptions.clone();
                let timer = *timer;

                let Some(target) = this.target.upgrade() else {
                    teardown(&this.hub, &subscriptions, timer);
                    this.phase = Phase::Resumed;
                    debug!("wait resumed: watched object dropped");
                    return Poll::Ready(Err(WaitError::ObjectDropped));
                };

                // interests are consulted before the timer so a completion
                // that raced the deadline into the same tick still wins
                for &(kind, subscription) in &subscriptions {
                    if !this.hub.take_fired(subscription) {
                        continue;
                    }

                    if let Verdict::Resume(result) =
                        target.with(|value| this.condition.interpret(value, kind))
                    {
                        teardown(&this.hub, &subscriptions, timer);
                        this.phase = Phase::Resumed;
                        debug!(?kind, "wait resumed");
                        return Poll::Ready(result);
                    }
                }

                if let Some(timer_id) = timer {
                    if this.hub.timer_fired(timer_id) {
                        teardown(&this.hub, &subscriptions, timer);
                        this.phase = Phase::Resumed;
                        debug!("wait resumed: timeout");
                        return Poll::Ready(Err(WaitError::TimedOut));
                    }
                }

                for &(_, subscription) in &subscriptions {
                    this.hub.refresh(subscription, context.waker());
                }

                Poll::Pending
            }
            Phase::Resumed => panic!("wait operation polled after completion"),
        }
    }
}

impl<C: WaitCondition> Drop for WaitOperation<C> {
    fn drop(&mut self) {
        if let Phase::Suspended {
            subscriptions,
            timer,
        } = &self.phase
        {
            teardown(&self.hub, subscriptions, *timer);
        }
    }
}

fn teardown(hub: &EventHub, subscriptions: &[(EventKind, SubscriptionId)], timer: Option<TimerId>) {
    for &(_, subscription) in subscriptions {
        hub.unsubscribe(subscription);
    }

    if let Some(timer) = timer {
        hub.cancel_timer(timer);
    }
}

/// Stream of event notifications for a watched object
///
/// Ends when the object is dropped. Notifications are level-triggered, not
/// queued: any number of deliveries between two polls coalesce into a single
/// item, the same way a stored callback invocation observes only "it fired".
pub fn events<T>(watched: &Watched<T>, kind: EventKind) -> Events<T> {
    Events {
        hub: watched.hub().clone(),
        target: watched.observe(),
        kind,
        subscription: None,
        done: false,
    }
}

#[must_use]
pub struct Events<T> {
    hub: Rc<EventHub>,
    target: WatchHandle<T>,
    kind: EventKind,
    subscription: Option<SubscriptionId>,
    done: bool,
}

impl<T> Unpin for Events<T> {}

impl<T> futures_core::Stream for Events<T> {
    type Item = EventKind;

    fn poll_next(self: Pin<&mut Self>, context: &mut Context) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        let Some(target) = this.target.upgrade() else {
            if let Some(subscription) = this.subscription.take() {
                this.hub.unsubscribe(subscription);
            }

            this.done = true;
            return Poll::Ready(None);
        };

        match this.subscription {
            None => {
                this.subscription =
                    Some(this.hub.subscribe(target.id(), this.kind, context.waker()));
                Poll::Pending
            }
            Some(subscription) => {
                this.hub.refresh(subscription, context.waker());

                if this.hub.take_fired(subscription) {
                    Poll::Ready(Some(this.kind))
                } else {
                    Poll::Pending
                }
            }
        }
    }
}

impl<T> Drop for Events<T> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.hub.unsubscribe(subscription);
        }
    }
}
