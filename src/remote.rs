use std::{
    future::Future,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    error::WaitResult,
    hub::EventKind,
    wait::{Timeout, Verdict, WaitCondition, WaitOperation},
    watch::Watched,
};

/// Watched-object contract for an in-flight remote call
pub trait PendingReply {
    /// Decoded value type of a successful reply
    type Value;

    /// Whether the reply already arrived (possibly before the caller ever
    /// suspended, e.g. a locally answered call)
    fn is_finished(&self) -> bool;

    /// Decode the finished reply
    ///
    /// A remote-side failure is decoded into [`crate::WaitError::Remote`]
    /// rather than escaping the resumption path.
    fn decode(&mut self) -> WaitResult<Self::Value>;
}

/// Interface capable of issuing asynchronous remote calls
///
/// `call` is an immediate, non-blocking request. A request the interface
/// cannot even send must come back as an already-finished reply carrying the
/// error, so the caller's single `await` still observes a well-defined
/// completion.
pub trait RemoteInterface {
    type Request;
    type Reply: PendingReply;

    fn call(&mut self, request: Self::Request) -> Watched<Self::Reply>;
}

/// Issue a call and await the decoded reply
///
/// The returned future shares ownership of the reply handle; pending replies
/// are reference counted, unlike sockets and devices which are only observed.
pub fn call<I: RemoteInterface>(
    interface: &mut I,
    request: I::Request,
    timeout: impl Into<Timeout>,
) -> PendingCall<I::Reply> {
    wait_for_reply(&interface.call(request), timeout)
}

/// Await an already-issued reply handle
pub fn wait_for_reply<R: PendingReply>(
    reply: &Watched<R>,
    timeout: impl Into<Timeout>,
) -> PendingCall<R> {
    PendingCall {
        operation: WaitOperation::new(reply, ReplyWait(PhantomData), timeout.into()),
        _reply: reply.clone(),
    }
}

/// Future resolving to the decoded reply value
#[must_use]
pub struct PendingCall<R: PendingReply> {
    operation: WaitOperation<ReplyWait<R>>,
    // keeps the reply alive for the duration of the wait
    _reply: Watched<R>,
}

impl<R: PendingReply> Future for PendingCall<R> {
    type Output = WaitResult<R::Value>;

    fn poll(self: Pin<&mut Self>, context: &mut Context) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().operation).poll(context)
    }
}

impl<R: PendingReply> Unpin for PendingCall<R> {}

/// Ready when the reply reports itself finished
#[must_use]
pub struct ReplyWait<R>(PhantomData<R>);

impl<R: PendingReply> WaitCondition for ReplyWait<R> {
    type Target = R;
    type Output = R::Value;

    fn check(&mut self, target: &mut R) -> Option<WaitResult<R::Value>> {
        target.is_finished().then(|| target.decode())
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::CallFinished]
    }

    fn interpret(&mut self, target: &mut R, _: EventKind) -> Verdict<WaitResult<R::Value>> {
        if target.is_finished() {
            Verdict::Resume(target.decode())
        } else {
            Verdict::KeepWaiting
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WaitError;
    use crate::hub::EventHub;
    use crate::sim::{SimRemote, SimReply};
    use crate::testing::poll_once;
    use std::rc::Rc;
    use std::task::Poll;

    #[test]
    fn finished_reply_resolves_without_suspending() {
        let hub = Rc::new(EventHub::new());
        let reply = Watched::new(hub.clone(), SimReply::finished(Ok("cached".into())));

        let mut call = std::pin::pin!(wait_for_reply(&reply, Timeout::DEFAULT));
        assert_eq!(
            poll_once(call.as_mut()),
            Poll::Ready(Ok(String::from("cached")))
        );
        assert_eq!(hub.subscriptions_created(), 0);
        assert_eq!(hub.timers_started(), 0);
    }

    #[test]
    fn reply_resumes_on_the_finished_notification() {
        let hub = Rc::new(EventHub::new());
        let mut remote = SimRemote::new(hub.clone());
        remote.respond_later("ping", Ok("pong".into()));

        let mut pending = std::pin::pin!(call(&mut remote, "ping".into(), Timeout::DEFAULT));
        assert!(poll_once(pending.as_mut()).is_pending());

        remote.deliver();
        assert_eq!(
            poll_once(pending.as_mut()),
            Poll::Ready(Ok(String::from("pong")))
        );
        assert_eq!(hub.active_subscriptions(), 0);
        assert_eq!(hub.active_timers(), 0);
    }

    #[test]
    fn remote_failure_is_decoded_not_thrown() {
        let hub = Rc::new(EventHub::new());
        let mut remote = SimRemote::new(hub);
        remote.respond_later("divide", Err(WaitError::remote("sim.DivByZero", "by zero")));

        let mut pending = std::pin::pin!(call(&mut remote, "divide".into(), Timeout::DEFAULT));
        assert!(poll_once(pending.as_mut()).is_pending());

        remote.deliver();
        assert_eq!(
            poll_once(pending.as_mut()),
            Poll::Ready(Err(WaitError::remote("sim.DivByZero", "by zero")))
        );
    }

    #[test]
    fn malformed_request_short_circuits_to_an_error_reply() {
        let hub = Rc::new(EventHub::new());
        let mut remote = SimRemote::new(hub.clone());

        let mut pending = std::pin::pin!(call(&mut remote, "unknown".into(), Timeout::DEFAULT));
        let Poll::Ready(Err(WaitError::Remote { condition, .. })) = poll_once(pending.as_mut())
        else {
            panic!("expected an immediate remote error");
        };

        assert_eq!(condition, "sim.UnknownMethod");
        assert_eq!(hub.subscriptions_created(), 0);
    }
}
