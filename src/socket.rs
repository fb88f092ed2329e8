use std::{marker::PhantomData, rc::Rc};

use crate::{
    error::{WaitError, WaitResult},
    hub::{EventHub, EventKind},
    io::{AsyncDevice, IoDevice},
    wait::{Timeout, Verdict, WaitCondition, WaitOperation},
    watch::{WatchHandle, Watched},
};

/// Connection state machine of a socket-like transport
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SocketState {
    Unconnected,
    Connecting,
    Connected,
    Closing,
}

/// Watched-object contract for connection-oriented transports
///
/// `connect` and `disconnect` are immediate, non-blocking requests; their
/// effects arrive later as `StateChanged` / `Disconnected` notifications. A
/// request that fails outright must still leave the state machine in
/// `Unconnected` or `Closing` so a pending wait can observe the failure.
pub trait Socket {
    fn state(&self) -> SocketState;

    /// Issue a non-blocking connect request
    fn connect(&mut self);

    /// Issue a non-blocking disconnect request
    fn disconnect(&mut self);
}

/// Awaitable wrapper around a watched socket
///
/// Observes the socket weakly; dropping the socket mid-wait resolves the
/// pending operation with [`WaitError::ObjectDropped`].
#[must_use]
pub struct AsyncSocket<S> {
    hub: Rc<EventHub>,
    socket: WatchHandle<S>,
}

impl<S: Socket> AsyncSocket<S> {
    pub fn new(socket: &Watched<S>) -> Self {
        Self {
            hub: socket.hub().clone(),
            socket: socket.observe(),
        }
    }

    /// Wait until the socket reaches `Connected`
    ///
    /// A `Closing` observation resolves with [`WaitError::ConnectionClosed`]:
    /// `Connected` is unreachable from there.
    pub fn wait_for_connected(
        &self,
        timeout: impl Into<Timeout>,
    ) -> WaitOperation<ConnectedWait<S>> {
        WaitOperation::from_parts(
            self.hub.clone(),
            self.socket.clone(),
            ConnectedWait(PhantomData),
            timeout.into(),
        )
    }

    /// Wait until the socket reports a disconnect
    pub fn wait_for_disconnected(
        &self,
        timeout: impl Into<Timeout>,
    ) -> WaitOperation<DisconnectedWait<S>> {
        WaitOperation::from_parts(
            self.hub.clone(),
            self.socket.clone(),
            DisconnectedWait(PhantomData),
            timeout.into(),
        )
    }

    /// Issue a connect request and wait for `Connected`
    ///
    /// The request is issued synchronously; the single `await` covers both
    /// the request and its completion.
    pub fn connect_to_server(
        &self,
        timeout: impl Into<Timeout>,
    ) -> WaitOperation<ConnectedWait<S>> {
        if let Some(socket) = self.socket.upgrade() {
            socket.with(Socket::connect);
        }

        self.wait_for_connected(timeout)
    }

    /// Issue a disconnect request and wait for the disconnect notification
    pub fn disconnect_from_server(
        &self,
        timeout: impl Into<Timeout>,
    ) -> WaitOperation<DisconnectedWait<S>> {
        if let Some(socket) = self.socket.upgrade() {
            socket.with(Socket::disconnect);
        }

        self.wait_for_disconnected(timeout)
    }

    /// Byte-level operations over the same socket
    pub fn io(&self) -> AsyncDevice<S>
    where
        S: IoDevice,
    {
        AsyncDevice::from_parts(self.hub.clone(), self.socket.clone())
    }
}

/// Ready when the state machine reaches `Connected`
#[must_use]
pub struct ConnectedWait<S>(PhantomData<S>);

impl<S: Socket> WaitCondition for ConnectedWait<S> {
    type Target = S;
    type Output = ();

    fn check(&mut self, target: &mut S) -> Option<WaitResult<()>> {
        (target.state() == SocketState::Connected).then_some(Ok(()))
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::StateChanged]
    }

    fn interpret(&mut self, target: &mut S, _: EventKind) -> Verdict<WaitResult<()>> {
        match target.state() {
            // almost there
            SocketState::Unconnected | SocketState::Connecting => Verdict::KeepWaiting,
            SocketState::Connected => Verdict::Resume(Ok(())),
            SocketState::Closing => Verdict::Resume(Err(WaitError::ConnectionClosed)),
        }
    }
}

/// Ready when the socket is back to `Unconnected`
#[must_use]
pub struct DisconnectedWait<S>(PhantomData<S>);

impl<S: Socket> WaitCondition for DisconnectedWait<S> {
    type Target = S;
    type Output = ();

    fn check(&mut self, target: &mut S) -> Option<WaitResult<()>> {
        (target.state() == SocketState::Unconnected).then_some(Ok(()))
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::Disconnected]
    }

    fn interpret(&mut self, _: &mut S, _: EventKind) -> Verdict<WaitResult<()>> {
        Verdict::Resume(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimSocket;
    use crate::testing::poll_once;
    use std::task::Poll;

    fn watched_socket(hub: &Rc<EventHub>, state: SocketState) -> Watched<SimSocket> {
        let socket = Watched::new(hub.clone(), SimSocket::new());
        socket.with(|inner| inner.set_state(state));
        socket
    }

    #[test]
    fn already_connected_resolves_without_suspension() {
        let hub = Rc::new(EventHub::new());
        let socket = watched_socket(&hub, SocketState::Connected);

        let adapter = AsyncSocket::new(&socket);
        let mut wait = std::pin::pin!(adapter.wait_for_connected(Timeout::DEFAULT));

        assert_eq!(poll_once(wait.as_mut()), Poll::Ready(Ok(())));
        assert_eq!(hub.subscriptions_created(), 0);
        assert_eq!(hub.timers_started(), 0);
    }

    #[test]
    fn connect_succeeds_after_connecting_then_connected() {
        let hub = Rc::new(EventHub::new());
        let socket = watched_socket(&hub, SocketState::Unconnected);
        let adapter = AsyncSocket::new(&socket);

        let mut wait = std::pin::pin!(adapter.connect_to_server(Timeout::NONE));
        assert_eq!(socket.with(|inner| inner.state()), SocketState::Connecting);
        assert!(poll_once(wait.as_mut()).is_pending());

        // first notification: still connecting
        socket.emit(EventKind::StateChanged);
        assert!(poll_once(wait.as_mut()).is_pending());

        // second notification: connected
        socket.with(|inner| inner.set_state(SocketState::Connected));
        socket.emit(EventKind::StateChanged);
        assert_eq!(poll_once(wait.as_mut()), Poll::Ready(Ok(())));

        assert_eq!(hub.active_subscriptions(), 0);
        assert_eq!(hub.timers_started(), 0);
    }

    #[test]
    fn closing_observation_fails_a_connect_wait() {
        let hub = Rc::new(EventHub::new());
        let socket = watched_socket(&hub, SocketState::Connecting);
        let adapter = AsyncSocket::new(&socket);

        let mut wait = std::pin::pin!(adapter.wait_for_connected(Timeout::DEFAULT));
        assert!(poll_once(wait.as_mut()).is_pending());

        socket.with(|inner| inner.set_state(SocketState::Closing));
        socket.emit(EventKind::StateChanged);
        assert_eq!(
            poll_once(wait.as_mut()),
            Poll::Ready(Err(WaitError::ConnectionClosed))
        );
        assert_eq!(hub.active_subscriptions(), 0);
    }

    #[test]
    fn wait_for_disconnected_resumes_on_the_disconnect_event() {
        let hub = Rc::new(EventHub::new());
        let socket = watched_socket(&hub, SocketState::Connected);
        let adapter = AsyncSocket::new(&socket);

        let mut wait = std::pin::pin!(adapter.disconnect_from_server(Timeout::DEFAULT));
        assert_eq!(socket.with(|inner| inner.state()), SocketState::Closing);
        assert!(poll_once(wait.as_mut()).is_pending());

        socket.with(|inner| inner.set_state(SocketState::Unconnected));
        socket.emit(EventKind::Disconnected);
        assert_eq!(poll_once(wait.as_mut()), Poll::Ready(Ok(())));
    }

    #[test]
    fn already_disconnected_is_ready_immediately() {
        let hub = Rc::new(EventHub::new());
        let socket = watched_socket(&hub, SocketState::Unconnected);
        let adapter = AsyncSocket::new(&socket);

        let mut wait = std::pin::pin!(adapter.wait_for_disconnected(Timeout::DEFAULT));
        assert_eq!(poll_once(wait.as_mut()), Poll::Ready(Ok(())));
        assert_eq!(hub.subscriptions_created(), 0);
    }
}
