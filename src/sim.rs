//! Simulated reactor endpoints
//!
//! Deterministic in-memory stand-ins for the transports a real reactor would
//! own: a scriptable socket and a scriptable remote-call interface. The test
//! suite and the demo binary play the reactor's role by mutating these
//! through [`Watched::with`] and delivering notifications with
//! [`Watched::emit`].
//!
//! [`Watched::with`]: crate::Watched::with
//! [`Watched::emit`]: crate::Watched::emit

use std::{collections::HashMap, collections::VecDeque, rc::Rc};

use crate::{
    error::{WaitError, WaitResult},
    hub::{EventHub, EventKind},
    io::IoDevice,
    remote::{PendingReply, RemoteInterface},
    socket::{Socket, SocketState},
    watch::Watched,
};

/// In-memory socket with a scriptable state machine
#[must_use]
pub struct SimSocket {
    state: SocketState,
    inbox: VecDeque<u8>,
    outbox: Vec<u8>,
}

impl SimSocket {
    pub fn new() -> Self {
        Self {
            state: SocketState::Unconnected,
            inbox: VecDeque::new(),
            outbox: Vec::new(),
        }
    }

    /// Driver side: move the state machine
    pub fn set_state(&mut self, state: SocketState) {
        self.state = state;
    }

    /// Driver side: push incoming bytes into the read buffer
    pub fn feed(&mut self, data: &[u8]) {
        self.inbox.extend(data);
    }

    /// Driver side: drain the whole write queue
    pub fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbox)
    }

    /// Driver side: drain at most `max` queued bytes
    pub fn flush_partial(&mut self, max: usize) -> Vec<u8> {
        let keep = self.outbox.split_off(max.min(self.outbox.len()));
        std::mem::replace(&mut self.outbox, keep)
    }
}

impl Default for SimSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Socket for SimSocket {
    fn state(&self) -> SocketState {
        self.state
    }

    fn connect(&mut self) {
        if self.state == SocketState::Unconnected {
            self.state = SocketState::Connecting;
        }
    }

    fn disconnect(&mut self) {
        if matches!(self.state, SocketState::Connecting | SocketState::Connected) {
            self.state = SocketState::Closing;
        }
    }
}

impl IoDevice for SimSocket {
    fn bytes_available(&self) -> usize {
        self.inbox.len()
    }

    fn read(&mut self, max: usize) -> Vec<u8> {
        let take = max.min(self.inbox.len());
        self.inbox.drain(..take).collect()
    }

    fn read_line(&mut self) -> Vec<u8> {
        match self.inbox.iter().position(|&byte| byte == b'\n') {
            Some(position) => self.inbox.drain(..=position).collect(),
            None => self.read_all(),
        }
    }

    fn read_all(&mut self) -> Vec<u8> {
        self.inbox.drain(..).collect()
    }

    fn write(&mut self, data: &[u8]) -> usize {
        self.outbox.extend_from_slice(data);
        data.len()
    }

    fn bytes_to_write(&self) -> usize {
        self.outbox.len()
    }

    fn is_open(&self) -> bool {
        self.state != SocketState::Unconnected
    }

    fn close(&mut self) {
        self.state = SocketState::Unconnected;
    }
}

/// Reply handle produced by [`SimRemote`]
#[must_use]
pub struct SimReply {
    result: Option<WaitResult<String>>,
}

impl SimReply {
    /// A reply still in flight
    pub fn pending() -> Self {
        Self { result: None }
    }

    /// A reply finished before anyone could wait on it
    pub fn finished(result: WaitResult<String>) -> Self {
        Self {
            result: Some(result),
        }
    }

    /// Driver side: complete the call
    pub fn resolve(&mut self, result: WaitResult<String>) {
        self.result = Some(result);
    }
}

impl PendingReply for SimReply {
    type Value = String;

    fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    fn decode(&mut self) -> WaitResult<String> {
        self.result.take().expect("decoded an unfinished reply")
    }
}

/// Scriptable remote-call interface
///
/// Methods registered with [`SimRemote::respond_immediately`] short-circuit
/// to a finished reply; methods registered with [`SimRemote::respond_later`]
/// stay in flight until [`SimRemote::deliver`]. Unknown methods come back as
/// already-finished `sim.UnknownMethod` errors, exercising the
/// malformed-request path.
#[must_use]
pub struct SimRemote {
    hub: Rc<EventHub>,
    immediate: HashMap<String, WaitResult<String>>,
    deferred: HashMap<String, WaitResult<String>>,
    in_flight: Vec<(Watched<SimReply>, WaitResult<String>)>,
}

impl SimRemote {
    pub fn new(hub: Rc<EventHub>) -> Self {
        Self {
            hub,
            immediate: HashMap::new(),
            deferred: HashMap::new(),
            in_flight: Vec::new(),
        }
    }

    pub fn respond_immediately(&mut self, method: &str, result: WaitResult<String>) {
        self.immediate.insert(method.into(), result);
    }

    pub fn respond_later(&mut self, method: &str, result: WaitResult<String>) {
        self.deferred.insert(method.into(), result);
    }

    /// Driver side: finish every in-flight call and notify its waiters
    pub fn deliver(&mut self) {
        for (reply, result) in self.in_flight.drain(..) {
            reply.with(|inner| inner.resolve(result.clone()));
            reply.emit(EventKind::CallFinished);
        }
    }
}

impl RemoteInterface for SimRemote {
    type Request = String;
    type Reply = SimReply;

    fn call(&mut self, method: String) -> Watched<SimReply> {
        if let Some(result) = self.immediate.get(&method) {
            return Watched::new(self.hub.clone(), SimReply::finished(result.clone()));
        }

        if let Some(result) = self.deferred.get(&method) {
            let reply = Watched::new(self.hub.clone(), SimReply::pending());
            self.in_flight.push((reply.clone(), result.clone()));
            return reply;
        }

        Watched::new(
            self.hub.clone(),
            SimReply::finished(Err(WaitError::remote(
                "sim.UnknownMethod",
                format!("no handler registered for `{method}`"),
            ))),
        )
    }
}
