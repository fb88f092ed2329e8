use std::{marker::PhantomData, rc::Rc};

use crate::{
    error::{WaitError, WaitResult},
    hub::{EventHub, EventKind},
    wait::{Timeout, Verdict, WaitCondition, WaitOperation},
    watch::{WatchHandle, Watched},
};

/// Watched-object contract for buffered byte streams
///
/// All calls are immediate and non-blocking; readiness arrives later as
/// `ReadyRead` / `BytesWritten` / `Disconnected` notifications. A device
/// reports `is_open() == false` once reads can never again produce data.
pub trait IoDevice {
    /// Bytes currently buffered for reading
    fn bytes_available(&self) -> usize;

    /// Drain up to `max` buffered bytes
    fn read(&mut self, max: usize) -> Vec<u8>;

    /// Drain buffered bytes up to and including the next newline, or
    /// everything buffered when no newline arrived yet
    fn read_line(&mut self) -> Vec<u8>;

    /// Drain the whole read buffer
    fn read_all(&mut self) -> Vec<u8>;

    /// Queue bytes for writing, returning how many were accepted
    fn write(&mut self, data: &[u8]) -> usize;

    /// Queued bytes not yet flushed by the reactor
    fn bytes_to_write(&self) -> usize;

    fn is_open(&self) -> bool;

    fn close(&mut self);
}

/// Awaitable byte operations over a watched device
#[must_use]
pub struct AsyncDevice<D> {
    hub: Rc<EventHub>,
    device: WatchHandle<D>,
}

impl<D: IoDevice> AsyncDevice<D> {
    pub fn new(device: &Watched<D>) -> Self {
        Self {
            hub: device.hub().clone(),
            device: device.observe(),
        }
    }

    pub(crate) fn from_parts(hub: Rc<EventHub>, device: WatchHandle<D>) -> Self {
        Self { hub, device }
    }

    /// Wait for data and drain up to `max` bytes
    pub fn read(&self, max: usize, timeout: impl Into<Timeout>) -> WaitOperation<ReadWait<D>> {
        self.read_mode(ReadMode::Max(max), timeout.into())
    }

    /// Wait for data and drain up to the next newline
    pub fn read_line(&self, timeout: impl Into<Timeout>) -> WaitOperation<ReadWait<D>> {
        self.read_mode(ReadMode::Line, timeout.into())
    }

    /// Wait for data and drain the whole buffer
    pub fn read_all(&self, timeout: impl Into<Timeout>) -> WaitOperation<ReadWait<D>> {
        self.read_mode(ReadMode::All, timeout.into())
    }

    fn read_mode(&self, mode: ReadMode, timeout: Timeout) -> WaitOperation<ReadWait<D>> {
        WaitOperation::from_parts(
            self.hub.clone(),
            self.device.clone(),
            ReadWait {
                mode,
                _marker: PhantomData,
            },
            timeout,
        )
    }

    /// Queue `data` synchronously, then wait until the device flushed it
    ///
    /// Resolves with the number of bytes accepted by the queue. The single
    /// `await` covers both the request and the flush.
    pub fn write(&self, data: &[u8], timeout: impl Into<Timeout>) -> WaitOperation<WriteWait<D>> {
        let queued = self
            .device
            .upgrade()
            .map_or(0, |device| device.with(|inner| inner.write(data)));

        WaitOperation::from_parts(
            self.hub.clone(),
            self.device.clone(),
            WriteWait {
                queued,
                _marker: PhantomData,
            },
            timeout.into(),
        )
    }
}

enum ReadMode {
    All,
    Max(usize),
    Line,
}

impl ReadMode {
    fn perform<D: IoDevice>(&self, device: &mut D) -> Vec<u8> {
        match *self {
            Self::All => device.read_all(),
            Self::Max(max) => device.read(max),
            Self::Line => device.read_line(),
        }
    }
}

/// Ready when the device has buffered data or can never produce any
#[must_use]
pub struct ReadWait<D> {
    mode: ReadMode,
    _marker: PhantomData<D>,
}

impl<D: IoDevice> WaitCondition for ReadWait<D> {
    type Target = D;
    type Output = Vec<u8>;

    fn check(&mut self, target: &mut D) -> Option<WaitResult<Vec<u8>>> {
        if target.bytes_available() > 0 {
            return Some(Ok(self.mode.perform(target)));
        }

        // a read can never complete on a closed device; fail instead of
        // suspending forever
        if !target.is_open() {
            return Some(Err(WaitError::ConnectionClosed));
        }

        None
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::ReadyRead, EventKind::Disconnected]
    }

    fn interpret(&mut self, target: &mut D, kind: EventKind) -> Verdict<WaitResult<Vec<u8>>> {
        // drain whatever arrived before the disconnect raced in
        let data = self.mode.perform(target);
        if !data.is_empty() {
            return Verdict::Resume(Ok(data));
        }

        if kind == EventKind::Disconnected || !target.is_open() {
            return Verdict::Resume(Err(WaitError::ConnectionClosed));
        }

        Verdict::KeepWaiting
    }
}

/// Ready when the write queue drained
#[must_use]
pub struct WriteWait<D> {
    queued: usize,
    _marker: PhantomData<D>,
}

impl<D: IoDevice> WaitCondition for WriteWait<D> {
    type Target = D;
    type Output = usize;

    fn check(&mut self, target: &mut D) -> Option<WaitResult<usize>> {
        if !target.is_open() {
            return Some(Err(WaitError::ConnectionClosed));
        }

        (target.bytes_to_write() == 0).then_some(Ok(self.queued))
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::BytesWritten, EventKind::Disconnected]
    }

    fn interpret(&mut self, target: &mut D, kind: EventKind) -> Verdict<WaitResult<usize>> {
        if kind == EventKind::Disconnected {
            return Verdict::Resume(Err(WaitError::ConnectionClosed));
        }

        if target.bytes_to_write() == 0 {
            Verdict::Resume(Ok(self.queued))
        } else {
            Verdict::KeepWaiting
        }
    }
}
