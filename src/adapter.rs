//! `futures-io` trait implementations over a watched device
//!
//! Lets code written against `futures_io::AsyncRead`/`AsyncWrite` run on top
//! of a callback-driven device without going through the wait-operation API.

use std::{
    io::Result,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use futures_io::{AsyncRead, AsyncWrite};

use crate::{
    error::WaitError,
    hub::{EventHub, EventKind, ObjectId, SubscriptionId},
    io::IoDevice,
    watch::{WatchHandle, Watched},
};

/// Poll-based IO adapter over a watched [`IoDevice`]
#[must_use]
pub struct DeviceIo<D> {
    hub: Rc<EventHub>,
    device: WatchHandle<D>,
    read: Option<SubscriptionId>,
    write: Option<SubscriptionId>,
}

impl<D: IoDevice> DeviceIo<D> {
    pub fn new(device: &Watched<D>) -> Self {
        Self {
            hub: device.hub().clone(),
            device: device.observe(),
            read: None,
            write: None,
        }
    }
}

fn park(
    hub: &EventHub,
    slot: &mut Option<SubscriptionId>,
    object: ObjectId,
    kind: EventKind,
    waker: &Waker,
) {
    match *slot {
        None => *slot = Some(hub.subscribe(object, kind, waker)),
        Some(subscription) => {
            hub.refresh(subscription, waker);
            let _ = hub.take_fired(subscription);
        }
    }
}

fn clear(hub: &EventHub, slot: &mut Option<SubscriptionId>) {
    if let Some(subscription) = slot.take() {
        hub.unsubscribe(subscription);
    }
}

impl<D> Unpin for DeviceIo<D> {}

impl<D: IoDevice> AsyncRead for DeviceIo<D> {
    fn poll_read(
        self: Pin<&mut Self>,
        context: &mut Context,
        buffer: &mut [u8],
    ) -> Poll<Result<usize>> {
        let this = self.get_mut();

        let Some(device) = this.device.upgrade() else {
            clear(&this.hub, &mut this.read);
            return Poll::Ready(Err(WaitError::ObjectDropped.into()));
        };

        if device.with(|inner| inner.bytes_available()) > 0 {
            clear(&this.hub, &mut this.read);

            let data = device.with(|inner| inner.read(buffer.len()));
            buffer[..data.len()].copy_from_slice(&data);
            return Poll::Ready(Ok(data.len()));
        }

        if !device.with(|inner| inner.is_open()) {
            clear(&this.hub, &mut this.read);
            return Poll::Ready(Ok(0));
        }

        park(
            &this.hub,
            &mut this.read,
            device.id(),
            EventKind::ReadyRead,
            context.waker(),
        );
        Poll::Pending
    }
}

impl<D: IoDevice> AsyncWrite for DeviceIo<D> {
    fn poll_write(
        self: Pin<&mut Self>,
        context: &mut Context,
        buffer: &[u8],
    ) -> Poll<Result<usize>> {
        let this = self.get_mut();

        let Some(device) = this.device.upgrade() else {
            return Poll::Ready(Err(WaitError::ObjectDropped.into()));
        };

        if !device.with(|inner| inner.is_open()) {
            return Poll::Ready(Err(WaitError::ConnectionClosed.into()));
        }

        let accepted = device.with(|inner| inner.write(buffer));
        if accepted == 0 && !buffer.is_empty() {
            // queue full; wait for the reactor to flush some of it
            park(
                &this.hub,
                &mut this.write,
                device.id(),
                EventKind::BytesWritten,
                context.waker(),
            );
            return Poll::Pending;
        }

        clear(&this.hub, &mut this.write);
        Poll::Ready(Ok(accepted))
    }

    fn poll_flush(self: Pin<&mut Self>, context: &mut Context) -> Poll<Result<()>> {
        let this = self.get_mut();

        let Some(device) = this.device.upgrade() else {
            return Poll::Ready(Err(WaitError::ObjectDropped.into()));
        };

        if device.with(|inner| inner.bytes_to_write()) == 0 {
            clear(&this.hub, &mut this.write);
            return Poll::Ready(Ok(()));
        }

        park(
            &this.hub,
            &mut this.write,
            device.id(),
            EventKind::BytesWritten,
            context.waker(),
        );
        Poll::Pending
    }

    fn poll_close(mut self: Pin<&mut Self>, context: &mut Context) -> Poll<Result<()>> {
        std::task::ready!(self.as_mut().poll_flush(context))?;

        let this = self.get_mut();
        if let Some(device) = this.device.upgrade() {
            device.with(IoDevice::close);
        }

        clear(&this.hub, &mut this.read);
        Poll::Ready(Ok(()))
    }
}

impl<D> Drop for DeviceIo<D> {
    fn drop(&mut self) {
        clear(&self.hub, &mut self.read);
        clear(&self.hub, &mut self.write);
    }
}
