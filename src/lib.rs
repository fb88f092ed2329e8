#![doc = include_str!("../README.md")]

#[cfg(feature = "futures-io")]
mod adapter;
mod clock;
mod error;
mod executor;
mod hub;
pub mod io;
pub mod remote;
pub mod sim;
pub mod socket;
mod wait;
mod watch;

#[cfg(feature = "futures-io")]
pub use crate::adapter::DeviceIo;
pub use crate::{
    clock::{TimeSource, VirtualClock, WallClock},
    error::{WaitError, WaitResult},
    executor::{block_on, Executor},
    hub::{EventHub, EventKind, ObjectId, SubscriptionId, TimerId},
    io::{AsyncDevice, IoDevice},
    remote::{PendingCall, PendingReply, RemoteInterface},
    socket::{AsyncSocket, Socket, SocketState},
    wait::{events, Events, Timeout, Verdict, WaitCondition, WaitOperation, DEFAULT_TIMEOUT},
    watch::{WatchHandle, Watched},
};
