use std::{cell::Cell, time::Duration, time::Instant};

/// Source of the current time used for arming and expiring timers
///
/// Keeping this behind a trait lets the hub run against the wall clock in
/// production and against a manually advanced clock in tests.
pub trait TimeSource {
    /// Milliseconds elapsed since the source's epoch
    fn now(&self) -> u64;
}

/// Wall-clock time source, epoch fixed at construction
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Manually advanced time source for deterministic tests
///
/// Time stands still until [`VirtualClock::advance`] is called, so timer
/// expiry can be pinned to an exact tick.
#[derive(Default)]
pub struct VirtualClock {
    now: Cell<u64>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.now.set(self.now.get().saturating_add(millis));
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> u64 {
        self.now.get()
    }
}

// Tests hold the clock they hand to the hub by `Rc` so they can keep
// advancing it afterwards.
impl<T: TimeSource + ?Sized> TimeSource for std::rc::Rc<T> {
    fn now(&self) -> u64 {
        (**self).now()
    }
}
