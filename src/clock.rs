use std::{
    cell::Cell,
    fmt,
    rc::Rc,
    time::{SystemTime, UNIX_EPOCH},
};

/// Milliseconds since the Unix epoch, the unit every scan timestamp uses
pub type Millis = u64;

/// Source of "now" for a stabilizer
pub trait Clock: fmt::Debug {
    /// Current time in milliseconds
    fn now_ms(&self) -> Millis;
}

/// Wall clock backed by [`SystemTime`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    /// A system clock set before 1970 reads as the epoch
    fn now_ms(&self) -> Millis {
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX)
    }
}

/// A shared clock, so a session and its stabilizers read the same time
impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now_ms(&self) -> Millis {
        (**self).now_ms()
    }
}

/// Hand-driven clock for replaying recorded frames and for tests
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    /// Shared so a test can keep a handle after giving one to a stabilizer
    now: Rc<Cell<Millis>>,
}

impl ManualClock {
    /// Create a clock that starts at `start`
    #[must_use]
    pub fn starting_at(start: Millis) -> Self {
        Self { now: Rc::new(Cell::new(start)) }
    }

    /// Jump to an absolute time
    pub fn set(&self, at: Millis) {
        self.now.set(at);
    }

    /// Move forward by `delta` milliseconds
    pub fn advance(&self, delta: Millis) {
        self.now.set(self.now.get().saturating_add(delta));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}
