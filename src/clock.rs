use std::cell::Cell;
use std::time::Duration;

/// Monotonic time source shared by the tab and its input coalescers.
///
/// Event timestamps from the parent are expressed on the same timeline, so a
/// reading can be compared directly with `WheelEvent::timestamp`.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Clock that only moves when told to. Used by replays and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, to: Duration) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}
