use std::time::Duration;

use tracing::trace;

use crate::clock::Clock;
use crate::content::ContentDispatcher;
use crate::message::{WheelEvent, WheelPhase};

/// Accumulated deltas of wheel events that were skipped.
#[derive(Debug, Clone)]
pub struct CoalescedWheelEvent {
    event: WheelEvent,
    merged: usize,
}

impl CoalescedWheelEvent {
    fn new(event: WheelEvent) -> Self {
        Self { event, merged: 1 }
    }

    fn can_coalesce(&self, event: &WheelEvent) -> bool {
        self.event.compatibility() == event.compatibility()
    }

    fn coalesce(&mut self, event: WheelEvent) {
        let accumulated = (
            self.event.delta_x + event.delta_x,
            self.event.delta_y + event.delta_y,
            self.event.delta_z + event.delta_z,
        );
        self.event = event;
        (self.event.delta_x, self.event.delta_y, self.event.delta_z) = accumulated;
        self.merged += 1;
    }

    pub fn event(&self) -> &WheelEvent {
        &self.event
    }

    pub fn merged(&self) -> usize {
        self.merged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelOutcome {
    Coalesced,
    Dispatched,
}

/// Skips wheel events while content is estimated to still be busy with the
/// previous one. Slow pages get coalesced harder because the estimate is the
/// measured cost of the last dispatch.
#[derive(Debug, Default)]
pub struct WheelCoalescer {
    pending: Option<CoalescedWheelEvent>,
    /// End of the last dispatch, on the parent's timeline. `None` after the
    /// last event of a burst so a lone event is never held back.
    last_processed: Option<Duration>,
    last_processing_duration: Duration,
}

impl WheelCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&CoalescedWheelEvent> {
        self.pending.as_ref()
    }

    pub fn last_processed(&self) -> Option<Duration> {
        self.last_processed
    }

    pub fn last_processing_duration(&self) -> Duration {
        self.last_processing_duration
    }

    fn can_coalesce(&self, event: &WheelEvent, next_is_wheel: bool) -> bool {
        let Some(last_processed) = self.last_processed else {
            return false;
        };
        next_is_wheel
            && event.timestamp < last_processed + self.last_processing_duration
            && self
                .pending
                .as_ref()
                .map_or(true, |pending| pending.can_coalesce(event))
    }

    /// `next_is_wheel` tells whether another wheel event is already waiting
    /// on the channel behind this one.
    pub fn handle(
        &mut self,
        event: WheelEvent,
        next_is_wheel: bool,
        content: &mut dyn ContentDispatcher,
        clock: &dyn Clock,
    ) -> WheelOutcome {
        // Operation start/end markers are never held back.
        let next_is_wheel = next_is_wheel && event.phase == WheelPhase::Delta;

        if self.can_coalesce(&event, next_is_wheel) {
            match self.pending.as_mut() {
                Some(pending) => pending.coalesce(event),
                None => self.pending = Some(CoalescedWheelEvent::new(event)),
            }
            return WheelOutcome::Coalesced;
        }

        if next_is_wheel {
            self.last_processed = Some(event.timestamp);
            let before = clock.now();
            self.dispatch_pending(content);
            content.dispatch_wheel(&event);
            self.last_processing_duration = clock.now().saturating_sub(before);
            self.last_processed = Some(event.timestamp + self.last_processing_duration);
        } else {
            self.last_processed = None;
            self.dispatch_pending(content);
            content.dispatch_wheel(&event);
        }
        WheelOutcome::Dispatched
    }

    pub fn dispatch_pending(&mut self, content: &mut dyn ContentDispatcher) {
        if let Some(pending) = self.pending.take() {
            trace!(
                target: "tab::input",
                merged = pending.merged(),
                "dispatching coalesced wheel event"
            );
            content.dispatch_wheel(&pending.event);
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
