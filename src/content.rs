use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::clock::ManualClock;
use crate::input::InputSink;
use crate::message::{EventStatus, KeyEvent, LayersObserverEpoch, PointerEvent, WheelEvent};

/// The document/widget side of a tab. Everything that actually runs content
/// code or paints lives behind this trait.
pub trait ContentDispatcher {
    /// Hands content a weak way back into the tab's pointer dispatch queue.
    fn attach(&mut self, _sink: InputSink) {}

    fn dispatch_pointer(&mut self, event: &PointerEvent) -> EventStatus;
    fn dispatch_wheel(&mut self, event: &WheelEvent) -> EventStatus;
    fn dispatch_key(&mut self, event: &KeyEvent) -> EventStatus;

    fn set_active(&mut self, active: bool);

    fn is_visible(&self) -> bool;
    fn make_visible(&mut self);
    fn make_hidden(&mut self);
    fn clear_cached_resources(&mut self);

    fn set_layers_observer_epoch(&mut self, _epoch: LayersObserverEpoch) {}

    /// Whether arbitrary script may run right now, which decides between
    /// painting synchronously and scheduling a paint.
    fn is_safe_to_run_script(&self) -> bool {
        true
    }
    fn paint_now(&mut self);
    fn schedule_paint(&mut self);

    /// Tear down the widget. Called once when the tab's window is destroyed.
    fn destroy(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintRequest {
    Now,
    Scheduled,
}

#[derive(Debug, Default)]
struct ContentRecord {
    pointer: Vec<PointerEvent>,
    wheel: Vec<WheelEvent>,
    keys: Vec<KeyEvent>,
    activations: Vec<bool>,
    paints: Vec<PaintRequest>,
    observer_epochs: Vec<LayersObserverEpoch>,
    cache_clears: usize,
    visible: bool,
    destroyed: bool,
}

/// Shared view of everything a `HeadlessContent` was asked to do.
#[derive(Debug, Clone, Default)]
pub struct ContentLog {
    record: Rc<RefCell<ContentRecord>>,
}

impl ContentLog {
    pub fn pointer(&self) -> Vec<PointerEvent> {
        self.record.borrow().pointer.clone()
    }

    pub fn wheel(&self) -> Vec<WheelEvent> {
        self.record.borrow().wheel.clone()
    }

    pub fn keys(&self) -> Vec<KeyEvent> {
        self.record.borrow().keys.clone()
    }

    pub fn activations(&self) -> Vec<bool> {
        self.record.borrow().activations.clone()
    }

    pub fn paints(&self) -> Vec<PaintRequest> {
        self.record.borrow().paints.clone()
    }

    pub fn observer_epochs(&self) -> Vec<LayersObserverEpoch> {
        self.record.borrow().observer_epochs.clone()
    }

    pub fn cache_clears(&self) -> usize {
        self.record.borrow().cache_clears
    }

    pub fn is_visible(&self) -> bool {
        self.record.borrow().visible
    }

    pub fn is_destroyed(&self) -> bool {
        self.record.borrow().destroyed
    }
}

/// Content stand-in with no document behind it. It records what it is asked
/// to do, can charge a simulated cost per dispatch, and can feed events back
/// into the tab mid-dispatch the way a nested event loop would.
pub struct HeadlessContent {
    log: ContentLog,
    safe_to_run_script: bool,
    key_status: EventStatus,
    cost: Option<(Rc<ManualClock>, Duration)>,
    sink: Option<InputSink>,
    reentrant: VecDeque<PointerEvent>,
}

impl Default for HeadlessContent {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessContent {
    pub fn new() -> Self {
        Self {
            log: ContentLog::default(),
            safe_to_run_script: true,
            key_status: EventStatus::Ignore,
            cost: None,
            sink: None,
            reentrant: VecDeque::new(),
        }
    }

    pub fn log(&self) -> ContentLog {
        self.log.clone()
    }

    pub fn with_visible(self, visible: bool) -> Self {
        self.log.record.borrow_mut().visible = visible;
        self
    }

    pub fn with_safe_to_run_script(mut self, safe: bool) -> Self {
        self.safe_to_run_script = safe;
        self
    }

    pub fn with_key_status(mut self, status: EventStatus) -> Self {
        self.key_status = status;
        self
    }

    /// Every dispatch advances `clock` by `cost`.
    pub fn with_dispatch_cost(mut self, clock: Rc<ManualClock>, cost: Duration) -> Self {
        self.cost = Some((clock, cost));
        self
    }

    /// Queue `events` into the tab while the next pointer event is dispatched.
    pub fn with_reentrant_events(mut self, events: impl IntoIterator<Item = PointerEvent>) -> Self {
        self.reentrant.extend(events);
        self
    }

    fn charge(&self) {
        if let Some((clock, cost)) = &self.cost {
            clock.advance(*cost);
        }
    }
}

impl ContentDispatcher for HeadlessContent {
    fn attach(&mut self, sink: InputSink) {
        self.sink = Some(sink);
    }

    fn dispatch_pointer(&mut self, event: &PointerEvent) -> EventStatus {
        debug!(target: "tab::content", pointer = %event.pointer_id(), ?event, "pointer event");
        self.log.record.borrow_mut().pointer.push(event.clone());
        self.charge();
        if let Some(sink) = &self.sink {
            while let Some(nested) = self.reentrant.pop_front() {
                sink.push(nested);
            }
        }
        EventStatus::Ignore
    }

    fn dispatch_wheel(&mut self, event: &WheelEvent) -> EventStatus {
        debug!(target: "tab::content", delta_y = event.delta_y, "wheel event");
        self.log.record.borrow_mut().wheel.push(event.clone());
        self.charge();
        EventStatus::Ignore
    }

    fn dispatch_key(&mut self, event: &KeyEvent) -> EventStatus {
        debug!(target: "tab::content", key = %event.key, kind = ?event.kind, "key event");
        self.log.record.borrow_mut().keys.push(event.clone());
        self.charge();
        self.key_status
    }

    fn set_active(&mut self, active: bool) {
        self.log.record.borrow_mut().activations.push(active);
    }

    fn is_visible(&self) -> bool {
        self.log.is_visible()
    }

    fn make_visible(&mut self) {
        self.log.record.borrow_mut().visible = true;
    }

    fn make_hidden(&mut self) {
        self.log.record.borrow_mut().visible = false;
    }

    fn clear_cached_resources(&mut self) {
        self.log.record.borrow_mut().cache_clears += 1;
    }

    fn set_layers_observer_epoch(&mut self, epoch: LayersObserverEpoch) {
        self.log.record.borrow_mut().observer_epochs.push(epoch);
    }

    fn is_safe_to_run_script(&self) -> bool {
        self.safe_to_run_script
    }

    fn paint_now(&mut self) {
        self.log.record.borrow_mut().paints.push(PaintRequest::Now);
    }

    fn schedule_paint(&mut self) {
        self.log
            .record
            .borrow_mut()
            .paints
            .push(PaintRequest::Scheduled);
    }

    fn destroy(&mut self) {
        self.sink = None;
        self.log.record.borrow_mut().destroyed = true;
    }
}
