use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::trace;

use crate::content::ContentDispatcher;
use crate::message::{PointerEvent, PointerId, PointerMoveEvent};

/// Decides whether a move may be folded into the one already pending for
/// the same pointer.
pub trait MergePolicy {
    fn can_coalesce(&self, pending: &PointerMoveEvent, incoming: &PointerMoveEvent) -> bool;
}

impl<F> MergePolicy for F
where
    F: Fn(&PointerMoveEvent, &PointerMoveEvent) -> bool,
{
    fn can_coalesce(&self, pending: &PointerMoveEvent, incoming: &PointerMoveEvent) -> bool {
        self(pending, incoming)
    }
}

/// Default policy: modifiers, held buttons and hit-test target must match.
#[derive(Debug, Default, Clone, Copy)]
pub struct SameButtonState;

impl MergePolicy for SameButtonState {
    fn can_coalesce(&self, pending: &PointerMoveEvent, incoming: &PointerMoveEvent) -> bool {
        pending.modifiers == incoming.modifiers
            && pending.buttons == incoming.buttons
            && pending.guid == incoming.guid
    }
}

/// The newest move seen for one pointer since its last flush.
#[derive(Debug, Clone)]
pub struct CoalescedPointerEvent {
    event: PointerMoveEvent,
    merged: usize,
}

impl CoalescedPointerEvent {
    fn new(event: PointerMoveEvent) -> Self {
        Self { event, merged: 1 }
    }

    fn coalesce(&mut self, event: PointerMoveEvent) {
        self.event = event;
        self.merged += 1;
    }

    pub fn event(&self) -> &PointerMoveEvent {
        &self.event
    }

    /// Number of inbound moves folded into this record.
    pub fn merged(&self) -> usize {
        self.merged
    }

    fn into_event(self) -> PointerEvent {
        PointerEvent::Move(self.event)
    }
}

type SharedQueue = RefCell<VecDeque<PointerEvent>>;

/// FIFO of finalized pointer events waiting for dispatch.
#[derive(Debug, Default)]
pub struct DispatchQueue {
    items: Rc<SharedQueue>,
}

impl DispatchQueue {
    pub fn push(&self, event: PointerEvent) {
        self.items.borrow_mut().push_back(event);
    }

    pub fn pop(&self) -> Option<PointerEvent> {
        self.items.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.items.borrow_mut().clear();
    }

    pub fn sink(&self) -> InputSink {
        InputSink {
            queue: Rc::downgrade(&self.items),
        }
    }
}

/// Non-owning handle content uses to queue pointer events while one is
/// being dispatched. Pushes after the tab tore down its input are dropped.
#[derive(Debug, Clone, Default)]
pub struct InputSink {
    queue: Weak<SharedQueue>,
}

impl InputSink {
    pub fn push(&self, event: PointerEvent) -> bool {
        match self.queue.upgrade() {
            Some(queue) => {
                queue.borrow_mut().push_back(event);
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.queue.strong_count() > 0
    }
}

/// Per-pointer move coalescing in front of the dispatch queue.
pub struct PointerCoalescer {
    pending: IndexMap<PointerId, CoalescedPointerEvent>,
    queue: DispatchQueue,
    policy: Box<dyn MergePolicy>,
}

impl Default for PointerCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerCoalescer {
    pub fn new() -> Self {
        Self::with_policy(SameButtonState)
    }

    pub fn with_policy(policy: impl MergePolicy + 'static) -> Self {
        Self {
            pending: IndexMap::new(),
            queue: DispatchQueue::default(),
            policy: Box::new(policy),
        }
    }

    pub fn sink(&self) -> InputSink {
        self.queue.sink()
    }

    pub fn pending(&self, pointer: PointerId) -> Option<&CoalescedPointerEvent> {
        self.pending.get(&pointer)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Folds `event` into the pending record for its pointer. Returns `true`
    /// when an older record had to be queued, meaning a drain is due.
    pub fn coalesce_move(&mut self, event: PointerMoveEvent) -> bool {
        let pointer = event.pointer_id;
        let compatible = self
            .pending
            .get(&pointer)
            .map(|record| self.policy.can_coalesce(record.event(), &event));

        match compatible {
            Some(true) => {
                if let Some(record) = self.pending.get_mut(&pointer) {
                    record.coalesce(event);
                }
                false
            }
            Some(false) => {
                if let Some(previous) = self.pending.shift_remove(&pointer) {
                    trace!(
                        target: "tab::input",
                        pointer = %pointer,
                        merged = previous.merged(),
                        "incompatible move, queueing pending record"
                    );
                    self.queue.push(previous.into_event());
                }
                self.pending
                    .insert(pointer, CoalescedPointerEvent::new(event));
                true
            }
            None => {
                self.pending
                    .insert(pointer, CoalescedPointerEvent::new(event));
                false
            }
        }
    }

    /// Moves every pending record to the queue, oldest pointer first.
    pub fn flush_all(&mut self) {
        for (_, record) in self.pending.drain(..) {
            self.queue.push(record.into_event());
        }
    }

    pub fn enqueue(&mut self, event: PointerEvent) {
        self.queue.push(event);
    }

    /// Dispatches queued events until the queue is observed empty. Content
    /// may push more through an `InputSink` while an event is dispatched;
    /// those are picked up by the same pass.
    pub fn drain(&mut self, content: &mut dyn ContentDispatcher) -> usize {
        let mut dispatched = 0;
        while let Some(event) = self.queue.pop() {
            content.dispatch_pointer(&event);
            dispatched += 1;
        }
        dispatched
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.queue.clear();
    }
}
