//! Input coalescing in front of content dispatch.
//!
//! Pointer moves are merged per pointer and flushed in arrival order before
//! any non-move event; wheel deltas are merged while content is estimated to
//! be busy; repeated keys are skipped when content falls behind.

mod keyboard;
mod pointer;
mod wheel;

pub use keyboard::KeyRepeatFilter;
pub use pointer::{
    CoalescedPointerEvent, DispatchQueue, InputSink, MergePolicy, PointerCoalescer,
    SameButtonState,
};
pub use wheel::{CoalescedWheelEvent, WheelCoalescer, WheelOutcome};
