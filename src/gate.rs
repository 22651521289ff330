use thiserror::Error;

use crate::message::LayersObserverEpoch;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("no pending blocker to release")]
    NotBlocked,
}

/// Render-state request captured while the gate is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRenderState {
    pub enabled: bool,
    pub epoch: LayersObserverEpoch,
}

/// What to apply once the last blocker is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateReplay {
    pub active: Option<bool>,
    pub render: Option<PendingRenderState>,
}

/// Holds activation and render-state changes back while a blocking
/// operation (window-open negotiation) is outstanding.
///
/// Each kind keeps only its most recent value; intermediate values are lost.
#[derive(Debug, Default)]
pub struct ActivationGate {
    blockers: u32,
    pending_active: Option<bool>,
    pending_render: Option<PendingRenderState>,
}

impl ActivationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blockers(&self) -> u32 {
        self.blockers
    }

    pub fn is_blocked(&self) -> bool {
        self.blockers > 0
    }

    pub fn add_blocker(&mut self) {
        self.blockers += 1;
    }

    /// Returns the replay once the count drops to zero, `None` while still
    /// blocked.
    pub fn remove_blocker(&mut self) -> Result<Option<GateReplay>, GateError> {
        if self.blockers == 0 {
            return Err(GateError::NotBlocked);
        }
        self.blockers -= 1;
        if self.blockers > 0 {
            return Ok(None);
        }
        Ok(Some(GateReplay {
            active: self.pending_active.take(),
            render: self.pending_render.take(),
        }))
    }

    /// Captures `active` if blocked. Returns `false` when the caller should
    /// apply it directly.
    pub fn capture_active(&mut self, active: bool) -> bool {
        if !self.is_blocked() {
            return false;
        }
        self.pending_active = Some(active);
        true
    }

    pub fn capture_render(&mut self, state: PendingRenderState) -> bool {
        if !self.is_blocked() {
            return false;
        }
        self.pending_render = Some(state);
        true
    }

    pub fn pending_active(&self) -> Option<bool> {
        self.pending_active
    }

    pub fn pending_render(&self) -> Option<PendingRenderState> {
        self.pending_render
    }

    /// Forget queued state and blockers. Used during teardown.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
