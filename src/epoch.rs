use crate::message::LayersObserverEpoch;

/// Orders render-state requests that arrive on independent channels.
///
/// Arrival order across the control channel and the hang-monitor path is not
/// guaranteed, so the epoch in the payload is the only ordering authority.
#[derive(Debug, Default)]
pub struct RenderEpochSequencer {
    current: LayersObserverEpoch,
}

impl RenderEpochSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> LayersObserverEpoch {
        self.current
    }

    /// Accepts `epoch` if it is newer than anything seen so far.
    pub fn advance(&mut self, epoch: LayersObserverEpoch) -> bool {
        if epoch <= self.current {
            return false;
        }
        self.current = epoch;
        true
    }
}
