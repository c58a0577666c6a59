//! Frame pacing.
//!
//! Keeps one submission per frame slot and waits on the oldest slot before
//! it is reused, so the CPU never runs more than `frames_in_flight` frames
//! ahead of the GPU.

use std::time::Duration;

use crate::engine::Engine;
use crate::error::EngineResult;
use crate::sync::SubmitSync;

/// Ring of per-frame submissions.
#[derive(Debug, Clone)]
pub struct FramePacer {
    slots: Vec<SubmitSync>,
    frame_index: usize,
}

impl FramePacer {
    /// Create a pacer with at least one slot.
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            slots: vec![SubmitSync::failed(); frames_in_flight.max(1)],
            frame_index: 0,
        }
    }

    /// Wait until the current slot's previous frame has completed.
    pub fn pace(&mut self, engine: &mut Engine, timeout: Option<Duration>) -> EngineResult<()> {
        let sync = self.slots[self.frame_index];
        engine.wait_for_submit_sync(&sync, timeout)?;
        self.slots[self.frame_index] = SubmitSync::failed();
        Ok(())
    }

    /// Store this frame's final submission and move to the next slot.
    /// A failed submission leaves the slot empty.
    pub fn record(&mut self, sync: SubmitSync) {
        self.slots[self.frame_index] = if sync.is_failed() {
            SubmitSync::failed()
        } else {
            sync
        };
        self.frame_index = (self.frame_index + 1) % self.slots.len();
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// The submission stored in the current slot, if any.
    pub fn pending(&self) -> Option<SubmitSync> {
        let sync = self.slots[self.frame_index];
        (!sync.is_failed()).then_some(sync)
    }
}
