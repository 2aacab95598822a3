use std::time::Duration;

use crate::device::{Capabilities, ClearColor};
use crate::error::InitializationError;
use crate::layout::{SlotLayout, MAX_MESHES_PER_FRAME, UNIFORM_SIZE_PER_MESH};
use crate::render::DEFAULT_GEOMETRY_RETENTION;
use crate::time::DEFAULT_FRAME_BUDGET;

/// Renderer configuration.
///
/// Keep this structure stable and minimal. The defaults reproduce the
/// documented layout contract (200 slots of 256 bytes).
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Draws that fit in one frame. Further renderables are skipped.
    pub max_slots: u32,

    /// Bytes per draw slot. Must be at least the transform payload (192) and
    /// a multiple of the device's dynamic-offset alignment.
    pub slot_size: u64,

    pub clear_color: ClearColor,

    /// CPU time allowed per frame before it is counted as an overrun.
    pub frame_budget: Duration,

    /// Warn when a frame issues more draw calls than this.
    pub draw_call_warning: Option<u32>,

    /// Frames a geometry may go undrawn before its GPU buffers are freed.
    pub geometry_retention_frames: u64,

    pub label: &'static str,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_slots: MAX_MESHES_PER_FRAME,
            slot_size: UNIFORM_SIZE_PER_MESH,
            clear_color: ClearColor::BLACK,
            frame_budget: DEFAULT_FRAME_BUDGET,
            draw_call_warning: Some(100),
            geometry_retention_frames: DEFAULT_GEOMETRY_RETENTION,
            label: "kiln renderer",
        }
    }
}

impl RendererConfig {
    pub fn with_max_slots(mut self, max_slots: u32) -> Self {
        self.max_slots = max_slots;
        self
    }

    pub fn with_slot_size(mut self, slot_size: u64) -> Self {
        self.slot_size = slot_size;
        self
    }

    pub fn with_clear_color(mut self, clear_color: ClearColor) -> Self {
        self.clear_color = clear_color;
        self
    }

    pub fn with_draw_call_warning(mut self, threshold: Option<u32>) -> Self {
        self.draw_call_warning = threshold;
        self
    }

    pub fn with_geometry_retention(mut self, frames: u64) -> Self {
        self.geometry_retention_frames = frames;
        self
    }

    /// Checks the slot layout against device limits.
    pub fn validate(&self, caps: &Capabilities) -> Result<SlotLayout, InitializationError> {
        let layout = SlotLayout::new(
            self.slot_size,
            self.max_slots,
            caps.min_uniform_buffer_offset_alignment,
        )?;
        if layout.buffer_size() > caps.max_buffer_size {
            return Err(InitializationError::BufferTooLarge {
                requested: layout.buffer_size(),
                max: caps.max_buffer_size,
            });
        }
        Ok(layout)
    }
}
