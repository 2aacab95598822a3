use std::time::Duration;

use crate::device::DeviceEpoch;

/// Counters of one rendered frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub triangles: u64,
    /// Renderables dropped for any reason (capacity, shader error, backend).
    pub skipped_draws: u32,
    /// Renderables dropped because the uniform buffer was full.
    pub capacity_skips: u32,
    /// Renderables dropped because their geometry has nothing to draw.
    pub empty_skips: u32,
    pub shader_errors: u32,
    pub buffer_writes: u32,
    /// Idle geometries released at the end of the frame.
    pub geometry_evictions: u32,
}

impl FrameStats {
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.skipped_draws > 0
    }
}

/// Snapshot returned by `Renderer::stats`.
///
/// `triangles`, `draw_calls` and `skipped_draws` describe the most recent
/// frame; everything else is cumulative since initialization.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct RenderStats {
    pub triangles: u64,
    pub draw_calls: u32,
    /// Pipelines currently compiled on the live device.
    pub compiled_programs: usize,
    pub frame_number: u64,
    pub skipped_draws: u32,

    /// Frames that ran out of uniform slots.
    pub capacity_warnings: u64,
    pub shader_errors: u64,
    pub buffer_writes: u64,
    pub bind_group_creations: u64,
    pub pipeline_compilations: u64,
    pub device_losses: u64,
    pub recoveries: u64,
    pub device_epoch: DeviceEpoch,
    /// Geometries with buffers on the live device.
    pub resident_geometries: usize,
    pub geometry_evictions: u64,

    pub last_frame_time: Duration,
    pub average_frame_time: Duration,
    pub budget_overruns: u64,
}

/// Accumulates per-frame counters into the cumulative ones.
#[derive(Debug, Default)]
pub(crate) struct StatsTracker {
    last: FrameStats,
    frame_number: u64,
    capacity_warnings: u64,
    shader_errors: u64,
}

impl StatsTracker {
    pub(crate) fn record(&mut self, frame: FrameStats) {
        self.frame_number += 1;
        if frame.capacity_skips > 0 {
            self.capacity_warnings += 1;
        }
        self.shader_errors += u64::from(frame.shader_errors);
        self.last = frame;
    }

    #[inline]
    pub(crate) fn last(&self) -> FrameStats {
        self.last
    }

    #[inline]
    pub(crate) fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[inline]
    pub(crate) fn capacity_warnings(&self) -> u64 {
        self.capacity_warnings
    }

    #[inline]
    pub(crate) fn shader_errors(&self) -> u64 {
        self.shader_errors
    }
}
