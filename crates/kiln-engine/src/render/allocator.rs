//! Per-frame uniform staging.
//!
//! Draw transforms are staged into a CPU mirror during traversal and
//! transferred with a single buffer write per frame. Slot data of frame N is
//! never read by frame N+1: the cursor restarts at zero and every slot that
//! is drawn from is rewritten before the commit.

use crate::device::{BufferHandle, GpuBackend};
use crate::error::{BackendError, CapacityExceeded};
use crate::layout::{SlotLayout, SlotOffset, TransformUniforms};

#[derive(Debug)]
pub struct FrameUniformAllocator {
    layout: SlotLayout,
    mirror: Vec<u8>,
    cursor: u32,
    buffer: BufferHandle,
    buffer_writes: u64,
}

impl FrameUniformAllocator {
    /// Wraps an already created GPU buffer of `layout.buffer_size()` bytes.
    pub fn new(layout: SlotLayout, buffer: BufferHandle) -> Self {
        Self {
            layout,
            mirror: vec![0; layout.buffer_size() as usize],
            cursor: 0,
            buffer,
            buffer_writes: 0,
        }
    }

    #[inline]
    pub fn layout(&self) -> SlotLayout {
        self.layout
    }

    #[inline]
    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Draws staged so far this frame.
    #[inline]
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Buffer writes issued over the allocator's lifetime.
    #[inline]
    pub fn buffer_writes(&self) -> u64 {
        self.buffer_writes
    }

    /// Resets the draw cursor. No GPU call.
    #[inline]
    pub fn begin_frame(&mut self) {
        self.cursor = 0;
    }

    /// Copies `transform` into the next slot of the CPU mirror.
    ///
    /// On a full buffer nothing is written and the cursor stays at
    /// `max_slots`.
    pub fn stage(&mut self, transform: &TransformUniforms) -> Result<SlotOffset, CapacityExceeded> {
        let Some(offset) = self.layout.offset(self.cursor) else {
            return Err(CapacityExceeded {
                requested: self.cursor,
                max_slots: self.layout.max_slots(),
            });
        };

        let bytes = bytemuck::bytes_of(transform);
        let start = offset.bytes() as usize;
        self.mirror[start..start + bytes.len()].copy_from_slice(bytes);
        self.cursor += 1;
        Ok(offset)
    }

    /// Transfers `[0, cursor * slot_size)` of the mirror in one buffer write.
    ///
    /// Returns whether a write was issued; an empty frame issues none.
    pub fn commit<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> Result<bool, BackendError> {
        if self.cursor == 0 {
            return Ok(false);
        }
        let len = self.cursor as usize * self.layout.slot_size() as usize;
        backend.write_buffer(self.buffer, 0, &self.mirror[..len])?;
        self.buffer_writes += 1;
        Ok(true)
    }

    /// Points the allocator at a freshly created buffer (after device
    /// recovery). The mirror is zeroed and the cursor reset.
    pub fn replace_buffer(&mut self, buffer: BufferHandle) {
        self.buffer = buffer;
        self.cursor = 0;
        self.mirror.fill(0);
    }

    /// Transform staged at `index` this frame, if any.
    pub fn staged(&self, index: u32) -> Option<TransformUniforms> {
        if index >= self.cursor {
            return None;
        }
        let start = self.layout.offset(index)?.bytes() as usize;
        TransformUniforms::read_from(&self.mirror[start..])
    }
}
