//! Per-draw uniform slot layout.
//!
//! One slot holds the transform uniforms of a single draw. Slots are packed
//! back to back in the frame uniform buffer and addressed at draw time with a
//! dynamic offset of `index * slot_size`.
//!
//! The default constants are part of the external contract and must stay
//! bit-exact:
//! - `UNIFORM_SIZE_PER_MESH = 256`
//! - `MAX_MESHES_PER_FRAME = 200`
//! - `UNIFORM_BUFFER_SIZE = 51_200`

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use thiserror::Error;

/// Bytes reserved per draw (192 bytes of payload padded to the WebGPU
/// default `minUniformBufferOffsetAlignment`).
pub const UNIFORM_SIZE_PER_MESH: u64 = 256;

/// Default number of slots per frame.
pub const MAX_MESHES_PER_FRAME: u32 = 200;

/// Default uniform buffer size in bytes.
pub const UNIFORM_BUFFER_SIZE: u64 = MAX_MESHES_PER_FRAME as u64 * UNIFORM_SIZE_PER_MESH;

/// Bytes of transform payload written per slot (three `mat4x4<f32>`).
pub const TRANSFORM_PAYLOAD_SIZE: u64 = std::mem::size_of::<TransformUniforms>() as u64;

const _: () = assert!(TRANSFORM_PAYLOAD_SIZE == 192);
const _: () = assert!(UNIFORM_BUFFER_SIZE == 51_200);

// ── transform payload ─────────────────────────────────────────────────────

/// Transform data for one draw, laid out as the WGSL `Transforms` struct.
///
/// Matrices are column-major, matching both `glam` and WGSL.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct TransformUniforms {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
}

impl TransformUniforms {
    #[inline]
    pub fn new(projection: Mat4, view: Mat4, model: Mat4) -> Self {
        Self {
            projection: projection.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
        }
    }

    #[inline]
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.projection)
    }

    #[inline]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view)
    }

    #[inline]
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }

    /// Translation component of the model matrix.
    #[inline]
    pub fn model_translation(&self) -> Vec3 {
        self.model_matrix().w_axis.truncate()
    }

    /// Decodes a payload from the first `TRANSFORM_PAYLOAD_SIZE` bytes of `bytes`.
    ///
    /// Returns `None` if `bytes` is too short.
    pub fn read_from(bytes: &[u8]) -> Option<Self> {
        let payload = bytes.get(..TRANSFORM_PAYLOAD_SIZE as usize)?;
        Some(bytemuck::pod_read_unaligned(payload))
    }
}

// ── slot offsets ──────────────────────────────────────────────────────────

/// Byte offset of a slot inside the frame uniform buffer.
///
/// Always a multiple of the layout's slot size, so it can be passed directly
/// as a dynamic offset to `set_bind_group`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SlotOffset(u32);

impl SlotOffset {
    #[inline]
    pub const fn bytes(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0 as u64
    }
}

// ── slot layout ───────────────────────────────────────────────────────────

/// Rejected slot layout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("max_slots must be greater than zero")]
    ZeroSlots,

    #[error("slot size {slot_size} is smaller than the {required}-byte transform payload")]
    SlotTooSmall { slot_size: u64, required: u64 },

    #[error("slot size {slot_size} is not a multiple of the {alignment}-byte dynamic offset alignment")]
    Misaligned { slot_size: u64, alignment: u64 },

    #[error("{max_slots} slots of {slot_size} bytes do not fit in 32-bit dynamic offsets")]
    OffsetOverflow { slot_size: u64, max_slots: u32 },
}

/// Validated geometry of the frame uniform buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SlotLayout {
    slot_size: u64,
    max_slots: u32,
}

impl SlotLayout {
    /// Builds a layout, checking it against the device's
    /// `min_uniform_buffer_offset_alignment`.
    pub fn new(slot_size: u64, max_slots: u32, alignment: u32) -> Result<Self, LayoutError> {
        if max_slots == 0 {
            return Err(LayoutError::ZeroSlots);
        }
        if slot_size < TRANSFORM_PAYLOAD_SIZE {
            return Err(LayoutError::SlotTooSmall {
                slot_size,
                required: TRANSFORM_PAYLOAD_SIZE,
            });
        }
        let alignment = u64::from(alignment.max(1));
        if slot_size % alignment != 0 {
            return Err(LayoutError::Misaligned { slot_size, alignment });
        }
        let last_offset = u64::from(max_slots - 1) * slot_size;
        if last_offset > u64::from(u32::MAX) {
            return Err(LayoutError::OffsetOverflow { slot_size, max_slots });
        }
        Ok(Self { slot_size, max_slots })
    }

    #[inline]
    pub const fn slot_size(&self) -> u64 {
        self.slot_size
    }

    #[inline]
    pub const fn max_slots(&self) -> u32 {
        self.max_slots
    }

    /// Total bytes backing all slots.
    #[inline]
    pub const fn buffer_size(&self) -> u64 {
        self.slot_size * self.max_slots as u64
    }

    /// Dynamic offset of slot `index`, or `None` past the last slot.
    #[inline]
    pub fn offset(&self, index: u32) -> Option<SlotOffset> {
        if index >= self.max_slots {
            return None;
        }
        // Fits in u32: checked in `new`.
        Some(SlotOffset((u64::from(index) * self.slot_size) as u32))
    }
}

impl Default for SlotLayout {
    fn default() -> Self {
        Self {
            slot_size: UNIFORM_SIZE_PER_MESH,
            max_slots: MAX_MESHES_PER_FRAME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_constants() {
        assert_eq!(UNIFORM_SIZE_PER_MESH, 256);
        assert_eq!(MAX_MESHES_PER_FRAME, 200);
        assert_eq!(UNIFORM_BUFFER_SIZE, 51_200);
        assert_eq!(SlotLayout::default().buffer_size(), UNIFORM_BUFFER_SIZE);
    }

    #[test]
    fn offsets_are_slot_multiples() {
        let layout = SlotLayout::default();
        for i in 0..layout.max_slots() {
            let offset = layout.offset(i).unwrap();
            assert_eq!(offset.as_u64(), u64::from(i) * 256);
            assert_eq!(offset.bytes() % 256, 0);
        }
    }

    #[test]
    fn last_slot_fits_and_next_is_rejected() {
        let layout = SlotLayout::default();
        let last = layout.offset(199).unwrap();
        assert_eq!(last.bytes(), 50_944);
        assert!(last.as_u64() + TRANSFORM_PAYLOAD_SIZE <= layout.buffer_size());
        assert!(layout.offset(200).is_none());
    }

    #[test]
    fn rejects_misaligned_slot_size() {
        assert_eq!(
            SlotLayout::new(320, 10, 256),
            Err(LayoutError::Misaligned { slot_size: 320, alignment: 256 })
        );
        // 320 is fine on a device that only asks for 64-byte alignment.
        assert!(SlotLayout::new(320, 10, 64).is_ok());
    }

    #[test]
    fn rejects_undersized_and_empty_layouts() {
        assert!(matches!(SlotLayout::new(128, 10, 64), Err(LayoutError::SlotTooSmall { .. })));
        assert_eq!(SlotLayout::new(256, 0, 256), Err(LayoutError::ZeroSlots));
    }

    #[test]
    fn payload_decodes_translation() {
        let model = Mat4::from_translation(Vec3::new(-5.0, 2.0, 1.0));
        let u = TransformUniforms::new(Mat4::IDENTITY, Mat4::IDENTITY, model);
        let bytes = bytemuck::bytes_of(&u);
        let back = TransformUniforms::read_from(bytes).unwrap();
        assert_eq!(back.model_translation(), Vec3::new(-5.0, 2.0, 1.0));
        assert!(TransformUniforms::read_from(&bytes[..100]).is_none());
    }
}
