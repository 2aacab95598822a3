//! Pipeline identity.
//!
//! A [`PipelineSignature`] captures everything that forces a distinct GPU
//! pipeline object: vertex attribute layout, shader program variant and
//! fixed-function state. Two renderables with equal signatures share one
//! compiled pipeline.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::layout::TRANSFORM_PAYLOAD_SIZE;

// ── vertex layout ─────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub format: wgpu::VertexFormat,
    pub offset: u64,
    pub location: u32,
}

/// Interleaved layout of a single vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// `position: vec3, normal: vec3, color: vec3` at locations 0..=2 (36-byte stride).
    pub fn position_normal_color() -> Self {
        let attr = |location: u32| VertexAttribute {
            format: wgpu::VertexFormat::Float32x3,
            offset: u64::from(location) * 12,
            location,
        };
        Self {
            stride: 36,
            attributes: vec![attr(0), attr(1), attr(2)],
        }
    }

    pub fn to_wgpu_attributes(&self) -> Vec<wgpu::VertexAttribute> {
        self.attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: a.format,
                offset: a.offset,
                shader_location: a.location,
            })
            .collect()
    }
}

// ── fixed-function state ──────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Opaque,
    /// Straight alpha: `src * a + dst * (1 - a)`.
    AlphaBlend,
    Additive,
}

impl BlendMode {
    pub fn to_wgpu(self) -> Option<wgpu::BlendState> {
        match self {
            BlendMode::Opaque => None,
            BlendMode::AlphaBlend => Some(wgpu::BlendState::ALPHA_BLENDING),
            BlendMode::Additive => Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            }),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum DepthMode {
    /// Depth test `Less`, depth writes on.
    #[default]
    ReadWrite,
    /// Depth test `LessEqual`, no writes (transparent geometry).
    ReadOnly,
    /// No depth test.
    Disabled,
}

impl DepthMode {
    pub fn write_enabled(self) -> bool {
        matches!(self, DepthMode::ReadWrite)
    }

    pub fn compare(self) -> wgpu::CompareFunction {
        match self {
            DepthMode::ReadWrite => wgpu::CompareFunction::Less,
            DepthMode::ReadOnly => wgpu::CompareFunction::LessEqual,
            DepthMode::Disabled => wgpu::CompareFunction::Always,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

impl CullMode {
    pub fn to_wgpu(self) -> Option<wgpu::Face> {
        match self {
            CullMode::None => None,
            CullMode::Back => Some(wgpu::Face::Back),
            CullMode::Front => Some(wgpu::Face::Front),
        }
    }
}

// ── bind group layout ─────────────────────────────────────────────────────

/// Shader stages that read the per-draw transform uniforms.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum UniformVisibility {
    #[default]
    Vertex,
    VertexFragment,
}

impl UniformVisibility {
    pub fn to_wgpu(self) -> wgpu::ShaderStages {
        match self {
            UniformVisibility::Vertex => wgpu::ShaderStages::VERTEX,
            UniformVisibility::VertexFragment => {
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT
            }
        }
    }
}

/// Identity of the pipeline layout's group 0: one dynamic-offset uniform
/// binding of `binding_size` bytes.
///
/// The bind-group cache keeps exactly one bind group per key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutKey {
    pub visibility: UniformVisibility,
    pub binding_size: u32,
}

impl BindGroupLayoutKey {
    pub const fn transforms(visibility: UniformVisibility) -> Self {
        Self {
            visibility,
            binding_size: TRANSFORM_PAYLOAD_SIZE as u32,
        }
    }
}

// ── signature ─────────────────────────────────────────────────────────────

/// Content hash of a shader program (sources + entry points).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ProgramKey(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineSignature {
    pub vertex_layout: Arc<VertexLayout>,
    pub program: ProgramKey,
    pub layout: BindGroupLayoutKey,
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub cull: CullMode,
    pub topology: wgpu::PrimitiveTopology,
}

impl PipelineSignature {
    /// Stable 64-bit hash, used for labels and logs.
    pub fn fingerprint(&self) -> u64 {
        fx_hash(self)
    }
}

pub(crate) fn fx_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(blend: BlendMode) -> PipelineSignature {
        PipelineSignature {
            vertex_layout: Arc::new(VertexLayout::position_normal_color()),
            program: ProgramKey(1),
            layout: BindGroupLayoutKey::transforms(UniformVisibility::Vertex),
            blend,
            depth: DepthMode::ReadWrite,
            cull: CullMode::Back,
            topology: wgpu::PrimitiveTopology::TriangleList,
        }
    }

    #[test]
    fn equal_state_hashes_equal() {
        let a = signature(BlendMode::Opaque);
        let b = signature(BlendMode::Opaque);
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn blend_state_changes_identity() {
        assert_ne!(signature(BlendMode::Opaque), signature(BlendMode::Additive));
    }

    #[test]
    fn default_vertex_layout_is_tightly_packed() {
        let layout = VertexLayout::position_normal_color();
        let end = layout
            .attributes
            .iter()
            .map(|a| a.offset + a.format.size())
            .max()
            .unwrap();
        assert_eq!(end, layout.stride);
    }
}
