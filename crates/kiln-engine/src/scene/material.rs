use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::render::pipeline_key::{BlendMode, CullMode, DepthMode};
use crate::shader::ShaderProgram;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique material identity. Shader errors are attached to it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MaterialId(u64);

impl MaterialId {
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Shader program plus fixed-function state.
///
/// Everything except `id` and `label` participates in the pipeline signature.
#[derive(Debug, Clone)]
pub struct Material {
    id: MaterialId,
    label: String,
    program: Arc<ShaderProgram>,
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub cull: CullMode,
}

impl Material {
    pub fn new(label: impl Into<String>, program: Arc<ShaderProgram>) -> Self {
        Self {
            id: MaterialId(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed)),
            label: label.into(),
            program,
            blend: BlendMode::Opaque,
            depth: DepthMode::ReadWrite,
            cull: CullMode::Back,
        }
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_depth(mut self, depth: DepthMode) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_cull(mut self, cull: CullMode) -> Self {
        self.cull = cull;
        self
    }

    #[inline]
    pub fn id(&self) -> MaterialId {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn program(&self) -> &Arc<ShaderProgram> {
        &self.program
    }
}
