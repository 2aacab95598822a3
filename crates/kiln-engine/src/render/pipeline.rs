use rustc_hash::FxHashMap;

use crate::device::{DeviceEpoch, GpuBackend, PipelineDescriptor, PipelineHandle};
use crate::error::{BackendError, PipelineError, ShaderCompilationError};
use crate::shader::{validate_program, ShaderProgram};

use super::pipeline_key::{BindGroupLayoutKey, PipelineSignature};

/// A compiled pipeline and the group 0 layout it binds against.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PipelineEntry {
    pub handle: PipelineHandle,
    pub layout: BindGroupLayoutKey,
    pub epoch: DeviceEpoch,
}

/// Compiles and caches render pipelines keyed by [`PipelineSignature`].
///
/// Programs are validated before they reach the backend. A signature that
/// fails is remembered until the next `begin_frame`, so a broken material is
/// compiled at most once per frame no matter how many renderables use it.
#[derive(Debug, Default)]
pub struct RenderPipelineCache {
    entries: FxHashMap<PipelineSignature, PipelineEntry>,
    failed: FxHashMap<PipelineSignature, ShaderCompilationError>,
    compilations: u64,
    failures: u64,
}

impl RenderPipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets last frame's failures so they are retried.
    pub fn begin_frame(&mut self) {
        self.failed.clear();
    }

    pub fn get_or_compile<B: GpuBackend + ?Sized>(
        &mut self,
        signature: &PipelineSignature,
        program: &ShaderProgram,
        backend: &mut B,
    ) -> Result<PipelineEntry, PipelineError> {
        if let Some(entry) = self.entries.get(signature) {
            return Ok(*entry);
        }
        if let Some(err) = self.failed.get(signature) {
            return Err(PipelineError::Compilation(err.clone()));
        }

        if let Err(err) = validate_program(program, &signature.vertex_layout, signature.layout) {
            return Err(self.record_failure(signature, err));
        }

        let label = format!("{} pipeline {:016x}", program.label(), signature.fingerprint());
        let created = backend.create_render_pipeline(&PipelineDescriptor {
            label: &label,
            signature,
            program,
        });

        let handle = match created {
            Ok(handle) => handle,
            Err(BackendError::Compilation(err)) => return Err(self.record_failure(signature, err)),
            Err(other) => return Err(PipelineError::Backend(other)),
        };

        let entry = PipelineEntry {
            handle,
            layout: signature.layout,
            epoch: backend.epoch(),
        };
        self.entries.insert(signature.clone(), entry);
        self.compilations += 1;
        log::debug!("compiled {label}");
        Ok(entry)
    }

    fn record_failure(
        &mut self,
        signature: &PipelineSignature,
        err: ShaderCompilationError,
    ) -> PipelineError {
        self.failures += 1;
        self.failed.insert(signature.clone(), err.clone());
        PipelineError::Compilation(err)
    }

    /// Drops every pipeline. They recompile lazily on next use.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.failed.clear();
    }

    /// Live compiled pipelines.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Successful compilations over the cache's lifetime.
    #[inline]
    pub fn compilations(&self) -> u64 {
        self.compilations
    }

    /// Failed compilations over the cache's lifetime.
    #[inline]
    pub fn failures(&self) -> u64 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::device::RecordingBackend;
    use crate::error::ShaderStage;
    use crate::render::pipeline_key::{BlendMode, CullMode, DepthMode, VertexLayout};
    use crate::shader::builtin;

    fn signature(program: &ShaderProgram, blend: BlendMode) -> PipelineSignature {
        PipelineSignature {
            vertex_layout: Arc::new(VertexLayout::position_normal_color()),
            program: program.key(),
            layout: program.layout_key(),
            blend,
            depth: DepthMode::ReadWrite,
            cull: CullMode::Back,
            topology: wgpu::PrimitiveTopology::TriangleList,
        }
    }

    fn broken() -> ShaderProgram {
        ShaderProgram::wgsl("broken", "@vertex fn vs_main( -> {}")
    }

    #[test]
    fn same_signature_compiles_once() {
        let mut backend = RecordingBackend::default();
        let mut cache = RenderPipelineCache::new();
        let program = builtin::basic();
        let sig = signature(&program, BlendMode::Opaque);

        let a = cache.get_or_compile(&sig, &program, &mut backend).unwrap();
        let b = cache.get_or_compile(&sig, &program, &mut backend).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.compilations(), 1);
        assert_eq!(backend.counters().pipelines_created, 1);
    }

    #[test]
    fn blend_variant_is_a_separate_pipeline() {
        let mut backend = RecordingBackend::default();
        let mut cache = RenderPipelineCache::new();
        let program = builtin::basic();

        cache
            .get_or_compile(&signature(&program, BlendMode::Opaque), &program, &mut backend)
            .unwrap();
        cache
            .get_or_compile(&signature(&program, BlendMode::AlphaBlend), &program, &mut backend)
            .unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failure_is_structured_and_memoized_within_frame() {
        let mut backend = RecordingBackend::default();
        let mut cache = RenderPipelineCache::new();
        let program = broken();
        let sig = signature(&program, BlendMode::Opaque);

        cache.begin_frame();
        let err = cache.get_or_compile(&sig, &program, &mut backend).unwrap_err();
        let PipelineError::Compilation(err) = err else {
            panic!("expected a compilation error");
        };
        assert_eq!(err.stage, ShaderStage::Vertex);
        assert_eq!(err.label, "broken");

        assert!(cache.get_or_compile(&sig, &program, &mut backend).is_err());
        assert_eq!(cache.failures(), 1);

        cache.begin_frame();
        assert!(cache.get_or_compile(&sig, &program, &mut backend).is_err());
        assert_eq!(cache.failures(), 2);
        assert_eq!(backend.counters().pipelines_created, 0);
    }

    #[test]
    fn backend_rejection_is_a_compilation_error() {
        let mut backend = RecordingBackend::default();
        backend.reject_pipelines_for("kiln basic");
        let mut cache = RenderPipelineCache::new();
        let program = builtin::basic();

        let err = cache
            .get_or_compile(&signature(&program, BlendMode::Opaque), &program, &mut backend)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Compilation(ShaderCompilationError {
                stage: ShaderStage::Pipeline,
                ..
            })
        ));
    }

    #[test]
    fn clear_forces_recompilation() {
        let mut backend = RecordingBackend::default();
        let mut cache = RenderPipelineCache::new();
        let program = builtin::unlit();
        let sig = signature(&program, BlendMode::Opaque);

        cache.get_or_compile(&sig, &program, &mut backend).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        cache.get_or_compile(&sig, &program, &mut backend).unwrap();
        assert_eq!(cache.compilations(), 2);
    }
}
