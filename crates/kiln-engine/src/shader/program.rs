use std::borrow::Cow;

use crate::render::pipeline_key::{fx_hash, BindGroupLayoutKey, ProgramKey, UniformVisibility};

pub const DEFAULT_VERTEX_ENTRY: &str = "vs_main";
pub const DEFAULT_FRAGMENT_ENTRY: &str = "fs_main";

/// WGSL vertex + fragment program.
///
/// The per-draw `Transforms` uniform sits at `@group(0) @binding(0)` and is
/// visible to the vertex stage unless widened with `with_visibility`. The
/// program key is a content hash computed once at
/// construction; two programs with identical sources and entry points share
/// pipelines.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    label: Cow<'static, str>,
    vertex_source: Cow<'static, str>,
    fragment_source: Cow<'static, str>,
    vertex_entry: Cow<'static, str>,
    fragment_entry: Cow<'static, str>,
    visibility: UniformVisibility,
    key: ProgramKey,
}

impl ShaderProgram {
    /// Single-module program with `vs_main` / `fs_main` entry points.
    pub fn wgsl(label: impl Into<Cow<'static, str>>, source: impl Into<Cow<'static, str>>) -> Self {
        let source = source.into();
        Self::build(
            label.into(),
            source.clone(),
            source,
            DEFAULT_VERTEX_ENTRY.into(),
            DEFAULT_FRAGMENT_ENTRY.into(),
            UniformVisibility::Vertex,
        )
    }

    /// Program whose stages live in separate modules.
    pub fn split(
        label: impl Into<Cow<'static, str>>,
        vertex_source: impl Into<Cow<'static, str>>,
        fragment_source: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::build(
            label.into(),
            vertex_source.into(),
            fragment_source.into(),
            DEFAULT_VERTEX_ENTRY.into(),
            DEFAULT_FRAGMENT_ENTRY.into(),
            UniformVisibility::Vertex,
        )
    }

    pub fn with_entry_points(
        self,
        vertex: impl Into<Cow<'static, str>>,
        fragment: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::build(
            self.label,
            self.vertex_source,
            self.fragment_source,
            vertex.into(),
            fragment.into(),
            self.visibility,
        )
    }

    /// Exposes the transform uniform to the fragment stage as well.
    pub fn with_visibility(self, visibility: UniformVisibility) -> Self {
        Self::build(
            self.label,
            self.vertex_source,
            self.fragment_source,
            self.vertex_entry,
            self.fragment_entry,
            visibility,
        )
    }

    fn build(
        label: Cow<'static, str>,
        vertex_source: Cow<'static, str>,
        fragment_source: Cow<'static, str>,
        vertex_entry: Cow<'static, str>,
        fragment_entry: Cow<'static, str>,
        visibility: UniformVisibility,
    ) -> Self {
        let key = ProgramKey(fx_hash(&(
            vertex_source.as_ref(),
            fragment_source.as_ref(),
            vertex_entry.as_ref(),
            fragment_entry.as_ref(),
            visibility,
        )));
        Self {
            label,
            vertex_source,
            fragment_source,
            vertex_entry,
            fragment_entry,
            visibility,
            key,
        }
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    #[inline]
    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    #[inline]
    pub fn vertex_entry(&self) -> &str {
        &self.vertex_entry
    }

    #[inline]
    pub fn fragment_entry(&self) -> &str {
        &self.fragment_entry
    }

    /// True when both stages come from the same module source.
    pub fn is_single_module(&self) -> bool {
        self.vertex_source == self.fragment_source
    }

    #[inline]
    pub fn visibility(&self) -> UniformVisibility {
        self.visibility
    }

    #[inline]
    pub fn key(&self) -> ProgramKey {
        self.key
    }

    /// Group 0 layout this program binds against.
    pub fn layout_key(&self) -> BindGroupLayoutKey {
        BindGroupLayoutKey::transforms(self.visibility)
    }
}
