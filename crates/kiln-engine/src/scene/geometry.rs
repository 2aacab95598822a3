use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::device::DrawCount;
use crate::render::pipeline_key::VertexLayout;

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Geometry`]. Keys the GPU geometry cache.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GeometryId(u64);

impl GeometryId {
    fn next() -> Self {
        Self(NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Interleaved position / normal / color vertex matching
/// [`VertexLayout::position_normal_color`].
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub const fn new(position: [f32; 3], normal: [f32; 3], color: [f32; 3]) -> Self {
        Self {
            position,
            normal,
            color,
        }
    }
}

/// CPU-side mesh data: interleaved vertex bytes described by `layout` and an
/// optional `u32` index list.
///
/// Immutable once built. Uploaded to the device at most once per device epoch.
#[derive(Debug)]
pub struct Geometry {
    id: GeometryId,
    label: String,
    layout: Arc<VertexLayout>,
    vertices: Vec<u8>,
    vertex_count: u32,
    indices: Option<Vec<u32>>,
}

impl Geometry {
    /// Builds geometry from typed vertices in the default layout.
    pub fn from_vertices(label: impl Into<String>, vertices: &[Vertex], indices: Option<Vec<u32>>) -> Self {
        Self::from_raw(
            label,
            Arc::new(VertexLayout::position_normal_color()),
            bytemuck::cast_slice(vertices).to_vec(),
            indices,
        )
    }

    /// Builds geometry from raw interleaved bytes. Trailing bytes that do not
    /// fill a whole vertex are not counted.
    pub fn from_raw(
        label: impl Into<String>,
        layout: Arc<VertexLayout>,
        vertices: Vec<u8>,
        indices: Option<Vec<u32>>,
    ) -> Self {
        let vertex_count = match layout.stride {
            0 => 0,
            stride => (vertices.len() as u64 / stride) as u32,
        };
        Self {
            id: GeometryId::next(),
            label: label.into(),
            layout,
            vertices,
            vertex_count,
            indices,
        }
    }

    /// Unit cube centered at the origin with one color per face.
    pub fn cube(label: impl Into<String>, color: [f32; 3]) -> Self {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in FACES {
            let base = vertices.len() as u32;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let position = [
                    normal[0] * 0.5 + u[0] * su + v[0] * sv,
                    normal[1] * 0.5 + u[1] * su + v[1] * sv,
                    normal[2] * 0.5 + u[2] * su + v[2] * sv,
                ];
                vertices.push(Vertex::new(position, normal, color));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::from_vertices(label, &vertices, Some(indices))
    }

    /// Single triangle in the XY plane, facing +Z.
    pub fn triangle(label: impl Into<String>, color: [f32; 3]) -> Self {
        let n = [0.0, 0.0, 1.0];
        let vertices = [
            Vertex::new([-0.5, -0.5, 0.0], n, color),
            Vertex::new([0.5, -0.5, 0.0], n, color),
            Vertex::new([0.0, 0.5, 0.0], n, color),
        ];
        Self::from_vertices(label, &vertices, None)
    }

    #[inline]
    pub fn id(&self) -> GeometryId {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn layout(&self) -> &Arc<VertexLayout> {
        &self.layout
    }

    #[inline]
    pub fn vertex_bytes(&self) -> &[u8] {
        &self.vertices
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    /// Indexed when indices are present, otherwise by vertex count.
    pub fn draw_count(&self) -> DrawCount {
        match &self.indices {
            Some(indices) => DrawCount::Indexed {
                index_count: indices.len() as u32,
            },
            None => DrawCount::NonIndexed {
                vertex_count: self.vertex_count,
            },
        }
    }

    /// No complete vertex, or an empty index list.
    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0 || self.draw_count().is_empty()
    }

    pub fn triangle_count(&self) -> u64 {
        match &self.indices {
            Some(indices) => indices.len() as u64 / 3,
            None => u64::from(self.vertex_count / 3),
        }
    }
}
