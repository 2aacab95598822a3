use std::sync::Arc;

use glam::Mat4;

use super::{Geometry, Material};

/// One draw request: world transform, geometry and material.
#[derive(Debug, Clone)]
pub struct Renderable {
    pub transform: Mat4,
    pub geometry: Arc<Geometry>,
    pub material: Arc<Material>,
}

impl Renderable {
    pub fn new(transform: Mat4, geometry: Arc<Geometry>, material: Arc<Material>) -> Self {
        Self {
            transform,
            geometry,
            material,
        }
    }
}

/// Ordered source of renderables for one frame.
///
/// The renderer draws in exactly the order yielded; it never sorts.
pub trait RenderableSource {
    fn renderables(&self) -> impl Iterator<Item = &Renderable>;
}

impl RenderableSource for [Renderable] {
    fn renderables(&self) -> impl Iterator<Item = &Renderable> {
        self.iter()
    }
}

impl RenderableSource for Vec<Renderable> {
    fn renderables(&self) -> impl Iterator<Item = &Renderable> {
        self.iter()
    }
}

/// Flat renderable list for a frame.
///
/// Performance characteristics:
/// - `push()` is O(1)
/// - `clear()` keeps allocated capacity; no per-frame allocation once warmed
#[derive(Debug, Default)]
pub struct Scene {
    items: Vec<Renderable>,
}

impl Scene {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Clears recorded items. Keeps allocated capacity for reuse.
    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[inline]
    pub fn push(&mut self, renderable: Renderable) {
        self.items.push(renderable);
    }

    /// Convenience for `push(Renderable::new(..))`.
    pub fn add(&mut self, transform: Mat4, geometry: &Arc<Geometry>, material: &Arc<Material>) {
        self.items
            .push(Renderable::new(transform, Arc::clone(geometry), Arc::clone(material)));
    }

    /// Appends clones of `other`'s renderables.
    pub fn extend_from(&mut self, other: &Scene) {
        self.items.extend_from_slice(&other.items);
    }

    /// Items in insertion order.
    #[inline]
    pub fn items(&self) -> &[Renderable] {
        &self.items
    }

    #[inline]
    pub fn items_mut(&mut self) -> &mut [Renderable] {
        &mut self.items
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl RenderableSource for Scene {
    fn renderables(&self) -> impl Iterator<Item = &Renderable> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::shader::builtin;

    #[test]
    fn preserves_insertion_order() {
        let geometry = Arc::new(Geometry::triangle("tri", [1.0; 3]));
        let material = Arc::new(Material::new("m", Arc::new(builtin::unlit())));

        let mut scene = Scene::new();
        for x in [3.0, -1.0, 2.0] {
            scene.add(Mat4::from_translation(Vec3::new(x, 0.0, 0.0)), &geometry, &material);
        }

        let xs: Vec<f32> = scene.renderables().map(|r| r.transform.w_axis.x).collect();
        assert_eq!(xs, vec![3.0, -1.0, 2.0]);
    }

    #[test]
    fn clear_keeps_capacity() {
        let geometry = Arc::new(Geometry::triangle("tri", [1.0; 3]));
        let material = Arc::new(Material::new("m", Arc::new(builtin::unlit())));
        let mut scene = Scene::with_capacity(4);
        scene.add(Mat4::IDENTITY, &geometry, &material);
        scene.clear();
        assert!(scene.is_empty());
        assert!(scene.items.capacity() >= 4);
    }
}
