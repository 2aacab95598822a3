//! Renderable records consumed from the scene collaborator.
//!
//! Responsibilities:
//! - describe what to draw: transform, geometry, material
//! - yield renderables in a caller-defined order (no implicit sorting)
//! - hand out stable identities for geometry and material caching

mod camera;
mod geometry;
mod list;
mod material;

pub use camera::Camera;
pub use geometry::{Geometry, GeometryId, Vertex};
pub use list::{Renderable, RenderableSource, Scene};
pub use material::{Material, MaterialId};
