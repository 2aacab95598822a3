//! Programs shipped with the engine.

use super::ShaderProgram;

/// Vertex-colored geometry with a single directional light.
pub fn basic() -> ShaderProgram {
    ShaderProgram::wgsl("kiln basic", include_str!("shaders/basic.wgsl"))
}

/// Vertex-colored geometry without lighting.
pub fn unlit() -> ShaderProgram {
    ShaderProgram::wgsl("kiln unlit", include_str!("shaders/unlit.wgsl"))
}
