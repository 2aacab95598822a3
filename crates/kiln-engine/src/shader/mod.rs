//! Shader programs and their validation.

pub mod builtin;
mod program;
mod validate;

pub use program::{ShaderProgram, DEFAULT_FRAGMENT_ENTRY, DEFAULT_VERTEX_ENTRY};
pub use validate::validate_program;
