//! Front-end validation of WGSL programs.
//!
//! Programs are parsed and validated with naga before they reach the device so
//! that errors come back synchronously, with a source excerpt, and can be
//! attached to the material that owns the program.

use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};

use crate::error::{ShaderCompilationError, ShaderStage};
use crate::render::pipeline_key::{BindGroupLayoutKey, UniformVisibility, VertexLayout};

use super::ShaderProgram;

struct Validated {
    module: naga::Module,
    info: ModuleInfo,
}

/// Parses and validates both stages of `program` against the vertex layout
/// and bind-group layout it will be paired with.
pub fn validate_program(
    program: &ShaderProgram,
    vertex_layout: &VertexLayout,
    layout: BindGroupLayoutKey,
) -> Result<(), ShaderCompilationError> {
    let vertex = validate_stage(
        program,
        ShaderStage::Vertex,
        program.vertex_source(),
        layout,
    )?;
    let vs = entry_point(program, ShaderStage::Vertex, &vertex.module, program.vertex_entry())?;
    check_vertex_inputs(program, &vertex.module, vs, vertex_layout)?;

    let split;
    let fragment = if program.is_single_module() {
        &vertex
    } else {
        split = validate_stage(
            program,
            ShaderStage::Fragment,
            program.fragment_source(),
            layout,
        )?;
        &split
    };
    let fs = entry_point(
        program,
        ShaderStage::Fragment,
        &fragment.module,
        program.fragment_entry(),
    )?;
    check_fragment_uniform_use(program, fragment, fs, layout)
}

fn validate_stage(
    program: &ShaderProgram,
    stage: ShaderStage,
    source: &str,
    layout: BindGroupLayoutKey,
) -> Result<Validated, ShaderCompilationError> {
    let module = parse(program, stage, source)?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::empty());
    let info = match validator.validate(&module) {
        Ok(info) => info,
        Err(err) => {
            let line = err.location(source).map(|loc| loc.line_number);
            return Err(ShaderCompilationError {
                stage,
                label: program.label().to_owned(),
                source_excerpt: excerpt(source, line),
                message: err.emit_to_string(source),
            });
        }
    };

    check_bindings(program, stage, &module, layout)?;
    Ok(Validated { module, info })
}

fn parse(
    program: &ShaderProgram,
    stage: ShaderStage,
    source: &str,
) -> Result<naga::Module, ShaderCompilationError> {
    naga::front::wgsl::parse_str(source).map_err(|err| {
        let line = err.location(source).map(|loc| loc.line_number);
        ShaderCompilationError {
            stage,
            label: program.label().to_owned(),
            source_excerpt: excerpt(source, line),
            message: err.emit_to_string(source),
        }
    })
}

/// Index of the `entry` entry point of the given stage.
fn entry_point(
    program: &ShaderProgram,
    stage: ShaderStage,
    module: &naga::Module,
    entry: &str,
) -> Result<usize, ShaderCompilationError> {
    let want = match stage {
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
        _ => naga::ShaderStage::Vertex,
    };
    module
        .entry_points
        .iter()
        .position(|ep| ep.name == entry && ep.stage == want)
        .ok_or_else(|| ShaderCompilationError {
            stage,
            label: program.label().to_owned(),
            source_excerpt: String::new(),
            message: format!("missing {stage} entry point `{entry}`"),
        })
}

/// Every `@location` the vertex entry point reads must be fed by the layout.
fn check_vertex_inputs(
    program: &ShaderProgram,
    module: &naga::Module,
    entry: usize,
    vertex_layout: &VertexLayout,
) -> Result<(), ShaderCompilationError> {
    let mut locations = Vec::new();
    for arg in &module.entry_points[entry].function.arguments {
        match &arg.binding {
            Some(binding) => locations.extend(location_of(binding)),
            None => {
                if let naga::TypeInner::Struct { members, .. } = &module.types[arg.ty].inner {
                    locations.extend(
                        members
                            .iter()
                            .filter_map(|m| m.binding.as_ref().and_then(location_of)),
                    );
                }
            }
        }
    }

    let missing = locations
        .into_iter()
        .find(|&loc| !vertex_layout.attributes.iter().any(|a| a.location == loc));
    match missing {
        None => Ok(()),
        Some(location) => Err(ShaderCompilationError {
            stage: ShaderStage::Vertex,
            label: program.label().to_owned(),
            source_excerpt: String::new(),
            message: format!(
                "vertex input @location({location}) is not provided by the geometry's vertex layout"
            ),
        }),
    }
}

fn location_of(binding: &naga::Binding) -> Option<u32> {
    match binding {
        naga::Binding::Location { location, .. } => Some(*location),
        _ => None,
    }
}

/// A vertex-only uniform may not be touched by the fragment entry point.
fn check_fragment_uniform_use(
    program: &ShaderProgram,
    fragment: &Validated,
    entry: usize,
    layout: BindGroupLayoutKey,
) -> Result<(), ShaderCompilationError> {
    if layout.visibility != UniformVisibility::Vertex {
        return Ok(());
    }
    let uses = fragment.info.get_entry_point(entry);
    let reads_uniform = fragment
        .module
        .global_variables
        .iter()
        .any(|(handle, var)| var.binding.is_some() && !uses[handle].is_empty());
    if !reads_uniform {
        return Ok(());
    }
    Err(ShaderCompilationError {
        stage: ShaderStage::Fragment,
        label: program.label().to_owned(),
        source_excerpt: String::new(),
        message: "fragment stage reads @group(0) @binding(0), which is visible to the vertex stage only"
            .to_owned(),
    })
}

/// The pipeline layout exposes a single uniform at group 0 binding 0; any
/// other resource binding would fail at pipeline creation.
fn check_bindings(
    program: &ShaderProgram,
    stage: ShaderStage,
    module: &naga::Module,
    layout: BindGroupLayoutKey,
) -> Result<(), ShaderCompilationError> {
    let fail = |message: String| ShaderCompilationError {
        stage,
        label: program.label().to_owned(),
        source_excerpt: String::new(),
        message,
    };

    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else { continue };
        if binding.group != 0 || binding.binding != 0 {
            return Err(fail(format!(
                "binding @group({}) @binding({}) is not provided by the transform layout",
                binding.group, binding.binding
            )));
        }
        if var.space != naga::AddressSpace::Uniform {
            return Err(fail(
                "@group(0) @binding(0) must be declared as var<uniform>".to_owned(),
            ));
        }
        let size = module.types[var.ty].inner.size(module.to_ctx());
        if size > layout.binding_size {
            return Err(fail(format!(
                "uniform block is {size} bytes, layout binds {} bytes",
                layout.binding_size
            )));
        }
    }
    Ok(())
}

fn excerpt(source: &str, line: Option<u32>) -> String {
    let Some(line) = line else {
        return String::new();
    };
    source
        .lines()
        .nth(line.saturating_sub(1) as usize)
        .map(|l| l.trim().to_owned())
        .unwrap_or_default()
}
