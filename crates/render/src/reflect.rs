//! WGSL stage reflection.
//!
//! Parses and validates a stage with naga, then records the entry point's
//! `@location` inputs and outputs and the module's `var<uniform>` globals.
//! Backends use this to resolve attributes and uniforms by name and to check
//! that two stages fit together.

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Module, ScalarKind, TypeInner};

use crate::device::ShaderStage;

/// Scalar kind of an interface variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Float,
    Sint,
    Uint,
    Bool,
}

/// Type of an interface variable: a scalar or a 2/3/4 vector of 32-bit scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoType {
    pub scalar: ScalarType,
    pub components: u32,
}

/// A `@location` input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoVar {
    pub name: String,
    pub location: u32,
    pub ty: IoType,
}

/// A `var<uniform>` global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformVar {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    /// Size in bytes.
    pub size: u32,
}

/// What one compiled stage exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReflection {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub inputs: Vec<IoVar>,
    pub outputs: Vec<IoVar>,
    pub uniforms: Vec<UniformVar>,
}

/// Interface of a linked vertex + fragment pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedInterface {
    /// Vertex inputs, ordered by location.
    pub attributes: Vec<IoVar>,
    /// Uniforms of both stages, ordered by binding.
    pub uniforms: Vec<UniformVar>,
}

impl LinkedInterface {
    pub fn attribute(&self, name: &str) -> Option<&IoVar> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_at(&self, location: u32) -> Option<&IoVar> {
        self.attributes.iter().find(|a| a.location == location)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformVar> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    pub fn uniform_at(&self, group: u32, binding: u32) -> Option<&UniformVar> {
        self.uniforms
            .iter()
            .find(|u| u.group == group && u.binding == binding)
    }
}

/// Parses, validates and reflects one stage. The error is the compiler log.
pub fn reflect_stage(stage: ShaderStage, source: &str) -> Result<StageReflection, String> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| e.emit_to_string(source))?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let wanted = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == wanted)
        .ok_or_else(|| format!("no @{stage} entry point found"))?;

    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        collect_io(
            &module,
            arg.name.as_deref(),
            arg.ty,
            arg.binding.as_ref(),
            &mut inputs,
        )?;
    }

    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_io(
            &module,
            None,
            result.ty,
            result.binding.as_ref(),
            &mut outputs,
        )?;
    }

    inputs.sort_by_key(|v| v.location);
    outputs.sort_by_key(|v| v.location);

    let gctx = module.to_ctx();
    let uniforms = module
        .global_variables
        .iter()
        .filter(|(_, var)| var.space == AddressSpace::Uniform)
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            Some(UniformVar {
                name: var.name.clone().unwrap_or_default(),
                group: binding.group,
                binding: binding.binding,
                size: module.types[var.ty].inner.size(gctx),
            })
        })
        .collect();

    Ok(StageReflection {
        stage,
        entry_point: entry.name.clone(),
        inputs,
        outputs,
        uniforms,
    })
}

/// Records `@location` variables reachable from one argument or result,
/// descending into struct members. Builtins are skipped.
fn collect_io(
    module: &Module,
    name: Option<&str>,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    out: &mut Vec<IoVar>,
) -> Result<(), String> {
    let inner = &module.types[ty].inner;
    match binding {
        Some(Binding::BuiltIn(_)) => Ok(()),
        Some(Binding::Location { location, .. }) => {
            let name = name.unwrap_or("result");
            let Some(ty) = io_type(inner) else {
                return Err(format!("`{name}` at location {location} has an unsupported type"));
            };
            out.push(IoVar {
                name: name.to_string(),
                location: *location,
                ty,
            });
            Ok(())
        }
        None => match inner {
            TypeInner::Struct { members, .. } => {
                for member in members {
                    collect_io(
                        module,
                        member.name.as_deref(),
                        member.ty,
                        member.binding.as_ref(),
                        out,
                    )?;
                }
                Ok(())
            }
            _ => Err(format!(
                "`{}` has no @location or @builtin binding",
                name.unwrap_or("result")
            )),
        },
    }
}

fn io_type(inner: &TypeInner) -> Option<IoType> {
    let (scalar, components) = match inner {
        TypeInner::Scalar(s) => (*s, 1),
        TypeInner::Vector { size, scalar } => (*scalar, *size as u32),
        _ => return None,
    };
    if scalar.width != 4 && scalar.kind != ScalarKind::Bool {
        return None;
    }
    let scalar = match scalar.kind {
        ScalarKind::Float => ScalarType::Float,
        ScalarKind::Sint => ScalarType::Sint,
        ScalarKind::Uint => ScalarType::Uint,
        ScalarKind::Bool => ScalarType::Bool,
        _ => return None,
    };
    Some(IoType { scalar, components })
}

/// Checks that `vertex` feeds every input of `fragment` and that shared
/// uniforms agree. The error is the linker log.
pub fn link_stages(
    vertex: &StageReflection,
    fragment: &StageReflection,
) -> Result<LinkedInterface, String> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(format!(
            "expected a vertex and a fragment stage, got {} and {}",
            vertex.stage, fragment.stage
        ));
    }

    let mut log = Vec::new();
    for input in &fragment.inputs {
        match vertex.outputs.iter().find(|o| o.location == input.location) {
            None => log.push(format!(
                "fragment input `{}` at location {} is not written by the vertex stage",
                input.name, input.location
            )),
            Some(output) if output.ty != input.ty => log.push(format!(
                "location {}: vertex writes {:?} but fragment reads {:?}",
                input.location, output.ty, input.ty
            )),
            Some(_) => {}
        }
    }

    let mut uniforms: Vec<UniformVar> = Vec::new();
    for uniform in vertex.uniforms.iter().chain(&fragment.uniforms) {
        if uniform.group != 0 {
            log.push(format!(
                "uniform `{}` uses bind group {}; only group 0 is supported",
                uniform.name, uniform.group
            ));
            continue;
        }
        match uniforms.iter().find(|u| u.binding == uniform.binding) {
            None => uniforms.push(uniform.clone()),
            Some(existing) if existing != uniform => log.push(format!(
                "binding {} declared as `{}` ({} bytes) and `{}` ({} bytes)",
                uniform.binding, existing.name, existing.size, uniform.name, uniform.size
            )),
            Some(_) => {}
        }
    }

    if !log.is_empty() {
        return Err(log.join("\n"));
    }

    uniforms.sort_by_key(|u| u.binding);
    Ok(LinkedInterface {
        attributes: vertex.inputs.clone(),
        uniforms,
    })
}
