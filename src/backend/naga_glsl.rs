//! Reference backend that validates GLSL with naga.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, bail};

use super::{BackendLimits, BackendShader, ShaderCompiler};
use crate::codegen::ResourceDescriptor;

/// Reflection of a naga module pair: the global resources each entry point
/// reaches.
#[derive(Debug, Default)]
pub struct NagaShader {
    locations: HashMap<String, u32>,
}

impl BackendShader for NagaShader {
    fn uniform_location(&self, name: &str) -> Option<u32> {
        self.locations.get(name).copied()
    }
}

/// Parses and validates the vertex and fragment sources of a descriptor.
///
/// Sources must be Vulkan-flavoured GLSL 450 as accepted by naga's GLSL
/// frontend; geometry stages are not supported.
#[derive(Debug, Default, Clone)]
pub struct NagaCompiler {
    limits: BackendLimits,
}

impl NagaCompiler {
    pub fn new(limits: BackendLimits) -> Self {
        Self { limits }
    }
}

impl ShaderCompiler for NagaCompiler {
    fn compile(&self, info: &ResourceDescriptor, name: &str) -> Result<Box<dyn BackendShader>> {
        if info.has_geometry_stage() {
            bail!("{name}: geometry stages are not supported by the naga backend");
        }

        let stages = [
            (naga::ShaderStage::Vertex, &info.vertex_source),
            (naga::ShaderStage::Fragment, &info.fragment_source),
        ];
        let mut shader = NagaShader::default();
        let mut compiled_any = false;
        for (stage, source) in stages {
            if source.is_empty() {
                continue;
            }
            let module = parse_glsl(source, stage)
                .with_context(|| format!("{name} generated invalid {stage:?} GLSL"))?;
            for global in referenced_globals(&module) {
                let next = shader.locations.len() as u32;
                shader.locations.entry(global).or_insert(next);
            }
            compiled_any = true;
        }
        if !compiled_any {
            bail!("{name}: descriptor has no stage sources");
        }
        Ok(Box::new(shader))
    }

    fn limits(&self) -> BackendLimits {
        self.limits
    }
}

pub fn parse_glsl(source: &str, stage: naga::ShaderStage) -> Result<naga::Module> {
    let mut parser = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options {
        stage,
        defines: Default::default(),
    };

    let module = parser
        .parse(&options, source)
        .map_err(|e| anyhow!("GLSL parse failed: {e:?}\n{}", numbered_listing(source)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("GLSL validation failed: {e:?}\n{}", numbered_listing(source)))?;

    Ok(module)
}

/// Names of global variables read by any function of the module, in
/// declaration order.
fn referenced_globals(module: &naga::Module) -> Vec<String> {
    let functions = module
        .functions
        .iter()
        .map(|(_, f)| f)
        .chain(module.entry_points.iter().map(|ep| &ep.function));

    let mut used = std::collections::HashSet::new();
    for function in functions {
        for (_, expr) in function.expressions.iter() {
            if let naga::Expression::GlobalVariable(handle) = expr {
                used.insert(*handle);
            }
        }
    }

    module
        .global_variables
        .iter()
        .filter(|(handle, _)| used.contains(handle))
        .filter_map(|(_, var)| var.name.clone())
        .collect()
}

/// Source with line numbers, appended to errors for easier debugging.
fn numbered_listing(source: &str) -> String {
    let mut output = String::from("---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");
    output
}
