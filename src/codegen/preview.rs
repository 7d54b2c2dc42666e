//! Standalone fragment shader around generated node code.
//!
//! Node library bodies are replaced by stubs with the signatures the
//! generated calls use, so the result checks the generated code itself with
//! a GLSL front-end. Samplers become float placeholders: naga's GLSL
//! front-end has no combined image samplers.

use std::collections::HashSet;

use super::CodegenOutput;
use crate::graph::{GpuType, InputSource, NodeGraph, OutputRef};

const PRELUDE: &str = "#version 450
#define resource_id 0
struct Closure {
  vec4 radiance;
};
#define CLOSURE_DEFAULT Closure(vec4(0.0))
";

fn zero(ty: GpuType) -> String {
    match ty {
        GpuType::Float => "0.0".to_string(),
        GpuType::Closure => "CLOSURE_DEFAULT".to_string(),
        other => format!("{other}(0.0)"),
    }
}

/// Type a node function receives for an input, after conversions.
fn argument_type(source: &InputSource, ty: GpuType) -> GpuType {
    match source {
        InputSource::UniformAttribute(_) | InputSource::LayerAttribute(_) => GpuType::Vec4,
        InputSource::Cryptomatte => GpuType::Float,
        // Placeholder for the sampler binding.
        InputSource::Texture(_) | InputSource::TiledTextureMapping(_) => GpuType::Float,
        _ => ty,
    }
}

#[derive(Default)]
struct Stubs {
    seen: HashSet<String>,
    source: String,
}

impl Stubs {
    fn push(&mut self, signature: String, body: String) {
        if self.seen.insert(signature.clone()) {
            self.source.push_str(&format!("{signature} {{\n{body}}}\n\n"));
        }
    }

    fn conversion(&mut self, from: GpuType, to: GpuType) {
        self.push(
            format!("{to} {to}_from_{from}({from} v)"),
            format!("  return {};\n", zero(to)),
        );
    }

    fn node(&mut self, graph: &NodeGraph, index: usize) {
        let node = &graph.nodes()[index];
        let mut params = Vec::new();
        let mut body = String::new();
        for (slot, input) in node.inputs.iter().enumerate() {
            let from = match input.source {
                InputSource::Output(link) => Some(graph.output_type(link)),
                InputSource::Attribute(attr) => Some(graph.attribute(attr).gpu_type),
                _ => None,
            };
            if let Some(from) = from.filter(|from| *from != input.ty) {
                self.conversion(from, input.ty);
            }
            if let InputSource::FunctionCall(call) = &input.source {
                self.function_call(call, input.ty);
            }
            if let InputSource::LayerAttribute(_) = input.source {
                self.push(
                    "vec4 attr_load_layer(uint hash)".to_string(),
                    "  return vec4(0.0);\n".to_string(),
                );
            }
            let ty = argument_type(&input.source, input.ty);
            params.push(format!("in {ty} i{slot}"));
        }
        for (slot, output) in node.outputs.iter().enumerate() {
            params.push(format!("out {} o{slot}", output.ty));
            body.push_str(&format!("  o{slot} = {};\n", zero(output.ty)));
        }
        self.push(format!("void {}({})", node.name, params.join(", ")), body);
    }

    /// Only calls of the form `name(` get a stub; prefixes carrying their own
    /// arguments rely on the real library.
    fn function_call(&mut self, call: &str, ty: GpuType) {
        let Some(name) = call.strip_suffix('(') else {
            return;
        };
        if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.push(
                format!("void {name}(out {ty} o)"),
                format!("  o = {};\n", zero(ty)),
            );
        }
    }
}

fn stage_function(
    ss: &mut String,
    graph: &NodeGraph,
    name: &str,
    link: Option<OutputRef>,
    body: &Option<String>,
) {
    if let (Some(link), Some(body)) = (link, body) {
        let ret = graph.output_type(link);
        ss.push_str(&format!("{ret} {name}()\n{{\n{body}}}\n\n"));
    }
}

/// Fragment shader wrapping every generated stage of `out` into a function,
/// with stubs for the node functions of `graph`.
///
/// `graph` must be the pruned graph `out` was generated from.
pub fn preview_fragment_source(graph: &NodeGraph, out: &CodegenOutput) -> String {
    let info = &out.descriptor;
    let mut ss = String::from(PRELUDE);
    ss.push_str(&info.uniform_declarations());
    for sampler in &info.samplers {
        ss.push_str(&format!("const float {} = 0.0;\n", sampler.name));
    }
    if let Some(iface) = &info.vertex_out {
        ss.push_str(&format!("struct {} {{\n", iface.name));
        for (ty, member) in &iface.members {
            ss.push_str(&format!("  {ty} {member};\n"));
        }
        ss.push_str(&format!("}};\n{} {};\n", iface.name, iface.instance_name));
    }
    ss.push('\n');

    let mut stubs = Stubs::default();
    for index in 0..graph.nodes().len() {
        stubs.node(graph, index);
    }
    ss.push_str(&stubs.source);

    if let Some(functions) = &out.material_functions {
        ss.push_str(functions);
    }
    stage_function(&mut ss, graph, "nodetree_surface", graph.outlink_surface, &out.surface);
    stage_function(&mut ss, graph, "nodetree_volume", graph.outlink_volume, &out.volume);
    stage_function(
        &mut ss,
        graph,
        "nodetree_displacement",
        graph.outlink_displacement,
        &out.displacement,
    );
    stage_function(&mut ss, graph, "nodetree_thickness", graph.outlink_thickness, &out.thickness);
    if let Some(composite) = &out.composite {
        ss.push_str(&format!("void nodetree_composite()\n{{\n{composite}}}\n\n"));
    }

    ss.push_str("layout(location = 0) out vec4 out_color;\n");
    ss.push_str("void main() {\n  out_color = vec4(0.0);\n}\n");
    ss
}
