//! Serializes tagged nodes into GLSL statement lists.

use crate::graph::{GpuType, InputSource, NodeGraph, NodeTag, OutputRef, Payload};

/// Unique numeric ids for every node input and output.
///
/// Assigned once for the whole graph, before any stage is serialized, so a
/// temporary keeps its name across every generated stage string.
#[derive(Clone, Debug, Default)]
pub struct UniqueIds {
    inputs: Vec<Vec<u32>>,
    outputs: Vec<Vec<u32>>,
}

impl UniqueIds {
    pub fn assign(graph: &NodeGraph) -> Self {
        let mut next = 1u32;
        let mut ids = UniqueIds::default();
        for node in graph.nodes() {
            let inputs = (0..node.inputs.len()).map(|_| bump(&mut next)).collect();
            let outputs = (0..node.outputs.len()).map(|_| bump(&mut next)).collect();
            ids.inputs.push(inputs);
            ids.outputs.push(outputs);
        }
        ids
    }

    pub fn input(&self, node: usize, slot: usize) -> u32 {
        self.inputs[node][slot]
    }

    pub fn output(&self, output: OutputRef) -> u32 {
        self.outputs[output.node.index()][output.slot]
    }
}

fn bump(next: &mut u32) -> u32 {
    let id = *next;
    *next += 1;
    id
}

/// Bit-exact constructor, e.g. `vec2(uintBitsToFloat(1065353216u), uintBitsToFloat(0u))`.
///
/// Going through the bit pattern keeps NaNs and integer payloads smuggled in
/// floats intact.
pub fn constant_literal(ty: GpuType, payload: &Payload) -> String {
    let n = ty.component_count();
    let bits: &[u32] = bytemuck::cast_slice(&payload[..n]);
    let args = bits
        .iter()
        .map(|b| format!("uintBitsToFloat({b}u)"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{ty}({args})")
}

/// Walks the graph in its stored evaluation order and emits one call block
/// per node carrying the requested tag.
pub struct SourceAssembler<'a> {
    graph: &'a NodeGraph,
    ids: UniqueIds,
}

impl<'a> SourceAssembler<'a> {
    pub fn new(graph: &'a NodeGraph) -> Self {
        Self {
            graph,
            ids: UniqueIds::assign(graph),
        }
    }

    pub fn ids(&self) -> &UniqueIds {
        &self.ids
    }

    pub fn input_ref(&self, node: usize, slot: usize) -> String {
        let input = &self.graph.nodes()[node].inputs[slot];
        let id = self.ids.input(node, slot);
        match &input.source {
            InputSource::FunctionCall(_) => format!("tmp{id}"),
            InputSource::Output(link) => self.output_ref(*link),
            InputSource::Constant(_) => format!("cons{id}"),
            InputSource::Uniform(_) => format!("node_tree.u{id}"),
            InputSource::Attribute(attr) => format!("var_attrs.v{}", attr.0),
            InputSource::UniformAttribute(key) => format!(
                "unf_attrs[resource_id].attr{}",
                self.graph.uniform_attr(*key).id
            ),
            InputSource::LayerAttribute(attr) => {
                format!("attr_load_layer({}u)", self.graph.layer_attr(*attr).hash_code)
            }
            InputSource::Struct => format!("strct{id}"),
            InputSource::Texture(tex) => self.graph.texture(*tex).sampler_name.clone(),
            InputSource::TiledTextureMapping(tex) => self
                .graph
                .texture(*tex)
                .tiled_mapping_name
                .clone()
                .unwrap_or_else(|| panic!("texture {} has no tile mapping", tex.0)),
            InputSource::Cryptomatte => "node_tree.crypto_hash".to_string(),
        }
    }

    pub fn output_ref(&self, output: OutputRef) -> String {
        format!("tmp{}", self.ids.output(output))
    }

    pub fn node_serialize(&self, out: &mut String, node_index: usize) {
        let node = &self.graph.nodes()[node_index];

        // Inline declarations for inputs that are not plain references.
        for (slot, input) in node.inputs.iter().enumerate() {
            let name = self.input_ref(node_index, slot);
            match &input.source {
                InputSource::FunctionCall(call) => {
                    out.push_str(&format!("{} {name}; {call}{name});\n", input.ty));
                }
                InputSource::Struct => {
                    out.push_str(&format!("{} {name} = CLOSURE_DEFAULT;\n", input.ty));
                }
                InputSource::Constant(payload) => {
                    out.push_str(&format!(
                        "{} {name} = {};\n",
                        input.ty,
                        constant_literal(input.ty, payload)
                    ));
                }
                _ => {}
            }
        }

        for slot in 0..node.outputs.len() {
            let output = crate::graph::NodeId(node_index as u32).output(slot);
            out.push_str(&format!(
                "{} {};\n",
                node.outputs[slot].ty,
                self.output_ref(output)
            ));
        }

        let mut args = Vec::with_capacity(node.inputs.len() + node.outputs.len());
        for (slot, input) in node.inputs.iter().enumerate() {
            let from = match input.source {
                InputSource::Output(link) => Some(self.graph.output_type(link)),
                InputSource::Attribute(attr) => Some(self.graph.attribute(attr).gpu_type),
                _ => None,
            };
            let name = self.input_ref(node_index, slot);
            match from {
                // Conversion helpers come from the codegen library, e.g. vec4_from_float().
                Some(from) if from != input.ty => {
                    args.push(format!("{}_from_{from}({name})", input.ty));
                }
                _ => args.push(name),
            }
        }
        for slot in 0..node.outputs.len() {
            let output = crate::graph::NodeId(node_index as u32).output(slot);
            args.push(self.output_ref(output));
        }
        out.push_str(&format!("{}({});\n\n", node.name, args.join(", ")));
    }

    fn serialize_tagged(&self, tag: NodeTag) -> Option<String> {
        let mut out = String::new();
        let mut any = false;
        for (index, node) in self.graph.nodes().iter().enumerate() {
            if node.tag.intersects(tag) {
                self.node_serialize(&mut out, index);
                any = true;
            }
        }
        any.then_some(out)
    }

    /// Body of one output graph, ending in `return tmpN;` for `link`.
    ///
    /// `None` when there is no link or no node carries `tag`: the stage is
    /// unused.
    pub fn graph_serialize(&self, tag: NodeTag, link: Option<OutputRef>) -> Option<String> {
        let link = link?;
        let mut out = self.serialize_tagged(tag)?;
        out.push_str(&format!("return {};\n", self.output_ref(link)));
        Some(out)
    }

    /// Every node carrying `tag`, without a return statement.
    pub fn graph_serialize_all(&self, tag: NodeTag) -> Option<String> {
        self.serialize_tagged(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AttributeKind, Input, ShaderNode};

    fn two_node_graph() -> NodeGraph {
        let mut graph = NodeGraph::new();
        let orco = graph.add_attribute(AttributeKind::Orco, "");
        let noise = graph.add_node(
            ShaderNode::new("node_noise")
                .tagged(NodeTag::SURFACE)
                .input(Input::attribute(GpuType::Vec4, orco))
                .input(Input::constant(GpuType::Float, &[1.0]))
                .input(Input::uniform(GpuType::Float, &[5.0]))
                .output(GpuType::Float)
                .output(GpuType::Vec4),
        );
        let bsdf = graph.add_node(
            ShaderNode::new("node_emission")
                .tagged(NodeTag::SURFACE)
                .input(Input::link(GpuType::Vec4, noise.output(0)))
                .input(Input::closure_default())
                .output(GpuType::Closure),
        );
        graph.outlink_surface = Some(bsdf.output(0));
        graph
    }

    #[test]
    fn ids_are_assigned_inputs_then_outputs_per_node() {
        let graph = two_node_graph();
        let ids = UniqueIds::assign(&graph);
        assert_eq!(ids.input(0, 0), 1);
        assert_eq!(ids.input(0, 2), 3);
        assert_eq!(ids.output(crate::graph::NodeId(0).output(1)), 5);
        assert_eq!(ids.input(1, 0), 6);
        assert_eq!(ids.output(crate::graph::NodeId(1).output(0)), 8);
    }

    #[test]
    fn constants_are_written_bit_exact() {
        let payload = crate::graph::types::payload_from_slice(&[1.0, f32::from_bits(7)]);
        assert_eq!(
            constant_literal(GpuType::Vec2, &payload),
            "vec2(uintBitsToFloat(1065353216u), uintBitsToFloat(7u))"
        );
    }

    #[test]
    fn surface_body_matches_expected_glsl() {
        let graph = two_node_graph();
        let assembler = SourceAssembler::new(&graph);
        let surface = assembler
            .graph_serialize(NodeTag::SURFACE, graph.outlink_surface)
            .unwrap();
        let expected = "\
float cons2 = float(uintBitsToFloat(1065353216u));
float tmp4;
vec4 tmp5;
node_noise(vec4_from_vec3(var_attrs.v0), cons2, node_tree.u3, tmp4, tmp5);

Closure strct7 = CLOSURE_DEFAULT;
Closure tmp8;
node_emission(vec4_from_float(tmp4), strct7, tmp8);

return tmp8;
";
        assert_eq!(surface, expected);
    }

    #[test]
    fn missing_link_or_nodes_yield_no_stage() {
        let graph = two_node_graph();
        let assembler = SourceAssembler::new(&graph);
        assert!(assembler.graph_serialize(NodeTag::VOLUME, None).is_none());
        assert!(
            assembler
                .graph_serialize(NodeTag::VOLUME, graph.outlink_surface)
                .is_none()
        );
        assert!(assembler.graph_serialize_all(NodeTag::COMPOSITOR).is_none());
    }

    #[test]
    fn function_call_inputs_close_the_call() {
        let mut graph = NodeGraph::new();
        graph.add_node(
            ShaderNode::new("node_bump")
                .tagged(NodeTag::FUNCTION)
                .input(Input::new(
                    GpuType::Float,
                    InputSource::FunctionCall("dF_branch(node_height, ".into()),
                ))
                .output(GpuType::Vec3),
        );
        let assembler = SourceAssembler::new(&graph);
        let body = assembler.graph_serialize_all(NodeTag::FUNCTION).unwrap();
        assert!(body.starts_with("float tmp1; dF_branch(node_height, tmp1);\n"), "{body}");
        assert!(body.contains("node_bump(tmp1, tmp2);"), "{body}");
    }

    #[test]
    fn cryptomatte_inputs_read_the_node_tree_member() {
        let mut graph = NodeGraph::new();
        let node = graph.add_node(
            ShaderNode::new("node_cryptomatte")
                .tagged(NodeTag::SURFACE)
                .input(Input::new(GpuType::Float, InputSource::Cryptomatte))
                .output(GpuType::Float),
        );
        let assembler = SourceAssembler::new(&graph);
        let body = assembler
            .graph_serialize(NodeTag::SURFACE, Some(node.output(0)))
            .unwrap();
        assert!(body.contains("node_cryptomatte(node_tree.crypto_hash, tmp2);"), "{body}");
    }
}
