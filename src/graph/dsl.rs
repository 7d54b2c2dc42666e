//! JSON description of a node graph.
//!
//! Nodes are listed in evaluation order and refer to upstream nodes by id, so
//! a link may only point at a node declared earlier in the list.

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use super::{
    AttributeKind, FunctionLink, GpuType, HashedOutputLink, Input, InputSource, NodeGraph, NodeId,
    OutputRef, ShaderNode, TextureKind, types::payload_from_slice,
};
use crate::material::Material;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GraphDocument {
    #[serde(default)]
    pub material: Material,
    pub nodes: Vec<NodeDesc>,
    #[serde(default)]
    pub outputs: OutputsDesc,
    #[serde(default)]
    pub libraries: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeDesc {
    pub id: String,
    /// GLSL function called for this node.
    pub function: String,
    #[serde(default)]
    pub inputs: Vec<InputDesc>,
    #[serde(default)]
    pub outputs: Vec<GpuType>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InputDesc {
    #[serde(rename = "type")]
    pub ty: GpuType,
    pub from: SourceDesc,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub enum SourceDesc {
    Link(LinkDesc),
    Constant(Vec<f32>),
    Uniform(Vec<f32>),
    Attribute {
        kind: AttributeKind,
        #[serde(default)]
        name: String,
    },
    UniformAttribute {
        name: String,
        #[serde(default, rename = "useDupli")]
        use_dupli: bool,
    },
    LayerAttribute(String),
    Struct,
    Cryptomatte,
    Texture {
        kind: TextureKind,
        image: String,
    },
    TiledMapping(String),
    FunctionCall(String),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LinkDesc {
    pub node: String,
    #[serde(default)]
    pub output: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HashedLinkDesc {
    pub hash: i32,
    #[serde(flatten)]
    pub link: LinkDesc,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FunctionLinkDesc {
    pub name: String,
    #[serde(flatten)]
    pub link: LinkDesc,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct OutputsDesc {
    #[serde(default)]
    pub surface: Option<LinkDesc>,
    #[serde(default)]
    pub volume: Option<LinkDesc>,
    #[serde(default)]
    pub displacement: Option<LinkDesc>,
    #[serde(default)]
    pub thickness: Option<LinkDesc>,
    #[serde(default)]
    pub aovs: Vec<HashedLinkDesc>,
    #[serde(default)]
    pub functions: Vec<FunctionLinkDesc>,
    #[serde(default)]
    pub compositor: Vec<HashedLinkDesc>,
}

struct GraphBuilder {
    graph: NodeGraph,
    ids: HashMap<String, NodeId>,
}

impl GraphBuilder {
    fn resolve(&self, link: &LinkDesc) -> Result<OutputRef> {
        let node = *self
            .ids
            .get(&link.node)
            .ok_or_else(|| anyhow!("link to unknown or later node: {}", link.node))?;
        let outputs = self.graph.node(node).outputs.len();
        if link.output >= outputs {
            bail!(
                "node {} has {outputs} outputs, link asks for output {}",
                link.node,
                link.output
            );
        }
        Ok(node.output(link.output))
    }

    fn input(&mut self, desc: &InputDesc) -> Result<Input> {
        let source = match &desc.from {
            SourceDesc::Link(link) => InputSource::Output(self.resolve(link)?),
            SourceDesc::Constant(values) => InputSource::Constant(payload(desc.ty, values)?),
            SourceDesc::Uniform(values) => InputSource::Uniform(payload(desc.ty, values)?),
            SourceDesc::Attribute { kind, name } => {
                InputSource::Attribute(self.graph.add_attribute(*kind, name))
            }
            SourceDesc::UniformAttribute { name, use_dupli } => {
                InputSource::UniformAttribute(self.graph.add_uniform_attr(name, *use_dupli))
            }
            SourceDesc::LayerAttribute(name) => {
                InputSource::LayerAttribute(self.graph.add_layer_attr(name))
            }
            SourceDesc::Struct => InputSource::Struct,
            SourceDesc::Cryptomatte => InputSource::Cryptomatte,
            SourceDesc::Texture { kind, image } => {
                InputSource::Texture(self.graph.add_texture(*kind, image))
            }
            SourceDesc::TiledMapping(image) => {
                InputSource::TiledTextureMapping(self.graph.add_texture(TextureKind::Tiled, image))
            }
            SourceDesc::FunctionCall(call) => InputSource::FunctionCall(call.clone()),
        };
        Ok(Input::new(desc.ty, source))
    }
}

fn payload(ty: GpuType, values: &[f32]) -> Result<super::Payload> {
    if values.len() != ty.component_count() {
        bail!(
            "{ty} value needs {} components, got {}",
            ty.component_count(),
            values.len()
        );
    }
    Ok(payload_from_slice(values))
}

pub fn build_graph(doc: &GraphDocument) -> Result<NodeGraph> {
    let mut builder = GraphBuilder {
        graph: NodeGraph::new(),
        ids: HashMap::new(),
    };

    for desc in &doc.nodes {
        if builder.ids.contains_key(&desc.id) {
            bail!("duplicate node id: {}", desc.id);
        }
        let mut node = ShaderNode::new(&desc.function);
        for (i, input) in desc.inputs.iter().enumerate() {
            let input = builder
                .input(input)
                .with_context(|| format!("node {} input {i}", desc.id))?;
            node = node.input(input);
        }
        for ty in &desc.outputs {
            node = node.output(*ty);
        }
        let id = builder.graph.add_node(node);
        builder.ids.insert(desc.id.clone(), id);
    }

    let outputs = &doc.outputs;
    let main = |link: &Option<LinkDesc>| link.as_ref().map(|l| builder.resolve(l)).transpose();
    let surface = main(&outputs.surface).context("surface output")?;
    let volume = main(&outputs.volume).context("volume output")?;
    let displacement = main(&outputs.displacement).context("displacement output")?;
    let thickness = main(&outputs.thickness).context("thickness output")?;

    let mut aovs = Vec::new();
    for aov in &outputs.aovs {
        aovs.push(HashedOutputLink {
            hash: aov.hash,
            link: builder.resolve(&aov.link).context("aov output")?,
        });
    }
    let mut functions = Vec::new();
    for f in &outputs.functions {
        functions.push(FunctionLink {
            name: f.name.clone(),
            link: builder
                .resolve(&f.link)
                .with_context(|| format!("function {}", f.name))?,
        });
    }
    let mut compositor = Vec::new();
    for c in &outputs.compositor {
        compositor.push(HashedOutputLink {
            hash: c.hash,
            link: builder.resolve(&c.link).context("compositor output")?,
        });
    }

    let mut graph = builder.graph;
    graph.outlink_surface = surface;
    graph.outlink_volume = volume;
    graph.outlink_displacement = displacement;
    graph.outlink_thickness = thickness;
    graph.outlink_aovs = aovs;
    graph.material_functions = functions;
    graph.outlink_compositor = compositor;
    for lib in &doc.libraries {
        graph.use_library(lib.clone());
    }
    Ok(graph)
}

pub fn load_document_from_str(text: &str) -> Result<GraphDocument> {
    serde_json::from_str(text).context("invalid graph json")
}

pub fn load_document_from_path(path: impl AsRef<Path>) -> Result<GraphDocument> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read graph json {}", path.display()))?;
    load_document_from_str(&text).with_context(|| format!("in {}", path.display()))
}

pub fn load_graph_from_str(text: &str) -> Result<(Material, NodeGraph)> {
    let doc = load_document_from_str(text)?;
    let graph = build_graph(&doc)?;
    Ok((doc.material, graph))
}

pub fn load_graph_from_path(path: impl AsRef<Path>) -> Result<(Material, NodeGraph)> {
    let doc = load_document_from_path(path)?;
    let graph = build_graph(&doc)?;
    Ok((doc.material, graph))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"{
        "material": { "uuid": 3, "name": "Wood" },
        "nodes": [
            { "id": "uv", "function": "node_uvmap",
              "inputs": [ { "type": "vec4", "from": { "attribute": { "kind": "generic", "name": "UVMap" } } } ],
              "outputs": ["vec3"] },
            { "id": "tex", "function": "node_tex_image",
              "inputs": [
                { "type": "vec3", "from": { "link": { "node": "uv" } } },
                { "type": "vec4", "from": { "texture": { "kind": "image", "image": "wood.png" } } }
              ],
              "outputs": ["vec4", "float"] }
        ],
        "outputs": { "surface": { "node": "tex", "output": 0 } },
        "libraries": ["gpu_shader_material_tex_image.glsl"]
    }"#;

    #[test]
    fn builds_nodes_links_and_resources() {
        let (material, graph) = load_graph_from_str(SIMPLE).unwrap();
        assert_eq!(material.uuid, 3);
        assert_eq!(material.name.as_deref(), Some("Wood"));
        assert_eq!(graph.nodes().len(), 2);
        assert_eq!(graph.attributes().len(), 1);
        assert_eq!(graph.textures().len(), 1);
        assert_eq!(graph.outlink_surface, Some(NodeId(1).output(0)));
        assert_eq!(
            graph.nodes()[1].inputs[0].source,
            InputSource::Output(NodeId(0).output(0))
        );
        assert!(graph.used_libraries().contains("gpu_shader_material_tex_image.glsl"));
    }

    #[test]
    fn rejects_forward_links() {
        let text = r#"{
            "nodes": [
                { "id": "a", "function": "f",
                  "inputs": [ { "type": "float", "from": { "link": { "node": "b" } } } ],
                  "outputs": ["float"] },
                { "id": "b", "function": "g", "outputs": ["float"] }
            ]
        }"#;
        let err = load_graph_from_str(text).unwrap_err();
        assert!(format!("{err:#}").contains("unknown or later node: b"), "{err:#}");
    }

    #[test]
    fn rejects_constant_with_wrong_arity() {
        let text = r#"{
            "nodes": [
                { "id": "a", "function": "f",
                  "inputs": [ { "type": "vec3", "from": { "constant": [1.0, 2.0] } } ],
                  "outputs": ["float"] }
            ]
        }"#;
        let err = load_graph_from_str(text).unwrap_err();
        assert!(format!("{err:#}").contains("vec3 value needs 3 components"), "{err:#}");
    }
}
