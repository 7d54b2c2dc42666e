//! Intermediate node graph a material is lowered to before GLSL generation.
//!
//! Nodes are stored in evaluation order (upstream first). Code generation
//! relies on that order and never re-sorts.

pub mod dsl;
pub mod types;

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::hash::{Murmur2A, murmur3_32};

pub use types::{
    AttributeId, AttributeKind, GpuType, Input, InputSource, LayerAttr, LayerAttrId,
    MaterialAttribute, MaterialTexture, NodeId, NodeTag, Output, OutputRef, Payload, ShaderNode,
    TextureId, TextureKind, UniformAttr, UniformAttrId,
};

/// Extra output graph identified by a hash (AOVs, compositor outputs).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashedOutputLink {
    pub hash: i32,
    pub link: OutputRef,
}

/// Named `float name()` function generated from the FUNCTION node group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionLink {
    pub name: String,
    pub link: OutputRef,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UniformAttrList {
    pub list: Vec<UniformAttr>,
    pub hash_code: u32,
}

#[derive(Clone, Debug, Default)]
pub struct NodeGraph {
    nodes: Vec<ShaderNode>,

    pub outlink_surface: Option<OutputRef>,
    pub outlink_volume: Option<OutputRef>,
    pub outlink_displacement: Option<OutputRef>,
    pub outlink_thickness: Option<OutputRef>,
    pub outlink_aovs: Vec<HashedOutputLink>,
    pub material_functions: Vec<FunctionLink>,
    pub outlink_compositor: Vec<HashedOutputLink>,

    attributes: Vec<MaterialAttribute>,
    textures: Vec<MaterialTexture>,
    uniform_attrs: UniformAttrList,
    layer_attrs: Vec<LayerAttr>,
    used_libraries: BTreeSet<String>,

    next_attr_id: u32,
    next_texture_id: u32,
    next_uniform_attr_key: u32,
    next_layer_attr_id: u32,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: ShaderNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Request a mesh attribute. Requests with the same kind and name share
    /// one attribute.
    pub fn add_attribute(&mut self, kind: AttributeKind, name: &str) -> AttributeId {
        if let Some(attr) = self
            .attributes
            .iter()
            .find(|a| a.kind == kind && a.name == name)
        {
            return AttributeId(attr.id);
        }
        let id = self.next_attr_id;
        self.next_attr_id += 1;
        self.attributes.push(MaterialAttribute::new(id, kind, name));
        AttributeId(id)
    }

    pub fn add_texture(&mut self, kind: TextureKind, image_name: &str) -> TextureId {
        if let Some(tex) = self
            .textures
            .iter()
            .find(|t| t.kind == kind && t.image_name == image_name)
        {
            return TextureId(tex.id);
        }
        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.push(MaterialTexture::new(id, kind, image_name));
        TextureId(id)
    }

    pub fn add_uniform_attr(&mut self, name: &str, use_dupli: bool) -> UniformAttrId {
        if let Some(attr) = self
            .uniform_attrs
            .list
            .iter()
            .find(|a| a.name == name && a.use_dupli == use_dupli)
        {
            return attr.key;
        }
        let key = UniformAttrId(self.next_uniform_attr_key);
        self.next_uniform_attr_key += 1;
        self.uniform_attrs.list.push(UniformAttr {
            id: self.uniform_attrs.list.len() as u32,
            name: name.to_string(),
            use_dupli,
            key,
        });
        key
    }

    pub fn add_layer_attr(&mut self, name: &str) -> LayerAttrId {
        if let Some(attr) = self.layer_attrs.iter().find(|a| a.name == name) {
            return LayerAttrId(attr.id);
        }
        let id = self.next_layer_attr_id;
        self.next_layer_attr_id += 1;
        self.layer_attrs.push(LayerAttr {
            id,
            name: name.to_string(),
            hash_code: murmur3_32(name.as_bytes(), 0),
        });
        LayerAttrId(id)
    }

    /// Record a GLSL library file the generated code calls into.
    pub fn use_library(&mut self, name: impl Into<String>) {
        self.used_libraries.insert(name.into());
    }

    pub fn nodes(&self) -> &[ShaderNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &ShaderNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ShaderNode {
        &mut self.nodes[id.index()]
    }

    pub fn output_type(&self, output: OutputRef) -> GpuType {
        self.node(output.node).outputs[output.slot].ty
    }

    pub fn attributes(&self) -> &[MaterialAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, id: AttributeId) -> &MaterialAttribute {
        self.attributes
            .iter()
            .find(|a| a.id == id.0)
            .unwrap_or_else(|| panic!("attribute {} is not part of the graph", id.0))
    }

    pub fn textures(&self) -> &[MaterialTexture] {
        &self.textures
    }

    pub fn texture(&self, id: TextureId) -> &MaterialTexture {
        self.textures
            .iter()
            .find(|t| t.id == id.0)
            .unwrap_or_else(|| panic!("texture {} is not part of the graph", id.0))
    }

    pub fn uniform_attrs(&self) -> &UniformAttrList {
        &self.uniform_attrs
    }

    pub fn uniform_attr(&self, key: UniformAttrId) -> &UniformAttr {
        self.uniform_attrs
            .list
            .iter()
            .find(|a| a.key == key)
            .unwrap_or_else(|| panic!("uniform attribute {} is not part of the graph", key.0))
    }

    pub fn layer_attrs(&self) -> &[LayerAttr] {
        &self.layer_attrs
    }

    pub fn layer_attr(&self, id: LayerAttrId) -> &LayerAttr {
        self.layer_attrs
            .iter()
            .find(|a| a.id == id.0)
            .unwrap_or_else(|| panic!("layer attribute {} is not part of the graph", id.0))
    }

    pub fn used_libraries(&self) -> &BTreeSet<String> {
        &self.used_libraries
    }

    fn output_links(&self) -> Vec<(OutputRef, NodeTag)> {
        let mut links = Vec::new();
        let mains = [
            (self.outlink_surface, NodeTag::SURFACE),
            (self.outlink_volume, NodeTag::VOLUME),
            (self.outlink_displacement, NodeTag::DISPLACEMENT),
            (self.outlink_thickness, NodeTag::THICKNESS),
        ];
        for (link, tag) in mains {
            if let Some(link) = link {
                links.push((link, tag));
            }
        }
        links.extend(self.outlink_aovs.iter().map(|l| (l.link, NodeTag::AOV)));
        links.extend(
            self.material_functions
                .iter()
                .map(|f| (f.link, NodeTag::FUNCTION)),
        );
        links.extend(
            self.outlink_compositor
                .iter()
                .map(|l| (l.link, NodeTag::COMPOSITOR)),
        );
        links
    }

    fn tag_upstream(&mut self, start: NodeId, tag: NodeTag) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = &mut self.nodes[id.index()];
            if node.tag.contains(tag) {
                continue;
            }
            node.tag |= tag;
            for input in &node.inputs {
                if let InputSource::Output(upstream) = input.source {
                    stack.push(upstream.node);
                }
            }
        }
    }

    /// Re-tag every node with the output graphs it feeds, then drop nodes and
    /// resources no output depends on.
    ///
    /// Surviving attributes and textures keep their ids, so generated names
    /// stay stable.
    pub fn prune_unused(&mut self) {
        for node in &mut self.nodes {
            node.tag = NodeTag::empty();
        }
        for (link, tag) in self.output_links() {
            self.tag_upstream(link.node, tag);
        }

        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        let mut kept = Vec::with_capacity(self.nodes.len());
        for (index, node) in std::mem::take(&mut self.nodes).into_iter().enumerate() {
            if node.tag.is_empty() {
                continue;
            }
            remap.insert(NodeId(index as u32), NodeId(kept.len() as u32));
            kept.push(node);
        }
        self.nodes = kept;

        let remap_ref = |link: &mut OutputRef| {
            // Every output link tagged its node, so it always survives.
            link.node = remap[&link.node];
        };
        for node in &mut self.nodes {
            for input in &mut node.inputs {
                if let InputSource::Output(link) = &mut input.source {
                    remap_ref(link);
                }
            }
        }
        for link in [
            &mut self.outlink_surface,
            &mut self.outlink_volume,
            &mut self.outlink_displacement,
            &mut self.outlink_thickness,
        ]
        .into_iter()
        .flatten()
        {
            remap_ref(link);
        }
        for l in &mut self.outlink_aovs {
            remap_ref(&mut l.link);
        }
        for f in &mut self.material_functions {
            remap_ref(&mut f.link);
        }
        for l in &mut self.outlink_compositor {
            remap_ref(&mut l.link);
        }

        let mut attrs = HashSet::new();
        let mut textures = HashSet::new();
        let mut uniform_attrs = HashSet::new();
        let mut layer_attrs = HashSet::new();
        for input in self.nodes.iter().flat_map(|n| n.inputs.iter()) {
            match input.source {
                InputSource::Attribute(id) => {
                    attrs.insert(id.0);
                }
                InputSource::Texture(id) | InputSource::TiledTextureMapping(id) => {
                    textures.insert(id.0);
                }
                InputSource::UniformAttribute(key) => {
                    uniform_attrs.insert(key);
                }
                InputSource::LayerAttribute(id) => {
                    layer_attrs.insert(id.0);
                }
                _ => {}
            }
        }
        self.attributes.retain(|a| attrs.contains(&a.id));
        self.textures.retain(|t| textures.contains(&t.id));
        self.uniform_attrs
            .list
            .retain(|a| uniform_attrs.contains(&a.key));
        self.layer_attrs.retain(|a| layer_attrs.contains(&a.id));
    }

    /// Give uniform attributes their final, name-ordered ids so that the
    /// per-draw buffer layout only depends on which attributes are used.
    pub fn finalize_uniform_attrs(&mut self) {
        let attrs = &mut self.uniform_attrs;
        attrs
            .list
            .sort_by(|a, b| a.name.cmp(&b.name).then(a.use_dupli.cmp(&b.use_dupli)));

        let mut hasher = Murmur2A::new(0);
        for (id, attr) in attrs.list.iter_mut().enumerate() {
            attr.id = id as u32;
            hasher.add_str(&attr.name);
            hasher.add_int(i32::from(attr.use_dupli));
        }
        attrs.hash_code = hasher.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::MAX_SAFE_ATTR_NAME;

    fn surface_chain() -> (NodeGraph, NodeId, NodeId, NodeId) {
        let mut graph = NodeGraph::new();
        let uv = graph.add_attribute(AttributeKind::Generic, "UVMap");
        let unused_attr = graph.add_attribute(AttributeKind::Tangent, "UVMap");
        let tex = graph.add_texture(TextureKind::Image, "wood.png");

        let sample = graph.add_node(
            ShaderNode::new("node_tex_image")
                .input(Input::attribute(GpuType::Vec3, uv))
                .input(Input::texture(tex))
                .output(GpuType::Vec4),
        );
        let dead = graph.add_node(
            ShaderNode::new("node_dead")
                .input(Input::attribute(GpuType::Vec4, unused_attr))
                .output(GpuType::Float),
        );
        let bsdf = graph.add_node(
            ShaderNode::new("node_bsdf_diffuse")
                .input(Input::link(GpuType::Vec4, sample.output(0)))
                .output(GpuType::Closure),
        );
        graph.outlink_surface = Some(bsdf.output(0));
        (graph, sample, dead, bsdf)
    }

    #[test]
    fn attribute_requests_are_deduplicated() {
        let mut graph = NodeGraph::new();
        let a = graph.add_attribute(AttributeKind::Generic, "Col");
        let b = graph.add_attribute(AttributeKind::Generic, "Col");
        let c = graph.add_attribute(AttributeKind::Tangent, "Col");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(graph.attributes().len(), 2);
        assert_eq!(graph.attribute(a).input_name.len(), MAX_SAFE_ATTR_NAME - 3);
        assert!(graph.attribute(a).input_name.starts_with('a'));
    }

    #[test]
    fn prune_drops_dead_nodes_and_resources() {
        let (mut graph, _, _, _) = surface_chain();
        graph.prune_unused();

        let names: Vec<_> = graph.nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["node_tex_image", "node_bsdf_diffuse"]);
        assert!(graph.nodes().iter().all(|n| n.tag == NodeTag::SURFACE));
        assert_eq!(graph.attributes().len(), 1);
        assert_eq!(graph.attributes()[0].kind, AttributeKind::Generic);
        assert_eq!(graph.textures().len(), 1);

        // Links were remapped onto the compacted node list.
        let surface = graph.outlink_surface.unwrap();
        assert_eq!(surface.node, NodeId(1));
        assert_eq!(
            graph.node(surface.node).inputs[0].source,
            InputSource::Output(NodeId(0).output(0))
        );
    }

    #[test]
    fn prune_accumulates_tags_from_every_output() {
        let (mut graph, sample, _, _) = surface_chain();
        graph.outlink_displacement = Some(sample.output(0));
        graph.outlink_aovs.push(HashedOutputLink {
            hash: 7,
            link: sample.output(0),
        });
        graph.prune_unused();

        assert_eq!(
            graph.nodes()[0].tag,
            NodeTag::SURFACE | NodeTag::DISPLACEMENT | NodeTag::AOV
        );
        assert_eq!(graph.nodes()[1].tag, NodeTag::SURFACE);
    }

    #[test]
    fn uniform_attrs_get_name_ordered_ids() {
        let mut graph = NodeGraph::new();
        let zeta = graph.add_uniform_attr("zeta", false);
        let alpha = graph.add_uniform_attr("alpha", true);
        assert_eq!(graph.add_uniform_attr("zeta", false), zeta);

        graph.finalize_uniform_attrs();
        assert_eq!(graph.uniform_attr(alpha).id, 0);
        assert_eq!(graph.uniform_attr(zeta).id, 1);

        let hash = graph.uniform_attrs().hash_code;
        graph.finalize_uniform_attrs();
        assert_eq!(graph.uniform_attrs().hash_code, hash);
    }
}
