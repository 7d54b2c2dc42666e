//! GLSL-visible resources of a generated shader.
//!
//! The [`ResourceDescriptor`] is also the structural identity of a pass: two
//! passes are the same shader only if their descriptors compare equal.

use crate::{
    config::CacheConfig,
    graph::{AttributeKind, GpuType, NodeGraph, TextureKind},
    material::{Material, MaterialFlags},
};

use super::uniform_buffer::UniformBufferLayout;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageType {
    Float1DArray,
    Float2D,
    Float2DArray,
}

impl ImageType {
    pub fn glsl_sampler(self) -> &'static str {
        match self {
            ImageType::Float1DArray => "sampler1DArray",
            ImageType::Float2D => "sampler2D",
            ImageType::Float2DArray => "sampler2DArray",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SamplerBinding {
    pub slot: u32,
    pub image_type: ImageType,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UniformBufferBinding {
    pub slot: u32,
    pub type_name: String,
    /// Instance name, may carry an array suffix (`unf_attrs[512]`).
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexInput {
    pub slot: u32,
    pub ty: GpuType,
    pub name: String,
}

/// Vertex to fragment interface block. Members carry no qualifier, so they
/// get the default smooth interpolation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StageInterface {
    pub name: String,
    pub instance_name: String,
    pub members: Vec<(GpuType, String)>,
}

/// Node code a descriptor was generated from, before finalization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneratedCode {
    pub attr_load: Option<String>,
    pub surface: Option<String>,
    pub volume: Option<String>,
    pub displacement: Option<String>,
    pub thickness: Option<String>,
    pub composite: Option<String>,
    pub material_functions: Option<String>,
}

/// Everything the backend needs to build the shader.
///
/// Codegen fills the resource part and `generated`; the engine's finalize
/// callback fills the stage sources. `name` is a debug label and does not take
/// part in equality.
#[derive(Clone, Debug, Default)]
pub struct ResourceDescriptor {
    pub name: String,
    pub defines: Vec<String>,
    /// Engine-provided info blocks pulled in by name.
    pub additional_info: Vec<String>,
    pub vertex_inputs: Vec<VertexInput>,
    pub vertex_out: Option<StageInterface>,
    pub samplers: Vec<SamplerBinding>,
    pub uniform_buffers: Vec<UniformBufferBinding>,
    pub typedef_source: String,
    /// Resolved GLSL library files, dependencies first.
    pub dependencies: Vec<String>,
    pub vertex_source: String,
    pub geometry_source: Option<String>,
    pub fragment_source: String,
    /// Keeps passes with equal resources but different node code apart, even
    /// when the finalize callback does not embed that code.
    pub generated: GeneratedCode,
}

impl PartialEq for ResourceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.defines == other.defines
            && self.additional_info == other.additional_info
            && self.vertex_inputs == other.vertex_inputs
            && self.vertex_out == other.vertex_out
            && self.samplers == other.samplers
            && self.uniform_buffers == other.uniform_buffers
            && self.typedef_source == other.typedef_source
            && self.dependencies == other.dependencies
            && self.vertex_source == other.vertex_source
            && self.geometry_source == other.geometry_source
            && self.fragment_source == other.fragment_source
            && self.generated == other.generated
    }
}

impl Eq for ResourceDescriptor {}

impl ResourceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn define(&mut self, name: &str) {
        self.defines.push(name.to_string());
    }

    pub fn sampler(&mut self, slot: u32, image_type: ImageType, name: &str) {
        self.samplers.push(SamplerBinding {
            slot,
            image_type,
            name: name.to_string(),
        });
    }

    pub fn uniform_buf(&mut self, slot: u32, type_name: &str, name: &str) {
        self.uniform_buffers.push(UniformBufferBinding {
            slot,
            type_name: type_name.to_string(),
            name: name.to_string(),
        });
    }

    pub fn has_geometry_stage(&self) -> bool {
        self.geometry_source.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// GLSL declarations for defines, typedefs and resource bindings, for
    /// finalize callbacks that assemble full stage sources.
    pub fn declarations(&self) -> String {
        let mut ss = self.uniform_declarations();
        ss.push_str(&self.sampler_declarations());
        ss
    }

    /// Defines, typedefs and uniform buffer blocks.
    pub fn uniform_declarations(&self) -> String {
        let mut ss = String::new();
        for define in &self.defines {
            ss.push_str(&format!("#define {define}\n"));
        }
        ss.push_str(&self.typedef_source);
        for ubo in &self.uniform_buffers {
            let (instance, array) = match ubo.name.find('[') {
                Some(i) => ubo.name.split_at(i),
                None => (ubo.name.as_str(), ""),
            };
            ss.push_str(&format!(
                "layout(binding = {}, std140) uniform {}_block {{\n  {} {instance}{array};\n}};\n",
                ubo.slot, ubo.type_name, ubo.type_name
            ));
        }
        ss
    }

    pub fn sampler_declarations(&self) -> String {
        let mut ss = String::new();
        for sampler in &self.samplers {
            ss.push_str(&format!(
                "layout(binding = {}) uniform {} {};\n",
                sampler.slot,
                sampler.image_type.glsl_sampler(),
                sampler.name
            ));
        }
        ss
    }

    /// Vertex stage inputs and interface block.
    pub fn vertex_declarations(&self) -> String {
        let mut ss = String::new();
        for input in &self.vertex_inputs {
            ss.push_str(&format!(
                "layout(location = {}) in {} {};\n",
                input.slot, input.ty, input.name
            ));
        }
        if let Some(iface) = &self.vertex_out {
            ss.push_str(&self.interface_block("out", iface));
        }
        ss
    }

    /// Fragment stage view of the interface block.
    pub fn fragment_declarations(&self) -> String {
        self.vertex_out
            .as_ref()
            .map(|iface| self.interface_block("in", iface))
            .unwrap_or_default()
    }

    fn interface_block(&self, direction: &str, iface: &StageInterface) -> String {
        let mut ss = format!("{direction} {} {{\n", iface.name);
        for (ty, name) in &iface.members {
            ss.push_str(&format!("  {ty} {name};\n"));
        }
        ss.push_str(&format!("}} {};\n", iface.instance_name));
        ss
    }
}

/// Vertex inputs and interface block for every requested attribute.
///
/// Slots are handed out from the top of the attribute budget downwards.
/// Returns the `attr_load` statements, or `None` without attributes.
///
/// # Panics
///
/// When the graph requests more attributes than there are vertex slots. This
/// is a content limit, not a runtime condition.
pub fn build_attribs(
    graph: &NodeGraph,
    config: &CacheConfig,
    info: &mut ResourceDescriptor,
) -> Option<String> {
    if graph.attributes().is_empty() {
        return None;
    }
    assert!(
        graph.attributes().len() <= config.max_vertex_attributes,
        "too many attributes: {} requested, {} vertex slots available",
        graph.attributes().len(),
        config.max_vertex_attributes
    );

    let mut iface = StageInterface {
        name: "codegen_iface".to_string(),
        instance_name: "var_attrs".to_string(),
        members: Vec::new(),
    };
    let mut load_ss = String::new();
    let mut slot = config.max_vertex_attributes as u32;

    for attr in graph.attributes() {
        slot -= 1;
        let attr_name = &attr.input_name;
        let var_name = format!("v{}", attr.id);

        load_ss.push_str(&format!("var_attrs.{var_name}"));
        let (input_type, iface_type) = match attr.kind {
            AttributeKind::Orco => {
                // vec4 so the default attribute value (w = 0) is detectable.
                load_ss.push_str(&format!(" = attr_load_orco({attr_name});\n"));
                (GpuType::Vec4, GpuType::Vec3)
            }
            AttributeKind::HairLength => {
                load_ss.push_str(&format!(" = attr_load_float({attr_name});\n"));
                (GpuType::Float, GpuType::Float)
            }
            AttributeKind::Tangent => {
                load_ss.push_str(&format!(" = attr_load_tangent({attr_name});\n"));
                (GpuType::Vec4, GpuType::Vec4)
            }
            AttributeKind::Generic => {
                load_ss.push_str(&format!(" = attr_load_vec4({attr_name});\n"));
                (GpuType::Vec4, GpuType::Vec4)
            }
        };

        info.vertex_inputs.push(VertexInput {
            slot,
            ty: input_type,
            name: attr_name.clone(),
        });
        iface.members.push((iface_type, var_name));
    }

    info.vertex_out = Some(iface);
    Some(load_ss)
}

/// Defines, samplers and uniform buffers.
pub fn build_resources(
    material: &Material,
    graph: &NodeGraph,
    ubo: Option<&UniformBufferLayout>,
    config: &CacheConfig,
    info: &mut ResourceDescriptor,
) {
    let defines = [
        (MaterialFlags::PRINCIPLED_CLEARCOAT, "PRINCIPLED_CLEARCOAT"),
        (MaterialFlags::PRINCIPLED_METALLIC, "PRINCIPLED_METALLIC"),
        (MaterialFlags::PRINCIPLED_DIELECTRIC, "PRINCIPLED_DIELECTRIC"),
        (MaterialFlags::PRINCIPLED_GLASS, "PRINCIPLED_GLASS"),
        (MaterialFlags::PRINCIPLED_ANY, "PRINCIPLED_ANY"),
    ];
    for (flag, define) in defines {
        if material.flag_get(flag) {
            info.define(define);
        }
    }

    let mut slot = 0;
    for tex in graph.textures() {
        match tex.kind {
            TextureKind::ColorBand => {
                info.sampler(slot, ImageType::Float1DArray, &tex.sampler_name);
                slot += 1;
            }
            TextureKind::Sky => {
                // Sky textures always bind at slot 0, without taking a slot.
                info.sampler(0, ImageType::Float2DArray, &tex.sampler_name);
            }
            TextureKind::Tiled => {
                info.sampler(slot, ImageType::Float2DArray, &tex.sampler_name);
                slot += 1;
                if let Some(mapping) = &tex.tiled_mapping_name {
                    info.sampler(slot, ImageType::Float1DArray, mapping);
                    slot += 1;
                }
            }
            TextureKind::Image => {
                info.sampler(slot, ImageType::Float2D, &tex.sampler_name);
                slot += 1;
            }
        }
    }

    let mut ss = String::new();
    if let Some(ubo) = ubo.filter(|u| !u.is_empty()) {
        ss.push_str(&ubo.struct_source());
        info.uniform_buf(config.node_tree_ubo_slot, "NodeTree", "node_tree");
    }

    let uniform_attrs = &graph.uniform_attrs().list;
    if !uniform_attrs.is_empty() {
        ss.push_str("struct UniformAttrs {\n");
        for attr in uniform_attrs {
            ss.push_str(&format!("vec4 attr{};\n", attr.id));
        }
        ss.push_str("};\n\n");
        info.uniform_buf(
            config.uniform_attrs_ubo_slot,
            "UniformAttrs",
            &format!("unf_attrs[{}]", config.resource_chunk_len),
        );
    }

    info.typedef_source = ss;
}
