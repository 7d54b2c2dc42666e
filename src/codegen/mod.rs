//! GLSL code generation for a material node graph.
//!
//! The generation steps run in a fixed order because the content hash is fed
//! as sources are produced:
//!
//! 1. [`Codegen::generate_graphs`] serializes every stage and finishes the hash
//! 2. [`Codegen::generate_cryptomatte`] / [`Codegen::generate_uniform_buffer`]
//! 3. [`Codegen::generate_attribs`], [`Codegen::generate_resources`],
//!    [`Codegen::generate_library`] fill the [`ResourceDescriptor`]

pub mod library;
pub mod preview;
pub mod resources;
pub mod serialize;
pub mod uniform_buffer;

use crate::{
    config::CacheConfig,
    graph::{GpuType, InputSource, NodeGraph, NodeTag, types::payload_from_slice},
    hash::{Murmur2A, cryptomatte_float},
    material::{Material, MaterialFlags},
};

pub use library::{LibraryIndex, ShaderLibrary};
pub use resources::{
    GeneratedCode, ImageType, ResourceDescriptor, SamplerBinding, StageInterface,
    UniformBufferBinding, VertexInput,
};
pub use serialize::SourceAssembler;
pub use uniform_buffer::{UboEntry, UboMember, UniformBufferLayout};

/// Generated sources handed to the engine's finalize callback.
///
/// An absent stage means the stage is unused by the material.
#[derive(Clone, Debug, Default)]
pub struct CodegenOutput {
    pub attr_load: Option<String>,
    pub surface: Option<String>,
    pub volume: Option<String>,
    pub displacement: Option<String>,
    pub thickness: Option<String>,
    pub composite: Option<String>,
    pub material_functions: Option<String>,
    pub uniform_buffer: Option<UniformBufferLayout>,
    pub descriptor: ResourceDescriptor,
}

pub struct Codegen<'a> {
    material: &'a Material,
    graph: &'a NodeGraph,
    config: &'a CacheConfig,
    assembler: SourceAssembler<'a>,
    hasher: Murmur2A,
    hash: u32,
    ubo_inputs: Vec<UboEntry>,
    output: CodegenOutput,
}

impl<'a> Codegen<'a> {
    pub fn new(material: &'a Material, graph: &'a NodeGraph, config: &'a CacheConfig) -> Self {
        let mut hasher = Murmur2A::new(material.uuid);
        hasher.add_int(material.flags.bits() as i32);

        let mut output = CodegenOutput {
            descriptor: ResourceDescriptor::new("codegen"),
            ..Default::default()
        };
        if material.flag_get(MaterialFlags::OBJECT_INFO) {
            output
                .descriptor
                .additional_info
                .push("draw_object_infos".to_string());
        }

        Self {
            material,
            graph,
            config,
            assembler: SourceAssembler::new(graph),
            hasher,
            hash: 0,
            ubo_inputs: Vec::new(),
            output,
        }
    }

    /// Identity of the generated code. Valid after [`Self::generate_graphs`].
    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn output(&self) -> &CodegenOutput {
        &self.output
    }

    /// Finish generation. The stage strings are also recorded in the
    /// descriptor, where they take part in pass identity.
    pub fn into_output(mut self) -> CodegenOutput {
        let out = &mut self.output;
        out.descriptor.generated = GeneratedCode {
            attr_load: out.attr_load.clone(),
            surface: out.surface.clone(),
            volume: out.volume.clone(),
            displacement: out.displacement.clone(),
            thickness: out.thickness.clone(),
            composite: out.composite.clone(),
            material_functions: out.material_functions.clone(),
        };
        self.output
    }

    fn hashed(&mut self, source: Option<String>) -> Option<String> {
        if let Some(s) = &source {
            self.hasher.add_str(s);
        }
        source
    }

    pub fn generate_graphs(&mut self) {
        let g = self.graph;
        let surface = self
            .assembler
            .graph_serialize(NodeTag::SURFACE | NodeTag::AOV, g.outlink_surface);
        self.output.surface = self.hashed(surface);
        let volume = self
            .assembler
            .graph_serialize(NodeTag::VOLUME, g.outlink_volume);
        self.output.volume = self.hashed(volume);
        let displacement = self
            .assembler
            .graph_serialize(NodeTag::DISPLACEMENT, g.outlink_displacement);
        self.output.displacement = self.hashed(displacement);
        let thickness = self
            .assembler
            .graph_serialize(NodeTag::THICKNESS, g.outlink_thickness);
        self.output.thickness = self.hashed(thickness);

        if !g.outlink_compositor.is_empty() {
            let composite = self.assembler.graph_serialize_all(NodeTag::COMPOSITOR);
            self.output.composite = self.hashed(composite);
        }

        if !g.material_functions.is_empty() {
            let mut ss = String::from("\n/* Generated Functions */\n\n");
            for func in &g.material_functions {
                let body = self
                    .assembler
                    .graph_serialize(NodeTag::FUNCTION, Some(func.link));
                let body = self.hashed(body).unwrap_or_default();
                ss.push_str(&format!("float {}() {{\n{body}}}\n\n", func.name));
            }
            self.output.material_functions = Some(ss);
        }

        for attr in g.attributes() {
            self.hasher.add_str(&attr.name);
        }
        self.hash = self.hasher.finish();
    }

    /// Bakes the material's cryptomatte id into the node tree uniforms.
    pub fn generate_cryptomatte(&mut self) {
        let value = self
            .material
            .name
            .as_deref()
            .map(cryptomatte_float)
            .unwrap_or(0.0);
        self.ubo_inputs.push(UboEntry {
            member: UboMember::CryptoHash,
            ty: GpuType::Float,
            value: payload_from_slice(&[value]),
        });
    }

    /// Collect `Uniform` inputs and lay out the node tree buffer.
    pub fn generate_uniform_buffer(&mut self) {
        let mut entries = Vec::new();
        for (node_index, node) in self.graph.nodes().iter().enumerate() {
            for (slot, input) in node.inputs.iter().enumerate() {
                if let InputSource::Uniform(value) = input.source {
                    entries.push(UboEntry {
                        member: UboMember::NodeInput(self.assembler.ids().input(node_index, slot)),
                        ty: input.ty,
                        value,
                    });
                }
            }
        }
        // Cryptomatte goes after the node inputs, before sorting.
        entries.append(&mut self.ubo_inputs);
        if !entries.is_empty() {
            self.output.uniform_buffer = Some(UniformBufferLayout::new(entries));
        }
    }

    pub fn generate_attribs(&mut self) {
        self.output.attr_load =
            resources::build_attribs(self.graph, self.config, &mut self.output.descriptor);
    }

    pub fn generate_resources(&mut self) {
        resources::build_resources(
            self.material,
            self.graph,
            self.output.uniform_buffer.as_ref(),
            self.config,
            &mut self.output.descriptor,
        );
    }

    pub fn generate_library(&mut self, library: &dyn ShaderLibrary) {
        let deps = &mut self.output.descriptor.dependencies;
        for name in self.graph.used_libraries() {
            for dep in library.resolved_sources(name) {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
        }
    }
}

/// Run every generation step on an already pruned graph.
///
/// Returns the content hash and the generated output, ready for the engine's
/// finalize callback.
pub fn generate(
    material: &Material,
    graph: &NodeGraph,
    config: &CacheConfig,
    library: &dyn ShaderLibrary,
) -> (u32, CodegenOutput) {
    let mut codegen = Codegen::new(material, graph, config);
    codegen.generate_graphs();
    codegen.generate_cryptomatte();
    codegen.generate_uniform_buffer();
    codegen.generate_attribs();
    codegen.generate_resources();
    codegen.generate_library(library);
    (codegen.hash(), codegen.into_output())
}
