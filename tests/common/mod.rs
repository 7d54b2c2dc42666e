#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Result, bail};
use node_forge_codegen::{
    BackendLimits, BackendShader, CodegenOutput, Material, ResourceDescriptor, ShaderCompiler,
    graph::{GpuType, Input, NodeGraph, ShaderNode, TextureKind},
};

/// Backend double that counts compiles and reports every declared sampler as
/// used, unless listed in `unused_samplers`.
#[derive(Clone, Default)]
pub struct StubCompiler {
    pub calls: Arc<AtomicUsize>,
    pub limits: BackendLimits,
    pub fail: bool,
    pub unused_samplers: HashSet<String>,
    pub delay: Option<Duration>,
}

impl StubCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_frag_limit(limit: u32) -> Self {
        Self {
            limits: BackendLimits {
                max_textures_frag: limit,
                ..BackendLimits::default()
            },
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct StubShader {
    used: Vec<String>,
}

impl BackendShader for StubShader {
    fn uniform_location(&self, name: &str) -> Option<u32> {
        self.used.iter().position(|n| n == name).map(|i| i as u32)
    }
}

impl ShaderCompiler for StubCompiler {
    fn compile(&self, info: &ResourceDescriptor, name: &str) -> Result<Box<dyn BackendShader>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.fail {
            bail!("{name}: stub compiler rejects everything");
        }
        let used = info
            .samplers
            .iter()
            .map(|s| s.name.clone())
            .filter(|n| !self.unused_samplers.contains(n))
            .collect();
        Ok(Box::new(StubShader { used }))
    }

    fn limits(&self) -> BackendLimits {
        self.limits
    }
}

/// Finalize callback that stores the generated surface as the fragment source.
pub fn surface_finalize(_material: &Material, out: &mut CodegenOutput) {
    out.descriptor.fragment_source = out.surface.clone().unwrap_or_default();
}

/// One node with a constant vec4 output wired to the surface.
pub fn constant_surface_graph(function: &str, value: [f32; 4]) -> NodeGraph {
    let mut graph = NodeGraph::new();
    let node = graph.add_node(
        ShaderNode::new(function)
            .input(Input::constant(GpuType::Vec4, &value))
            .output(GpuType::Vec4),
    );
    graph.outlink_surface = Some(node.output(0));
    graph
}

/// Surface reading `count` distinct image textures.
pub fn textured_graph(count: usize) -> NodeGraph {
    let mut graph = NodeGraph::new();
    let mut last = None;
    for i in 0..count {
        let tex = graph.add_texture(TextureKind::Image, &format!("image_{i}.png"));
        let mut node = ShaderNode::new("node_tex_image").input(Input::texture(tex));
        if let Some(prev) = last {
            node = node.input(Input::link(GpuType::Vec4, prev));
        }
        let id = graph.add_node(node.output(GpuType::Vec4));
        last = Some(id.output(0));
    }
    graph.outlink_surface = last;
    graph
}
