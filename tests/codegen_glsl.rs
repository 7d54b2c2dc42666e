use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use node_forge_codegen::{
    CacheConfig, CodegenOutput, Material, MaterialFlags,
    codegen::{self, LibraryIndex},
    graph::{AttributeKind, GpuType, Input, NodeGraph, ShaderNode, dsl},
};
use proptest::prelude::*;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Expectations {
    contains: HashMap<String, Vec<String>>,
    excludes: HashMap<String, Vec<String>>,
    /// Needles that must appear in this order.
    in_order: HashMap<String, Vec<String>>,
    missing: Vec<String>,
    samplers: Vec<String>,
    uniform_buffers: Vec<String>,
}

fn cases_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("cases")
}

fn stage<'a>(out: &'a CodegenOutput, name: &str) -> Option<&'a str> {
    let source = match name {
        "attrLoad" => &out.attr_load,
        "surface" => &out.surface,
        "volume" => &out.volume,
        "displacement" => &out.displacement,
        "thickness" => &out.thickness,
        "composite" => &out.composite,
        "functions" => &out.material_functions,
        other => panic!("unknown stage name in expectations: {other}"),
    };
    source.as_deref()
}

fn generate_case(dir: &Path) -> (u32, CodegenOutput) {
    let (material, mut graph) = dsl::load_graph_from_path(dir.join("graph.json"))
        .unwrap_or_else(|e| panic!("case {}: {e:#}", dir.display()));
    graph.prune_unused();
    graph.finalize_uniform_attrs();
    codegen::generate(&material, &graph, &CacheConfig::default(), &LibraryIndex::new())
}

fn run_case(name: &str) {
    let dir = cases_root().join(name);
    let text = std::fs::read_to_string(dir.join("expect.json"))
        .unwrap_or_else(|e| panic!("case {name}: missing expect.json: {e}"));
    let expect: Expectations = serde_json::from_str(&text)
        .unwrap_or_else(|e| panic!("case {name}: invalid expect.json: {e}"));

    let (hash, out) = generate_case(&dir);
    let (hash_again, _) = generate_case(&dir);
    assert_eq!(hash, hash_again, "case {name}: hash is not deterministic");

    for (stage_name, needles) in &expect.contains {
        let source = stage(&out, stage_name)
            .unwrap_or_else(|| panic!("case {name}: stage {stage_name} was not generated"));
        for needle in needles {
            assert!(
                source.contains(needle.as_str()),
                "case {name}: {stage_name} lacks {needle:?}:\n{source}"
            );
        }
    }
    for (stage_name, needles) in &expect.excludes {
        let source = stage(&out, stage_name).unwrap_or_default();
        for needle in needles {
            assert!(
                !source.contains(needle.as_str()),
                "case {name}: {stage_name} should not contain {needle:?}:\n{source}"
            );
        }
    }
    for (stage_name, needles) in &expect.in_order {
        let source = stage(&out, stage_name)
            .unwrap_or_else(|| panic!("case {name}: stage {stage_name} was not generated"));
        let mut from = 0;
        for needle in needles {
            let at = source[from..].find(needle.as_str()).unwrap_or_else(|| {
                panic!("case {name}: {stage_name} lacks {needle:?} after byte {from}:\n{source}")
            });
            from += at + needle.len();
        }
    }
    for stage_name in &expect.missing {
        assert!(
            stage(&out, stage_name).is_none(),
            "case {name}: stage {stage_name} should be unused"
        );
    }

    let samplers: Vec<_> = out.descriptor.samplers.iter().map(|s| s.name.clone()).collect();
    assert_eq!(samplers, expect.samplers, "case {name}: samplers");
    let ubos: Vec<_> = out
        .descriptor
        .uniform_buffers
        .iter()
        .map(|u| u.name.clone())
        .collect();
    assert_eq!(ubos, expect.uniform_buffers, "case {name}: uniform buffers");
}

#[test]
fn textured_surface() {
    run_case("textured_surface");
}

#[test]
fn volume_aov_functions() {
    run_case("volume_aov_functions");
}

#[test]
fn pruned_branches() {
    run_case("pruned_branches");
}

#[test]
fn compositor() {
    run_case("compositor");
}

#[test]
#[should_panic(expected = "too many attributes")]
fn seventeen_attributes_abort_codegen() {
    let mut graph = NodeGraph::new();
    let mut node = ShaderNode::new("node_sum_attributes");
    for i in 0..17 {
        let attr = graph.add_attribute(AttributeKind::Generic, &format!("attr_{i}"));
        node = node.input(Input::attribute(GpuType::Vec4, attr));
    }
    let id = graph.add_node(node.output(GpuType::Vec4));
    graph.outlink_surface = Some(id.output(0));
    graph.prune_unused();
    codegen::generate(
        &Material::new(1),
        &graph,
        &CacheConfig::default(),
        &LibraryIndex::new(),
    );
}

#[derive(Clone, Debug)]
struct NodeRecipe {
    function: usize,
    value: [f32; 4],
    uniform: bool,
    link_previous: bool,
}

const FUNCTIONS: [&str; 4] = ["node_rgb", "node_mix", "node_gamma", "node_invert"];

fn node_recipe() -> impl Strategy<Value = NodeRecipe> {
    (
        0..FUNCTIONS.len(),
        prop::array::uniform4(-10.0f32..10.0),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(function, value, uniform, link_previous)| NodeRecipe {
            function,
            value,
            uniform,
            link_previous,
        })
}

fn build_chain(recipes: &[NodeRecipe]) -> NodeGraph {
    let mut graph = NodeGraph::new();
    let mut last = None;
    for recipe in recipes {
        let value = if recipe.uniform {
            Input::uniform(GpuType::Vec4, &recipe.value)
        } else {
            Input::constant(GpuType::Vec4, &recipe.value)
        };
        let mut node = ShaderNode::new(FUNCTIONS[recipe.function]).input(value);
        if let Some(prev) = last.filter(|_| recipe.link_previous) {
            node = node.input(Input::link(GpuType::Vec4, prev));
        }
        let id = graph.add_node(node.output(GpuType::Vec4));
        last = Some(id.output(0));
    }
    graph.outlink_surface = last;
    graph
}

fn hash_of(graph: &NodeGraph, material: &Material) -> u32 {
    let mut graph = graph.clone();
    graph.prune_unused();
    graph.finalize_uniform_attrs();
    codegen::generate(material, &graph, &CacheConfig::default(), &LibraryIndex::new()).0
}

proptest! {
    #[test]
    fn hash_is_deterministic(
        recipes in prop::collection::vec(node_recipe(), 1..8),
        uuid in any::<u32>(),
        flags in any::<u32>(),
    ) {
        let graph = build_chain(&recipes);
        let material = Material::new(uuid).with_flags(MaterialFlags::from_bits_truncate(flags));
        prop_assert_eq!(hash_of(&graph, &material), hash_of(&graph, &material));
        prop_assert_eq!(hash_of(&graph, &material), hash_of(&build_chain(&recipes), &material));
    }
}
