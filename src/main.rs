use std::path::PathBuf;

use anyhow::{Result, anyhow};
use log::info;
use node_forge_codegen::{
    CacheConfig, CodegenOutput, Material, NagaCompiler, PassCache,
    codegen::{LibraryIndex, preview::preview_fragment_source},
    graph::{NodeGraph, dsl},
};

#[derive(Debug, Default, Clone)]
struct Cli {
    graph_json: Option<PathBuf>,
    config: Option<PathBuf>,
    compile: bool,
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--compile" => {
                cli.compile = true;
                i += 1;
            }
            "--graph-json" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --graph-json"));
                };
                cli.graph_json = Some(PathBuf::from(v));
                i += 2;
            }
            "--config" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --config"));
                };
                cli.config = Some(PathBuf::from(v));
                i += 2;
            }
            other => {
                return Err(anyhow!(
                    "unknown argument: {other} (supported: --graph-json <graph.json>, --config <config.json>, --compile)"
                ));
            }
        }
    }
    Ok(cli)
}

/// Finalize callback placing the stub-backed preview in the fragment stage.
fn preview_finalize(graph: &NodeGraph) -> impl FnOnce(&Material, &mut CodegenOutput) + '_ {
    move |_material, out| {
        let frag = preview_fragment_source(graph, out);
        out.descriptor.fragment_source = frag;
    }
}

fn print_output(hash: u32, out: &CodegenOutput) {
    println!("// hash: {hash:#010x}");
    let stages = [
        ("attr_load", &out.attr_load),
        ("surface", &out.surface),
        ("volume", &out.volume),
        ("displacement", &out.displacement),
        ("thickness", &out.thickness),
        ("composite", &out.composite),
        ("functions", &out.material_functions),
    ];
    for (name, source) in stages {
        if let Some(source) = source {
            println!("// --- {name} ---\n{source}");
        }
    }
    println!("// --- declarations ---\n{}", out.descriptor.declarations());
}

fn run(cli: Cli) -> Result<()> {
    let graph_path = cli
        .graph_json
        .ok_or_else(|| anyhow!("--graph-json <graph.json> is required"))?;
    let config = match &cli.config {
        Some(path) => CacheConfig::load_from_path(path)?,
        None => CacheConfig::default(),
    };

    let (material, mut graph) = dsl::load_graph_from_path(&graph_path)?;
    graph.prune_unused();
    graph.finalize_uniform_attrs();
    let (hash, out) =
        node_forge_codegen::codegen::generate(&material, &graph, &config, &LibraryIndex::new());
    print_output(hash, &out);

    if cli.compile {
        let cache = PassCache::new(NagaCompiler::default(), LibraryIndex::new(), config);
        let name = material.name.clone().unwrap_or_else(|| graph_path.display().to_string());
        let preview_graph = graph.clone();
        let handle = cache
            .generate_pass(&material, &mut graph, preview_finalize(&preview_graph))
            .ok_or_else(|| anyhow!("pass for {name} is marked as failed"))?;
        if !cache.compile_pass(&handle, &name) {
            return Err(anyhow!("{name} failed to compile, see log for details"));
        }
        info!("{name} compiled ({:?})", cache.stats());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&args)?;
    run(cli)
}
