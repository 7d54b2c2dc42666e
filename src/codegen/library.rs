//! GLSL library snippets referenced by generated node code.

use std::collections::{HashMap, HashSet};

use log::warn;

/// Resolves a library file name into the ordered list of files it needs.
pub trait ShaderLibrary: Send + Sync {
    /// `name` and its transitive dependencies, dependencies first.
    fn resolved_sources(&self, name: &str) -> Vec<String>;

    fn source(&self, name: &str) -> Option<&str>;
}

#[derive(Clone, Debug)]
struct Snippet {
    source: String,
    dependencies: Vec<String>,
}

/// In-memory dependency index of GLSL library files.
#[derive(Clone, Debug, Default)]
pub struct LibraryIndex {
    snippets: HashMap<String, Snippet>,
}

impl LibraryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
        dependencies: &[&str],
    ) -> &mut Self {
        self.snippets.insert(
            name.into(),
            Snippet {
                source: source.into(),
                dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            },
        );
        self
    }

    fn visit(&self, name: &str, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        if !seen.insert(name.to_string()) {
            return;
        }
        let Some(snippet) = self.snippets.get(name) else {
            warn!("shader library file not found: {name}");
            return;
        };
        for dep in &snippet.dependencies {
            self.visit(dep, seen, out);
        }
        out.push(name.to_string());
    }

    /// Concatenated sources of `names`, in order.
    pub fn concat_sources(&self, names: &[String]) -> String {
        names
            .iter()
            .filter_map(|n| self.source(n))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl ShaderLibrary for LibraryIndex {
    fn resolved_sources(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.visit(name, &mut HashSet::new(), &mut out);
        out
    }

    fn source(&self, name: &str) -> Option<&str> {
        self.snippets.get(name).map(|s| s.source.as_str())
    }
}
