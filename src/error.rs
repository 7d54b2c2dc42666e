use thiserror::Error;

/// Reasons a pass ends up in the sticky failed state.
///
/// These never escape the cache as errors: they are logged and the pass keeps
/// a null shader so callers fall back to an error material.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("shader compilation failed: {0:#}")]
    Compile(anyhow::Error),
    #[error("too many samplers in shader: {active} active, limit {limit} ({stage})")]
    TooManySamplers {
        active: u32,
        limit: u32,
        stage: &'static str,
    },
}
