//! Material shader code generation and compiled pass caching.
//!
//! A [`graph::NodeGraph`] is serialized into GLSL stage sources by
//! [`codegen::Codegen`], hashed into a 32-bit identity and handed to a
//! [`pass::PassCache`] which deduplicates structurally identical shader
//! variants, compiles them through a [`backend::ShaderCompiler`] and collects
//! the ones nobody references anymore.

pub mod backend;
pub mod codegen;
pub mod config;
pub mod error;
pub mod graph;
pub mod hash;
pub mod material;
pub mod pass;

pub use backend::{BackendLimits, BackendShader, NagaCompiler, ShaderCompiler};
pub use codegen::{Codegen, CodegenOutput, ResourceDescriptor};
pub use config::CacheConfig;
pub use error::PassError;
pub use graph::NodeGraph;
pub use material::{Material, MaterialFlags};
pub use pass::{DeferredCompiler, PassCache, PassHandle};
