//! Graphics backend seam: turns a finalized descriptor into a shader object.

mod naga_glsl;

pub use naga_glsl::NagaCompiler;

use anyhow::Result;

use crate::codegen::ResourceDescriptor;

/// Texture unit budgets of the target device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendLimits {
    pub max_textures_frag: u32,
    pub max_textures_vert: u32,
    pub max_textures_geom: u32,
    /// Combined budget across all stages.
    pub max_textures: u32,
}

impl Default for BackendLimits {
    fn default() -> Self {
        Self {
            max_textures_frag: 16,
            max_textures_vert: 16,
            max_textures_geom: 16,
            max_textures: 48,
        }
    }
}

/// A compiled shader object. Dropping it releases the backend resources.
pub trait BackendShader: Send + Sync {
    /// Location of a uniform or sampler the shader actually uses, `None` when
    /// it is unused or undeclared.
    fn uniform_location(&self, name: &str) -> Option<u32>;
}

pub trait ShaderCompiler: Send + Sync {
    fn compile(&self, info: &ResourceDescriptor, name: &str) -> Result<Box<dyn BackendShader>>;

    fn limits(&self) -> BackendLimits;
}
