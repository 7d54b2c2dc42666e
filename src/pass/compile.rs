//! Backend compilation of a single pass and its resource limit checks.

use log::{debug, error};

use crate::{
    backend::{BackendLimits, BackendShader, ShaderCompiler},
    codegen::ResourceDescriptor,
    error::PassError,
};

/// Number of declared samplers the compiled shader actually references.
pub(crate) fn active_samplers(descriptor: &ResourceDescriptor, shader: &dyn BackendShader) -> u32 {
    descriptor
        .samplers
        .iter()
        .filter(|s| shader.uniform_location(&s.name).is_some())
        .count() as u32
}

pub(crate) fn check_sampler_budget(
    active: u32,
    limits: &BackendLimits,
    has_geometry: bool,
) -> Result<(), PassError> {
    let too_many = |limit: u32, stage: &'static str| PassError::TooManySamplers {
        active,
        limit,
        stage,
    };
    if active > limits.max_textures_frag {
        return Err(too_many(limits.max_textures_frag, "fragment"));
    }
    if active > limits.max_textures_vert {
        return Err(too_many(limits.max_textures_vert, "vertex"));
    }
    if has_geometry && active > limits.max_textures_geom {
        return Err(too_many(limits.max_textures_geom, "geometry"));
    }
    // Each stage may bind every sampler, so the combined budget must cover all three.
    if active * 3 > limits.max_textures {
        return Err(too_many(limits.max_textures / 3, "combined"));
    }
    Ok(())
}

/// Compile `descriptor` and validate the result against the backend limits.
pub(crate) fn compile_descriptor(
    compiler: &dyn ShaderCompiler,
    descriptor: &ResourceDescriptor,
    name: &str,
) -> Result<Box<dyn BackendShader>, PassError> {
    let shader = compiler
        .compile(descriptor, name)
        .map_err(PassError::Compile)?;

    let active = active_samplers(descriptor, shader.as_ref());
    check_sampler_budget(active, &compiler.limits(), descriptor.has_geometry_stage())?;
    debug!("[pass] compiled {name} ({active} active samplers)");
    Ok(shader)
}

pub(crate) fn log_failure(name: &str, err: &PassError) {
    error!("[pass] {name}: {err}");
}
