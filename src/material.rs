//! The material a pass is generated for.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Feature flags collected while building the material's node graph.
    ///
    /// The raw word takes part in the content hash, so two materials with the
    /// same graph but different flags never share a pass.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MaterialFlags: u32 {
        const DIFFUSE = 1 << 0;
        const SUBSURFACE = 1 << 1;
        const GLOSSY = 1 << 2;
        const REFRACT = 1 << 3;
        const EMISSION = 1 << 4;
        const TRANSPARENT = 1 << 5;
        const HOLDOUT = 1 << 6;
        const SHADER_TO_RGBA = 1 << 7;
        const AO = 1 << 8;
        const CLEARCOAT = 1 << 9;
        const OBJECT_INFO = 1 << 10;
        const AOV = 1 << 11;
        const BARYCENTRIC = 1 << 12;
        const PRINCIPLED_CLEARCOAT = 1 << 13;
        const PRINCIPLED_METALLIC = 1 << 14;
        const PRINCIPLED_DIELECTRIC = 1 << 15;
        const PRINCIPLED_GLASS = 1 << 16;
        const PRINCIPLED_ANY = 1 << 17;
    }
}

/// Identity of the material that owns a generated graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    /// Seeds the content hash. Engines use it to keep e.g. world and surface
    /// shaders with identical node code apart.
    pub uuid: u32,
    /// Material name, baked into the cryptomatte uniform.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub flags: MaterialFlags,
}

impl Material {
    pub fn new(uuid: u32) -> Self {
        Self {
            uuid,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_flags(mut self, flags: MaterialFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn flag_get(&self, flag: MaterialFlags) -> bool {
        self.flags.contains(flag)
    }
}
