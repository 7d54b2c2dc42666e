//! Node graph vocabulary: value types, stage tags and input sources.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// GLSL value type of a node socket. The discriminant is the float count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GpuType {
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "vec2")]
    Vec2,
    #[serde(rename = "vec3")]
    Vec3,
    #[serde(rename = "vec4")]
    Vec4,
    #[serde(rename = "mat3")]
    Mat3,
    #[serde(rename = "mat4")]
    Mat4,
    Closure,
}

impl GpuType {
    /// Number of floats carried by a value of this type. Closures carry none.
    pub fn component_count(self) -> usize {
        match self {
            GpuType::Float => 1,
            GpuType::Vec2 => 2,
            GpuType::Vec3 => 3,
            GpuType::Vec4 => 4,
            GpuType::Mat3 => 9,
            GpuType::Mat4 => 16,
            GpuType::Closure => 0,
        }
    }

    pub fn glsl(self) -> &'static str {
        match self {
            GpuType::Float => "float",
            GpuType::Vec2 => "vec2",
            GpuType::Vec3 => "vec3",
            GpuType::Vec4 => "vec4",
            GpuType::Mat3 => "mat3",
            GpuType::Mat4 => "mat4",
            GpuType::Closure => "Closure",
        }
    }
}

impl fmt::Display for GpuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glsl())
    }
}

bitflags! {
    /// Output graphs a node contributes to.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeTag: u32 {
        const SURFACE = 1 << 0;
        const VOLUME = 1 << 1;
        const DISPLACEMENT = 1 << 2;
        const THICKNESS = 1 << 3;
        const AOV = 1 << 4;
        const FUNCTION = 1 << 5;
        const COMPOSITOR = 1 << 6;
    }
}

/// Index of a node inside its [`super::NodeGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn output(self, slot: usize) -> OutputRef {
        OutputRef { node: self, slot }
    }
}

/// A node output, the only thing an [`InputSource::Output`] can point at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutputRef {
    pub node: NodeId,
    pub slot: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformAttrId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerAttrId(pub u32);

/// Fixed-size numeric payload; only the first `component_count()` floats of
/// the owning input's type are meaningful.
pub type Payload = [f32; 16];

pub fn payload_from_slice(values: &[f32]) -> Payload {
    let mut payload = [0.0; 16];
    let n = values.len().min(16);
    payload[..n].copy_from_slice(&values[..n]);
    payload
}

/// Where a node input gets its value from.
#[derive(Clone, Debug, PartialEq)]
pub enum InputSource {
    /// `prefix` is an unterminated call, e.g. `dF_branch(node_tex_coord, `;
    /// codegen appends the destination temporary and the closing parenthesis.
    FunctionCall(String),
    Output(OutputRef),
    Constant(Payload),
    /// Lives in the material's `NodeTree` uniform buffer.
    Uniform(Payload),
    Attribute(AttributeId),
    UniformAttribute(UniformAttrId),
    LayerAttribute(LayerAttrId),
    /// Default-initialized closure.
    Struct,
    Texture(TextureId),
    TiledTextureMapping(TextureId),
    /// The material's cryptomatte id. Codegen always stores it in the
    /// `NodeTree` uniform buffer, so the input only names that member.
    Cryptomatte,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Input {
    pub ty: GpuType,
    pub source: InputSource,
}

impl Input {
    pub fn new(ty: GpuType, source: InputSource) -> Self {
        Self { ty, source }
    }

    pub fn constant(ty: GpuType, values: &[f32]) -> Self {
        Self::new(ty, InputSource::Constant(payload_from_slice(values)))
    }

    pub fn uniform(ty: GpuType, values: &[f32]) -> Self {
        Self::new(ty, InputSource::Uniform(payload_from_slice(values)))
    }

    pub fn link(ty: GpuType, output: OutputRef) -> Self {
        Self::new(ty, InputSource::Output(output))
    }

    pub fn attribute(ty: GpuType, attr: AttributeId) -> Self {
        Self::new(ty, InputSource::Attribute(attr))
    }

    pub fn texture(texture: TextureId) -> Self {
        // Sampler inputs are typed by their binding, the value type is unused.
        Self::new(GpuType::Vec4, InputSource::Texture(texture))
    }

    pub fn closure_default() -> Self {
        Self::new(GpuType::Closure, InputSource::Struct)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Output {
    pub ty: GpuType,
}

/// One GLSL library function call in the generated code.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderNode {
    pub name: String,
    pub tag: NodeTag,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
}

impl ShaderNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: NodeTag::empty(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn tagged(mut self, tag: NodeTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, ty: GpuType) -> Self {
        self.outputs.push(Output { ty });
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeKind {
    /// Generated (original) coordinates.
    Orco,
    Tangent,
    HairLength,
    /// Any named mesh layer (UVs, colors, custom attributes).
    Generic,
}

impl AttributeKind {
    pub fn default_gpu_type(self) -> GpuType {
        match self {
            AttributeKind::Orco => GpuType::Vec3,
            AttributeKind::Tangent | AttributeKind::Generic => GpuType::Vec4,
            AttributeKind::HairLength => GpuType::Float,
        }
    }

    fn input_prefix(self) -> &'static str {
        match self {
            AttributeKind::Orco => "orco",
            AttributeKind::Tangent => "t",
            AttributeKind::HairLength => "hl",
            AttributeKind::Generic => "a",
        }
    }
}

/// Longest vertex attribute name derived from a layer name.
pub const MAX_SAFE_ATTR_NAME: usize = 12;

/// A mesh attribute requested by the graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialAttribute {
    pub id: u32,
    pub kind: AttributeKind,
    /// Layer name as authored; hashed into the pass identity.
    pub name: String,
    /// GLSL-safe vertex input name.
    pub input_name: String,
    /// Type of the interpolated value seen by node code.
    pub gpu_type: GpuType,
}

impl MaterialAttribute {
    pub(crate) fn new(id: u32, kind: AttributeKind, name: &str) -> Self {
        Self {
            id,
            kind,
            name: name.to_string(),
            input_name: safe_attr_name(kind, name),
            gpu_type: kind.default_gpu_type(),
        }
    }
}

fn safe_attr_name(kind: AttributeKind, name: &str) -> String {
    let prefix = kind.input_prefix();
    if kind == AttributeKind::Orco || name.is_empty() {
        return prefix.to_string();
    }
    // Layer names are arbitrary UTF-8; hash them into a short identifier.
    let mut safe = format!("{prefix}{:08x}", crate::hash::murmur3_32(name.as_bytes(), 0));
    safe.truncate(MAX_SAFE_ATTR_NAME);
    safe
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextureKind {
    Image,
    /// UDIM tiles: a 2D array plus a 1D array tile mapping.
    Tiled,
    ColorBand,
    Sky,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialTexture {
    pub id: u32,
    pub kind: TextureKind,
    pub image_name: String,
    pub sampler_name: String,
    /// Only set for [`TextureKind::Tiled`].
    pub tiled_mapping_name: Option<String>,
}

impl MaterialTexture {
    pub(crate) fn new(id: u32, kind: TextureKind, image_name: &str) -> Self {
        Self {
            id,
            kind,
            image_name: image_name.to_string(),
            sampler_name: format!("samp{id}"),
            tiled_mapping_name: (kind == TextureKind::Tiled).then(|| format!("tsamp{id}")),
        }
    }
}

/// Per-object value read from the draw's uniform attribute buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformAttr {
    /// Assigned by [`super::NodeGraph::finalize_uniform_attrs`].
    pub id: u32,
    pub name: String,
    pub use_dupli: bool,
    pub(crate) key: UniformAttrId,
}

/// Per-view-layer attribute loaded by hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerAttr {
    pub id: u32,
    pub name: String,
    pub hash_code: u32,
}
