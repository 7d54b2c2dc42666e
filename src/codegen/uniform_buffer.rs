//! Layout of the material's `NodeTree` uniform buffer.
//!
//! Members are ordered mat4, vec4, vec3, vec2, float, and a float is pulled
//! next to each vec3 when possible so it fills the vec3's padding.

use crate::graph::{GpuType, Payload};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UboMember {
    /// A node input with a `Uniform` source, by its unique input id.
    NodeInput(u32),
    CryptoHash,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UboEntry {
    pub member: UboMember,
    pub ty: GpuType,
    pub value: Payload,
}

impl UboEntry {
    pub fn field_name(&self) -> String {
        match self.member {
            UboMember::NodeInput(id) => format!("u{id}"),
            UboMember::CryptoHash => "crypto_hash".to_string(),
        }
    }
}

fn type_rank(ty: GpuType) -> usize {
    match ty {
        GpuType::Float | GpuType::Vec2 | GpuType::Vec3 | GpuType::Vec4 | GpuType::Mat4 => {
            ty.component_count()
        }
        GpuType::Mat3 => panic!("mat3 is not supported in the node tree uniform buffer"),
        GpuType::Closure => panic!("closures cannot live in the node tree uniform buffer"),
    }
}

/// Reorder `entries` for std140 friendly packing.
pub fn sort_inputs(entries: &mut Vec<UboEntry>) {
    for entry in entries.iter() {
        type_rank(entry.ty);
    }
    // Stable, so equally typed members keep graph order.
    entries.sort_by(|a, b| type_rank(b.ty).cmp(&type_rank(a.ty)));

    let Some(first_vec3) = entries.iter().position(|e| e.ty == GpuType::Vec3) else {
        return;
    };
    let mut next_float = entries.iter().position(|e| e.ty == GpuType::Float);

    let mut i = first_vec3;
    while i < entries.len() && entries[i].ty == GpuType::Vec3 {
        let followed_by_float = entries.get(i + 1).is_none_or(|e| e.ty == GpuType::Float);
        if followed_by_float {
            break;
        }
        match next_float {
            Some(f) if f < entries.len() && entries[f].ty == GpuType::Float => {
                let float = entries.remove(f);
                entries.insert(i + 1, float);
                // The float run shifted right by the insertion.
                next_float = Some(f + 1);
                i += 2;
            }
            _ => {
                next_float = None;
                i += 1;
            }
        }
    }
}

/// Sorted members with their byte offsets and the initial buffer contents.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformBufferLayout {
    pub entries: Vec<UboEntry>,
    pub offsets: Vec<u32>,
    pub size: u32,
}

impl UniformBufferLayout {
    pub fn new(mut entries: Vec<UboEntry>) -> Self {
        sort_inputs(&mut entries);

        let mut offsets = Vec::with_capacity(entries.len());
        let mut cursor = 0u32;
        for (i, entry) in entries.iter().enumerate() {
            offsets.push(cursor);
            let mut floats = entry.ty.component_count() as u32;
            // A vec3 takes a full vec4 slot unless a float fills the gap.
            let next_is_float = entries.get(i + 1).map(|e| e.ty == GpuType::Float);
            if entry.ty == GpuType::Vec3 && next_is_float == Some(false) {
                floats = 4;
            }
            cursor += floats * 4;
        }
        let size = cursor.div_ceil(16) * 16;
        Self {
            entries,
            offsets,
            size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Initial contents, `size` bytes long.
    pub fn data(&self) -> Vec<u8> {
        let mut floats = vec![0.0f32; self.size as usize / 4];
        for (entry, offset) in self.entries.iter().zip(&self.offsets) {
            let start = *offset as usize / 4;
            let n = entry.ty.component_count();
            floats[start..start + n].copy_from_slice(&entry.value[..n]);
        }
        bytemuck::cast_slice(&floats).to_vec()
    }

    /// `struct NodeTree { ... };` declaration in layout order.
    pub fn struct_source(&self) -> String {
        let mut ss = String::from("struct NodeTree {\n");
        for entry in &self.entries {
            ss.push_str(&format!("{} {};\n", entry.ty, entry.field_name()));
        }
        ss.push_str("};\n\n");
        ss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::payload_from_slice;

    fn entry(id: u32, ty: GpuType, value: f32) -> UboEntry {
        UboEntry {
            member: UboMember::NodeInput(id),
            ty,
            value: payload_from_slice(&[value; 16]),
        }
    }

    fn order(layout: &UniformBufferLayout) -> Vec<String> {
        layout.entries.iter().map(|e| e.field_name()).collect()
    }

    #[test]
    fn sorts_by_size_and_packs_floats_behind_vec3() {
        let layout = UniformBufferLayout::new(vec![
            entry(1, GpuType::Float, 1.0),
            entry(2, GpuType::Vec3, 2.0),
            entry(3, GpuType::Vec4, 3.0),
            entry(4, GpuType::Vec3, 4.0),
            entry(5, GpuType::Vec2, 5.0),
            entry(6, GpuType::Float, 6.0),
        ]);
        assert_eq!(order(&layout), ["u3", "u2", "u1", "u4", "u6", "u5"]);
        assert_eq!(layout.offsets, [0, 16, 28, 32, 44, 48]);
        assert_eq!(layout.size, 64);
    }

    #[test]
    fn lone_vec3_is_padded_when_no_float_is_left() {
        let layout = UniformBufferLayout::new(vec![
            entry(1, GpuType::Vec3, 1.0),
            entry(2, GpuType::Vec2, 2.0),
        ]);
        assert_eq!(order(&layout), ["u1", "u2"]);
        assert_eq!(layout.offsets, [0, 16]);
        assert_eq!(layout.size, 32);
    }

    #[test]
    fn data_places_values_at_offsets() {
        let layout = UniformBufferLayout::new(vec![
            entry(1, GpuType::Float, 0.5),
            entry(2, GpuType::Vec4, 2.0),
        ]);
        let data = layout.data();
        assert_eq!(data.len(), 32);
        let floats: Vec<f32> = data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[..5], &[2.0, 2.0, 2.0, 2.0, 0.5]);
        assert_eq!(floats[5], 0.0);
    }

    #[test]
    #[should_panic(expected = "mat3 is not supported")]
    fn mat3_members_are_rejected() {
        UniformBufferLayout::new(vec![entry(1, GpuType::Mat3, 1.0)]);
    }
}
