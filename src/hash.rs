//! Content hashing for generated shader variants.
//!
//! [`Murmur2A`] is the incremental hasher fed with every generated source
//! string. It is fast and stable across runs, but 32 bits collide: a hash hit
//! is only ever a candidate that the pass cache confirms structurally.

const MM2A_M: u32 = 0x5bd1_e995;

#[inline]
fn mm2a_mix(h: u32, mut k: u32) -> u32 {
    k = k.wrapping_mul(MM2A_M);
    k ^= k >> 24;
    k = k.wrapping_mul(MM2A_M);
    h.wrapping_mul(MM2A_M) ^ k
}

/// Incremental MurmurHash2A.
///
/// Feeding the same bytes in different chunkings yields the same digest.
#[derive(Clone, Debug)]
pub struct Murmur2A {
    hash: u32,
    tail: u32,
    count: u32,
    size: u32,
}

impl Murmur2A {
    pub fn new(seed: u32) -> Self {
        Self {
            hash: seed,
            tail: 0,
            count: 0,
            size: 0,
        }
    }

    fn mix_tail<'a>(&mut self, mut data: &'a [u8]) -> &'a [u8] {
        while let Some((&byte, rest)) = data.split_first() {
            if data.len() >= 4 && self.count == 0 {
                break;
            }
            self.tail |= u32::from(byte) << (self.count * 8);
            self.count += 1;
            data = rest;
            if self.count == 4 {
                self.hash = mm2a_mix(self.hash, self.tail);
                self.tail = 0;
                self.count = 0;
            }
        }
        data
    }

    pub fn add(&mut self, data: &[u8]) {
        self.size = self.size.wrapping_add(data.len() as u32);
        let data = self.mix_tail(data);
        let mut chunks = data.chunks_exact(4);
        for chunk in &mut chunks {
            let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.hash = mm2a_mix(self.hash, k);
        }
        self.mix_tail(chunks.remainder());
    }

    pub fn add_str(&mut self, s: &str) {
        self.add(s.as_bytes());
    }

    pub fn add_int(&mut self, value: i32) {
        self.add(&value.to_le_bytes());
    }

    pub fn finish(&self) -> u32 {
        let mut h = mm2a_mix(self.hash, self.tail);
        h = mm2a_mix(h, self.size);
        h ^= h >> 13;
        h = h.wrapping_mul(MM2A_M);
        h ^= h >> 15;
        h
    }
}

/// MurmurHash3 (x86, 32-bit).
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &b) in tail.iter().enumerate() {
            k |= u32::from(b) << (i * 8);
        }
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Cryptomatte id of a material name, encoded as a finite float.
///
/// The exponent is clamped to `[1, 254]` so the value is never a denormal,
/// infinity or NaN once written to an image.
pub fn cryptomatte_float(name: &str) -> f32 {
    let hash = murmur3_32(name.as_bytes(), 0);
    let mantissa = hash & ((1 << 23) - 1);
    let exponent = ((hash >> 23) & 0xff).clamp(1, 254) << 23;
    let sign = (hash >> 31) << 31;
    f32::from_bits(sign | exponent | mantissa)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(seed: u32, parts: &[&[u8]]) -> u32 {
        let mut h = Murmur2A::new(seed);
        for p in parts {
            h.add(p);
        }
        h.finish()
    }

    #[test]
    fn chunking_does_not_change_digest() {
        let whole = digest(7, &[b"vec4 tmp1;\nnode_bsdf(tmp1);\n"]);
        assert_eq!(whole, digest(7, &[b"vec4 tmp1;\n", b"node_bsdf(tmp1);\n"]));
        assert_eq!(whole, digest(7, &[b"v", b"ec4 tmp1;\nn", b"ode_bsdf(tmp1);\n"]));
    }

    #[test]
    fn seed_and_content_change_digest() {
        assert_ne!(digest(1, &[b"abc"]), digest(2, &[b"abc"]));
        assert_ne!(digest(1, &[b"abc"]), digest(1, &[b"abd"]));
        // Length participates, so trailing zero bytes are not free.
        assert_ne!(digest(1, &[b"ab"]), digest(1, &[b"ab\0"]));
    }

    #[test]
    fn murmur3_reference_values() {
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"hello", 0), 0x248b_fa47);
    }

    #[test]
    fn cryptomatte_float_is_finite() {
        for name in ["", "Material", "MAwood", "a much longer material name"] {
            let v = cryptomatte_float(name);
            assert!(v.is_finite(), "{name} -> {v}");
            assert!(v == 0.0 || v.is_normal(), "{name} -> {v}");
        }
    }
}
