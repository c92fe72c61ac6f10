//! Vector Math: the one pure, allocation-light, dependency-free component
//! everything else in the store and hybrid fusion builds on.

/// Little-endian float32 serialization. Pairs with [`deserialize`].
pub fn serialize(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// `len(bytes) / 4` floats, little-endian. Trailing bytes that don't form a
/// full `f32` are dropped.
pub fn deserialize(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// `dot(a,b) / (|a|*|b|)`, or 0 when either vector is empty, lengths differ,
/// or either magnitude is (near-)zero.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot = x.mul_add(*y, dot);
        mag_a = x.mul_add(*x, mag_a);
        mag_b = y.mul_add(*y, mag_b);
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom <= 1e-6 {
        return 0.0;
    }
    dot / denom
}
