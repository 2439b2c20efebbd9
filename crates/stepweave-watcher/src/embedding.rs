//! Deterministic tag embeddings
//!
//! Tags map to fixed unit vectors derived from their SHA-256 digest, so the
//! same tag always points the same way in state space regardless of process
//! or platform.

use stepweave_core::{sha256_hex, Result, StateVector};

/// Unit vector for `tag` in `dim` dimensions.
pub fn tag_vector(tag: &str, dim: usize) -> Result<StateVector> {
    let dim = dim.max(1);
    let mut components = Vec::with_capacity(dim);
    let mut block = 0usize;
    while components.len() < dim {
        let hex = sha256_hex(format!("{}#{}", tag, block).as_bytes());
        for pair in hex.as_bytes().chunks(2) {
            if components.len() == dim {
                break;
            }
            let byte = std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .unwrap_or(0);
            components.push(byte as f64 / 127.5 - 1.0);
        }
        block += 1;
    }
    normalize(components)
}

/// Normalised sum of the members' tag vectors.
pub fn embed_tags<S: AsRef<str>>(tags: &[S], dim: usize) -> Result<StateVector> {
    let dim = dim.max(1);
    let mut acc = vec![0.0; dim];
    for tag in tags {
        for (a, c) in acc.iter_mut().zip(tag_vector(tag.as_ref(), dim)?.as_slice()) {
            *a += c;
        }
    }
    normalize(acc)
}

fn normalize(mut components: Vec<f64>) -> Result<StateVector> {
    let norm = components.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > f64::EPSILON {
        components.iter_mut().for_each(|x| *x /= norm);
    } else {
        components.iter_mut().for_each(|x| *x = 0.0);
        components[0] = 1.0;
    }
    StateVector::new(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_vectors_are_stable_unit_vectors() {
        let a = tag_vector("alpha", 6).unwrap();
        let b = tag_vector("alpha", 6).unwrap();
        assert_eq!(a, b);
        assert!((a.norm() - 1.0).abs() < 1e-9);
        assert_ne!(a, tag_vector("beta", 6).unwrap());
    }

    #[test]
    fn long_dimensions_use_multiple_blocks() {
        let v = tag_vector("alpha", 80).unwrap();
        assert_eq!(v.dim(), 80);
        assert!((v.norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn embed_is_order_independent() {
        let a = embed_tags(&["x", "y", "z"], 5).unwrap();
        let b = embed_tags(&["z", "x", "y"], 5).unwrap();
        assert!(a.distance(&b).unwrap() < 1e-12);
    }
}
