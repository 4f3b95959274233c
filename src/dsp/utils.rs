//! Shared DSP utilities.

/// Floor used before logarithms and divisions to keep values finite.
pub const DB_EPS: f32 = 1e-12;

/// Floor applied to power values before taking logs.
pub const POWER_FLOOR: f64 = 1e-10;

pub fn lin_to_db(x: f32) -> f32 {
    20.0 * x.max(DB_EPS).log10()
}

pub fn power_to_db(p: f32) -> f32 {
    10.0 * p.max(DB_EPS).log10()
}

pub fn frame_rms(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v * v;
    }
    (s / (x.len().max(1) as f32)).sqrt()
}

/// Cosine similarity between two equal-length vectors, accumulated in f64.
/// Returns 0.0 when either vector is (near-)zero so silence never produces
/// a spurious perfect match.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x as f64 * y as f64;
        na += x as f64 * x as f64;
        nb += y as f64 * y as f64;
    }
    let denom = (na * nb).sqrt();
    if denom < DB_EPS as f64 {
        return 0.0;
    }
    ((dot / denom) as f32).clamp(-1.0, 1.0)
}

/// Component-wise mean of a sequence of equal-length vectors.
pub fn mean_vector(frames: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = frames.first() else {
        return Vec::new();
    };
    let dim = first.len();
    let mut mean = vec![0.0f64; dim];
    for frame in frames {
        for (m, &v) in mean.iter_mut().zip(frame.iter()) {
            *m += v as f64;
        }
    }
    let n = frames.len() as f64;
    mean.iter().map(|&m| (m / n) as f32).collect()
}

/// Mean of the per-dimension variances of a sequence. Used as the silence
/// gate: identical frames (digital silence) give exactly zero.
pub fn sequence_variance(frames: &[Vec<f32>]) -> f32 {
    if frames.len() < 2 {
        return 0.0;
    }
    let mean = mean_vector(frames);
    let dim = mean.len();
    let mut acc = vec![0.0f64; dim];
    for frame in frames {
        for ((a, &v), &m) in acc.iter_mut().zip(frame.iter()).zip(mean.iter()) {
            let d = v as f64 - m as f64;
            *a += d * d;
        }
    }
    let n = (frames.len() - 1) as f64;
    let total: f64 = acc.iter().map(|a| a / n).sum();
    (total / dim as f64) as f32
}

/// Z-score a vector across its own components into `dst`. A vector with
/// (near-)zero spread is centered but left unscaled.
pub fn zscore_into(src: &[f32], dst: &mut [f32]) {
    debug_assert_eq!(src.len(), dst.len());
    let n = src.len().max(1) as f64;
    let mut mean = 0.0f64;
    for &v in src {
        mean += v as f64;
    }
    mean /= n;
    let mut var = 0.0f64;
    for &v in src {
        let d = v as f64 - mean;
        var += d * d;
    }
    var /= n;
    let scale = if var > DB_EPS as f64 {
        1.0 / var.sqrt()
    } else {
        1.0
    };
    for (d, &v) in dst.iter_mut().zip(src.iter()) {
        *d = ((v as f64 - mean) * scale) as f32;
    }
}

/// Euclidean distance between two equal-length vectors in f64.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let mut s = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let d = x as f64 - y as f64;
        s += d * d;
    }
    s.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, -3.0, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn variance_of_identical_frames_is_zero() {
        let frames = vec![vec![1.0, 2.0, 3.0]; 10];
        assert_eq!(sequence_variance(&frames), 0.0);
    }

    #[test]
    fn variance_grows_with_spread() {
        let a = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let b = vec![vec![0.0, 0.0], vec![4.0, 4.0]];
        assert!(sequence_variance(&b) > sequence_variance(&a));
    }

    #[test]
    fn zscore_normalizes_spread() {
        let src = vec![1.0, 2.0, 3.0, 4.0];
        let mut dst = vec![0.0; 4];
        zscore_into(&src, &mut dst);
        let mean: f32 = dst.iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);
        let var: f32 = dst.iter().map(|v| v * v).sum::<f32>() / 4.0;
        assert!((var - 1.0).abs() < 1e-5);
    }

    #[test]
    fn euclidean_distance_basic() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((euclidean_distance(&a, &b) - 5.0).abs() < 1e-12);
    }
}
