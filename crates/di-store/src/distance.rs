//! Raw distance functions. Lower is closer for every metric; the facade
//! turns distances into similarities with `Metric::similarity`.

use di_core::Metric;

/// Compute inner product (dot product) of two vectors.
#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute L2 squared distance.
#[inline]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| {
        let d = x - y;
        d * d
    }).sum()
}

#[inline]
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// `1 - cos(a, b)` given precomputed norms. A zero vector is orthogonal to
/// everything.
#[inline]
pub fn cosine_distance_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - inner_product(a, b) / (norm_a * norm_b)
}

/// Raw distance between two vectors under `metric`.
pub fn raw_distance(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_distance_with_norms(a, norm(a), b, norm(b)),
        Metric::L2Norm => l2_squared(a, b).sqrt(),
        Metric::DotProduct => -inner_product(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_product() {
        assert!((inner_product(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance() {
        let a = [1.0, 2.0, 3.0];
        assert!(raw_distance(Metric::Cosine, &a, &a).abs() < 1e-6);
        assert!((raw_distance(Metric::Cosine, &[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((raw_distance(Metric::Cosine, &[0.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_distance() {
        assert!((raw_distance(Metric::L2Norm, &[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_dot_distance_is_negated() {
        assert!((raw_distance(Metric::DotProduct, &[1.0, 1.0], &[2.0, 3.0]) + 5.0).abs() < 1e-6);
    }
}
