//! Orthonormal DCT-II and its inverse (DCT-III).
//!
//! With orthonormal scaling the transform matrix is orthogonal, so
//! `idct_1d(dct_1d(x)) == x` up to floating-point error and the transform
//! preserves energy. Action chunks are short (tens of steps), so the direct
//! O(N²) form with a precomputed basis is used.

use std::f64::consts::PI;

use crate::array::ActionChunk;

/// Precomputed orthonormal cosine basis for one sequence length.
///
/// `basis[k * n + i]` is `s_k * cos(pi * (2i + 1) * k / 2n)` with
/// `s_0 = sqrt(1/n)` and `s_k = sqrt(2/n)` otherwise.
#[derive(Debug, Clone)]
pub(crate) struct DctBasis {
    n: usize,
    basis: Vec<f64>,
}

impl DctBasis {
    pub(crate) fn new(n: usize) -> Self {
        let mut basis = Vec::with_capacity(n * n);
        if n == 0 {
            return Self { n, basis };
        }
        let nf = n as f64;
        for k in 0..n {
            let scale = if k == 0 { (1.0 / nf).sqrt() } else { (2.0 / nf).sqrt() };
            for i in 0..n {
                let angle = PI * (2 * i + 1) as f64 * k as f64 / (2.0 * nf);
                basis.push(scale * angle.cos());
            }
        }
        Self { n, basis }
    }

    /// Forward transform of one strided sequence.
    ///
    /// Reads `input[offset + i * stride]` for `i in 0..n` and writes the
    /// coefficients to the same positions of `output`.
    fn forward_strided(&self, input: &[f64], output: &mut [f64], offset: usize, stride: usize) {
        for k in 0..self.n {
            let row = &self.basis[k * self.n..(k + 1) * self.n];
            let sum: f64 = row
                .iter()
                .enumerate()
                .map(|(i, b)| b * input[offset + i * stride])
                .sum();
            output[offset + k * stride] = sum;
        }
    }

    /// Inverse transform of one strided sequence (transpose of the forward basis).
    fn inverse_strided(&self, input: &[f64], output: &mut [f64], offset: usize, stride: usize) {
        for i in 0..self.n {
            let sum: f64 = (0..self.n)
                .map(|k| self.basis[k * self.n + i] * input[offset + k * stride])
                .sum();
            output[offset + i * stride] = sum;
        }
    }
}

/// Orthonormal DCT-II of a sequence.
pub fn dct_1d(input: &[f64]) -> Vec<f64> {
    let mut output = vec![0.0; input.len()];
    DctBasis::new(input.len()).forward_strided(input, &mut output, 0, 1);
    output
}

/// Orthonormal DCT-III, the inverse of [`dct_1d`].
pub fn idct_1d(input: &[f64]) -> Vec<f64> {
    let mut output = vec![0.0; input.len()];
    DctBasis::new(input.len()).inverse_strided(input, &mut output, 0, 1);
    output
}

/// DCT along the time axis, independently for every action dimension.
pub(crate) fn dct_time_axis(chunk: &ActionChunk) -> Vec<f64> {
    let (time_horizon, action_dim) = chunk.shape();
    let basis = DctBasis::new(time_horizon);
    let mut coeffs = vec![0.0; time_horizon * action_dim];
    for d in 0..action_dim {
        basis.forward_strided(chunk.as_slice(), &mut coeffs, d, action_dim);
    }
    coeffs
}

/// Inverse of [`dct_time_axis`] for time-major coefficients of the given shape.
pub(crate) fn idct_time_axis(coeffs: &[f64], time_horizon: usize, action_dim: usize) -> Vec<f64> {
    let basis = DctBasis::new(time_horizon);
    let mut values = vec![0.0; time_horizon * action_dim];
    for d in 0..action_dim {
        basis.inverse_strided(coeffs, &mut values, d, action_dim);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dct_1d_roundtrip() {
        let input = [1.0, -2.0, 3.5, 0.25, 7.0, -1.5, 0.0, 2.0];
        let coeffs = dct_1d(&input);
        let restored = idct_1d(&coeffs);

        for (a, b) in input.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-12, "DCT roundtrip failed: {a} vs {b}");
        }
    }

    #[test]
    fn test_constant_signal_has_only_dc() {
        let input = [2.0; 4];
        let coeffs = dct_1d(&input);

        // Orthonormal DC term is sum / sqrt(n).
        assert!((coeffs[0] - 4.0).abs() < 1e-12);
        for c in &coeffs[1..] {
            assert!(c.abs() < 1e-12);
        }
    }

    #[test]
    fn test_energy_preserved() {
        let input = [0.3, -1.2, 2.2, 0.7, -0.1];
        let coeffs = dct_1d(&input);

        let e_in: f64 = input.iter().map(|x| x * x).sum();
        let e_out: f64 = coeffs.iter().map(|x| x * x).sum();
        assert!((e_in - e_out).abs() < 1e-12);
    }

    #[test]
    fn test_time_axis_is_per_dimension() {
        // Dimension 0 is constant, dimension 1 alternates.
        let chunk = ActionChunk::from_rows(&[
            vec![1.0, 1.0],
            vec![1.0, -1.0],
            vec![1.0, 1.0],
            vec![1.0, -1.0],
        ])
        .expect("rectangular");
        let coeffs = dct_time_axis(&chunk);

        // Column 0 only has DC energy.
        assert!((coeffs[0] - 2.0).abs() < 1e-12);
        for t in 1..4 {
            assert!(coeffs[t * 2].abs() < 1e-12);
        }
        // Column 1 has no DC energy.
        assert!(coeffs[1].abs() < 1e-12);

        let restored = idct_time_axis(&coeffs, 4, 2);
        for (a, b) in chunk.as_slice().iter().zip(&restored) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_empty_sequence() {
        assert!(dct_1d(&[]).is_empty());
        assert!(idct_1d(&[]).is_empty());
    }
}
