//! Affine Layer (Fully Connected)
//!
//! The affine layer performs `y = x @ W + b` on a batch whose samples may
//! have any trailing shape. Each sample is flattened to a row first.
//!
//! ## Forward Pass
//!
//! ```text
//! Input:  x [N, d1, ..., dk]  → x_flat [N, D]   (D = d1 * ... * dk)
//! Weight: W [D, M]
//! Bias:   b [M]
//! Output: y = x_flat @ W + b [N, M]
//! ```
//!
//! ## Backward Pass
//!
//! ```text
//! grad_W = x_flat^T @ grad_y
//! grad_b = sum(grad_y, axis=0)
//! grad_x = (grad_y @ W^T) reshaped to [N, d1, ..., dk]
//! ```

use crate::error::{NetError, Result};
use crate::tensor::{Dtype, Tensor};
use rand::Rng;

/// Affine layer parameters
///
/// - `weight`: `[in_features, out_features]`
/// - `bias`: `[out_features]`
#[derive(Clone, Debug)]
pub struct Affine {
    pub weight: Tensor,
    pub bias: Tensor,
}

impl Affine {
    /// Create an affine layer with Gaussian weights and zero bias
    ///
    /// Weights are drawn from N(0, weight_scale²).
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        weight_scale: f64,
        rng: &mut R,
    ) -> Result<Self> {
        Ok(Self {
            weight: Tensor::randn(vec![in_features, out_features], weight_scale, rng)?,
            bias: Tensor::zeros(vec![out_features]),
        })
    }

    /// Build an affine layer from existing tensors
    pub fn from_parts(weight: Tensor, bias: Tensor) -> Self {
        Self { weight, bias }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape[0]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape[1]
    }

    /// Round weight and bias to `dtype`
    pub fn cast_in_place(&mut self, dtype: Dtype) {
        self.weight.cast_in_place(dtype);
        self.bias.cast_in_place(dtype);
    }

    /// Forward pass
    ///
    /// Returns `DimensionMismatch` if the flattened sample width differs from
    /// the weight's row count.
    pub fn forward(&self, x: &Tensor) -> Result<(Tensor, AffineCache)> {
        if x.shape.is_empty() || x.row_width() != self.in_features() {
            return Err(NetError::mismatch(
                "affine forward",
                format!("[N, {}]", self.in_features()),
                format!("{:?}", x.shape),
            ));
        }

        let x_flat = x.flatten_batch();
        let y = x_flat.matmul(&self.weight).add(&self.bias);
        let cache = AffineCache {
            x_flat,
            input_shape: x.shape.clone(),
        };
        Ok((y, cache))
    }

    /// Backward pass
    ///
    /// `grad_out` is `[N, out_features]`; the returned input gradient has the
    /// shape of the original (unflattened) input.
    pub fn backward(&self, grad_out: &Tensor, cache: &AffineCache) -> AffineGradients {
        let grad_weight = cache.x_flat.transpose().matmul(grad_out);
        let grad_bias = grad_out.sum_axis0();
        let grad_x = grad_out
            .matmul(&self.weight.transpose())
            .reshape(&cache.input_shape);

        AffineGradients {
            weight: grad_weight,
            bias: grad_bias,
            x: grad_x,
        }
    }
}

/// Cache for affine backward pass
#[derive(Clone, Debug)]
pub struct AffineCache {
    pub x_flat: Tensor,
    pub input_shape: Vec<usize>,
}

/// Gradients for affine layer
#[derive(Clone, Debug)]
pub struct AffineGradients {
    pub weight: Tensor,
    pub bias: Tensor,
    pub x: Tensor, // Gradient to pass to previous layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradients::{eval_numerical_gradient_array, rel_error};
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_forward_flattens_trailing_dims() {
        // x: 2 samples of shape [2, 2], W maps 4 -> 3
        let x = Tensor::linspace(-0.1, 0.5, vec![2, 2, 2]);
        let w = Tensor::linspace(-0.2, 0.3, vec![4, 3]);
        let b = Tensor::linspace(-0.3, 0.1, vec![3]);
        let layer = Affine::from_parts(w.clone(), b.clone());

        let (out, cache) = layer.forward(&x).unwrap();
        assert_eq!(out.shape, vec![2, 3]);
        assert_eq!(cache.input_shape, vec![2, 2, 2]);

        for i in 0..2 {
            for j in 0..3 {
                let expected: f64 = (0..4)
                    .map(|k| x.data[i * 4 + k] * w.data[k * 3 + j])
                    .sum::<f64>()
                    + b.data[j];
                assert_abs_diff_eq!(out.data[i * 3 + j], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_forward_rejects_wrong_width() {
        let mut rng = StdRng::seed_from_u64(0);
        let layer = Affine::new(5, 3, 1.0, &mut rng).unwrap();
        let x = Tensor::zeros(vec![2, 4]);
        assert!(matches!(
            layer.forward(&x),
            Err(NetError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_backward_matches_numerical_gradient() {
        let mut rng = StdRng::seed_from_u64(231);
        let x = Tensor::randn(vec![4, 2, 3], 1.0, &mut rng).unwrap();
        let w = Tensor::randn(vec![6, 5], 1.0, &mut rng).unwrap();
        let b = Tensor::randn(vec![5], 1.0, &mut rng).unwrap();
        let dout = Tensor::randn(vec![4, 5], 1.0, &mut rng).unwrap();

        let layer = Affine::from_parts(w.clone(), b.clone());
        let (_, cache) = layer.forward(&x).unwrap();
        let grads = layer.backward(&dout, &cache);

        assert_eq!(grads.x.shape, x.shape);
        assert_eq!(grads.weight.shape, w.shape);
        assert_eq!(grads.bias.shape, b.shape);

        let dx_num = eval_numerical_gradient_array(
            |x| Affine::from_parts(w.clone(), b.clone()).forward(x).unwrap().0,
            &x,
            &dout,
            1e-5,
        );
        let dw_num = eval_numerical_gradient_array(
            |w| Affine::from_parts(w.clone(), b.clone()).forward(&x).unwrap().0,
            &w,
            &dout,
            1e-5,
        );
        let db_num = eval_numerical_gradient_array(
            |b| Affine::from_parts(w.clone(), b.clone()).forward(&x).unwrap().0,
            &b,
            &dout,
            1e-5,
        );

        assert!(rel_error(&grads.x, &dx_num) < 1e-6);
        assert!(rel_error(&grads.weight, &dw_num) < 1e-6);
        assert!(rel_error(&grads.bias, &db_num) < 1e-6);
    }
}
