//! Activation Functions
//!
//! ## ReLU (Rectified Linear Unit)
//!
//! ```text
//! ReLU(x) = max(0, x)
//! ReLU'(x) = 1 if x > 0 else 0
//! ```
//!
//! The gradient at exactly zero is taken to be zero, so an input that sits
//! on the kink passes no gradient back.

use crate::tensor::Tensor;
use rayon::prelude::*;

/// ReLU activation (forward pass)
///
/// Returns the activated tensor and a cache holding the input.
pub fn relu_forward(x: &Tensor) -> (Tensor, ReluCache) {
    let out = x.map(|v| v.max(0.0));
    (out, ReluCache { x: x.clone() })
}

/// ReLU activation (backward pass)
///
/// Passes `grad_out` through wherever the forward input was positive.
pub fn relu_backward(grad_out: &Tensor, cache: &ReluCache) -> Tensor {
    assert_eq!(
        grad_out.shape, cache.x.shape,
        "ReLU backward: gradient shape must match cached input"
    );
    let grad_data: Vec<f64> = cache
        .x
        .data
        .par_iter()
        .zip(&grad_out.data)
        .map(|(&x_val, &grad_val)| if x_val > 0.0 { grad_val } else { 0.0 })
        .collect();

    Tensor::new(grad_data, cache.x.shape.clone())
}

/// Cache for ReLU backward pass
#[derive(Clone, Debug)]
pub struct ReluCache {
    pub x: Tensor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradients::{eval_numerical_gradient_array, rel_error};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_relu_forward() {
        let x = Tensor::linspace(-0.5, 0.5, vec![3, 4]);
        let (out, _) = relu_forward(&x);
        let expected: Vec<f64> = x.data.iter().map(|&v| v.max(0.0)).collect();
        assert_eq!(out.data, expected);
        assert!(out.data.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_relu_backward_masks_negative_inputs() {
        let x = Tensor::new(vec![-1.0, 0.0, 2.0, 3.0], vec![2, 2]);
        let (_, cache) = relu_forward(&x);
        let dout = Tensor::new(vec![5.0, 6.0, 7.0, 8.0], vec![2, 2]);
        let dx = relu_backward(&dout, &cache);
        assert_eq!(dx.data, vec![0.0, 0.0, 7.0, 8.0]);
    }

    #[test]
    fn test_relu_backward_matches_numerical_gradient() {
        let mut rng = StdRng::seed_from_u64(10);
        let x = Tensor::randn(vec![10, 10], 1.0, &mut rng).unwrap();
        let dout = Tensor::randn(vec![10, 10], 1.0, &mut rng).unwrap();

        let (_, cache) = relu_forward(&x);
        let dx = relu_backward(&dout, &cache);
        let dx_num = eval_numerical_gradient_array(|x| relu_forward(x).0, &x, &dout, 1e-5);

        assert_eq!(dx.shape, x.shape);
        assert!(rel_error(&dx, &dx_num) < 1e-6);
    }
}
