//! Composite Layers
//!
//! Fixed chains of primitive layers used by every hidden layer of the
//! networks:
//!
//! ```text
//! affine → ReLU
//! affine → batchnorm → ReLU
//! ```
//!
//! The cache of a composite holds the cache of each stage. Backward runs the
//! stages in reverse, each stage reading only its own cache.

use super::activation::{relu_backward, relu_forward, ReluCache};
use super::affine::{Affine, AffineCache};
use super::batch_norm::{BatchNorm, BatchNormCache, BatchNormState};
use crate::error::Result;
use crate::tensor::Tensor;

/// Forward pass: x → affine → ReLU
pub fn affine_relu_forward(x: &Tensor, affine: &Affine) -> Result<(Tensor, AffineReluCache)> {
    let (a, affine_cache) = affine.forward(x)?;
    let (out, relu_cache) = relu_forward(&a);
    Ok((
        out,
        AffineReluCache {
            affine_cache,
            relu_cache,
        },
    ))
}

/// Backward pass through ReLU, then affine
pub fn affine_relu_backward(
    grad_out: &Tensor,
    affine: &Affine,
    cache: &AffineReluCache,
) -> AffineReluGradients {
    let grad_a = relu_backward(grad_out, &cache.relu_cache);
    let affine_grads = affine.backward(&grad_a, &cache.affine_cache);

    AffineReluGradients {
        x: affine_grads.x,
        weight: affine_grads.weight,
        bias: affine_grads.bias,
    }
}

/// Forward pass: x → affine → batchnorm → ReLU
pub fn affine_bn_relu_forward(
    x: &Tensor,
    affine: &Affine,
    norm: &BatchNorm,
    state: &mut BatchNormState,
) -> Result<(Tensor, AffineBnReluCache)> {
    let (a, affine_cache) = affine.forward(x)?;
    let (normed, bn_cache) = norm.forward(&a, state)?;
    let (out, relu_cache) = relu_forward(&normed);
    Ok((
        out,
        AffineBnReluCache {
            affine_cache,
            bn_cache,
            relu_cache,
        },
    ))
}

/// Backward pass through ReLU, then batchnorm, then affine
pub fn affine_bn_relu_backward(
    grad_out: &Tensor,
    affine: &Affine,
    norm: &BatchNorm,
    cache: &AffineBnReluCache,
) -> AffineBnReluGradients {
    let grad_normed = relu_backward(grad_out, &cache.relu_cache);
    let bn_grads = norm.backward(&grad_normed, &cache.bn_cache);
    let affine_grads = affine.backward(&bn_grads.x, &cache.affine_cache);

    AffineBnReluGradients {
        x: affine_grads.x,
        weight: affine_grads.weight,
        bias: affine_grads.bias,
        gamma: bn_grads.gamma,
        beta: bn_grads.beta,
    }
}

/// Cache for affine → ReLU
#[derive(Clone, Debug)]
pub struct AffineReluCache {
    pub affine_cache: AffineCache,
    pub relu_cache: ReluCache,
}

/// Gradients for affine → ReLU
#[derive(Clone, Debug)]
pub struct AffineReluGradients {
    pub x: Tensor,
    pub weight: Tensor,
    pub bias: Tensor,
}

/// Cache for affine → batchnorm → ReLU
#[derive(Clone, Debug)]
pub struct AffineBnReluCache {
    pub affine_cache: AffineCache,
    pub bn_cache: BatchNormCache,
    pub relu_cache: ReluCache,
}

/// Gradients for affine → batchnorm → ReLU
#[derive(Clone, Debug)]
pub struct AffineBnReluGradients {
    pub x: Tensor,
    pub weight: Tensor,
    pub bias: Tensor,
    pub gamma: Tensor,
    pub beta: Tensor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradients::{eval_numerical_gradient_array, rel_error};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_affine_relu_matches_manual_chain() {
        let mut rng = StdRng::seed_from_u64(3);
        let x = Tensor::randn(vec![2, 3, 4], 1.0, &mut rng).unwrap();
        let affine = Affine::new(12, 10, 1.0, &mut rng).unwrap();
        let dout = Tensor::randn(vec![2, 10], 1.0, &mut rng).unwrap();

        let (out, cache) = affine_relu_forward(&x, &affine).unwrap();
        let grads = affine_relu_backward(&dout, &affine, &cache);

        let (a, a_cache) = affine.forward(&x).unwrap();
        let (expected, r_cache) = relu_forward(&a);
        let expected_grads = affine.backward(&relu_backward(&dout, &r_cache), &a_cache);

        assert_eq!(out, expected);
        assert_eq!(grads.x, expected_grads.x);
        assert_eq!(grads.weight, expected_grads.weight);
        assert_eq!(grads.bias, expected_grads.bias);
    }

    #[test]
    fn test_affine_relu_backward_matches_numerical_gradient() {
        let mut rng = StdRng::seed_from_u64(231);
        let x = Tensor::randn(vec![2, 3, 4], 1.0, &mut rng).unwrap();
        let w = Tensor::randn(vec![12, 10], 1.0, &mut rng).unwrap();
        let b = Tensor::randn(vec![10], 1.0, &mut rng).unwrap();
        let dout = Tensor::randn(vec![2, 10], 1.0, &mut rng).unwrap();

        let affine = Affine::from_parts(w.clone(), b.clone());
        let (_, cache) = affine_relu_forward(&x, &affine).unwrap();
        let grads = affine_relu_backward(&dout, &affine, &cache);

        let run = |x: &Tensor, w: &Tensor, b: &Tensor| {
            affine_relu_forward(x, &Affine::from_parts(w.clone(), b.clone()))
                .unwrap()
                .0
        };
        let dx_num = eval_numerical_gradient_array(|x| run(x, &w, &b), &x, &dout, 1e-5);
        let dw_num = eval_numerical_gradient_array(|w| run(&x, w, &b), &w, &dout, 1e-5);
        let db_num = eval_numerical_gradient_array(|b| run(&x, &w, b), &b, &dout, 1e-5);

        assert_eq!(grads.x.shape, x.shape);
        assert!(rel_error(&grads.x, &dx_num) < 1e-6);
        assert!(rel_error(&grads.weight, &dw_num) < 1e-6);
        assert!(rel_error(&grads.bias, &db_num) < 1e-6);
    }

    #[test]
    fn test_affine_bn_relu_backward_matches_numerical_gradient() {
        let mut rng = StdRng::seed_from_u64(231);
        let x = Tensor::randn(vec![4, 3], 1.0, &mut rng).unwrap();
        let w = Tensor::randn(vec![3, 5], 1.0, &mut rng).unwrap();
        let b = Tensor::randn(vec![5], 1.0, &mut rng).unwrap();
        let gamma = Tensor::randn(vec![5], 1.0, &mut rng).unwrap();
        let beta = Tensor::randn(vec![5], 1.0, &mut rng).unwrap();
        let dout = Tensor::randn(vec![4, 5], 1.0, &mut rng).unwrap();

        let affine = Affine::from_parts(w.clone(), b.clone());
        let norm = BatchNorm {
            gamma: gamma.clone(),
            beta: beta.clone(),
        };
        let (out, cache) =
            affine_bn_relu_forward(&x, &affine, &norm, &mut BatchNormState::new()).unwrap();
        let grads = affine_bn_relu_backward(&dout, &affine, &norm, &cache);
        assert_eq!(out.shape, vec![4, 5]);

        let run = |x: &Tensor, w: &Tensor, b: &Tensor, gamma: &Tensor, beta: &Tensor| {
            let affine = Affine::from_parts(w.clone(), b.clone());
            let norm = BatchNorm {
                gamma: gamma.clone(),
                beta: beta.clone(),
            };
            affine_bn_relu_forward(x, &affine, &norm, &mut BatchNormState::new())
                .unwrap()
                .0
        };
        let dx_num =
            eval_numerical_gradient_array(|x| run(x, &w, &b, &gamma, &beta), &x, &dout, 1e-5);
        let dw_num =
            eval_numerical_gradient_array(|w| run(&x, w, &b, &gamma, &beta), &w, &dout, 1e-5);
        let dgamma_num =
            eval_numerical_gradient_array(|g| run(&x, &w, &b, g, &beta), &gamma, &dout, 1e-5);
        let dbeta_num =
            eval_numerical_gradient_array(|bt| run(&x, &w, &b, &gamma, bt), &beta, &dout, 1e-5);

        assert!(rel_error(&grads.x, &dx_num) < 1e-5);
        assert!(rel_error(&grads.weight, &dw_num) < 1e-5);
        assert!(rel_error(&grads.gamma, &dgamma_num) < 1e-5);
        assert!(rel_error(&grads.beta, &dbeta_num) < 1e-5);

        // Bias is cancelled by the batch mean
        assert!(grads.bias.data.iter().all(|v| v.abs() < 1e-10));
    }
}
