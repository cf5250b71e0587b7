//! Gradient Utilities
//!
//! Tools for verifying and monitoring gradients: finite-difference gradients,
//! relative error between two gradient tensors, a whole-model gradient check,
//! and the global gradient norm.
//!
//! ## Numerical Gradients
//!
//! Every analytic backward pass in this crate is checked against centered
//! differences:
//!
//! ```text
//! df/dx[i] ≈ (f(x + h·e_i) - f(x - h·e_i)) / 2h
//! ```
//!
//! For a tensor-valued `f` the difference is contracted with an upstream
//! gradient `dout`, giving the gradient of `Σ f(x) * dout`:
//!
//! ```text
//! grad[i] = Σ_j (f(x + h·e_i)[j] - f(x - h·e_i)[j]) * dout[j] / 2h
//! ```
//!
//! ## Relative Error
//!
//! ```text
//! rel_error(a, b) = max_i |a_i - b_i| / max(1e-8, |a_i| + |b_i|)
//! ```
//!
//! In f64 a correct backward pass typically lands below `1e-7`.
//!
//! ## Example
//!
//! ```rust
//! use fcnet::gradients::{eval_numerical_gradient, rel_error};
//! use fcnet::Tensor;
//!
//! let x = Tensor::new(vec![1.0, -2.0, 3.0], vec![3]);
//! let numeric = eval_numerical_gradient(|x| x.sum_squares(), &x, 1e-5);
//! let analytic = x.mul_scalar(2.0);
//! assert!(rel_error(&analytic, &numeric) < 1e-8);
//! ```

use crate::classifiers::Classifier;
use crate::error::{NetError, Result};
use crate::params::{Gradients, ParamKey};
use crate::tensor::Tensor;
use rayon::prelude::*;
use tracing::debug;

/// Maximum elementwise relative error between two tensors of equal shape
///
/// # Panics
///
/// Panics if the shapes differ.
pub fn rel_error(a: &Tensor, b: &Tensor) -> f64 {
    assert_eq!(a.shape, b.shape, "rel_error on tensors of different shape");
    a.data
        .iter()
        .zip(&b.data)
        .map(|(&x, &y)| (x - y).abs() / (x.abs() + y.abs()).max(1e-8))
        .fold(0.0, f64::max)
}

/// Centered-difference gradient of a scalar function
///
/// # Arguments
///
/// * `f` - Function to differentiate, called twice per element of `x`
/// * `x` - Point at which the gradient is evaluated
/// * `h` - Step size
pub fn eval_numerical_gradient<F>(mut f: F, x: &Tensor, h: f64) -> Tensor
where
    F: FnMut(&Tensor) -> f64,
{
    let mut x = x.clone();
    let mut grad = Tensor::zeros(x.shape.clone());

    for i in 0..x.len() {
        let old = x.data[i];
        x.data[i] = old + h;
        let pos = f(&x);
        x.data[i] = old - h;
        let neg = f(&x);
        x.data[i] = old;

        grad.data[i] = (pos - neg) / (2.0 * h);
    }

    grad
}

/// Centered-difference gradient of a tensor-valued function
///
/// Returns the gradient of `Σ f(x) * dout` with respect to `x`, which is what
/// a backward pass receiving `dout` must produce.
pub fn eval_numerical_gradient_array<F>(mut f: F, x: &Tensor, dout: &Tensor, h: f64) -> Tensor
where
    F: FnMut(&Tensor) -> Tensor,
{
    let mut x = x.clone();
    let mut grad = Tensor::zeros(x.shape.clone());

    for i in 0..x.len() {
        let old = x.data[i];
        x.data[i] = old + h;
        let pos = f(&x);
        x.data[i] = old - h;
        let neg = f(&x);
        x.data[i] = old;

        let dot: f64 = pos
            .data
            .iter()
            .zip(&neg.data)
            .zip(&dout.data)
            .map(|((p, n), d)| (p - n) * d)
            .sum();
        grad.data[i] = dot / (2.0 * h);
    }

    grad
}

/// Check every parameter gradient of a model against finite differences
///
/// Runs one training-mode `loss` call for the analytic gradients, then
/// perturbs each parameter element in place, restoring it afterwards.
/// The model's loss must be deterministic for the result to be meaningful,
/// so dropout needs a fixed seed.
///
/// # Returns
///
/// `(key, relative error)` for every parameter, in parameter order
pub fn check_model_gradients<C>(
    model: &mut C,
    x: &Tensor,
    y: &[usize],
    h: f64,
) -> Result<Vec<(ParamKey, f64)>>
where
    C: Classifier + ?Sized,
{
    let (_, grads) = model.loss_and_grads(x, y)?;
    let mut errors = Vec::new();

    for key in model.params().keys() {
        let analytic = grads
            .get(key)
            .ok_or_else(|| NetError::UnknownParameter(key.to_string()))?;
        let mut numeric = Tensor::zeros(analytic.shape.clone());

        for i in 0..numeric.len() {
            let old = param_mut(model, key)?.data[i];

            param_mut(model, key)?.data[i] = old + h;
            let (pos, _) = model.loss_and_grads(x, y)?;
            param_mut(model, key)?.data[i] = old - h;
            let (neg, _) = model.loss_and_grads(x, y)?;
            param_mut(model, key)?.data[i] = old;

            numeric.data[i] = (pos - neg) / (2.0 * h);
        }

        let error = rel_error(analytic, &numeric);
        debug!(param = %key, rel_error = error, "gradient check");
        errors.push((key, error));
    }

    Ok(errors)
}

fn param_mut<C: Classifier + ?Sized>(model: &mut C, key: ParamKey) -> Result<&mut Tensor> {
    model
        .params_mut()
        .get_mut(key)
        .ok_or_else(|| NetError::UnknownParameter(key.to_string()))
}

/// Compute the L2 norm of all gradients
///
/// The gradient norm is the square root of the sum of all squared gradient
/// values across every parameter of the model.
///
/// # Performance
///
/// The sum of squares within each tensor is computed in parallel via Rayon.
pub fn compute_grad_norm(grads: &Gradients) -> f64 {
    let sum_sq: f64 = grads
        .iter()
        .map(|(_, grad)| grad.data.par_iter().map(|&v| v * v).sum::<f64>())
        .sum();
    sum_sq.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::LayerGradients;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rel_error() {
        let a = Tensor::new(vec![1.0, 2.0, 0.0], vec![3]);
        let b = Tensor::new(vec![1.0, 2.2, 0.0], vec![3]);
        assert_abs_diff_eq!(rel_error(&a, &a), 0.0);
        assert_abs_diff_eq!(rel_error(&a, &b), 0.2 / 4.2, epsilon = 1e-12);
    }

    #[test]
    #[should_panic(expected = "different shape")]
    fn test_rel_error_shape_mismatch() {
        rel_error(&Tensor::zeros(vec![2]), &Tensor::zeros(vec![3]));
    }

    #[test]
    fn test_numerical_gradient_of_quadratic() {
        // f(x) = Σ x³, df/dx = 3x²
        let x = Tensor::new(vec![0.5, -1.0, 2.0, 3.0], vec![2, 2]);
        let numeric = eval_numerical_gradient(|x| x.data.iter().map(|v| v * v * v).sum(), &x, 1e-5);
        let analytic = x.map(|v| 3.0 * v * v);
        assert!(rel_error(&analytic, &numeric) < 1e-8);
    }

    #[test]
    fn test_numerical_gradient_array_contracts_with_dout() {
        // f(x) = 2x elementwise, so the gradient of Σ f(x)·dout is 2·dout
        let x = Tensor::new(vec![1.0, 2.0, 3.0], vec![3]);
        let dout = Tensor::new(vec![0.5, -1.0, 4.0], vec![3]);
        let numeric = eval_numerical_gradient_array(|x| x.mul_scalar(2.0), &x, &dout, 1e-5);
        assert!(rel_error(&dout.mul_scalar(2.0), &numeric) < 1e-8);
    }

    #[test]
    fn test_compute_grad_norm() {
        let grads = Gradients {
            layers: vec![
                LayerGradients {
                    weight: Tensor::new(vec![3.0, 0.0], vec![1, 2]),
                    bias: Tensor::new(vec![4.0, 0.0], vec![2]),
                    gamma: None,
                    beta: None,
                },
                LayerGradients {
                    weight: Tensor::zeros(vec![2, 1]),
                    bias: Tensor::new(vec![12.0], vec![1]),
                    gamma: None,
                    beta: None,
                },
            ],
        };
        assert_abs_diff_eq!(compute_grad_norm(&grads), 13.0, epsilon = 1e-12);
    }
}
