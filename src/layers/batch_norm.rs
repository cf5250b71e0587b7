//! Batch Normalization
//!
//! Batch normalization normalizes every feature across the batch, then
//! applies a learnable scale (gamma) and shift (beta).
//!
//! ## Forward Pass (train mode)
//!
//! ```text
//! 1. mean = sum(x, axis=0) / N
//! 2. var = sum((x - mean)², axis=0) / N
//! 3. x_norm = (x - mean) / √(var + ε)
//! 4. y = γ * x_norm + β
//! 5. running_mean = m * running_mean + (1 - m) * mean
//!    running_var  = m * running_var  + (1 - m) * var
//! ```
//!
//! In test mode steps 1-2 are replaced by the running statistics and nothing
//! is updated.
//!
//! ## Backward Pass
//!
//! ```text
//! grad_γ = sum(grad_y * x_norm, axis=0)
//! grad_β = sum(grad_y, axis=0)
//! grad_x_norm = grad_y * γ
//! grad_x = (1/N) / √(var + ε) * (N * grad_x_norm
//!                                 - sum(grad_x_norm)
//!                                 - x_norm * sum(grad_x_norm * x_norm))
//! ```
//!
//! This is the simplified form of the chain rule through the batch mean and
//! variance. It avoids the large intermediate terms of the step-by-step
//! derivation and so loses less precision to cancellation.

use super::Mode;
use crate::error::{NetError, Result};
use crate::tensor::{Dtype, Tensor};
use tracing::trace;

/// Default momentum for the running statistics
pub const DEFAULT_MOMENTUM: f64 = 0.9;
/// Default epsilon added to the variance
pub const DEFAULT_EPS: f64 = 1e-5;

/// Learnable batch normalization parameters
#[derive(Clone, Debug)]
pub struct BatchNorm {
    pub gamma: Tensor, // Scale parameter [features]
    pub beta: Tensor,  // Shift parameter [features]
}

/// Exponential moving averages of the batch statistics
#[derive(Clone, Debug)]
pub struct RunningStats {
    pub mean: Tensor,
    pub var: Tensor,
}

impl RunningStats {
    /// Zero-initialized statistics for `features` columns
    pub fn zeros(features: usize) -> Self {
        Self {
            mean: Tensor::zeros(vec![features]),
            var: Tensor::zeros(vec![features]),
        }
    }

    /// Blend a new batch into the running averages
    ///
    /// `running = momentum * running + (1 - momentum) * batch`
    pub fn update(&mut self, batch_mean: &Tensor, batch_var: &Tensor, momentum: f64) {
        self.mean = self
            .mean
            .mul_scalar(momentum)
            .add(&batch_mean.mul_scalar(1.0 - momentum));
        self.var = self
            .var
            .mul_scalar(momentum)
            .add(&batch_var.mul_scalar(1.0 - momentum));
    }
}

/// Per-layer batch normalization state
///
/// Carries the train/test mode and the running statistics across forward
/// calls. Running statistics are created on the first forward call.
#[derive(Clone, Debug)]
pub struct BatchNormState {
    pub mode: Mode,
    pub eps: f64,
    pub momentum: f64,
    pub running: Option<RunningStats>,
}

impl Default for BatchNormState {
    fn default() -> Self {
        Self {
            mode: Mode::Train,
            eps: DEFAULT_EPS,
            momentum: DEFAULT_MOMENTUM,
            running: None,
        }
    }
}

impl BatchNormState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn running_for(&mut self, features: usize) -> Result<&mut RunningStats> {
        let running = self
            .running
            .get_or_insert_with(|| RunningStats::zeros(features));
        if running.mean.len() != features {
            return Err(NetError::mismatch(
                "batchnorm running statistics",
                format!("{} features", running.mean.len()),
                format!("{} features", features),
            ));
        }
        Ok(running)
    }
}

impl BatchNorm {
    /// Create a batch normalization layer with γ = 1 and β = 0
    pub fn new(features: usize) -> Self {
        Self {
            gamma: Tensor::filled(vec![features], 1.0),
            beta: Tensor::zeros(vec![features]),
        }
    }

    pub fn features(&self) -> usize {
        self.gamma.len()
    }

    /// Round gamma and beta to `dtype`
    pub fn cast_in_place(&mut self, dtype: Dtype) {
        self.gamma.cast_in_place(dtype);
        self.beta.cast_in_place(dtype);
    }

    /// Forward pass
    ///
    /// `x` must be `[N, features]` with `N > 0`. In train mode the running
    /// statistics in `state` are updated; in test mode they are read. On
    /// error `state` is left untouched.
    pub fn forward(&self, x: &Tensor, state: &mut BatchNormState) -> Result<(Tensor, BatchNormCache)> {
        let features = self.features();
        if x.shape.len() != 2 || x.shape[1] != features || x.shape[0] == 0 {
            return Err(NetError::mismatch(
                "batchnorm forward",
                format!("[N > 0, {}]", features),
                format!("{:?}", x.shape),
            ));
        }

        let eps = state.eps;
        let momentum = state.momentum;
        let mode = state.mode;
        let running = state.running_for(features)?;

        let (mean, std) = match mode {
            Mode::Train => {
                let mean = x.mean_axis0();
                let var = x.var_axis0();
                let std = var.add_scalar(eps).sqrt();
                running.update(&mean, &var, momentum);
                trace!(features, batch = x.rows(), "batchnorm updated running statistics");
                (mean, std)
            }
            Mode::Test => (running.mean.clone(), running.var.add_scalar(eps).sqrt()),
        };

        let x_norm = x.sub(&mean).div(&std);
        let y = x_norm.mul(&self.gamma).add(&self.beta);

        let cache = BatchNormCache { x_norm, std, mode };
        Ok((y, cache))
    }

    /// Backward pass
    ///
    /// A cache built in test mode treats the statistics as constants.
    pub fn backward(&self, grad_out: &Tensor, cache: &BatchNormCache) -> BatchNormGradients {
        assert_eq!(
            grad_out.shape, cache.x_norm.shape,
            "batchnorm backward: gradient shape must match cached activations"
        );
        let n = grad_out.rows() as f64;

        let grad_gamma = grad_out.mul(&cache.x_norm).sum_axis0();
        let grad_beta = grad_out.sum_axis0();
        let grad_x_norm = grad_out.mul(&self.gamma);

        let grad_x = match cache.mode {
            Mode::Train => {
                let sum_grad = grad_x_norm.sum_axis0();
                let sum_grad_x = grad_x_norm.mul(&cache.x_norm).sum_axis0();
                grad_x_norm
                    .mul_scalar(n)
                    .sub(&sum_grad)
                    .sub(&cache.x_norm.mul(&sum_grad_x))
                    .div(&cache.std)
                    .mul_scalar(1.0 / n)
            }
            Mode::Test => grad_x_norm.div(&cache.std),
        };

        BatchNormGradients {
            gamma: grad_gamma,
            beta: grad_beta,
            x: grad_x,
        }
    }
}

/// Cache for batch norm backward pass
#[derive(Clone, Debug)]
pub struct BatchNormCache {
    pub x_norm: Tensor,
    pub std: Tensor,
    pub mode: Mode,
}

/// Gradients for batch norm
#[derive(Clone, Debug)]
pub struct BatchNormGradients {
    pub gamma: Tensor,
    pub beta: Tensor,
    pub x: Tensor,
}
