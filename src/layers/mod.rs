//! Neural Network Layers
//!
//! This module contains the differentiable building blocks the networks are
//! assembled from. Each layer provides both forward and backward passes.
//!
//! ## Layers
//!
//! - **affine**: Fully connected layer `x @ W + b`
//! - **activation**: ReLU
//! - **batch_norm**: Batch normalization with running statistics
//! - **dropout**: Inverted dropout
//! - **softmax**: Softmax cross-entropy loss
//! - **composite**: affine → ReLU and affine → batchnorm → ReLU
//!
//! ## Design Pattern
//!
//! Each layer follows a consistent pattern:
//!
//! ```rust,ignore
//! impl Layer {
//!     pub fn forward(&self, x: &Tensor) -> Result<(Tensor, Cache)> { }
//!     pub fn backward(&self, grad: &Tensor, cache: &Cache) -> Gradients { }
//! }
//!
//! pub struct Cache {
//!     // Values needed for backward pass
//! }
//!
//! pub struct Gradients {
//!     // Gradients for parameters and input
//! }
//! ```
//!
//! A cache is produced by one forward call and consumed by the matching
//! backward call. Layers whose behaviour depends on train/test mode
//! (batchnorm, dropout) read it from an explicit state object passed in by
//! the caller.

pub mod activation;
pub mod affine;
pub mod batch_norm;
pub mod composite;
pub mod dropout;
pub mod softmax;

use serde::{Deserialize, Serialize};

/// Whether stateful layers run with training or inference behaviour
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Train,
    Test,
}

// Re-export main types for convenience
pub use activation::{relu_backward, relu_forward, ReluCache};
pub use affine::{Affine, AffineCache, AffineGradients};
pub use batch_norm::{BatchNorm, BatchNormCache, BatchNormGradients, BatchNormState, RunningStats};
pub use composite::{
    affine_bn_relu_backward, affine_bn_relu_forward, affine_relu_backward, affine_relu_forward,
    AffineBnReluCache, AffineBnReluGradients, AffineReluCache, AffineReluGradients,
};
pub use dropout::{dropout_backward, dropout_forward, DropoutCache, DropoutState};
pub use softmax::softmax_loss;
