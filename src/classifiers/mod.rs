//! Classifier Networks
//!
//! Networks assembled from the layers in [`crate::layers`]:
//!
//! - **two_layer**: `affine → ReLU → affine → softmax`
//! - **fc_net**: any number of hidden layers, each
//!   `affine → [batchnorm] → ReLU → [dropout]`, followed by a final affine
//!   layer and softmax loss
//!
//! ## The `loss` Contract
//!
//! Both networks implement [`Classifier`]. A call without labels is a
//! test-mode forward pass returning raw class scores `[N, C]`. A call with
//! labels is a training step returning the scalar loss and a gradient for
//! every parameter, with exactly the parameter store's key set.
//!
//! Parameters are never modified by `loss`; an external solver updates them
//! through [`Classifier::params_mut`].

pub mod fc_net;
pub mod two_layer;

pub use fc_net::{FullyConnectedNet, Hidden, HiddenCache};
pub use two_layer::TwoLayerNet;

use crate::error::{NetError, Result};
use crate::params::{Gradients, ParamStore};
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Result of [`Classifier::loss`]
#[derive(Clone, Debug)]
pub enum LossOutput {
    /// Raw (pre-softmax) scores `[N, C]`, returned when no labels are given
    Scores(Tensor),
    /// Data loss plus regularization, and the gradient of every parameter
    Training { loss: f64, grads: Gradients },
}

/// A network that scores a batch and, given labels, computes loss and
/// gradients
pub trait Classifier {
    /// Test-mode forward pass returning raw scores `[N, C]`
    fn scores(&mut self, x: &Tensor) -> Result<Tensor>;

    /// Training-mode forward and backward pass
    ///
    /// The returned loss includes the L2 regularization term.
    fn loss_and_grads(&mut self, x: &Tensor, y: &[usize]) -> Result<(f64, Gradients)>;

    fn params(&self) -> &ParamStore;

    fn params_mut(&mut self) -> &mut ParamStore;

    /// Scores when `y` is `None`, otherwise loss and gradients
    fn loss(&mut self, x: &Tensor, y: Option<&[usize]>) -> Result<LossOutput> {
        match y {
            None => Ok(LossOutput::Scores(self.scores(x)?)),
            Some(y) => {
                let (loss, grads) = self.loss_and_grads(x, y)?;
                Ok(LossOutput::Training { loss, grads })
            }
        }
    }

    /// Predicted class of every sample
    fn predict(&mut self, x: &Tensor) -> Result<Vec<usize>> {
        Ok(self.scores(x)?.argmax_rows())
    }

    /// Fraction of samples whose predicted class equals the label
    fn accuracy(&mut self, x: &Tensor, y: &[usize]) -> Result<f64> {
        let predicted = self.predict(x)?;
        if y.len() != predicted.len() {
            return Err(NetError::mismatch(
                "accuracy",
                format!("{} labels", predicted.len()),
                format!("{} labels", y.len()),
            ));
        }
        if predicted.is_empty() {
            return Ok(0.0);
        }
        let correct = predicted.iter().zip(y).filter(|(p, l)| p == l).count();
        Ok(correct as f64 / predicted.len() as f64)
    }
}

/// Random source for weight initialization
pub(crate) fn init_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}
