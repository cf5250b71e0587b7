//! fcnet: Educational Fully Connected Networks
//!
//! Modular neural-network layers with hand-written forward and backward
//! passes, composed into two classifiers: a fixed two-layer network and a
//! fully connected network of any depth with optional batch normalization
//! and dropout.
//!
//! # Modules
//!
//! - [`tensor`] - Minimal row-major tensor
//! - [`layers`] - Affine, ReLU, batchnorm, dropout, softmax loss, and their
//!   compositions
//! - [`params`] - Parameter store and gradients with `W1`/`b1`/`gamma1` names
//! - [`classifiers`] - [`TwoLayerNet`] and [`FullyConnectedNet`]
//! - [`config`] - Network hyperparameters
//! - [`gradients`] - Numerical gradient checking
//!
//! # Example
//!
//! ```rust
//! use fcnet::{Classifier, FullyConnectedConfig, FullyConnectedNet, Tensor};
//!
//! let config = FullyConnectedConfig::new(vec![20, 10], 8, 3)
//!     .with_batchnorm(true)
//!     .with_reg(0.01)
//!     .with_init_seed(0);
//! let mut net = FullyConnectedNet::new(&config)?;
//!
//! let x = Tensor::linspace(-1.0, 1.0, vec![4, 8]);
//! let (loss, grads) = net.loss_and_grads(&x, &[0, 2, 1, 1])?;
//! assert!(loss > 0.0);
//! assert_eq!(grads.keys(), net.params().keys());
//!
//! let scores = net.scores(&x)?;
//! assert_eq!(scores.shape, vec![4, 3]);
//! # Ok::<(), fcnet::NetError>(())
//! ```

pub mod classifiers;
pub mod config;
pub mod error;
pub mod gradients;
pub mod layers;
pub mod params;
pub mod tensor;

// Re-export main types for convenience
pub use classifiers::{Classifier, FullyConnectedNet, LossOutput, TwoLayerNet};
pub use config::{FullyConnectedConfig, TwoLayerConfig};
pub use error::{NetError, Result};
pub use layers::Mode;
pub use params::{Gradients, ParamKey, ParamKind, ParamStore};
pub use tensor::{Dtype, Tensor};
