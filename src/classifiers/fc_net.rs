//! Fully Connected Network
//!
//! A classifier with an arbitrary number of hidden layers. With `L` affine
//! layers the architecture is
//!
//! ```text
//! {affine → [batchnorm] → ReLU → [dropout]} × (L - 1) → affine → softmax
//! ```
//!
//! where batchnorm and dropout are optional and apply to every hidden layer
//! when enabled. With no hidden layers the network is a single affine layer
//! followed by softmax loss.
//!
//! ## Mode
//!
//! Batchnorm and dropout behave differently at train and test time. Every
//! call first switches the dropout state and every batchnorm state to the
//! mode of that call (test when scoring, train when labels are given)
//! before any layer runs.
//!
//! ## Backward Pass
//!
//! Layers are undone from `L` down to `1`. Layer `L` is a plain affine
//! layer. Each hidden layer first undoes its dropout, then its
//! `affine → [batchnorm] → ReLU` chain. After every layer the L2 penalty
//! `0.5 * reg * Σ W_i²` is added to the loss and `reg * W_i` to `dW_i`.
//! Biases, gamma and beta are not regularized.

use super::{init_rng, Classifier};
use crate::config::FullyConnectedConfig;
use crate::error::{NetError, Result};
use crate::layers::{
    affine_bn_relu_backward, affine_bn_relu_forward, affine_relu_backward, affine_relu_forward,
    dropout_backward, dropout_forward, softmax_loss, Affine, AffineBnReluCache, AffineCache,
    AffineReluCache, BatchNorm, BatchNormState, DropoutCache, DropoutState, Mode,
};
use crate::params::{Gradients, LayerGradients, LayerParams, ParamStore};
use crate::tensor::{Dtype, Tensor};
use tracing::{debug, trace};

/// Cache of the activation chain of one hidden layer
#[derive(Clone, Debug)]
pub enum Hidden {
    /// affine → ReLU
    Plain(AffineReluCache),
    /// affine → batchnorm → ReLU
    Normalized(AffineBnReluCache),
}

/// Everything one hidden layer needs for its backward pass
#[derive(Clone, Debug)]
pub struct HiddenCache {
    pub relu: Hidden,
    /// Present only when dropout is enabled
    pub dropout: Option<DropoutCache>,
}

/// Fully connected classifier of configurable depth
#[derive(Clone, Debug)]
pub struct FullyConnectedNet {
    params: ParamStore,
    /// L2 regularization strength
    pub reg: f64,
    pub dtype: Dtype,
    /// One state per hidden layer when batchnorm is enabled, else empty
    bn_states: Vec<BatchNormState>,
    /// Shared by every hidden layer; `None` when dropout is disabled
    dropout: Option<DropoutState>,
}

impl FullyConnectedNet {
    /// Create a network from a validated configuration
    ///
    /// Weights are drawn from N(0, weight_scale²), biases and beta start at
    /// zero, gamma at one. All parameters are then rounded to the configured
    /// dtype.
    pub fn new(config: &FullyConnectedConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = init_rng(config.init_seed);
        let num_layers = config.num_layers();

        let layers = config
            .dims()
            .windows(2)
            .enumerate()
            .map(|(i, dims)| -> Result<LayerParams> {
                let affine = Affine::new(dims[0], dims[1], config.weight_scale, &mut rng)?;
                let is_hidden = i + 1 < num_layers;
                let norm = (config.use_batchnorm && is_hidden).then(|| BatchNorm::new(dims[1]));
                Ok(LayerParams { affine, norm })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut params = ParamStore::new(layers);
        params.cast_in_place(config.dtype);

        let bn_states = if config.use_batchnorm {
            (1..num_layers).map(|_| BatchNormState::new()).collect()
        } else {
            Vec::new()
        };

        let dropout = if config.dropout > 0.0 {
            Some(DropoutState::new(config.dropout, config.seed)?)
        } else {
            None
        };

        debug!(
            layers = num_layers,
            parameters = params.num_parameters(),
            batchnorm = config.use_batchnorm,
            dropout = config.dropout,
            dtype = ?config.dtype,
            "built fully connected network"
        );

        Ok(Self {
            params,
            reg: config.reg,
            dtype: config.dtype,
            bn_states,
            dropout,
        })
    }

    /// Number of affine layers
    pub fn num_layers(&self) -> usize {
        self.params.num_layers()
    }

    pub fn use_batchnorm(&self) -> bool {
        !self.bn_states.is_empty()
    }

    pub fn use_dropout(&self) -> bool {
        self.dropout.is_some()
    }

    /// Batchnorm state of each hidden layer (empty without batchnorm)
    pub fn bn_states(&self) -> &[BatchNormState] {
        &self.bn_states
    }

    pub fn dropout(&self) -> Option<&DropoutState> {
        self.dropout.as_ref()
    }

    /// Switch dropout and every batchnorm layer to `mode`
    pub fn set_mode(&mut self, mode: Mode) {
        if let Some(dropout) = &mut self.dropout {
            dropout.set_mode(mode);
        }
        for state in &mut self.bn_states {
            state.set_mode(mode);
        }
        debug!(?mode, "network mode");
    }

    fn forward(&mut self, x: &Tensor) -> Result<(Tensor, Vec<HiddenCache>, AffineCache)> {
        let layers = self.params.layers();
        let (output, hidden_layers) = layers
            .split_last()
            .ok_or_else(|| NetError::InvalidConfig("network has no layers".to_string()))?;

        let mut out = x.cast(self.dtype);
        let mut caches = Vec::with_capacity(hidden_layers.len());

        for (i, layer) in hidden_layers.iter().enumerate() {
            let (h, relu) = match (&layer.norm, self.bn_states.get_mut(i)) {
                (Some(norm), Some(state)) => {
                    let (h, cache) = affine_bn_relu_forward(&out, &layer.affine, norm, state)?;
                    (h, Hidden::Normalized(cache))
                }
                _ => {
                    let (h, cache) = affine_relu_forward(&out, &layer.affine)?;
                    (h, Hidden::Plain(cache))
                }
            };

            let (h, dropout) = match &self.dropout {
                Some(state) => {
                    let (h, cache) = dropout_forward(&h, state);
                    (h, Some(cache))
                }
                None => (h, None),
            };

            trace!(layer = i + 1, shape = ?h.shape, "hidden layer forward");
            caches.push(HiddenCache { relu, dropout });
            out = h;
        }

        let (scores, output_cache) = output.affine.forward(&out)?;
        trace!(layer = layers.len(), shape = ?scores.shape, "output layer forward");
        Ok((scores, caches, output_cache))
    }
}

impl Classifier for FullyConnectedNet {
    fn scores(&mut self, x: &Tensor) -> Result<Tensor> {
        self.set_mode(Mode::Test);
        let (scores, _, _) = self.forward(x)?;
        Ok(scores)
    }

    fn loss_and_grads(&mut self, x: &Tensor, y: &[usize]) -> Result<(f64, Gradients)> {
        self.set_mode(Mode::Train);
        let (scores, caches, output_cache) = self.forward(x)?;
        let (mut loss, grad_scores) = softmax_loss(&scores, y)?;

        let layers = self.params.layers();
        let (output, hidden_layers) = layers
            .split_last()
            .ok_or_else(|| NetError::InvalidConfig("network has no layers".to_string()))?;

        // Collected from the last layer down, reversed at the end
        let mut layer_grads = Vec::with_capacity(layers.len());

        let out_grads = output.affine.backward(&grad_scores, &output_cache);
        let mut dout = out_grads.x;
        layer_grads.push(LayerGradients {
            weight: out_grads.weight,
            bias: out_grads.bias,
            gamma: None,
            beta: None,
        });

        for (i, (layer, cache)) in hidden_layers.iter().zip(&caches).enumerate().rev() {
            let grad_h = match &cache.dropout {
                Some(dropout_cache) => dropout_backward(&dout, dropout_cache),
                None => dout,
            };

            let (dx, grads) = match &cache.relu {
                Hidden::Plain(relu_cache) => {
                    let g = affine_relu_backward(&grad_h, &layer.affine, relu_cache);
                    let grads = LayerGradients {
                        weight: g.weight,
                        bias: g.bias,
                        gamma: None,
                        beta: None,
                    };
                    (g.x, grads)
                }
                Hidden::Normalized(bn_cache) => {
                    let norm = layer.norm.as_ref().ok_or_else(|| {
                        NetError::InvalidConfig(format!("layer {} has no batchnorm", i + 1))
                    })?;
                    let g = affine_bn_relu_backward(&grad_h, &layer.affine, norm, bn_cache);
                    let grads = LayerGradients {
                        weight: g.weight,
                        bias: g.bias,
                        gamma: Some(g.gamma),
                        beta: Some(g.beta),
                    };
                    (g.x, grads)
                }
            };

            trace!(layer = i + 1, "hidden layer backward");
            layer_grads.push(grads);
            dout = dx;
        }

        layer_grads.reverse();

        for (layer, grads) in layers.iter().zip(&mut layer_grads) {
            let weight = &layer.affine.weight;
            loss += 0.5 * self.reg * weight.sum_squares();
            grads.weight.add_scaled_in_place(weight, self.reg);
        }

        Ok((
            loss,
            Gradients {
                layers: layer_grads,
            },
        ))
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }
}
