//! Two-Layer Network
//!
//! A fixed two-layer classifier:
//!
//! ```text
//! x [N, D] → affine(W1, b1) → ReLU → affine(W2, b2) → scores [N, C]
//! ```
//!
//! Training adds L2 regularization on both weight matrices (not biases):
//!
//! ```text
//! loss = softmax_loss(scores, y) + 0.5 * reg * (Σ W1² + Σ W2²)
//! dW_i += reg * W_i
//! ```

use super::{init_rng, Classifier};
use crate::config::TwoLayerConfig;
use crate::error::Result;
use crate::layers::{
    affine_relu_backward, affine_relu_forward, softmax_loss, Affine, AffineCache,
    AffineReluCache,
};
use crate::params::{Gradients, LayerGradients, LayerParams, ParamStore};
use crate::tensor::Tensor;
use tracing::{debug, trace};

/// Two-layer fully connected classifier
///
/// Parameters are `W1 [D, H]`, `b1 [H]`, `W2 [H, C]`, `b2 [C]`.
#[derive(Clone, Debug)]
pub struct TwoLayerNet {
    params: ParamStore,
    /// L2 regularization strength
    pub reg: f64,
}

impl TwoLayerNet {
    /// Create a network with weights drawn from N(0, weight_scale²) and zero
    /// biases
    pub fn new(config: &TwoLayerConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = init_rng(config.init_seed);

        let hidden = Affine::new(
            config.input_dim,
            config.hidden_dim,
            config.weight_scale,
            &mut rng,
        )?;
        let output = Affine::new(
            config.hidden_dim,
            config.num_classes,
            config.weight_scale,
            &mut rng,
        )?;

        let params = ParamStore::new(vec![
            LayerParams {
                affine: hidden,
                norm: None,
            },
            LayerParams {
                affine: output,
                norm: None,
            },
        ]);

        debug!(
            input_dim = config.input_dim,
            hidden_dim = config.hidden_dim,
            num_classes = config.num_classes,
            parameters = params.num_parameters(),
            "built two-layer network"
        );

        Ok(Self {
            params,
            reg: config.reg,
        })
    }

    fn hidden(&self) -> &Affine {
        &self.params.layers()[0].affine
    }

    fn output(&self) -> &Affine {
        &self.params.layers()[1].affine
    }

    fn forward(&self, x: &Tensor) -> Result<(Tensor, AffineReluCache, AffineCache)> {
        let (hidden, hidden_cache) = affine_relu_forward(x, self.hidden())?;
        let (scores, output_cache) = self.output().forward(&hidden)?;
        trace!(batch = scores.rows(), "two-layer forward");
        Ok((scores, hidden_cache, output_cache))
    }
}

impl Classifier for TwoLayerNet {
    fn scores(&mut self, x: &Tensor) -> Result<Tensor> {
        let (scores, _, _) = self.forward(x)?;
        Ok(scores)
    }

    fn loss_and_grads(&mut self, x: &Tensor, y: &[usize]) -> Result<(f64, Gradients)> {
        let (scores, hidden_cache, output_cache) = self.forward(x)?;
        let (data_loss, grad_scores) = softmax_loss(&scores, y)?;

        let output_grads = self.output().backward(&grad_scores, &output_cache);
        let hidden_grads = affine_relu_backward(&output_grads.x, self.hidden(), &hidden_cache);

        let w1 = &self.hidden().weight;
        let w2 = &self.output().weight;
        let loss = data_loss + 0.5 * self.reg * (w1.sum_squares() + w2.sum_squares());

        let mut dw1 = hidden_grads.weight;
        dw1.add_scaled_in_place(w1, self.reg);
        let mut dw2 = output_grads.weight;
        dw2.add_scaled_in_place(w2, self.reg);

        let grads = Gradients {
            layers: vec![
                LayerGradients {
                    weight: dw1,
                    bias: hidden_grads.bias,
                    gamma: None,
                    beta: None,
                },
                LayerGradients {
                    weight: dw2,
                    bias: output_grads.bias,
                    gamma: None,
                    beta: None,
                },
            ],
        };
        Ok((loss, grads))
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::LossOutput;
    use crate::error::NetError;
    use crate::gradients::check_model_gradients;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn batch(n: usize, d: usize, seed: u64) -> Tensor {
        Tensor::randn(vec![n, d], 1.0, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn test_zero_weights_give_uniform_loss() {
        let config = TwoLayerConfig::new(4, 3, 2).with_weight_scale(0.0);
        let mut net = TwoLayerNet::new(&config).unwrap();
        let x = batch(5, 4, 0);

        match net.loss(&x, None).unwrap() {
            LossOutput::Scores(scores) => {
                assert_eq!(scores.shape, vec![5, 2]);
                assert!(scores.data.iter().all(|&s| s == 0.0));
            }
            other => panic!("expected scores, got {:?}", other),
        }

        let (loss, _) = net.loss_and_grads(&x, &[0, 1, 1, 0, 1]).unwrap();
        assert_abs_diff_eq!(loss, (2.0f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_gradient_keys_match_params() {
        let mut net = TwoLayerNet::new(&TwoLayerConfig::new(6, 5, 3).with_init_seed(1)).unwrap();
        let (_, grads) = net.loss_and_grads(&batch(4, 6, 2), &[0, 1, 2, 0]).unwrap();

        let names: Vec<String> = net.params().keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["W1", "b1", "W2", "b2"]);
        assert_eq!(grads.keys(), net.params().keys());
        for (key, grad) in grads.iter() {
            assert_eq!(grad.shape, net.params().get(key).unwrap().shape);
        }
    }

    #[test]
    fn test_accepts_multidimensional_samples() {
        let mut net = TwoLayerNet::new(&TwoLayerConfig::new(12, 4, 3).with_init_seed(5)).unwrap();
        let x = Tensor::randn(vec![2, 3, 4], 1.0, &mut StdRng::seed_from_u64(6)).unwrap();
        assert_eq!(net.scores(&x).unwrap().shape, vec![2, 3]);
        assert_eq!(net.predict(&x).unwrap().len(), 2);
    }

    #[test]
    fn test_gradients_match_numerical_gradients() {
        let x = batch(3, 5, 7);
        let y = [0, 2, 1];
        for reg in [0.0, 0.7] {
            let config = TwoLayerConfig::new(5, 6, 3)
                .with_weight_scale(0.3)
                .with_reg(reg)
                .with_init_seed(11);
            let mut net = TwoLayerNet::new(&config).unwrap();

            for (key, error) in check_model_gradients(&mut net, &x, &y, 1e-5).unwrap() {
                assert!(error < 1e-5, "{} relative error {} with reg {}", key, error, reg);
            }
        }
    }

    #[test]
    fn test_regularization_adds_weight_penalty() {
        let x = batch(4, 5, 3);
        let y = [1, 0, 2, 2];
        let config = TwoLayerConfig::new(5, 4, 3)
            .with_weight_scale(0.5)
            .with_init_seed(9);
        let reg = 0.3;

        let mut plain = TwoLayerNet::new(&config).unwrap();
        let mut regularized = TwoLayerNet::new(&config.clone().with_reg(reg)).unwrap();

        let (loss0, grads0) = plain.loss_and_grads(&x, &y).unwrap();
        let (loss1, grads1) = regularized.loss_and_grads(&x, &y).unwrap();

        let params = plain.params();
        let penalty: f64 = [params.by_name("W1").unwrap(), params.by_name("W2").unwrap()]
            .iter()
            .map(|w| w.sum_squares())
            .sum();
        assert_abs_diff_eq!(loss1 - loss0, 0.5 * reg * penalty, epsilon = 1e-12);

        for name in ["W1", "W2"] {
            let expected = grads0
                .by_name(name)
                .unwrap()
                .add(&params.by_name(name).unwrap().mul_scalar(reg));
            assert!(crate::gradients::rel_error(grads1.by_name(name).unwrap(), &expected) < 1e-12);
        }
        for name in ["b1", "b2"] {
            assert_eq!(grads0.by_name(name).unwrap(), grads1.by_name(name).unwrap());
        }
    }

    #[test]
    fn test_loss_does_not_modify_params() {
        let mut net = TwoLayerNet::new(&TwoLayerConfig::new(5, 4, 3).with_init_seed(2)).unwrap();
        let before = net.params().clone();
        net.loss_and_grads(&batch(2, 5, 1), &[0, 1]).unwrap();
        for (key, tensor) in before.iter() {
            assert_eq!(net.params().get(key).unwrap(), tensor);
        }
    }

    #[test]
    fn test_shape_and_label_errors() {
        let mut net = TwoLayerNet::new(&TwoLayerConfig::new(5, 4, 3).with_init_seed(2)).unwrap();
        assert!(matches!(
            net.scores(&batch(2, 6, 0)),
            Err(NetError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            net.loss_and_grads(&batch(2, 5, 0), &[0, 3]),
            Err(NetError::InvalidLabel { label: 3, .. })
        ));
        assert!(matches!(
            net.loss_and_grads(&Tensor::zeros(vec![0, 5]), &[]),
            Err(NetError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            TwoLayerNet::new(&TwoLayerConfig::new(5, 0, 3)),
            Err(NetError::InvalidConfig(_))
        ));
    }
}
