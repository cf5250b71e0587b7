//! Dropout Layer
//!
//! Dropout is a regularization technique that randomly zeros out activations
//! during training to prevent overfitting. This is inverted dropout: kept
//! values are scaled by `1 / (1 - p)` at train time so nothing needs to
//! change at test time, where the layer is the identity.

use super::Mode;
use crate::error::{NetError, Result};
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Dropout configuration and mode, shared by every dropout layer of a network
#[derive(Clone, Debug)]
pub struct DropoutState {
    pub mode: Mode,
    /// Probability of dropping each activation
    pub p: f64,
    /// Fixed seed; when set every forward call draws the same mask
    pub seed: Option<u64>,
}

impl DropoutState {
    /// Create a dropout state in train mode
    ///
    /// # Arguments
    ///
    /// * `p` - Drop probability, must lie in `[0, 1)`
    /// * `seed` - Optional seed making the mask deterministic
    pub fn new(p: f64, seed: Option<u64>) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(NetError::InvalidConfig(format!(
                "dropout probability must be in [0, 1), got {}",
                p
            )));
        }
        Ok(Self {
            mode: Mode::Train,
            p,
            seed,
        })
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }
}

/// Forward pass with caching for backward
///
/// Returns the output and a cache holding the keep mask. The mask is `None`
/// when nothing was dropped (test mode or `p == 0`).
pub fn dropout_forward(x: &Tensor, state: &DropoutState) -> (Tensor, DropoutCache) {
    if state.mode == Mode::Test || state.p == 0.0 {
        let cache = DropoutCache {
            mask: None,
            scale: 1.0,
        };
        return (x.clone(), cache);
    }

    let scale = 1.0 / (1.0 - state.p);
    let mask: Vec<bool> = match state.seed {
        Some(seed) => draw_mask(&mut StdRng::seed_from_u64(seed), x.len(), state.p),
        None => draw_mask(&mut rand::rng(), x.len(), state.p),
    };

    let data = x
        .data
        .iter()
        .zip(&mask)
        .map(|(&v, &keep)| if keep { v * scale } else { 0.0 })
        .collect();

    let cache = DropoutCache {
        mask: Some(mask),
        scale,
    };
    (Tensor::new(data, x.shape.clone()), cache)
}

fn draw_mask<R: Rng + ?Sized>(rng: &mut R, len: usize, p: f64) -> Vec<bool> {
    (0..len).map(|_| rng.random::<f64>() >= p).collect()
}

/// Backward pass through dropout
///
/// Applies the cached mask and scale to the upstream gradient; without a
/// mask the gradient passes through unchanged.
pub fn dropout_backward(grad_output: &Tensor, cache: &DropoutCache) -> Tensor {
    match &cache.mask {
        Some(mask) => {
            assert_eq!(
                mask.len(),
                grad_output.len(),
                "dropout backward: gradient size must match cached mask"
            );
            let data = grad_output
                .data
                .iter()
                .zip(mask)
                .map(|(&g, &keep)| if keep { g * cache.scale } else { 0.0 })
                .collect();
            Tensor::new(data, grad_output.shape.clone())
        }
        None => grad_output.clone(),
    }
}

/// Cache for dropout backward pass
#[derive(Clone, Debug)]
pub struct DropoutCache {
    /// Dropout mask (true = kept, false = dropped)
    /// None if dropout was disabled
    pub mask: Option<Vec<bool>>,
    /// Scaling factor applied to kept values
    pub scale: f64,
}
