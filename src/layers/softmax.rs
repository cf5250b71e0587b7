//! Softmax Cross-Entropy Loss
//!
//! Turns raw class scores into a mean cross-entropy loss and the gradient of
//! that loss with respect to the scores.
//!
//! ## Formulas
//!
//! ```text
//! p[i, j]   = exp(s[i, j] - max_j s[i, :]) / Σ_k exp(s[i, k] - max_j s[i, :])
//! loss      = -(1/N) Σ_i log p[i, y_i]
//! grad[i,j] = (p[i, j] - 1{j == y_i}) / N
//! ```
//!
//! Subtracting the row maximum keeps `exp` from overflowing without changing
//! the result.

use crate::error::{NetError, Result};
use crate::tensor::Tensor;

/// Softmax cross-entropy loss
///
/// # Arguments
///
/// * `scores` - Raw (pre-softmax) scores `[N, C]`
/// * `labels` - One label per row, each in `[0, C)`
///
/// # Returns
///
/// `(loss, grad_scores)` where `grad_scores` has the shape of `scores`
pub fn softmax_loss(scores: &Tensor, labels: &[usize]) -> Result<(f64, Tensor)> {
    if scores.shape.len() != 2 {
        return Err(NetError::mismatch(
            "softmax loss",
            "[N, C] scores",
            format!("{:?}", scores.shape),
        ));
    }
    let n = scores.shape[0];
    let num_classes = scores.shape[1];
    if n == 0 {
        return Err(NetError::mismatch("softmax loss", "N > 0 rows", "empty batch"));
    }
    if labels.len() != n {
        return Err(NetError::mismatch(
            "softmax loss",
            format!("{} labels", n),
            format!("{} labels", labels.len()),
        ));
    }
    if let Some(index) = labels.iter().position(|&l| l >= num_classes) {
        return Err(NetError::InvalidLabel {
            index,
            label: labels[index],
            num_classes,
        });
    }

    let probs = scores.softmax_rows();
    let mut total_loss = 0.0;
    let mut grad = probs.data.clone();

    for (i, &label) in labels.iter().enumerate() {
        let row = i * num_classes;
        total_loss -= probs.data[row + label].max(f64::MIN_POSITIVE).ln();
        grad[row + label] -= 1.0;
    }

    let inv_n = 1.0 / n as f64;
    let grad = Tensor::new(grad, scores.shape.clone()).mul_scalar(inv_n);
    Ok((total_loss * inv_n, grad))
}
