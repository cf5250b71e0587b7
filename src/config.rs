//! Network Configuration
//!
//! Hyperparameters for the two classifiers. Both structs deserialize from
//! JSON with every field optional, so a file only needs to name what differs
//! from the defaults.
//!
//! ## Example
//!
//! ```rust
//! use fcnet::FullyConnectedConfig;
//!
//! let config = FullyConnectedConfig::from_json(
//!     r#"{ "hidden_dims": [100, 50], "use_batchnorm": true, "dropout": 0.25 }"#,
//! )?;
//! assert_eq!(config.num_layers(), 3);
//! assert_eq!(config.num_classes, 10);
//! # Ok::<(), fcnet::NetError>(())
//! ```

use crate::error::{NetError, Result};
use crate::tensor::Dtype;
use serde::{Deserialize, Serialize};

/// Configuration for [`TwoLayerNet`](crate::TwoLayerNet)
///
/// # Fields
///
/// - `input_dim`: Flattened size of one input sample
/// - `hidden_dim`: Width of the hidden layer
/// - `num_classes`: Number of output classes
/// - `weight_scale`: Standard deviation of the initial weights
/// - `reg`: L2 regularization strength
/// - `init_seed`: Seed for weight initialization (random if absent)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoLayerConfig {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub num_classes: usize,
    pub weight_scale: f64,
    pub reg: f64,
    pub init_seed: Option<u64>,
}

impl Default for TwoLayerConfig {
    fn default() -> Self {
        Self {
            input_dim: 3 * 32 * 32, // CIFAR-10 sized images
            hidden_dim: 100,
            num_classes: 10,
            weight_scale: 1e-3,
            reg: 0.0,
            init_seed: None,
        }
    }
}

impl TwoLayerConfig {
    pub fn new(input_dim: usize, hidden_dim: usize, num_classes: usize) -> Self {
        Self {
            input_dim,
            hidden_dim,
            num_classes,
            ..Self::default()
        }
    }

    pub fn with_weight_scale(mut self, weight_scale: f64) -> Self {
        self.weight_scale = weight_scale;
        self
    }

    pub fn with_reg(mut self, reg: f64) -> Self {
        self.reg = reg;
        self
    }

    pub fn with_init_seed(mut self, seed: u64) -> Self {
        self.init_seed = Some(seed);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check the configuration before any parameter is allocated
    pub fn validate(&self) -> Result<()> {
        check_dim("input_dim", self.input_dim)?;
        check_dim("hidden_dim", self.hidden_dim)?;
        check_dim("num_classes", self.num_classes)?;
        check_non_negative("weight_scale", self.weight_scale)?;
        check_non_negative("reg", self.reg)
    }
}

/// Configuration for [`FullyConnectedNet`](crate::FullyConnectedNet)
///
/// # Fields
///
/// - `hidden_dims`: Width of each hidden layer; empty gives a single affine layer
/// - `input_dim`: Flattened size of one input sample
/// - `num_classes`: Number of output classes
/// - `dropout`: Drop probability in `[0, 1)`; `0` disables dropout
/// - `use_batchnorm`: Insert batchnorm after every hidden affine layer
/// - `reg`: L2 regularization strength
/// - `weight_scale`: Standard deviation of the initial weights
/// - `dtype`: Precision of parameters and inputs
/// - `seed`: Fixed dropout seed, making dropout masks deterministic
/// - `init_seed`: Seed for weight initialization (random if absent)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FullyConnectedConfig {
    pub hidden_dims: Vec<usize>,
    pub input_dim: usize,
    pub num_classes: usize,
    pub dropout: f64,
    pub use_batchnorm: bool,
    pub reg: f64,
    pub weight_scale: f64,
    pub dtype: Dtype,
    pub seed: Option<u64>,
    pub init_seed: Option<u64>,
}

impl Default for FullyConnectedConfig {
    fn default() -> Self {
        Self {
            hidden_dims: Vec::new(),
            input_dim: 3 * 32 * 32,
            num_classes: 10,
            dropout: 0.0,
            use_batchnorm: false,
            reg: 0.0,
            weight_scale: 1e-2,
            dtype: Dtype::F32,
            seed: None,
            init_seed: None,
        }
    }
}

impl FullyConnectedConfig {
    pub fn new(hidden_dims: Vec<usize>, input_dim: usize, num_classes: usize) -> Self {
        Self {
            hidden_dims,
            input_dim,
            num_classes,
            ..Self::default()
        }
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_batchnorm(mut self, use_batchnorm: bool) -> Self {
        self.use_batchnorm = use_batchnorm;
        self
    }

    pub fn with_reg(mut self, reg: f64) -> Self {
        self.reg = reg;
        self
    }

    pub fn with_weight_scale(mut self, weight_scale: f64) -> Self {
        self.weight_scale = weight_scale;
        self
    }

    pub fn with_dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_init_seed(mut self, seed: u64) -> Self {
        self.init_seed = Some(seed);
        self
    }

    /// Number of affine layers, `1 + hidden_dims.len()`
    pub fn num_layers(&self) -> usize {
        1 + self.hidden_dims.len()
    }

    /// Full width sequence `[input_dim, hidden_dims..., num_classes]`
    pub fn dims(&self) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.hidden_dims.len() + 2);
        dims.push(self.input_dim);
        dims.extend_from_slice(&self.hidden_dims);
        dims.push(self.num_classes);
        dims
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the configuration before any parameter is allocated
    pub fn validate(&self) -> Result<()> {
        check_dim("input_dim", self.input_dim)?;
        check_dim("num_classes", self.num_classes)?;
        if let Some(i) = self.hidden_dims.iter().position(|&d| d == 0) {
            return Err(NetError::InvalidConfig(format!(
                "hidden_dims[{}] must be positive",
                i
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(NetError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        check_non_negative("weight_scale", self.weight_scale)?;
        check_non_negative("reg", self.reg)
    }
}

fn check_dim(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(NetError::InvalidConfig(format!("{} must be positive", name)));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(NetError::InvalidConfig(format!(
            "{} must be finite and non-negative, got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FullyConnectedConfig::default();
        assert_eq!(config.dtype, Dtype::F32);
        assert_eq!(config.weight_scale, 1e-2);
        assert_eq!(config.dropout, 0.0);
        assert!(!config.use_batchnorm);
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());

        let two = TwoLayerConfig::default();
        assert_eq!(two.weight_scale, 1e-3);
        assert!(two.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = FullyConnectedConfig::from_json(
            r#"{ "hidden_dims": [20, 30], "input_dim": 15, "dtype": "f64", "seed": 7 }"#,
        )
        .unwrap();
        assert_eq!(config.dims(), vec![15, 20, 30, 10]);
        assert_eq!(config.dtype, Dtype::F64);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.reg, 0.0);
    }

    #[test]
    fn test_json_round_trip() {
        let config = FullyConnectedConfig::new(vec![8, 4], 6, 3)
            .with_batchnorm(true)
            .with_dropout(0.25)
            .with_dtype(Dtype::F64)
            .with_seed(11);
        let json = config.to_json().unwrap();
        assert!(json.contains("\"dtype\": \"f64\""));
        assert_eq!(FullyConnectedConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_bad_json_is_reported() {
        assert!(matches!(
            FullyConnectedConfig::from_json("{ hidden_dims: }"),
            Err(NetError::Json(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = FullyConnectedConfig::new(vec![10, 10], 5, 3);
        assert!(base.validate().is_ok());
        assert!(base.clone().with_dropout(1.0).validate().is_err());
        assert!(base.clone().with_dropout(-0.5).validate().is_err());
        assert!(base.clone().with_reg(-1.0).validate().is_err());
        assert!(base.clone().with_weight_scale(f64::NAN).validate().is_err());
        assert!(FullyConnectedConfig::new(vec![10, 0], 5, 3).validate().is_err());
        assert!(FullyConnectedConfig::new(vec![], 0, 3).validate().is_err());
        assert!(FullyConnectedConfig::new(vec![], 5, 3).validate().is_ok());

        assert!(TwoLayerConfig::new(4, 0, 2).validate().is_err());
        assert!(TwoLayerConfig::new(4, 3, 2).with_weight_scale(0.0).validate().is_ok());
    }
}
