//! Parameter Store and Gradients
//!
//! Parameters live in a fixed vector of per-layer structs built once at
//! construction. String names (`W1`, `b1`, `gamma1`, `beta1`, ...) are only
//! used at the boundary, for an external solver that addresses parameters by
//! name.
//!
//! ## Naming
//!
//! Layer indices are 1-based:
//!
//! ```text
//! W{i}, b{i}          affine weight and bias of layer i
//! gamma{i}, beta{i}   batchnorm scale and shift of layer i (hidden layers only)
//! ```
//!
//! [`Gradients`] mirrors [`ParamStore`] exactly, so both expose the same key
//! set.

use crate::error::{NetError, Result};
use crate::layers::{Affine, BatchNorm};
use crate::tensor::{Dtype, Tensor};
use std::fmt;
use std::str::FromStr;

/// Which tensor of a layer a key refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamKind {
    Weight,
    Bias,
    Gamma,
    Beta,
}

impl ParamKind {
    fn prefix(self) -> &'static str {
        match self {
            ParamKind::Weight => "W",
            ParamKind::Bias => "b",
            ParamKind::Gamma => "gamma",
            ParamKind::Beta => "beta",
        }
    }
}

const ALL_KINDS: &[ParamKind] = &[
    ParamKind::Weight,
    ParamKind::Bias,
    ParamKind::Gamma,
    ParamKind::Beta,
];

/// Name of a single parameter tensor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamKey {
    /// 1-based layer index
    pub layer: usize,
    pub kind: ParamKind,
}

impl ParamKey {
    pub fn new(kind: ParamKind, layer: usize) -> Self {
        Self { layer, kind }
    }

    pub fn weight(layer: usize) -> Self {
        Self::new(ParamKind::Weight, layer)
    }

    pub fn bias(layer: usize) -> Self {
        Self::new(ParamKind::Bias, layer)
    }

    pub fn gamma(layer: usize) -> Self {
        Self::new(ParamKind::Gamma, layer)
    }

    pub fn beta(layer: usize) -> Self {
        Self::new(ParamKind::Beta, layer)
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.layer)
    }
}

impl FromStr for ParamKey {
    type Err = NetError;

    fn from_str(name: &str) -> Result<Self> {
        // "beta" must be tried before "b"
        let kinds = [
            ParamKind::Gamma,
            ParamKind::Beta,
            ParamKind::Weight,
            ParamKind::Bias,
        ];
        for kind in kinds {
            if let Some(index) = name.strip_prefix(kind.prefix()) {
                if let Ok(layer) = index.parse::<usize>() {
                    if layer >= 1 && !index.starts_with('+') {
                        return Ok(ParamKey::new(kind, layer));
                    }
                }
            }
        }
        Err(NetError::UnknownParameter(name.to_string()))
    }
}

/// Parameters of one layer: an affine transform plus optional batchnorm
#[derive(Clone, Debug)]
pub struct LayerParams {
    pub affine: Affine,
    pub norm: Option<BatchNorm>,
}

impl LayerParams {
    fn tensor(&self, kind: ParamKind) -> Option<&Tensor> {
        match kind {
            ParamKind::Weight => Some(&self.affine.weight),
            ParamKind::Bias => Some(&self.affine.bias),
            ParamKind::Gamma => self.norm.as_ref().map(|n| &n.gamma),
            ParamKind::Beta => self.norm.as_ref().map(|n| &n.beta),
        }
    }

    fn tensor_mut(&mut self, kind: ParamKind) -> Option<&mut Tensor> {
        match kind {
            ParamKind::Weight => Some(&mut self.affine.weight),
            ParamKind::Bias => Some(&mut self.affine.bias),
            ParamKind::Gamma => self.norm.as_mut().map(|n| &mut n.gamma),
            ParamKind::Beta => self.norm.as_mut().map(|n| &mut n.beta),
        }
    }

    fn kinds(&self) -> &'static [ParamKind] {
        if self.norm.is_some() {
            ALL_KINDS
        } else {
            &ALL_KINDS[..2]
        }
    }
}

/// All learnable parameters of a network, one entry per layer
#[derive(Clone, Debug)]
pub struct ParamStore {
    layers: Vec<LayerParams>,
}

impl ParamStore {
    pub fn new(layers: Vec<LayerParams>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[LayerParams] {
        &self.layers
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Parameter keys in layer order (`W1, b1, gamma1, beta1, W2, ...`)
    pub fn keys(&self) -> Vec<ParamKey> {
        self.iter().map(|(key, _)| key).collect()
    }

    pub fn get(&self, key: ParamKey) -> Option<&Tensor> {
        self.layers.get(key.layer.checked_sub(1)?)?.tensor(key.kind)
    }

    pub fn get_mut(&mut self, key: ParamKey) -> Option<&mut Tensor> {
        self.layers
            .get_mut(key.layer.checked_sub(1)?)?
            .tensor_mut(key.kind)
    }

    /// Look up a parameter by its string name, e.g. `"W2"`
    pub fn by_name(&self, name: &str) -> Result<&Tensor> {
        let key: ParamKey = name.parse()?;
        self.get(key)
            .ok_or_else(|| NetError::UnknownParameter(name.to_string()))
    }

    /// Mutable lookup by string name, for solvers that update in place
    pub fn by_name_mut(&mut self, name: &str) -> Result<&mut Tensor> {
        let key: ParamKey = name.parse()?;
        self.get_mut(key)
            .ok_or_else(|| NetError::UnknownParameter(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamKey, &Tensor)> + '_ {
        self.layers.iter().enumerate().flat_map(|(i, layer)| {
            layer.kinds().iter().filter_map(move |&kind| {
                layer
                    .tensor(kind)
                    .map(|tensor| (ParamKey::new(kind, i + 1), tensor))
            })
        })
    }

    /// Total number of scalar parameters
    pub fn num_parameters(&self) -> usize {
        self.iter().map(|(_, t)| t.len()).sum()
    }

    /// Round every parameter to `dtype`
    pub fn cast_in_place(&mut self, dtype: Dtype) {
        for layer in &mut self.layers {
            layer.affine.cast_in_place(dtype);
            if let Some(norm) = &mut layer.norm {
                norm.cast_in_place(dtype);
            }
        }
    }
}

/// Gradients of one layer, shaped like its [`LayerParams`]
#[derive(Clone, Debug)]
pub struct LayerGradients {
    pub weight: Tensor,
    pub bias: Tensor,
    pub gamma: Option<Tensor>,
    pub beta: Option<Tensor>,
}

impl LayerGradients {
    fn tensor(&self, kind: ParamKind) -> Option<&Tensor> {
        match kind {
            ParamKind::Weight => Some(&self.weight),
            ParamKind::Bias => Some(&self.bias),
            ParamKind::Gamma => self.gamma.as_ref(),
            ParamKind::Beta => self.beta.as_ref(),
        }
    }
}

/// Gradient of the loss with respect to every parameter
///
/// Built fresh by each training-mode `loss` call.
#[derive(Clone, Debug)]
pub struct Gradients {
    pub layers: Vec<LayerGradients>,
}

impl Gradients {
    pub fn get(&self, key: ParamKey) -> Option<&Tensor> {
        self.layers.get(key.layer.checked_sub(1)?)?.tensor(key.kind)
    }

    pub fn by_name(&self, name: &str) -> Result<&Tensor> {
        let key: ParamKey = name.parse()?;
        self.get(key)
            .ok_or_else(|| NetError::UnknownParameter(name.to_string()))
    }

    pub fn keys(&self) -> Vec<ParamKey> {
        self.iter().map(|(key, _)| key).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamKey, &Tensor)> + '_ {
        self.layers.iter().enumerate().flat_map(|(i, layer)| {
            ALL_KINDS.iter().filter_map(move |&kind| {
                layer
                    .tensor(kind)
                    .map(|tensor| (ParamKey::new(kind, i + 1), tensor))
            })
        })
    }
}
