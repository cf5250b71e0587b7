//! Tensor Operations for Neural Networks
//!
//! This module provides the small array library the layers are written
//! against. Tensors store a flat row-major buffer with shape and stride
//! information.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f64>` storing all elements in row-major order
//! - **Shape**: Dimensions of the tensor (e.g., `[batch, features]`)
//! - **Strides**: Step sizes for each dimension to compute flat indices
//! - **Dtype**: The precision values are rounded to (see [`Dtype`])
//!
//! ## Example
//!
//! ```rust
//! use fcnet::Tensor;
//!
//! // Create a 2x3 matrix
//! let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
//! let tensor = Tensor::new(data, vec![2, 3]);
//!
//! // Matrix multiplication
//! let other = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]);
//! let result = tensor.matmul(&other);
//! assert_eq!(result.shape, vec![2, 2]);
//! ```
//!
//! ## Performance
//!
//! Matrix multiplication, element-wise operations and column reductions use
//! Rayon. Small matrices fall back to a sequential loop to avoid the
//! scheduling overhead.

use crate::error::{NetError, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Numeric precision of parameters and inputs
///
/// Storage is always `f64`. Casting to [`Dtype::F32`] rounds every element
/// through `f32`, so parameters and inputs carry single precision. Only those
/// stored values are rounded: every intermediate (matmul, batchnorm
/// statistics, softmax, gradients) is computed and kept in `f64`, so results
/// will differ from a true `f32` computation. Use `F64` for numeric gradient
/// checking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    #[default]
    F32,
    F64,
}

impl Dtype {
    /// Round a single value to this precision
    #[inline]
    pub fn round(self, value: f64) -> f64 {
        match self {
            Dtype::F32 => value as f32 as f64,
            Dtype::F64 => value,
        }
    }
}

/// A multi-dimensional array for neural network computations
///
/// For shape `[2, 3]`, data is stored as:
/// `[row0_col0, row0_col1, row0_col2, row1_col0, row1_col1, row1_col2]`
/// and strides are `[3, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f64>,
    /// Shape of the tensor (dimensions)
    pub shape: Vec<usize>,
    /// Strides for each dimension (computed from shape)
    pub strides: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor with given data and shape
    ///
    /// # Panics
    ///
    /// Panics if the product of shape dimensions doesn't equal data length
    ///
    /// # Example
    ///
    /// ```rust
    /// # use fcnet::Tensor;
    /// let tensor = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// assert_eq!(tensor.shape, vec![2, 2]);
    /// ```
    pub fn new(data: Vec<f64>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );

        let strides = Self::compute_strides(&shape);
        Self {
            data,
            shape,
            strides,
        }
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::filled(shape, 0.0)
    }

    /// Create a tensor with every element set to `value`
    pub fn filled(shape: Vec<usize>, value: f64) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![value; size], shape)
    }

    /// Sample a tensor from a zero-mean Gaussian with standard deviation `std`
    ///
    /// Fails if `std` is negative or not finite.
    pub fn randn<R: Rng + ?Sized>(shape: Vec<usize>, std: f64, rng: &mut R) -> Result<Self> {
        let normal = Normal::new(0.0, std).map_err(|e| {
            NetError::InvalidConfig(format!("cannot sample N(0, {}): {}", std, e))
        })?;
        let size: usize = shape.iter().product();
        let data = (0..size).map(|_| normal.sample(&mut *rng)).collect();
        Ok(Self::new(data, shape))
    }

    /// Compute strides from shape (row-major layout)
    ///
    /// For shape `[d0, d1, d2]`, strides are `[d1*d2, d2, 1]`
    fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the tensor holds no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the leading (batch) dimension
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of features per sample, i.e. product of all trailing dimensions
    pub fn row_width(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Flatten an `(N, d1, ..., dk)` batch into `(N, d1 * ... * dk)`
    ///
    /// ```rust
    /// # use fcnet::Tensor;
    /// let x = Tensor::zeros(vec![2, 3, 4]);
    /// assert_eq!(x.flatten_batch().shape, vec![2, 12]);
    /// ```
    pub fn flatten_batch(&self) -> Tensor {
        self.reshape(&[self.rows(), self.row_width()])
    }

    /// Reshape tensor to new shape
    ///
    /// Total number of elements must remain the same.
    pub fn reshape(&self, new_shape: &[usize]) -> Tensor {
        let new_size: usize = new_shape.iter().product();
        assert_eq!(
            self.data.len(),
            new_size,
            "Cannot reshape {:?} to {:?}: element count mismatch",
            self.shape,
            new_shape
        );
        Tensor::new(self.data.clone(), new_shape.to_vec())
    }

    /// Round every element to `dtype`, returning a copy
    pub fn cast(&self, dtype: Dtype) -> Tensor {
        let mut out = self.clone();
        out.cast_in_place(dtype);
        out
    }

    /// Round every element to `dtype` in place
    pub fn cast_in_place(&mut self, dtype: Dtype) {
        if dtype == Dtype::F64 {
            return;
        }
        self.data.par_iter_mut().for_each(|x| *x = dtype.round(*x));
    }

    /// SIMD-friendly inner loop: `result[j] += a_val * b[j]`
    #[inline(always)]
    fn matmul_inner_simd(a_val: f64, b: &[f64], result: &mut [f64]) {
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r += a_val * b_val;
        }
    }

    /// 2D matrix multiplication
    ///
    /// For `A @ B` where `A` is `[m, k]` and `B` is `[k, n]` the result is
    /// `[m, n]`. Matrices with at least 1K multiply-adds use the parallel
    /// cache-blocked kernel.
    ///
    /// # Panics
    ///
    /// Panics if either operand is not 2D or the inner dimensions differ
    ///
    /// # Example
    ///
    /// ```rust
    /// # use fcnet::Tensor;
    /// let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// let b = Tensor::new(vec![1.0, 0.0, 0.0, 1.0], vec![2, 2]);
    /// assert_eq!(a.matmul(&b).data, a.data);
    /// ```
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert!(
            self.shape.len() == 2 && other.shape.len() == 2,
            "Unsupported matmul shapes: {:?} @ {:?}",
            self.shape,
            other.shape
        );
        assert_eq!(
            self.shape[1], other.shape[0],
            "Matrix dimensions incompatible: [{}, {}] @ [{}, {}]",
            self.shape[0], self.shape[1], other.shape[0], other.shape[1]
        );

        let m = self.shape[0];
        let n = other.shape[1];
        let k = self.shape[1];

        if m * n * k >= 1_000 {
            return self.matmul_parallel_blocked(other, m, n, k);
        }

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0;
                for l in 0..k {
                    sum += self.data[i * k + l] * other.data[l * n + j];
                }
                result[i * n + j] = sum;
            }
        }

        Tensor::new(result, vec![m, n])
    }

    /// Parallel cache-blocked matrix multiplication
    ///
    /// Output rows are split into blocks of `BLOCK_SIZE` and handed to Rayon;
    /// inside a block the column and inner dimensions are tiled so the
    /// innermost loop walks memory sequentially.
    fn matmul_parallel_blocked(&self, other: &Tensor, m: usize, n: usize, k: usize) -> Tensor {
        const BLOCK_SIZE: usize = 8;

        let mut result = vec![0.0; m * n];
        if n == 0 {
            return Tensor::new(result, vec![m, n]);
        }

        result
            .par_chunks_mut(BLOCK_SIZE * n)
            .enumerate()
            .for_each(|(block_i, result_block)| {
                let i_start = block_i * BLOCK_SIZE;
                let i_end = (i_start + BLOCK_SIZE).min(m);

                for j_start in (0..n).step_by(BLOCK_SIZE) {
                    let j_end = (j_start + BLOCK_SIZE).min(n);

                    for k_start in (0..k).step_by(BLOCK_SIZE) {
                        let k_end = (k_start + BLOCK_SIZE).min(k);

                        for i in i_start..i_end {
                            let row_offset = (i - i_start) * n;
                            for k_idx in k_start..k_end {
                                let a_val = self.data[i * k + k_idx];
                                Self::matmul_inner_simd(
                                    a_val,
                                    &other.data[k_idx * n + j_start..k_idx * n + j_end],
                                    &mut result_block[row_offset + j_start..row_offset + j_end],
                                );
                            }
                        }
                    }
                }
            });

        Tensor::new(result, vec![m, n])
    }

    /// Transpose a 2D matrix
    pub fn transpose(&self) -> Tensor {
        assert_eq!(
            self.shape.len(),
            2,
            "transpose expects a 2D tensor, got {:?}",
            self.shape
        );
        let rows = self.shape[0];
        let cols = self.shape[1];
        let mut result = vec![0.0; rows * cols];

        for i in 0..rows {
            for j in 0..cols {
                result[j * rows + i] = self.data[i * cols + j];
            }
        }

        Tensor::new(result, vec![cols, rows])
    }

    /// Row-wise softmax of a 2D tensor
    ///
    /// Uses the numerically stable version:
    ///
    /// ```text
    /// softmax(x)[i] = exp(x[i] - max(x)) / sum(exp(x[j] - max(x)))
    /// ```
    pub fn softmax_rows(&self) -> Tensor {
        assert_eq!(
            self.shape.len(),
            2,
            "softmax_rows expects a 2D tensor, got {:?}",
            self.shape
        );
        let cols = self.shape[1];
        let mut result = Vec::with_capacity(self.data.len());
        for row in self.data.chunks(cols.max(1)) {
            // Find max for numerical stability
            let max = row.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let exp_values: Vec<f64> = row.iter().map(|&x| (x - max).exp()).collect();
            let sum: f64 = exp_values.iter().sum();
            result.extend(exp_values.into_iter().map(|v| v / sum));
        }
        Tensor::new(result, self.shape.clone())
    }

    /// Element-wise addition with broadcasting
    ///
    /// Supports an exact shape match and `[*, n] + [n]` (adding a bias row).
    ///
    /// ```rust
    /// # use fcnet::Tensor;
    /// let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// let b = Tensor::new(vec![10.0, 20.0], vec![2]);
    /// assert_eq!(a.add(&b).data, vec![11.0, 22.0, 13.0, 24.0]);
    /// ```
    pub fn add(&self, other: &Tensor) -> Tensor {
        self.broadcast_zip(other, "add", |a, b| a + b)
    }

    /// Element-wise multiplication with broadcasting
    ///
    /// See `add()` for broadcasting patterns.
    pub fn mul(&self, other: &Tensor) -> Tensor {
        self.broadcast_zip(other, "mul", |a, b| a * b)
    }

    /// Element-wise subtraction with broadcasting
    pub fn sub(&self, other: &Tensor) -> Tensor {
        self.broadcast_zip(other, "sub", |a, b| a - b)
    }

    /// Element-wise division with broadcasting
    pub fn div(&self, other: &Tensor) -> Tensor {
        self.broadcast_zip(other, "div", |a, b| a / b)
    }

    fn broadcast_zip<F>(&self, other: &Tensor, op: &str, f: F) -> Tensor
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        // === EXACT MATCH: Same shape ===
        if self.shape == other.shape {
            let result = self
                .data
                .par_iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect();
            return Tensor::new(result, self.shape.clone());
        }

        // === BROADCAST LAST DIM: [*, n] op [n] ===
        if other.shape.len() == 1 && self.shape.last() == other.shape.first() {
            let last_dim = other.data.len();
            let result: Vec<f64> = (0..self.data.len())
                .into_par_iter()
                .map(|i| f(self.data[i], other.data[i % last_dim]))
                .collect();
            return Tensor::new(result, self.shape.clone());
        }

        panic!(
            "Unsupported broadcast for {}: {:?} and {:?}",
            op, self.shape, other.shape
        );
    }

    /// Apply `f` to every element
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f64) -> f64 + Sync + Send,
    {
        let result = self.data.par_iter().map(|&x| f(x)).collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Add scalar to all elements
    pub fn add_scalar(&self, scalar: f64) -> Tensor {
        self.map(|x| x + scalar)
    }

    /// Multiply all elements by scalar
    pub fn mul_scalar(&self, scalar: f64) -> Tensor {
        self.map(|x| x * scalar)
    }

    /// Element-wise square root
    pub fn sqrt(&self) -> Tensor {
        self.map(f64::sqrt)
    }

    /// In-place `self += other * scale`, shapes must match
    pub fn add_scaled_in_place(&mut self, other: &Tensor, scale: f64) {
        assert_eq!(
            self.shape, other.shape,
            "Shapes must match for scaled accumulation"
        );
        self.data
            .par_iter_mut()
            .zip(&other.data)
            .for_each(|(a, &b)| *a += scale * b);
    }

    /// Sum over the batch axis of a 2D tensor: `[N, D] -> [D]`
    ///
    /// ```rust
    /// # use fcnet::Tensor;
    /// let x = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// assert_eq!(x.sum_axis0().data, vec![4.0, 6.0]);
    /// ```
    pub fn sum_axis0(&self) -> Tensor {
        assert_eq!(
            self.shape.len(),
            2,
            "sum_axis0 expects a 2D tensor, got {:?}",
            self.shape
        );
        let rows = self.shape[0];
        let cols = self.shape[1];
        let result: Vec<f64> = (0..cols)
            .into_par_iter()
            .map(|j| (0..rows).map(|i| self.data[i * cols + j]).sum())
            .collect();
        Tensor::new(result, vec![cols])
    }

    /// Mean over the batch axis of a 2D tensor: `[N, D] -> [D]`
    pub fn mean_axis0(&self) -> Tensor {
        let rows = self.rows() as f64;
        self.sum_axis0().mul_scalar(1.0 / rows)
    }

    /// Biased (population) variance over the batch axis: `[N, D] -> [D]`
    pub fn var_axis0(&self) -> Tensor {
        let mean = self.mean_axis0();
        self.sub(&mean).map(|x| x * x).mean_axis0()
    }

    /// Sum of all elements
    pub fn sum(&self) -> f64 {
        self.data.par_iter().sum()
    }

    /// Sum of squared elements (squared Frobenius norm)
    pub fn sum_squares(&self) -> f64 {
        self.data.par_iter().map(|&x| x * x).sum()
    }

    /// Index of the largest element in each row of a 2D tensor
    pub fn argmax_rows(&self) -> Vec<usize> {
        assert_eq!(
            self.shape.len(),
            2,
            "argmax_rows expects a 2D tensor, got {:?}",
            self.shape
        );
        let cols = self.shape[1];
        self.data
            .chunks(cols.max(1))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (j, &v)| {
                        if v > best.1 {
                            (j, v)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }

    /// Create a tensor of evenly spaced values over `[start, stop]`
    ///
    /// ```rust
    /// # use fcnet::Tensor;
    /// let t = Tensor::linspace(-1.0, 1.0, vec![5]);
    /// assert_eq!(t.data, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
    /// ```
    pub fn linspace(start: f64, stop: f64, shape: Vec<usize>) -> Tensor {
        let size: usize = shape.iter().product();
        let step = if size > 1 {
            (stop - start) / (size - 1) as f64
        } else {
            0.0
        };
        let data = (0..size).map(|i| start + step * i as f64).collect();
        Tensor::new(data, shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_strides_row_major() {
        let t = Tensor::zeros(vec![2, 3, 4]);
        assert_eq!(t.strides, vec![12, 4, 1]);
    }

    #[test]
    fn test_matmul_small_and_blocked_agree() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Tensor::randn(vec![17, 11], 1.0, &mut rng).unwrap();
        let b = Tensor::randn(vec![11, 9], 1.0, &mut rng).unwrap();

        let blocked = a.matmul(&b);
        assert_eq!(blocked.shape, vec![17, 9]);

        for i in 0..17 {
            for j in 0..9 {
                let expected: f64 = (0..11).map(|l| a.data[i * 11 + l] * b.data[l * 9 + j]).sum();
                assert_abs_diff_eq!(blocked.data[i * 9 + j], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_transpose() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        let tt = t.transpose();
        assert_eq!(tt.shape, vec![3, 2]);
        assert_eq!(tt.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_flatten_batch_keeps_data() {
        let t = Tensor::linspace(0.0, 23.0, vec![2, 3, 4]);
        let flat = t.flatten_batch();
        assert_eq!(flat.shape, vec![2, 12]);
        assert_eq!(flat.data, t.data);
    }

    #[test]
    fn test_column_statistics() {
        let t = Tensor::new(vec![1.0, 10.0, 3.0, 20.0, 5.0, 30.0], vec![3, 2]);
        let mean = t.mean_axis0();
        assert_abs_diff_eq!(mean.data[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mean.data[1], 20.0, epsilon = 1e-12);
        let var = t.var_axis0();
        assert_abs_diff_eq!(var.data[0], 8.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(var.data[1], 200.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cast_to_f32_rounds() {
        let t = Tensor::new(vec![0.1, 1.0 / 3.0], vec![2]);
        let cast = t.cast(Dtype::F32);
        assert_eq!(cast.data[0], 0.1f32 as f64);
        assert_ne!(cast.data[1], 1.0 / 3.0);
        assert_eq!(t.cast(Dtype::F64), t);
    }

    #[test]
    fn test_argmax_rows() {
        let t = Tensor::new(vec![0.1, 0.9, 0.0, 5.0, -1.0, 2.0], vec![2, 3]);
        assert_eq!(t.argmax_rows(), vec![1, 0]);
    }

    #[test]
    fn test_randn_rejects_negative_std() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Tensor::randn(vec![2, 2], -1.0, &mut rng).is_err());
        let zeros = Tensor::randn(vec![2, 2], 0.0, &mut rng).unwrap();
        assert!(zeros.data.iter().all(|&x| x == 0.0));
    }

    #[test]
    #[should_panic(expected = "Unsupported broadcast")]
    fn test_add_rejects_incompatible_shapes() {
        let a = Tensor::zeros(vec![2, 3]);
        let b = Tensor::zeros(vec![2]);
        let _ = a.add(&b);
    }
}
