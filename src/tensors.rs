//! Core tensor data structures.
//!
//! # Tensor Utilities
//!
//! A tensor here is nothing more than a shape and a flat, row-major buffer.
//! Every layer in this crate reads a tensor of shape `[..., d]` as a matrix of
//! `rows × d`, where `rows` is the product of all leading dimensions. That is
//! the only view the differentiable operations in [`crate::backprop`] need.
//!
//! It supports:
//! - Construction of N-dimensional tensors with runtime shape checks
//! - Row views over the last dimension
//! - 2D transposes for weight matrices
//! - Autograd pairs via [`WithGrad`]
//! - The [`tensor!`](crate::tensor) literal macro
//!
//! ## Limitations
//! - Row-major only
//! - No general broadcasting; per-feature broadcasting is handled by the ops
//!
//! ## Example
//!
//! ```rust
//! use x_mlps::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape, vec![2, 3]);
//! assert_eq!(t.rows(), 2);
//! ```

/// The float type used by every layer.
pub type TensorFloat = f32;

/// Tensor of [`TensorFloat`]s.
pub type Ten32 = Tensor<TensorFloat>;

/// Represents an N-dimensional tensor with a shape and flat row-major data.
///
/// - `shape` defines the structure, e.g. `[2, 3]` for a 2×3 matrix.
/// - `data` holds the flattened content in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> Tensor<T> {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Replaces this tensor's data with another tensor of the same shape.
    ///
    /// # Panics
    /// Panics if shapes do not match.
    pub fn update(&mut self, mut other: Tensor<T>) {
        assert_eq!(self.shape, other.shape, "shape mismatch");
        std::mem::swap(&mut self.data, &mut other.data);
    }

    /// Size of the last dimension (1 for scalars).
    pub fn last_dim(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }

    /// Number of rows when the tensor is viewed as `[rows, last_dim]`.
    pub fn rows(&self) -> usize {
        match self.last_dim() {
            0 => 0,
            d => self.data.len() / d,
        }
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the same data under a new shape.
    ///
    /// # Panics
    /// Panics if the element count changes.
    pub fn reshape(self, shape: impl Into<Vec<usize>>) -> Self {
        Self::new(shape, self.data)
    }

    /// Shape with the last dimension replaced by `dim`.
    pub fn shape_with_last(&self, dim: usize) -> Vec<usize> {
        let mut shape = self.shape.clone();
        match shape.last_mut() {
            Some(last) => *last = dim,
            None => shape.push(dim),
        }
        shape
    }
}

impl<T: Clone> Tensor<T> {
    /// Tensor filled with a single value.
    pub fn full(shape: impl Into<Vec<usize>>, value: T) -> Self {
        let shape = shape.into();
        let n: usize = shape.iter().product();
        Self {
            data: vec![value; n],
            shape,
        }
    }
}

impl<T: Copy + Default> Tensor<T> {
    /// Transposes a 2D tensor.
    ///
    /// # Panics
    /// Panics if the tensor is not rank 2.
    pub fn transpose2d(&self) -> Self {
        assert_eq!(self.shape.len(), 2, "transpose2d expects a matrix");
        let (m, n) = (self.shape[0], self.shape[1]);
        let mut out = vec![T::default(); m * n];
        for i in 0..m {
            for j in 0..n {
                out[j * m + i] = self.data[i * n + j];
            }
        }
        Self::new(vec![n, m], out)
    }
}

impl Tensor<TensorFloat> {
    /// All-zero tensor.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        Self::full(shape, 0.0)
    }

    /// All-one tensor.
    pub fn ones(shape: impl Into<Vec<usize>>) -> Self {
        Self::full(shape, 1.0)
    }

    /// Zero tensor with this tensor's shape.
    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.shape.clone())
    }

    /// Euclidean norm of each row of the `[rows, last_dim]` view.
    pub fn row_norms(&self) -> Vec<TensorFloat> {
        let d = self.last_dim();
        if d == 0 {
            return Vec::new();
        }
        self.data
            .chunks(d)
            .map(|row| row.iter().map(|x| x * x).sum::<TensorFloat>().sqrt())
            .collect()
    }

    /// Largest absolute elementwise difference to `other`.
    ///
    /// # Panics
    /// Panics if shapes do not match.
    pub fn max_abs_diff(&self, other: &Self) -> TensorFloat {
        assert_eq!(self.shape, other.shape, "shape mismatch");
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, TensorFloat::max)
    }

    /// Adds `other` into `self` elementwise.
    ///
    /// # Panics
    /// Panics if shapes do not match.
    pub fn add_assign(&mut self, other: &Self) {
        assert_eq!(self.shape, other.shape, "shape mismatch");
        self.data
            .iter_mut()
            .zip(&other.data)
            .for_each(|(a, b)| *a += b);
    }
}

/// A container for tracking gradients of values (used in autograd).
///
/// Typically used as `WithGrad<Ten32>`.
#[derive(Debug, Clone, PartialEq)]
pub struct WithGrad<T> {
    pub value: T,
    pub grad: T,
}

impl WithGrad<Ten32> {
    /// Wraps a tensor with a zeroed gradient of the same shape.
    pub fn new(value: Ten32) -> Self {
        let grad = value.zeros_like();
        Self { value, grad }
    }

    /// Resets the gradient to zero.
    pub fn zero_grad(&mut self) {
        self.grad.data.iter_mut().for_each(|g| *g = 0.0);
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use x_mlps::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    (- $lit:literal) => {
        $crate::tensors::Tensor::<$crate::tensors::TensorFloat>::new(Vec::<usize>::new(), vec![-$lit])
    };

    ($lit:literal) => {
        $crate::tensors::Tensor::<$crate::tensors::TensorFloat>::new(Vec::<usize>::new(), vec![$lit])
    };

    ([ $($body:tt)+ ]) => {
        $crate::tensor!(@collect [] $($body)+)
    };

    // one element at a time, so a leading `-` stays with its literal
    (@collect [$($acc:expr,)*] - $lit:literal $(, $($rest:tt)*)?) => {
        $crate::tensor!(@collect [$($acc,)* $crate::tensor!(- $lit),] $($($rest)*)?)
    };

    (@collect [$($acc:expr,)*] $inner:tt $(, $($rest:tt)*)?) => {
        $crate::tensor!(@collect [$($acc,)* $crate::tensor!($inner),] $($($rest)*)?)
    };

    (@collect [$($acc:expr,)+]) => {{
        let children = vec![ $($acc),+ ];
        let first_shape = &children[0].shape;
        assert!(children.iter().all(|c| c.shape == *first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::new(shape, data)
    }};
}
