//! Differentiable operations and autograd utilities.
//!
//! # Backpropagation Primitives
//!
//! The handful of operations a normalized feedforward network is built from,
//! each with its backward pass.
//!
//! ## Autograd Pattern
//!
//! Each operation follows a simple pattern:
//! 1. **Inputs** are borrowed [`Ten32`]s.
//! 2. **Forward Pass** computes an output `Ten32`.
//! 3. **Backward Pass** returns a boxed closure owning whatever it needs to map
//!    `dL/d(out)` onto the gradients of every input.
//! 4. **Gradient Application** is up to the caller; layers collect parameter
//!    gradients and hand them to [`crate::layers::Module::accumulate_grads`].
//!
//! Tensors of shape `[..., d]` are treated as `rows × d` matrices. Per-feature
//! operands (scales, interpolation weights, biases) have shape `[d]` and are
//! broadcast over rows.
//!
//! ## Usage Guidelines
//!
//! - Operations **panic** on shape mismatches; layers validate shapes before calling in.
//! - The backward closures implement `Fn`, allowing multiple invocations if needed.

use crate::ops::{BackFn, BackFn2, BackFn3, LossBackFn, cpu};
use crate::tensors::{Ten32, TensorFloat, WithGrad};

/// Linear map without bias: `x @ wᵀ` with `w: [out, in]`.
///
/// # Returns
/// - `out`: tensor of shape `[..., out]`
/// - `back`: closure returning `(dL/dx, dL/dw)`
///
/// # Panics
/// Panics if `w` is not a matrix or `x.last_dim() != w.shape[1]`.
///
/// # Example
/// ```rust
/// use x_mlps::{tensor, backprop::linear};
///
/// let x = tensor!([[1.0, 2.0]]);
/// let w = tensor!([[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
/// let (y, back) = linear(&x, &w);
/// assert_eq!(y.data, vec![1.0, 2.0, 3.0]);
/// let (dx, dw) = back(&tensor!([[1.0, 1.0, 1.0]]));
/// assert_eq!(dx.data, vec![2.0, 2.0]);
/// assert_eq!(dw.shape, vec![3, 2]);
/// ```
pub fn linear(x: &Ten32, w: &Ten32) -> (Ten32, BackFn2) {
    assert_eq!(w.shape.len(), 2, "linear weight must be a matrix");
    assert_eq!(x.last_dim(), w.shape[1], "linear input dim mismatch");
    cpu::linear(x, w)
}

/// Linear map with bias: `x @ wᵀ + b` with `b: [out]`.
///
/// # Returns
/// - `out`: tensor of shape `[..., out]`
/// - `back`: closure returning `(dL/dx, dL/dw, dL/db)`
///
/// # Panics
/// Panics on the same conditions as [`linear`], or if `b` has the wrong length.
pub fn linear_bias(x: &Ten32, w: &Ten32, b: &Ten32) -> (Ten32, BackFn3) {
    assert_eq!(w.shape.len(), 2, "linear weight must be a matrix");
    assert_eq!(x.last_dim(), w.shape[1], "linear input dim mismatch");
    assert_eq!(b.len(), w.shape[0], "bias length mismatch");
    cpu::linear_bias(x, w, b)
}

/// L2-normalizes every row over the last dimension: `x / max(‖x‖₂, 1e-12)`.
///
/// Rows with (near) zero norm map to zero rather than NaN.
pub fn l2norm(x: &Ten32) -> (Ten32, BackFn) {
    cpu::l2norm(x)
}

/// L2-normalizes every column of a matrix (i.e. over dimension 0).
///
/// # Panics
/// Panics if `w` is not a matrix.
pub fn l2norm_cols(w: &Ten32) -> (Ten32, BackFn) {
    assert_eq!(w.shape.len(), 2, "l2norm_cols expects a matrix");
    let (normed_t, back_t) = cpu::l2norm(&w.transpose2d());
    let back = move |g: &Ten32| back_t(&g.transpose2d()).transpose2d();
    (normed_t.transpose2d(), Box::new(back))
}

/// Multiplies every row by a per-feature vector `s: [d]`.
///
/// # Returns
/// - `out`: `x * s`
/// - `back`: closure returning `(dL/dx, dL/ds)`
///
/// # Panics
/// Panics if `s.len() != x.last_dim()`.
pub fn scale(x: &Ten32, s: &Ten32) -> (Ten32, BackFn2) {
    assert_eq!(s.len(), x.last_dim(), "scale length mismatch");
    cpu::scale(x, s)
}

/// Elementwise product of two tensors of identical shape.
///
/// # Panics
/// Panics if shapes differ.
pub fn mul(a: &Ten32, b: &Ten32) -> (Ten32, BackFn2) {
    assert_eq!(a.shape, b.shape, "mul shape mismatch");
    cpu::mul(a, b)
}

/// Multiplies by a constant.
pub fn mul_scalar(x: &Ten32, c: TensorFloat) -> (Ten32, BackFn) {
    cpu::mul_scalar(x, c)
}

/// Per-feature linear interpolation `a + t * (b - a)` with `t: [d]`.
///
/// # Returns
/// - `out`: interpolated tensor
/// - `back`: closure returning `(dL/da, dL/db, dL/dt)`
///
/// # Panics
/// Panics if `a` and `b` differ in shape or `t.len() != a.last_dim()`.
///
/// # Example
/// ```rust
/// use x_mlps::{tensor, backprop::lerp};
///
/// let a = tensor!([[0.0, 0.0]]);
/// let b = tensor!([[2.0, 4.0]]);
/// let t = tensor!([0.5, 0.25]);
/// let (y, _) = lerp(&a, &b, &t);
/// assert_eq!(y.data, vec![1.0, 1.0]);
/// ```
pub fn lerp(a: &Ten32, b: &Ten32, t: &Ten32) -> (Ten32, BackFn3) {
    assert_eq!(a.shape, b.shape, "lerp shape mismatch");
    assert_eq!(t.len(), a.last_dim(), "lerp weight length mismatch");
    cpu::lerp(a, b, t)
}

/// Swish/SiLU activation: `x * sigmoid(x)`.
pub fn silu(x: &Ten32) -> (Ten32, BackFn) {
    cpu::silu(x)
}

/// Applies the ReLU activation (Rectified Linear Unit): `max(0, x)` elementwise.
///
/// # Returns
/// - `out`: Tensor with negatives zeroed.
/// - `back`: Closure mapping `dL/d(out)` to `dL/d(input)` by passing gradients only where input > 0.
pub fn relu(x: &Ten32) -> (Ten32, BackFn) {
    cpu::relu(x)
}

/// Appends one constant-valued feature to the last dimension.
pub fn pad_last(x: &Ten32, value: TensorFloat) -> (Ten32, BackFn) {
    cpu::pad_last(x, value)
}

/// Computes Mean Squared Error (MSE) loss: `mean((prediction - target)^2)`.
///
/// # Returns
/// - Scalar loss value
/// - Closure that maps `dL/dloss` into gradient tensor shape
///
/// # Panics
/// Panics if shapes of `prediction` and `target` differ.
pub fn mse_loss(prediction: &Ten32, target: &Ten32) -> (TensorFloat, LossBackFn) {
    assert_eq!(prediction.shape, target.shape, "mse shape mismatch");
    cpu::mse_loss(prediction, target)
}

/// Performs an in-place Stochastic Gradient Descent (SGD) update.
///
/// Applies: `param = param - learning_rate * gradient` and then zeros gradient.
///
/// # Panics
/// Panics if value and gradient shapes differ.
pub fn sgd(w: &mut WithGrad<Ten32>, lr: TensorFloat) {
    assert_eq!(w.value.shape, w.grad.shape, "sgd shape mismatch");
    cpu::sgd(w, lr);
}
