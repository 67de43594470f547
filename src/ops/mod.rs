//! # Operation Kernels
//!
//! Forward and backward kernels for every differentiable operation exposed by
//! [`crate::backprop`].
//!
//! ## Submodules
//!
//! - [`cpu`] — Multi-threaded CPU operations built on `rayon`
//!
//! ## Extending
//!
//! To add a new operation:
//!
//! 1. Implement the kernel in [`cpu`], returning the forward value and a boxed backward closure
//! 2. Re-export it through [`crate::backprop`] with its shape checks and docs
//!
//! ## Notes
//!
//! - Backward closures own copies of whatever they need, so layers can chain
//!   them without borrowing from temporaries
//! - Operations must return both forward values and backward closures

use crate::tensors::{Ten32, TensorFloat};

pub mod cpu;

/// Backward closure of a unary op: `dL/d(out) -> dL/d(in)`.
pub type BackFn = Box<dyn Fn(&Ten32) -> Ten32 + Send + Sync>;

/// Backward closure of a binary op.
pub type BackFn2 = Box<dyn Fn(&Ten32) -> (Ten32, Ten32) + Send + Sync>;

/// Backward closure of a ternary op.
pub type BackFn3 = Box<dyn Fn(&Ten32) -> (Ten32, Ten32, Ten32) + Send + Sync>;

/// Backward closure of a scalar-valued loss.
pub type LossBackFn = Box<dyn Fn(TensorFloat) -> Ten32 + Send + Sync>;

/// Epsilon of the l2 normalization denominator.
pub const L2NORM_EPS: TensorFloat = 1e-12;
