//! Feedforward building blocks.
//!
//! Layers own their parameters as [`Param`]s (a value plus an accumulated
//! gradient). A forward pass returns the output together with a [`Backward`]
//! closure; calling it with `dL/d(out)` yields `dL/d(input)` and one gradient
//! per parameter, in the same order as [`Parameterized::parameters`]. Nothing
//! is written back until the caller hands those gradients to
//! [`Parameterized::accumulate_grads`], so the same forward can be
//! differentiated more than once.
//!
//! - [`Scale`] — a learned per-feature scale with decoupled init and step size
//! - [`NormLinear`] — bias-free linear map with unit-norm weight vectors
//! - [`NFeedforward`] — gated SiLU feedforward of normalized linears
//! - [`Residual`] — hypersphere residual update (`lerp` then renormalize)
//! - [`NFeedforwards`] — a deep stack of residual feedforwards with optional projections
//! - [`Linear`], [`Mlp`] — the plain, unnormalized MLP

use crate::backprop::sgd;
use crate::tensors::{Ten32, TensorFloat, WithGrad};

mod feedforward;
mod linear;
mod mlp;
mod network;
mod norm_linear;
mod residual;
mod scale;

pub use feedforward::NFeedforward;
pub use linear::Linear;
pub use mlp::{Activation, Mlp};
pub use network::NFeedforwards;
pub use norm_linear::{NormDim, NormLinear, WeightNorm};
pub use residual::Residual;
pub use scale::Scale;

/// A trainable tensor.
pub type Param = WithGrad<Ten32>;

/// Backward pass of a layer: `dL/d(out) -> (dL/d(in), parameter gradients)`.
pub type Backward = Box<dyn Fn(&Ten32) -> (Ten32, Vec<Ten32>) + Send + Sync>;

/// Anything that owns parameters.
pub trait Parameterized {
    /// All parameters, in a fixed order.
    fn parameters(&self) -> Vec<&Param>;

    /// All parameters, in the same order as [`Self::parameters`].
    fn parameters_mut(&mut self) -> Vec<&mut Param>;

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.value.len()).sum()
    }

    /// Resets every gradient to zero.
    fn zero_grad(&mut self) {
        for p in self.parameters_mut() {
            p.zero_grad();
        }
    }

    /// Adds gradients (as returned by a [`Backward`]) into the parameters.
    ///
    /// # Panics
    /// Panics if the count or any shape does not match.
    fn accumulate_grads(&mut self, grads: Vec<Ten32>) {
        let params = self.parameters_mut();
        assert_eq!(params.len(), grads.len(), "gradient count mismatch");
        for (p, g) in params.into_iter().zip(&grads) {
            p.grad.add_assign(g);
        }
    }

    /// One SGD step over every parameter; gradients are zeroed afterwards.
    fn sgd_step(&mut self, lr: TensorFloat) {
        for p in self.parameters_mut() {
            sgd(p, lr);
        }
    }

    /// Copies of every parameter value, in order.
    fn state(&self) -> Vec<Ten32> {
        self.parameters().into_iter().map(|p| p.value.clone()).collect()
    }
}

/// A differentiable map from one tensor to another.
pub trait Module: Parameterized {
    /// Runs the layer on `x` (shape `[..., in]`).
    ///
    /// # Panics
    /// Panics if the last dimension of `x` does not match the layer.
    fn forward(&self, x: &Ten32) -> (Ten32, Backward);

    /// Forward pass without keeping the backward closure.
    fn infer(&self, x: &Ten32) -> Ten32 {
        self.forward(x).0
    }
}

/// Wraps a parameter-free backward closure as a layer [`Backward`].
pub(crate) fn stateless(back: crate::ops::BackFn) -> Backward {
    Box::new(move |g: &Ten32| (back(g), Vec::new()))
}

/// Runs a chain of layer backwards in reverse and returns the input gradient
/// plus every parameter gradient in forward order.
pub(crate) fn backward_chain(steps: &[Backward], g: &Ten32) -> (Ten32, Vec<Ten32>) {
    let mut grad = g.clone();
    let mut per_step = Vec::with_capacity(steps.len());
    for step in steps.iter().rev() {
        let (dx, grads) = step(&grad);
        grad = dx;
        per_step.push(grads);
    }
    let grads = per_step.into_iter().rev().flatten().collect();
    (grad, grads)
}

/// Uniform `±1/√fan_in` initialization, the usual default for linear layers.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn uniform_init(
    shape: Vec<usize>,
    fan_in: usize,
    rng: &mut impl rand::Rng,
) -> Ten32 {
    let n: usize = shape.iter().product();
    let bound = (fan_in.max(1) as TensorFloat).sqrt().recip();
    let data = (0..n).map(|_| rng.random_range(-bound..bound)).collect();
    Ten32::new(shape, data)
}

/// One MSE training step: forward, backward, accumulate, SGD. Returns the loss.
///
/// # Panics
/// Panics if `target` does not have the output's shape.
pub fn mse_step<M: Module>(
    module: &mut M,
    x: &Ten32,
    target: &Ten32,
    lr: TensorFloat,
) -> TensorFloat {
    let (y, back) = module.forward(x);
    let (loss, loss_back) = crate::backprop::mse_loss(&y, target);
    let (_, grads) = back(&loss_back(1.0));
    module.zero_grad();
    module.accumulate_grads(grads);
    module.sgd_step(lr);
    loss
}
