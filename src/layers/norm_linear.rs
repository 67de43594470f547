use super::{Backward, Module, Param, Parameterized, uniform_init};
use crate::backprop::{l2norm, l2norm_cols, linear};
use crate::ops::BackFn;
use crate::tensors::Ten32;
use tracing::trace;

/// Which weight vectors of a `[dim_out, dim]` matrix are kept at unit norm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormDim {
    /// Each output unit's incoming weights (rows).
    #[default]
    In,
    /// Each input unit's outgoing weights (columns).
    Out,
}

/// How unit norm is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightNorm {
    /// Normalize on every forward; gradients flow through the normalization.
    #[default]
    Parametrized,
    /// Use the stored weight as-is; call [`NormLinear::norm_weights`] after
    /// every optimizer step.
    Manual,
}

/// A bias-free linear layer whose weight vectors live on the unit hypersphere.
#[derive(Debug, Clone)]
pub struct NormLinear {
    dim: usize,
    dim_out: usize,
    norm_dim: NormDim,
    mode: WeightNorm,
    weight: Param,
}

impl NormLinear {
    /// Builds a `dim -> dim_out` layer with uniformly initialized, then
    /// normalized, weights.
    pub fn new(
        dim: usize,
        dim_out: usize,
        norm_dim: NormDim,
        mode: WeightNorm,
        rng: &mut impl rand::Rng,
    ) -> Self {
        let weight = uniform_init(vec![dim_out, dim], dim, rng);
        let mut layer = Self {
            dim,
            dim_out,
            norm_dim,
            mode,
            weight: Param::new(weight),
        };
        layer.norm_weights();
        layer
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn dim_out(&self) -> usize {
        self.dim_out
    }

    pub fn norm_dim(&self) -> NormDim {
        self.norm_dim
    }

    pub fn mode(&self) -> WeightNorm {
        self.mode
    }

    fn normalize(&self, w: &Ten32) -> (Ten32, BackFn) {
        match self.norm_dim {
            NormDim::In => l2norm(w),
            NormDim::Out => l2norm_cols(w),
        }
    }

    /// The weight actually applied in the forward pass.
    pub fn weight(&self) -> Ten32 {
        match self.mode {
            WeightNorm::Parametrized => self.normalize(&self.weight.value).0,
            WeightNorm::Manual => self.weight.value.clone(),
        }
    }

    /// Writes the normalized weight back into the stored parameter.
    pub fn norm_weights(&mut self) {
        let (normed, _) = self.normalize(&self.weight.value);
        self.weight.value.update(normed);
        trace!(dim = self.dim, dim_out = self.dim_out, "renormalized weights");
    }
}

impl Parameterized for NormLinear {
    fn parameters(&self) -> Vec<&Param> {
        vec![&self.weight]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weight]
    }
}

impl Module for NormLinear {
    fn forward(&self, x: &Ten32) -> (Ten32, Backward) {
        let (w, back_norm) = match self.mode {
            WeightNorm::Parametrized => {
                let (w, back) = self.normalize(&self.weight.value);
                (w, Some(back))
            }
            WeightNorm::Manual => (self.weight.value.clone(), None),
        };

        let (y, back_lin) = linear(x, &w);

        let back = move |g: &Ten32| {
            let (dx, dw) = back_lin(g);
            let dw = match &back_norm {
                Some(b) => b(&dw),
                None => dw,
            };
            (dx, vec![dw])
        };

        (y, Box::new(back))
    }
}
