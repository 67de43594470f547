use super::{Backward, Module, NormDim, NormLinear, Param, Parameterized, Scale, WeightNorm};
use crate::backprop::{mul, mul_scalar, scale, silu};
use crate::config::FeedforwardConfig;
use crate::error::Result;
use crate::tensors::{Ten32, TensorFloat};

/// Gated SiLU feedforward over normalized linears.
///
/// ```text
/// hidden = to_hidden(x) * s_hidden
/// gate   = to_gate(x) * s_gate * √dim
/// out    = to_out(silu(gate) * hidden)
/// ```
///
/// `to_hidden` and `to_gate` map `dim -> dim_inner` with unit-norm rows;
/// `to_out` maps back with unit-norm columns.
#[derive(Debug, Clone)]
pub struct NFeedforward {
    dim: usize,
    expand_factor: f64,
    dim_inner: usize,
    to_hidden: NormLinear,
    to_gate: NormLinear,
    hidden_scale: Scale,
    gate_scale: Scale,
    to_out: NormLinear,
}

impl NFeedforward {
    /// Builds a block from its config.
    ///
    /// # Errors
    /// Propagates [`FeedforwardConfig::validate`].
    pub fn from_config(cfg: &FeedforwardConfig, rng: &mut impl rand::Rng) -> Result<Self> {
        cfg.validate()?;

        let mode = if cfg.manual_norm_weights {
            WeightNorm::Manual
        } else {
            WeightNorm::Parametrized
        };
        let dim = cfg.dim;
        let dim_inner = cfg.dim_inner();

        Ok(Self {
            dim,
            expand_factor: cfg.expand_factor,
            dim_inner,
            to_hidden: NormLinear::new(dim, dim_inner, NormDim::In, mode, rng),
            to_gate: NormLinear::new(dim, dim_inner, NormDim::In, mode, rng),
            hidden_scale: Scale::new(dim_inner, cfg.s_hidden_init, cfg.s_hidden_scale),
            gate_scale: Scale::new(dim_inner, cfg.s_gate_init, cfg.s_gate_scale),
            to_out: NormLinear::new(dim_inner, dim, NormDim::Out, mode, rng),
        })
    }

    /// Default block of width `dim`.
    ///
    /// # Errors
    /// When `dim` is zero.
    pub fn new(dim: usize, rng: &mut impl rand::Rng) -> Result<Self> {
        Self::from_config(&FeedforwardConfig::new(dim), rng)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn expand_factor(&self) -> f64 {
        self.expand_factor
    }

    pub fn dim_inner(&self) -> usize {
        self.dim_inner
    }

    /// Renormalizes the three linear layers.
    pub fn norm_weights(&mut self) {
        self.to_hidden.norm_weights();
        self.to_gate.norm_weights();
        self.to_out.norm_weights();
    }

    pub(crate) fn norm_linears(&self) -> [&NormLinear; 3] {
        [&self.to_hidden, &self.to_gate, &self.to_out]
    }
}

impl Parameterized for NFeedforward {
    fn parameters(&self) -> Vec<&Param> {
        let mut params = self.to_hidden.parameters();
        params.extend(self.to_gate.parameters());
        params.extend(self.hidden_scale.parameters());
        params.extend(self.gate_scale.parameters());
        params.extend(self.to_out.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        let mut params = self.to_hidden.parameters_mut();
        params.extend(self.to_gate.parameters_mut());
        params.extend(self.hidden_scale.parameters_mut());
        params.extend(self.gate_scale.parameters_mut());
        params.extend(self.to_out.parameters_mut());
        params
    }
}

impl Module for NFeedforward {
    #[allow(clippy::cast_precision_loss)]
    fn forward(&self, x: &Ten32) -> (Ten32, Backward) {
        let (hidden, back_hidden) = self.to_hidden.forward(x);
        let (gate, back_gate) = self.to_gate.forward(x);

        let (s_hidden, back_s_hidden) = self.hidden_scale.forward();
        let (hidden, back_hidden_scaled) = scale(&hidden, &s_hidden);

        let (s_gate, back_s_gate) = self.gate_scale.forward();
        let (gate, back_gate_scaled) = scale(&gate, &s_gate);
        let (gate, back_gate_boost) = mul_scalar(&gate, (self.dim as TensorFloat).sqrt());

        let (gate, back_silu) = silu(&gate);
        let (inner, back_mul) = mul(&gate, &hidden);
        let (out, back_out) = self.to_out.forward(&inner);

        let back = move |g: &Ten32| {
            let (d_inner, g_out) = back_out(g);
            let (d_gate, d_hidden) = back_mul(&d_inner);

            let d_gate = back_gate_boost(&back_silu(&d_gate));
            let (d_gate, d_s_gate) = back_gate_scaled(&d_gate);
            let (d_hidden, d_s_hidden) = back_hidden_scaled(&d_hidden);

            let (mut dx, g_hidden) = back_hidden(&d_hidden);
            let (dx_gate, g_gate) = back_gate(&d_gate);
            dx.add_assign(&dx_gate);

            let mut grads = g_hidden;
            grads.extend(g_gate);
            grads.push(back_s_hidden(&d_s_hidden));
            grads.push(back_s_gate(&d_s_gate));
            grads.extend(g_out);
            (dx, grads)
        };

        (out, Box::new(back))
    }
}
