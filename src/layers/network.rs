use super::{
    Backward, Module, NFeedforward, NormDim, NormLinear, Param, Parameterized, Residual, Scale,
    WeightNorm, backward_chain, stateless,
};
use crate::backprop::{l2norm, pad_last, scale};
use crate::config::{FeedforwardConfig, NFeedforwardsConfig};
use crate::error::{Error, Result};
use crate::tensors::{Ten32, TensorFloat};
use tracing::{debug, trace};

/// A linear projection followed by a learned per-feature scale.
#[derive(Debug, Clone)]
struct Projection {
    linear: NormLinear,
    scale: Scale,
}

impl Projection {
    /// `scale(linear(x))`, optionally l2-normalized.
    fn forward(&self, x: &Ten32, normalize: bool) -> (Ten32, Backward) {
        let (y, back_linear) = self.linear.forward(x);
        let (s, back_s) = self.scale.forward();
        let (y, back_scale) = scale(&y, &s);
        let (y, back_norm) = if normalize {
            let (y, back) = l2norm(&y);
            (y, Some(back))
        } else {
            (y, None)
        };

        let back = move |g: &Ten32| {
            let g = match &back_norm {
                Some(b) => b(g),
                None => g.clone(),
            };
            let (dy, ds) = back_scale(&g);
            let (dx, mut grads) = back_linear(&dy);
            grads.push(back_s(&ds));
            (dx, grads)
        };

        (y, Box::new(back))
    }

    fn parameters(&self) -> Vec<&Param> {
        let mut params = self.linear.parameters();
        params.extend(self.scale.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        let mut params = self.linear.parameters_mut();
        params.extend(self.scale.parameters_mut());
        params
    }
}

/// A deep stack of hypersphere-normalized residual feedforward blocks.
///
/// ```text
/// x ─(pad constant, l2norm)?─(proj_in · s, l2norm)?─[Residual(NFeedforward)] × depth─(proj_out · s)?─▶
/// ```
///
/// Hidden states between blocks are unit vectors of width `dim`. Optional
/// projections adapt other input and output widths, and the magnitude pad
/// appends a constant feature before the first normalization so the input's
/// scale is still recoverable after it.
///
/// # Example
///
/// ```rust
/// use rand::SeedableRng;
/// use x_mlps::config::NFeedforwardsConfig;
/// use x_mlps::layers::NFeedforwards;
/// use x_mlps::tensors::Ten32;
///
/// let cfg = NFeedforwardsConfig { dim_out: Some(3), ..NFeedforwardsConfig::new(16, 2) };
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// let net = NFeedforwards::from_config(&cfg, &mut rng)?;
/// let y = net.predict(&Ten32::ones(vec![4, 16]))?;
/// assert_eq!(y.shape, vec![4, 3]);
/// # Ok::<(), x_mlps::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct NFeedforwards {
    config: NFeedforwardsConfig,
    layers: Vec<Residual<NFeedforward>>,
    proj_in: Option<Projection>,
    proj_out: Option<Projection>,
}

impl NFeedforwards {
    /// Builds the network described by `cfg`.
    ///
    /// # Errors
    /// Propagates [`NFeedforwardsConfig::resolve`].
    #[allow(clippy::cast_precision_loss)]
    pub fn from_config(cfg: &NFeedforwardsConfig, rng: &mut impl rand::Rng) -> Result<Self> {
        let hparams = cfg.resolve()?;
        let dim = cfg.dim;
        let mode = if cfg.manual_norm_weights {
            WeightNorm::Manual
        } else {
            WeightNorm::Parametrized
        };

        let mut layers = Vec::with_capacity(cfg.depth);
        for h in &hparams {
            let ff_cfg = FeedforwardConfig {
                s_hidden_init: h.s_hidden_init,
                s_hidden_scale: h.s_hidden_scale,
                s_gate_init: h.s_gate_init,
                s_gate_scale: h.s_gate_scale,
                ..cfg.feedforward()
            };
            let ff = NFeedforward::from_config(&ff_cfg, rng)?;
            layers.push(Residual::new(ff, dim, h.alpha_init, Some(h.alpha_scale)));
        }

        // the input projection is always normalized on the fly
        let proj_in = cfg.needs_proj_in().then(|| {
            let pad = usize::from(cfg.input_preserve_magnitude);
            Projection {
                linear: NormLinear::new(
                    cfg.input_dim() + pad,
                    dim,
                    NormDim::Out,
                    WeightNorm::Parametrized,
                    rng,
                ),
                scale: Scale::unit(dim),
            }
        });

        let proj_out = cfg.dim_out.map(|dim_out| Projection {
            linear: NormLinear::new(dim, dim_out, NormDim::In, mode, rng),
            scale: Scale::new(dim_out, 1.0, (dim as TensorFloat).powf(-0.5)),
        });

        let net = Self {
            config: cfg.clone(),
            layers,
            proj_in,
            proj_out,
        };

        debug!(
            dim,
            depth = cfg.depth,
            dim_in = net.input_dim(),
            dim_out = net.output_dim(),
            params = net.num_parameters(),
            "built normalized feedforward network"
        );

        Ok(net)
    }

    /// Network of `depth` blocks of width `dim` with default hyperparameters.
    ///
    /// # Errors
    /// When `dim` or `depth` is zero.
    pub fn new(dim: usize, depth: usize, rng: &mut impl rand::Rng) -> Result<Self> {
        Self::from_config(&NFeedforwardsConfig::new(dim, depth), rng)
    }

    pub fn config(&self) -> &NFeedforwardsConfig {
        &self.config
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn input_dim(&self) -> usize {
        self.config.input_dim()
    }

    pub fn output_dim(&self) -> usize {
        self.config.output_dim()
    }

    pub fn layers(&self) -> &[Residual<NFeedforward>] {
        &self.layers
    }

    /// Every normalized linear layer, in parameter order.
    pub fn norm_linears(&self) -> Vec<&NormLinear> {
        let mut out = Vec::new();
        if let Some(p) = &self.proj_in {
            out.push(&p.linear);
        }
        for layer in &self.layers {
            out.extend(layer.inner().norm_linears());
        }
        if let Some(p) = &self.proj_out {
            out.push(&p.linear);
        }
        out
    }

    /// Writes normalized weights back into every [`NormLinear`].
    ///
    /// Required after each optimizer step when the network was built with
    /// `manual_norm_weights`; harmless otherwise.
    pub fn norm_weights(&mut self) {
        if let Some(p) = &mut self.proj_in {
            p.linear.norm_weights();
        }
        for layer in &mut self.layers {
            layer.inner_mut().norm_weights();
        }
        if let Some(p) = &mut self.proj_out {
            p.linear.norm_weights();
        }
        trace!(depth = self.layers.len(), "renormalized network weights");
    }

    fn check_input(&self, x: &Ten32) -> Result<()> {
        if x.shape.is_empty() || x.last_dim() != self.input_dim() {
            return Err(Error::ShapeMismatch {
                expected: x.shape_with_last(self.input_dim()),
                found: x.shape.clone(),
            });
        }
        Ok(())
    }

    /// Forward pass with input validation.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] when the last dim of `x` is not the input width.
    pub fn try_forward(&self, x: &Ten32) -> Result<(Ten32, Backward)> {
        self.check_input(x)?;

        let mut steps: Vec<Backward> = Vec::with_capacity(self.layers.len() + 4);
        let mut h = x.clone();

        if self.config.input_preserve_magnitude {
            let (padded, back_pad) = pad_last(&h, self.config.constant_shift);
            let (normed, back_norm) = l2norm(&padded);
            steps.push(stateless(back_pad));
            steps.push(stateless(back_norm));
            h = normed;
        }

        if let Some(p) = &self.proj_in {
            let (y, back) = p.forward(&h, true);
            steps.push(back);
            h = y;
        }

        for layer in &self.layers {
            let (y, back) = layer.forward(&h);
            steps.push(back);
            h = y;
        }

        if let Some(p) = &self.proj_out {
            let (y, back) = p.forward(&h, false);
            steps.push(back);
            h = y;
        }

        let back = move |g: &Ten32| backward_chain(&steps, g);
        Ok((h, Box::new(back)))
    }

    /// Inference only.
    ///
    /// # Errors
    /// See [`Self::try_forward`].
    pub fn predict(&self, x: &Ten32) -> Result<Ten32> {
        Ok(self.try_forward(x)?.0)
    }

    /// One MSE + SGD step followed by weight renormalization. Returns the loss.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] for a bad input or target shape.
    pub fn train_step(&mut self, x: &Ten32, target: &Ten32, lr: TensorFloat) -> Result<TensorFloat> {
        let (y, back) = self.try_forward(x)?;
        if y.shape != target.shape {
            return Err(Error::ShapeMismatch {
                expected: y.shape,
                found: target.shape.clone(),
            });
        }
        let (loss, loss_back) = crate::backprop::mse_loss(&y, target);
        let (_, grads) = back(&loss_back(1.0));
        self.zero_grad();
        self.accumulate_grads(grads);
        self.sgd_step(lr);
        self.norm_weights();
        Ok(loss)
    }
}

impl Parameterized for NFeedforwards {
    fn parameters(&self) -> Vec<&Param> {
        let mut params = Vec::new();
        if let Some(p) = &self.proj_in {
            params.extend(p.parameters());
        }
        for layer in &self.layers {
            params.extend(layer.parameters());
        }
        if let Some(p) = &self.proj_out {
            params.extend(p.parameters());
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        let mut params = Vec::new();
        if let Some(p) = &mut self.proj_in {
            params.extend(p.parameters_mut());
        }
        for layer in &mut self.layers {
            params.extend(layer.parameters_mut());
        }
        if let Some(p) = &mut self.proj_out {
            params.extend(p.parameters_mut());
        }
        params
    }
}

impl Module for NFeedforwards {
    /// # Panics
    /// Panics on an input width mismatch; use [`NFeedforwards::try_forward`]
    /// to get an error instead.
    fn forward(&self, x: &Ten32) -> (Ten32, Backward) {
        match self.try_forward(x) {
            Ok(out) => out,
            Err(e) => panic!("{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn plain_stack_keeps_unit_norm() {
        let mut rng = StdRng::seed_from_u64(21);
        let net = NFeedforwards::new(8, 3, &mut rng).unwrap();
        assert!(net.proj_in.is_none() && net.proj_out.is_none());
        let x = l2norm(&Ten32::ones(vec![5, 8])).0;
        for n in net.predict(&x).unwrap().row_norms() {
            assert!((n - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn magnitude_pad_implies_input_projection() {
        let cfg = NFeedforwardsConfig {
            input_preserve_magnitude: true,
            ..NFeedforwardsConfig::new(8, 1)
        };
        let mut rng = StdRng::seed_from_u64(22);
        let net = NFeedforwards::from_config(&cfg, &mut rng).unwrap();
        let proj = net.proj_in.as_ref().unwrap();
        assert_eq!(proj.linear.dim(), 9);
        assert_eq!(proj.linear.mode(), WeightNorm::Parametrized);
    }

    #[test]
    fn wrong_input_width_is_an_error() {
        let mut rng = StdRng::seed_from_u64(23);
        let net = NFeedforwards::new(8, 1, &mut rng).unwrap();
        match net.predict(&Ten32::ones(vec![2, 7])) {
            Err(Error::ShapeMismatch { expected, found }) => {
                assert_eq!(expected, vec![2, 8]);
                assert_eq!(found, vec![2, 7]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn norm_linears_cover_every_projection() {
        let cfg = NFeedforwardsConfig {
            dim_in: Some(4),
            dim_out: Some(2),
            ..NFeedforwardsConfig::new(8, 2)
        };
        let mut rng = StdRng::seed_from_u64(24);
        let net = NFeedforwards::from_config(&cfg, &mut rng).unwrap();
        assert_eq!(net.norm_linears().len(), 1 + 2 * 3 + 1);
    }
}
