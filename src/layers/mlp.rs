use super::{Backward, Linear, Module, Param, Parameterized, backward_chain, stateless};
use crate::backprop::{relu, silu};
use crate::config::MlpConfig;
use crate::error::Result;
use crate::ops::BackFn;
use crate::tensors::Ten32;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Nonlinearity between MLP layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Silu,
}

impl Activation {
    fn apply(self, x: &Ten32) -> (Ten32, BackFn) {
        match self {
            Self::Relu => relu(x),
            Self::Silu => silu(x),
        }
    }
}

/// Plain multilayer perceptron.
///
/// `dims = [d0, d1, …, dn]` gives `n` linear layers `d(i) -> d(i+1)` with the
/// activation between consecutive layers and none after the last.
///
/// ```rust
/// use rand::SeedableRng;
/// use x_mlps::layers::{Mlp, Module};
/// use x_mlps::tensors::Ten32;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// let mlp = Mlp::new(&[256, 128, 64], &mut rng)?;
/// let y = mlp.infer(&Ten32::zeros(vec![7, 3, 256]));
/// assert_eq!(y.shape, vec![7, 3, 64]);
/// # Ok::<(), x_mlps::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Linear>,
    activation: Activation,
}

impl Mlp {
    /// # Errors
    /// Propagates [`MlpConfig::validate`].
    pub fn from_config(cfg: &MlpConfig, rng: &mut impl rand::Rng) -> Result<Self> {
        cfg.validate()?;
        let layers: Vec<Linear> = cfg
            .dims
            .windows(2)
            .map(|w| Linear::new(w[0], w[1], cfg.bias, rng))
            .collect();
        debug!(dims = ?cfg.dims, activation = ?cfg.activation, "built mlp");
        Ok(Self {
            layers,
            activation: cfg.activation,
        })
    }

    /// ReLU MLP with biases.
    ///
    /// # Errors
    /// Fewer than two dims, or a zero dim.
    pub fn new(dims: &[usize], rng: &mut impl rand::Rng) -> Result<Self> {
        Self::from_config(&MlpConfig::new(dims), rng)
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn layers(&self) -> &[Linear] {
        &self.layers
    }

    pub fn dims(&self) -> Vec<usize> {
        let mut dims: Vec<usize> = self.layers.iter().map(Linear::dim).collect();
        dims.extend(self.layers.last().map(Linear::dim_out));
        dims
    }
}

impl Parameterized for Mlp {
    fn parameters(&self) -> Vec<&Param> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.layers.iter_mut().flat_map(|l| l.parameters_mut()).collect()
    }
}

impl Module for Mlp {
    fn forward(&self, x: &Ten32) -> (Ten32, Backward) {
        let mut steps: Vec<Backward> = Vec::with_capacity(self.layers.len() * 2);
        let mut h = x.clone();
        let last = self.layers.len() - 1;

        for (i, layer) in self.layers.iter().enumerate() {
            let (y, back) = layer.forward(&h);
            steps.push(back);
            h = y;
            if i != last {
                let (y, back) = self.activation.apply(&h);
                steps.push(stateless(back));
                h = y;
            }
        }

        let back = move |g: &Ten32| backward_chain(&steps, g);
        (h, Box::new(back))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn maps_last_dim() {
        let mut rng = StdRng::seed_from_u64(41);
        let mlp = Mlp::new(&[256, 128, 64], &mut rng).unwrap();
        assert_eq!(mlp.dims(), vec![256, 128, 64]);
        let y = mlp.infer(&Ten32::ones(vec![7, 3, 256]));
        assert_eq!(y.shape, vec![7, 3, 64]);
    }

    #[test]
    fn single_dim_is_rejected() {
        let mut rng = StdRng::seed_from_u64(42);
        assert!(matches!(Mlp::new(&[4], &mut rng), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn activation_parses_lowercase() {
        let cfg: MlpConfig =
            serde_json::from_str(r#"{"dims": [2, 3], "activation": "silu"}"#).unwrap();
        assert_eq!(cfg.activation, Activation::Silu);
        assert!(cfg.bias);
    }
}
