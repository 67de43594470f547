//! Hyperparameter configuration.
//!
//! Every layer in [`crate::layers`] can be built from one of these structs.
//! They deserialize from JSON with `serde`, and every field except the
//! dimensions has a default, so a minimal config is just
//! `{"dim": 512, "depth": 4}`.
//!
//! Per-layer hyperparameters of [`NFeedforwardsConfig`] accept either a single
//! value (shared by every layer) or a list with exactly one value per layer:
//!
//! ```rust
//! use x_mlps::config::{NFeedforwardsConfig, PerLayer};
//!
//! let cfg: NFeedforwardsConfig = serde_json::from_str(
//!     r#"{"dim": 64, "depth": 2, "s_ff_gate_init": [1.0, 0.5]}"#,
//! ).unwrap();
//! assert_eq!(cfg.s_ff_gate_init, PerLayer::Each(vec![1.0, 0.5]));
//! assert_eq!(cfg.s_ff_hidden_init, PerLayer::One(1.0));
//! ```

use crate::error::{Error, Result};
use crate::layers::Activation;
use crate::tensors::TensorFloat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A hyperparameter given once for all layers or once per layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerLayer {
    One(TensorFloat),
    Each(Vec<TensorFloat>),
}

impl PerLayer {
    /// Expands to exactly `depth` values.
    ///
    /// # Errors
    /// [`Error::LayerCount`] when a list does not have `depth` entries.
    pub fn expand(&self, name: &'static str, depth: usize) -> Result<Vec<TensorFloat>> {
        match self {
            Self::One(v) => Ok(vec![*v; depth]),
            Self::Each(vs) if vs.len() == depth => Ok(vs.clone()),
            Self::Each(vs) => Err(Error::LayerCount {
                name,
                expected: depth,
                found: vs.len(),
            }),
        }
    }
}

impl From<TensorFloat> for PerLayer {
    fn from(v: TensorFloat) -> Self {
        Self::One(v)
    }
}

impl From<Vec<TensorFloat>> for PerLayer {
    fn from(vs: Vec<TensorFloat>) -> Self {
        Self::Each(vs)
    }
}

fn expand_opt(
    value: Option<&PerLayer>,
    name: &'static str,
    depth: usize,
) -> Result<Vec<Option<TensorFloat>>> {
    match value {
        None => Ok(vec![None; depth]),
        Some(v) => Ok(v.expand(name, depth)?.into_iter().map(Some).collect()),
    }
}

const fn default_expand_factor() -> f64 {
    4.0
}

const fn default_constant_shift() -> TensorFloat {
    3.0
}

const fn default_one() -> TensorFloat {
    1.0
}

fn default_per_layer_one() -> PerLayer {
    PerLayer::One(1.0)
}

/// Hyperparameters of a single normalized feedforward block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedforwardConfig {
    pub dim: usize,
    /// `f64`, so [`Self::dim_inner`] truncates the double-precision product.
    #[serde(default = "default_expand_factor")]
    pub expand_factor: f64,
    /// Use raw weights and rely on explicit `norm_weights()` calls instead of
    /// normalizing on every forward.
    #[serde(default)]
    pub manual_norm_weights: bool,
    #[serde(default = "default_one")]
    pub s_hidden_init: TensorFloat,
    #[serde(default = "default_one")]
    pub s_hidden_scale: TensorFloat,
    #[serde(default = "default_one")]
    pub s_gate_init: TensorFloat,
    #[serde(default = "default_one")]
    pub s_gate_scale: TensorFloat,
}

impl FeedforwardConfig {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            expand_factor: default_expand_factor(),
            manual_norm_weights: false,
            s_hidden_init: 1.0,
            s_hidden_scale: 1.0,
            s_gate_init: 1.0,
            s_gate_scale: 1.0,
        }
    }

    /// Width of the gated hidden layer: `floor(dim * expand_factor * 2 / 3)`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn dim_inner(&self) -> usize {
        (self.dim as f64 * self.expand_factor * 2.0 / 3.0) as usize
    }

    /// Checks dimensions and scales.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] for a zero dim, a non-positive expand factor,
    /// an empty hidden layer or a zero scale.
    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(Error::InvalidConfig("dim must be positive".into()));
        }
        if !(self.expand_factor > 0.0) {
            return Err(Error::InvalidConfig("expand_factor must be positive".into()));
        }
        if self.dim_inner() == 0 {
            return Err(Error::InvalidConfig(format!(
                "dim {} with expand_factor {} gives an empty hidden layer",
                self.dim, self.expand_factor
            )));
        }
        if self.s_hidden_scale == 0.0 || self.s_gate_scale == 0.0 {
            return Err(Error::InvalidConfig("scales must be non-zero".into()));
        }
        Ok(())
    }
}

/// Hyperparameters of a stack of residual normalized feedforward blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NFeedforwardsConfig {
    pub dim: usize,
    pub depth: usize,
    /// Project from this width into `dim` first.
    #[serde(default)]
    pub dim_in: Option<usize>,
    /// Project from `dim` to this width last.
    #[serde(default)]
    pub dim_out: Option<usize>,
    #[serde(default = "default_expand_factor")]
    pub ff_expand_factor: f64,
    /// Append `constant_shift` to the input before normalizing it, so the
    /// input's magnitude survives the projection onto the hypersphere.
    #[serde(default)]
    pub input_preserve_magnitude: bool,
    #[serde(default = "default_constant_shift")]
    pub constant_shift: TensorFloat,
    #[serde(default)]
    pub manual_norm_weights: bool,
    /// Residual interpolation init for every layer; `1 / depth` when unset.
    #[serde(default)]
    pub alpha_init: Option<TensorFloat>,
    /// Overrides `alpha_init` per layer.
    #[serde(default)]
    pub alpha_ff_init: Option<PerLayer>,
    /// Residual scale per layer; `dim^-0.5` when unset.
    #[serde(default)]
    pub alpha_ff_scale: Option<PerLayer>,
    /// Attention interpolation init. Accepted so configs shared with
    /// attention stacks load; length-checked against `depth`, otherwise unused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_attn_init: Option<PerLayer>,
    /// Attention interpolation scale; length-checked, otherwise unused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_attn_scale: Option<PerLayer>,
    #[serde(default = "default_per_layer_one")]
    pub s_ff_hidden_init: PerLayer,
    #[serde(default = "default_per_layer_one")]
    pub s_ff_hidden_scale: PerLayer,
    #[serde(default = "default_per_layer_one")]
    pub s_ff_gate_init: PerLayer,
    #[serde(default = "default_per_layer_one")]
    pub s_ff_gate_scale: PerLayer,
}

/// Resolved hyperparameters of one residual block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerHparams {
    pub alpha_init: TensorFloat,
    pub alpha_scale: TensorFloat,
    pub s_hidden_init: TensorFloat,
    pub s_hidden_scale: TensorFloat,
    pub s_gate_init: TensorFloat,
    pub s_gate_scale: TensorFloat,
}

impl NFeedforwardsConfig {
    pub fn new(dim: usize, depth: usize) -> Self {
        Self {
            dim,
            depth,
            dim_in: None,
            dim_out: None,
            ff_expand_factor: default_expand_factor(),
            input_preserve_magnitude: false,
            constant_shift: default_constant_shift(),
            manual_norm_weights: false,
            alpha_init: None,
            alpha_ff_init: None,
            alpha_ff_scale: None,
            alpha_attn_init: None,
            alpha_attn_scale: None,
            s_ff_hidden_init: default_per_layer_one(),
            s_ff_hidden_scale: default_per_layer_one(),
            s_ff_gate_init: default_per_layer_one(),
            s_ff_gate_scale: default_per_layer_one(),
        }
    }

    /// Parses a JSON config.
    ///
    /// # Errors
    /// Malformed JSON or unknown fields.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON config file.
    ///
    /// # Errors
    /// I/O failures, malformed JSON or unknown fields.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serializes back to pretty JSON.
    ///
    /// # Errors
    /// Only if serialization itself fails.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Projection into `dim` is needed for an explicit input width or for the
    /// magnitude-preserving pad.
    pub fn needs_proj_in(&self) -> bool {
        self.dim_in.is_some() || self.input_preserve_magnitude
    }

    /// Width the network accepts.
    pub fn input_dim(&self) -> usize {
        self.dim_in.unwrap_or(self.dim)
    }

    /// Width the network produces.
    pub fn output_dim(&self) -> usize {
        self.dim_out.unwrap_or(self.dim)
    }

    /// The block config shared by every layer, before per-layer scales.
    pub fn feedforward(&self) -> FeedforwardConfig {
        FeedforwardConfig {
            expand_factor: self.ff_expand_factor,
            manual_norm_weights: self.manual_norm_weights,
            ..FeedforwardConfig::new(self.dim)
        }
    }

    /// Validates and expands the per-layer hyperparameters.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] for zero dims or depth, [`Error::LayerCount`]
    /// when a per-layer list has the wrong length.
    #[allow(clippy::cast_precision_loss)]
    pub fn resolve(&self) -> Result<Vec<LayerHparams>> {
        if self.depth == 0 {
            return Err(Error::InvalidConfig("depth must be positive".into()));
        }
        if self.dim_in == Some(0) || self.dim_out == Some(0) {
            return Err(Error::InvalidConfig("projection dims must be positive".into()));
        }
        self.feedforward().validate()?;

        let depth = self.depth;
        let alpha_default = self.alpha_init.unwrap_or(1.0 / depth as TensorFloat);
        let scale_default = (self.dim as TensorFloat).powf(-0.5);

        let alpha_init = expand_opt(self.alpha_ff_init.as_ref(), "alpha_ff_init", depth)?;
        let alpha_scale = expand_opt(self.alpha_ff_scale.as_ref(), "alpha_ff_scale", depth)?;
        expand_opt(self.alpha_attn_init.as_ref(), "alpha_attn_init", depth)?;
        expand_opt(self.alpha_attn_scale.as_ref(), "alpha_attn_scale", depth)?;
        let hidden_init = self.s_ff_hidden_init.expand("s_ff_hidden_init", depth)?;
        let hidden_scale = self.s_ff_hidden_scale.expand("s_ff_hidden_scale", depth)?;
        let gate_init = self.s_ff_gate_init.expand("s_ff_gate_init", depth)?;
        let gate_scale = self.s_ff_gate_scale.expand("s_ff_gate_scale", depth)?;

        let layers: Vec<LayerHparams> = (0..depth)
            .map(|i| LayerHparams {
                alpha_init: alpha_init[i].unwrap_or(alpha_default),
                alpha_scale: alpha_scale[i].unwrap_or(scale_default),
                s_hidden_init: hidden_init[i],
                s_hidden_scale: hidden_scale[i],
                s_gate_init: gate_init[i],
                s_gate_scale: gate_scale[i],
            })
            .collect();

        if layers
            .iter()
            .any(|l| l.alpha_scale == 0.0 || l.s_hidden_scale == 0.0 || l.s_gate_scale == 0.0)
        {
            return Err(Error::InvalidConfig("scales must be non-zero".into()));
        }

        Ok(layers)
    }
}

/// Hyperparameters of a plain MLP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MlpConfig {
    /// Layer widths, input first, output last.
    pub dims: Vec<usize>,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_bias")]
    pub bias: bool,
}

const fn default_bias() -> bool {
    true
}

impl MlpConfig {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self {
            dims: dims.into(),
            activation: Activation::default(),
            bias: true,
        }
    }

    /// # Errors
    /// [`Error::InvalidConfig`] for fewer than two dims or a zero width.
    pub fn validate(&self) -> Result<()> {
        if self.dims.len() < 2 {
            return Err(Error::InvalidConfig(
                "an MLP needs at least an input and an output dim".into(),
            ));
        }
        if self.dims.contains(&0) {
            return Err(Error::InvalidConfig("MLP dims must be positive".into()));
        }
        Ok(())
    }
}
