//! x_mlps: feedforward and MLP building blocks in Rust.
//!
//! Small, explicit layers for multilayer perceptrons, with a focus on the
//! hypersphere-normalized feedforward design where weight vectors and hidden
//! states are kept at unit norm and residual updates are learned
//! interpolations followed by renormalization.
//!
//! # Features
//!
//! - Row-major tensors with gradient pairs ([`tensors`]).
//! - Differentiable operations with explicit backward closures ([`backprop`]),
//!   parallelized over rows with `rayon` ([`ops`]).
//! - Layers: [`layers::NormLinear`], [`layers::NFeedforward`],
//!   [`layers::Residual`], [`layers::NFeedforwards`], and the plain
//!   [`layers::Mlp`].
//! - JSON hyperparameter configs ([`config`]) and a binary parameter format
//!   ([`modelio`]).
//!
//! # Modules
//!
//! - [`tensors`] — Core tensor data structures.
//! - [`backprop`] — Differentiable operations.
//! - [`layers`] — Feedforward building blocks and the `Module` trait.
//! - [`config`] — Serializable hyperparameters.
//! - [`modelio`] — Saving/loading parameters with integrity checks.
//!
//! # Logging
//!
//! The crate emits `tracing` events (network construction at `debug`,
//! weight renormalization at `trace`, file I/O at `debug`) and never installs
//! a subscriber itself.
//!
//! # Example
//!
//! ```rust
//! use rand::SeedableRng;
//! use x_mlps::config::NFeedforwardsConfig;
//! use x_mlps::layers::NFeedforwards;
//! use x_mlps::tensors::Ten32;
//!
//! let cfg = NFeedforwardsConfig {
//!     dim_in: Some(16),
//!     dim_out: Some(16),
//!     input_preserve_magnitude: true,
//!     ..NFeedforwardsConfig::new(32, 2)
//! };
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let net = NFeedforwards::from_config(&cfg, &mut rng)?;
//! let y = net.predict(&Ten32::ones(vec![2, 16]))?;
//! assert_eq!(y.shape, vec![2, 16]);
//! # Ok::<(), x_mlps::Error>(())
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod backprop;
pub mod config;
pub mod error;
pub mod layers;
pub mod modelio;
pub mod ops;
pub mod tensors;

pub use error::{Error, Result};
