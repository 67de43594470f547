//! Trains a plain MLP on XOR with full-batch SGD.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::EnvFilter;
use x_mlps::config::MlpConfig;
use x_mlps::layers::{Activation, Mlp, Module, mse_step};
use x_mlps::tensor;

fn main() -> x_mlps::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let x = tensor!([[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]);
    let y = tensor!([[0.0], [1.0], [1.0], [0.0]]);

    let cfg = MlpConfig {
        activation: Activation::Silu,
        ..MlpConfig::new([2, 8, 1])
    };
    let mut rng = StdRng::seed_from_u64(3);
    let mut model = Mlp::from_config(&cfg, &mut rng)?;

    for epoch in 0..=5000 {
        let loss = mse_step(&mut model, &x, &y, 0.1);
        if epoch % 500 == 0 {
            info!(epoch, loss, "training");
        }
    }

    let pred = model.infer(&x);
    for (input, out) in x.data.chunks(2).zip(&pred.data) {
        info!(?input, prediction = out, "xor");
    }
    Ok(())
}
