//! Fits a small normalized feedforward network to a smooth target and
//! checkpoints it to `checkpoints/nff/model.xmlp`.
//!
//! Run with `RUST_LOG=x_mlps=debug` to see construction and I/O events.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;
use x_mlps::config::NFeedforwardsConfig;
use x_mlps::layers::{NFeedforwards, Parameterized};
use x_mlps::modelio::{load_module, save_module};
use x_mlps::tensors::Ten32;

const PATH_TO_MODEL: &str = "checkpoints/nff/model.xmlp";

fn main() -> x_mlps::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = NFeedforwardsConfig {
        dim_in: Some(2),
        dim_out: Some(1),
        input_preserve_magnitude: true,
        ..NFeedforwardsConfig::new(32, 4)
    };

    let mut rng = StdRng::seed_from_u64(7);
    let mut model = NFeedforwards::from_config(&cfg, &mut rng)?;
    info!(params = model.num_parameters(), "model ready");

    if load_module(PATH_TO_MODEL, &mut model).is_ok() {
        info!(path = PATH_TO_MODEL, "resumed from checkpoint");
    }

    // y = sin(a) * cos(b) on [-2, 2]²
    let n = 64;
    let inputs: Vec<f32> = (0..n * 2).map(|_| rng.random_range(-2.0..2.0)).collect();
    let targets: Vec<f32> = inputs.chunks(2).map(|p| p[0].sin() * p[1].cos()).collect();
    let x = Ten32::new(vec![n, 2], inputs);
    let y = Ten32::new(vec![n, 1], targets);

    for epoch in 0..=2000 {
        let loss = model.train_step(&x, &y, 0.05)?;
        if epoch % 200 == 0 {
            info!(epoch, loss, "training");
        }
    }

    if let Some(dir) = std::path::Path::new(PATH_TO_MODEL).parent() {
        std::fs::create_dir_all(dir)?;
    }
    save_module(PATH_TO_MODEL, &model)?;
    info!(path = PATH_TO_MODEL, "saved");
    Ok(())
}
