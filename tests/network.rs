use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use x_mlps::config::{MlpConfig, NFeedforwardsConfig, PerLayer};
use x_mlps::layers::{Mlp, Module, NFeedforwards, NormDim, Parameterized, mse_step};
use x_mlps::modelio::{load_module, save_module};
use x_mlps::tensors::Ten32;
use x_mlps::Error;

fn random(shape: Vec<usize>, rng: &mut StdRng) -> Ten32 {
    let n: usize = shape.iter().product();
    Ten32::new(shape, (0..n).map(|_| rng.random_range(-1.0..1.0)).collect())
}

fn assert_unit_weights(net: &NFeedforwards) {
    for layer in net.norm_linears() {
        let w = layer.weight();
        let w = match layer.norm_dim() {
            NormDim::In => w,
            NormDim::Out => w.transpose2d(),
        };
        for n in w.row_norms() {
            assert!((n - 1.0).abs() < 1e-4, "weight vector norm {n}");
        }
    }
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("x_mlps_{}_{name}.xmlp", std::process::id()))
}

#[test]
fn test_mlp_shapes() {
    let mut rng = StdRng::seed_from_u64(0);
    let mlp = Mlp::new(&[256, 128, 64], &mut rng).unwrap();
    let x = random(vec![7, 3, 256], &mut rng);
    assert_eq!(mlp.infer(&x).shape, vec![7, 3, 64]);
}

#[test]
fn test_nff_shapes() {
    let mut rng = StdRng::seed_from_u64(1);
    let cfg = NFeedforwardsConfig {
        dim_in: Some(128),
        dim_out: Some(128),
        input_preserve_magnitude: true,
        ..NFeedforwardsConfig::new(512, 4)
    };
    let net = NFeedforwards::from_config(&cfg, &mut rng).unwrap();
    assert_eq!(net.layers()[0].inner().dim_inner(), 1365);
    let x = random(vec![2, 128], &mut rng);
    let y = net.predict(&x).unwrap();
    assert_eq!(y.shape, vec![2, 128]);
    assert!(y.data.iter().all(|v| v.is_finite()));
}

#[test]
fn test_magnitude_pad_keeps_input_scale() {
    let mut rng = StdRng::seed_from_u64(2);
    let x = random(vec![3, 4], &mut rng);
    let doubled = Ten32::new(x.shape.clone(), x.data.iter().map(|v| v * 2.0).collect());

    // without the pad the first normalization discards the scale
    let plain = NFeedforwardsConfig {
        dim_in: Some(4),
        ..NFeedforwardsConfig::new(8, 1)
    };
    let net = NFeedforwards::from_config(&plain, &mut rng).unwrap();
    let diff = net.predict(&x).unwrap().max_abs_diff(&net.predict(&doubled).unwrap());
    assert!(diff < 1e-5);

    let padded = NFeedforwardsConfig {
        input_preserve_magnitude: true,
        ..plain
    };
    let net = NFeedforwards::from_config(&padded, &mut rng).unwrap();
    let diff = net.predict(&x).unwrap().max_abs_diff(&net.predict(&doubled).unwrap());
    assert!(diff > 1e-4);
}

#[test]
fn test_hidden_states_stay_on_sphere() {
    let mut rng = StdRng::seed_from_u64(3);
    let cfg = NFeedforwardsConfig {
        dim_in: Some(5),
        ..NFeedforwardsConfig::new(16, 3)
    };
    let net = NFeedforwards::from_config(&cfg, &mut rng).unwrap();
    let y = net.predict(&random(vec![4, 5], &mut rng)).unwrap();
    for n in y.row_norms() {
        assert!((n - 1.0).abs() < 1e-5);
    }
}

#[test]
fn test_nff_training_reduces_loss() {
    let mut rng = StdRng::seed_from_u64(4);
    let cfg = NFeedforwardsConfig {
        dim_in: Some(4),
        dim_out: Some(2),
        ..NFeedforwardsConfig::new(8, 2)
    };
    let mut net = NFeedforwards::from_config(&cfg, &mut rng).unwrap();
    let x = random(vec![8, 4], &mut rng);
    let target = Ten32::new(vec![8, 2], x.data.iter().step_by(2).map(|v| v * 0.5).collect());

    let first = net.train_step(&x, &target, 0.02).unwrap();
    let mut last = first;
    for _ in 0..40 {
        last = net.train_step(&x, &target, 0.02).unwrap();
    }
    assert!(last < first, "loss went from {first} to {last}");
    assert_unit_weights(&net);
}

#[test]
fn test_manual_norm_weights_after_steps() {
    let mut rng = StdRng::seed_from_u64(5);
    let cfg = NFeedforwardsConfig {
        dim_out: Some(3),
        manual_norm_weights: true,
        ..NFeedforwardsConfig::new(8, 2)
    };
    let mut net = NFeedforwards::from_config(&cfg, &mut rng).unwrap();
    let x = x_mlps::backprop::l2norm(&random(vec![6, 8], &mut rng)).0;
    let target = random(vec![6, 3], &mut rng);

    // a raw step moves weights off the sphere
    mse_step(&mut net, &x, &target, 0.5);
    net.norm_weights();
    assert_unit_weights(&net);
}

#[test]
fn test_mlp_training_reduces_loss() {
    let mut rng = StdRng::seed_from_u64(6);
    let mut mlp = Mlp::from_config(&MlpConfig::new([3, 16, 2]), &mut rng).unwrap();
    let x = random(vec![16, 3], &mut rng);
    let target = Ten32::new(
        vec![16, 2],
        x.data.chunks(3).flat_map(|r| [r[0] + r[1], r[2] * 0.5]).collect(),
    );

    let first = mse_step(&mut mlp, &x, &target, 0.05);
    let mut last = first;
    for _ in 0..100 {
        last = mse_step(&mut mlp, &x, &target, 0.05);
    }
    assert!(last < first, "loss went from {first} to {last}");
}

#[test]
fn test_per_layer_hyperparameters() {
    let mut rng = StdRng::seed_from_u64(7);
    let cfg = NFeedforwardsConfig {
        alpha_ff_init: Some(PerLayer::Each(vec![0.1, 0.2, 0.3])),
        ..NFeedforwardsConfig::new(8, 3)
    };
    let net = NFeedforwards::from_config(&cfg, &mut rng).unwrap();
    for (layer, want) in net.layers().iter().zip([0.1f32, 0.2, 0.3]) {
        assert!(layer.alpha().data.iter().all(|a| (a - want).abs() < 1e-6));
    }

    let bad = NFeedforwardsConfig {
        s_ff_gate_init: PerLayer::Each(vec![1.0, 1.0]),
        ..NFeedforwardsConfig::new(8, 3)
    };
    match NFeedforwards::from_config(&bad, &mut rng) {
        Err(Error::LayerCount { expected, found, .. }) => {
            assert_eq!((expected, found), (3, 2));
        }
        other => panic!("unexpected {:?}", other.map(|n| n.depth())),
    }
}

#[test]
fn test_config_json_round_trip() {
    let json = r#"{
        "dim": 16,
        "depth": 2,
        "dim_out": 4,
        "s_ff_hidden_init": [1.0, 0.5]
    }"#;
    let cfg = NFeedforwardsConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.output_dim(), 4);
    assert_eq!(cfg.constant_shift, 3.0);

    let again = NFeedforwardsConfig::from_json_str(&cfg.to_json_string().unwrap()).unwrap();
    assert_eq!(again, cfg);

    assert!(NFeedforwardsConfig::from_json_str(r#"{"dim": 16, "depth": 2, "bogus": 1}"#).is_err());
}

#[test]
fn test_save_and_load_network() {
    let mut rng = StdRng::seed_from_u64(8);
    let cfg = NFeedforwardsConfig {
        dim_in: Some(4),
        dim_out: Some(2),
        ..NFeedforwardsConfig::new(8, 2)
    };
    let net = NFeedforwards::from_config(&cfg, &mut rng).unwrap();
    let mut restored = NFeedforwards::from_config(&cfg, &mut rng).unwrap();
    let x = random(vec![3, 4], &mut rng);
    assert!(net.predict(&x).unwrap().max_abs_diff(&restored.predict(&x).unwrap()) > 0.0);

    let path = temp_path("network");
    save_module(&path, &net).unwrap();
    load_module(&path, &mut restored).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(net.state(), restored.state());
    assert_eq!(net.predict(&x).unwrap(), restored.predict(&x).unwrap());
}

#[test]
fn test_load_rejects_other_architecture() {
    let mut rng = StdRng::seed_from_u64(9);
    let small = NFeedforwards::new(8, 1, &mut rng).unwrap();
    let mut wide = NFeedforwards::new(12, 1, &mut rng).unwrap();
    let mut deep = NFeedforwards::new(8, 2, &mut rng).unwrap();
    let before = wide.state();

    let path = temp_path("mismatch");
    save_module(&path, &small).unwrap();
    let shape_err = load_module(&path, &mut wide);
    let count_err = load_module(&path, &mut deep);
    let _ = std::fs::remove_file(&path);

    assert!(matches!(shape_err, Err(Error::ShapeMismatch { .. })));
    assert!(matches!(count_err, Err(Error::ParamCount { .. })));
    assert_eq!(wide.state(), before);
}
