use x_mlps::backprop::*;
use x_mlps::tensors::*;

#[test]
fn test_tensor_shape_mismatch_panics() {
    let result = std::panic::catch_unwind(|| {
        Ten32::new(vec![2, 2], vec![1.0, 2.0, 3.0]);
    });
    assert!(result.is_err());
}

#[test]
fn test_xmlp_save_and_load() {
    use x_mlps::modelio::{load_tensors, save_tensors};

    let a = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let b = Tensor::new(vec![1, 4], vec![7.0, 8.0, 9.0, 10.0]);
    let original = vec![a.clone(), b.clone()];

    let path = std::env::temp_dir().join(format!("x_mlps_core_{}.xmlp", std::process::id()));
    save_tensors(&path, &original).unwrap();
    let loaded = load_tensors(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(original, loaded);
}

#[test]
fn test_l2norm_rows_are_unit() {
    let x = Tensor::new(vec![2, 2], vec![3.0, 4.0, 0.0, 2.0]);
    let (y, _) = l2norm(&x);
    assert_eq!(y.data, vec![0.6, 0.8, 0.0, 1.0]);
}

#[test]
fn test_l2norm_backprop_is_tangent() {
    // the gradient of a normalization is orthogonal to its output
    let x = Tensor::new(vec![1, 3], vec![1.0, 2.0, 2.0]);
    let (y, back) = l2norm(&x);
    let dx = back(&Tensor::new(vec![1, 3], vec![0.3, -1.0, 2.0]));
    let dot: f32 = dx.data.iter().zip(&y.data).map(|(a, b)| a * b).sum();
    assert!(dot.abs() < 1e-6);
}

#[test]
fn test_l2norm_cols() {
    let w = Tensor::new(vec![2, 2], vec![3.0, 0.0, 4.0, 5.0]);
    let (y, _) = l2norm_cols(&w);
    assert_eq!(y.data, vec![0.6, 0.0, 0.8, 1.0]);
}

#[test]
fn test_scale_backprop() {
    let x = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    let s = Tensor::new(vec![2], vec![10.0, 0.5]);
    let (y, back) = scale(&x, &s);
    assert_eq!(y.data, vec![10.0, 1.0, 30.0, 2.0]);
    let (dx, ds) = back(&Tensor::new(vec![2, 2], vec![1.0; 4]));
    assert_eq!(dx.data, vec![10.0, 0.5, 10.0, 0.5]);
    assert_eq!(ds.data, vec![4.0, 6.0]);
}

#[test]
fn test_lerp_backprop() {
    let a = Tensor::new(vec![1, 2], vec![1.0, 1.0]);
    let b = Tensor::new(vec![1, 2], vec![3.0, 5.0]);
    let t = Tensor::new(vec![2], vec![0.5, 0.25]);
    let (y, back) = lerp(&a, &b, &t);
    assert_eq!(y.data, vec![2.0, 2.0]);
    let (da, db, dt) = back(&Tensor::new(vec![1, 2], vec![1.0, 1.0]));
    assert_eq!(da.data, vec![0.5, 0.75]);
    assert_eq!(db.data, vec![0.5, 0.25]);
    assert_eq!(dt.data, vec![2.0, 4.0]);
}

#[test]
fn test_silu_values() {
    let x = Tensor::new(vec![2], vec![0.0, 10.0]);
    let (y, back) = silu(&x);
    assert_eq!(y.data[0], 0.0);
    assert!((y.data[1] - 10.0).abs() < 1e-3);
    let dx = back(&Tensor::new(vec![2], vec![1.0, 1.0]));
    assert!((dx.data[0] - 0.5).abs() < 1e-6);
}

#[test]
fn test_mul_backprop() {
    let a = Tensor::new(vec![2], vec![2.0, 3.0]);
    let b = Tensor::new(vec![2], vec![5.0, 7.0]);
    let (y, back) = mul(&a, &b);
    assert_eq!(y.data, vec![10.0, 21.0]);
    let (da, db) = back(&Tensor::new(vec![2], vec![1.0, 2.0]));
    assert_eq!(da.data, vec![5.0, 14.0]);
    assert_eq!(db.data, vec![2.0, 6.0]);
}

#[test]
fn test_linear_bias_backprop() {
    let x = Tensor::new(vec![3, 1], vec![1.0, 2.0, 3.0]);
    let w = Tensor::new(vec![2, 1], vec![1.0, -1.0]);
    let b = Tensor::new(vec![2], vec![0.5, 0.25]);
    let (y, back) = linear_bias(&x, &w, &b);
    assert_eq!(y.data, vec![1.5, -0.75, 2.5, -1.75, 3.5, -2.75]);
    let (_, dw, db) = back(&Tensor::new(vec![3, 2], vec![1.0; 6]));
    assert_eq!(dw.data, vec![6.0, 6.0]);
    assert_eq!(db.data, vec![3.0, 3.0]);
}

#[test]
#[should_panic(expected = "linear input dim mismatch")]
fn test_linear_shape_mismatch_panics() {
    let x = Ten32::ones(vec![2, 3]);
    let w = Ten32::ones(vec![4, 2]);
    let _ = linear(&x, &w);
}
