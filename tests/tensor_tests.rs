use x_mlps::backprop::{linear, mse_loss, relu, sgd};
use x_mlps::{tensor, tensors::{Ten32, Tensor, WithGrad}};

#[test]
fn test_tensor_creation() {
    let t = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(t.shape, vec![2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_tensor_macro() {
    let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
    assert_eq!(t.shape, vec![2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);

    let cube = tensor!([[[1.0], [2.0]], [[3.0], [4.0]]]);
    assert_eq!(cube.shape, vec![2, 2, 1]);
    assert_eq!(cube.rows(), 4);
}

#[test]
#[should_panic(expected = "ragged")]
fn test_ragged_macro_panics() {
    let _ = tensor!([[1.0, 2.0], [3.0]]);
}

#[test]
fn test_linear_backprop() {
    let x = Tensor::new(vec![2, 3], vec![
        1.0, 2.0, 3.0,
        4.0, 5.0, 6.0,
    ]);
    // two output units, one row each
    let w = Tensor::new(vec![2, 3], vec![
        7.0, 9.0, 11.0,
        8.0, 10.0, 12.0,
    ]);

    let (output, backward) = linear(&x, &w);
    assert_eq!(output.shape, vec![2, 2]);
    assert_eq!(output.data, vec![58.0, 64.0, 139.0, 154.0]);

    let grad_output = Tensor::new(vec![2, 2], vec![1.0, 1.0, 1.0, 1.0]);
    let (grad_x, grad_w) = backward(&grad_output);
    assert_eq!(grad_x.shape, vec![2, 3]);
    assert_eq!(grad_x.data, vec![15.0, 19.0, 23.0, 15.0, 19.0, 23.0]);
    assert_eq!(grad_w.shape, vec![2, 3]);
    assert_eq!(grad_w.data, vec![5.0, 7.0, 9.0, 5.0, 7.0, 9.0]);
}

#[test]
fn test_relu_backprop() {
    let t = Tensor::new(vec![3], vec![-1.0, 0.0, 1.0]);
    let (output, backward) = relu(&t);
    assert_eq!(output.data, vec![0.0, 0.0, 1.0]);
    let grad_output = Tensor::new(vec![3], vec![1.0, 1.0, 1.0]);
    let grad = backward(&grad_output);
    assert_eq!(grad.data, vec![0.0, 0.0, 1.0]);
}

#[test]
fn test_mse_loss() {
    let pred = Tensor::new(vec![2], vec![1.0, 2.0]);
    let target = Tensor::new(vec![2], vec![1.5, 2.5]);
    let (loss, backward) = mse_loss(&pred, &target);
    let grad = backward(1.0);
    assert_eq!(loss, 0.25);
    assert_eq!(grad.data, vec![-0.5, -0.5]);
}

#[test]
fn test_sgd() {
    let mut w = WithGrad {
        value: Tensor::new(vec![2], vec![1.0, 2.0]),
        grad: Tensor::new(vec![2], vec![0.1, 0.2]),
    };
    sgd(&mut w, 0.5);
    let expected = Tensor::new(vec![2], vec![0.95, 1.9]);
    assert!(w.value.max_abs_diff(&expected) < 1e-6);
    assert_eq!(w.grad.data, vec![0.0, 0.0]);
}

#[test]
fn test_with_grad_starts_at_zero() {
    let w = WithGrad::new(Ten32::ones(vec![2, 3]));
    assert_eq!(w.grad, Ten32::zeros(vec![2, 3]));
}
