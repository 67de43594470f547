//! Parallel CPU tensor operations
//!
//! # CPU Backend
//!
//! These are the kernels behind `backprop::xyz`. Every kernel views its input
//! as `[rows, d]` over the last dimension and parallelizes over rows (or over
//! output rows for the matrix products) with [`rayon`](https://docs.rs/rayon).
//!
//! ## Implemented Ops
//!
//! - `linear`, `linear_bias`: `x @ wᵀ (+ b)` with gradients for all inputs
//! - `l2norm`: row-wise l2 normalization
//! - `scale`, `mul`, `mul_scalar`, `lerp`: elementwise arithmetic
//! - `silu`, `relu`: activations
//! - `pad_last`: constant padding of the last dimension
//! - `mse_loss`, `sgd`
//!
//! ## Design Goals
//!
//! - Deterministic results: each output element is reduced in a fixed order
//! - Modular: no layer logic lives here

use super::{BackFn, BackFn2, BackFn3, L2NORM_EPS, LossBackFn};
use crate::tensors::{Ten32, Tensor, TensorFloat, WithGrad};
use rayon::prelude::*;

/// `a @ bᵀ` for `a: [m, k]`, `b: [n, k]`.
fn matmul_nt(a: &[TensorFloat], b: &[TensorFloat], m: usize, k: usize, n: usize) -> Vec<TensorFloat> {
    let mut out = vec![0.0; m * n];
    if n == 0 {
        return out;
    }
    out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        let a_row = &a[i * k..(i + 1) * k];
        for (j, o) in row.iter_mut().enumerate() {
            let b_row = &b[j * k..(j + 1) * k];
            *o = a_row.iter().zip(b_row).map(|(x, y)| x * y).sum();
        }
    });
    out
}

/// `a @ b` for `a: [m, k]`, `b: [k, n]`.
fn matmul_nn(a: &[TensorFloat], b: &[TensorFloat], m: usize, k: usize, n: usize) -> Vec<TensorFloat> {
    let mut out = vec![0.0; m * n];
    if n == 0 {
        return out;
    }
    out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        for l in 0..k {
            let a_il = a[i * k + l];
            if a_il == 0.0 {
                continue;
            }
            let b_row = &b[l * n..(l + 1) * n];
            for (o, &b_lj) in row.iter_mut().zip(b_row) {
                *o += a_il * b_lj;
            }
        }
    });
    out
}

/// `aᵀ @ b` for `a: [k, m]`, `b: [k, n]`.
fn matmul_tn(a: &[TensorFloat], b: &[TensorFloat], k: usize, m: usize, n: usize) -> Vec<TensorFloat> {
    let mut out = vec![0.0; m * n];
    if n == 0 {
        return out;
    }
    out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        for l in 0..k {
            let a_li = a[l * m + i];
            if a_li == 0.0 {
                continue;
            }
            let b_row = &b[l * n..(l + 1) * n];
            for (o, &b_lj) in row.iter_mut().zip(b_row) {
                *o += a_li * b_lj;
            }
        }
    });
    out
}

/// Sums a `[rows, d]` buffer over its rows.
fn sum_rows(data: &[TensorFloat], d: usize) -> Vec<TensorFloat> {
    let mut acc = vec![0.0; d];
    if d == 0 {
        return acc;
    }
    for row in data.chunks(d) {
        acc.iter_mut().zip(row).for_each(|(a, x)| *a += x);
    }
    acc
}

/// `x @ wᵀ` where `x: [..., in]` and `w: [out, in]`.
pub fn linear(x: &Ten32, w: &Ten32) -> (Ten32, BackFn2) {
    let (out_dim, in_dim) = (w.shape[0], w.shape[1]);
    let rows = x.rows();

    let y = matmul_nt(&x.data, &w.data, rows, in_dim, out_dim);
    let y = Tensor::new(x.shape_with_last(out_dim), y);

    let x = x.clone();
    let w = w.clone();
    let back = move |g: &Ten32| {
        let dx = matmul_nn(&g.data, &w.data, rows, out_dim, in_dim);
        let dw = matmul_tn(&g.data, &x.data, rows, out_dim, in_dim);
        (
            Tensor::new(x.shape.clone(), dx),
            Tensor::new(w.shape.clone(), dw),
        )
    };

    (y, Box::new(back))
}

/// `x @ wᵀ + b` where `b: [out]`.
pub fn linear_bias(x: &Ten32, w: &Ten32, b: &Ten32) -> (Ten32, BackFn3) {
    let out_dim = w.shape[0];
    let (mut y, back_lin) = linear(x, w);
    y.data
        .par_chunks_mut(out_dim.max(1))
        .for_each(|row| row.iter_mut().zip(&b.data).for_each(|(o, bi)| *o += bi));

    let b_shape = b.shape.clone();
    let back = move |g: &Ten32| {
        let (dx, dw) = back_lin(g);
        let db = Tensor::new(b_shape.clone(), sum_rows(&g.data, out_dim));
        (dx, dw, db)
    };

    (y, Box::new(back))
}

/// Row-wise `x / max(‖x‖, ε)`.
pub fn l2norm(x: &Ten32) -> (Ten32, BackFn) {
    let d = x.last_dim().max(1);

    let norms: Vec<TensorFloat> = x
        .data
        .par_chunks(d)
        .map(|row| row.iter().map(|v| v * v).sum::<TensorFloat>().sqrt())
        .collect();

    let mut y = vec![0.0; x.len()];
    y.par_chunks_mut(d)
        .zip(x.data.par_chunks(d))
        .zip(norms.par_iter())
        .for_each(|((out, row), &n)| {
            let denom = n.max(L2NORM_EPS);
            out.iter_mut().zip(row).for_each(|(o, v)| *o = v / denom);
        });
    let y = Tensor::new(x.shape.clone(), y);

    let y_saved = y.clone();
    let back = move |g: &Ten32| {
        let mut dx = vec![0.0; g.len()];
        dx.par_chunks_mut(d)
            .zip(g.data.par_chunks(d))
            .zip(y_saved.data.par_chunks(d))
            .zip(norms.par_iter())
            .for_each(|(((dx_row, g_row), y_row), &n)| {
                if n > L2NORM_EPS {
                    let dot: TensorFloat = g_row.iter().zip(y_row).map(|(a, b)| a * b).sum();
                    for ((o, &gi), &yi) in dx_row.iter_mut().zip(g_row).zip(y_row) {
                        *o = (gi - yi * dot) / n;
                    }
                } else {
                    for (o, &gi) in dx_row.iter_mut().zip(g_row) {
                        *o = gi / L2NORM_EPS;
                    }
                }
            });
        Tensor::new(y_saved.shape.clone(), dx)
    };

    (y, Box::new(back))
}

/// `x * s` with `s: [d]` broadcast over rows.
pub fn scale(x: &Ten32, s: &Ten32) -> (Ten32, BackFn2) {
    let d = x.last_dim().max(1);

    let mut y = x.data.clone();
    y.par_chunks_mut(d)
        .for_each(|row| row.iter_mut().zip(&s.data).for_each(|(v, si)| *v *= si));
    let y = Tensor::new(x.shape.clone(), y);

    let x = x.clone();
    let s = s.clone();
    let back = move |g: &Ten32| {
        let mut dx = g.data.clone();
        dx.par_chunks_mut(d)
            .for_each(|row| row.iter_mut().zip(&s.data).for_each(|(v, si)| *v *= si));
        let gx: Vec<TensorFloat> = g.data.iter().zip(&x.data).map(|(a, b)| a * b).collect();
        let ds = sum_rows(&gx, d);
        (
            Tensor::new(x.shape.clone(), dx),
            Tensor::new(s.shape.clone(), ds),
        )
    };

    (y, Box::new(back))
}

/// Elementwise `a * b`.
pub fn mul(a: &Ten32, b: &Ten32) -> (Ten32, BackFn2) {
    let y: Vec<TensorFloat> = a.data.par_iter().zip(&b.data).map(|(x, y)| x * y).collect();
    let y = Tensor::new(a.shape.clone(), y);

    let a = a.clone();
    let b = b.clone();
    let back = move |g: &Ten32| {
        let da: Vec<TensorFloat> = g.data.par_iter().zip(&b.data).map(|(gi, bi)| gi * bi).collect();
        let db: Vec<TensorFloat> = g.data.par_iter().zip(&a.data).map(|(gi, ai)| gi * ai).collect();
        (
            Tensor::new(a.shape.clone(), da),
            Tensor::new(b.shape.clone(), db),
        )
    };

    (y, Box::new(back))
}

/// `x * c` for a constant `c`.
pub fn mul_scalar(x: &Ten32, c: TensorFloat) -> (Ten32, BackFn) {
    let y: Vec<TensorFloat> = x.data.par_iter().map(|v| v * c).collect();
    let y = Tensor::new(x.shape.clone(), y);
    let back = move |g: &Ten32| -> Ten32 {
        let dx: Vec<TensorFloat> = g.data.par_iter().map(|v| v * c).collect();
        Tensor::new(g.shape.clone(), dx)
    };
    (y, Box::new(back))
}

/// `a + t * (b - a)` with `t: [d]` broadcast over rows.
pub fn lerp(a: &Ten32, b: &Ten32, t: &Ten32) -> (Ten32, BackFn3) {
    let d = a.last_dim().max(1);

    let mut y = vec![0.0; a.len()];
    y.par_chunks_mut(d)
        .zip(a.data.par_chunks(d).zip(b.data.par_chunks(d)))
        .for_each(|(out, (ar, br))| {
            for (((o, &ai), &bi), &ti) in out.iter_mut().zip(ar).zip(br).zip(&t.data) {
                *o = ai + ti * (bi - ai);
            }
        });
    let y = Tensor::new(a.shape.clone(), y);

    let a = a.clone();
    let b = b.clone();
    let t = t.clone();
    let back = move |g: &Ten32| {
        let mut da = vec![0.0; g.len()];
        let mut db = vec![0.0; g.len()];
        da.par_chunks_mut(d)
            .zip(db.par_chunks_mut(d))
            .zip(g.data.par_chunks(d))
            .for_each(|((da_row, db_row), g_row)| {
                for (((dai, dbi), &gi), &ti) in da_row.iter_mut().zip(db_row.iter_mut()).zip(g_row).zip(&t.data) {
                    *dai = gi * (1.0 - ti);
                    *dbi = gi * ti;
                }
            });
        let g_diff: Vec<TensorFloat> = g
            .data
            .iter()
            .zip(a.data.iter().zip(&b.data))
            .map(|(gi, (ai, bi))| gi * (bi - ai))
            .collect();
        let dt = sum_rows(&g_diff, d);
        (
            Tensor::new(a.shape.clone(), da),
            Tensor::new(b.shape.clone(), db),
            Tensor::new(t.shape.clone(), dt),
        )
    };

    (y, Box::new(back))
}

/// Swish/SiLU: `x * sigmoid(x)`.
pub fn silu(x: &Ten32) -> (Ten32, BackFn) {
    let sig: Vec<TensorFloat> = x.data.par_iter().map(|&v| 1.0 / (1.0 + (-v).exp())).collect();
    let y: Vec<TensorFloat> = x.data.par_iter().zip(&sig).map(|(v, s)| v * s).collect();
    let y = Tensor::new(x.shape.clone(), y);

    let x = x.clone();
    let back = move |g: &Ten32| {
        let dx: Vec<TensorFloat> = g
            .data
            .par_iter()
            .zip(&x.data)
            .zip(&sig)
            .map(|((&gi, &xi), &s)| gi * (s + xi * s * (1.0 - s)))
            .collect();
        Tensor::new(x.shape.clone(), dx)
    };

    (y, Box::new(back))
}

/// `max(0, x)` elementwise.
pub fn relu(x: &Ten32) -> (Ten32, BackFn) {
    let y: Vec<TensorFloat> = x.data.par_iter().map(|&v| v.max(0.0)).collect();
    let y = Tensor::new(x.shape.clone(), y);

    let x = x.clone();
    let back = move |g: &Ten32| {
        let dx: Vec<TensorFloat> = g
            .data
            .par_iter()
            .zip(&x.data)
            .map(|(&gi, &xi)| if xi > 0.0 { gi } else { 0.0 })
            .collect();
        Tensor::new(x.shape.clone(), dx)
    };

    (y, Box::new(back))
}

/// Appends one column holding `value` to the last dimension.
pub fn pad_last(x: &Ten32, value: TensorFloat) -> (Ten32, BackFn) {
    let d = x.last_dim();
    let rows = x.rows();

    let mut y = Vec::with_capacity(rows * (d + 1));
    for row in x.data.chunks(d.max(1)).take(rows) {
        y.extend_from_slice(row);
        y.push(value);
    }
    let y = Tensor::new(x.shape_with_last(d + 1), y);

    let in_shape = x.shape.clone();
    let back = move |g: &Ten32| {
        let mut dx = Vec::with_capacity(rows * d);
        for row in g.data.chunks(d + 1) {
            dx.extend_from_slice(&row[..d]);
        }
        Tensor::new(in_shape.clone(), dx)
    };

    (y, Box::new(back))
}

/// Mean squared error with gradient generator.
pub fn mse_loss(prediction: &Ten32, target: &Ten32) -> (TensorFloat, LossBackFn) {
    let n = prediction.len().max(1) as TensorFloat;
    let diff: Vec<TensorFloat> = prediction.data.iter().zip(&target.data).map(|(p, t)| p - t).collect();
    let loss = diff.iter().map(|d| d * d).sum::<TensorFloat>() / n;

    let shape = prediction.shape.clone();
    let back = move |g: TensorFloat| -> Ten32 {
        Tensor::new(shape.clone(), diff.iter().map(|d| g * 2.0 * d / n).collect())
    };

    (loss, Box::new(back))
}

/// In-place `w -= lr * grad`, then zeroes the gradient.
pub fn sgd(w: &mut WithGrad<Ten32>, lr: TensorFloat) {
    w.value
        .data
        .par_iter_mut()
        .zip(w.grad.data.par_iter_mut())
        .for_each(|(wi, gi)| {
            *wi -= lr * *gi;
            *gi = 0.0;
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matmul_variants_agree() {
        // a: [2, 3], b: [3, 2]
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let nn = matmul_nn(&a, &b, 2, 3, 2);
        assert_eq!(nn, vec![58.0, 64.0, 139.0, 154.0]);

        let bt = Tensor::new(vec![3, 2], b.to_vec()).transpose2d();
        assert_eq!(matmul_nt(&a, &bt.data, 2, 3, 2), nn);

        let at = Tensor::new(vec![2, 3], a.to_vec()).transpose2d();
        assert_eq!(matmul_tn(&at.data, &b, 3, 2, 2), nn);
    }

    #[test]
    fn pad_then_unpad() {
        let x = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let (y, back) = pad_last(&x, 3.0);
        assert_eq!(y.shape, vec![2, 3]);
        assert_eq!(y.data, vec![1.0, 2.0, 3.0, 3.0, 4.0, 3.0]);
        let dx = back(&Tensor::new(vec![2, 3], vec![1.0, 2.0, 9.0, 3.0, 4.0, 9.0]));
        assert_eq!(dx.data, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn zero_row_l2norm_stays_zero() {
        let x = Tensor::new(vec![1, 3], vec![0.0; 3]);
        let (y, _) = l2norm(&x);
        assert_eq!(y.data, vec![0.0; 3]);
    }

    #[test]
    fn zero_row_l2norm_backward_divides_by_eps() {
        let x = Tensor::new(vec![2, 3], vec![0.0, 0.0, 0.0, 3.0, 0.0, 4.0]);
        let (_, back) = l2norm(&x);
        let g = Tensor::new(vec![2, 3], vec![1.0, -2.0, 0.5, 0.0, 0.0, 0.0]);
        let dx = back(&g);
        let expected: Vec<TensorFloat> = g.data[..3].iter().map(|v| v / L2NORM_EPS).collect();
        assert_eq!(&dx.data[..3], expected.as_slice());
        assert_eq!(&dx.data[3..], &[0.0, 0.0, 0.0]);
    }
}
