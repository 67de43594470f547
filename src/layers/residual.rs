use super::{Backward, Module, Param, Parameterized, Scale};
use crate::backprop::{l2norm, lerp};
use crate::tensors::{Ten32, TensorFloat};

/// Residual update on the unit hypersphere.
///
/// ```text
/// out = l2norm(lerp(x, l2norm(f(x)), α))
/// ```
///
/// `α` is a learned per-feature [`Scale`] (effective init `init`, stored
/// magnitude `scale`). The input is expected to be unit-norm already, so the
/// update moves the hidden state along the sphere towards the branch output.
#[derive(Debug, Clone)]
pub struct Residual<F> {
    inner: F,
    branch_scale: Scale,
}

impl<F: Module> Residual<F> {
    /// Wraps `inner`; `scale` defaults to `dim^-0.5`.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(inner: F, dim: usize, init: TensorFloat, scale: Option<TensorFloat>) -> Self {
        let scale = scale.unwrap_or_else(|| (dim as TensorFloat).powf(-0.5));
        Self {
            inner,
            branch_scale: Scale::new(dim, init, scale),
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.inner
    }

    /// Current effective interpolation weights.
    pub fn alpha(&self) -> Ten32 {
        self.branch_scale.value()
    }
}

impl<F: Module> Parameterized for Residual<F> {
    fn parameters(&self) -> Vec<&Param> {
        let mut params = self.inner.parameters();
        params.extend(self.branch_scale.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        let mut params = self.inner.parameters_mut();
        params.extend(self.branch_scale.parameters_mut());
        params
    }
}

impl<F: Module> Module for Residual<F> {
    fn forward(&self, x: &Ten32) -> (Ten32, Backward) {
        let (branch, back_inner) = self.inner.forward(x);
        let (branch, back_branch_norm) = l2norm(&branch);

        let (alpha, back_alpha) = self.branch_scale.forward();
        let (mixed, back_lerp) = lerp(x, &branch, &alpha);
        let (out, back_out_norm) = l2norm(&mixed);

        let back = move |g: &Ten32| {
            let d_mixed = back_out_norm(g);
            let (mut dx, d_branch, d_alpha) = back_lerp(&d_mixed);
            let (dx_inner, mut grads) = back_inner(&back_branch_norm(&d_branch));
            dx.add_assign(&dx_inner);
            grads.push(back_alpha(&d_alpha));
            (dx, grads)
        };

        (out, Box::new(back))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::NFeedforward;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn output_is_unit_norm() {
        let mut rng = StdRng::seed_from_u64(11);
        let ff = NFeedforward::new(8, &mut rng).unwrap();
        let res = Residual::new(ff, 8, 0.5, None);
        let x = l2norm(&Ten32::new(vec![2, 8], (0..16).map(|i| i as f32 - 7.5).collect())).0;
        for n in res.infer(&x).row_norms() {
            assert!((n - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn zero_alpha_is_identity_on_unit_inputs() {
        let mut rng = StdRng::seed_from_u64(12);
        let ff = NFeedforward::new(4, &mut rng).unwrap();
        let res = Residual::new(ff, 4, 0.0, Some(1.0));
        let x = l2norm(&Ten32::new(vec![1, 4], vec![1.0, 2.0, 2.0, 4.0])).0;
        assert!(res.infer(&x).max_abs_diff(&x) < 1e-6);
    }

    #[test]
    fn default_scale_is_inverse_sqrt_dim() {
        let mut rng = StdRng::seed_from_u64(13);
        let ff = NFeedforward::new(16, &mut rng).unwrap();
        let res = Residual::new(ff, 16, 0.1, None);
        let stored = &res.parameters().last().unwrap().value;
        assert!(stored.data.iter().all(|v| (v - 0.25).abs() < 1e-7));
        assert!(res.alpha().data.iter().all(|v| (v - 0.1).abs() < 1e-6));
    }
}
