use super::{Param, Parameterized};
use crate::ops::BackFn;
use crate::tensors::{Ten32, TensorFloat};

/// A learned per-feature scale.
///
/// The stored parameter starts at `scale` and is multiplied by
/// `init / scale` on every read, so the effective value starts at `init`
/// while the optimizer sees a parameter of magnitude `scale`. Choosing a
/// small `scale` raises the effective learning rate of this vector relative
/// to the rest of the network.
#[derive(Debug, Clone)]
pub struct Scale {
    dim: usize,
    forward_scale: TensorFloat,
    param: Param,
}

impl Scale {
    /// # Panics
    /// Panics if `scale` is zero.
    pub fn new(dim: usize, init: TensorFloat, scale: TensorFloat) -> Self {
        assert!(scale != 0.0, "scale must be non-zero");
        Self {
            dim,
            forward_scale: init / scale,
            param: Param::new(Ten32::full(vec![dim], scale)),
        }
    }

    /// `Scale::new(dim, 1.0, 1.0)`.
    pub fn unit(dim: usize) -> Self {
        Self::new(dim, 1.0, 1.0)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Effective scale vector, shape `[dim]`.
    pub fn value(&self) -> Ten32 {
        let c = self.forward_scale;
        Ten32::new(
            vec![self.dim],
            self.param.value.data.iter().map(|v| v * c).collect(),
        )
    }

    /// Effective scale plus the map from its gradient to the parameter's.
    pub fn forward(&self) -> (Ten32, BackFn) {
        let c = self.forward_scale;
        let back = move |g: &Ten32| -> Ten32 {
            Ten32::new(g.shape.clone(), g.data.iter().map(|v| v * c).collect())
        };
        (self.value(), Box::new(back))
    }
}

impl Parameterized for Scale {
    fn parameters(&self) -> Vec<&Param> {
        vec![&self.param]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.param]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_value_starts_at_init() {
        let s = Scale::new(3, 0.05, 0.25);
        assert_eq!(s.parameters()[0].value.data, vec![0.25; 3]);
        for v in s.value().data {
            assert!((v - 0.05).abs() < 1e-7);
        }
    }

    #[test]
    fn gradient_is_rescaled() {
        let s = Scale::new(2, 2.0, 0.5);
        let (_, back) = s.forward();
        let g = back(&Ten32::new(vec![2], vec![1.0, -1.0]));
        assert_eq!(g.data, vec![4.0, -4.0]);
    }
}
