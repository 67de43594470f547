use super::{Backward, Module, Param, Parameterized, uniform_init};
use crate::backprop::{linear, linear_bias};
use crate::tensors::Ten32;

/// Fully connected layer: `x @ wᵀ (+ b)`.
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Param,
    bias: Option<Param>,
}

impl Linear {
    /// `dim -> dim_out`, weights and bias uniform in `±1/√dim`.
    pub fn new(dim: usize, dim_out: usize, bias: bool, rng: &mut impl rand::Rng) -> Self {
        let weight = Param::new(uniform_init(vec![dim_out, dim], dim, rng));
        let bias = bias.then(|| Param::new(uniform_init(vec![dim_out], dim, rng)));
        Self { weight, bias }
    }

    pub fn dim(&self) -> usize {
        self.weight.value.shape[1]
    }

    pub fn dim_out(&self) -> usize {
        self.weight.value.shape[0]
    }

    pub fn has_bias(&self) -> bool {
        self.bias.is_some()
    }
}

impl Parameterized for Linear {
    fn parameters(&self) -> Vec<&Param> {
        std::iter::once(&self.weight).chain(self.bias.as_ref()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        std::iter::once(&mut self.weight).chain(self.bias.as_mut()).collect()
    }
}

impl Module for Linear {
    fn forward(&self, x: &Ten32) -> (Ten32, Backward) {
        match &self.bias {
            Some(b) => {
                let (y, back) = linear_bias(x, &self.weight.value, &b.value);
                let back = move |g: &Ten32| {
                    let (dx, dw, db) = back(g);
                    (dx, vec![dw, db])
                };
                (y, Box::new(back))
            }
            None => {
                let (y, back) = linear(x, &self.weight.value);
                let back = move |g: &Ten32| {
                    let (dx, dw) = back(g);
                    (dx, vec![dw])
                };
                (y, Box::new(back))
            }
        }
    }
}
