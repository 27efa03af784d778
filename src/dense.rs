//! Linear maps with re-drawable parameters.
//!
//! `candle_nn::Linear` owns plain tensors, which is fine for inference but
//! leaves no handle for reinitializing weights in place. [`Dense`] keeps its
//! weight and bias as [`Var`]s instead: the forward pass reads them like any
//! tensor, an external optimizer can step them, and [`Dense::reset`] redraws
//! their values through [`Var::set`] without replacing the tensors themselves.

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::init::{self, Init};

use crate::error::{Error, Result};

/// A learnable affine map `x -> x W^T + b`.
///
/// Weights are initialized with Kaiming-uniform scaling (fan-in, ReLU gain),
/// biases from a bounded uniform distribution — the same policy
/// `candle_nn::linear` applies.
#[derive(Debug, Clone)]
pub struct Dense {
    weight: Var,
    bias: Option<Var>,
}

impl Dense {
    /// Create a new map from `in_dim` to `out_dim`, with or without bias.
    pub fn new(in_dim: usize, out_dim: usize, bias: bool, device: &Device) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "dense map dimensions must be nonzero, got {in_dim} -> {out_dim}"
            )));
        }
        let weight = init::DEFAULT_KAIMING_UNIFORM.var((out_dim, in_dim), DType::F32, device)?;
        let bias = if bias {
            Some(Self::bias_init(in_dim).var((out_dim,), DType::F32, device)?)
        } else {
            None
        };
        Ok(Self { weight, bias })
    }

    fn bias_init(in_dim: usize) -> Init {
        let bound = 1.0 / (in_dim as f64).sqrt();
        Init::Uniform {
            lo: -bound,
            up: bound,
        }
    }

    /// Apply the map. Broadcasts over any leading batch dimensions.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = x.broadcast_matmul(&self.weight.t()?)?;
        match &self.bias {
            Some(bias) => Ok(h.broadcast_add(bias)?),
            None => Ok(h),
        }
    }

    /// Redraw the parameters in place.
    ///
    /// Writes fresh values through [`Var::set`], so the parameter tensors keep
    /// their identity: optimizer references and weight-tied readers observe the
    /// new values without re-registration. Idempotent in the sense that it can
    /// be called any number of times on a valid map.
    pub fn reset(&mut self) -> Result<()> {
        let (out_dim, in_dim) = self.weight.dims2()?;
        let fresh =
            init::DEFAULT_KAIMING_UNIFORM.var((out_dim, in_dim), DType::F32, self.weight.device())?;
        self.weight.set(fresh.as_tensor())?;
        if let Some(bias) = &self.bias {
            let fresh = Self::bias_init(in_dim).var((out_dim,), DType::F32, bias.device())?;
            bias.set(fresh.as_tensor())?;
        }
        Ok(())
    }

    /// Input dimension.
    pub fn in_dim(&self) -> usize {
        self.weight.dims()[1]
    }

    /// Output dimension.
    pub fn out_dim(&self) -> usize {
        self.weight.dims()[0]
    }

    /// Weight matrix, shape `(out_dim, in_dim)`.
    pub fn weight(&self) -> &Var {
        &self.weight
    }

    /// Bias vector, shape `(out_dim,)`, if enabled at construction.
    pub fn bias(&self) -> Option<&Var> {
        self.bias.as_ref()
    }

    /// All learnable parameters, for external optimizers.
    pub fn parameters(&self) -> Vec<Var> {
        let mut vars = vec![self.weight.clone()];
        if let Some(bias) = &self.bias {
            vars.push(bias.clone());
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_shape() {
        let device = Device::Cpu;
        let dense = Dense::new(8, 4, true, &device).unwrap();

        let x = Tensor::randn(0f32, 1f32, (10, 8), &device).unwrap();
        let out = dense.forward(&x).unwrap();
        assert_eq!(out.dims(), &[10, 4]);
    }

    #[test]
    fn test_forward_without_bias() {
        let device = Device::Cpu;
        let dense = Dense::new(3, 3, false, &device).unwrap();
        assert!(dense.bias().is_none());

        // Zero input maps to zero when there is no bias.
        let x = Tensor::zeros((2, 3), DType::F32, &device).unwrap();
        let out = dense.forward(&x).unwrap();
        let vals = out.to_vec2::<f32>().unwrap();
        for row in &vals {
            for &v in row {
                assert_eq!(v, 0.0);
            }
        }
    }

    #[test]
    fn test_zero_dim_rejected() {
        let device = Device::Cpu;
        assert!(matches!(
            Dense::new(0, 4, true, &device),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_reset_redraws_in_place() {
        let device = Device::Cpu;
        let mut dense = Dense::new(16, 16, true, &device).unwrap();

        let id_before = dense.weight().id();
        let before = dense.weight().to_vec2::<f32>().unwrap();
        dense.reset().unwrap();
        let after = dense.weight().to_vec2::<f32>().unwrap();

        // Same tensor identity, fresh values.
        assert_eq!(dense.weight().id(), id_before);
        assert_ne!(before, after);
    }
}
