//! The weight-tied message-passing layer.
//!
//! A feedforward GNN stacks k layers, each with its own parameters, limiting
//! aggregation to k hops. The recurrent formulation replaces depth with
//! recurrence: a single layer, applied as many times as the caller wants,
//! reusing the same parameters at every step. State from arbitrarily distant
//! nodes can then flow in, one hop per step.
//!
//! One step computes
//!
//! ```text
//! x' = sigma( SUM_{(j -> i) in E} (W x)_j  +  phi(u)_i )
//! ```
//!
//! 1. **Message**: each source node sends its transformed hidden state `(W x)_j`
//!    along the edge, unchanged (identity message)
//! 2. **Aggregate**: incoming messages are summed per target node; no incoming
//!    edges means a zero message
//! 3. **Update**: fuse with the node-feature embedding `phi(u)` and apply the
//!    nonlinearity
//!
//! Sum aggregation is permutation-invariant, which matters because the edge
//! list carries no canonical order.
//!
//! # Reference
//!
//! Gu et al., "Implicit Graph Neural Networks", NeurIPS 2020 (equation 1).

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Activation, Module};

use crate::dense::Dense;
use crate::error::{Error, Result};

/// Configuration for [`RecGNNConv`].
#[derive(Debug, Clone)]
pub struct RecGNNConfig {
    /// Hidden-state channels consumed by the layer.
    pub in_channels: usize,
    /// Channels of the produced hidden state.
    pub out_channels: usize,
    /// Channels of the static per-node features.
    pub node_channels: usize,
    /// Elementwise nonlinearity; `None` leaves the fused state linear
    /// (default: ReLU).
    pub activation: Option<Activation>,
    /// The axis that indexes nodes, for stacked/batched layouts (default: 0).
    pub node_dim: usize,
    /// Bias on the hidden-state transform `W` (default: true).
    pub state_bias: bool,
    /// Bias on the node-feature transform `phi` (default: true).
    pub feature_bias: bool,
}

impl RecGNNConfig {
    /// Configuration with default activation, node axis, and biases.
    pub fn new(in_channels: usize, out_channels: usize, node_channels: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            node_channels,
            activation: Some(Activation::Relu),
            node_dim: 0,
            state_bias: true,
            feature_bias: true,
        }
    }

    pub fn with_activation(mut self, activation: Option<Activation>) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_node_dim(mut self, node_dim: usize) -> Self {
        self.node_dim = node_dim;
        self
    }

    pub fn with_state_bias(mut self, state_bias: bool) -> Self {
        self.state_bias = state_bias;
        self
    }

    pub fn with_feature_bias(mut self, feature_bias: bool) -> Self {
        self.feature_bias = feature_bias;
        self
    }
}

/// Message propagation over an explicit edge list.
///
/// The two halves of the message-passing step, exposed separately so their
/// invariants (shape, permutation invariance, zero in-degree behavior) can be
/// checked on their own. One concrete type implements this; layers compose it
/// rather than inheriting from a message-passing base.
pub trait MessagePassing {
    /// Send one identity message per directed edge and combine them per
    /// target node.
    ///
    /// # Arguments
    /// - `h`: per-node values to propagate, node axis sized `num_nodes`
    /// - `edge_index`: `(2, num_edges)` integer tensor of (source, target)
    ///   pairs, entries in `[0, num_nodes)`
    ///
    /// # Returns
    /// - Summed incoming messages, same shape as `h`
    fn propagate(&self, h: &Tensor, edge_index: &Tensor) -> Result<Tensor>;

    /// Sum per-edge messages into per-node slots.
    ///
    /// # Arguments
    /// - `messages`: one message per edge along the node axis
    /// - `targets`: `(num_edges,)` u32 tensor of target nodes
    /// - `num_nodes`: size of the output's node axis
    ///
    /// # Returns
    /// - Per-node sums; nodes receiving nothing hold zeros
    fn aggregate(&self, messages: &Tensor, targets: &Tensor, num_nodes: usize) -> Result<Tensor>;
}

/// Recurrent graph layer.
///
/// Computes one recurrence step: transform the hidden state, propagate it
/// along the edges, sum per target, fuse with the node-feature embedding,
/// apply the nonlinearity. The parameters (`W`, `phi`) are drawn once at
/// construction and reused verbatim by every subsequent step — the caller
/// threads the hidden state through repeated `forward` calls instead of
/// stacking distinct layers.
///
/// # Reference
///
/// Gu et al., "Implicit Graph Neural Networks", NeurIPS 2020.
#[derive(Debug)]
pub struct RecGNNConv {
    /// Hidden-state transform, named `W` in the paper.
    lin_state: Dense,
    /// Node-feature transform, named `phi` in the paper.
    lin_feature: Dense,
    activation: Option<Activation>,
    node_dim: usize,
}

impl RecGNNConv {
    /// Create a new layer with freshly initialized parameters.
    ///
    /// Fails with [`Error::InvalidConfig`] on zero channel sizes.
    pub fn new(config: &RecGNNConfig, device: &Device) -> Result<Self> {
        if config.in_channels == 0 || config.out_channels == 0 || config.node_channels == 0 {
            return Err(Error::InvalidConfig(format!(
                "channel sizes must be nonzero, got in={}, out={}, node={}",
                config.in_channels, config.out_channels, config.node_channels
            )));
        }
        let lin_state = Dense::new(config.in_channels, config.out_channels, config.state_bias, device)?;
        let lin_feature = Dense::new(
            config.node_channels,
            config.out_channels,
            config.feature_bias,
            device,
        )?;
        Ok(Self {
            lin_state,
            lin_feature,
            activation: config.activation,
            node_dim: config.node_dim,
        })
    }

    /// One recurrence step.
    ///
    /// # Arguments
    /// - `x`: hidden node state, `(num_nodes, in_channels)` with the node axis
    ///   at `node_dim`
    /// - `u`: static node features, `(num_nodes, node_channels)`
    /// - `edge_index`: `(2, num_edges)` integer tensor of (source, target)
    ///   pairs
    ///
    /// # Returns
    /// - The next hidden state, `(num_nodes, out_channels)`
    ///
    /// Shape and index violations fail before any numeric work; parameters are
    /// never written.
    pub fn forward(&self, x: &Tensor, u: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        self.check_inputs(x, u)?;
        let h = self.lin_state.forward(x)?;
        let aggregated = self.propagate(&h, edge_index)?;
        let out = (aggregated + self.lin_feature.forward(u)?)?;
        match self.activation {
            Some(act) => Ok(act.forward(&out)?),
            None => Ok(out),
        }
    }

    /// Redraw `W` and `phi` in place.
    ///
    /// Kaiming-uniform weights (fan-in scaling, suited to ReLU; a recurrent
    /// net is as deep as the caller makes it), bounded-uniform biases where
    /// enabled at construction. Parameter tensor identities are preserved.
    pub fn reset_parameters(&mut self) -> Result<()> {
        self.lin_state.reset()?;
        self.lin_feature.reset()?;
        Ok(())
    }

    /// Hidden-state channels consumed.
    pub fn in_channels(&self) -> usize {
        self.lin_state.in_dim()
    }

    /// Hidden-state channels produced.
    pub fn out_channels(&self) -> usize {
        self.lin_state.out_dim()
    }

    /// Node-feature channels consumed.
    pub fn node_channels(&self) -> usize {
        self.lin_feature.in_dim()
    }

    /// The axis that indexes nodes.
    pub fn node_dim(&self) -> usize {
        self.node_dim
    }

    /// The hidden-state transform `W`.
    pub fn lin_state(&self) -> &Dense {
        &self.lin_state
    }

    /// The node-feature transform `phi`.
    pub fn lin_feature(&self) -> &Dense {
        &self.lin_feature
    }

    /// All learnable parameters, for external optimizers.
    pub fn parameters(&self) -> Vec<Var> {
        let mut vars = self.lin_state.parameters();
        vars.extend(self.lin_feature.parameters());
        vars
    }

    fn check_inputs(&self, x: &Tensor, u: &Tensor) -> Result<()> {
        if x.rank() <= self.node_dim {
            return Err(Error::ShapeMismatch {
                what: "hidden state rank",
                expected: self.node_dim + 1,
                got: x.rank(),
            });
        }
        if u.rank() <= self.node_dim {
            return Err(Error::ShapeMismatch {
                what: "node feature rank",
                expected: self.node_dim + 1,
                got: u.rank(),
            });
        }
        let x_channels = x.dims()[x.rank() - 1];
        if x_channels != self.in_channels() {
            return Err(Error::ShapeMismatch {
                what: "hidden state channels",
                expected: self.in_channels(),
                got: x_channels,
            });
        }
        let u_channels = u.dims()[u.rank() - 1];
        if u_channels != self.node_channels() {
            return Err(Error::ShapeMismatch {
                what: "node feature channels",
                expected: self.node_channels(),
                got: u_channels,
            });
        }
        let num_nodes = x.dims()[self.node_dim];
        let u_nodes = u.dims()[self.node_dim];
        if u_nodes != num_nodes {
            return Err(Error::ShapeMismatch {
                what: "node feature rows",
                expected: num_nodes,
                got: u_nodes,
            });
        }
        Ok(())
    }
}

impl MessagePassing for RecGNNConv {
    fn propagate(&self, h: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        let num_nodes = h.dim(self.node_dim)?;
        let (src, dst) = edge_endpoints(edge_index, num_nodes)?;
        // The sum over an empty message set is zero everywhere.
        if src.is_empty() {
            return Ok(h.zeros_like()?);
        }
        let num_edges = src.len();
        let src = Tensor::from_vec(src, (num_edges,), h.device())?;
        let dst = Tensor::from_vec(dst, (num_edges,), h.device())?;
        // Identity message: the source node's transformed state, unchanged.
        let messages = h.index_select(&src, self.node_dim)?;
        self.aggregate(&messages, &dst, num_nodes)
    }

    fn aggregate(&self, messages: &Tensor, targets: &Tensor, num_nodes: usize) -> Result<Tensor> {
        if messages.rank() <= self.node_dim {
            return Err(Error::ShapeMismatch {
                what: "message rank",
                expected: self.node_dim + 1,
                got: messages.rank(),
            });
        }
        let mut dims = messages.dims().to_vec();
        dims[self.node_dim] = num_nodes;
        let zeros = Tensor::zeros(dims, messages.dtype(), messages.device())?;
        Ok(zeros.index_add(targets, messages, self.node_dim)?)
    }
}

/// Split a `(2, num_edges)` edge-index tensor into validated source and
/// target vectors.
///
/// Accepts any integer dtype; every entry must lie in `[0, num_nodes)`.
fn edge_endpoints(edge_index: &Tensor, num_nodes: usize) -> Result<(Vec<u32>, Vec<u32>)> {
    let dims = edge_index.dims();
    if dims.len() != 2 {
        return Err(Error::ShapeMismatch {
            what: "edge index rank",
            expected: 2,
            got: dims.len(),
        });
    }
    if dims[0] != 2 {
        return Err(Error::ShapeMismatch {
            what: "edge index rows",
            expected: 2,
            got: dims[0],
        });
    }
    let rows = edge_index.to_dtype(DType::I64)?.to_vec2::<i64>()?;
    let mut src = Vec::with_capacity(dims[1]);
    let mut dst = Vec::with_capacity(dims[1]);
    for (row, out) in rows.iter().zip([&mut src, &mut dst]) {
        for &v in row {
            if v < 0 || v as usize >= num_nodes {
                return Err(Error::IndexOutOfRange {
                    index: v,
                    num_nodes,
                });
            }
            out.push(v as u32);
        }
    }
    Ok((src, dst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn conv(in_c: usize, out_c: usize, node_c: usize) -> RecGNNConv {
        RecGNNConv::new(&RecGNNConfig::new(in_c, out_c, node_c), &Device::Cpu).unwrap()
    }

    /// Path graph on three nodes: 0 -> 1 -> 2.
    fn path_edges(device: &Device) -> Tensor {
        Tensor::from_vec(vec![0u32, 1, 1, 2], (2, 2), device).unwrap()
    }

    #[test]
    fn test_forward_shape() {
        let device = Device::Cpu;
        let conv = conv(8, 8, 4);

        let x = Tensor::randn(0f32, 1f32, (5, 8), &device).unwrap();
        let u = Tensor::randn(0f32, 1f32, (5, 4), &device).unwrap();
        let edges = Tensor::from_vec(vec![0u32, 1, 2, 1, 2, 3], (2, 3), &device).unwrap();

        let out = conv.forward(&x, &u, &edges).unwrap();
        assert_eq!(out.dims(), &[5, 8]);
    }

    #[test]
    fn test_sum_aggregation_on_path() {
        let device = Device::Cpu;
        let conv = RecGNNConv::new(
            &RecGNNConfig::new(2, 2, 2)
                .with_activation(None)
                .with_state_bias(false)
                .with_feature_bias(false),
            &device,
        )
        .unwrap();
        let eye = Tensor::eye(2, DType::F32, &device).unwrap();
        conv.lin_state().weight().set(&eye).unwrap();
        conv.lin_feature().weight().set(&eye).unwrap();

        let x = Tensor::from_vec(vec![1f32, 0., 0., 1., 1., 1.], (3, 2), &device).unwrap();
        let u = Tensor::zeros((3, 2), DType::F32, &device).unwrap();

        let out = conv.forward(&x, &u, &path_edges(&device)).unwrap();
        // Node 0 has no incoming edge, node 1 hears node 0, node 2 hears node 1.
        assert_eq!(
            out.to_vec2::<f32>().unwrap(),
            vec![vec![0., 0.], vec![1., 0.], vec![0., 1.]]
        );
    }

    #[test]
    fn test_empty_edge_list_gives_feature_term_only() {
        let device = Device::Cpu;
        let conv = RecGNNConv::new(
            &RecGNNConfig::new(2, 2, 2)
                .with_activation(None)
                .with_state_bias(false)
                .with_feature_bias(false),
            &device,
        )
        .unwrap();
        let eye = Tensor::eye(2, DType::F32, &device).unwrap();
        conv.lin_state().weight().set(&eye).unwrap();
        conv.lin_feature().weight().set(&eye).unwrap();

        let x = Tensor::from_vec(vec![3f32, 4., 5., 6.], (2, 2), &device).unwrap();
        let u = Tensor::from_vec(vec![1f32, 2., 3., 4.], (2, 2), &device).unwrap();
        let edges = Tensor::zeros((2, 0), DType::U32, &device).unwrap();

        // No messages anywhere: out = phi(u) = u.
        let out = conv.forward(&x, &u, &edges).unwrap();
        assert_eq!(
            out.to_vec2::<f32>().unwrap(),
            vec![vec![1., 2.], vec![3., 4.]]
        );
    }

    #[test]
    fn test_relu_clamps_negative_fusion() {
        let device = Device::Cpu;
        let conv = RecGNNConv::new(
            &RecGNNConfig::new(1, 1, 1)
                .with_state_bias(false)
                .with_feature_bias(false),
            &device,
        )
        .unwrap();
        let one = Tensor::from_vec(vec![1f32], (1, 1), &device).unwrap();
        conv.lin_state().weight().set(&one).unwrap();
        conv.lin_feature().weight().set(&one).unwrap();

        let x = Tensor::from_vec(vec![-2f32, 0.], (2, 1), &device).unwrap();
        let u = Tensor::from_vec(vec![0f32, 0.], (2, 1), &device).unwrap();
        let edges = Tensor::from_vec(vec![0u32, 1], (2, 1), &device).unwrap();

        let out = conv.forward(&x, &u, &edges).unwrap();
        // Node 1 receives -2; the default ReLU clamps it to zero.
        assert_eq!(out.to_vec2::<f32>().unwrap(), vec![vec![0.], vec![0.]]);
    }

    #[test]
    fn test_i64_edge_index_accepted() {
        let device = Device::Cpu;
        let conv = conv(4, 4, 2);

        let x = Tensor::randn(0f32, 1f32, (3, 4), &device).unwrap();
        let u = Tensor::randn(0f32, 1f32, (3, 2), &device).unwrap();
        let edges = Tensor::from_vec(vec![0i64, 1, 1, 2], (2, 2), &device).unwrap();

        let out = conv.forward(&x, &u, &edges).unwrap();
        assert_eq!(out.dims(), &[3, 4]);
    }

    #[test]
    fn test_out_of_range_edge_rejected() {
        let device = Device::Cpu;
        let conv = conv(4, 4, 2);

        let x = Tensor::randn(0f32, 1f32, (3, 4), &device).unwrap();
        let u = Tensor::randn(0f32, 1f32, (3, 2), &device).unwrap();
        let edges = Tensor::from_vec(vec![0u32, 1, 1, 3], (2, 2), &device).unwrap();

        match conv.forward(&x, &u, &edges) {
            Err(Error::IndexOutOfRange { index, num_nodes }) => {
                assert_eq!(index, 3);
                assert_eq!(num_nodes, 3);
            }
            other => panic!("expected IndexOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let device = Device::Cpu;
        let conv = conv(4, 4, 2);

        let x = Tensor::randn(0f32, 1f32, (3, 5), &device).unwrap();
        let u = Tensor::randn(0f32, 1f32, (3, 2), &device).unwrap();
        let edges = path_edges(&device);

        match conv.forward(&x, &u, &edges) {
            Err(Error::ShapeMismatch { expected, got, .. }) => {
                assert_eq!(expected, 4);
                assert_eq!(got, 5);
            }
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_node_count_mismatch_rejected() {
        let device = Device::Cpu;
        let conv = conv(4, 4, 2);

        let x = Tensor::randn(0f32, 1f32, (3, 4), &device).unwrap();
        let u = Tensor::randn(0f32, 1f32, (4, 2), &device).unwrap();
        let edges = path_edges(&device);

        assert!(matches!(
            conv.forward(&x, &u, &edges),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_stacked_layout_node_dim_one() {
        let device = Device::Cpu;
        let conv = RecGNNConv::new(&RecGNNConfig::new(4, 4, 2).with_node_dim(1), &device).unwrap();

        // Two stacked graphs over the same edge structure: (batch, nodes, channels).
        let x = Tensor::randn(0f32, 1f32, (2, 3, 4), &device).unwrap();
        let u = Tensor::randn(0f32, 1f32, (2, 3, 2), &device).unwrap();

        let out = conv.forward(&x, &u, &path_edges(&device)).unwrap();
        assert_eq!(out.dims(), &[2, 3, 4]);
    }

    #[test]
    fn test_zero_channels_rejected() {
        assert!(matches!(
            RecGNNConv::new(&RecGNNConfig::new(0, 4, 2), &Device::Cpu),
            Err(Error::InvalidConfig(_))
        ));
    }
}
