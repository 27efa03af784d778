//! The recurrent model: weight-tied layer plus prediction head.
//!
//! The model owns the parameters; the caller owns the loop. Each call to
//! [`RecurrentGNN::forward`] performs exactly one recurrence step and hands
//! the new hidden state back, so step count and stopping criteria stay with
//! the training loop. Between calls the model holds no per-step state —
//! every step reads the same tied parameters.

use candle_core::{Device, Tensor, Var};
use candle_nn::Activation;

use crate::conv::{RecGNNConfig, RecGNNConv};
use crate::dense::Dense;
use crate::error::{Error, Result};

/// A model advancing one recurrence step.
///
/// Abstracts at the model level, not the tensor level: implementations own
/// their parameters and expose only the step transition, so wrappers (such as
/// [`crate::batch::BatchAdapter`]) stay generic without tensor-trait bounds.
pub trait StepModel {
    /// Advance one step: `(x, u, edge_index) -> (x', y)`.
    fn forward(&self, x: &Tensor, u: &Tensor, edge_index: &Tensor) -> Result<(Tensor, Tensor)>;

    /// Reinitialize all owned parameters in place.
    fn reset_parameters(&mut self) -> Result<()>;
}

/// Configuration for [`RecurrentGNN`].
#[derive(Debug, Clone)]
pub struct RecurrentGNNConfig {
    /// Channels of the static per-node features.
    pub node_channels: usize,
    /// Channels of the hidden state carried across steps.
    pub hidden_channels: usize,
    /// Channels of the per-step prediction.
    pub prediction_channels: usize,
    /// Layer nonlinearity; `None` for identity (default: ReLU).
    pub activation: Option<Activation>,
    /// The axis that indexes nodes (default: 0).
    pub node_dim: usize,
    /// Bias on the layer's hidden-state transform (default: true).
    pub state_bias: bool,
    /// Bias on the layer's node-feature transform (default: true).
    pub feature_bias: bool,
}

impl RecurrentGNNConfig {
    /// Configuration with default activation, node axis, and biases.
    pub fn new(node_channels: usize, hidden_channels: usize, prediction_channels: usize) -> Self {
        Self {
            node_channels,
            hidden_channels,
            prediction_channels,
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

/// Recurrent graph neural network.
///
/// One [`RecGNNConv`] updates the hidden state; a linear head (no activation)
/// reads a prediction off the new state. The layer's input and output widths
/// both equal `hidden_channels` so the produced state feeds straight back in
/// as the next step's input.
///
/// When training, initialize a random state per node before the first step;
/// repeated application converges it toward a useful embedding.
///
/// # Reference
///
/// Gu et al., "Implicit Graph Neural Networks", NeurIPS 2020.
#[derive(Debug)]
pub struct RecurrentGNN {
    conv: RecGNNConv,
    head: Dense,
}

impl RecurrentGNN {
    /// Build the layer and head from a configuration.
    pub fn new(config: &RecurrentGNNConfig, device: &Device) -> Result<Self> {
        let conv_config = RecGNNConfig::new(
            config.hidden_channels,
            config.hidden_channels,
            config.node_channels,
        )
        .with_activation(config.activation)
        .with_node_dim(config.node_dim)
        .with_state_bias(config.state_bias)
        .with_feature_bias(config.feature_bias);
        let conv = RecGNNConv::new(&conv_config, device)?;
        Self::from_parts(conv, config.hidden_channels, config.prediction_channels, device)
    }

    /// Wrap a pre-built layer.
    ///
    /// The layer must consume and produce `hidden_channels`-wide states;
    /// anything else is rejected here, before any forward call, with
    /// [`Error::InvalidConfig`].
    pub fn from_parts(
        conv: RecGNNConv,
        hidden_channels: usize,
        prediction_channels: usize,
        device: &Device,
    ) -> Result<Self> {
        if conv.out_channels() != hidden_channels {
            return Err(Error::InvalidConfig(format!(
                "layer produces {}-channel states but the model carries {} hidden channels",
                conv.out_channels(),
                hidden_channels
            )));
        }
        if conv.in_channels() != hidden_channels {
            return Err(Error::InvalidConfig(format!(
                "layer consumes {}-channel states but the model carries {} hidden channels",
                conv.in_channels(),
                hidden_channels
            )));
        }
        let head = Dense::new(hidden_channels, prediction_channels, true, device)?;
        Ok(Self { conv, head })
    }

    /// The message-passing layer.
    pub fn conv(&self) -> &RecGNNConv {
        &self.conv
    }

    /// The prediction head.
    pub fn head(&self) -> &Dense {
        &self.head
    }

    /// Hidden-state channels carried across steps.
    pub fn hidden_channels(&self) -> usize {
        self.conv.out_channels()
    }

    /// Prediction channels emitted per step.
    pub fn prediction_channels(&self) -> usize {
        self.head.out_dim()
    }

    /// All learnable parameters, for external optimizers.
    pub fn parameters(&self) -> Vec<Var> {
        let mut vars = self.conv.parameters();
        vars.extend(self.head.parameters());
        vars
    }
}

impl StepModel for RecurrentGNN {
    /// One step: update the hidden state, then read the prediction.
    ///
    /// # Arguments
    /// - `x`: hidden node state at step T, `(num_nodes, hidden_channels)`
    /// - `u`: static node features, `(num_nodes, node_channels)`
    /// - `edge_index`: `(2, num_edges)` integer (source, target) pairs
    ///
    /// # Returns
    /// - `(x', y)`: the state at step T+1, to be fed back in by the caller,
    ///   and the step's prediction `(num_nodes, prediction_channels)`
    fn forward(&self, x: &Tensor, u: &Tensor, edge_index: &Tensor) -> Result<(Tensor, Tensor)> {
        let x = self.conv.forward(x, u, edge_index)?;
        let y = self.head.forward(&x)?;
        Ok((x, y))
    }

    /// Reinitialize the layer, then the head.
    fn reset_parameters(&mut self) -> Result<()> {
        self.conv.reset_parameters()?;
        self.head.reset()?;
        Ok(())
    }
}
