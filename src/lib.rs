//! recurro: weight-tied recurrent graph neural network layers.
//!
//! A feedforward GNN with k layers aggregates information from at most k hops
//! away. The recurrent formulation ties one set of weights across an unbounded
//! number of "virtual" layers instead: the same parameters update the hidden
//! node state at every step, so information can travel from any distance —
//! one hop per step, as many steps as the caller runs.
//!
//! ```text
//! x^{T+1} = sigma( AGGREGATE({ W x^T_j : (j -> i) in E })  +  phi(u)_i )
//! ```
//!
//! 1. **Message**: each neighbor sends its transformed hidden state, unchanged
//! 2. **Aggregate**: incoming messages are summed per target node
//! 3. **Update**: fuse with the static node-feature embedding, apply the
//!    nonlinearity
//!
//! The hidden state `x` is the recurrent memory (initialized randomly by the
//! caller before the first step); the node features `u` are static input data
//! re-fused at every step. The crate exposes only the single-step transition —
//! the step count and stopping criterion belong to the caller's loop.
//!
//! # Modules
//!
//! - [`conv`]: The message-passing layer ([`RecGNNConv`]) and the
//!   [`MessagePassing`] propagate/aggregate seam
//! - [`model`]: The recurrent model ([`RecurrentGNN`]): layer + prediction head
//! - [`batch`]: Adapting batch containers to the raw-tensor contract
//! - [`dense`]: Linear maps with in-place re-drawable parameters
//! - [`error`]: Error taxonomy
//!
//! # Example: caller-driven recurrence
//!
//! ```rust,ignore
//! use recurro::{RecurrentGNN, RecurrentGNNConfig, StepModel};
//! use candle_core::{Device, Tensor};
//!
//! let device = Device::Cpu;
//! let model = RecurrentGNN::new(&RecurrentGNNConfig::new(16, 64, 4), &device)?;
//!
//! // Random initial state; u and edge_index come from the data.
//! let mut x = Tensor::randn(0f32, 1f32, (num_nodes, 64), &device)?;
//! for _ in 0..steps {
//!     let (x_next, y) = model.forward(&x, &u, &edge_index)?;
//!     x = x_next; // the model is stateless; the caller threads the memory
//! }
//! ```
//!
//! # Reference
//!
//! Gu et al., "Implicit Graph Neural Networks", NeurIPS 2020.

pub mod batch;
pub mod conv;
pub mod dense;
pub mod error;
pub mod model;

pub use batch::{Batch, BatchAdapter, GraphBatch};
pub use conv::{MessagePassing, RecGNNConfig, RecGNNConv};
pub use dense::Dense;
pub use error::{Error, Result};
pub use model::{RecurrentGNN, RecurrentGNNConfig, StepModel};
