//! Adapting batch containers to the raw-tensor step contract.
//!
//! Batching subsystems hand models an opaque container rather than loose
//! tensors. The contract this crate actually needs from such a container is
//! narrow: three readable fields. [`GraphBatch`] names that capability,
//! [`Batch`] is the obvious owned implementation, and [`BatchAdapter`] turns
//! any [`StepModel`] into a batch-consuming one.

use candle_core::Tensor;

use crate::error::Result;
use crate::model::StepModel;

/// Read-only access to the three tensors a recurrence step consumes.
pub trait GraphBatch {
    /// Hidden node state, `(num_nodes, hidden_channels)`.
    fn node_embedding(&self) -> &Tensor;
    /// Static node features, `(num_nodes, node_channels)`.
    fn node_feature(&self) -> &Tensor;
    /// Directed edges, `(2, num_edges)`.
    fn edge_index(&self) -> &Tensor;
}

/// An owned batch of graph tensors.
#[derive(Debug, Clone)]
pub struct Batch {
    pub node_embedding: Tensor,
    pub node_feature: Tensor,
    pub edge_index: Tensor,
}

impl Batch {
    pub fn new(node_embedding: Tensor, node_feature: Tensor, edge_index: Tensor) -> Self {
        Self {
            node_embedding,
            node_feature,
            edge_index,
        }
    }
}

impl GraphBatch for Batch {
    fn node_embedding(&self) -> &Tensor {
        &self.node_embedding
    }

    fn node_feature(&self) -> &Tensor {
        &self.node_feature
    }

    fn edge_index(&self) -> &Tensor {
        &self.edge_index
    }
}

/// Wraps a step model to accept batch containers instead of raw tensors.
///
/// Pure plumbing: extracts the three fields and forwards. Holds nothing but
/// the wrapped model; reset cascades to it.
#[derive(Debug)]
pub struct BatchAdapter<M> {
    model: M,
}

impl<M: StepModel> BatchAdapter<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Advance one step on the batch's tensors.
    pub fn forward(&self, batch: &impl GraphBatch) -> Result<(Tensor, Tensor)> {
        self.model
            .forward(batch.node_embedding(), batch.node_feature(), batch.edge_index())
    }

    /// Reinitialize the wrapped model's parameters.
    pub fn reset_parameters(&mut self) -> Result<()> {
        self.model.reset_parameters()
    }

    /// The wrapped model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Unwrap the model.
    pub fn into_inner(self) -> M {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RecurrentGNN, RecurrentGNNConfig};
    use candle_core::{DType, Device};

    #[test]
    fn test_adapter_matches_direct_call() {
        let device = Device::Cpu;
        let model = RecurrentGNN::new(&RecurrentGNNConfig::new(2, 2, 2), &device).unwrap();

        let batch = Batch::new(
            Tensor::from_vec(vec![1f32, 1.], (1, 2), &device).unwrap(),
            Tensor::from_vec(vec![2f32, 2.], (1, 2), &device).unwrap(),
            Tensor::zeros((2, 0), DType::U32, &device).unwrap(),
        );

        let (direct_x, direct_y) = model
            .forward(&batch.node_embedding, &batch.node_feature, &batch.edge_index)
            .unwrap();

        let adapter = BatchAdapter::new(model);
        let (x, y) = adapter.forward(&batch).unwrap();

        assert_eq!(
            x.to_vec2::<f32>().unwrap(),
            direct_x.to_vec2::<f32>().unwrap()
        );
        assert_eq!(
            y.to_vec2::<f32>().unwrap(),
            direct_y.to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_reset_cascades() {
        let device = Device::Cpu;
        let model = RecurrentGNN::new(&RecurrentGNNConfig::new(2, 2, 2), &device).unwrap();
        let before = model.conv().lin_state().weight().to_vec2::<f32>().unwrap();

        let mut adapter = BatchAdapter::new(model);
        adapter.reset_parameters().unwrap();

        let after = adapter
            .model()
            .conv()
            .lin_state()
            .weight()
            .to_vec2::<f32>()
            .unwrap();
        assert_ne!(before, after);
    }
}
