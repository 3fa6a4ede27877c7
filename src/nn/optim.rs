use tracing::instrument;

use crate::error::{AutogradError, Result};
use crate::graph::{Graph, NodeId};
use crate::nn::Module;

/// Stochastic Gradient Descent optimizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }

    /// Update parameters using the gradients held in `graph`
    /// Formula: param = param - learning_rate * grad
    ///
    /// `params` must be the ids returned by [`Module::bind`] on this graph.
    #[instrument(skip(self, module, graph, params), fields(num_params = params.len(), lr = self.learning_rate))]
    pub fn step<M: Module + ?Sized>(&self, module: &mut M, graph: &Graph, params: &[NodeId]) -> Result<()> {
        let mut values = module.parameters_mut();
        if values.len() != params.len() {
            return Err(AutogradError::shape_mismatch(values.len(), params.len()));
        }

        values
            .iter_mut()
            .zip(params)
            .for_each(|(p, &id)| {
                **p -= self.learning_rate * graph.grad(id);
            });
        Ok(())
    }
}
