//! Full-batch training loop for [`Module`]s
//!
//! Every epoch builds a fresh graph: parameters are bound as leaves, all rows
//! are pushed through the model, the MSE over the batch is backpropagated and
//! an SGD step writes the new values back into the model.

use tracing::{debug, info, instrument};

use crate::error::{AutogradError, Result};
use crate::graph::{Graph, NodeId};
use crate::nn::{mse_loss, Module, Sgd};

/// Hyperparameters for [`fit`]
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    /// Widths of the hidden layers of the model being trained
    pub hidden_sizes: Vec<usize>,
    pub seed: u64,
    /// Log the loss every `log_every` epochs; 0 disables progress logs
    pub log_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            learning_rate: 0.05,
            epochs: 200,
            hidden_sizes: vec![8, 8],
            seed: 42,
            log_every: 20,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(AutogradError::ConfigError(format!(
                "learning_rate must be a positive finite number, got {}",
                self.learning_rate
            )));
        }
        if self.epochs == 0 {
            return Err(AutogradError::ConfigError(
                "epochs must be at least 1".to_string(),
            ));
        }
        if let Some(i) = self.hidden_sizes.iter().position(|&w| w == 0) {
            return Err(AutogradError::ConfigError(format!(
                "hidden layer {} has zero width",
                i
            )));
        }
        Ok(())
    }
}

/// Train `model` on `(inputs[i], targets[i])` pairs, returning the loss of
/// each epoch (measured before that epoch's update)
#[instrument(skip_all, fields(rows = inputs.len(), epochs = config.epochs, lr = config.learning_rate))]
pub fn fit<M: Module + ?Sized>(
    model: &mut M,
    inputs: &[Vec<f64>],
    targets: &[f64],
    config: &TrainConfig,
) -> Result<Vec<f64>> {
    config.validate()?;
    if inputs.len() != targets.len() {
        return Err(AutogradError::shape_mismatch(inputs.len(), targets.len()));
    }

    let optimizer = Sgd::new(config.learning_rate);
    let mut losses = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        let mut graph = Graph::new();
        let params = model.bind(&mut graph);

        let mut predictions = Vec::with_capacity(inputs.len());
        for row in inputs {
            let x = constants(&mut graph, row);
            predictions.push(first_output(model.forward(&mut graph, &params, &x)?)?);
        }

        let loss = mse_loss(&mut graph, &predictions, targets)?;
        graph.backward(loss);
        optimizer.step(model, &graph, &params)?;

        let loss_value = graph.value(loss);
        debug!(epoch, loss = loss_value, nodes = graph.len(), "epoch done");
        if config.log_every > 0 && (epoch + 1) % config.log_every == 0 {
            info!(epoch = epoch + 1, loss = loss_value, "training progress");
        }
        losses.push(loss_value);
    }

    Ok(losses)
}

/// Run one row through `model` and return its first output
pub fn predict<M: Module + ?Sized>(model: &M, input: &[f64]) -> Result<f64> {
    let mut graph = Graph::new();
    let params = model.bind(&mut graph);
    let x = constants(&mut graph, input);
    let out = first_output(model.forward(&mut graph, &params, &x)?)?;
    Ok(graph.value(out))
}

fn constants(graph: &mut Graph, row: &[f64]) -> Vec<NodeId> {
    row.iter().map(|&v| graph.constant(v)).collect()
}

fn first_output(outputs: Vec<NodeId>) -> Result<NodeId> {
    outputs
        .first()
        .copied()
        .ok_or_else(|| AutogradError::invalid_argument("model produced no outputs"))
}
