use tracing::instrument;

use crate::error::{AutogradError, Result};
use crate::graph::{Graph, NodeId};

/// Mean Squared Error loss: mean((prediction - target)^2)
///
/// Targets enter the graph as constants.
#[instrument(skip_all, fields(n = predictions.len()))]
pub fn mse_loss(graph: &mut Graph, predictions: &[NodeId], targets: &[f64]) -> Result<NodeId> {
    if predictions.len() != targets.len() {
        return Err(AutogradError::shape_mismatch(predictions.len(), targets.len()));
    }
    if predictions.is_empty() {
        return Err(AutogradError::invalid_argument(
            "mse_loss needs at least one prediction",
        ));
    }

    let mut total = graph.constant(0.0);
    for (&prediction, &target) in predictions.iter().zip(targets) {
        let target = graph.constant(target);
        let diff = graph.sub(prediction, target);
        let squared = graph.powf(diff, 2.0);
        total = graph.add(total, squared);
    }

    let scale = graph.constant(1.0 / predictions.len() as f64);
    Ok(graph.mul(total, scale))
}
