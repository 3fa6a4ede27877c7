use crate::error::Result;
use crate::graph::{Graph, NodeId};

/// A trainable component whose parameters are plain numbers between steps
///
/// Each step registers the parameters into a fresh [`Graph`] with
/// [`Module::bind`], runs `forward` on the returned ids, and reads the
/// gradients back out by the same ids.
pub trait Module {
    fn parameters(&self) -> Vec<f64>;
    fn parameters_mut(&mut self) -> Vec<&mut f64>;
    fn forward(&self, graph: &mut Graph, params: &[NodeId], inputs: &[NodeId]) -> Result<Vec<NodeId>>;

    fn num_parameters(&self) -> usize {
        self.parameters().len()
    }

    /// Register every parameter as a gradient-tracking leaf, in order
    fn bind(&self, graph: &mut Graph) -> Vec<NodeId> {
        self.parameters().into_iter().map(|p| graph.leaf(p)).collect()
    }
}

pub mod linear;
pub mod loss;
pub mod optim;

pub use linear::*;
pub use loss::*;
pub use optim::*;
