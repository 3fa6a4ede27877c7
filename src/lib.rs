//! A minimal reverse-mode automatic differentiation engine over scalars
//!
//! Arithmetic on graph nodes records a dynamic computation graph as it is
//! evaluated; `Graph::backward` then fills in the gradient of a chosen output
//! with respect to every node it depends on. A small neural-network kit and
//! training loop are built on top.

pub mod error;
pub mod graph;
pub mod nn;
pub mod train;

// Re-export commonly used types for convenience
pub use error::{AutogradError, Result};
pub use graph::{Exponent, Graph, IntoNode, Node, NodeId, Op};
pub use nn::*;
pub use train::{fit, predict, TrainConfig};
