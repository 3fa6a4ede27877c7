//! Activation functions
//!
//! Unary transforms on a single node. The derivative of each is expressed
//! through the forward output, so backward only needs the stored value.

use tracing::instrument;

use super::core::{Graph, IntoNode, NodeId, Op};

impl Graph {
    /// ReLU activation: `x` if `x > 0`, else `0`
    #[instrument(level = "trace", skip(self, x))]
    pub fn relu(&mut self, x: impl IntoNode) -> NodeId {
        let x = x.into_node(self);
        let input = self.value(x);
        let value = if input > 0.0 { input } else { 0.0 };
        self.push(value, Op::Relu(x), true)
    }

    /// Hyperbolic tangent: `(e^2x - 1) / (e^2x + 1)`
    #[instrument(level = "trace", skip(self, x))]
    pub fn tanh(&mut self, x: impl IntoNode) -> NodeId {
        let x = x.into_node(self);
        let value = self.value(x).tanh();
        self.push(value, Op::Tanh(x), true)
    }

    /// Exponential: `e^x`
    #[instrument(level = "trace", skip(self, x))]
    pub fn exp(&mut self, x: impl IntoNode) -> NodeId {
        let x = x.into_node(self);
        let value = self.value(x).exp();
        self.push(value, Op::Exp(x), true)
    }

    /// Sigmoid activation: `1 / (1 + e^-x)`
    #[instrument(level = "trace", skip(self, x))]
    pub fn sigmoid(&mut self, x: impl IntoNode) -> NodeId {
        let x = x.into_node(self);
        let value = 1.0 / (1.0 + (-self.value(x)).exp());
        self.push(value, Op::Sigmoid(x), true)
    }
}
