use std::fmt;

use tracing::{debug, instrument, trace};

use crate::error::{AutogradError, Result};

/// Index of a node inside its [`Graph`]
///
/// Identity in the graph is the index, never the value: two nodes holding
/// the same number are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// The operation that produced a node, carrying its operands
///
/// The backward engine dispatches on this tag to apply the local derivative
/// rule, so no per-node closure is stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Leaf,
    Add(NodeId, NodeId),
    Mul(NodeId, NodeId),
    Pow(NodeId, f64),
    Relu(NodeId),
    Tanh(NodeId),
    Exp(NodeId),
    Sigmoid(NodeId),
}

impl Op {
    /// Operands in call order, repeats included
    pub fn operands(&self) -> Vec<NodeId> {
        match *self {
            Op::Leaf => Vec::new(),
            Op::Add(lhs, rhs) | Op::Mul(lhs, rhs) => vec![lhs, rhs],
            Op::Pow(base, _) => vec![base],
            Op::Relu(x) | Op::Tanh(x) | Op::Exp(x) | Op::Sigmoid(x) => vec![x],
        }
    }

    /// Human-readable operation name, diagnostic only
    pub fn label(&self) -> String {
        match self {
            Op::Leaf => "leaf".to_string(),
            Op::Add(..) => "+".to_string(),
            Op::Mul(..) => "*".to_string(),
            Op::Pow(_, exponent) => format!("**{}", exponent),
            Op::Relu(_) => "ReLU".to_string(),
            Op::Tanh(_) => "tanh".to_string(),
            Op::Exp(_) => "exp".to_string(),
            Op::Sigmoid(_) => "sigmoid".to_string(),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A single scalar in the computation graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    value: f64,
    grad: f64,
    requires_grad: bool,
    op: Op,
}

impl Node {
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn grad(&self) -> f64 {
        self.grad
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn label(&self) -> String {
        self.op.label()
    }

    /// Direct operands with duplicates removed (`a + a` has one child)
    pub fn children(&self) -> Vec<NodeId> {
        let mut children = self.op.operands();
        children.dedup();
        children
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.op, Op::Leaf)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node(value={}, grad={})", self.value, self.grad)
    }
}

/// Anything usable as an operand: an existing node, or a raw number which
/// becomes a fresh leaf.
pub trait IntoNode {
    fn into_node(self, graph: &mut Graph) -> NodeId;
}

impl IntoNode for NodeId {
    fn into_node(self, _graph: &mut Graph) -> NodeId {
        self
    }
}

impl IntoNode for f64 {
    fn into_node(self, graph: &mut Graph) -> NodeId {
        graph.leaf(self)
    }
}

impl IntoNode for f32 {
    fn into_node(self, graph: &mut Graph) -> NodeId {
        graph.leaf(f64::from(self))
    }
}

impl IntoNode for i32 {
    fn into_node(self, graph: &mut Graph) -> NodeId {
        graph.leaf(f64::from(self))
    }
}

/// Exponent accepted by [`Graph::pow`]
///
/// Only constants are differentiable here; a node-valued exponent is
/// rejected with [`AutogradError::InvalidArgument`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Exponent {
    Const(f64),
    Node(NodeId),
}

impl From<f64> for Exponent {
    fn from(value: f64) -> Self {
        Exponent::Const(value)
    }
}

impl From<f32> for Exponent {
    fn from(value: f32) -> Self {
        Exponent::Const(f64::from(value))
    }
}

impl From<i32> for Exponent {
    fn from(value: i32) -> Self {
        Exponent::Const(f64::from(value))
    }
}

impl From<NodeId> for Exponent {
    fn from(id: NodeId) -> Self {
        Exponent::Node(id)
    }
}

/// Arena holding every node created by a sequence of operations
///
/// Nodes are appended and never removed, so an operand always has a lower
/// index than the node that consumes it.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Graph { nodes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Graph {
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// # Panics
    /// If `id` was not produced by this graph.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn value(&self, id: NodeId) -> f64 {
        self.node(id).value
    }

    pub fn grad(&self, id: NodeId) -> f64 {
        self.node(id).grad
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub(crate) fn push(&mut self, value: f64, op: Op, requires_grad: bool) -> NodeId {
        let id = NodeId(self.nodes.len());
        debug_assert!(op.operands().iter().all(|child| child.0 < id.0));
        self.nodes.push(Node {
            value,
            grad: 0.0,
            requires_grad,
            op,
        });
        id
    }

    /// Create a leaf that accumulates gradients
    pub fn leaf(&mut self, value: f64) -> NodeId {
        self.push(value, Op::Leaf, true)
    }

    /// Create a leaf that is treated as a constant during backward
    pub fn constant(&mut self, value: f64) -> NodeId {
        self.push(value, Op::Leaf, false)
    }

    pub fn leaf_with_grad(&mut self, value: f64, requires_grad: bool) -> NodeId {
        self.push(value, Op::Leaf, requires_grad)
    }

    #[instrument(level = "trace", skip(self, lhs, rhs))]
    pub fn add(&mut self, lhs: impl IntoNode, rhs: impl IntoNode) -> NodeId {
        let lhs = lhs.into_node(self);
        let rhs = rhs.into_node(self);
        let value = self.value(lhs) + self.value(rhs);
        self.push(value, Op::Add(lhs, rhs), true)
    }

    #[instrument(level = "trace", skip(self, lhs, rhs))]
    pub fn mul(&mut self, lhs: impl IntoNode, rhs: impl IntoNode) -> NodeId {
        let lhs = lhs.into_node(self);
        let rhs = rhs.into_node(self);
        let value = self.value(lhs) * self.value(rhs);
        self.push(value, Op::Mul(lhs, rhs), true)
    }

    /// `-x`, built as `x * -1`
    pub fn neg(&mut self, x: impl IntoNode) -> NodeId {
        self.mul(x, -1.0)
    }

    /// `lhs + (-rhs)`
    pub fn sub(&mut self, lhs: impl IntoNode, rhs: impl IntoNode) -> NodeId {
        let lhs = lhs.into_node(self);
        let rhs = rhs.into_node(self);
        let negated = self.neg(rhs);
        self.add(lhs, negated)
    }

    /// `lhs * rhs**-1`
    ///
    /// A zero denominator yields inf or NaN, as IEEE division does.
    pub fn div(&mut self, lhs: impl IntoNode, rhs: impl IntoNode) -> NodeId {
        let lhs = lhs.into_node(self);
        let rhs = rhs.into_node(self);
        let reciprocal = self.powf(rhs, -1.0);
        self.mul(lhs, reciprocal)
    }

    /// Raise `base` to a constant exponent
    #[instrument(level = "trace", skip(self, base))]
    pub fn powf(&mut self, base: impl IntoNode, exponent: f64) -> NodeId {
        let base = base.into_node(self);
        let value = self.value(base).powf(exponent);
        self.push(value, Op::Pow(base, exponent), true)
    }

    /// Raise `base` to `exponent`, which must be a numeric constant
    ///
    /// Node-valued exponents are rejected: the engine only differentiates
    /// with respect to the base.
    pub fn pow(&mut self, base: impl IntoNode, exponent: impl Into<Exponent>) -> Result<NodeId> {
        match exponent.into() {
            Exponent::Const(exponent) => Ok(self.powf(base, exponent)),
            Exponent::Node(id) => Err(AutogradError::invalid_argument(format!(
                "only int/float powers are supported, got node {}",
                id
            ))),
        }
    }

    /// Reset every gradient in the graph to zero
    #[instrument(skip(self), fields(nodes = self.nodes.len()))]
    pub fn zero_grad(&mut self) {
        for node in self.nodes.iter_mut() {
            node.grad = 0.0;
        }
    }

    /// Nodes reachable from `root`, dependencies before dependents
    ///
    /// Depth-first post-order: a node is emitted only after all of its
    /// children. Each node appears exactly once.
    pub fn topological_order(&self, root: NodeId) -> Vec<NodeId> {
        let mut topo = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        // (node, children already scheduled)
        let mut stack = vec![(root, false)];

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                topo.push(id);
                continue;
            }
            if visited[id.0] {
                continue;
            }
            visited[id.0] = true;
            stack.push((id, true));
            for child in self.nodes[id.0].children().into_iter().rev() {
                if !visited[child.0] {
                    stack.push((child, false));
                }
            }
        }

        topo
    }

    /// Backward pass - propagate gradients from `root` to every ancestor
    ///
    /// Gradients accumulate: call [`Graph::zero_grad`] before running a
    /// second pass over the same nodes.
    #[instrument(skip(self, root), fields(root = root.index(), nodes = self.nodes.len()))]
    pub fn backward(&mut self, root: NodeId) {
        let topo = self.topological_order(root);

        self.nodes[root.0].grad = 1.0;

        for &id in topo.iter().rev() {
            self.propagate(id);
        }

        debug!(visited = topo.len(), "backward pass complete");
    }

    /// Apply the local derivative rule of `id` to its operands
    fn propagate(&mut self, id: NodeId) {
        let Node {
            value: out, grad, op, ..
        } = self.nodes[id.0];
        trace!(node = id.index(), op = %op, grad, "propagate");

        match op {
            Op::Leaf => {}
            Op::Add(lhs, rhs) => {
                self.accumulate(lhs, grad);
                self.accumulate(rhs, grad);
            }
            Op::Mul(lhs, rhs) => {
                let x = self.value(lhs);
                let y = self.value(rhs);
                self.accumulate(lhs, y * grad);
                self.accumulate(rhs, x * grad);
            }
            Op::Pow(base, exponent) => {
                let x = self.value(base);
                self.accumulate(base, exponent * x.powf(exponent - 1.0) * grad);
            }
            Op::Relu(x) => {
                // The boundary at zero takes the non-positive branch
                if out > 0.0 {
                    self.accumulate(x, grad);
                }
            }
            Op::Tanh(x) => self.accumulate(x, (1.0 - out * out) * grad),
            Op::Exp(x) => self.accumulate(x, out * grad),
            Op::Sigmoid(x) => self.accumulate(x, out * (1.0 - out) * grad),
        }
    }

    fn accumulate(&mut self, id: NodeId, contribution: f64) {
        let node = &mut self.nodes[id.0];
        if node.requires_grad {
            node.grad += contribution;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    // ========================================================================
    // Node Creation Tests
    // ========================================================================

    #[test]
    fn test_leaf_creation() {
        let mut g = Graph::new();
        let a = g.leaf(2.0);
        let node = g.node(a);
        assert_eq!(node.value(), 2.0);
        assert_eq!(node.grad(), 0.0);
        assert!(node.requires_grad());
        assert!(node.is_leaf());
        assert!(node.children().is_empty());
        assert_eq!(node.label(), "leaf");
    }

    #[test]
    fn test_constant_creation() {
        let mut g = Graph::new();
        let c = g.constant(4.0);
        assert!(!g.node(c).requires_grad());
        let d = g.leaf_with_grad(4.0, false);
        assert_eq!(g.node(c), g.node(d));
        assert_ne!(c, d);
    }

    #[test]
    fn test_node_display() {
        let mut g = Graph::new();
        let a = g.leaf(1.5);
        assert_eq!(g.node(a).to_string(), "Node(value=1.5, grad=0)");
        assert_eq!(a.to_string(), "%0");
    }

    #[test]
    fn test_get_out_of_range() {
        let mut g = Graph::new();
        let a = g.leaf(1.0);
        assert!(g.get(a).is_some());
        assert!(g.get(NodeId(7)).is_none());
    }

    // ========================================================================
    // Forward / Backward Tests
    // ========================================================================

    #[test]
    fn test_add_backward() {
        let mut g = Graph::new();
        let x = g.leaf(2.0);
        let y = g.leaf(3.0);
        let z = g.add(x, y);
        assert_eq!(g.value(z), 5.0);
        assert_eq!(g.node(z).label(), "+");
        g.backward(z);
        assert_eq!(g.grad(x), 1.0);
        assert_eq!(g.grad(y), 1.0);
        assert_eq!(g.grad(z), 1.0);
    }

    #[test]
    fn test_mul_backward() {
        let mut g = Graph::new();
        let a = g.leaf(2.0);
        let b = g.leaf(3.0);
        let c = g.mul(a, b);
        assert_eq!(g.value(c), 6.0);
        g.backward(c);
        assert_eq!(g.grad(a), 3.0);
        assert_eq!(g.grad(b), 2.0);
    }

    #[test]
    fn test_sub_backward() {
        let mut g = Graph::new();
        let x = g.leaf(5.0);
        let y = g.leaf(3.0);
        let z = g.sub(x, y);
        assert_eq!(g.value(z), 2.0);
        g.backward(z);
        assert_eq!(g.grad(x), 1.0);
        assert_eq!(g.grad(y), -1.0);
    }

    #[test]
    fn test_neg_backward() {
        let mut g = Graph::new();
        let x = g.leaf(4.0);
        let y = g.neg(x);
        assert_eq!(g.value(y), -4.0);
        assert_eq!(g.node(y).label(), "*");
        g.backward(y);
        assert_eq!(g.grad(x), -1.0);
    }

    #[test]
    fn test_div_backward() {
        let mut g = Graph::new();
        let x = g.leaf(3.0);
        let y = g.leaf(2.0);
        let z = g.div(x, y);
        assert_eq!(g.value(z), 1.5);
        g.backward(z);
        assert_abs_diff_eq!(g.grad(x), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(g.grad(y), -0.75, epsilon = 1e-12); // -x / y^2
    }

    #[test]
    fn test_div_by_zero_is_not_an_error() {
        let mut g = Graph::new();
        let x = g.leaf(1.0);
        let z = g.div(x, 0.0);
        assert!(g.value(z).is_infinite());
        g.backward(z);
        assert!(g.grad(x).is_infinite());
    }

    #[test]
    fn test_pow_square() {
        let mut g = Graph::new();
        let x = g.leaf(3.0);
        let y = g.pow(x, 2).unwrap();
        assert_eq!(g.value(y), 9.0);
        assert_eq!(g.node(y).label(), "**2");
        g.backward(y);
        assert_eq!(g.grad(x), 6.0);
    }

    #[test]
    fn test_pow_sqrt() {
        let mut g = Graph::new();
        let x = g.leaf(4.0);
        let y = g.pow(x, 0.5).unwrap();
        assert_eq!(g.value(y), 2.0);
        g.backward(y);
        assert_abs_diff_eq!(g.grad(x), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_pow_node_exponent_rejected() {
        let mut g = Graph::new();
        let x = g.leaf(2.0);
        let e = g.leaf(3.0);
        let before = g.len();
        let err = g.pow(x, e).unwrap_err();
        assert!(matches!(err, AutogradError::InvalidArgument(_)));
        assert_eq!(g.len(), before);
    }

    // ========================================================================
    // Graph Structure Tests
    // ========================================================================

    #[test]
    fn test_reflected_add_builds_same_graph() {
        let mut left = Graph::new();
        let a = left.leaf(2.0);
        let l = left.add(a, 3.0);

        let mut right = Graph::new();
        let b = right.leaf(2.0);
        let r = right.add(3.0, b);

        assert_eq!(left.len(), right.len());
        assert_eq!(left.value(l), right.value(r));
        assert_eq!(left.node(l).label(), right.node(r).label());
        left.backward(l);
        right.backward(r);
        assert_eq!(left.grad(a), right.grad(b));
    }

    #[test]
    fn test_reflected_mul_builds_same_graph() {
        let mut left = Graph::new();
        let a = left.leaf(2.0);
        let l = left.mul(a, 5.0);

        let mut right = Graph::new();
        let b = right.leaf(2.0);
        let r = right.mul(5.0, b);

        assert_eq!(left.len(), right.len());
        assert_eq!(left.value(l), right.value(r));
        left.backward(l);
        right.backward(r);
        assert_eq!(left.grad(a), 5.0);
        assert_eq!(right.grad(b), 5.0);
    }

    #[test]
    fn test_children_deduplicated() {
        let mut g = Graph::new();
        let a = g.leaf(1.0);
        let b = g.leaf(1.0);
        let s = g.add(a, a);
        let t = g.add(a, b);
        assert_eq!(g.node(s).children(), vec![a]);
        assert_eq!(g.node(t).children(), vec![a, b]);
    }

    #[test]
    fn test_self_add_accumulates() {
        let mut g = Graph::new();
        let a = g.leaf(3.0);
        let s = g.add(a, a);
        g.backward(s);
        assert_eq!(g.grad(a), 2.0);
    }

    #[test]
    fn test_self_mul_accumulates() {
        let mut g = Graph::new();
        let a = g.leaf(3.0);
        let s = g.mul(a, a);
        g.backward(s);
        assert_eq!(g.grad(a), 6.0);
    }

    #[test]
    fn test_topological_order_diamond() {
        // a feeds b and c, both feed d
        let mut g = Graph::new();
        let a = g.leaf(2.0);
        let b = g.mul(a, 3.0);
        let c = g.add(a, 1.0);
        let d = g.mul(b, c);

        let topo = g.topological_order(d);
        assert_eq!(topo.iter().filter(|&&id| id == a).count(), 1);
        assert_eq!(*topo.last().unwrap(), d);
        let pos = |id: NodeId| topo.iter().position(|&n| n == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(a) < pos(c));
        assert!(pos(b) < pos(d));
        assert!(pos(c) < pos(d));

        g.backward(d);
        // d = 3a * (a + 1), dd/da = 6a + 3
        assert_eq!(g.grad(a), 15.0);
    }

    #[test]
    fn test_topological_order_skips_unreachable() {
        let mut g = Graph::new();
        let a = g.leaf(1.0);
        let unused = g.leaf(9.0);
        let b = g.mul(a, 2.0);
        let topo = g.topological_order(b);
        assert!(!topo.contains(&unused));
        g.backward(b);
        assert_eq!(g.grad(unused), 0.0);
    }

    #[test]
    fn test_backward_on_leaf() {
        let mut g = Graph::new();
        let a = g.leaf(7.0);
        g.backward(a);
        assert_eq!(g.grad(a), 1.0);
        assert_eq!(g.topological_order(a), vec![a]);
    }

    #[test]
    fn test_requires_grad_gating() {
        let mut g = Graph::new();
        let a = g.leaf(2.0);
        let k = g.constant(5.0);
        let prod = g.mul(a, k);
        let out = g.add(prod, k);
        assert_eq!(g.value(out), 15.0);
        g.backward(out);
        assert_eq!(g.grad(k), 0.0);
        assert_eq!(g.grad(a), 5.0);
    }

    #[test]
    fn test_constant_still_traversed() {
        // a non-tracking intermediate does not cut gradient flow to its inputs
        let mut g = Graph::new();
        let a = g.leaf(3.0);
        let sq = g.mul(a, a);
        let k = g.constant(2.0);
        let out = g.mul(sq, k);
        assert!(g.topological_order(out).contains(&a));
        g.backward(out);
        assert_eq!(g.grad(a), 12.0);
    }

    #[test]
    fn test_zero_grad() {
        let mut g = Graph::new();
        let a = g.leaf(1.0);
        let y = g.add(a, a);
        g.backward(y);
        assert_eq!(g.grad(a), 2.0);
        g.zero_grad();
        assert!(g.iter().all(|(_, n)| n.grad() == 0.0));
        g.backward(y);
        assert_eq!(g.grad(a), 2.0);
    }

    #[test]
    fn test_repeated_backward_accumulates_without_reset() {
        let mut g = Graph::new();
        let a = g.leaf(1.0);
        let y = g.mul(a, 3.0);
        g.backward(y);
        g.backward(y);
        assert_eq!(g.grad(a), 6.0);
    }

    #[test]
    fn test_deep_chain_backward() {
        let mut g = Graph::with_capacity(200_002);
        let x = g.leaf(1.0);
        let mut acc = x;
        for _ in 0..100_000 {
            acc = g.add(acc, 0.0);
        }
        g.backward(acc);
        assert_eq!(g.grad(x), 1.0);
    }
}
