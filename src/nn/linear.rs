use rand::distributions::Uniform;
use rand::prelude::Distribution;
use rand::Rng;
use tracing::instrument;

use crate::error::{AutogradError, Result};
use crate::graph::{Graph, NodeId};
use crate::nn::Module;

/// Nonlinearity applied to a neuron's pre-activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
}

impl Activation {
    pub fn apply(self, graph: &mut Graph, x: NodeId) -> NodeId {
        match self {
            Activation::Linear => x,
            Activation::Relu => graph.relu(x),
            Activation::Tanh => graph.tanh(x),
        }
    }
}

/// Single neuron: act(b + sum(w_i * x_i))
#[derive(Debug, Clone)]
pub struct Neuron {
    weights: Vec<f64>,
    bias: f64,
    activation: Activation,
}

impl Neuron {
    /// Create a neuron with scaled uniform weights and a zero bias
    pub fn new<R: Rng + ?Sized>(nin: usize, activation: Activation, rng: &mut R) -> Self {
        let uniform = Uniform::new_inclusive(-1.0, 1.0);
        // Xavier-style scale: sqrt(2.0 / nin)
        let scale = (2.0 / nin.max(1) as f64).sqrt();
        let weights = (0..nin).map(|_| uniform.sample(rng) * scale).collect();

        Neuron {
            weights,
            bias: 0.0,
            activation,
        }
    }

    pub fn from_weights(weights: Vec<f64>, bias: f64, activation: Activation) -> Self {
        Neuron {
            weights,
            bias,
            activation,
        }
    }

    pub fn nin(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    fn activate(&self, graph: &mut Graph, params: &[NodeId], inputs: &[NodeId]) -> Result<NodeId> {
        check_len(inputs.len(), self.nin())?;
        check_len(params.len(), self.nin() + 1)?;

        let mut acc = params[self.nin()];
        for (&w, &x) in params[..self.nin()].iter().zip(inputs) {
            let term = graph.mul(w, x);
            acc = graph.add(acc, term);
        }

        Ok(self.activation.apply(graph, acc))
    }
}

impl Module for Neuron {
    /// Weights first, bias last
    fn parameters(&self) -> Vec<f64> {
        let mut params = self.weights.clone();
        params.push(self.bias);
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut f64> {
        let mut params: Vec<&mut f64> = self.weights.iter_mut().collect();
        params.push(&mut self.bias);
        params
    }

    fn num_parameters(&self) -> usize {
        self.nin() + 1
    }

    fn forward(&self, graph: &mut Graph, params: &[NodeId], inputs: &[NodeId]) -> Result<Vec<NodeId>> {
        Ok(vec![self.activate(graph, params, inputs)?])
    }
}

/// Fully-connected layer of independent neurons sharing the same inputs
#[derive(Debug, Clone)]
pub struct Dense {
    neurons: Vec<Neuron>,
    nin: usize,
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(nin: usize, nout: usize, activation: Activation, rng: &mut R) -> Self {
        let neurons = (0..nout).map(|_| Neuron::new(nin, activation, rng)).collect();
        Dense { neurons, nin }
    }

    /// Build a layer from explicit neurons
    ///
    /// # Errors
    /// `ShapeMismatch` if the neurons disagree on their input width.
    pub fn from_neurons(neurons: Vec<Neuron>) -> Result<Self> {
        let nin = neurons.first().map(Neuron::nin).unwrap_or(0);
        if let Some(bad) = neurons.iter().find(|n| n.nin() != nin) {
            return Err(AutogradError::shape_mismatch(nin, bad.nin()));
        }
        Ok(Dense { neurons, nin })
    }

    pub fn nin(&self) -> usize {
        self.nin
    }

    pub fn nout(&self) -> usize {
        self.neurons.len()
    }

    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }
}

impl Module for Dense {
    fn parameters(&self) -> Vec<f64> {
        self.neurons.iter().flat_map(|n| n.parameters()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut f64> {
        self.neurons
            .iter_mut()
            .flat_map(|n| n.parameters_mut())
            .collect()
    }

    fn num_parameters(&self) -> usize {
        self.neurons.len() * (self.nin + 1)
    }

    fn forward(&self, graph: &mut Graph, params: &[NodeId], inputs: &[NodeId]) -> Result<Vec<NodeId>> {
        check_len(params.len(), self.num_parameters())?;
        self.neurons
            .iter()
            .zip(params.chunks(self.nin + 1))
            .map(|(neuron, chunk)| neuron.activate(graph, chunk, inputs))
            .collect()
    }
}

/// Multi-layer perceptron; hidden layers share one activation, the output
/// layer is linear
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Dense>,
}

impl Mlp {
    pub fn new<R: Rng + ?Sized>(
        nin: usize,
        sizes: &[usize],
        hidden_activation: Activation,
        rng: &mut R,
    ) -> Self {
        let mut layers = Vec::with_capacity(sizes.len());
        let mut width = nin;
        for (i, &nout) in sizes.iter().enumerate() {
            let activation = if i + 1 == sizes.len() {
                Activation::Linear
            } else {
                hidden_activation
            };
            layers.push(Dense::new(width, nout, activation, rng));
            width = nout;
        }
        Mlp { layers }
    }

    /// # Errors
    /// `ShapeMismatch` if consecutive layers do not line up.
    pub fn from_layers(layers: Vec<Dense>) -> Result<Self> {
        for pair in layers.windows(2) {
            if pair[0].nout() != pair[1].nin() {
                return Err(AutogradError::shape_mismatch(pair[0].nout(), pair[1].nin()));
            }
        }
        Ok(Mlp { layers })
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub fn nin(&self) -> usize {
        self.layers.first().map(Dense::nin).unwrap_or(0)
    }

    pub fn nout(&self) -> usize {
        self.layers.last().map(Dense::nout).unwrap_or(0)
    }
}

impl Module for Mlp {
    fn parameters(&self) -> Vec<f64> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut f64> {
        self.layers
            .iter_mut()
            .flat_map(|l| l.parameters_mut())
            .collect()
    }

    fn num_parameters(&self) -> usize {
        self.layers.iter().map(Dense::num_parameters).sum()
    }

    #[instrument(skip_all, fields(layers = self.layers.len(), inputs = inputs.len()))]
    fn forward(&self, graph: &mut Graph, params: &[NodeId], inputs: &[NodeId]) -> Result<Vec<NodeId>> {
        check_len(params.len(), self.num_parameters())?;

        let mut activations = inputs.to_vec();
        let mut offset = 0;
        for layer in &self.layers {
            let count = layer.num_parameters();
            activations = layer.forward(graph, &params[offset..offset + count], &activations)?;
            offset += count;
        }
        Ok(activations)
    }
}

fn check_len(got: usize, expected: usize) -> Result<()> {
    if got == expected {
        Ok(())
    } else {
        Err(AutogradError::shape_mismatch(expected, got))
    }
}
