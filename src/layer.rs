use rand::Rng;
use rand::distributions::Distribution;

use crate::node::unit_interval;
use crate::{Activation, Error, Init, Node, Result, rng};

/// A set of nodes sharing one activation and one input dimension.
///
/// Equivalent to a weight matrix with shape `(out_dim, in_dim)`: row `o` is the
/// weight vector of node `o`.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    in_dim: usize,
    nodes: Vec<Node>,
    activation: Activation,
}

impl Layer {
    /// Build a layer drawing random weights from the process-wide source.
    pub fn new(in_dim: usize, out_dim: usize, activation: Activation, init: Init) -> Result<Self> {
        rng::with_rng(|r| Self::new_with_rng(in_dim, out_dim, activation, init, r))
    }

    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        activation: Activation,
        init: Init,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        activation.validate()?;
        init.validate()?;

        let mut nodes = Vec::with_capacity(out_dim);
        for _ in 0..out_dim {
            let mut weights = vec![0.0; in_dim];
            init.fill(&mut weights, in_dim, out_dim, rng);
            nodes.push(Node::from_weights(weights)?);
        }

        Ok(Self {
            in_dim,
            nodes,
            activation,
        })
    }

    /// Build a layer from a `(out_dim, in_dim)` weight matrix.
    pub fn from_weights(weights: &[Vec<f32>], activation: Activation) -> Result<Self> {
        activation.validate()?;
        let in_dim = weights.first().map(Vec::len).unwrap_or(0);
        if in_dim == 0 {
            return Err(Error::ShapeMismatch(
                "layer weights must have at least one non-empty row".to_owned(),
            ));
        }
        if let Some((o, row)) = weights.iter().enumerate().find(|(_, row)| row.len() != in_dim) {
            return Err(Error::ShapeMismatch(format!(
                "weight row {o} has len {}, expected {in_dim}",
                row.len()
            )));
        }

        let nodes = weights
            .iter()
            .map(|row| Node::from_weights(row.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            in_dim,
            nodes,
            activation,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Activated output of every node for one input (bias slot included).
    pub fn output_after_activation(&self, input: &[f32]) -> Result<Vec<f32>> {
        if input.len() != self.in_dim {
            return Err(Error::ShapeMismatch(format!(
                "layer input len {} does not match in_dim {}",
                input.len(),
                self.in_dim
            )));
        }
        Ok(self
            .nodes
            .iter()
            .map(|node| self.activation.forward(node.weighted_sum(input)))
            .collect())
    }

    /// Forward pass for a single sample, keeping pre-activations for backprop.
    ///
    /// Shape contract:
    /// - `input.len() == self.in_dim()`
    /// - `pre.len() == outputs.len() == self.out_dim()`
    #[inline]
    pub(crate) fn forward(&self, input: &[f32], pre: &mut [f32], outputs: &mut [f32]) {
        debug_assert_eq!(input.len(), self.in_dim);
        debug_assert_eq!(pre.len(), self.nodes.len());
        debug_assert_eq!(outputs.len(), self.nodes.len());

        for (o, node) in self.nodes.iter().enumerate() {
            let z = node.weighted_sum(input);
            pre[o] = z;
            outputs[o] = self.activation.forward(z);
        }
    }

    /// Backward pass for a single sample.
    ///
    /// - `d_weights` (row-major, `out_dim * in_dim`) is accumulated into.
    /// - `d_inputs`, when given, is overwritten with `dL/d(inputs)` computed
    ///   through the current (pre-update) weights.
    #[inline]
    pub(crate) fn backward(
        &self,
        inputs: &[f32],
        pre: &[f32],
        d_outputs: &[f32],
        mut d_inputs: Option<&mut [f32]>,
        d_weights: &mut [f32],
    ) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(pre.len(), self.nodes.len());
        debug_assert_eq!(d_outputs.len(), self.nodes.len());
        debug_assert_eq!(d_weights.len(), self.nodes.len() * self.in_dim);

        if let Some(d_in) = d_inputs.as_deref_mut() {
            debug_assert_eq!(d_in.len(), self.in_dim);
            d_in.fill(0.0);
        }

        for (o, node) in self.nodes.iter().enumerate() {
            let d_z = d_outputs[o] * self.activation.derivative(pre[o]);
            let row = o * self.in_dim;
            for (i, &w) in node.weights().iter().enumerate() {
                d_weights[row + i] = d_z.mul_add(inputs[i], d_weights[row + i]);
                if let Some(d_in) = d_inputs.as_deref_mut() {
                    d_in[i] = w.mul_add(d_z, d_in[i]);
                }
            }
        }
    }

    /// `w -= scale * d_weights`.
    pub(crate) fn descend(&mut self, d_weights: &[f32], scale: f32) {
        debug_assert_eq!(d_weights.len(), self.nodes.len() * self.in_dim);

        for (node, grad) in self.nodes.iter_mut().zip(d_weights.chunks_exact(self.in_dim)) {
            for (w, &g) in node.weights_mut().iter_mut().zip(grad) {
                *w -= scale * g;
            }
        }
    }

    /// Copy of the weight matrix, one row per node.
    pub fn weights(&self) -> Vec<Vec<f32>> {
        self.nodes.iter().map(|n| n.weights().to_vec()).collect()
    }

    /// Validate a replacement weight matrix against this layer's topology.
    pub fn check_weights(&self, weights: &[Vec<f32>]) -> Result<()> {
        if weights.len() != self.nodes.len() {
            return Err(Error::ShapeMismatch(format!(
                "weight matrix has {} rows, layer has {} nodes",
                weights.len(),
                self.nodes.len()
            )));
        }
        for (o, row) in weights.iter().enumerate() {
            if row.len() != self.in_dim {
                return Err(Error::ShapeMismatch(format!(
                    "weight row {o} has len {}, layer in_dim is {}",
                    row.len(),
                    self.in_dim
                )));
            }
        }
        Ok(())
    }

    /// Replace the weight matrix. Nothing changes when the shape disagrees.
    pub fn set_weights(&mut self, weights: &[Vec<f32>]) -> Result<()> {
        self.check_weights(weights)?;
        for (node, row) in self.nodes.iter_mut().zip(weights) {
            node.weights_mut().copy_from_slice(row);
        }
        Ok(())
    }

    pub(crate) fn reinitialize<R: Rng + ?Sized>(&mut self, init: Init, rng: &mut R) {
        let (fan_in, fan_out) = (self.in_dim, self.nodes.len());
        for node in &mut self.nodes {
            init.fill(node.weights_mut(), fan_in, fan_out, rng);
        }
    }

    /// Add an independent `U(-step_size, step_size)` offset to every weight.
    pub(crate) fn perturb<R: Rng + ?Sized>(&mut self, step_size: f32, rng: &mut R) {
        let unit = unit_interval();
        for node in &mut self.nodes {
            for w in node.weights_mut() {
                *w += step_size * unit.sample(rng);
            }
        }
    }
}
