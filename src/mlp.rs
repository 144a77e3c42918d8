use rand::Rng;

use crate::builder::default_init_for_activation;
use crate::{Activation, Error, Layer, Loss, Result, rng, serialise};

/// Dense feed-forward network: ordered layers plus a loss fixed at construction.
///
/// Layer `i` maps `sizes[i]` inputs to `sizes[i + 1]` outputs. The network input
/// already carries the bias slot; hidden layers have none.
#[derive(Debug, Clone, PartialEq)]
pub struct Mlp {
    layers: Vec<Layer>,
    loss: Loss,
}

/// Reusable buffers for `Mlp::forward`.
///
/// Holds the pre-activation and activated output of every layer for the most
/// recent forward pass.
#[derive(Debug, Clone)]
pub(crate) struct Scratch {
    nets: Vec<Vec<f32>>,
    layer_outputs: Vec<Vec<f32>>,
}

/// Parameter gradients for an `Mlp` (accumulate semantics).
///
/// `Mlp::backward` adds into `d_weights`; call `zero()` between updates.
#[derive(Debug, Clone)]
pub(crate) struct Gradients {
    d_weights: Vec<Vec<f32>>,

    // Gradient w.r.t. each layer output. The last entry is written by the loss.
    d_layer_outputs: Vec<Vec<f32>>,
}

/// Scratch + gradients, allocated once per training call.
#[derive(Debug, Clone)]
pub(crate) struct Trainer {
    pub(crate) scratch: Scratch,
    pub(crate) grads: Gradients,
}

impl Mlp {
    /// Build a network with default initializers, drawing from the process-wide source.
    ///
    /// `sizes` includes the input (bias slot included) and output dimensions;
    /// `activations` has one entry per layer.
    pub fn new(sizes: &[usize], activations: &[Activation], loss: Loss) -> Result<Self> {
        rng::with_rng(|r| Self::new_with_rng(sizes, activations, loss, r))
    }

    pub fn new_with_rng<R: Rng + ?Sized>(
        sizes: &[usize],
        activations: &[Activation],
        loss: Loss,
        rng: &mut R,
    ) -> Result<Self> {
        crate::MlpBuilder::from_sizes(sizes, activations)?
            .loss(loss)
            .build_with_rng(rng)
    }

    /// Build from activation and loss names, e.g. `&["sigmoid", "linear"]` and `"mse"`.
    pub fn from_names(sizes: &[usize], activations: &[&str], loss: &str) -> Result<Self> {
        let activations = activations
            .iter()
            .map(|name| name.parse())
            .collect::<Result<Vec<Activation>>>()?;
        let loss = crate::LossRegistry::global().lookup_name(loss)?;
        Self::new(sizes, &activations, loss)
    }

    pub(crate) fn from_layers(layers: Vec<Layer>, loss: Loss) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidConfig(
                "mlp must have at least one layer".to_owned(),
            ));
        }
        for (idx, pair) in layers.windows(2).enumerate() {
            if pair[0].out_dim() != pair[1].in_dim() {
                return Err(Error::InvalidConfig(format!(
                    "layer {idx} out_dim {} does not match layer {} in_dim {}",
                    pair[0].out_dim(),
                    idx + 1,
                    pair[1].in_dim()
                )));
            }
        }

        log::debug!(
            "built mlp with {} layers ({} -> {}), loss {}",
            layers.len(),
            layers[0].in_dim(),
            layers[layers.len() - 1].out_dim(),
            loss.name()
        );
        Ok(Self { layers, loss })
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers[0].in_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn loss(&self) -> Loss {
        self.loss
    }

    /// Layer sizes as passed at construction (input first).
    pub fn sizes(&self) -> Vec<usize> {
        std::iter::once(self.input_dim())
            .chain(self.layers.iter().map(Layer::out_dim))
            .collect()
    }

    pub(crate) fn trainer(&self) -> Trainer {
        Trainer {
            scratch: Scratch::new(self),
            grads: Gradients::new(self),
        }
    }

    /// Network output for one input (bias slot included). Does not mutate the network.
    pub fn output(&self, input: &[f32]) -> Result<Vec<f32>> {
        self.check_input(input)?;
        let mut scratch = Scratch::new(self);
        Ok(self.forward(input, &mut scratch).to_vec())
    }

    pub(crate) fn check_input(&self, input: &[f32]) -> Result<()> {
        if input.len() != self.input_dim() {
            return Err(Error::ShapeMismatch(format!(
                "input len {} does not match mlp input_dim {}",
                input.len(),
                self.input_dim()
            )));
        }
        Ok(())
    }

    /// Forward pass for a single sample.
    ///
    /// Writes pre-activations and outputs into `scratch` and returns the final output slice.
    ///
    /// Shape contract:
    /// - `input.len() == self.input_dim()`
    /// - `scratch` must be built for this `Mlp`
    pub(crate) fn forward<'a>(&self, input: &[f32], scratch: &'a mut Scratch) -> &'a [f32] {
        debug_assert_eq!(input.len(), self.input_dim());
        debug_assert_eq!(scratch.layer_outputs.len(), self.layers.len());

        for (idx, layer) in self.layers.iter().enumerate() {
            let net = &mut scratch.nets[idx];
            if idx == 0 {
                layer.forward(input, net, &mut scratch.layer_outputs[0]);
            } else {
                // Borrow the previous output immutably and the current output mutably.
                let (left, right) = scratch.layer_outputs.split_at_mut(idx);
                layer.forward(&left[idx - 1], net, &mut right[0]);
            }
        }

        scratch.output()
    }

    /// Backward pass for a single sample, using the `d_output` buffer in `grads`.
    ///
    /// Call `forward` first with the same `input` and `scratch`, then write
    /// `dL/d(output)` into `grads.d_output_mut()`. Weight gradients are added to
    /// `grads`; upstream deltas go through the current (pre-update) weights.
    pub(crate) fn backward(&self, input: &[f32], scratch: &Scratch, grads: &mut Gradients) {
        debug_assert_eq!(input.len(), self.input_dim());
        debug_assert_eq!(grads.d_weights.len(), self.layers.len());

        for idx in (0..self.layers.len()).rev() {
            let layer = &self.layers[idx];
            let net = &scratch.nets[idx];

            if idx == 0 {
                layer.backward(
                    input,
                    net,
                    &grads.d_layer_outputs[0],
                    None,
                    &mut grads.d_weights[0],
                );
            } else {
                // `d_inputs` of this layer is `d_outputs` of the previous one.
                let (left, right) = grads.d_layer_outputs.split_at_mut(idx);
                layer.backward(
                    &scratch.layer_outputs[idx - 1],
                    net,
                    &right[0],
                    Some(&mut left[idx - 1]),
                    &mut grads.d_weights[idx],
                );
            }
        }
    }

    /// `w -= scale * grad` for every layer.
    pub(crate) fn descend(&mut self, grads: &Gradients, scale: f32) {
        for (layer, d_w) in self.layers.iter_mut().zip(&grads.d_weights) {
            layer.descend(d_w, scale);
        }
    }

    /// Copy of every layer's weight matrix, in layer order.
    pub fn weights(&self) -> Vec<Vec<Vec<f32>>> {
        self.layers.iter().map(Layer::weights).collect()
    }

    /// Replace every layer's weights. Nothing changes unless all shapes match.
    pub fn set_weights(&mut self, weights: &[Vec<Vec<f32>>]) -> Result<()> {
        if weights.len() != self.layers.len() {
            return Err(Error::ShapeMismatch(format!(
                "got {} weight matrices, mlp has {} layers",
                weights.len(),
                self.layers.len()
            )));
        }
        for (layer, m) in self.layers.iter().zip(weights) {
            layer.check_weights(m)?;
        }
        for (layer, m) in self.layers.iter_mut().zip(weights) {
            layer.set_weights(m)?;
        }
        log::debug!("installed weights for {} layers", self.layers.len());
        Ok(())
    }

    pub fn layer_weights(&self, layer_idx: usize) -> Result<Vec<Vec<f32>>> {
        Ok(self.layer(layer_idx)?.weights())
    }

    pub fn set_layer_weights(&mut self, layer_idx: usize, weights: &[Vec<f32>]) -> Result<()> {
        self.layer(layer_idx)?;
        self.layers[layer_idx].set_weights(weights)?;
        log::debug!("installed weights for layer {layer_idx}");
        Ok(())
    }

    fn layer(&self, layer_idx: usize) -> Result<&Layer> {
        self.layers.get(layer_idx).ok_or_else(|| {
            Error::ShapeMismatch(format!(
                "layer index {layer_idx} out of range for {} layers",
                self.layers.len()
            ))
        })
    }

    /// Redraw every weight from the default initializer of its layer's activation.
    pub fn draw_weights(&mut self) {
        rng::with_rng(|r| self.draw_weights_with_rng(r));
    }

    pub fn draw_weights_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for layer in &mut self.layers {
            let init = default_init_for_activation(layer.activation());
            layer.reinitialize(init, rng);
        }
    }

    /// Add an independent `U(-step_size, step_size)` offset to every weight.
    pub fn move_weights(&mut self, step_size: f32) -> Result<()> {
        rng::with_rng(|r| self.move_weights_with_rng(step_size, r))
    }

    pub fn move_weights_with_rng<R: Rng + ?Sized>(
        &mut self,
        step_size: f32,
        rng: &mut R,
    ) -> Result<()> {
        if !(step_size.is_finite() && step_size >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "step_size must be finite and >= 0, got {step_size}"
            )));
        }
        for layer in &mut self.layers {
            layer.perturb(step_size, rng);
        }
        Ok(())
    }

    /// Append one codec record per layer, in layer order, starting at `write_offset`.
    ///
    /// Returns the offset just past the last record.
    pub fn serialise(&self, write_offset: usize, buffer: &mut Vec<u8>) -> Result<usize> {
        let mut head = write_offset;
        for layer in &self.layers {
            head = serialise::from_vector_2d(head, &layer.weights(), buffer)?;
        }
        Ok(head)
    }

    /// Load weights written by [`Mlp::serialise`] into this network.
    ///
    /// Every record is decoded and checked against the topology before any
    /// weight is replaced. Returns the offset just past the last record.
    pub fn from_serialised(&mut self, read_offset: usize, buffer: &[u8]) -> Result<usize> {
        let mut head = read_offset;
        let mut weights = Vec::with_capacity(self.layers.len());
        for (idx, layer) in self.layers.iter().enumerate() {
            let mut m: Vec<Vec<f32>> = Vec::new();
            head = serialise::to_vector_2d(head, buffer, &mut m)?;
            layer.check_weights(&m).map_err(|e| {
                Error::ShapeMismatch(format!("serialised layer {idx}: {e}"))
            })?;
            weights.push(m);
        }
        self.set_weights(&weights)?;
        Ok(head)
    }
}

impl Scratch {
    pub(crate) fn new(mlp: &Mlp) -> Self {
        let mut nets = Vec::with_capacity(mlp.layers.len());
        let mut layer_outputs = Vec::with_capacity(mlp.layers.len());
        for layer in &mlp.layers {
            nets.push(vec![0.0; layer.out_dim()]);
            layer_outputs.push(vec![0.0; layer.out_dim()]);
        }
        Self {
            nets,
            layer_outputs,
        }
    }

    #[inline]
    pub(crate) fn output(&self) -> &[f32] {
        &self.layer_outputs[self.layer_outputs.len() - 1]
    }
}

impl Gradients {
    pub(crate) fn new(mlp: &Mlp) -> Self {
        let mut d_weights = Vec::with_capacity(mlp.layers.len());
        let mut d_layer_outputs = Vec::with_capacity(mlp.layers.len());
        for layer in &mlp.layers {
            d_weights.push(vec![0.0; layer.in_dim() * layer.out_dim()]);
            d_layer_outputs.push(vec![0.0; layer.out_dim()]);
        }
        Self {
            d_weights,
            d_layer_outputs,
        }
    }

    #[inline]
    pub(crate) fn d_output_mut(&mut self) -> &mut [f32] {
        let last = self.d_layer_outputs.len() - 1;
        &mut self.d_layer_outputs[last]
    }

    pub(crate) fn zero(&mut self) {
        for d_w in &mut self.d_weights {
            d_w.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MlpBuilder;

    fn loss_for_mlp(mlp: &Mlp, input: &[f32], target: &[f32], scratch: &mut Scratch) -> f32 {
        let out = mlp.forward(input, scratch).to_vec();
        let mut d = vec![0.0; out.len()];
        mlp.loss().compute(target, &out, &mut d, 1.0).unwrap()
    }

    fn assert_close(analytic: f32, numeric: f32, abs_tol: f32, rel_tol: f32) {
        let diff = (analytic - numeric).abs();
        let scale = analytic.abs().max(numeric.abs()).max(1.0);
        assert!(
            diff <= abs_tol || diff / scale <= rel_tol,
            "analytic={analytic} numeric={numeric} diff={diff}"
        );
    }

    #[test]
    fn seeded_init_is_deterministic() {
        let build = || {
            MlpBuilder::from_sizes(&[3, 4, 1], &[Activation::Tanh, Activation::Sigmoid])
                .unwrap()
                .build_with_seed(123)
                .unwrap()
        };
        let (a, b) = (build(), build());
        assert_eq!(a.weights(), b.weights());
        assert_eq!(a.output(&[0.3, -0.7, 1.0]).unwrap(), b.output(&[0.3, -0.7, 1.0]).unwrap());
    }

    #[test]
    fn backward_matches_numeric_gradients() {
        let mut mlp = MlpBuilder::from_sizes(&[3, 3, 2], &[Activation::Tanh, Activation::Sigmoid])
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        let mut trainer = mlp.trainer();

        let input = [0.3_f32, -0.7, 1.0];
        let target = [0.2_f32, 0.9];

        let out = mlp.forward(&input, &mut trainer.scratch).to_vec();
        mlp.loss()
            .compute(&target, &out, trainer.grads.d_output_mut(), 1.0)
            .unwrap();
        mlp.backward(&input, &trainer.scratch, &mut trainer.grads);
        let analytic = trainer.grads.d_weights.clone();

        let eps = 1e-3_f32;
        let mut scratch = Scratch::new(&mlp);
        for layer_idx in 0..mlp.num_layers() {
            let mut w = mlp.layer_weights(layer_idx).unwrap();
            let in_dim = mlp.layers[layer_idx].in_dim();
            for o in 0..w.len() {
                for i in 0..in_dim {
                    let orig = w[o][i];

                    w[o][i] = orig + eps;
                    mlp.set_layer_weights(layer_idx, &w).unwrap();
                    let loss_plus = loss_for_mlp(&mlp, &input, &target, &mut scratch);

                    w[o][i] = orig - eps;
                    mlp.set_layer_weights(layer_idx, &w).unwrap();
                    let loss_minus = loss_for_mlp(&mlp, &input, &target, &mut scratch);

                    w[o][i] = orig;
                    mlp.set_layer_weights(layer_idx, &w).unwrap();

                    let numeric = (loss_plus - loss_minus) / (2.0 * eps);
                    assert_close(analytic[layer_idx][o * in_dim + i], numeric, 1e-3, 1e-2);
                }
            }
        }
    }

    #[test]
    fn output_rejects_wrong_input_len() {
        let mlp =
            Mlp::new(&[3, 2, 1], &[Activation::ReLU, Activation::Identity], Loss::mse()).unwrap();
        assert!(matches!(mlp.output(&[1.0, 2.0]), Err(Error::ShapeMismatch(_))));
        assert_eq!(mlp.output(&[1.0, 2.0, 1.0]).unwrap().len(), 1);
    }

    #[test]
    fn from_names_resolves_activations_and_loss() {
        let mlp =
            Mlp::from_names(&[3, 4, 2], &["relu", "linear"], "categorical_crossentropy").unwrap();
        assert_eq!(mlp.sizes(), vec![3, 4, 2]);
        assert_eq!(mlp.loss(), Loss::categorical_cross_entropy());
        assert_eq!(mlp.layers()[1].activation(), Activation::Identity);

        assert!(matches!(
            Mlp::from_names(&[3, 1], &["softsign"], "mse"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            Mlp::from_names(&[3, 1], &["tanh"], "hinge"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn layer_index_out_of_range() {
        let mut mlp = Mlp::new(&[2, 1], &[Activation::Identity], Loss::mse()).unwrap();
        assert!(mlp.layer_weights(1).is_err());
        assert!(mlp.set_layer_weights(3, &[vec![0.0, 0.0]]).is_err());
    }
}
