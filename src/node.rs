//! Single weighted-sum unit.
//!
//! A `Node` owns one weight vector whose last element multiplies the bias slot
//! (a constant `1.0` input). Inside a [`crate::Layer`] the bias slot is part of
//! the layer input; the standalone perceptron helpers
//! ([`Node::boolean_output`], [`Node::update_weights`]) append it implicitly.

use rand::Rng;
use rand::distributions::{Distribution, Uniform};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Result, rng};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq)]
/// Weight initializer.
pub enum Init {
    /// Every weight set to the same value.
    Constant(f32),
    /// `U(-limit, limit)`.
    Uniform { limit: f32 },
    /// Xavier/Glorot uniform: `U(-a, a)` with `a = sqrt(6 / (fan_in + fan_out))`.
    Xavier,
    /// He/Kaiming uniform: `U(-a, a)` with `a = sqrt(6 / fan_in)`.
    He,
}

impl Default for Init {
    fn default() -> Self {
        Init::Uniform { limit: 1.0 }
    }
}

impl Init {
    pub fn validate(self) -> Result<()> {
        match self {
            Init::Constant(v) if !v.is_finite() => Err(Error::InvalidConfig(format!(
                "constant weight init must be finite, got {v}"
            ))),
            Init::Uniform { limit } if !(limit.is_finite() && limit > 0.0) => {
                Err(Error::InvalidConfig(format!(
                    "uniform init limit must be finite and > 0, got {limit}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Fill `weights` for a unit with the given fan-in/fan-out.
    pub(crate) fn fill<R: Rng + ?Sized>(
        self,
        weights: &mut [f32],
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) {
        let limit = match self {
            Init::Constant(v) => {
                weights.fill(v);
                return;
            }
            Init::Uniform { limit } => limit,
            Init::Xavier => (6.0 / (fan_in + fan_out).max(1) as f32).sqrt(),
            Init::He => (6.0 / fan_in.max(1) as f32).sqrt(),
        };
        let unit = unit_interval();
        for w in weights.iter_mut() {
            *w = limit * unit.sample(rng);
        }
    }
}

/// `U(-1, 1)`, scaled by callers to a symmetric range.
///
/// `Uniform::new_inclusive(-m, m)` panics once `2 * m` overflows `f32`, so
/// ranges are sampled on the unit interval and then multiplied.
pub(crate) fn unit_interval() -> Uniform<f32> {
    Uniform::new_inclusive(-1.0, 1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    weights: Vec<f32>,
}

impl Node {
    /// A node for `num_features` inputs plus the bias weight, drawing from the
    /// process-wide random source when `init` is random.
    pub fn new(num_features: usize, init: Init) -> Result<Self> {
        rng::with_rng(|r| Self::new_with_rng(num_features, init, r))
    }

    pub fn new_with_rng<R: Rng + ?Sized>(
        num_features: usize,
        init: Init,
        rng: &mut R,
    ) -> Result<Self> {
        let mut node = Self {
            weights: Vec::new(),
        };
        node.weight_initialization_with_rng(num_features, init, rng)?;
        Ok(node)
    }

    /// Wrap an existing weight vector (bias weight last).
    pub fn from_weights(weights: Vec<f32>) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::ShapeMismatch(
                "node needs at least the bias weight".to_owned(),
            ));
        }
        Ok(Self { weights })
    }

    /// Reallocate the weight vector as `num_features + 1` weights and fill it.
    pub fn weight_initialization(&mut self, num_features: usize, init: Init) -> Result<()> {
        rng::with_rng(|r| self.weight_initialization_with_rng(num_features, init, r))
    }

    pub fn weight_initialization_with_rng<R: Rng + ?Sized>(
        &mut self,
        num_features: usize,
        init: Init,
        rng: &mut R,
    ) -> Result<()> {
        init.validate()?;
        let len = num_features + 1;
        self.weights = vec![0.0; len];
        init.fill(&mut self.weights, len, 1, rng);
        Ok(())
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub(crate) fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    /// Number of weights, bias included.
    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Features this node accepts through the perceptron helpers (bias excluded).
    #[inline]
    pub fn num_features(&self) -> usize {
        self.weights.len() - 1
    }

    /// `sum(w_i * x_i)` over an input that already carries the bias slot.
    ///
    /// Shape contract: `input.len() == self.len()`.
    #[inline]
    pub fn weighted_sum(&self, input: &[f32]) -> f32 {
        debug_assert_eq!(input.len(), self.weights.len());

        let mut sum = 0.0_f32;
        for (&w, &x) in self.weights.iter().zip(input) {
            sum = w.mul_add(x, sum);
        }
        sum
    }

    /// Weighted sum of `features` plus the bias weight.
    fn biased_sum(&self, features: &[f32]) -> Result<f32> {
        self.check_features(features)?;
        let (bias, rest) = self.split_bias();
        let mut sum = bias;
        for (&w, &x) in rest.iter().zip(features) {
            sum = w.mul_add(x, sum);
        }
        Ok(sum)
    }

    /// Evaluate `activation(w . [features, 1])` and compare against `threshold`.
    pub fn boolean_output(
        &self,
        features: &[f32],
        activation: Activation,
        threshold: f32,
    ) -> Result<bool> {
        let sum = self.biased_sum(features)?;
        Ok(activation.forward(sum) > threshold)
    }

    /// Perceptron rule: `w_i += learning_rate * error * x_i`, with `x_bias = 1`.
    pub fn update_weights(
        &mut self,
        features: &[f32],
        learning_rate: f32,
        error: f32,
    ) -> Result<()> {
        self.check_features(features)?;
        let step = learning_rate * error;
        let n = features.len();
        for (w, &x) in self.weights[..n].iter_mut().zip(features) {
            *w = step.mul_add(x, *w);
        }
        self.weights[n] += step;
        Ok(())
    }

    /// Replace every weight with a draw from `U(-magnitude, magnitude)`.
    pub fn weight_randomisation(&mut self, magnitude: f32) -> Result<()> {
        rng::with_rng(|r| self.weight_randomisation_with_rng(magnitude, r))
    }

    pub fn weight_randomisation_with_rng<R: Rng + ?Sized>(
        &mut self,
        magnitude: f32,
        rng: &mut R,
    ) -> Result<()> {
        let init = Init::Uniform { limit: magnitude };
        init.validate()?;
        let len = self.weights.len();
        init.fill(&mut self.weights, len, 1, rng);
        Ok(())
    }

    #[inline]
    fn split_bias(&self) -> (f32, &[f32]) {
        let n = self.weights.len() - 1;
        (self.weights[n], &self.weights[..n])
    }

    fn check_features(&self, features: &[f32]) -> Result<()> {
        if features.len() + 1 != self.weights.len() {
            return Err(Error::ShapeMismatch(format!(
                "node expects {} features (plus bias), got {}",
                self.weights.len() - 1,
                features.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Train a single node with the perceptron rule until an epoch makes no mistakes.
    fn train_perceptron(
        samples: &[(Vec<f32>, f32)],
        learning_rate: f32,
        max_iterations: usize,
    ) -> Node {
        let mut rng = StdRng::seed_from_u64(0);
        let num_features = samples[0].0.len();
        let mut node = Node::new_with_rng(num_features, Init::Constant(0.5), &mut rng).unwrap();

        for _ in 0..max_iterations {
            let mut errors = 0;
            for (x, y) in samples {
                let prediction = node.boolean_output(x, Activation::Identity, 0.5).unwrap();
                let correct = *y > 0.5;
                if prediction != correct {
                    errors += 1;
                    let error = f32::from(u8::from(correct)) - f32::from(u8::from(prediction));
                    node.update_weights(x, learning_rate, error).unwrap();
                }
            }
            if errors == 0 {
                break;
            }
        }
        node
    }

    fn classifies(node: &Node, samples: &[(Vec<f32>, f32)]) -> bool {
        samples.iter().all(|(x, y)| {
            node.boolean_output(x, Activation::Identity, 0.5).unwrap() == (*y > 0.5)
        })
    }

    fn gate(outputs: [f32; 4]) -> Vec<(Vec<f32>, f32)> {
        let inputs = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        inputs.iter().zip(outputs).map(|(x, y)| (x.to_vec(), y)).collect()
    }

    #[test]
    fn learns_linearly_separable_gates() {
        for (name, outputs) in [
            ("and", [0.0, 0.0, 0.0, 1.0]),
            ("nand", [1.0, 1.0, 1.0, 0.0]),
            ("or", [0.0, 1.0, 1.0, 1.0]),
            ("nor", [1.0, 0.0, 0.0, 0.0]),
        ] {
            let samples = gate(outputs);
            let node = train_perceptron(&samples, 0.1, 100);
            assert!(classifies(&node, &samples), "{name} not learned: {:?}", node.weights());
        }
    }

    #[test]
    fn learns_not() {
        let samples = vec![(vec![0.0], 1.0), (vec![1.0], 0.0)];
        let node = train_perceptron(&samples, 0.1, 100);
        assert!(classifies(&node, &samples));
    }

    #[test]
    fn cannot_learn_xor() {
        let samples = gate([0.0, 1.0, 1.0, 0.0]);
        let node = train_perceptron(&samples, 0.1, 100);
        assert!(!classifies(&node, &samples));
    }

    #[test]
    fn constant_init_and_randomisation() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut node = Node::new_with_rng(5, Init::Constant(1.0), &mut rng).unwrap();
        assert_eq!(node.len(), 6);
        assert!(node.weights().iter().all(|&w| w == 1.0));

        node.weight_randomisation_with_rng(0.1, &mut rng).unwrap();
        assert_eq!(node.len(), 6);
        assert!(node.weights().iter().all(|&w| (-0.1..=0.1).contains(&w)));
        assert!(node.weights().iter().any(|&w| w != 1.0));

        assert!(node.weight_randomisation_with_rng(f32::NAN, &mut rng).is_err());
    }

    #[test]
    fn randomisation_accepts_magnitudes_near_f32_max() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut node = Node::new_with_rng(4, Init::Constant(0.0), &mut rng).unwrap();
        for magnitude in [2.0e38, f32::MAX] {
            node.weight_randomisation_with_rng(magnitude, &mut rng).unwrap();
            assert!(
                node.weights()
                    .iter()
                    .all(|w| w.is_finite() && w.abs() <= magnitude)
            );
        }

        let init = Init::Uniform { limit: f32::MAX };
        let node = Node::new_with_rng(3, init, &mut rng).unwrap();
        assert!(node.weights().iter().all(|w| w.is_finite()));
    }

    #[test]
    fn perceptron_helpers_reject_wrong_feature_count() {
        let node = Node::from_weights(vec![0.1, 0.2, 0.3]).unwrap();
        assert!(matches!(
            node.boolean_output(&[1.0], Activation::Identity, 0.0),
            Err(Error::ShapeMismatch(_))
        ));
        let mut node = node;
        assert!(node.update_weights(&[1.0, 2.0, 3.0], 0.1, 1.0).is_err());
        assert_eq!(node.weights(), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn update_touches_bias_weight() {
        let mut node = Node::from_weights(vec![0.0, 0.0]).unwrap();
        node.update_weights(&[2.0], 0.5, 1.0).unwrap();
        assert_eq!(node.weights(), &[1.0, 0.5]);
        assert_eq!(node.weighted_sum(&[1.0, 1.0]), 1.5);
    }
}
