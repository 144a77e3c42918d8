//! Gradient-descent training.
//!
//! Both entry points run the same per-example step (forward, loss, backward into
//! accumulated gradients) and differ only in how often weights are updated:
//! [`Mlp::train`] once per pass over the whole set, [`Mlp::mini_batch_train`]
//! once per consecutive batch. Buffers are allocated once per call.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::mlp::Trainer;
use crate::{Error, Mlp, Result};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig {
    pub learning_rate: f32,
    /// Upper bound on passes over the training set.
    pub max_iterations: usize,
    /// Stop once the summed loss of a pass is at or below this value.
    pub min_error_cost: f32,
    /// Examples per update in `mini_batch_train`; ignored by `train`.
    pub batch_size: usize,
    /// Log the loss of every pass at `info` level.
    pub log_progress: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iterations: 1000,
            min_error_cost: 0.0,
            batch_size: 32,
            log_progress: false,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig("max_iterations must be > 0".to_owned()));
        }
        if self.min_error_cost.is_nan() {
            return Err(Error::InvalidConfig("min_error_cost must not be NaN".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainReport {
    /// Passes actually run.
    pub iterations: usize,
    /// Summed loss of the last pass, measured before that pass's updates.
    pub final_loss: f32,
}

impl Mlp {
    /// Full-batch gradient descent.
    ///
    /// Each pass sums the loss and weight gradients over every example, then
    /// applies `w -= learning_rate * grad_sum / n`.
    pub fn train(
        &mut self,
        features: &[Vec<f32>],
        labels: &[Vec<f32>],
        cfg: &TrainConfig,
    ) -> Result<TrainReport> {
        let n = features.len();
        self.run_training(features, labels, cfg, n)
    }

    /// Mini-batch gradient descent over consecutive batches of `cfg.batch_size`.
    ///
    /// The last batch of a pass may be smaller; each batch's gradient is averaged
    /// over its own size.
    pub fn mini_batch_train(
        &mut self,
        features: &[Vec<f32>],
        labels: &[Vec<f32>],
        cfg: &TrainConfig,
    ) -> Result<TrainReport> {
        self.run_training(features, labels, cfg, cfg.batch_size)
    }

    /// Summed loss over a labelled set. Does not mutate the network.
    pub fn evaluate(&self, features: &[Vec<f32>], labels: &[Vec<f32>]) -> Result<f32> {
        self.check_training_set(features, labels)?;

        let mut trainer = self.trainer();
        let mut total = 0.0_f32;
        for (x, t) in features.iter().zip(labels) {
            let y = self.forward(x, &mut trainer.scratch);
            total += self.loss().compute(t, y, trainer.grads.d_output_mut(), 1.0)?;
        }
        Ok(total)
    }

    fn run_training(
        &mut self,
        features: &[Vec<f32>],
        labels: &[Vec<f32>],
        cfg: &TrainConfig,
        batch_size: usize,
    ) -> Result<TrainReport> {
        cfg.validate()?;
        self.check_training_set(features, labels)?;

        let mut trainer = self.trainer();
        let mut report = TrainReport {
            iterations: 0,
            final_loss: f32::INFINITY,
        };

        for iteration in 0..cfg.max_iterations {
            let mut pass_loss = 0.0_f32;
            for (xs, ts) in features.chunks(batch_size).zip(labels.chunks(batch_size)) {
                pass_loss += self.accumulate_batch(xs, ts, &mut trainer)?;
                self.descend(&trainer.grads, cfg.learning_rate / xs.len() as f32);
            }

            report.iterations = iteration + 1;
            report.final_loss = pass_loss;
            if cfg.log_progress {
                log::info!("iteration {iteration}: loss {pass_loss}");
            }
            if pass_loss <= cfg.min_error_cost {
                break;
            }
        }

        log::debug!(
            "training stopped after {} iterations, loss {}",
            report.iterations,
            report.final_loss
        );
        Ok(report)
    }

    /// Forward + backward over one batch; gradients are zeroed then summed.
    fn accumulate_batch(
        &self,
        features: &[Vec<f32>],
        labels: &[Vec<f32>],
        trainer: &mut Trainer,
    ) -> Result<f32> {
        trainer.grads.zero();
        let mut batch_loss = 0.0_f32;
        for (x, t) in features.iter().zip(labels) {
            let y = self.forward(x, &mut trainer.scratch);
            batch_loss += self.loss().compute(t, y, trainer.grads.d_output_mut(), 1.0)?;
            self.backward(x, &trainer.scratch, &mut trainer.grads);
        }
        Ok(batch_loss)
    }

    fn check_training_set(&self, features: &[Vec<f32>], labels: &[Vec<f32>]) -> Result<()> {
        if features.is_empty() {
            return Err(Error::InvalidData("training set must not be empty".to_owned()));
        }
        if features.len() != labels.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} feature vectors but {} label vectors",
                features.len(),
                labels.len()
            )));
        }
        for (idx, (x, t)) in features.iter().zip(labels).enumerate() {
            if x.len() != self.input_dim() {
                return Err(Error::ShapeMismatch(format!(
                    "example {idx}: feature len {} does not match mlp input_dim {}",
                    x.len(),
                    self.input_dim()
                )));
            }
            if t.len() != self.output_dim() {
                return Err(Error::ShapeMismatch(format!(
                    "example {idx}: label len {} does not match mlp output_dim {}",
                    t.len(),
                    self.output_dim()
                )));
            }
        }
        Ok(())
    }
}
