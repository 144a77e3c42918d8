//! A small MLP (multi-layer perceptron) engine for constrained targets.
//!
//! `memlp` trains and evaluates small dense feed-forward networks, stores trained
//! weights in a compact little-endian binary form, and keeps a bounded pool of
//! training examples (a replay buffer).
//!
//! # Layout
//!
//! - [`Node`]: one weight vector; the last weight multiplies the bias slot.
//! - [`Layer`]: nodes sharing one [`Activation`], i.e. an `(out_dim, in_dim)` weight matrix.
//! - [`Mlp`]: ordered layers plus a [`Loss`] resolved through the [`LossRegistry`].
//! - [`Dataset`]: bounded `(feature, label)` store with [`ForgetMode`] eviction.
//! - [`serialise`]: the binary matrix codec.
//!
//! # Bias convention
//!
//! The network input includes the bias slot: callers append a constant `1.0`
//! to every input (see [`Dataset::sample`] and [`data::append_bias`]). Hidden
//! layers carry no bias.
//!
//! # Errors
//!
//! Every fallible operation returns [`Result`]. A call that fails leaves its
//! receiver unchanged.
//!
//! # Randomness
//!
//! Randomized operations draw from a process-wide source unless given an RNG
//! through their `*_with_rng` variant. Call [`rng::seed`] for reproducible runs.
//!
//! # Quick start
//!
//! ```rust
//! use memlp::{Activation, Dataset, Loss, Mlp, TrainConfig};
//!
//! # fn main() -> memlp::Result<()> {
//! memlp::rng::seed(7);
//!
//! let mut data = Dataset::default();
//! let rows = [
//!     ([0.0_f32, 0.0], 0.0_f32),
//!     ([0.0, 1.0], 1.0),
//!     ([1.0, 0.0], 1.0),
//!     ([1.0, 1.0], 1.0),
//! ];
//! for (x, y) in rows {
//!     data.add(&x, &[y])?;
//! }
//! let samples = data.sample(true);
//!
//! // Two features plus the bias slot.
//! let mut mlp = Mlp::new(&[3, 4, 1], &[Activation::Sigmoid, Activation::Identity], Loss::mse())?;
//! let report = mlp.train(
//!     &samples.features,
//!     &samples.labels,
//!     &TrainConfig {
//!         learning_rate: 0.5,
//!         max_iterations: 200,
//!         ..TrainConfig::default()
//!     },
//! )?;
//! assert!(report.iterations <= 200);
//!
//! let mut buffer = Vec::new();
//! mlp.serialise(0, &mut buffer)?;
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub mod mlp;
pub mod node;
pub mod rng;
pub mod serialise;
pub mod train;

#[cfg(feature = "serde")]
pub mod serde_model;

pub use activation::Activation;
pub use builder::MlpBuilder;
pub use data::{Dataset, DatasetConfig, ForgetMode, Samples};
pub use error::{Error, Result};
pub use layer::Layer;
pub use loss::{Loss, LossFn, LossId, LossRegistry};
pub use mlp::Mlp;
pub use node::{Init, Node};
pub use train::{TrainConfig, TrainReport};
