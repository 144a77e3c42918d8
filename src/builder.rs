//! Model builder.
//!
//! `MlpBuilder` makes model structure explicit (layer sizes + activations) and
//! chooses a default weight initializer for each activation unless one is set:
//!
//! - `tanh` / `sigmoid` / `identity`: Xavier/Glorot
//! - `relu` / `leaky relu`: He/Kaiming
//!
//! The first size is the network input, bias slot included.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Activation, Error, Init, Layer, Loss, Mlp, Result, rng};

#[derive(Debug, Clone, Copy)]
struct LayerSpec {
    out_dim: usize,
    activation: Activation,
}

#[derive(Debug, Clone)]
/// Builder for an `Mlp`.
///
/// Example:
///
/// ```rust
/// use memlp::{Activation, Loss, MlpBuilder};
///
/// # fn main() -> memlp::Result<()> {
/// // Two features plus the bias slot.
/// let mlp = MlpBuilder::new(3)?
///     .add_layer(8, Activation::ReLU)?
///     .add_layer(1, Activation::Sigmoid)?
///     .loss(Loss::mse())
///     .build_with_seed(0)?;
/// assert_eq!(mlp.sizes(), vec![3, 8, 1]);
/// # Ok(())
/// # }
/// ```
pub struct MlpBuilder {
    input_dim: usize,
    layers: Vec<LayerSpec>,
    loss: Loss,
    init: Option<Init>,
}

impl MlpBuilder {
    /// Start building an MLP that accepts inputs of length `input_dim`.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        Ok(Self {
            input_dim,
            layers: Vec::new(),
            loss: Loss::default(),
            init: None,
        })
    }

    /// Convenience constructor from a sizes list + activations.
    ///
    /// `sizes` includes input and output dimensions, so its length must be at least 2.
    /// `activations` must have length `sizes.len() - 1`.
    pub fn from_sizes(sizes: &[usize], activations: &[Activation]) -> Result<Self> {
        if sizes.len() < 2 {
            return Err(Error::InvalidConfig(
                "sizes must include input and output dims".to_owned(),
            ));
        }
        if sizes.contains(&0) {
            return Err(Error::InvalidConfig(
                "all layer sizes must be > 0".to_owned(),
            ));
        }
        if activations.len() != sizes.len() - 1 {
            return Err(Error::InvalidConfig(format!(
                "activations length {} does not match sizes.len() - 1 ({})",
                activations.len(),
                sizes.len() - 1
            )));
        }

        let mut b = Self::new(sizes[0])?;
        for (out_dim, &act) in sizes[1..].iter().zip(activations) {
            b = b.add_layer(*out_dim, act)?;
        }
        Ok(b)
    }

    /// Add a dense layer with `out_dim` nodes.
    pub fn add_layer(mut self, out_dim: usize, activation: Activation) -> Result<Self> {
        if out_dim == 0 {
            return Err(Error::InvalidConfig("layer out_dim must be > 0".to_owned()));
        }
        activation.validate()?;

        self.layers.push(LayerSpec {
            out_dim,
            activation,
        });
        Ok(self)
    }

    pub fn loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    /// Use `init` for every layer instead of the per-activation default.
    pub fn init(mut self, init: Init) -> Result<Self> {
        init.validate()?;
        self.init = Some(init);
        Ok(self)
    }

    /// Build drawing from the process-wide random source.
    pub fn build(self) -> Result<Mlp> {
        rng::with_rng(|r| self.build_with_rng(r))
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Mlp> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Mlp> {
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig(
                "mlp must have at least one layer".to_owned(),
            ));
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        let mut in_dim = self.input_dim;
        for spec in self.layers {
            let init = self
                .init
                .unwrap_or_else(|| default_init_for_activation(spec.activation));
            let layer = Layer::new_with_rng(in_dim, spec.out_dim, spec.activation, init, rng)?;
            layers.push(layer);
            in_dim = spec.out_dim;
        }

        Mlp::from_layers(layers, self.loss)
    }
}

#[inline]
pub(crate) fn default_init_for_activation(act: Activation) -> Init {
    match act {
        Activation::Tanh | Activation::Sigmoid | Activation::Identity => Init::Xavier,
        Activation::ReLU | Activation::LeakyReLU { .. } => Init::He,
    }
}
