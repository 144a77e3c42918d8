//! JSON model format (feature: `serde`).
//!
//! A versioned document independent of the in-memory `Mlp`/`Layer` structs:
//! the loss by registry name plus, per layer, its activation and weight matrix
//! (one row per node). Deserialization validates dimensions, finiteness and
//! the loss name before a network is built.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Layer, LossRegistry, Mlp, Result};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedMlp {
    pub format_version: u32,
    /// Registry name of the loss, e.g. `"mse"`.
    pub loss: String,
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub activation: SerializedActivation,
    /// Shape `(out_dim, in_dim)`.
    pub weights: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializedActivation {
    Tanh,
    Relu,
    LeakyRelu { alpha: f32 },
    Sigmoid,
    Identity,
}

impl From<Activation> for SerializedActivation {
    fn from(value: Activation) -> Self {
        match value {
            Activation::Tanh => SerializedActivation::Tanh,
            Activation::ReLU => SerializedActivation::Relu,
            Activation::LeakyReLU { alpha } => SerializedActivation::LeakyRelu { alpha },
            Activation::Sigmoid => SerializedActivation::Sigmoid,
            Activation::Identity => SerializedActivation::Identity,
        }
    }
}

impl SerializedActivation {
    fn into_activation(self) -> Activation {
        match self {
            SerializedActivation::Tanh => Activation::Tanh,
            SerializedActivation::Relu => Activation::ReLU,
            SerializedActivation::LeakyRelu { alpha } => Activation::LeakyReLU { alpha },
            SerializedActivation::Sigmoid => Activation::Sigmoid,
            SerializedActivation::Identity => Activation::Identity,
        }
    }
}

impl SerializedMlp {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidData(
                "serialized model must have at least one layer".to_owned(),
            ));
        }

        for (i, layer) in self.layers.iter().enumerate() {
            layer
                .validate()
                .map_err(|e| Error::InvalidData(format!("layer {i} invalid: {e}")))?;

            if i > 0 {
                let prev_out = self.layers[i - 1].weights.len();
                let in_dim = layer.weights[0].len();
                if in_dim != prev_out {
                    return Err(Error::InvalidData(format!(
                        "layer {i} in_dim {in_dim} does not match previous out_dim {prev_out}"
                    )));
                }
            }
        }

        Ok(())
    }
}

impl SerializedLayer {
    fn validate(&self) -> Result<()> {
        let in_dim = self.weights.first().map(Vec::len).unwrap_or(0);
        if in_dim == 0 {
            return Err(Error::InvalidData(
                "weights must have at least one non-empty row".to_owned(),
            ));
        }
        if self.weights.iter().any(|row| row.len() != in_dim) {
            return Err(Error::InvalidData("weight rows must share one length".to_owned()));
        }
        if self.weights.iter().flatten().any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "weights must contain only finite values".to_owned(),
            ));
        }
        self.activation.into_activation().validate()
    }
}

impl From<&Mlp> for SerializedMlp {
    fn from(model: &Mlp) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            loss: model.loss().name().to_owned(),
            layers: model.layers().iter().map(SerializedLayer::from).collect(),
        }
    }
}

impl From<&Layer> for SerializedLayer {
    fn from(layer: &Layer) -> Self {
        Self {
            activation: SerializedActivation::from(layer.activation()),
            weights: layer.weights(),
        }
    }
}

impl TryFrom<SerializedMlp> for Mlp {
    type Error = Error;

    fn try_from(value: SerializedMlp) -> Result<Self> {
        value.validate()?;
        let loss = LossRegistry::global().lookup_name(&value.loss)?;

        let layers = value
            .layers
            .iter()
            .map(|l| Layer::from_weights(&l.weights, l.activation.into_activation()))
            .collect::<Result<Vec<_>>>()?;
        Mlp::from_layers(layers, loss)
    }
}

impl Mlp {
    /// Serialize the model to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        let ser = SerializedMlp::from(self);
        serde_json::to_string_pretty(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Serialize the model to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        let ser = SerializedMlp::from(self);
        serde_json::to_string(&ser)
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Parse a model from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedMlp = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse model json: {e}")))?;
        ser.try_into()
    }

    /// Save the model to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s)
            .map_err(|e| Error::InvalidData(format!("failed to write {}: {e}", p.display())))?;
        Ok(())
    }

    /// Load a model from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::InvalidData(format!("failed to read {}: {e}", p.display())))?;
        Self::from_json_str(&s)
    }
}
