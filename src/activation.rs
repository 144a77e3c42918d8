//! Activation functions.
//!
//! A layer computes a pre-activation value `z = W x` for each node and then
//! applies an activation function element-wise: `y = activation(z)`.
//!
//! Derivatives are evaluated on the cached pre-activation `z`, which keeps
//! ReLU-family sub-gradients exact at the kink (`z <= 0` takes the left slope).

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Slope used by `"leaky_relu"` when parsed by name.
pub const DEFAULT_LEAKY_ALPHA: f32 = 0.01;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq)]
/// Element-wise activation function.
pub enum Activation {
    /// Linear pass-through.
    Identity,
    Sigmoid,
    Tanh,
    #[cfg_attr(feature = "serde", serde(rename = "relu"))]
    ReLU,
    #[cfg_attr(feature = "serde", serde(rename = "leaky_relu"))]
    LeakyReLU { alpha: f32 },
}

impl Activation {
    /// Validate activation parameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Activation::LeakyReLU { alpha } => {
                if !(alpha.is_finite() && alpha >= 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "leaky ReLU alpha must be finite and >= 0, got {alpha}"
                    )));
                }
            }
            Activation::Identity | Activation::Sigmoid | Activation::Tanh | Activation::ReLU => {}
        }

        Ok(())
    }

    #[inline]
    pub fn forward(self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::ReLU => x.max(0.0),
            Activation::LeakyReLU { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
        }
    }

    /// Derivative `dy/dz` at the pre-activation value `z`.
    #[inline]
    pub fn derivative(self, z: f32) -> f32 {
        match self {
            Activation::Identity => 1.0,
            Activation::Sigmoid => {
                let y = sigmoid(z);
                y * (1.0 - y)
            }
            Activation::Tanh => {
                let y = z.tanh();
                1.0 - y * y
            }
            Activation::ReLU => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyReLU { alpha } => {
                if z > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
        }
    }

    /// Canonical name, accepted back by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Activation::Identity => "linear",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::ReLU => "relu",
            Activation::LeakyReLU { .. } => "leaky_relu",
        }
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "identity" => Ok(Activation::Identity),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "relu" => Ok(Activation::ReLU),
            "leaky_relu" | "leakyrelu" => Ok(Activation::LeakyReLU {
                alpha: DEFAULT_LEAKY_ALPHA,
            }),
            other => Err(Error::NotFound(format!("unknown activation {other:?}"))),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaky_relu_alpha_must_be_finite_and_non_negative() {
        assert!(
            Activation::LeakyReLU { alpha: f32::NAN }
                .validate()
                .is_err()
        );
        assert!(Activation::LeakyReLU { alpha: -0.1 }.validate().is_err());
        assert!(Activation::LeakyReLU { alpha: 0.1 }.validate().is_ok());
    }

    #[test]
    fn sigmoid_is_finite_for_large_magnitudes() {
        let y0 = Activation::Sigmoid.forward(0.0);
        assert!((y0 - 0.5).abs() < 1e-6);

        for x in [-1000.0_f32, -100.0, 100.0, 1000.0] {
            let y = Activation::Sigmoid.forward(x);
            let dy = Activation::Sigmoid.derivative(x);
            assert!(y.is_finite() && dy.is_finite(), "x={x} y={y} dy={dy}");
        }
        assert!(Activation::Sigmoid.forward(10.0) > 0.999);
        assert!(Activation::Sigmoid.forward(-10.0) < 0.001);
        assert!((Activation::Sigmoid.derivative(0.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn relu_subgradient_at_zero_is_zero() {
        assert_eq!(Activation::ReLU.forward(-2.0), 0.0);
        assert_eq!(Activation::ReLU.forward(3.0), 3.0);
        assert_eq!(Activation::ReLU.derivative(0.0), 0.0);
        assert_eq!(Activation::ReLU.derivative(-1.0), 0.0);
        assert_eq!(Activation::ReLU.derivative(1.0), 1.0);

        let act = Activation::LeakyReLU { alpha: 0.1 };
        assert_eq!(act.forward(-2.0), -0.2);
        assert_eq!(act.forward(3.0), 3.0);
        assert_eq!(act.derivative(-2.0), 0.1);
        assert_eq!(act.derivative(3.0), 1.0);
    }

    #[test]
    fn tanh_derivative_matches_closed_form() {
        let y = Activation::Tanh.forward(0.3);
        let g = Activation::Tanh.derivative(0.3);
        assert!((g - (1.0 - y * y)).abs() < 1e-6);
        assert!(Activation::Tanh.derivative(50.0).is_finite());
    }

    #[test]
    fn parses_names() {
        assert_eq!("relu".parse::<Activation>().unwrap(), Activation::ReLU);
        assert_eq!("Linear".parse::<Activation>().unwrap(), Activation::Identity);
        assert_eq!(
            "leaky_relu".parse::<Activation>().unwrap(),
            Activation::LeakyReLU { alpha: 0.01 }
        );
        assert!(matches!(
            "softplus".parse::<Activation>(),
            Err(Error::NotFound(_))
        ));
        for act in [
            Activation::Identity,
            Activation::Sigmoid,
            Activation::Tanh,
            Activation::ReLU,
        ] {
            assert_eq!(act.name().parse::<Activation>().unwrap(), act);
        }
    }
}
