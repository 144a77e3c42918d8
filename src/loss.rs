//! Loss functions and the loss registry.
//!
//! A loss function has the shape
//! `fn(expected, actual, d_actual, scale) -> loss`: it returns the scalar loss
//! and writes `dL/d(actual) * scale` into `d_actual`.
//!
//! Networks are configured with a [`Loss`] resolved through a [`LossRegistry`],
//! either by numeric [`LossId`] or by name (`"mse"`, `"categorical_crossentropy"`).
//! The process-wide registry returned by [`LossRegistry::global`] is built once,
//! with every built-in entry registered before the registry is published, and is
//! read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Signature shared by every registered loss function.
pub type LossFn =
    fn(expected: &[f32], actual: &[f32], d_actual: &mut [f32], scale: f32) -> Result<f32>;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
/// Numeric loss identifier.
pub enum LossId {
    Mse = 0,
    CategoricalCrossEntropy = 1,
    /// Sentinel; never resolves.
    Invalid = u32::MAX,
}

impl LossId {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => LossId::Mse,
            1 => LossId::CategoricalCrossEntropy,
            _ => LossId::Invalid,
        }
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// A resolved loss: its identifier plus the function registered for it.
///
/// Two `Loss` values compare equal when they resolve the same [`LossId`].
#[derive(Clone, Copy)]
pub struct Loss {
    id: LossId,
    name: &'static str,
    func: LossFn,
}

impl Loss {
    /// Mean squared error from the global registry.
    pub fn mse() -> Self {
        builtin(LossId::Mse)
    }

    /// Softmax cross-entropy over raw logits from the global registry.
    pub fn categorical_cross_entropy() -> Self {
        builtin(LossId::CategoricalCrossEntropy)
    }

    #[inline]
    pub fn id(&self) -> LossId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Compute the loss and write the scaled gradient into `d_actual`.
    #[inline]
    pub fn compute(
        &self,
        expected: &[f32],
        actual: &[f32],
        d_actual: &mut [f32],
        scale: f32,
    ) -> Result<f32> {
        (self.func)(expected, actual, d_actual, scale)
    }
}

impl Default for Loss {
    fn default() -> Self {
        Loss::mse()
    }
}

impl PartialEq for Loss {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Loss {}

impl fmt::Debug for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loss")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl FromStr for Loss {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        LossRegistry::global().lookup_name(s)
    }
}

impl TryFrom<LossId> for Loss {
    type Error = Error;

    fn try_from(id: LossId) -> Result<Self> {
        LossRegistry::global().lookup(id)
    }
}

fn builtin(id: LossId) -> Loss {
    match LossRegistry::global().lookup(id) {
        Ok(loss) => loss,
        // The global registry always carries the built-ins.
        Err(_) => unreachable!("built-in loss {id:?} missing from global registry"),
    }
}

/// Mapping from loss identifiers and names to loss functions.
#[derive(Debug, Clone, Default)]
pub struct LossRegistry {
    by_id: HashMap<LossId, Loss>,
    by_name: HashMap<String, LossId>,
}

static GLOBAL: OnceLock<LossRegistry> = OnceLock::new();

impl LossRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in loss.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [(LossId, &'static str, LossFn); 2] = [
            (LossId::Mse, "mse", mse),
            (
                LossId::CategoricalCrossEntropy,
                "categorical_crossentropy",
                categorical_cross_entropy,
            ),
        ];
        for (id, name, func) in builtins {
            if let Err(e) = registry.register(id, name, func) {
                unreachable!("built-in loss registration failed: {e}");
            }
        }
        registry
    }

    /// The process-wide registry, populated with the built-ins on first access.
    pub fn global() -> &'static LossRegistry {
        GLOBAL.get_or_init(LossRegistry::with_builtins)
    }

    /// Register `func` under `id` and `name`, replacing any previous entry for `id`.
    pub fn register(&mut self, id: LossId, name: &'static str, func: LossFn) -> Result<()> {
        if id == LossId::Invalid {
            return Err(Error::InvalidConfig(
                "cannot register a loss under the invalid id".to_owned(),
            ));
        }
        self.by_name.insert(name.to_ascii_lowercase(), id);
        self.by_id.insert(id, Loss { id, name, func });
        Ok(())
    }

    pub fn lookup(&self, id: LossId) -> Result<Loss> {
        if id == LossId::Invalid {
            return Err(Error::NotFound("loss id is the invalid sentinel".to_owned()));
        }
        self.by_id
            .get(&id)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("no loss registered for {id:?}")))
    }

    pub fn lookup_name(&self, name: &str) -> Result<Loss> {
        let key = name.trim().to_ascii_lowercase();
        let id = self
            .by_name
            .get(&key)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("no loss registered as {name:?}")))?;
        self.lookup(id)
    }
}

fn check_shapes(expected: &[f32], actual: &[f32], d_actual: &[f32]) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(Error::ShapeMismatch(format!(
            "expected len {} does not match actual len {}",
            expected.len(),
            actual.len()
        )));
    }
    if d_actual.len() != actual.len() {
        return Err(Error::ShapeMismatch(format!(
            "gradient len {} does not match actual len {}",
            d_actual.len(),
            actual.len()
        )));
    }
    Ok(())
}

/// Mean squared error.
///
/// `L = mean((actual - expected)^2)` and
/// `d_actual[i] = 2 * (actual[i] - expected[i]) / N * scale`.
pub fn mse(expected: &[f32], actual: &[f32], d_actual: &mut [f32], scale: f32) -> Result<f32> {
    check_shapes(expected, actual, d_actual)?;

    if actual.is_empty() {
        return Ok(0.0);
    }

    let inv_n = 1.0 / actual.len() as f32;
    let mut sum_sq = 0.0_f32;
    for i in 0..actual.len() {
        let diff = actual[i] - expected[i];
        sum_sq = diff.mul_add(diff, sum_sq);
        d_actual[i] = 2.0 * diff * inv_n * scale;
    }
    Ok(sum_sq * inv_n)
}

/// Categorical cross-entropy over raw logits.
///
/// `actual` holds pre-softmax logits and `expected` a one-hot (or soft) target
/// distribution. Softmax goes through the log-sum-exp shift so large logits
/// cannot overflow.
///
/// `L = -sum(expected[i] * ln softmax[i])` and
/// `d_actual[i] = (softmax[i] - expected[i]) * scale`.
pub fn categorical_cross_entropy(
    expected: &[f32],
    actual: &[f32],
    d_actual: &mut [f32],
    scale: f32,
) -> Result<f32> {
    check_shapes(expected, actual, d_actual)?;
    if actual.is_empty() {
        return Err(Error::ShapeMismatch(
            "categorical cross-entropy requires at least 1 class".to_owned(),
        ));
    }

    let log_sum_exp = log_sum_exp(actual);

    let mut loss = 0.0_f32;
    for i in 0..actual.len() {
        let log_softmax = actual[i] - log_sum_exp;
        let t = expected[i];
        if t != 0.0 {
            loss -= t * log_softmax;
        }
        d_actual[i] = (log_softmax.exp() - t) * scale;
    }
    Ok(loss)
}

#[inline]
fn log_sum_exp(xs: &[f32]) -> f32 {
    let max_x = xs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum_exp = 0.0_f32;
    for &x in xs {
        sum_exp += (x - max_x).exp();
    }
    max_x + sum_exp.ln()
}
