//! Bounded store of training examples.
//!
//! A [`Dataset`] keeps `(feature, label)` pairs in insertion order. The first
//! stored pair fixes the feature and label lengths. When the store is full,
//! `add` either fails or, with replay memory enabled, evicts one entry chosen by
//! the configured [`ForgetMode`].

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result, rng, serialise};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Which entry a full replay memory drops.
pub enum ForgetMode {
    /// Oldest entry first.
    #[default]
    Fifo,
    /// Any entry, uniformly.
    RandomEqual,
    /// Random, weighted linearly by age: the oldest of `n` entries has weight `n`, the newest `1`.
    RandomOlder,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetConfig {
    pub max_examples: usize,
    /// Evict instead of rejecting when full.
    pub replay_memory: bool,
    pub forget_mode: ForgetMode,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            max_examples: 100,
            replay_memory: false,
            forget_mode: ForgetMode::Fifo,
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_examples == 0 {
            return Err(Error::InvalidConfig("max_examples must be > 0".to_owned()));
        }
        Ok(())
    }
}

/// Owned copy of a dataset's contents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Samples {
    pub features: Vec<Vec<f32>>,
    pub labels: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    config: DatasetConfig,
    features: Vec<Vec<f32>>,
    labels: Vec<Vec<f32>>,
}

impl Dataset {
    pub fn new(config: DatasetConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            features: Vec::new(),
            labels: Vec::new(),
        })
    }

    #[inline]
    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Store a copy of `(feature, label)`.
    ///
    /// Fails without mutation on a length mismatch against the first stored pair,
    /// or when full with replay memory disabled.
    pub fn add(&mut self, feature: &[f32], label: &[f32]) -> Result<()> {
        rng::with_rng(|r| self.add_with_rng(feature, label, r))
    }

    pub fn add_with_rng<R: Rng + ?Sized>(
        &mut self,
        feature: &[f32],
        label: &[f32],
        rng: &mut R,
    ) -> Result<()> {
        if let (Some(f), Some(l)) = (self.features.first(), self.labels.first()) {
            if feature.len() != f.len() || label.len() != l.len() {
                return Err(Error::ShapeMismatch(format!(
                    "example shape ({}, {}) does not match stored shape ({}, {})",
                    feature.len(),
                    label.len(),
                    f.len(),
                    l.len()
                )));
            }
        }

        if self.len() >= self.config.max_examples {
            if !self.config.replay_memory {
                return Err(Error::CapacityExceeded {
                    max_examples: self.config.max_examples,
                });
            }
            let victim = self.pick_victim(rng)?;
            log::debug!("evicting example {victim} ({:?})", self.config.forget_mode);
            self.features.remove(victim);
            self.labels.remove(victim);
        }

        self.features.push(feature.to_vec());
        self.labels.push(label.to_vec());
        Ok(())
    }

    fn pick_victim<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<usize> {
        let n = self.len();
        match self.config.forget_mode {
            ForgetMode::Fifo => Ok(0),
            ForgetMode::RandomEqual => Ok(rng.gen_range(0..n)),
            ForgetMode::RandomOlder => {
                let dist = WeightedIndex::new((0..n).map(|age_rank| n - age_rank))
                    .map_err(|e| Error::InvalidData(format!("eviction weights: {e}")))?;
                Ok(dist.sample(rng))
            }
        }
    }

    /// Change the capacity, keeping the first `max_examples` inserted entries.
    pub fn set_max_examples(&mut self, max_examples: usize) -> Result<()> {
        let config = DatasetConfig {
            max_examples,
            ..self.config
        };
        config.validate()?;
        self.config = config;
        if self.len() > max_examples {
            log::debug!("truncating dataset from {} to {max_examples} examples", self.len());
            self.features.truncate(max_examples);
            self.labels.truncate(max_examples);
        }
        Ok(())
    }

    /// Borrowed views of every stored feature and label vector, in insertion order.
    #[inline]
    pub fn fetch(&self) -> (&[Vec<f32>], &[Vec<f32>]) {
        (&self.features, &self.labels)
    }

    /// Copy of the feature vectors, each with a trailing `1.0` when `with_bias`.
    pub fn features(&self, with_bias: bool) -> Vec<Vec<f32>> {
        if with_bias {
            append_bias(&self.features)
        } else {
            self.features.clone()
        }
    }

    pub fn sample(&self, with_bias: bool) -> Samples {
        Samples {
            features: self.features(with_bias),
            labels: self.labels.clone(),
        }
    }

    /// Up to `count` distinct entries drawn at random, kept in insertion order.
    pub fn sample_random(&self, count: usize, with_bias: bool) -> Samples {
        rng::with_rng(|r| self.sample_random_with_rng(count, with_bias, r))
    }

    pub fn sample_random_with_rng<R: Rng + ?Sized>(
        &self,
        count: usize,
        with_bias: bool,
        rng: &mut R,
    ) -> Samples {
        let count = count.min(self.len());
        let mut picked = rand::seq::index::sample(rng, self.len(), count).into_vec();
        picked.sort_unstable();

        let mut features: Vec<Vec<f32>> =
            picked.iter().map(|&i| self.features[i].clone()).collect();
        if with_bias {
            for row in &mut features {
                row.push(1.0);
            }
        }
        Samples {
            features,
            labels: picked.iter().map(|&i| self.labels[i].clone()).collect(),
        }
    }

    pub fn clear(&mut self) {
        self.features.clear();
        self.labels.clear();
    }

    /// Write the features then the labels as two codec records.
    pub fn serialise(&self, write_offset: usize, buffer: &mut Vec<u8>) -> Result<usize> {
        let head = serialise::from_vector_2d(write_offset, &self.features, buffer)?;
        serialise::from_vector_2d(head, &self.labels, buffer)
    }

    /// Replace the contents with records written by [`Dataset::serialise`].
    ///
    /// The configuration is kept; nothing changes unless both records decode
    /// and fit within `max_examples`.
    pub fn from_serialised(&mut self, read_offset: usize, buffer: &[u8]) -> Result<usize> {
        let mut features: Vec<Vec<f32>> = Vec::new();
        let mut labels: Vec<Vec<f32>> = Vec::new();
        let head = serialise::to_vector_2d(read_offset, buffer, &mut features)?;
        let head = serialise::to_vector_2d(head, buffer, &mut labels)?;

        if features.len() != labels.len() {
            return Err(Error::InvalidData(format!(
                "{} serialised features but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if features.len() > self.config.max_examples {
            return Err(Error::CapacityExceeded {
                max_examples: self.config.max_examples,
            });
        }

        self.features = features;
        self.labels = labels;
        Ok(head)
    }
}

/// Copy of `rows` with a constant `1.0` bias input appended to each row.
pub fn append_bias(rows: &[Vec<f32>]) -> Vec<Vec<f32>> {
    rows.iter()
        .map(|row| {
            let mut biased = Vec::with_capacity(row.len() + 1);
            biased.extend_from_slice(row);
            biased.push(1.0);
            biased
        })
        .collect()
}
