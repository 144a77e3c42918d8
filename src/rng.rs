//! Process-wide random source.
//!
//! Randomized operations that are not handed an RNG by the caller
//! (`Mlp::draw_weights`, `Mlp::move_weights`, random dataset eviction, ...)
//! draw from a single shared `StdRng`. It is seeded from OS entropy on first
//! use; call [`seed`] before training to make a run reproducible.

use std::sync::{Mutex, PoisonError};

use rand::SeedableRng;
use rand::rngs::StdRng;

static SOURCE: Mutex<Option<StdRng>> = Mutex::new(None);

/// Reseed the process-wide source.
pub fn seed(seed: u64) {
    let mut guard = SOURCE.lock().unwrap_or_else(PoisonError::into_inner);
    *guard = Some(StdRng::seed_from_u64(seed));
}

/// Run `f` with exclusive access to the process-wide source.
///
/// `f` must not call back into `with_rng`.
pub fn with_rng<T>(f: impl FnOnce(&mut StdRng) -> T) -> T {
    let mut guard = SOURCE.lock().unwrap_or_else(PoisonError::into_inner);
    let rng = guard.get_or_insert_with(StdRng::from_entropy);
    f(rng)
}
