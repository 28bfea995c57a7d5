//! Deterministic environment for tests and simulation.
//!
//! Production code never touches this module; it exists so expiry windows,
//! identifiers, and token values are reproducible in tests across every
//! crate in the workspace.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::env::Environment;

/// Test environment with a manually-advanced clock and seeded randomness.
///
/// Clones share the same clock and RNG stream, mirroring how production
/// environments share the system clock.
#[derive(Clone)]
pub struct FixedEnv {
    inner: Arc<FixedEnvInner>,
}

struct FixedEnvInner {
    now_secs: AtomicU64,
    counter: AtomicU64,
}

impl FixedEnv {
    /// Create an environment starting at `start_secs` with a default seed.
    pub fn new(start_secs: u64) -> Self {
        Self::with_seed(start_secs, 0x5EED)
    }

    /// Create an environment with an explicit RNG seed.
    pub fn with_seed(start_secs: u64, seed: u64) -> Self {
        Self {
            inner: Arc::new(FixedEnvInner {
                now_secs: AtomicU64::new(start_secs),
                counter: AtomicU64::new(seed),
            }),
        }
    }

    /// Advance the clock by `secs`.
    pub fn advance(&self, secs: u64) {
        self.inner.now_secs.fetch_add(secs, Ordering::SeqCst);
    }
}

/// SplitMix64 step: a small, well-distributed PRNG.
///
/// Not cryptographic - test determinism is the only goal here.
fn splitmix64(state: u64) -> u64 {
    let mut z = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl Environment for FixedEnv {
    fn unix_now_secs(&self) -> u64 {
        self.inner.now_secs.load(Ordering::SeqCst)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        for chunk in buffer.chunks_mut(8) {
            let word = splitmix64(self.inner.counter.fetch_add(1, Ordering::SeqCst));
            let bytes = word.to_be_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}
