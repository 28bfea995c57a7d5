//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` is the production implementation of the Environment trait
//! using real wall-clock time and cryptographic RNG.
//!
//! # Capabilities
//!
//! - Real system time that advances naturally
//! - OS cryptographic RNG (getrandom). Truly random, not reproducible
//!
//! Production behavior is therefore non-deterministic, but provides
//! real-world timing and security-grade randomness. Tests use the
//! deterministic environment from `alcove-core` instead.

use alcove_core::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Security
///
/// The RNG uses getrandom which provides OS-level cryptographic randomness
/// (e.g., /dev/urandom on Linux, `BCryptGenRandom` on Windows). Suitable
/// for challenge nonces, refresh tokens, and record identifiers.
///
/// # Panics
///
/// Panics if the OS RNG fails. This is intentional - a server without
/// functioning cryptographic randomness cannot operate securely, and
/// continuing would compromise challenges, tokens, and identifiers alike.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    fn unix_now_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_secs()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - server cannot operate securely");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_does_not_go_backwards() {
        let env = SystemEnv::new();
        let t1 = env.unix_now_secs();
        let t2 = env.unix_now_secs();
        assert!(t2 >= t1);
    }

    #[test]
    fn random_bytes_are_random() {
        let env = SystemEnv::new();

        let mut bytes1 = [0u8; 32];
        let mut bytes2 = [0u8; 32];
        env.random_bytes(&mut bytes1);
        env.random_bytes(&mut bytes2);

        // Extremely unlikely to be equal if random
        assert_ne!(bytes1, bytes2);
    }

    #[test]
    fn random_uuids_differ() {
        let env = SystemEnv::new();
        assert_ne!(env.random_uuid(), env.random_uuid());
    }
}
