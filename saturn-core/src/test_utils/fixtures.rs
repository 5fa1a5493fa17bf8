//! Shared key fixtures
//!
//! RSA generation dominates test time, so the common keys are built once and
//! handed out by reference.

use super::deterministic_rng::test_rng_with_seed;
use crate::core_identity::KeyPair;
use std::sync::OnceLock;

/// Seed behind [`rsa_1024`]
pub const FIXTURE_SEED: u64 = 0x5a7u64;

/// Seed behind [`rsa_1024_alt`]
pub const FIXTURE_SEED_ALT: u64 = 0x5a8u64;

/// A 1024-bit RSA keypair, identical on every call
pub fn rsa_1024() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| fixture_key(FIXTURE_SEED))
}

/// A second 1024-bit RSA keypair, distinct from [`rsa_1024`]
pub fn rsa_1024_alt() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| fixture_key(FIXTURE_SEED_ALT))
}

/// Seed material behind [`rsa_4096`]
pub const FIXTURE_SEED_4096: &[u8; 32] = b"saturn 4096-bit test fixture key";

/// A 4096-bit RSA keypair derived from [`FIXTURE_SEED_4096`], generated once
/// per test binary
pub fn rsa_4096() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| match KeyPair::derive_from_seed(FIXTURE_SEED_4096, 4096) {
        Ok(kp) => kp,
        Err(e) => panic!("fixture key derivation failed: {}", e),
    })
}

fn fixture_key(seed: u64) -> KeyPair {
    match KeyPair::generate(1024, &mut test_rng_with_seed(seed)) {
        Ok(kp) => kp,
        Err(e) => panic!("fixture key generation failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_are_stable_and_distinct() {
        assert!(std::ptr::eq(rsa_1024(), rsa_1024()));
        assert_eq!(*rsa_1024(), fixture_key(FIXTURE_SEED));
        assert_ne!(rsa_1024().public_key(), rsa_1024_alt().public_key());
    }
}
