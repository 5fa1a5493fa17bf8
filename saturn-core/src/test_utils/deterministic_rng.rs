/*!
    Deterministic RNG helpers for reproducible tests

    `StdRng` is a CSPRNG, so these can be handed straight to key generation
    wherever a `CryptoRngCore` is expected. The same seed always yields the
    same key.
*/

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default seed for deterministic tests
pub const DEFAULT_TEST_SEED: u64 = 42;

/// Create a deterministic RNG with the default seed
pub fn test_rng() -> StdRng {
    test_rng_with_seed(DEFAULT_TEST_SEED)
}

/// Create a deterministic RNG with a custom seed
pub fn test_rng_with_seed(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Deterministic seed material, e.g. for `KeyPair::derive_from_seed`
pub fn deterministic_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = test_rng_with_seed(seed);
    (0..len).map(|_| rng.gen()).collect()
}
