//! Seed-based key derivation
//!
//! Recovery phrases become identities in two steps:
//!
//! ```text
//! seed   = PBKDF2-HMAC-SHA512(phrase, salt="mnemonic" ‖ passphrase, 2048 rounds, L=64)
//! stream = ChaCha20(HKDF-SHA256(seed, salt="saturn identity seed v1", info=alg ‖ bits, L=32))
//! ```
//!
//! The stream feeds the same generation routine as a fresh key, so the
//! derivation is deterministic for a given version of the RSA backend.

use super::error::KeyError;
use super::keypair::KeyAlgorithm;
use hkdf::Hkdf;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use sha2::{Sha256, Sha512};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Minimum seed length accepted for derivation
pub const MIN_SEED_LEN: usize = 16;

/// Length of a phrase-derived seed
pub const SEED_LEN: usize = 64;

/// PBKDF2 rounds for phrase stretching
pub const PHRASE_ROUNDS: u32 = 2048;

const STREAM_SALT: &[u8] = b"saturn identity seed v1";

/// Seed material recovered from a phrase
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RecoverySeed([u8; SEED_LEN]);

impl RecoverySeed {
    /// Stretch a recovery phrase and optional passphrase into a seed.
    ///
    /// Runs of whitespace in the phrase collapse to single spaces, so
    /// `"a  b\nc"` and `"a b c"` give the same seed.
    pub fn from_phrase(phrase: &str, passphrase: &str) -> Self {
        let normalized = Zeroizing::new(phrase.split_whitespace().collect::<Vec<_>>().join(" "));
        let salt = Zeroizing::new(format!("mnemonic{}", passphrase));

        let mut seed = [0u8; SEED_LEN];
        pbkdf2::pbkdf2_hmac::<Sha512>(
            normalized.as_bytes(),
            salt.as_bytes(),
            PHRASE_ROUNDS,
            &mut seed,
        );
        RecoverySeed(seed)
    }

    /// Wrap raw seed bytes
    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        RecoverySeed(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RecoverySeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecoverySeed(<redacted>)")
    }
}

/// Build the deterministic randomness stream for one algorithm and size.
///
/// Binding the algorithm and size into the HKDF info keeps a 2048-bit and a
/// 4096-bit derivation from the same seed unrelated.
pub fn derive_stream(
    seed: &[u8],
    algorithm: KeyAlgorithm,
    bits: usize,
) -> Result<ChaCha20Rng, KeyError> {
    if seed.len() < MIN_SEED_LEN {
        return Err(KeyError::WeakSeed {
            len: seed.len(),
            min: MIN_SEED_LEN,
        });
    }

    let info = format!("{}/{}", algorithm.as_str(), bits);
    let hk = Hkdf::<Sha256>::new(Some(STREAM_SALT), seed);

    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(info.as_bytes(), &mut okm[..])
        .map_err(|e| KeyError::Generation(format!("HKDF expand failed: {}", e)))?;

    Ok(ChaCha20Rng::from_seed(*okm))
}
