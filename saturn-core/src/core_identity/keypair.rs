//! Keypair module
//!
//! Handles the key material behind a node identity. RSA is the identity
//! algorithm; Ed25519 is carried alongside so that every export/import goes
//! through an explicit algorithm check instead of assuming one key type.
//!
//! Generation always runs on a ChaCha20 stream. A fresh key keys that stream
//! with 32 bytes drawn from the caller's CSPRNG; a seeded derivation keys it
//! from the seed (see [`super::seed`]). Both paths then call the same
//! generation routine, so seeded keys are reproducible bit for bit.
//!
//! Secret material is zeroized on drop by the underlying key types.

use super::error::KeyError;
use super::seed;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRngCore, SeedableRng};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

/// Smallest RSA modulus accepted for an identity
pub const MIN_RSA_BITS: usize = 1024;

/// Largest RSA modulus the backend imports again after export
pub const MAX_RSA_BITS: usize = 4096;

/// Modulus size used when the caller does not pick one
pub const DEFAULT_RSA_BITS: usize = 4096;

/// Ed25519 keys have a fixed size
pub const ED25519_BITS: usize = 256;

/// Key algorithm tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// RSA with public exponent 65537
    Rsa,
    /// Ed25519 signatures
    Ed25519,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa => "RSA",
            KeyAlgorithm::Ed25519 => "Ed25519",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Private key material, tagged by algorithm
#[derive(Clone, PartialEq)]
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    Ed25519(SigningKey),
}

impl PrivateKey {
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PrivateKey::Rsa(_) => KeyAlgorithm::Rsa,
            PrivateKey::Ed25519(_) => KeyAlgorithm::Ed25519,
        }
    }

    /// Derive the matching public key
    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
            PrivateKey::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKey")
            .field(&self.algorithm())
            .field(&"<redacted>")
            .finish()
    }
}

/// Public key material, tagged by algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    Ed25519(VerifyingKey),
}

impl PublicKey {
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PublicKey::Rsa(_) => KeyAlgorithm::Rsa,
            PublicKey::Ed25519(_) => KeyAlgorithm::Ed25519,
        }
    }

    /// Key size in bits (RSA modulus length)
    pub fn bits(&self) -> usize {
        match self {
            PublicKey::Rsa(key) => key.n().bits(),
            PublicKey::Ed25519(_) => ED25519_BITS,
        }
    }
}

/// An identity keypair.
///
/// The public half is always the one derived from the private half; there is
/// no constructor that accepts the two separately.
#[derive(Clone, PartialEq)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
    bits: usize,
}

impl KeyPair {
    /// Generate a fresh RSA keypair.
    ///
    /// Fails with [`KeyError::WeakKey`] below [`MIN_RSA_BITS`] and with
    /// [`KeyError::Entropy`] when `rng` cannot produce bytes. There is no
    /// fallback source.
    pub fn generate<R: CryptoRngCore + ?Sized>(bits: usize, rng: &mut R) -> Result<Self, KeyError> {
        check_rsa_bits(bits)?;
        let mut stream = stream_from_rng(rng)?;
        debug!(bits, "generating RSA keypair");
        generate_rsa(bits, &mut stream)
    }

    /// Generate a fresh Ed25519 keypair
    pub fn generate_ed25519<R: CryptoRngCore + ?Sized>(rng: &mut R) -> Result<Self, KeyError> {
        let mut secret = Zeroizing::new([0u8; 32]);
        rng.try_fill_bytes(&mut secret[..])
            .map_err(|e| KeyError::Entropy(e.to_string()))?;
        Self::from_private_key(PrivateKey::Ed25519(SigningKey::from_bytes(&secret)))
    }

    /// Deterministically derive an RSA keypair from seed material.
    ///
    /// The same `seed` and `bits` always yield the same key.
    pub fn derive_from_seed(seed: &[u8], bits: usize) -> Result<Self, KeyError> {
        check_rsa_bits(bits)?;
        let mut stream = seed::derive_stream(seed, KeyAlgorithm::Rsa, bits)?;
        debug!(bits, "deriving RSA keypair from seed");
        generate_rsa(bits, &mut stream)
    }

    /// Deterministically derive an Ed25519 keypair from seed material
    pub fn derive_ed25519_from_seed(seed: &[u8]) -> Result<Self, KeyError> {
        let mut stream = seed::derive_stream(seed, KeyAlgorithm::Ed25519, ED25519_BITS)?;
        Self::generate_ed25519(&mut stream)
    }

    /// Wrap existing private key material, deriving the public half.
    ///
    /// RSA keys outside [`MIN_RSA_BITS`]..=[`MAX_RSA_BITS`] are rejected.
    pub fn from_private_key(private: PrivateKey) -> Result<Self, KeyError> {
        let public = private.public_key();
        let bits = public.bits();
        if private.algorithm() == KeyAlgorithm::Rsa {
            check_rsa_bits(bits)?;
        }
        Ok(KeyPair {
            private,
            public,
            bits,
        })
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.private.algorithm()
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm())
            .field("bits", &self.bits)
            .field("private", &"<redacted>")
            .finish()
    }
}

fn check_rsa_bits(bits: usize) -> Result<(), KeyError> {
    if bits < MIN_RSA_BITS {
        return Err(KeyError::WeakKey {
            bits,
            min: MIN_RSA_BITS,
        });
    }
    if bits > MAX_RSA_BITS {
        return Err(KeyError::KeyTooLarge {
            bits,
            max: MAX_RSA_BITS,
        });
    }
    Ok(())
}

/// Key a ChaCha20 stream with 32 bytes from the caller's source
fn stream_from_rng<R: CryptoRngCore + ?Sized>(rng: &mut R) -> Result<ChaCha20Rng, KeyError> {
    let mut key = Zeroizing::new([0u8; 32]);
    rng.try_fill_bytes(&mut key[..])
        .map_err(|e| KeyError::Entropy(e.to_string()))?;
    Ok(ChaCha20Rng::from_seed(*key))
}

fn generate_rsa(bits: usize, stream: &mut ChaCha20Rng) -> Result<KeyPair, KeyError> {
    let key = RsaPrivateKey::new(stream, bits).map_err(|e| KeyError::Generation(e.to_string()))?;
    KeyPair::from_private_key(PrivateKey::Rsa(key))
}
