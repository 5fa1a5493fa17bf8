//! Node identity
//!
//! [`NodeIdentity`] is the explicit context object for "this node": the
//! keypair plus the peer id derived from it. [`IdentityConfig`] is the form
//! persisted in the repository config.

use super::envelope;
use super::error::KeyError;
use super::keypair::{KeyPair, PublicKey};
use super::peer_id::PeerId;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Identity section of the repository config.
///
/// `priv_key` is the base64 key envelope. It is empty when the key lives in
/// the encrypted keystore instead.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub peer_id: String,
    #[serde(default)]
    pub priv_key: String,
}

impl IdentityConfig {
    /// Whether the private key is stored inline
    pub fn has_inline_key(&self) -> bool {
        !self.priv_key.is_empty()
    }

    /// Parse the recorded peer id
    pub fn peer_id(&self) -> Result<PeerId, KeyError> {
        self.peer_id
            .parse()
            .map_err(|e| KeyError::MalformedKey(format!("invalid peer id {:?}: {}", self.peer_id, e)))
    }

    /// Decode the inline private key and check it against the peer id
    pub fn decode_identity(&self) -> Result<NodeIdentity, KeyError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(self.priv_key.trim())
                .map_err(|e| KeyError::MalformedKey(format!("invalid base64 private key: {}", e)))?,
        );
        let keypair = envelope::unmarshal_private_key(&bytes)?;
        self.verify(keypair)
    }

    /// Pair a keypair loaded from elsewhere with this record
    pub fn verify(&self, keypair: KeyPair) -> Result<NodeIdentity, KeyError> {
        let expected = self.peer_id()?;
        let identity = NodeIdentity::from_keypair(keypair)?;
        if identity.peer_id() != &expected {
            return Err(KeyError::MalformedKey(format!(
                "private key belongs to {}, config records {}",
                identity.peer_id(),
                expected
            )));
        }
        Ok(identity)
    }
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("peer_id", &self.peer_id)
            .field("priv_key", &if self.has_inline_key() { "<redacted>" } else { "" })
            .finish()
    }
}

/// A node's keypair together with its peer id
#[derive(Debug, Clone, PartialEq)]
pub struct NodeIdentity {
    keypair: KeyPair,
    peer_id: PeerId,
}

impl NodeIdentity {
    /// Generate a fresh RSA identity
    pub fn generate<R: CryptoRngCore + ?Sized>(bits: usize, rng: &mut R) -> Result<Self, KeyError> {
        info!(bits, "generating RSA identity keypair");
        let identity = Self::from_keypair(KeyPair::generate(bits, rng)?)?;
        info!(peer_id = %identity.peer_id, "peer identity created");
        Ok(identity)
    }

    /// Deterministically derive an RSA identity from seed material
    pub fn from_seed(seed: &[u8], bits: usize) -> Result<Self, KeyError> {
        info!(bits, "deriving RSA identity keypair from seed");
        let identity = Self::from_keypair(KeyPair::derive_from_seed(seed, bits)?)?;
        info!(peer_id = %identity.peer_id, "peer identity restored");
        Ok(identity)
    }

    pub fn from_keypair(keypair: KeyPair) -> Result<Self, KeyError> {
        let peer_id = PeerId::from_public_key(keypair.public_key())?;
        debug!(%peer_id, algorithm = %keypair.algorithm(), "identity loaded");
        Ok(NodeIdentity { keypair, peer_id })
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Build the config record with the key inline
    pub fn to_config(&self) -> Result<IdentityConfig, KeyError> {
        let bytes = envelope::marshal_private_key(&self.keypair)?;
        Ok(IdentityConfig {
            peer_id: self.peer_id.to_string(),
            priv_key: STANDARD.encode(&bytes[..]),
        })
    }

    /// Build the config record without the private key
    pub fn to_public_config(&self) -> IdentityConfig {
        IdentityConfig {
            peer_id: self.peer_id.to_string(),
            priv_key: String::new(),
        }
    }
}

/// Generate a new identity record.
///
/// Bit lengths below 1024 are refused before any entropy is consumed.
pub fn identity_config<R: CryptoRngCore + ?Sized>(
    bits: usize,
    rng: &mut R,
) -> Result<IdentityConfig, KeyError> {
    NodeIdentity::generate(bits, rng)?.to_config()
}

/// Rebuild an identity record from a marshalled private key
pub fn identity_from_key(private_key: &[u8]) -> Result<IdentityConfig, KeyError> {
    let keypair = envelope::unmarshal_private_key(private_key)?;
    NodeIdentity::from_keypair(keypair)?.to_config()
}

/// Derive an identity key from a seed, returning the marshalled private key
pub fn identity_key_from_seed(seed: &[u8], bits: usize) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    let keypair = KeyPair::derive_from_seed(seed, bits)?;
    envelope::marshal_private_key(&keypair)
}

/// Compute the printable peer id of a public key
pub fn peer_id_from_public_key(public: &PublicKey) -> Result<String, KeyError> {
    Ok(PeerId::from_public_key(public)?.to_string())
}
