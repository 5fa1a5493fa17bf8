//! Identity management module
//!
//! API that we expose:
//! - `KeyPair::generate(bits, rng)` -> fresh RSA identity keypair
//! - `KeyPair::derive_from_seed(seed, bits)` -> reproducible keypair from seed material
//! - `export_*` / `import_*` -> raw DER and PEM conversions
//! - `PeerId::from_public_key(pk)` -> stable peer identifier
//! - `NodeIdentity` / `IdentityConfig` -> the node's identity and its persisted form
//! - `Keystore` -> encrypted storage for identity and named keys

mod encoding;
pub mod envelope;
mod error;
mod identity;
mod keypair;
pub mod keystore;
mod peer_id;
mod seed;

pub use encoding::{
    export_private_key_pem, export_private_key_raw, export_public_key_pem, export_public_key_raw,
    import_private_key_pem, import_private_key_raw, import_public_key_pem, import_public_key_raw,
    public_key_to_pem, public_key_to_raw, PRIVATE_KEY_LABEL, PUBLIC_KEY_LABEL,
};
pub use envelope::{
    marshal_private_key, marshal_public_key, unmarshal_private_key, unmarshal_public_key,
};
pub use error::KeyError;
pub use identity::{
    identity_config, identity_from_key, identity_key_from_seed, peer_id_from_public_key,
    IdentityConfig, NodeIdentity,
};
pub use keypair::{
    KeyAlgorithm, KeyPair, PrivateKey, PublicKey, DEFAULT_RSA_BITS, ED25519_BITS, MAX_RSA_BITS,
    MIN_RSA_BITS,
};
pub use keystore::{FileKeystore, Keystore, KeystoreError, MemoryKeystore};
pub use peer_id::{PeerId, PeerIdError};
pub use seed::{RecoverySeed, MIN_SEED_LEN};

#[cfg(test)]
mod tests;
