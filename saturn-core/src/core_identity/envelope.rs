//! Self-describing key envelope
//!
//! Keys stored in the repository config and hashed into peer ids travel in a
//! small protobuf-compatible envelope:
//!
//! ```text
//! message Key {
//!   required KeyType type = 1;   // RSA = 0, Ed25519 = 1, Secp256k1 = 2, ECDSA = 3
//!   required bytes   data = 2;
//! }
//! ```
//!
//! `data` is PKCS#1 DER (RSA private), SPKI DER (RSA public), seed ‖ public
//! (Ed25519 private, 64 bytes) or the 32-byte Ed25519 public key.

use super::encoding;
use super::error::KeyError;
use super::keypair::{KeyAlgorithm, KeyPair, PrivateKey, PublicKey};
use ed25519_dalek::{SigningKey, VerifyingKey};
use zeroize::Zeroizing;

const TYPE_RSA: u64 = 0;
const TYPE_ED25519: u64 = 1;
const TYPE_SECP256K1: u64 = 2;
const TYPE_ECDSA: u64 = 3;

const FIELD_TYPE: u8 = 0x08; // field 1, varint
const FIELD_DATA: u8 = 0x12; // field 2, length-delimited

/// Encode a private key with its type tag
pub fn marshal_private_key(kp: &KeyPair) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    match kp.private_key() {
        PrivateKey::Rsa(_) => {
            let der = encoding::export_private_key_raw(kp)?;
            Ok(Zeroizing::new(encode(TYPE_RSA, &der)))
        }
        PrivateKey::Ed25519(sk) => {
            let mut data = Zeroizing::new(Vec::with_capacity(64));
            data.extend_from_slice(&sk.to_bytes());
            data.extend_from_slice(sk.verifying_key().as_bytes());
            Ok(Zeroizing::new(encode(TYPE_ED25519, &data)))
        }
    }
}

/// Encode a public key with its type tag
pub fn marshal_public_key(public: &PublicKey) -> Result<Vec<u8>, KeyError> {
    match public {
        PublicKey::Rsa(_) => {
            let der = encoding::public_key_to_raw(public)?;
            Ok(encode(TYPE_RSA, &der))
        }
        PublicKey::Ed25519(vk) => Ok(encode(TYPE_ED25519, vk.as_bytes())),
    }
}

/// Decode a private key envelope
pub fn unmarshal_private_key(bytes: &[u8]) -> Result<KeyPair, KeyError> {
    let (key_type, data) = decode(bytes)?;
    match algorithm_for(key_type)? {
        KeyAlgorithm::Rsa => encoding::import_private_key_raw(data),
        KeyAlgorithm::Ed25519 => {
            if data.len() != 64 {
                return Err(KeyError::MalformedKey(format!(
                    "Ed25519 private key must be 64 bytes, got {}",
                    data.len()
                )));
            }
            let mut secret = Zeroizing::new([0u8; 32]);
            secret.copy_from_slice(&data[..32]);
            let sk = SigningKey::from_bytes(&secret);
            if sk.verifying_key().as_bytes()[..] != data[32..] {
                return Err(KeyError::MalformedKey(
                    "Ed25519 public half does not match private key".to_string(),
                ));
            }
            KeyPair::from_private_key(PrivateKey::Ed25519(sk))
        }
    }
}

/// Decode a public key envelope
pub fn unmarshal_public_key(bytes: &[u8]) -> Result<PublicKey, KeyError> {
    let (key_type, data) = decode(bytes)?;
    match algorithm_for(key_type)? {
        KeyAlgorithm::Rsa => encoding::import_public_key_raw(data),
        KeyAlgorithm::Ed25519 => {
            let raw: [u8; 32] = data.try_into().map_err(|_| {
                KeyError::MalformedKey(format!(
                    "Ed25519 public key must be 32 bytes, got {}",
                    data.len()
                ))
            })?;
            let vk = VerifyingKey::from_bytes(&raw)
                .map_err(|e| KeyError::MalformedKey(format!("invalid Ed25519 public key: {}", e)))?;
            Ok(PublicKey::Ed25519(vk))
        }
    }
}

fn algorithm_for(key_type: u64) -> Result<KeyAlgorithm, KeyError> {
    match key_type {
        TYPE_RSA => Ok(KeyAlgorithm::Rsa),
        TYPE_ED25519 => Ok(KeyAlgorithm::Ed25519),
        TYPE_SECP256K1 | TYPE_ECDSA => Err(KeyError::UnknownKeyType(key_type)),
        other => Err(KeyError::MalformedKey(format!("invalid key type {}", other))),
    }
}

fn encode(key_type: u64, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 8);
    out.push(FIELD_TYPE);
    write_varint(&mut out, key_type);
    out.push(FIELD_DATA);
    write_varint(&mut out, data.len() as u64);
    out.extend_from_slice(data);
    out
}

/// Split an envelope into (type, data). Both fields are required, each at
/// most once, and nothing may follow them.
fn decode(bytes: &[u8]) -> Result<(u64, &[u8]), KeyError> {
    let mut rest = bytes;
    let mut key_type = None;
    let mut data = None;

    while let Some((&tag, tail)) = rest.split_first() {
        rest = tail;
        match tag {
            FIELD_TYPE if key_type.is_none() => {
                let (value, tail) = read_varint(rest)?;
                key_type = Some(value);
                rest = tail;
            }
            FIELD_DATA if data.is_none() => {
                let (len, tail) = read_varint(rest)?;
                let len = usize::try_from(len)
                    .ok()
                    .filter(|&len| len <= tail.len())
                    .ok_or_else(|| KeyError::MalformedKey("truncated key data".to_string()))?;
                data = Some(&tail[..len]);
                rest = &tail[len..];
            }
            other => {
                return Err(KeyError::MalformedKey(format!(
                    "unexpected envelope field tag 0x{:02x}",
                    other
                )))
            }
        }
    }

    match (key_type, data) {
        (Some(key_type), Some(data)) => Ok((key_type, data)),
        _ => Err(KeyError::MalformedKey(
            "key envelope is missing its type or data".to_string(),
        )),
    }
}

pub(crate) fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

pub(crate) fn read_varint(bytes: &[u8]) -> Result<(u64, &[u8]), KeyError> {
    let mut value: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate().take(10) {
        let part = u64::from(byte & 0x7f);
        if i == 9 && part > 1 {
            break;
        }
        value |= part << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, &bytes[i + 1..]));
        }
    }
    Err(KeyError::MalformedKey("invalid varint".to_string()))
}
