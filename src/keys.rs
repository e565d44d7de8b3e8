//! secp256k1 key material and signature primitives.
//!
//! Everything in the trust core that touches a key goes through this module:
//! compact recoverable signatures (the manifest signing format), signer
//! addresses, ECDH shared-secret derivation for the login handshake, and
//! ephemeral keypair generation.

use std::fmt;
use std::str::FromStr;

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{ecdh, All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid compact signature")]
    InvalidSignature,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Could not recover signer from signature")]
    RecoveryFailed,
}

/// SHA-256 digest of arbitrary bytes.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// SHA-512 digest of arbitrary bytes.
pub fn sha512(bytes: &[u8]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// A compact recoverable ECDSA signature: one recovery-id byte followed by
/// the 64-byte r||s pair. This is the wire format carried in update manifests
/// and login URLs; hex-encoded wherever it appears as text.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompactSignature(pub [u8; 65]);

impl CompactSignature {
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(text).map_err(|_| KeyError::InvalidSignature)?;
        let array: [u8; 65] = bytes.try_into().map_err(|_| KeyError::InvalidSignature)?;
        if array[0] > 3 {
            return Err(KeyError::InvalidSignature);
        }
        Ok(Self(array))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn to_recoverable(self) -> Result<RecoverableSignature, KeyError> {
        let id = RecoveryId::from_i32(self.0[0] as i32).map_err(|_| KeyError::InvalidSignature)?;
        RecoverableSignature::from_compact(&self.0[1..], id)
            .map_err(|_| KeyError::InvalidSignature)
    }
}

impl fmt::Debug for CompactSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompactSignature({})", self.to_hex())
    }
}

impl fmt::Display for CompactSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for CompactSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CompactSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// A 20-byte signer address derived from a compressed public key:
/// `sha256(sha512(pubkey))[..20]`. Trusted-signer sets are sets of addresses,
/// never raw keys.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 20]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_public_key(key: &PublicKey) -> Self {
        let digest = sha256(&sha512(&key.serialize()));
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Self(bytes)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = KeyError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(text).map_err(|e| KeyError::InvalidAddress(e.to_string()))?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidAddress("expected 20 bytes".into()))?;
        Ok(Self(array))
    }
}

/// Parse a public key from its compressed hex form.
pub fn parse_public_key(text: &str) -> Result<PublicKey, KeyError> {
    PublicKey::from_str(text).map_err(|_| KeyError::InvalidPublicKey)
}

/// Produce a compact recoverable signature over a 32-byte hash.
pub fn sign_recoverable(secp: &Secp256k1<All>, secret: &SecretKey, hash: &[u8; 32]) -> CompactSignature {
    let message = Message::from_digest(*hash);
    let signature = secp.sign_ecdsa_recoverable(&message, secret);
    let (id, compact) = signature.serialize_compact();
    let mut bytes = [0u8; 65];
    bytes[0] = id.to_i32() as u8;
    bytes[1..].copy_from_slice(&compact);
    CompactSignature(bytes)
}

/// Recover the signing public key from a compact signature over a hash.
pub fn recover(
    secp: &Secp256k1<All>,
    signature: &CompactSignature,
    hash: &[u8; 32],
) -> Result<PublicKey, KeyError> {
    let message = Message::from_digest(*hash);
    let recoverable = signature.to_recoverable()?;
    secp.recover_ecdsa(&message, &recoverable)
        .map_err(|_| KeyError::RecoveryFailed)
}

/// Generate a fresh keypair. Used for the one-time login handshake keys;
/// callers must let the secret half drop as soon as the handshake ends.
pub fn generate_keypair(secp: &Secp256k1<All>) -> (SecretKey, PublicKey) {
    secp.generate_keypair(&mut rand::thread_rng())
}

/// ECDH shared secret between a local secret key and a peer public key:
/// SHA-512 of the x coordinate of the shared point. Symmetric by
/// construction, so both handshake parties derive identical bytes.
pub fn shared_secret(secret: &SecretKey, peer: &PublicKey) -> [u8; 64] {
    let point = ecdh::shared_secret_point(peer, secret);
    sha512(&point[..32])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    #[test]
    fn test_sign_and_recover() {
        let secp = Secp256k1::new();
        let secret = test_key(7);
        let public = secret.public_key(&secp);
        let hash = sha256(b"payload");

        let signature = sign_recoverable(&secp, &secret, &hash);
        let recovered = recover(&secp, &signature, &hash).unwrap();
        assert_eq!(recovered, public);
    }

    #[test]
    fn test_recover_wrong_hash_gives_wrong_key() {
        let secp = Secp256k1::new();
        let secret = test_key(7);
        let public = secret.public_key(&secp);
        let signature = sign_recoverable(&secp, &secret, &sha256(b"payload"));

        // Recovery over a different hash must not yield the original signer.
        match recover(&secp, &signature, &sha256(b"other payload")) {
            Ok(recovered) => assert_ne!(recovered, public),
            Err(KeyError::RecoveryFailed) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_signature_hex_roundtrip() {
        let secp = Secp256k1::new();
        let signature = sign_recoverable(&secp, &test_key(3), &sha256(b"x"));
        let parsed = CompactSignature::from_hex(&signature.to_hex()).unwrap();
        assert_eq!(parsed, signature);
    }

    #[test]
    fn test_signature_rejects_bad_input() {
        assert!(CompactSignature::from_hex("zz").is_err());
        assert!(CompactSignature::from_hex(&hex::encode([0u8; 64])).is_err());
        // Recovery id out of range
        let mut bytes = [0u8; 65];
        bytes[0] = 4;
        assert!(CompactSignature::from_hex(&hex::encode(bytes)).is_err());
    }

    #[test]
    fn test_address_is_stable_and_parseable() {
        let secp = Secp256k1::new();
        let public = test_key(9).public_key(&secp);
        let address = Address::from_public_key(&public);
        assert_eq!(address, Address::from_public_key(&public));
        assert_eq!(address, address.to_string().parse().unwrap());

        let other = test_key(10).public_key(&secp);
        assert_ne!(address, Address::from_public_key(&other));
    }

    #[test]
    fn test_shared_secret_is_symmetric() {
        let secp = Secp256k1::new();
        let (a_secret, a_public) = generate_keypair(&secp);
        let (b_secret, b_public) = generate_keypair(&secp);

        let ab = shared_secret(&a_secret, &b_public);
        let ba = shared_secret(&b_secret, &a_public);
        assert_eq!(ab, ba);

        let (c_secret, _) = generate_keypair(&secp);
        assert_ne!(shared_secret(&c_secret, &b_public)[..], ab[..]);
    }
}
