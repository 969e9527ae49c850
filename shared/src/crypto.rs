//! secp256k1 ECDSA signing and verification for transaction authentication

use crate::address::{Address, TESTNET_PREFIX};
use crate::{BlockchainError, Hash256, Result};
use secp256k1::ecdsa;
use secp256k1::{Message, PublicKey as SecpPublicKey, SecretKey, SECP256K1};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// A secp256k1 public key, stored compressed (33 bytes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    key_data: Vec<u8>,
}

/// A secp256k1 private key (32-byte scalar)
#[derive(Debug, Clone)]
pub struct PrivateKey {
    key_data: Vec<u8>,
}

/// A keypair used to sign transactions
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

/// A DER-encoded ECDSA signature, paired with the public key that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    data: Vec<u8>,
    public_key: PublicKey,
}

impl PublicKey {
    /// Creates a public key from compressed SEC1 bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not encode a valid curve point
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        SecpPublicKey::from_slice(&bytes)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        Ok(Self { key_data: bytes })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    /// Derives the canonical address for this public key under the given
    /// network prefix
    #[must_use]
    pub fn to_address(&self, prefix: &str) -> Address {
        Address::from_public_key_hex(prefix, &hex::encode(&self.key_data))
    }

    fn to_secp(&self) -> std::result::Result<SecpPublicKey, secp256k1::Error> {
        SecpPublicKey::from_slice(&self.key_data)
    }
}

impl PrivateKey {
    /// Creates a private key from a 32-byte scalar
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid secp256k1 scalar
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        SecretKey::from_slice(&bytes)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        Ok(Self { key_data: bytes })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    fn to_secp(&self) -> std::result::Result<SecretKey, secp256k1::Error> {
        SecretKey::from_slice(&self.key_data)
    }
}

impl KeyPair {
    /// Generates a new random keypair
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let (secret_key, public_key) = SECP256K1.generate_keypair(&mut rng);

        Ok(Self {
            public_key: PublicKey::from_bytes(public_key.serialize().to_vec())?,
            private_key: PrivateKey::from_bytes(secret_key.secret_bytes().to_vec())?,
        })
    }

    /// Reconstructs a keypair from a raw 32-byte private key scalar,
    /// deriving the matching public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid secp256k1 scalar.
    pub fn from_private_key(bytes: Vec<u8>) -> Result<Self> {
        let private_key = PrivateKey::from_bytes(bytes)?;
        let secret_key = private_key
            .to_secp()
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        let public_key = SecpPublicKey::from_secret_key(SECP256K1, &secret_key);

        Ok(Self {
            public_key: PublicKey::from_bytes(public_key.serialize().to_vec())?,
            private_key,
        })
    }

    /// Signs a 32-byte message digest with the private key
    ///
    /// # Errors
    ///
    /// Returns an error if the key is malformed
    pub fn sign(&self, message_hash: &Hash256) -> Result<Signature> {
        let secret_key = self
            .private_key
            .to_secp()
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        let message = Message::from_digest(*message_hash.as_bytes());
        let sig = SECP256K1.sign_ecdsa(&message, &secret_key);

        Ok(Signature {
            data: sig.serialize_der().to_vec(),
            public_key: self.public_key.clone(),
        })
    }

    /// Derives this keypair's address under the given network prefix
    #[must_use]
    pub fn address(&self, prefix: &str) -> Address {
        self.public_key.to_address(prefix)
    }
}

impl Signature {
    /// Verifies the signature against a 32-byte message digest.
    ///
    /// Malformed signatures or keys verify as `false` rather than propagating
    /// an error — signature validity is a boolean fact about untrusted input.
    #[must_use]
    pub fn verify(&self, message_hash: &Hash256) -> bool {
        let Ok(public_key) = self.public_key.to_secp() else {
            return false;
        };
        let Ok(sig) = ecdsa::Signature::from_der(&self.data) else {
            return false;
        };
        let message = Message::from_digest(*message_hash.as_bytes());
        SECP256K1.verify_ecdsa(&message, &sig, &public_key).is_ok()
    }

    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reconstructs a signature from its DER bytes and the signing public key
    #[must_use]
    pub const fn from_parts(data: Vec<u8>, public_key: PublicKey) -> Self {
        Self { data, public_key }
    }
}

impl Zeroize for PrivateKey {
    fn zeroize(&mut self) {
        self.key_data.zeroize();
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Signs a message digest with the given keypair
///
/// # Errors
///
/// Returns an error if the key is malformed
pub fn sign_message(message_hash: &Hash256, keypair: &KeyPair) -> Result<Signature> {
    keypair.sign(message_hash)
}

/// Verifies a signature against a message digest. Never panics on malformed
/// input; returns `false` instead.
#[must_use]
pub fn verify_message(message_hash: &Hash256, signature: &Signature) -> bool {
    signature.verify(message_hash)
}

/// Creates a public key from raw compressed SEC1 bytes
///
/// # Errors
///
/// Returns an error if the bytes are invalid
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_bytes(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_private_key_derives_the_same_public_key() {
        let original = KeyPair::generate().unwrap();
        let restored = KeyPair::from_private_key(original.private_key.as_bytes().to_vec()).unwrap();
        assert_eq!(original.public_key.as_bytes(), restored.public_key.as_bytes());
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let keypair = KeyPair::generate().unwrap();
        let message = Hash256::sha256(b"axn ledger transfer");

        let signature = keypair.sign(&message).unwrap();
        assert!(signature.verify(&message));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let keypair = KeyPair::generate().unwrap();
        let message = Hash256::sha256(b"original payload");
        let other = Hash256::sha256(b"tampered payload");

        let signature = keypair.sign(&message).unwrap();
        assert!(!signature.verify(&other));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let keypair_a = KeyPair::generate().unwrap();
        let keypair_b = KeyPair::generate().unwrap();
        let message = Hash256::sha256(b"axn ledger transfer");

        let signature = keypair_a.sign(&message).unwrap();
        let forged = Signature::from_parts(signature.as_bytes().to_vec(), keypair_b.public_key);
        assert!(!forged.verify(&message));
    }

    #[test]
    fn address_derivation_matches_public_key_helper() {
        let keypair = KeyPair::generate().unwrap();
        let via_keypair = keypair.address(TESTNET_PREFIX);
        let via_public_key = keypair.public_key.to_address(TESTNET_PREFIX);
        assert_eq!(via_keypair, via_public_key);
    }
}
