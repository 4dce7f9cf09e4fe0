//! Local node identity with signing capability.

use rand::RngCore;
use secp256k1::{Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
use std::fmt;

use super::encoding::{decode_secret, encode_npub};
use super::{sha256, IdentityError};

/// The node's identity: a secp256k1 keypair plus the id string presented
/// to the coordinator.
///
/// Immutable once built; the session layer holds it behind an `Arc`.
pub struct Identity {
    keypair: Keypair,
    node_id: String,
}

impl Identity {
    /// Create a new random identity.
    pub fn generate() -> Self {
        loop {
            let mut secret_bytes = [0u8; 32];
            rand::rng().fill_bytes(&mut secret_bytes);
            // Out-of-range scalars are astronomically rare; draw again.
            if let Ok(secret_key) = SecretKey::from_slice(&secret_bytes) {
                return Self::from_secret_key(secret_key);
            }
        }
    }

    /// Create an identity from a secret key. The node id is the npub.
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &secret_key);
        let node_id = encode_npub(&keypair.x_only_public_key().0);
        Self { keypair, node_id }
    }

    /// Create an identity from secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, IdentityError> {
        let secret_key = SecretKey::from_slice(bytes)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Create an identity from an nsec string (bech32) or hex-encoded secret.
    pub fn from_secret_str(s: &str) -> Result<Self, IdentityError> {
        let secret_key = decode_secret(s)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Replace the node id presented to the coordinator.
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// The id string this node joins under.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Return the x-only public key.
    pub fn pubkey(&self) -> XOnlyPublicKey {
        self.keypair.x_only_public_key().0
    }

    /// Return the public key as a bech32-encoded npub string (NIP-19).
    pub fn npub(&self) -> String {
        encode_npub(&self.pubkey())
    }

    /// Sign arbitrary data with this identity's secret key.
    ///
    /// Returns the 64-byte Schnorr signature over SHA-256(data).
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let secp = Secp256k1::new();
        let digest = sha256(data);
        secp.sign_schnorr(&digest, &self.keypair).serialize().to_vec()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}
