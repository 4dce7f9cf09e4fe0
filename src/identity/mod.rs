//! Node Identity
//!
//! A node is identified to the coordinator by a stable string id and proves
//! ownership of that id by signing join requests. Keys are secp256k1
//! keypairs; signatures are BIP-340 Schnorr over the SHA-256 digest of the
//! signed bytes. The id defaults to the bech32 `npub` of the public key and
//! may be overridden by configuration.

mod encoding;
mod local;

use secp256k1::schnorr::Signature;
use secp256k1::{Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use encoding::{decode_npub, decode_nsec, decode_secret, encode_npub, encode_nsec};
pub use local::Identity;

/// Errors that can occur in identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(#[from] secp256k1::Error),

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("invalid signature length: expected 64, got {0}")]
    InvalidSignatureLength(usize),

    #[error("bech32 encoding error: {0}")]
    Bech32Encode(#[from] bech32::EncodeError),

    #[error("bech32 decoding error: {0}")]
    Bech32Decode(#[from] bech32::DecodeError),

    #[error("invalid npub: expected 'npub' prefix, got '{0}'")]
    InvalidNpubPrefix(String),

    #[error("invalid npub: expected 32 bytes, got {0}")]
    InvalidNpubLength(usize),

    #[error("invalid nsec: expected 'nsec' prefix, got '{0}'")]
    InvalidNsecPrefix(String),

    #[error("invalid nsec: expected 32 bytes, got {0}")]
    InvalidNsecLength(usize),

    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Compute SHA-256 hash of data.
fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Verify a signature produced by [`Identity::sign`].
///
/// `signature` is the 64-byte serialized Schnorr signature carried on the
/// wire; `data` is the exact byte string that was signed.
pub fn verify_signature(
    pubkey: &XOnlyPublicKey,
    data: &[u8],
    signature: &[u8],
) -> Result<(), IdentityError> {
    if signature.len() != 64 {
        return Err(IdentityError::InvalidSignatureLength(signature.len()));
    }
    let signature = Signature::from_slice(signature)
        .map_err(|_| IdentityError::SignatureVerificationFailed)?;
    let digest = sha256(data);
    let secp = Secp256k1::verification_only();
    secp.verify_schnorr(&signature, &digest, pubkey)
        .map_err(|_| IdentityError::SignatureVerificationFailed)
}
