//! Per-transfer key agreement and payload encryption.
//!
//! Each transfer generates a fresh Diffie-Hellman key pair over the
//! RFC 3526 2048-bit MODP group, derives a 32-byte key from the shared
//! secret with HKDF-SHA256 and encrypts the payload with AES-256-CTR.
//! Nothing here is ever written to disk.

pub mod cipher;
pub mod dh;

pub use cipher::{
    IV_LEN, KEY_LEN, PayloadCipher, SymmetricKey, decrypt, derive_key, encrypt, generate_iv,
};
pub use dh::{
    KEY_BITS, KeyPair, PUBLIC_KEY_LEN, PrivateKey, PublicKey, SharedSecret, compute_public_key,
    compute_shared_secret, generate_private_key,
};

/// Errors produced by key agreement.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid private key size: {0} bits (max {max})", max = dh::KEY_BITS)]
    InvalidKeySize(u64),

    #[error("invalid peer public key")]
    InvalidPublicKey,

    #[error("key derivation failed")]
    KeyDerivation,
}
