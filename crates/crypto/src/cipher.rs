//! Key derivation and AES-256-CTR payload encryption.

use aes::Aes256;
use ctr::Ctr128BE;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use rand::Rng;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::CryptoError;
use crate::dh::SharedSecret;

/// Symmetric key length (AES-256).
pub const KEY_LEN: usize = 32;

/// Counter block / IV length.
pub const IV_LEN: usize = 16;

const KDF_INFO: &[u8] = b"lanshare payload v1";

type Aes256Ctr = Ctr128BE<Aes256>;

/// Derived payload key; wiped from memory on drop.
pub struct SymmetricKey(Zeroizing<[u8; KEY_LEN]>);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Runs the shared secret through HKDF-SHA256 to get the payload key.
pub fn derive_key(secret: &SharedSecret) -> Result<SymmetricKey, CryptoError> {
    let ikm = Zeroizing::new(secret.to_bytes());
    let hkdf = Hkdf::<Sha256>::new(None, ikm.as_ref());
    let mut key = [0u8; KEY_LEN];
    hkdf.expand(KDF_INFO, &mut key)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(SymmetricKey::from_bytes(key))
}

/// Fresh random IV for one transfer.
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill(&mut iv);
    iv
}

/// Streaming AES-256-CTR keyed for one transfer.
///
/// Encryption and decryption are the same operation; chunks must be fed in
/// stream order.
pub struct PayloadCipher {
    inner: Aes256Ctr,
}

impl PayloadCipher {
    pub fn new(key: &SymmetricKey, iv: &[u8; IV_LEN]) -> Self {
        Self {
            inner: Aes256Ctr::new(key.as_bytes().into(), iv.into()),
        }
    }

    /// Encrypts or decrypts `buf` in place.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
    }
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PayloadCipher(..)")
    }
}

/// One-shot encryption of a whole buffer.
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey, iv: &[u8; IV_LEN]) -> Vec<u8> {
    let mut out = plaintext.to_vec();
    PayloadCipher::new(key, iv).apply(&mut out);
    out
}

/// One-shot decryption of a whole buffer.
pub fn decrypt(ciphertext: &[u8], key: &SymmetricKey, iv: &[u8; IV_LEN]) -> Vec<u8> {
    encrypt(ciphertext, key, iv)
}
