//! Finite-field Diffie-Hellman over the RFC 3526 group 14 (2048-bit MODP).

use std::fmt;
use std::sync::LazyLock;

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use zeroize::Zeroize;

use crate::CryptoError;

/// Size of the group modulus in bits.
pub const KEY_BITS: u64 = 2048;

/// Encoded size of a public key (big-endian, left-padded).
pub const PUBLIC_KEY_LEN: usize = (KEY_BITS / 8) as usize;

const GENERATOR: u32 = 2;

const MODP_2048_PRIME: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1",
    "29024E088A67CC74020BBEA63B139B22514A08798E3404DD",
    "EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
    "E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
    "C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
    "83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9",
    "DE2BCBF6955817183995497CEA956AE515D2261898FA0510",
    "15728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

static PRIME: LazyLock<BigUint> = LazyLock::new(|| {
    BigUint::parse_bytes(MODP_2048_PRIME.as_bytes(), 16).expect("MODP prime is valid hex")
});

/// The group modulus `p`.
pub fn modp_prime() -> &'static BigUint {
    &PRIME
}

/// Secret exponent, in `[1, p - 1]`. Wiped from memory on drop.
pub struct PrivateKey(BigUint);

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl Zeroize for PrivateKey {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// `g^x mod p`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(BigUint);

impl PublicKey {
    /// Parses a peer key, rejecting the degenerate values `0`, `1`, `p - 1`
    /// and anything outside the group.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let value = BigUint::from_bytes_be(bytes);
        let upper = modp_prime() - 1u32;
        if value <= BigUint::one() || value >= upper {
            return Err(CryptoError::InvalidPublicKey);
        }
        Ok(Self(value))
    }

    /// Big-endian encoding, left-padded to [`PUBLIC_KEY_LEN`].
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        left_pad(&self.0)
    }
}

/// `peer^x mod p`, the value both sides agree on.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(BigUint);

impl SharedSecret {
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        left_pad(&self.0)
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

fn left_pad(value: &BigUint) -> [u8; PUBLIC_KEY_LEN] {
    let raw = value.to_bytes_be();
    let mut out = [0u8; PUBLIC_KEY_LEN];
    out[PUBLIC_KEY_LEN - raw.len()..].copy_from_slice(&raw);
    out
}

/// Draws a private key uniformly from `[1, p - 1]`.
///
/// Candidates are `bits`-bit random integers; out-of-range draws are
/// rejected and redrawn rather than reduced, so there is no modulo bias.
pub fn generate_private_key(bits: u64) -> Result<PrivateKey, CryptoError> {
    if bits == 0 || bits > KEY_BITS {
        return Err(CryptoError::InvalidKeySize(bits));
    }
    let upper = modp_prime() - 1u32;
    let mut rng = rand::thread_rng();
    loop {
        let candidate = PrivateKey(rng.gen_biguint(bits));
        if !candidate.0.is_zero() && candidate.0 <= upper {
            return Ok(candidate);
        }
    }
}

pub fn compute_public_key(private: &PrivateKey) -> PublicKey {
    PublicKey(mod_pow(
        &BigUint::from(GENERATOR),
        &private.0,
        modp_prime(),
    ))
}

pub fn compute_shared_secret(peer: &PublicKey, private: &PrivateKey) -> SharedSecret {
    SharedSecret(mod_pow(&peer.0, &private.0, modp_prime()))
}

/// Left-to-right binary (square-and-multiply) modular exponentiation.
pub fn mod_pow(base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> BigUint {
    if modulus.is_one() {
        return BigUint::zero();
    }
    let base = base % modulus;
    let mut result = BigUint::one();
    for bit in (0..exponent.bits()).rev() {
        result = &result * &result % modulus;
        if exponent.bit(bit) {
            result = result * &base % modulus;
        }
    }
    result
}

/// A fresh key pair for one transfer.
#[derive(Debug)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let private = generate_private_key(KEY_BITS)?;
        let public = compute_public_key(&private);
        Ok(Self { private, public })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Combines our private key with the peer's public key.
    pub fn agree(&self, peer: &PublicKey) -> SharedSecret {
        compute_shared_secret(peer, &self.private)
    }
}
