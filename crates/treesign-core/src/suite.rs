//! Cipher suites: the group, hash and deterministic generator a round uses
//!
//! Rounds are generic over [`CipherSuite`] and only ever touch scalars and
//! points through it. [`Ristretto255Suite`] is the concrete suite built on
//! `curve25519-dalek` Ristretto points with SHA-256 as the Merkle hash.

use crate::hash::{Hash32, HashAlgorithm, Sha256Algorithm};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRng, RngCore, SeedableRng};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha512};
use std::fmt::Debug;
use std::ops::{Add, Mul, Neg, Sub};
use zeroize::Zeroize;

/// Group, hash and generator operations consumed by a signing round
pub trait CipherSuite: Clone + Debug + Send + Sync + 'static {
    /// Secret scalar
    type Scalar: Copy
        + Eq
        + Debug
        + Send
        + Sync
        + Zeroize
        + Serialize
        + DeserializeOwned
        + Add<Output = Self::Scalar>
        + Sub<Output = Self::Scalar>
        + Mul<Output = Self::Scalar>
        + Neg<Output = Self::Scalar>;

    /// Group element
    type Point: Copy
        + Eq
        + Debug
        + Send
        + Sync
        + Serialize
        + DeserializeOwned
        + Add<Output = Self::Point>
        + Sub<Output = Self::Point>
        + Neg<Output = Self::Point>;

    /// Hash algorithm used for Merkle trees and the commitment log
    fn hash_algorithm(&self) -> &dyn HashAlgorithm;

    /// Uniformly random scalar drawn from `rng`
    fn pick_scalar<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Self::Scalar;

    /// Additive identity scalar
    fn zero_scalar(&self) -> Self::Scalar;

    /// `g^s`
    fn mul_base(&self, s: &Self::Scalar) -> Self::Point;

    /// `p^s`
    fn mul_point(&self, p: &Self::Point, s: &Self::Scalar) -> Self::Point;

    /// Group identity
    fn null_point(&self) -> Self::Point;

    /// Canonical byte encoding of a point
    fn point_bytes(&self, p: &Self::Point) -> Vec<u8>;

    /// Reduce 64 uniformly distributed bytes to a scalar
    fn scalar_from_wide(&self, wide: &[u8; 64]) -> Self::Scalar;

    /// Hash with the suite's Merkle hash
    fn hash(&self, data: &[u8]) -> Hash32 {
        self.hash_algorithm().hash(data)
    }

    /// Deterministic generator keyed by `seed`
    fn cipher(&self, seed: &[u8]) -> ChaCha20Rng {
        ChaCha20Rng::from_seed(self.hash(seed).0)
    }

    /// Fiat-Shamir challenge over a point and a message
    fn hash_elgamal(&self, message: &[u8], point: &Self::Point) -> Self::Scalar {
        let mut h = Sha512::new();
        h.update(self.point_bytes(point));
        h.update(message);
        let mut wide = [0u8; 64];
        wide.copy_from_slice(&h.finalize());
        self.scalar_from_wide(&wide)
    }
}

/// Ristretto255 group with SHA-256 Merkle hashing
#[derive(Debug, Clone, Copy, Default)]
pub struct Ristretto255Suite {
    hash: Sha256Algorithm,
}

impl Ristretto255Suite {
    /// Create the suite
    pub fn new() -> Self {
        Self::default()
    }
}

impl CipherSuite for Ristretto255Suite {
    type Scalar = Scalar;
    type Point = RistrettoPoint;

    fn hash_algorithm(&self) -> &dyn HashAlgorithm {
        &self.hash
    }

    fn pick_scalar<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Scalar {
        let mut wide = [0u8; 64];
        rng.fill_bytes(&mut wide);
        let s = Scalar::from_bytes_mod_order_wide(&wide);
        wide.zeroize();
        s
    }

    fn zero_scalar(&self) -> Scalar {
        Scalar::ZERO
    }

    fn mul_base(&self, s: &Scalar) -> RistrettoPoint {
        RISTRETTO_BASEPOINT_POINT * s
    }

    fn mul_point(&self, p: &RistrettoPoint, s: &Scalar) -> RistrettoPoint {
        p * s
    }

    fn null_point(&self) -> RistrettoPoint {
        RistrettoPoint::identity()
    }

    fn point_bytes(&self, p: &RistrettoPoint) -> Vec<u8> {
        p.compress().to_bytes().to_vec()
    }

    fn scalar_from_wide(&self, wide: &[u8; 64]) -> Scalar {
        Scalar::from_bytes_mod_order_wide(wide)
    }
}

/// A node's long-term signing key pair
#[derive(Clone)]
pub struct KeyPair<S: CipherSuite> {
    /// Secret scalar `x`
    pub private_key: S::Scalar,
    /// `X = g^x`
    pub public_key: S::Point,
}

impl<S: CipherSuite> KeyPair<S> {
    /// Generate a fresh key pair
    pub fn generate<R: RngCore + CryptoRng>(suite: &S, rng: &mut R) -> Self {
        let private_key = suite.pick_scalar(rng);
        let public_key = suite.mul_base(&private_key);
        Self {
            private_key,
            public_key,
        }
    }
}

impl<S: CipherSuite> Debug for KeyPair<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl<S: CipherSuite> Drop for KeyPair<S> {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::RngCore;

    #[test]
    fn test_cipher_is_deterministic() {
        let suite = Ristretto255Suite::new();
        let mut a = suite.cipher(b"node-1");
        let mut b = suite.cipher(b"node-1");
        let mut c = suite.cipher(b"node-2");
        assert_eq!(a.next_u64(), b.next_u64());
        assert_ne!(a.next_u64(), c.next_u64());
    }

    #[test]
    fn test_schnorr_relation() {
        let suite = Ristretto255Suite::new();
        let mut rng = suite.cipher(b"schnorr");
        let keys = KeyPair::generate(&suite, &mut rng);
        let v = suite.pick_scalar(&mut rng);
        let big_v = suite.mul_base(&v);
        let c = suite.hash_elgamal(b"msg", &big_v);
        let r = v - keys.private_key * c;
        let t = suite.mul_base(&r) + suite.mul_point(&keys.public_key, &c);
        assert_eq!(t, big_v);
    }

    #[test]
    fn test_hash_elgamal_binds_message_and_point() {
        let suite = Ristretto255Suite::new();
        let mut rng = suite.cipher(b"bind");
        let p = suite.mul_base(&suite.pick_scalar(&mut rng));
        let q = suite.mul_base(&suite.pick_scalar(&mut rng));
        assert_ne!(suite.hash_elgamal(b"a", &p), suite.hash_elgamal(b"b", &p));
        assert_ne!(suite.hash_elgamal(b"a", &p), suite.hash_elgamal(b"a", &q));
    }

    #[test]
    fn test_null_point_is_additive_identity() {
        let suite = Ristretto255Suite::new();
        let mut rng = suite.cipher(b"null");
        let p = suite.mul_base(&suite.pick_scalar(&mut rng));
        assert_eq!(p + suite.null_point(), p);
        assert_eq!(p - p, suite.null_point());
    }
}
