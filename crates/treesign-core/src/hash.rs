//! Hash values and the Merkle hash algorithm
//!
//! Every Merkle leaf, interior node and root in a round is a [`Hash32`].
//! Values compare byte-exact and order by raw byte value, which is the
//! order leaves are sorted in before a proof tree is built.
//!
//! The algorithm is pluggable through [`HashAlgorithm`] so a cipher suite can
//! name the hash it commits with. Current default: **SHA-256**.

use sha2::{Digest, Sha256};
use std::fmt;

/// Fixed-length 32-byte hash value
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    /// The all-zero hash, used as the root of an empty tree
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Build from a slice, failing unless it is exactly 32 bytes long
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for Hash32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix keeps round logs readable
        write!(f, "Hash32({}..)", &self.to_hex()[..12])
    }
}

/// Synchronous trait for cryptographic hashing
///
/// Implementations must be deterministic: the same bytes always produce the
/// same digest.
pub trait HashAlgorithm: Send + Sync + fmt::Debug {
    /// Hash arbitrary bytes to a 32-byte digest
    fn hash(&self, data: &[u8]) -> Hash32;

    /// Create an incremental hasher for multi-part hashing
    fn hasher(&self) -> Box<dyn Hasher>;
}

/// Trait for incremental hashing of multi-part data
pub trait Hasher: Send {
    /// Update the hasher with more data
    fn update(&mut self, data: &[u8]);

    /// Finalize the hasher and return the 32-byte digest
    fn finalize(self: Box<Self>) -> Hash32;
}

/// SHA-256 hash implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Algorithm;

impl HashAlgorithm for Sha256Algorithm {
    fn hash(&self, data: &[u8]) -> Hash32 {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Hash32(hasher.finalize().into())
    }

    fn hasher(&self) -> Box<dyn Hasher> {
        Box::new(Sha256Hasher(Sha256::new()))
    }
}

/// SHA-256 incremental hasher
struct Sha256Hasher(Sha256);

impl Hasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Hash32 {
        Hash32(self.0.finalize().into())
    }
}

/// The hash algorithm used when no suite says otherwise.
pub const ALGORITHM: Sha256Algorithm = Sha256Algorithm;

/// Hash with the default algorithm
#[inline]
pub fn hash(data: &[u8]) -> Hash32 {
    ALGORITHM.hash(data)
}

/// Incremental hasher using the default algorithm
#[inline]
pub fn hasher() -> Box<dyn Hasher> {
    ALGORITHM.hasher()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_determinism() {
        assert_eq!(hash(b"hello world"), hash(b"hello world"));
    }

    #[test]
    fn test_incremental_hasher_equivalence() {
        let mut h = hasher();
        h.update(b"hello");
        h.update(b" ");
        h.update(b"world");
        assert_eq!(h.finalize(), hash(b"hello world"));
    }

    #[test]
    fn test_sha256_known_vector() {
        // SHA256("") = e3b0c442...b855
        assert_eq!(
            hash(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let mut low = [0u8; 32];
        low[0] = 1;
        let mut high = [0u8; 32];
        high[0] = 2;
        high[31] = 0;
        assert!(Hash32(low) < Hash32(high));

        let mut tail = [0u8; 32];
        tail[31] = 0xff;
        assert!(Hash32(tail) < Hash32(low));
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(Hash32::from_slice(&[0u8; 31]).is_none());
        assert_eq!(Hash32::from_slice(&[7u8; 32]), Some(Hash32([7u8; 32])));
    }
}
