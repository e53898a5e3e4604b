use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Length of a hex-encoded 256-bit digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Threshold a block hash must not exceed at a given difficulty:
/// `difficulty` leading `0` hex characters, padded with `f` to full width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target(String);

impl Target {
    pub fn for_difficulty(difficulty: u32) -> Self {
        let zeros = (difficulty as usize).min(DIGEST_HEX_LEN);
        let mut t = String::with_capacity(DIGEST_HEX_LEN);
        t.extend(std::iter::repeat_n('0', zeros));
        t.extend(std::iter::repeat_n('f', DIGEST_HEX_LEN - zeros));
        Self(t)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lexicographic comparison on lowercase hex equals numeric comparison
    /// of the underlying digests.
    pub fn is_met_by(&self, hash: &str) -> bool {
        hash.len() == DIGEST_HEX_LEN
            && hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
            && hash.as_bytes() <= self.0.as_bytes()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn target(difficulty: u32) -> Target {
    Target::for_difficulty(difficulty)
}

/// Does `hash` satisfy the proof-of-work target for `difficulty`?
/// Difficulty 0 accepts any well-formed hash.
pub fn meets(hash: &str, difficulty: u32) -> bool {
    target(difficulty).is_met_by(hash)
}

/// Hashing strategy used to seal and verify blocks.
pub trait BlockHasher: Send + Sync {
    fn name(&self) -> &'static str;

    fn digest(&self, payload: &[u8]) -> [u8; 32];

    fn hash_hex(&self, payload: &[u8]) -> String {
        hex::encode(self.digest(payload))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl BlockHasher for Sha256Hasher {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn digest(&self, payload: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        hasher.finalize().into()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

impl BlockHasher for Blake3Hasher {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn digest(&self, payload: &[u8]) -> [u8; 32] {
        blake3::hash(payload).into()
    }
}

/// Config-selectable hashing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn hasher(self) -> Arc<dyn BlockHasher> {
        match self {
            HashAlgorithm::Sha256 => Arc::new(Sha256Hasher),
            HashAlgorithm::Blake3 => Arc::new(Blake3Hasher),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unknown hash algorithm '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_has_leading_zeros_and_full_width() {
        let t = target(3);
        assert_eq!(t.as_str().len(), DIGEST_HEX_LEN);
        assert!(t.as_str().starts_with("000f"));
        assert_eq!(target(0).as_str(), "f".repeat(64));
        assert_eq!(target(100).as_str(), "0".repeat(64));
    }

    #[test]
    fn difficulty_zero_accepts_any_hash() {
        assert!(meets(&"f".repeat(64), 0));
        assert!(meets(&"0".repeat(64), 0));
        assert!(meets(&Sha256Hasher.hash_hex(b"anything"), 0));
    }

    #[test]
    fn meets_counts_leading_zeros() {
        let mut h = String::from("00");
        h.push_str(&"a".repeat(62));
        assert!(meets(&h, 1));
        assert!(meets(&h, 2));
        assert!(!meets(&h, 3));
    }

    #[test]
    fn meets_rejects_malformed_hashes() {
        assert!(!meets("00", 1));
        assert!(!meets(&"0".repeat(63), 0));
        let mut upper = String::from("0");
        upper.push_str(&"A".repeat(63));
        assert!(!meets(&upper, 1));
    }

    #[test]
    fn hashers_are_deterministic_and_distinct() {
        let a = Sha256Hasher.hash_hex(b"payload");
        assert_eq!(a, Sha256Hasher.hash_hex(b"payload"));
        assert_eq!(a.len(), DIGEST_HEX_LEN);
        let b = Blake3Hasher.hash_hex(b"payload");
        assert_eq!(b.len(), DIGEST_HEX_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn parses_algorithm_names() {
        assert_eq!("SHA256".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha256));
        assert_eq!("blake3".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Blake3));
        assert!("md5".parse::<HashAlgorithm>().is_err());
        assert_eq!(HashAlgorithm::Blake3.hasher().name(), "blake3");
    }
}
