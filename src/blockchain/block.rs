use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use super::pow::{BlockHasher, DIGEST_HEX_LEN, meets};

/// Address recorded on the genesis block.
pub const GENESIS_MINER: &str = "0x0000000000000000000000000000000000000000";

/// A single block in the chain: one reward claim backed by proof-of-work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64, // Unix millis (UTC)
    pub miner_address: String,
    pub nonce: u64,
    pub reward: u64, // base units, see UNITS_PER_NUMI
    pub previous_hash: String,
    pub hash: String,
    pub difficulty: u32,
}

impl Block {
    /// Create the genesis block: index 0, all-zero previous hash, no reward.
    pub fn genesis(difficulty: u32, hasher: &dyn BlockHasher) -> Self {
        let mut block = Self {
            index: 0,
            timestamp: Utc::now().timestamp_millis(),
            miner_address: GENESIS_MINER.to_string(),
            nonce: 0,
            reward: 0,
            previous_hash: "0".repeat(DIGEST_HEX_LEN),
            hash: String::new(),
            difficulty,
        };
        block.hash = block.compute_hash(hasher);
        block
    }

    /// Create an unsealed candidate on top of `previous_hash`.
    pub fn candidate(
        index: u64,
        previous_hash: String,
        miner_address: String,
        reward: u64,
        difficulty: u32,
    ) -> Self {
        Self {
            index,
            timestamp: Utc::now().timestamp_millis(),
            miner_address,
            nonce: 0,
            reward,
            previous_hash,
            hash: String::new(),
            difficulty,
        }
    }

    /// Append the canonical preimage (every field except `hash`) to `out`.
    pub fn write_payload(&self, out: &mut String) {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "{}:{}:{}:{}:{}:{}:{}",
            self.index,
            self.timestamp,
            self.miner_address,
            self.nonce,
            self.reward,
            self.previous_hash,
            self.difficulty
        );
    }

    pub fn payload(&self) -> String {
        let mut out = String::with_capacity(160 + self.miner_address.len());
        self.write_payload(&mut out);
        out
    }

    pub fn compute_hash(&self, hasher: &dyn BlockHasher) -> String {
        hasher.hash_hex(self.payload().as_bytes())
    }

    /// Search nonces sequentially until the hash meets `self.difficulty`.
    /// Single-threaded; the mining engine does the parallel search.
    ///
    /// Returns false, without searching, when the difficulty asks for a
    /// digest of nothing but zeros.
    pub fn seal(&mut self, hasher: &dyn BlockHasher) -> bool {
        if self.difficulty as usize >= DIGEST_HEX_LEN {
            return false;
        }
        loop {
            self.hash = self.compute_hash(hasher);
            if meets(&self.hash, self.difficulty) {
                return true;
            }
            self.nonce = self.nonce.wrapping_add(1);
        }
    }

    /// Cached `hash` matches the content and satisfies the block's own
    /// difficulty. Does NOT validate chain linkage.
    pub fn is_valid(&self, hasher: &dyn BlockHasher) -> bool {
        self.hash == self.compute_hash(hasher) && meets(&self.hash, self.difficulty)
    }
}

#[cfg(test)]
mod tests {
    use super::Block;
    use crate::blockchain::pow::{Blake3Hasher, Sha256Hasher};

    #[test]
    fn genesis_has_sentinel_fields() {
        let b = Block::genesis(2, &Sha256Hasher);
        assert_eq!(b.index, 0);
        assert_eq!(b.reward, 0);
        assert_eq!(b.previous_hash, "0".repeat(64));
        assert_eq!(b.hash, b.compute_hash(&Sha256Hasher));
    }

    #[test]
    fn sealing_produces_leading_zeros() {
        let mut b = Block::candidate(1, "ab".repeat(32), "miner".into(), 5, 2);
        assert!(b.seal(&Sha256Hasher));
        assert!(b.hash.starts_with("00"));
        assert!(b.is_valid(&Sha256Hasher));
        assert!(!b.is_valid(&Blake3Hasher));
    }

    #[test]
    fn sealing_refuses_an_all_zero_target() {
        let mut b = Block::candidate(1, "ab".repeat(32), "miner".into(), 5, 64);
        assert!(!b.seal(&Sha256Hasher));
        assert_eq!(b.nonce, 0);
        assert!(b.hash.is_empty());

        b.difficulty = 200;
        assert!(!b.seal(&Sha256Hasher));
    }

    #[test]
    fn invalid_when_mutated() {
        let mut b = Block::candidate(2, "cd".repeat(32), "miner".into(), 5, 1);
        b.seal(&Sha256Hasher);
        let old_hash = b.hash.clone();

        b.reward = 5_000;

        assert_ne!(old_hash, b.compute_hash(&Sha256Hasher));
        assert!(!b.is_valid(&Sha256Hasher));
    }

    #[test]
    fn payload_covers_every_field_but_hash() {
        let b = Block::candidate(7, "ff".repeat(32), "alice".into(), 9, 3);
        let p = b.payload();
        assert!(p.starts_with("7:"));
        assert!(p.contains(":alice:"));
        assert!(p.ends_with(":3"));

        let mut with_hash = b.clone();
        with_hash.hash = "deadbeef".into();
        assert_eq!(with_hash.payload(), p);
    }
}
