use log::{debug, info};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use super::pow::{BlockHasher, meets};
use super::{Block, DifficultyController, INITIAL_DIFFICULTY, STATS_BLOCK_WINDOW};
use crate::error::LedgerError;
use crate::events::{SubscriptionId, Subscribers};

/// What a miner needs to build the next candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ChainTip {
    pub index: u64,
    pub hash: String,
    pub difficulty: u32,
    pub reward: u64,
}

impl ChainTip {
    pub fn next_index(&self) -> u64 {
        self.index + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainStats {
    pub total_blocks: usize,
    pub total_supply: u64,
    pub current_difficulty: u32,
    pub average_block_time: f64, // seconds, over the last STATS_BLOCK_WINDOW blocks
    pub active_miners: usize,
    pub last_block_time: i64,
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub initial_difficulty: u32,
    pub block_reward: u64,
    pub controller: DifficultyController,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_difficulty: INITIAL_DIFFICULTY,
            block_reward: super::BLOCK_REWARD,
            controller: DifficultyController::default(),
        }
    }
}

/// Check a candidate against the current head.
///
/// Linkage is checked first so a stale or duplicate submission always
/// reports `InvalidLinkage`, whatever its proof looks like.
pub fn validate_candidate(
    head: &Block,
    candidate: &Block,
    hasher: &dyn BlockHasher,
    required_difficulty: u32,
    block_reward: u64,
) -> Result<(), LedgerError> {
    if candidate.index != head.index + 1 || candidate.previous_hash != head.hash {
        return Err(LedgerError::InvalidLinkage {
            expected_index: head.index + 1,
            got_index: candidate.index,
            expected_previous: head.hash.clone(),
            got_previous: candidate.previous_hash.clone(),
        });
    }

    let recomputed = candidate.compute_hash(hasher);
    if recomputed != candidate.hash {
        return Err(LedgerError::InvalidProof(format!(
            "hash mismatch: block claims {}, content hashes to {}",
            candidate.hash, recomputed
        )));
    }
    if candidate.difficulty < required_difficulty {
        return Err(LedgerError::InvalidProof(format!(
            "difficulty {} below required {}",
            candidate.difficulty, required_difficulty
        )));
    }
    if !meets(&candidate.hash, candidate.difficulty) {
        return Err(LedgerError::InvalidProof(format!(
            "hash {} does not meet difficulty {}",
            candidate.hash, candidate.difficulty
        )));
    }
    if candidate.reward != block_reward {
        return Err(LedgerError::InvalidProof(format!(
            "reward claim {} differs from block reward {}",
            candidate.reward, block_reward
        )));
    }
    if candidate.miner_address.trim().is_empty() {
        return Err(LedgerError::InvalidProof("empty miner address".into()));
    }
    Ok(())
}

/// The chain itself. Only reachable through `LedgerStore`.
struct Ledger {
    chain: Vec<Block>,
    difficulty: u32,
    total_supply: u64,
    block_reward: u64,
    controller: DifficultyController,
    hasher: Arc<dyn BlockHasher>,
}

impl Ledger {
    fn new(config: LedgerConfig, hasher: Arc<dyn BlockHasher>) -> Self {
        let difficulty = config.controller.clamp(config.initial_difficulty);
        let genesis = Block::genesis(difficulty, hasher.as_ref());
        Self {
            chain: vec![genesis],
            difficulty,
            total_supply: 0,
            block_reward: config.block_reward,
            controller: config.controller,
            hasher,
        }
    }

    fn head(&self) -> &Block {
        // The genesis block is created in `new` and nothing ever pops.
        &self.chain[self.chain.len() - 1]
    }

    fn append(&mut self, candidate: Block) -> Result<(), LedgerError> {
        validate_candidate(
            self.head(),
            &candidate,
            self.hasher.as_ref(),
            self.difficulty,
            self.block_reward,
        )?;

        self.total_supply = self.total_supply.saturating_add(candidate.reward);
        self.chain.push(candidate);

        let next = self.controller.recompute(&self.chain, self.difficulty);
        if next != self.difficulty {
            info!(
                "DIFFICULTY - retarget at block #{}: {} -> {}",
                self.head().index,
                self.difficulty,
                next
            );
            self.difficulty = next;
        }
        Ok(())
    }

    fn average_block_time_secs(&self) -> f64 {
        let n = self.chain.len().min(STATS_BLOCK_WINDOW);
        if n < 2 {
            return 0.0;
        }
        let recent = &self.chain[self.chain.len() - n..];
        let span_ms = (recent[n - 1].timestamp - recent[0].timestamp).max(0);
        span_ms as f64 / 1000.0 / (n - 1) as f64
    }

    fn is_valid_chain(&self) -> bool {
        let genesis = &self.chain[0];
        if genesis.index != 0
            || genesis.reward != 0
            || genesis.previous_hash.bytes().any(|b| b != b'0')
            || genesis.hash != genesis.compute_hash(self.hasher.as_ref())
        {
            return false;
        }
        self.chain.windows(2).all(|pair| {
            let (prev, current) = (&pair[0], &pair[1]);
            current.index == prev.index + 1
                && current.previous_hash == prev.hash
                && current.is_valid(self.hasher.as_ref())
        })
    }
}

/// Owner of the append-only chain.
///
/// All mutation goes through [`LedgerStore::append`], which validates and
/// appends under a single write lock; block subscribers are notified after
/// the lock is released.
pub struct LedgerStore {
    inner: RwLock<Ledger>,
    subscribers: Subscribers<Block>,
}

impl LedgerStore {
    pub fn new(config: LedgerConfig, hasher: Arc<dyn BlockHasher>) -> Self {
        let ledger = Ledger::new(config, hasher);
        debug!(
            "LEDGER - genesis {} (difficulty {})",
            ledger.head().hash,
            ledger.difficulty
        );
        Self {
            inner: RwLock::new(ledger),
            subscribers: Subscribers::new(),
        }
    }

    pub fn genesis(&self) -> Block {
        self.inner.read().chain[0].clone()
    }

    /// Validate `candidate` against the head and append it.
    /// Out-of-order and duplicate submissions are rejected, never retried.
    pub fn append(&self, candidate: Block) -> Result<Block, LedgerError> {
        let appended = {
            let mut ledger = self.inner.write();
            ledger.append(candidate)?;
            ledger.head().clone()
        };
        info!(
            "LEDGER - block #{} appended (miner={}, reward={}, hash={})",
            appended.index, appended.miner_address, appended.reward, appended.hash
        );
        self.subscribers.notify(&appended);
        Ok(appended)
    }

    /// Sum of rewards of blocks mined by `miner_address`.
    ///
    /// Full scan of the chain; fine for an in-memory demo chain, a long-lived
    /// chain would keep an incremental balance table instead.
    pub fn balance(&self, miner_address: &str) -> u64 {
        self.inner
            .read()
            .chain
            .iter()
            .filter(|b| b.miner_address == miner_address)
            .map(|b| b.reward)
            .sum()
    }

    pub fn chain(&self) -> Vec<Block> {
        self.inner.read().chain.clone()
    }

    pub fn head(&self) -> Block {
        self.inner.read().head().clone()
    }

    pub fn tip(&self) -> ChainTip {
        let ledger = self.inner.read();
        let head = ledger.head();
        ChainTip {
            index: head.index,
            hash: head.hash.clone(),
            difficulty: ledger.difficulty,
            reward: ledger.block_reward,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().chain.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn difficulty(&self) -> u32 {
        self.inner.read().difficulty
    }

    pub fn total_supply(&self) -> u64 {
        self.inner.read().total_supply
    }

    pub fn controller(&self) -> DifficultyController {
        self.inner.read().controller.clone()
    }

    pub fn hasher(&self) -> Arc<dyn BlockHasher> {
        Arc::clone(&self.inner.read().hasher)
    }

    /// Seconds between the last two blocks and the retarget-window average.
    pub fn recent_intervals(&self) -> (Option<f64>, Option<f64>) {
        let ledger = self.inner.read();
        let last = match ledger.chain.as_slice() {
            [.., older, newer] => Some((newer.timestamp - older.timestamp).max(0) as f64 / 1000.0),
            _ => None,
        };
        (last, ledger.controller.average_interval_secs(&ledger.chain))
    }

    pub fn stats(&self, active_miners: usize) -> ChainStats {
        let ledger = self.inner.read();
        ChainStats {
            total_blocks: ledger.chain.len(),
            total_supply: ledger.total_supply,
            current_difficulty: ledger.difficulty,
            average_block_time: ledger.average_block_time_secs(),
            active_miners,
            last_block_time: ledger.head().timestamp,
        }
    }

    pub fn is_valid_chain(&self) -> bool {
        self.inner.read().is_valid_chain()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Block) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}
