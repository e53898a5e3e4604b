pub mod block;
pub mod difficulty;
pub mod ledger;
pub mod pow;

pub use block::Block;
pub use difficulty::DifficultyController;
pub use ledger::{ChainStats, ChainTip, LedgerConfig, LedgerStore};
pub use pow::{BlockHasher, HashAlgorithm};

/// Default Proof-of-Work difficulty (number of leading zero hex chars).
pub const INITIAL_DIFFICULTY: u32 = 2;

/// Base units per NUMI.
pub const UNITS_PER_NUMI: u64 = 1_000_000_000;

/// Reward per block in base units (0.005 NUMI).
pub const BLOCK_REWARD: u64 = 5_000_000;

/// Target seconds per block for auto-adjust
pub const TARGET_BLOCK_TIME_SECS: u64 = 30;

/// How many recent intervals to average when adjusting difficulty
pub const DIFF_ADJUST_WINDOW: usize = 10;

/// Tolerance around the target before we adjust (+/- 20%)
pub const DIFF_ADJUST_THRESHOLD_PCT: f64 = 0.20;

/// Difficulty bounds (keep low in dev to avoid long waits)
pub const DIFF_MIN: u32 = 1;
pub const DIFF_MAX: u32 = 6;

/// Blocks considered for the reported average block time.
pub const STATS_BLOCK_WINDOW: usize = 20;

/// Display helper: base units as a decimal NUMI amount.
pub fn to_numi(units: u64) -> f64 {
    units as f64 / UNITS_PER_NUMI as f64
}
