use super::Block;
use super::{DIFF_ADJUST_THRESHOLD_PCT, DIFF_ADJUST_WINDOW, DIFF_MAX, DIFF_MIN, TARGET_BLOCK_TIME_SECS};

/// Retargets difficulty from the average inter-block interval of the last
/// `window` blocks. Adjusts by at most one step per window.
#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyController {
    target_block_time_secs: u64,
    window: usize,
    threshold_pct: f64,
    min: u32,
    max: u32,
}

impl Default for DifficultyController {
    fn default() -> Self {
        Self::new(
            TARGET_BLOCK_TIME_SECS,
            DIFF_ADJUST_WINDOW,
            DIFF_ADJUST_THRESHOLD_PCT,
            DIFF_MIN,
            DIFF_MAX,
        )
    }
}

impl DifficultyController {
    /// Bounds are normalised so that `1 <= min <= max` and `window >= 1`.
    pub fn new(target_block_time_secs: u64, window: usize, threshold_pct: f64, min: u32, max: u32) -> Self {
        let min = min.max(1);
        Self {
            target_block_time_secs,
            window: window.max(1),
            threshold_pct,
            min,
            max: max.max(min),
        }
    }

    pub fn target_block_time_secs(&self) -> u64 {
        self.target_block_time_secs
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn threshold_pct(&self) -> f64 {
        self.threshold_pct
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.min, self.max)
    }

    pub fn clamp(&self, difficulty: u32) -> u32 {
        difficulty.clamp(self.min, self.max)
    }

    /// Average seconds between the last `window` blocks, if the chain is long
    /// enough to have that many intervals.
    pub fn average_interval_secs(&self, chain: &[Block]) -> Option<f64> {
        if chain.len() <= self.window {
            return None;
        }
        let newest = &chain[chain.len() - 1];
        let oldest = &chain[chain.len() - 1 - self.window];
        let span_ms = (newest.timestamp - oldest.timestamp).max(0);
        Some(span_ms as f64 / 1000.0 / self.window as f64)
    }

    /// Next difficulty after the head of `chain` was appended.
    /// Only moves when the head index closes a window.
    pub fn recompute(&self, chain: &[Block], current: u32) -> u32 {
        let Some(head) = chain.last() else {
            return current;
        };
        if head.index == 0 || head.index % self.window as u64 != 0 {
            return current;
        }
        let Some(avg) = self.average_interval_secs(chain) else {
            return current;
        };

        let target = self.target_block_time_secs as f64;
        let next = if avg < target * (1.0 - self.threshold_pct) {
            current.saturating_add(1)
        } else if avg > target * (1.0 + self.threshold_pct) {
            current.saturating_sub(1)
        } else {
            current
        };
        self.clamp(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_with_spacing(blocks: u64, spacing_ms: i64) -> Vec<Block> {
        (0..=blocks)
            .map(|i| Block {
                index: i,
                timestamp: 1_700_000_000_000 + i as i64 * spacing_ms,
                miner_address: "m".into(),
                nonce: 0,
                reward: 0,
                previous_hash: String::new(),
                hash: String::new(),
                difficulty: 1,
            })
            .collect()
    }

    fn ctl() -> DifficultyController {
        DifficultyController::new(30, 10, 0.20, 1, 6)
    }

    #[test]
    fn fast_window_increments_by_exactly_one() {
        let chain = chain_with_spacing(10, 5_000);
        assert_eq!(ctl().average_interval_secs(&chain), Some(5.0));
        assert_eq!(ctl().recompute(&chain, 2), 3);
    }

    #[test]
    fn no_change_inside_a_window() {
        let chain = chain_with_spacing(9, 5_000);
        assert_eq!(ctl().recompute(&chain, 2), 2);
    }

    #[test]
    fn slow_window_decrements() {
        let chain = chain_with_spacing(10, 60_000);
        assert_eq!(ctl().recompute(&chain, 3), 2);
    }

    #[test]
    fn on_target_window_is_stable() {
        let chain = chain_with_spacing(10, 31_000);
        assert_eq!(ctl().recompute(&chain, 3), 3);
    }

    #[test]
    fn never_below_one() {
        let slow = chain_with_spacing(10, 600_000);
        let mut d = 1;
        for _ in 0..50 {
            d = ctl().recompute(&slow, d);
            assert!(d >= 1);
        }
        assert_eq!(d, 1);
        assert_eq!(DifficultyController::new(30, 10, 0.2, 0, 0).bounds(), (1, 1));
    }

    #[test]
    fn capped_at_ceiling() {
        let fast = chain_with_spacing(10, 1);
        let mut d = 1;
        for _ in 0..50 {
            d = ctl().recompute(&fast, d);
        }
        assert_eq!(d, 6);
    }
}
