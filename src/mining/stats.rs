use serde::Serialize;
use uuid::Uuid;

use super::worker::WorkerSample;

/// Telemetry snapshot handed to stats subscribers every tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MiningStats {
    pub session_id: Option<Uuid>,
    pub is_mining: bool,
    pub hash_rate: f64,
    pub total_hashes: u64,
    pub current_block_index: u64,
    pub difficulty: u32,
    pub blocks_mined: u64,
    pub active_workers: usize,
    pub reporting_workers: usize,
}

/// Merges pulled worker samples into session-wide telemetry.
///
/// Accounting is cumulative: each worker reports its running total, the
/// aggregator keeps the latest total per worker and sums them. A worker that
/// does not answer a tick adds zero to that tick's rate and keeps its last
/// total.
#[derive(Debug)]
pub struct StatsAggregator {
    session_id: Uuid,
    totals: Vec<u64>,
    rates: Vec<Option<f64>>,
    tick: u64,
    blocks_mined: u64,
}

impl StatsAggregator {
    pub fn new(session_id: Uuid, workers: usize) -> Self {
        Self {
            session_id,
            totals: vec![0; workers],
            rates: vec![None; workers],
            tick: 0,
            blocks_mined: 0,
        }
    }

    /// Open a new sampling round; samples for older rounds are ignored.
    pub fn begin_tick(&mut self) -> u64 {
        self.tick += 1;
        self.rates.iter_mut().for_each(|r| *r = None);
        self.tick
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Returns false for late or unknown samples.
    pub fn record(&mut self, sample: &WorkerSample) -> bool {
        if sample.tick != self.tick || sample.worker_id >= self.totals.len() {
            return false;
        }
        let id = sample.worker_id;
        self.totals[id] = self.totals[id].max(sample.total_hashes);
        self.rates[id] = Some(sample.hash_rate.max(0.0));
        true
    }

    /// Take a sample that arrived outside the sampling rounds (a winner's
    /// counters). It counts toward the open round whatever its tick.
    pub fn absorb(&mut self, sample: &WorkerSample) -> bool {
        let Some(total) = self.totals.get_mut(sample.worker_id) else {
            return false;
        };
        *total = (*total).max(sample.total_hashes);
        self.rates[sample.worker_id] = Some(sample.hash_rate.max(0.0));
        true
    }

    pub fn is_complete(&self) -> bool {
        self.rates.iter().all(Option::is_some)
    }

    pub fn block_mined(&mut self) {
        self.blocks_mined += 1;
    }

    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined
    }

    pub fn snapshot(&self, current_block_index: u64, difficulty: u32) -> MiningStats {
        MiningStats {
            session_id: Some(self.session_id),
            is_mining: true,
            hash_rate: self.rates.iter().flatten().sum(),
            total_hashes: self.totals.iter().sum(),
            current_block_index,
            difficulty,
            blocks_mined: self.blocks_mined,
            active_workers: self.totals.len(),
            reporting_workers: self.rates.iter().filter(|r| r.is_some()).count(),
        }
    }
}
