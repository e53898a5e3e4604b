use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::blockchain::{Block, LedgerStore};
use crate::mining::{MiningCoordinator, MiningState, MiningStats};

/// Shared application state: the ledger and the mining engine feeding it.
pub struct AppState {
    pub ledger: Arc<LedgerStore>,
    pub coordinator: Arc<MiningCoordinator>,
}

impl AppState {
    pub fn new(ledger: Arc<LedgerStore>, coordinator: Arc<MiningCoordinator>) -> Self {
        Self {
            ledger,
            coordinator,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct ChainResponse {
    pub length: usize,
    pub difficulty: u32,
    pub chain: Vec<Block>,
}

#[derive(Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
    pub difficulty: u32,
}

#[derive(Serialize, Deserialize)]
pub struct DifficultyResponse {
    pub difficulty: u32,
    pub min_difficulty: u32,
    pub max_difficulty: u32,
    pub target_block_time_secs: u64,
    pub adjust_window: usize,
    pub adjust_threshold_pct: f64,
    pub last_interval_secs: Option<f64>,
    pub avg_interval_secs: Option<f64>,
}

#[derive(Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
    pub balance_numi: f64,
}

/* ---------- Mining API Models ---------- */

#[derive(Deserialize)]
pub struct StartMiningRequest {
    #[serde(alias = "minerAddress")]
    pub miner_address: String,
}

#[derive(Serialize, Deserialize)]
pub struct StartMiningResponse {
    pub session_id: Uuid,
    pub miner_address: String,
    pub workers: usize,
}

#[derive(Serialize, Deserialize)]
pub struct StopMiningResponse {
    pub stopped: bool,
}

#[derive(Serialize)]
pub struct MiningStatusResponse {
    pub state: MiningState,
    pub active_miners: usize,
    pub stats: MiningStats,
}
