//! Error types shared by the ledger, the mining engine and the config loader.

use thiserror::Error;

/// Append-time validation failures. Expected under racing workers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error(
        "invalid linkage: expected index {expected_index} on top of {expected_previous}, got index {got_index} on top of {got_previous}"
    )]
    InvalidLinkage {
        expected_index: u64,
        got_index: u64,
        expected_previous: String,
        got_previous: String,
    },

    #[error("invalid proof: {0}")]
    InvalidProof(String),
}

#[derive(Debug, Error)]
pub enum MiningError {
    #[error("mining is already running")]
    AlreadyRunning,

    #[error("mining is not running")]
    NotRunning,

    #[error("miner address must be a non-empty string")]
    InvalidMinerAddress,

    #[error("failed to spawn search worker: {0}")]
    WorkerSpawnFailure(#[from] std::io::Error),

    #[error("remote ledger failure: {0}")]
    RemoteLedgerFailure(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
