use log::info;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Identities currently mining. Backs the `active_miners` gauge only.
#[derive(Debug, Default)]
pub struct MinerRegistry {
    miners: Mutex<HashSet<String>>,
}

impl MinerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, miner_address: &str) {
        if self.miners.lock().insert(miner_address.to_string()) {
            info!("MINER - {} registered", miner_address);
        }
    }

    pub fn unregister(&self, miner_address: &str) {
        if self.miners.lock().remove(miner_address) {
            info!("MINER - {} unregistered", miner_address);
        }
    }

    pub fn len(&self) -> usize {
        self.miners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, miner_address: &str) -> bool {
        self.miners.lock().contains(miner_address)
    }
}
