pub mod coordinator;
pub mod registry;
pub mod stats;
pub mod submitter;
pub mod worker;

pub use coordinator::{MiningConfig, MiningCoordinator, MiningState};
pub use registry::MinerRegistry;
pub use stats::MiningStats;
pub use submitter::{BlockSubmitter, LocalSubmitter, RemoteSubmitter, SubmitOutcome};
