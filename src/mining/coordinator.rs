//! Mining coordinator: owns the worker pool and the Idle -> Running -> Idle
//! state machine, feeds templates to workers and hands winners to the ledger.

use crossbeam_channel::{Receiver, Sender, after, bounded, never, select, tick, unbounded};
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::registry::MinerRegistry;
use super::stats::{MiningStats, StatsAggregator};
use super::submitter::BlockSubmitter;
use super::worker::{CancelToken, Job, Template, WorkerCommand, WorkerEvent, WorkerHandle};
use crate::blockchain::{Block, BlockHasher, ChainTip};
use crate::error::MiningError;
use crate::events::{BlockEvent, SubscriptionId, Subscribers};

/// Default telemetry cadence.
pub const STATS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningConfig {
    /// Search workers per session, 0 = host concurrency.
    pub workers: usize,
    pub stats_interval: Duration,
    /// Alert when no block is appended for this long.
    pub watchdog: Option<Duration>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            stats_interval: STATS_INTERVAL,
            watchdog: None,
        }
    }
}

impl MiningConfig {
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MiningState {
    Idle,
    Running,
    Stopping,
}

/// Starts one search worker thread.
pub(crate) type SpawnWorker =
    fn(usize, Arc<dyn BlockHasher>, Sender<WorkerEvent>, Arc<AtomicUsize>) -> io::Result<WorkerHandle>;

struct Session {
    id: Uuid,
    miner_address: String,
    halt: CancelToken,
    wake: Sender<()>,
    thread: JoinHandle<()>,
}

enum Phase {
    Idle,
    Running(Session),
    Stopping { session: Uuid, coordinator: ThreadId },
}

struct Lifecycle {
    phase: Mutex<Phase>,
    settled: Condvar,
}

impl Lifecycle {
    /// Back to Idle, only if `session` is still the one stopping or running.
    /// Returns true when a running session ended without being stopped.
    fn finish(&self, session: Uuid) -> bool {
        let mut phase = self.phase.lock();
        let unrequested = match &*phase {
            Phase::Stopping { session: id, .. } if *id == session => false,
            Phase::Running(current) if current.id == session => true,
            _ => return false,
        };
        *phase = Phase::Idle;
        self.settled.notify_all();
        unrequested
    }
}

pub struct MiningCoordinator {
    config: MiningConfig,
    hasher: Arc<dyn BlockHasher>,
    submitter: Arc<dyn BlockSubmitter>,
    registry: Arc<MinerRegistry>,
    stats_subscribers: Arc<Subscribers<MiningStats>>,
    block_subscribers: Arc<Subscribers<BlockEvent>>,
    latest_stats: Arc<RwLock<MiningStats>>,
    live_workers: Arc<AtomicUsize>,
    lifecycle: Arc<Lifecycle>,
    spawn_worker: SpawnWorker,
}

impl MiningCoordinator {
    pub fn new(
        config: MiningConfig,
        hasher: Arc<dyn BlockHasher>,
        submitter: Arc<dyn BlockSubmitter>,
        registry: Arc<MinerRegistry>,
    ) -> Self {
        Self {
            config,
            hasher,
            submitter,
            registry,
            stats_subscribers: Arc::new(Subscribers::new()),
            block_subscribers: Arc::new(Subscribers::new()),
            latest_stats: Arc::new(RwLock::new(MiningStats::default())),
            live_workers: Arc::new(AtomicUsize::new(0)),
            lifecycle: Arc::new(Lifecycle {
                phase: Mutex::new(Phase::Idle),
                settled: Condvar::new(),
            }),
            spawn_worker: WorkerHandle::spawn,
        }
    }

    /// Replace how worker threads are started.
    #[cfg(test)]
    pub(crate) fn with_worker_spawner(mut self, spawn_worker: SpawnWorker) -> Self {
        self.spawn_worker = spawn_worker;
        self
    }

    /// Spawn the worker pool and start searching on top of the current head.
    ///
    /// On any spawn failure every worker already started is shut down and the
    /// coordinator stays Idle.
    pub fn start(&self, miner_address: &str) -> Result<Uuid, MiningError> {
        let miner_address = miner_address.trim();
        if miner_address.is_empty() {
            return Err(MiningError::InvalidMinerAddress);
        }

        let mut phase = self.lifecycle.phase.lock();
        if !matches!(*phase, Phase::Idle) {
            return Err(MiningError::AlreadyRunning);
        }

        let session_id = Uuid::new_v4();
        let count = self.config.worker_count();
        let (events_tx, events_rx) = unbounded();

        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            match (self.spawn_worker)(
                id,
                Arc::clone(&self.hasher),
                events_tx.clone(),
                Arc::clone(&self.live_workers),
            ) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    error!("MINER - could not spawn worker {id} of {count}: {e}");
                    workers.into_iter().for_each(WorkerHandle::shutdown);
                    return Err(MiningError::WorkerSpawnFailure(e));
                }
            }
        }
        drop(events_tx);

        *self.latest_stats.write() = MiningStats {
            session_id: Some(session_id),
            is_mining: true,
            active_workers: count,
            ..MiningStats::default()
        };

        let (wake_tx, wake_rx) = bounded(1);
        let halt = CancelToken::new();
        let engine = Engine {
            session_id,
            miner_address: miner_address.to_string(),
            config: self.config.clone(),
            submitter: Arc::clone(&self.submitter),
            registry: Arc::clone(&self.registry),
            workers,
            events: events_rx,
            wake: wake_rx,
            halt: halt.clone(),
            stats: StatsAggregator::new(session_id, count),
            stats_subscribers: Arc::clone(&self.stats_subscribers),
            block_subscribers: Arc::clone(&self.block_subscribers),
            latest_stats: Arc::clone(&self.latest_stats),
            lifecycle: Arc::clone(&self.lifecycle),
            generation: 0,
            current: None,
            publish_deadline: None,
            last_block_at: Instant::now(),
            stall_reported: false,
        };

        // If this spawn fails the closure, and with it the engine, is dropped;
        // the engine's Drop joins the workers.
        let thread = match thread::Builder::new()
            .name("numi-coordinator".into())
            .spawn(move || engine.run())
        {
            Ok(thread) => thread,
            Err(e) => {
                error!("MINER - could not spawn coordinator thread: {e}");
                *self.latest_stats.write() = MiningStats::default();
                return Err(MiningError::WorkerSpawnFailure(e));
            }
        };

        self.registry.register(miner_address);
        *phase = Phase::Running(Session {
            id: session_id,
            miner_address: miner_address.to_string(),
            halt,
            wake: wake_tx,
            thread,
        });
        info!(
            "MINER - session {} started: {} workers for {} via {}",
            session_id,
            count,
            miner_address,
            self.submitter.describe()
        );
        Ok(session_id)
    }

    /// Terminate all workers and return to Idle. A no-op when Idle.
    ///
    /// When this returns no further ledger mutation happens on behalf of the
    /// stopped session. Called from a subscriber callback (i.e. on the
    /// coordinator thread) it only signals; teardown finishes once the
    /// callback returns.
    pub fn stop(&self) -> bool {
        let mut phase = self.lifecycle.phase.lock();
        let session = match std::mem::replace(&mut *phase, Phase::Idle) {
            Phase::Idle => return false,
            Phase::Stopping {
                session,
                coordinator,
            } => {
                *phase = Phase::Stopping {
                    session,
                    coordinator,
                };
                if thread::current().id() != coordinator {
                    while !matches!(*phase, Phase::Idle) {
                        self.lifecycle.settled.wait(&mut phase);
                    }
                }
                return false;
            }
            Phase::Running(session) => session,
        };

        let Session {
            id,
            miner_address,
            halt,
            wake,
            thread,
        } = session;
        let coordinator = thread.thread().id();
        *phase = Phase::Stopping {
            session: id,
            coordinator,
        };
        drop(phase);

        halt.cancel();
        drop(wake);
        self.registry.unregister(&miner_address);

        if thread::current().id() == coordinator {
            debug!("MINER - stop requested from the coordinator thread; session {id} winds down after this callback");
            return true;
        }
        if thread.join().is_err() {
            error!("MINER - coordinator thread of session {id} panicked");
            // The engine never got to clear its own snapshot.
            let mut stats = self.latest_stats.write();
            if stats.session_id == Some(id) {
                *stats = MiningStats::default();
            }
        }
        self.lifecycle.finish(id);
        info!("MINER - session {id} stopped");
        true
    }

    /// Like `stop`, but reports misuse when nothing was running.
    pub fn try_stop(&self) -> Result<(), MiningError> {
        if self.stop() {
            Ok(())
        } else {
            Err(MiningError::NotRunning)
        }
    }

    pub fn state(&self) -> MiningState {
        match *self.lifecycle.phase.lock() {
            Phase::Idle => MiningState::Idle,
            Phase::Running(_) => MiningState::Running,
            Phase::Stopping { .. } => MiningState::Stopping,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == MiningState::Running
    }

    pub fn session_id(&self) -> Result<Uuid, MiningError> {
        match &*self.lifecycle.phase.lock() {
            Phase::Running(session) => Ok(session.id),
            _ => Err(MiningError::NotRunning),
        }
    }

    /// Most recent telemetry snapshot (default values while Idle).
    pub fn stats(&self) -> MiningStats {
        self.latest_stats.read().clone()
    }

    /// Worker threads currently alive, across all sessions.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &MinerRegistry {
        &self.registry
    }

    pub fn subscribe_stats<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&MiningStats) + Send + Sync + 'static,
    {
        self.stats_subscribers.subscribe(callback)
    }

    pub fn subscribe_blocks<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&BlockEvent) + Send + Sync + 'static,
    {
        self.block_subscribers.subscribe(callback)
    }

    pub fn unsubscribe_stats(&self, id: SubscriptionId) -> bool {
        self.stats_subscribers.unsubscribe(id)
    }

    pub fn unsubscribe_blocks(&self, id: SubscriptionId) -> bool {
        self.block_subscribers.unsubscribe(id)
    }
}

impl Drop for MiningCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The coordinator thread's state for one session.
struct Engine {
    session_id: Uuid,
    miner_address: String,
    config: MiningConfig,
    submitter: Arc<dyn BlockSubmitter>,
    registry: Arc<MinerRegistry>,
    workers: Vec<WorkerHandle>,
    events: Receiver<WorkerEvent>,
    wake: Receiver<()>,
    halt: CancelToken,
    stats: StatsAggregator,
    stats_subscribers: Arc<Subscribers<MiningStats>>,
    block_subscribers: Arc<Subscribers<BlockEvent>>,
    latest_stats: Arc<RwLock<MiningStats>>,
    lifecycle: Arc<Lifecycle>,
    generation: u64,
    current: Option<Job>,
    publish_deadline: Option<Instant>,
    last_block_at: Instant,
    stall_reported: bool,
}

impl Engine {
    fn run(mut self) {
        debug!("MINER - coordinator for session {} running", self.session_id);
        let events = self.events.clone();
        let wake = self.wake.clone();
        let ticker = tick(self.config.stats_interval);

        self.dispatch_next();
        while !self.halt.is_cancelled() {
            let deadline = match self.publish_deadline {
                Some(at) => after(at.saturating_duration_since(Instant::now())),
                None => never(),
            };
            select! {
                // Nothing is ever sent; the sender is dropped on stop.
                recv(wake) -> _ => break,
                recv(events) -> event => match event {
                    Ok(event) => self.on_event(event),
                    Err(_) => {
                        error!("MINER - every worker of session {} exited", self.session_id);
                        break;
                    }
                },
                recv(ticker) -> _ => self.on_tick(),
                recv(deadline) -> _ => self.close_round(),
            }
        }

        self.shutdown_workers();
        *self.latest_stats.write() = MiningStats::default();
        if self.lifecycle.finish(self.session_id) {
            self.registry.unregister(&self.miner_address);
            self.block_subscribers.notify(&BlockEvent::Aborted {
                reason: "every search worker exited".to_string(),
            });
        }
        debug!(
            "MINER - coordinator for session {} exited after {} blocks",
            self.session_id,
            self.stats.blocks_mined()
        );
    }

    fn on_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Sample(sample) => {
                if self.stats.record(&sample)
                    && self.publish_deadline.is_some()
                    && self.stats.is_complete()
                {
                    self.close_round();
                }
            }
            WorkerEvent::Found {
                worker_id,
                generation,
                block,
                sample,
            } => {
                self.stats.absorb(&sample);
                if generation != self.generation {
                    debug!(
                        "MINER - dropping superseded candidate #{} from worker {} (generation {} < {})",
                        block.index, worker_id, generation, self.generation
                    );
                    return;
                }
                if self.halt.is_cancelled() {
                    return;
                }
                // Subscribers see the work behind a block before the block.
                self.publish();
                self.submit(worker_id, block);
                self.dispatch_next();
            }
        }
    }

    /// Rejections are expected under racing workers and never fatal.
    fn submit(&mut self, worker_id: usize, block: Block) {
        match self.submitter.submit(&block) {
            Ok(appended) => {
                self.stats.block_mined();
                self.last_block_at = Instant::now();
                self.stall_reported = false;
                info!(
                    "MINER - worker {} sealed block #{} (nonce={}, hash={})",
                    worker_id, appended.index, appended.nonce, appended.hash
                );
                self.block_subscribers
                    .notify(&BlockEvent::Appended(appended));
            }
            Err(MiningError::RemoteLedgerFailure(reason)) => {
                warn!("MINER - remote ledger did not take #{}: {}", block.index, reason);
                self.block_subscribers.notify(&BlockEvent::SubmissionFailed {
                    index: block.index,
                    hash: block.hash,
                    reason,
                });
            }
            Err(e) => {
                warn!(
                    "MINER - discarding candidate #{} from worker {}: {}",
                    block.index, worker_id, e
                );
            }
        }
    }

    /// Cancel the current search and send a fresh template to every worker.
    fn dispatch_next(&mut self) {
        if let Some(job) = self.current.take() {
            job.cancel.cancel();
        }
        if self.halt.is_cancelled() {
            return;
        }

        match self.submitter.tip() {
            Ok(tip) => self.dispatch(tip),
            Err(e) => {
                warn!("MINER - no template available: {e}");
                self.block_subscribers.notify(&BlockEvent::LedgerUnavailable {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn dispatch(&mut self, tip: ChainTip) {
        if let Some(job) = self.current.take() {
            job.cancel.cancel();
        }
        self.generation += 1;
        let job = Job {
            template: Arc::new(Template {
                generation: self.generation,
                index: tip.next_index(),
                previous_hash: tip.hash,
                difficulty: tip.difficulty,
                reward: tip.reward,
                miner_address: self.miner_address.clone(),
            }),
            cancel: CancelToken::new(),
        };
        debug!(
            "MINER - dispatching #{} at difficulty {} (generation {})",
            job.template.index, job.template.difficulty, self.generation
        );
        for worker in &self.workers {
            if !worker.send(WorkerCommand::Mine(job.clone())) {
                warn!("MINER - worker {} is gone", worker.id());
            }
        }
        self.current = Some(job);
    }

    /// Start a sampling round; the previous one is published if still open.
    fn on_tick(&mut self) {
        if self.publish_deadline.is_some() {
            self.close_round();
        }
        let tick = self.stats.begin_tick();
        for worker in &self.workers {
            worker.send(WorkerCommand::Sample { tick });
        }
        self.publish_deadline = Some(Instant::now() + self.config.stats_interval / 2);

        match &self.current {
            None => self.dispatch_next(),
            // Someone else extended the chain under the current template.
            Some(job) => match self.submitter.tip() {
                Ok(tip) if tip.hash != job.template.previous_hash => {
                    debug!("MINER - head moved to #{}, abandoning #{}", tip.index, job.template.index);
                    self.dispatch(tip);
                }
                _ => {}
            },
        }
        self.check_watchdog();
    }

    fn close_round(&mut self) {
        self.publish_deadline = None;
        self.publish();
    }

    fn publish(&self) {
        let (index, difficulty) = self
            .current
            .as_ref()
            .map(|job| (job.template.index, job.template.difficulty))
            .unwrap_or_default();
        let snapshot = self.stats.snapshot(index, difficulty);
        *self.latest_stats.write() = snapshot.clone();
        self.stats_subscribers.notify(&snapshot);
    }

    fn check_watchdog(&mut self) {
        let Some(limit) = self.config.watchdog else {
            return;
        };
        let idle = self.last_block_at.elapsed();
        if idle < limit || self.stall_reported {
            return;
        }
        self.stall_reported = true;
        let index = self
            .current
            .as_ref()
            .map(|job| job.template.index)
            .unwrap_or_default();
        warn!(
            "MINER - no block appended for {}s while mining #{}",
            idle.as_secs(),
            index
        );
        self.block_subscribers.notify(&BlockEvent::Stalled {
            index,
            since_secs: idle.as_secs(),
        });
    }

    fn shutdown_workers(&mut self) {
        if let Some(job) = self.current.take() {
            job.cancel.cancel();
        }
        let workers = std::mem::take(&mut self.workers);
        for worker in &workers {
            worker.send(WorkerCommand::Shutdown);
        }
        workers.into_iter().for_each(WorkerHandle::shutdown);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown_workers();
    }
}
