//! Search workers: one OS thread each, driven entirely by messages.

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use log::{debug, trace};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::blockchain::Block;
use crate::blockchain::pow::{BlockHasher, Target};

/// Hash attempts between checks of the cancel token and the command queue.
pub const CHECK_EVERY: u32 = 1024;

/// Shared stop flag for one unit of work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Read-only inputs every worker searches over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub generation: u64,
    pub index: u64,
    pub previous_hash: String,
    pub difficulty: u32,
    pub reward: u64,
    pub miner_address: String,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub template: Arc<Template>,
    pub cancel: CancelToken,
}

#[derive(Debug)]
pub enum WorkerCommand {
    Mine(Job),
    Sample { tick: u64 },
    Shutdown,
}

/// Cumulative counters for one worker, answered to a `Sample` request and
/// attached to every `Found` (with `tick` 0, outside any sampling round).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerSample {
    pub worker_id: usize,
    pub tick: u64,
    pub total_hashes: u64,
    pub hash_rate: f64,
}

#[derive(Debug)]
pub enum WorkerEvent {
    Found {
        worker_id: usize,
        generation: u64,
        block: Block,
        sample: WorkerSample,
    },
    Sample(WorkerSample),
}

enum Flow {
    Idle,
    Switch(Job),
    Shutdown,
}

/// Keeps the live-worker gauge honest even if the thread unwinds.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct WorkerHandle {
    id: usize,
    commands: Sender<WorkerCommand>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn spawn(
        id: usize,
        hasher: Arc<dyn BlockHasher>,
        events: Sender<WorkerEvent>,
        live: Arc<AtomicUsize>,
    ) -> io::Result<Self> {
        let (commands, inbox) = unbounded();
        let guard = LiveGuard::new(live);
        let worker = SearchWorker {
            id,
            hasher,
            events,
            inbox,
            total_hashes: 0,
            sampled_hashes: 0,
            sampled_at: Instant::now(),
        };
        let thread = thread::Builder::new()
            .name(format!("numi-worker-{id}"))
            .spawn(move || {
                let _guard = guard;
                worker.run();
            })?;
        Ok(Self {
            id,
            commands,
            thread,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// False if the worker has already exited.
    pub fn send(&self, command: WorkerCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Ask the worker to exit and wait for its thread.
    pub fn shutdown(self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
        if self.thread.join().is_err() {
            debug!("worker {} panicked during shutdown", self.id);
        }
    }
}

struct SearchWorker {
    id: usize,
    hasher: Arc<dyn BlockHasher>,
    events: Sender<WorkerEvent>,
    inbox: Receiver<WorkerCommand>,
    total_hashes: u64,
    sampled_hashes: u64,
    sampled_at: Instant,
}

impl SearchWorker {
    fn run(mut self) {
        let mut pending: Option<Job> = None;
        loop {
            let job = match pending.take() {
                Some(job) => job,
                None => match self.inbox.recv() {
                    Ok(WorkerCommand::Mine(job)) => job,
                    Ok(WorkerCommand::Sample { tick }) => {
                        self.report(tick);
                        continue;
                    }
                    Ok(WorkerCommand::Shutdown) | Err(_) => break,
                },
            };
            match self.search(job) {
                Flow::Idle => {}
                Flow::Switch(next) => pending = Some(next),
                Flow::Shutdown => break,
            }
        }
        trace!("worker {} exiting after {} hashes", self.id, self.total_hashes);
    }

    fn search(&mut self, job: Job) -> Flow {
        if job.cancel.is_cancelled() {
            return Flow::Idle;
        }
        let t = Arc::clone(&job.template);
        let target = Target::for_difficulty(t.difficulty);
        let mut candidate = Block::candidate(
            t.index,
            t.previous_hash.clone(),
            t.miner_address.clone(),
            t.reward,
            t.difficulty,
        );
        candidate.nonce = rand::random();
        let mut payload = String::with_capacity(256);

        loop {
            for _ in 0..CHECK_EVERY {
                candidate.timestamp = Utc::now().timestamp_millis();
                payload.clear();
                candidate.write_payload(&mut payload);
                let hash = self.hasher.hash_hex(payload.as_bytes());
                self.total_hashes += 1;

                if target.is_met_by(&hash) {
                    candidate.hash = hash;
                    // Siblings share the token and stop at their next check.
                    job.cancel.cancel();
                    debug!(
                        "worker {} found #{} nonce={} hash={}",
                        self.id, candidate.index, candidate.nonce, candidate.hash
                    );
                    let found = WorkerEvent::Found {
                        worker_id: self.id,
                        generation: t.generation,
                        block: candidate,
                        sample: self.sample(0),
                    };
                    if self.events.send(found).is_err() {
                        return Flow::Shutdown;
                    }
                    return Flow::Idle;
                }
                candidate.nonce = candidate.nonce.wrapping_add(1);
            }

            if job.cancel.is_cancelled() {
                return Flow::Idle;
            }
            loop {
                match self.inbox.try_recv() {
                    Ok(WorkerCommand::Sample { tick }) => self.report(tick),
                    Ok(WorkerCommand::Mine(next)) => return Flow::Switch(next),
                    Ok(WorkerCommand::Shutdown) | Err(TryRecvError::Disconnected) => {
                        return Flow::Shutdown;
                    }
                    Err(TryRecvError::Empty) => break,
                }
            }
        }
    }

    fn report(&mut self, tick: u64) {
        let sample = self.sample(tick);
        let _ = self.events.send(WorkerEvent::Sample(sample));
    }

    /// Running total plus the rate since the previous sample.
    fn sample(&mut self, tick: u64) -> WorkerSample {
        let now = Instant::now();
        let elapsed = now.duration_since(self.sampled_at).as_secs_f64();
        let delta = self.total_hashes - self.sampled_hashes;
        let hash_rate = if elapsed > 0.0 { delta as f64 / elapsed } else { 0.0 };
        self.sampled_at = now;
        self.sampled_hashes = self.total_hashes;

        WorkerSample {
            worker_id: self.id,
            tick,
            total_hashes: self.total_hashes,
            hash_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::pow::{Sha256Hasher, meets};
    use std::time::Duration;

    fn template(difficulty: u32) -> Arc<Template> {
        Arc::new(Template {
            generation: 7,
            index: 1,
            previous_hash: "0".repeat(64),
            difficulty,
            reward: 50,
            miner_address: "alice".into(),
        })
    }

    #[test]
    fn finds_a_valid_block_and_cancels_siblings() {
        let live = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = unbounded();
        let w = WorkerHandle::spawn(0, Arc::new(Sha256Hasher), tx, Arc::clone(&live)).unwrap();
        assert_eq!(live.load(Ordering::SeqCst), 1);

        let cancel = CancelToken::new();
        assert!(w.send(WorkerCommand::Mine(Job {
            template: template(1),
            cancel: cancel.clone(),
        })));

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            WorkerEvent::Found {
                generation,
                block,
                sample,
                ..
            } => {
                assert_eq!(generation, 7);
                assert_eq!(sample.worker_id, 0);
                assert!(sample.total_hashes > 0);
                assert!(sample.hash_rate > 0.0);
                assert_eq!(block.index, 1);
                assert_eq!(block.miner_address, "alice");
                assert_eq!(block.hash, block.compute_hash(&Sha256Hasher));
                assert!(meets(&block.hash, 1));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(cancel.is_cancelled());

        w.shutdown();
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn answers_samples_while_searching_and_stops_on_cancel() {
        let live = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = unbounded();
        let w = WorkerHandle::spawn(3, Arc::new(Sha256Hasher), tx, live).unwrap();

        // Difficulty 64 is never met; the worker just keeps hashing.
        let cancel = CancelToken::new();
        w.send(WorkerCommand::Mine(Job {
            template: template(64),
            cancel: cancel.clone(),
        }));
        std::thread::sleep(Duration::from_millis(50));
        w.send(WorkerCommand::Sample { tick: 1 });

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            WorkerEvent::Sample(s) => {
                assert_eq!(s.worker_id, 3);
                assert_eq!(s.tick, 1);
                assert!(s.total_hashes > 0);
                assert!(s.hash_rate > 0.0);
            }
            other => panic!("unexpected event {other:?}"),
        }

        cancel.cancel();
        w.send(WorkerCommand::Sample { tick: 2 });
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            WorkerEvent::Sample(s) => assert_eq!(s.tick, 2),
            other => panic!("unexpected event {other:?}"),
        }
        w.shutdown();
    }
}
