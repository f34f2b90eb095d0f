//! Actuator Link
//!
//! Lock-free SPSC hand-off from the frame loop to a dedicated I/O worker.
//!
//! Architecture:
//! - Producer (session loop): never blocks; a full queue drops the command
//! - Consumer (worker thread): drives the transport, may block on the network
//!
//! The queue is an `rtrb` ring buffer. The worker parks when idle and is
//! unparked by every successful push.
//!
//! Final commands (the all-off at session end) bypass the queue. The worker
//! discards whatever is still queued and delivers them next, so a backed-up
//! device cannot leave a channel on.

use super::{ActuatorCommand, ActuatorTransport, CommandSink};
use crate::{Error, Result};
use rtrb::{Consumer, Producer, RingBuffer};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Default command queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Upper bound on how long the idle worker sleeps between checks
const IDLE_PARK: Duration = Duration::from_millis(50);

/// Link statistics for monitoring
#[derive(Debug, Default)]
pub struct LinkStats {
    /// Commands accepted into the queue
    pub queued: AtomicU64,
    /// Commands delivered by the transport
    pub sent: AtomicU64,
    /// Commands the transport failed to deliver
    pub failed: AtomicU64,
    /// Commands dropped because the queue was full
    pub dropped: AtomicU64,
    /// Queued commands discarded in favor of final commands
    pub superseded: AtomicU64,
}

impl LinkStats {
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`LinkStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LinkStatsSnapshot {
    pub queued: u64,
    pub sent: u64,
    pub failed: u64,
    pub dropped: u64,
    pub superseded: u64,
}

/// Final commands waiting for the worker, at most one per channel
type FinalSlot = Arc<Mutex<Vec<ActuatorCommand>>>;

fn lock_finals(slot: &Mutex<Vec<ActuatorCommand>>) -> MutexGuard<'_, Vec<ActuatorCommand>> {
    // The slot holds plain data, so a poisoned lock is still usable
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Producer half plus the worker that owns the transport
pub struct ActuatorLink {
    producer: Producer<ActuatorCommand>,
    stats: Arc<LinkStats>,
    finals: FinalSlot,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ActuatorLink {
    /// Start the worker thread with the given transport
    pub fn spawn<T>(transport: T, capacity: usize) -> Result<Self>
    where
        T: ActuatorTransport + Send + 'static,
    {
        if capacity == 0 {
            return Err(Error::Config("actuator queue capacity must be > 0".to_string()));
        }

        let (producer, consumer) = RingBuffer::new(capacity);
        let stats = Arc::new(LinkStats::default());
        let finals = FinalSlot::default();
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let stats = Arc::clone(&stats);
            let finals = Arc::clone(&finals);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("actuator-link".to_string())
                .spawn(move || run_worker(transport, consumer, &stats, &finals, &shutdown))?
        };

        Ok(Self {
            producer,
            stats,
            finals,
            shutdown,
            worker: Some(worker),
        })
    }

    /// Get statistics
    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }

    /// Drain the queue, stop the worker and wait for it
    pub fn shutdown(mut self) -> LinkStatsSnapshot {
        self.stop_worker();
        self.stats.snapshot()
    }

    fn wake_worker(&self) {
        if let Some(worker) = &self.worker {
            worker.thread().unpark();
        }
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.shutdown.store(true, Ordering::Release);
            worker.thread().unpark();
            if worker.join().is_err() {
                warn!("Actuator worker panicked");
            }
        }
    }
}

impl CommandSink for ActuatorLink {
    #[inline]
    fn submit(&mut self, command: ActuatorCommand) -> bool {
        match self.producer.push(command) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
                self.wake_worker();
                true
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Actuator queue full, dropping {}", command);
                false
            }
        }
    }

    /// Always accepted; a later final command for the same channel replaces
    /// an earlier one that has not been delivered yet
    fn submit_final(&mut self, commands: Vec<ActuatorCommand>) -> usize {
        let accepted = commands.len();
        {
            let mut finals = lock_finals(&self.finals);
            for command in commands {
                finals.retain(|pending| pending.channel != command.channel);
                finals.push(command);
            }
        }
        self.stats.queued.fetch_add(accepted as u64, Ordering::Relaxed);
        self.wake_worker();
        accepted
    }
}

impl Drop for ActuatorLink {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn deliver<T: ActuatorTransport>(transport: &mut T, command: ActuatorCommand, stats: &LinkStats) {
    match transport.set_channel(command.channel, command.action.is_on()) {
        Ok(()) => {
            stats.sent.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!("Dropping {}: {}", command, e);
        }
    }
}

fn run_worker<T: ActuatorTransport>(
    mut transport: T,
    mut consumer: Consumer<ActuatorCommand>,
    stats: &LinkStats,
    finals: &Mutex<Vec<ActuatorCommand>>,
    shutdown: &AtomicBool,
) {
    debug!("Actuator worker started");
    loop {
        let pending = std::mem::take(&mut *lock_finals(finals));
        if !pending.is_empty() {
            let mut superseded = 0u64;
            while consumer.pop().is_ok() {
                superseded += 1;
            }
            if superseded > 0 {
                stats.superseded.fetch_add(superseded, Ordering::Relaxed);
                debug!("Discarded {} queued commands before final commands", superseded);
            }
            for command in pending {
                deliver(&mut transport, command, stats);
            }
            continue;
        }

        match consumer.pop() {
            Ok(command) => deliver(&mut transport, command, stats),
            Err(_) => {
                // Queue is empty; everything pushed before the flag was set is drained
                if shutdown.load(Ordering::Acquire)
                    && consumer.is_empty()
                    && lock_finals(finals).is_empty()
                {
                    break;
                }
                thread::park_timeout(IDLE_PARK);
            }
        }
    }
    debug!("Actuator worker stopped");
}
