//! Cluster & worker supervisor (C6).
//!
//! Forks `N` worker processes running this same binary in worker mode,
//! communicating shutdown/restart over a control pipe — a framed-JSON-lines
//! channel on each child's stdin, the Rust equivalent of an OS-fork
//! master/worker model (§9). Workers share nothing except the external
//! `CacheEngine`/`SessionStore` backends; the supervisor itself holds no
//! business state.

mod control;
mod slot;

pub use control::ControlMessage;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::autoscale::ScaleIntent;
use slot::{Slot, SlotExit};

const CRASH_WINDOW: Duration = Duration::from_secs(60);
const MAX_CRASHES_IN_WINDOW: usize = 5;
const REFORK_DELAY: Duration = Duration::from_secs(2);

/// One worker slot's restart bookkeeping.
struct SlotRecord {
    slot: Option<Slot>,
    crash_times: Vec<Instant>,
    escalated: bool,
}

impl SlotRecord {
    fn empty() -> Self {
        Self { slot: None, crash_times: Vec::new(), escalated: false }
    }

    fn record_crash(&mut self) {
        let now = Instant::now();
        self.crash_times.retain(|t| now.duration_since(*t) < CRASH_WINDOW);
        self.crash_times.push(now);
        if self.crash_times.len() >= MAX_CRASHES_IN_WINDOW {
            self.escalated = true;
        }
    }
}

/// Master supervisor process. `binary_path`/`worker_args` let the same
/// executable re-exec itself in worker mode — a single binary plays both
/// roles depending on an env var `main.rs` checks at startup.
pub struct ClusterSupervisor {
    binary_path: PathBuf,
    worker_args: Vec<String>,
    slots: Arc<Mutex<HashMap<usize, SlotRecord>>>,
    target_count: Arc<AtomicUsize>,
    drain_timeout: Duration,
}

impl ClusterSupervisor {
    pub fn new(binary_path: PathBuf, worker_args: Vec<String>, initial_workers: usize, drain_timeout: Duration) -> Self {
        Self {
            binary_path,
            worker_args,
            slots: Arc::new(Mutex::new(HashMap::new())),
            target_count: Arc::new(AtomicUsize::new(initial_workers)),
            drain_timeout,
        }
    }

    /// Fork the initial set of worker processes and return; the caller is
    /// expected to also call [`Self::supervise_forever`] in a background
    /// task and wire OS signals to [`Self::graceful_shutdown`].
    pub async fn start(&self) -> anyhow::Result<()> {
        let target = self.target_count.load(Ordering::SeqCst);
        let mut slots = self.slots.lock().await;
        for id in 0..target {
            let record = slots.entry(id).or_insert_with(SlotRecord::empty);
            record.slot = Some(self.spawn_slot(id)?);
        }
        Ok(())
    }

    fn spawn_slot(&self, id: usize) -> anyhow::Result<Slot> {
        info!(slot = id, "forking worker process");
        Slot::spawn(&self.binary_path, &self.worker_args, id)
    }

    /// Watches every slot for exit and applies the restart policy. Intended
    /// to run as one long-lived background task for the supervisor's
    /// lifetime.
    pub async fn supervise_forever(&self) {
        loop {
            tokio::time::sleep(Duration::from_millis(250)).await;
            let exited: Vec<(usize, SlotExit)> = {
                let mut slots = self.slots.lock().await;
                let mut found = Vec::new();
                for (id, record) in slots.iter_mut() {
                    if let Some(slot) = record.slot.as_mut() {
                        if let Some(exit) = slot.try_wait() {
                            found.push((*id, exit));
                        }
                    }
                }
                found
            };

            for (id, exit) in exited {
                self.handle_exit(id, exit).await;
            }
        }
    }

    async fn handle_exit(&self, id: usize, exit: SlotExit) {
        let mut slots = self.slots.lock().await;
        let record = slots.entry(id).or_insert_with(SlotRecord::empty);
        record.slot = None;

        if exit.graceful {
            info!(slot = id, "worker exited gracefully, not reforking");
            return;
        }

        record.record_crash();
        if record.escalated {
            error!(slot = id, "worker crashed {MAX_CRASHES_IN_WINDOW} times within {CRASH_WINDOW:?}, escalating (no further refork)");
            return;
        }

        warn!(slot = id, code = exit.code, "worker exited abnormally, reforking after {REFORK_DELAY:?}");
        drop(slots);
        tokio::time::sleep(REFORK_DELAY).await;

        match self.spawn_slot(id) {
            Ok(slot) => {
                let mut slots = self.slots.lock().await;
                slots.entry(id).or_insert_with(SlotRecord::empty).slot = Some(slot);
            }
            Err(e) => error!(slot = id, error = %e, "failed to refork worker"),
        }
    }

    /// Apply a scaling intent produced by `AutoScalingController::sample`.
    /// This is the *only* place worker count is mutated — the controller
    /// itself only emits intents (§4.11).
    pub async fn apply_intent(&self, intent: ScaleIntent, min_workers: usize, max_workers: usize) {
        let current = self.target_count.load(Ordering::SeqCst);
        let next = match intent {
            ScaleIntent::ScaleOut(delta) => (current + delta).min(max_workers),
            ScaleIntent::ScaleIn(delta) => current.saturating_sub(delta).max(min_workers),
            ScaleIntent::Hold => current,
        };
        if next == current {
            return;
        }
        self.target_count.store(next, Ordering::SeqCst);

        let mut slots = self.slots.lock().await;
        if next > current {
            for id in current..next {
                match self.spawn_slot(id) {
                    Ok(slot) => {
                        slots.entry(id).or_insert_with(SlotRecord::empty).slot = Some(slot);
                    }
                    Err(e) => error!(slot = id, error = %e, "failed to spawn scale-out worker"),
                }
            }
        } else {
            for id in next..current {
                if let Some(record) = slots.get_mut(&id) {
                    if let Some(slot) = record.slot.take() {
                        slot.request_shutdown();
                    }
                }
                slots.remove(&id);
            }
        }
    }

    /// SIGTERM/SIGINT handler: propagate shutdown to workers, wait up to
    /// `drainTimeout`, then force-kill stragglers (§4.4).
    pub async fn graceful_shutdown(&self) {
        info!("graceful shutdown initiated, draining workers");
        let mut slots = self.slots.lock().await;
        for record in slots.values_mut() {
            if let Some(slot) = record.slot.as_mut() {
                slot.request_shutdown();
            }
        }

        let deadline = Instant::now() + self.drain_timeout;
        loop {
            let all_exited = slots.values_mut().all(|r| match r.slot.as_mut() {
                Some(slot) => slot.try_wait().is_some(),
                None => true,
            });
            if all_exited || Instant::now() >= deadline {
                break;
            }
            drop(slots);
            tokio::time::sleep(Duration::from_millis(200)).await;
            slots = self.slots.lock().await;
        }

        for record in slots.values_mut() {
            if let Some(slot) = record.slot.as_mut() {
                warn!("force-killing straggler worker past drain timeout");
                slot.force_kill();
            }
        }
        info!("all workers drained");
    }

    pub fn worker_count(&self) -> usize {
        self.target_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_triggers_after_five_crashes_in_window() {
        let mut record = SlotRecord::empty();
        for _ in 0..4 {
            record.record_crash();
        }
        assert!(!record.escalated);
        record.record_crash();
        assert!(record.escalated);
    }

    #[test]
    fn crash_window_forgets_old_crashes() {
        let mut record = SlotRecord::empty();
        record.crash_times.push(Instant::now() - Duration::from_secs(120));
        record.record_crash();
        assert_eq!(record.crash_times.len(), 1);
        assert!(!record.escalated);
    }
}
