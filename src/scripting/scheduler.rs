/// `scripting/scheduler.rs` — cooperative coroutine scheduler
///
/// One scheduler per worker, driven from the worker's tick loop with an
/// explicit `now` so time can be simulated in tests. Coroutines move through
/// Queued → Runnable → (Sleeping ⇄ Runnable) → Finished | Errored; a yielded
/// number sleeps for that many seconds, a bare yield reschedules next tick,
/// and an error removes the coroutine without touching its siblings.

use mlua::{MultiValue, Thread, ThreadStatus, Value};

use super::api::SpawnQueue;
use super::WorkerId;

struct CoroutineEntry {
    id: u64,
    thread: Thread,
    /// Not resumed again until `now >= wake_time`.
    wake_time: f64,
}

/// What one tick did, so the worker loop can bound its sleep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub resumed: usize,
    /// Earliest wake deadline among surviving coroutines. `None` when the
    /// active list is empty.
    pub next_wake: Option<f64>,
}

pub struct CoroutineScheduler {
    worker_id: WorkerId,
    active: Vec<CoroutineEntry>,
    spawn_queue: SpawnQueue,
    next_coroutine_id: u64,
}

impl CoroutineScheduler {
    pub fn new(worker_id: WorkerId, spawn_queue: SpawnQueue) -> Self {
        Self {
            worker_id,
            active: Vec::new(),
            spawn_queue,
            next_coroutine_id: 0,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// True when some coroutine would be resumed by a tick at `now`.
    pub fn has_runnable(&self, now: f64) -> bool {
        self.active.iter().any(|e| e.wake_time <= now)
    }

    /// Run one scheduler tick at time `now`.
    pub fn tick(&mut self, now: f64) -> TickOutcome {
        // Adopt pending spawns. Lock held only for the swap so spawn() from a
        // running coroutine (next tick) never contends for long.
        {
            let mut queue = self.spawn_queue.lock().unwrap();
            for thread in queue.drain(..) {
                let id = self.next_coroutine_id;
                self.next_coroutine_id += 1;
                self.active.push(CoroutineEntry { id, thread, wake_time: 0.0 });
            }
        }

        let mut resumed = 0;
        let mut i = 0;
        while i < self.active.len() {
            if now < self.active[i].wake_time {
                i += 1;
                continue;
            }

            resumed += 1;
            let entry = &mut self.active[i];
            match entry.thread.resume::<MultiValue>(()) {
                Err(err) => {
                    log::warn!(
                        "[worker {}] coroutine #{} error: {}",
                        self.worker_id,
                        entry.id,
                        err
                    );
                    self.active.remove(i);
                }
                Ok(values) => {
                    if entry.thread.status() == ThreadStatus::Resumable {
                        // Yielded. A leading number is a sleep in seconds;
                        // anything else means "run me again next tick".
                        entry.wake_time = match values.into_iter().next() {
                            Some(Value::Number(secs)) => now + secs,
                            Some(Value::Integer(secs)) => now + secs as f64,
                            _ => 0.0,
                        };
                        i += 1;
                    } else {
                        // Ran to completion.
                        self.active.remove(i);
                    }
                }
            }
        }

        TickOutcome {
            resumed,
            next_wake: self
                .active
                .iter()
                .map(|e| e.wake_time)
                .min_by(|a, b| a.total_cmp(b)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
