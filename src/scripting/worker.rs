/// `scripting/worker.rs` — one OS thread hosting one Lua VM
///
/// The worker executes its entry chunk once (spawning coroutines as it
/// goes), then ticks the coroutine scheduler until it is told to stop or the
/// host shuts down. An entry-chunk error leaves the worker idling, not dead:
/// the thread and its queues stay valid so the manager can still drain and
/// stop it normally.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use mlua::Lua;

use super::api::{WorkerContext, WorkerLog};
use super::scheduler::CoroutineScheduler;
use super::{now_seconds, WorkerId};
use crate::messages::{SignalUpdate, UiEvent};
use crate::queue::Consumer;

// ── Entry source ──────────────────────────────────────────────────────────────

/// Where a worker's entry chunk comes from.
#[derive(Debug, Clone)]
pub enum ScriptSource {
    Inline(String),
    File(PathBuf),
}

impl ScriptSource {
    /// Chunk name used in Lua error messages and logs.
    pub fn label(&self) -> String {
        match self {
            ScriptSource::Inline(_) => "inline script".to_string(),
            ScriptSource::File(path) => path.display().to_string(),
        }
    }

    pub fn load(&self) -> Result<String, String> {
        match self {
            ScriptSource::Inline(source) => Ok(source.clone()),
            ScriptSource::File(path) => std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read script {}: {e}", path.display())),
        }
    }
}

// ── Worker handle ─────────────────────────────────────────────────────────────

/// Manager-side view of a running worker: the consumer ends of its rings and
/// its control flags. The Lua VM itself lives inside the thread.
pub struct WorkerHandle {
    pub id: WorkerId,
    pub(crate) signal_rx: Consumer<SignalUpdate>,
    pub(crate) event_rx: Consumer<UiEvent>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    pub(crate) logs: WorkerLog,
}

impl WorkerHandle {
    pub(crate) fn new(
        id: WorkerId,
        signal_rx: Consumer<SignalUpdate>,
        event_rx: Consumer<UiEvent>,
        stop: Arc<AtomicBool>,
        running: Arc<AtomicBool>,
        join: JoinHandle<()>,
        logs: WorkerLog,
    ) -> Self {
        Self { id, signal_rx, event_rx, stop, running, join: Some(join), logs }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the worker to stop and join its thread. Coroutines in flight are
    /// abandoned; the VM is dropped with the thread's stack.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("[worker {}] thread panicked", self.id);
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Thread body ───────────────────────────────────────────────────────────────

/// Outer loop of a worker thread. `tick_sleep` bounds the anti-spin sleep;
/// the stop flag and the host-running flag are polled once per tick.
pub(crate) fn worker_main(
    lua: Lua,
    source: ScriptSource,
    ctx: Arc<WorkerContext>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    tick_sleep: Duration,
) {
    let id = ctx.worker_id;
    log::info!("[worker {id}] thread started ({})", source.label());

    // Execute the entry chunk. Errors are logged and the worker idles so the
    // host never loses a thread slot to a bad script.
    match source.load() {
        Ok(code) => {
            if let Err(err) = lua.load(&code).set_name(source.label()).exec() {
                log::error!("[worker {id}] entry script error: {err}");
            }
        }
        Err(err) => log::error!("[worker {id}] {err}"),
    }

    let mut scheduler = CoroutineScheduler::new(id, Arc::clone(&ctx.spawn_queue));

    while !stop.load(Ordering::Acquire) && ctx.is_host_running() {
        let now = now_seconds();
        let outcome = scheduler.tick(now);

        // Bounded anti-spin sleep between ticks. Coroutines that yielded bare
        // (wake next tick) run after the full bound; a sleeper due sooner
        // shortens the wait.
        let sleep_for = outcome
            .next_wake
            .filter(|&wake| wake > now)
            .map(|wake| Duration::from_secs_f64(wake - now))
            .unwrap_or(tick_sleep)
            .min(tick_sleep);
        std::thread::sleep(sleep_for);
    }

    running.store(false, Ordering::Release);
    log::info!("[worker {id}] thread stopped");
}
