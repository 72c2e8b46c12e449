/// `scripting/manager.rs` — owns the workers and the shared state
///
/// The application thread drives this once per frame, in order:
///   1. `update_ui_snapshot` — rebuild and publish a fresh control snapshot,
///   2. `drain_signal_queues` — move every worker's pending points into the
///      shared signal store,
///   3. `process_ui_events` — apply every worker's pending UI mutations.
/// Workers are drained in stable list order; interleaving across workers is
/// observable but not contractual.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::ScriptHostConfig;
use crate::messages::UiEvent;
use crate::queue::SpscRing;
use crate::registry::SignalIdRegistry;
use crate::signals::{Signal, SignalStore};
use crate::snapshot::UiSnapshotCell;
use crate::ui::UiState;

use super::api::{self, ScriptLogEntry, SpawnQueue, WorkerContext, WorkerLog};
use super::sandbox::create_sandboxed_vm;
use super::worker::{worker_main, ScriptSource, WorkerHandle};
use super::WorkerId;

pub struct ScriptThreadManager {
    config: ScriptHostConfig,
    registry: Arc<SignalIdRegistry>,
    snapshot: Arc<UiSnapshotCell>,
    /// Cleared on shutdown; every worker polls it once per tick.
    app_running: Arc<AtomicBool>,
    workers: Mutex<Vec<WorkerHandle>>,
    next_worker_id: AtomicI32,
    /// Drain-side id → name cache. IDs are append-only, so entries can never
    /// go stale; dropped together with the registry on reset.
    drain_name_cache: Mutex<HashMap<i32, String>>,
}

impl ScriptThreadManager {
    pub fn new(config: ScriptHostConfig) -> Self {
        Self {
            config,
            registry: Arc::new(SignalIdRegistry::new()),
            snapshot: Arc::new(UiSnapshotCell::new()),
            app_running: Arc::new(AtomicBool::new(true)),
            workers: Mutex::new(Vec::new()),
            next_worker_id: AtomicI32::new(0),
            drain_name_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SignalIdRegistry> {
        &self.registry
    }

    pub fn snapshot(&self) -> &Arc<UiSnapshotCell> {
        &self.snapshot
    }

    // ── Worker lifecycle ──────────────────────────────────────────────────

    /// Spawn a worker running `source` as its entry chunk.
    pub fn spawn_worker(&self, source: impl Into<String>) -> Result<WorkerId, String> {
        self.spawn_worker_from(ScriptSource::Inline(source.into()))
    }

    /// Spawn a worker whose entry chunk is loaded from a file (inside the
    /// worker thread, so a missing file idles the worker instead of failing
    /// the spawn).
    pub fn spawn_worker_file(&self, path: impl Into<std::path::PathBuf>) -> Result<WorkerId, String> {
        self.spawn_worker_from(ScriptSource::File(path.into()))
    }

    pub fn spawn_worker_from(&self, source: ScriptSource) -> Result<WorkerId, String> {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);

        let (signal_tx, signal_rx) =
            SpscRing::with_capacity(self.config.signal_queue_capacity).split();
        let (event_tx, event_rx) =
            SpscRing::with_capacity(self.config.event_queue_capacity).split();
        let spawn_queue: SpawnQueue = Arc::new(Mutex::new(Vec::new()));
        let logs: WorkerLog = Arc::new(Mutex::new(Vec::new()));

        let ctx = Arc::new(WorkerContext::new(
            id,
            signal_tx,
            event_tx,
            Arc::clone(&self.registry),
            Arc::clone(&self.snapshot),
            Arc::clone(&self.app_running),
            Arc::clone(&spawn_queue),
            Arc::clone(&logs),
        ));

        let lua = create_sandboxed_vm(self.config.trust_level)
            .map_err(|e| format!("Failed to create Lua VM: {e}"))?;
        api::register_all(&lua, Arc::clone(&ctx))
            .map_err(|e| format!("API registration failed: {e}"))?;

        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let tick_sleep = std::time::Duration::from_millis(self.config.tick_sleep_ms.max(1));

        let join = {
            let stop = Arc::clone(&stop);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name(format!("luascope-worker-{id}"))
                .spawn(move || worker_main(lua, source, ctx, stop, running, tick_sleep))
                .map_err(|e| format!("Failed to launch worker thread: {e}"))?
        };

        log::info!("[manager] spawned worker {id}");
        self.workers.lock().unwrap().push(WorkerHandle::new(
            id, signal_rx, event_rx, stop, running, join, logs,
        ));
        Ok(id)
    }

    /// Stop one worker and join its thread. Pending queue contents die with
    /// the handle; in-flight coroutines are abandoned.
    pub fn stop_worker(&self, id: WorkerId) -> bool {
        let mut workers = self.workers.lock().unwrap();
        match workers.iter().position(|w| w.id == id) {
            Some(index) => {
                let mut worker = workers.remove(index);
                worker.stop();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        log::info!("[manager] stopping all workers");
        let mut workers = self.workers.lock().unwrap();
        for worker in workers.iter_mut() {
            worker.stop();
        }
        workers.clear();
    }

    /// Clear the host-running flag (workers observe it within one tick) and
    /// join everything.
    pub fn shutdown(&self) {
        self.app_running.store(false, Ordering::Release);
        self.stop_all();
    }

    /// Full scripting-environment reset: stop every worker, then drop the ID
    /// registry and drain cache. Never called during normal operation.
    pub fn reset(&self) {
        self.stop_all();
        self.clear_signal_registry();
    }

    pub fn clear_signal_registry(&self) {
        self.registry.clear();
        self.drain_name_cache.lock().unwrap().clear();
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    pub fn is_worker_running(&self, id: WorkerId) -> bool {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .any(|w| w.id == id && w.is_running())
    }

    /// Last `limit` log entries written by scripts on this worker.
    pub fn worker_log(&self, id: WorkerId, limit: usize) -> Vec<ScriptLogEntry> {
        let workers = self.workers.lock().unwrap();
        let Some(worker) = workers.iter().find(|w| w.id == id) else {
            return Vec::new();
        };
        let entries = worker.logs.lock().unwrap();
        let skip = entries.len().saturating_sub(limit);
        entries[skip..].to_vec()
    }

    // ── Per-frame cycle ───────────────────────────────────────────────────

    /// Rebuild the staging snapshot from the live controls and publish it.
    pub fn update_ui_snapshot(&self, ui: &UiState) {
        self.snapshot.update(|snap| snap.rebuild_from(ui));
    }

    /// Pop every pending `SignalUpdate` from every running worker and append
    /// it to the named series, creating the series on first use. Returns the
    /// number of points drained; draining empty queues is a no-op.
    pub fn drain_signal_queues(&self, store: &mut SignalStore) -> usize {
        let mut workers = self.workers.lock().unwrap();
        let mut cache = self.drain_name_cache.lock().unwrap();
        let mut drained = 0;

        for worker in workers.iter_mut() {
            if !worker.is_running() {
                continue;
            }

            while let Some(update) = worker.signal_rx.pop() {
                let name = match cache.get(&update.signal_id) {
                    Some(name) => name.clone(),
                    None => match self.registry.get_name(update.signal_id) {
                        Some(name) => {
                            cache.insert(update.signal_id, name.clone());
                            name
                        }
                        // Unknown ID (e.g. registry cleared underneath a
                        // stale fast-path push) — drop the point.
                        None => continue,
                    },
                };

                match store.get_mut(&name) {
                    Some(signal) => signal.add_point(update.timestamp, update.value),
                    None => {
                        let mut signal = Signal::new(
                            name.clone(),
                            self.config.signal_max_points,
                            self.config.default_playback_mode,
                        );
                        signal.add_point(update.timestamp, update.value);
                        store.insert(name, signal);
                    }
                }
                drained += 1;
            }
        }
        drained
    }

    /// Pop every pending `UiEvent` from every running worker and apply it to
    /// the matching control. Events naming unknown controls are ignored.
    pub fn process_ui_events(&self, ui: &mut UiState) {
        let mut workers = self.workers.lock().unwrap();
        for worker in workers.iter_mut() {
            if !worker.is_running() {
                continue;
            }

            while let Some(event) = worker.event_rx.pop() {
                match event {
                    UiEvent::SetToggle { title, state } => {
                        ui.set_toggle(&title, state);
                    }
                    UiEvent::SetTextInput { title, text } => {
                        ui.set_text_input(&title, &text);
                    }
                }
            }
        }
    }
}

impl Default for ScriptThreadManager {
    fn default() -> Self {
        Self::new(ScriptHostConfig::default())
    }
}

impl Drop for ScriptThreadManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Poll `cond` every couple of milliseconds until it holds or `timeout`
    /// passes; returns the final verdict.
    fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn draining_with_no_workers_is_a_noop() {
        init_logging();
        let manager = ScriptThreadManager::default();
        let mut store = SignalStore::new();
        store.insert("existing".into(), Signal::new("existing", 16, crate::signals::PlaybackMode::Online));

        assert_eq!(manager.drain_signal_queues(&mut store), 0);
        assert_eq!(store.len(), 1, "an empty drain must not touch the store");
        assert!(store["existing"].is_empty());
    }

    #[test]
    fn two_workers_fill_two_series_in_timestamp_order() {
        init_logging();
        let manager = ScriptThreadManager::default();

        for name in ["alpha", "beta"] {
            let script = format!(
                r#"
                for i = 1, 1000 do
                    update_signal("{name}", i * 0.001, i)
                end
            "#
            );
            manager.spawn_worker(script).expect("worker should spawn");
        }

        let mut store = SignalStore::new();
        let mut total = 0usize;
        let filled = wait_for(
            || {
                total += manager.drain_signal_queues(&mut store);
                total >= 2000
            },
            Duration::from_secs(5),
        );
        assert!(filled, "expected 2000 points, drained {total}");
        assert_eq!(total, 2000, "no point may be duplicated or lost");
        assert_eq!(store.len(), 2, "exactly two named series");

        for name in ["alpha", "beta"] {
            let signal = store.get(name).expect("series must exist");
            assert_eq!(signal.len(), 1000);
            let times: Vec<f64> = signal.iter_ordered().map(|(t, _)| t).collect();
            assert!(
                times.windows(2).all(|w| w[0] < w[1]),
                "series {name} must be in timestamp order"
            );
        }

        manager.stop_all();
    }

    #[test]
    fn ui_events_mutate_the_matching_controls() {
        init_logging();
        let manager = ScriptThreadManager::default();
        let mut ui = UiState::new();
        ui.add_toggle("Record", false);
        ui.add_text_input("Status", "");

        manager
            .spawn_worker(
                r#"
                set_toggle_state("Record", true)
                set_text_input("Status", "armed")
                set_toggle_state("No Such Control", true)
            "#,
            )
            .unwrap();

        let applied = wait_for(
            || {
                manager.process_ui_events(&mut ui);
                ui.toggle_state("Record") == Some(true)
            },
            Duration::from_secs(5),
        );
        assert!(applied, "toggle event must reach the control");
        assert_eq!(ui.text_input("Status"), Some("armed"));
        assert_eq!(ui.toggles.len(), 1, "unknown titles must not create controls");
    }

    #[test]
    fn coroutine_sees_snapshot_and_answers_with_a_signal() {
        init_logging();
        let manager = ScriptThreadManager::default();

        let mut ui = UiState::new();
        ui.add_toggle("Go", false);
        manager.update_ui_snapshot(&ui);

        manager
            .spawn_worker(
                r#"
                spawn(function()
                    while not get_toggle_state("Go") do
                        yield()
                    end
                    update_signal("ack", now(), 1.0)
                end)
            "#,
            )
            .unwrap();

        // Let the coroutine spin a few ticks on the stale snapshot first.
        std::thread::sleep(Duration::from_millis(20));
        let mut store = SignalStore::new();
        manager.drain_signal_queues(&mut store);
        assert!(store.is_empty(), "no ack before the toggle flips");

        ui.set_toggle("Go", true);
        manager.update_ui_snapshot(&ui);

        let acked = wait_for(
            || {
                manager.drain_signal_queues(&mut store);
                store.contains_key("ack")
            },
            Duration::from_secs(5),
        );
        assert!(acked, "coroutine must observe the new snapshot and respond");
    }

    #[test]
    fn startup_error_leaves_the_worker_idle_and_stoppable() {
        init_logging();
        let manager = ScriptThreadManager::default();
        let id = manager
            .spawn_worker("this is not lua (")
            .expect("spawn itself must succeed");

        std::thread::sleep(Duration::from_millis(30));
        assert!(
            manager.is_worker_running(id),
            "a bad entry chunk idles the worker, it does not kill it"
        );
        assert!(manager.stop_worker(id));
        assert_eq!(manager.worker_count(), 0);
        assert!(!manager.stop_worker(id), "double stop reports the missing worker");
    }

    #[test]
    fn stop_worker_abandons_a_busy_coroutine() {
        init_logging();
        let manager = ScriptThreadManager::default();
        let id = manager
            .spawn_worker(
                r#"
                spawn(function()
                    while true do
                        yield()
                    end
                end)
            "#,
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(30));
        assert!(manager.stop_worker(id), "stop must join despite the endless coroutine");
    }

    #[test]
    fn script_log_entries_are_retrievable() {
        init_logging();
        let manager = ScriptThreadManager::default();
        let id = manager
            .spawn_worker(r#"log.info("hello from lua")"#)
            .unwrap();

        let logged = wait_for(
            || {
                manager
                    .worker_log(id, 10)
                    .iter()
                    .any(|e| e.message == "hello from lua" && e.level == "info")
            },
            Duration::from_secs(5),
        );
        assert!(logged);
    }

    #[test]
    fn reset_clears_registry_and_workers() {
        init_logging();
        let manager = ScriptThreadManager::default();
        manager.spawn_worker(r#"update_signal("x", 0.0, 0.0)"#).unwrap();

        let registered = wait_for(|| !manager.registry().is_empty(), Duration::from_secs(5));
        assert!(registered);

        manager.reset();
        assert_eq!(manager.worker_count(), 0);
        assert!(manager.registry().is_empty());
        assert_eq!(manager.registry().get_or_create("fresh"), 0, "dense IDs restart");
    }
}
