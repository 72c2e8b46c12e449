/// `scripting/api.rs` — registers all Lua global functions on a worker VM
///
/// The host surface available inside a worker:
///   update_signal / get_signal_id / update_signal_fast,
///   get_button_clicked / get_toggle_state / get_text_input,
///   set_toggle_state / set_text_input,
///   spawn / spawn_thread / yield / sleep,
///   now / get_time_seconds / sleep_ms / is_host_running, log.*
///
/// Every closure captures one explicit `Arc<WorkerContext>` handed over at
/// worker initialisation — there is no implicit "current worker" pointer to
/// set and clear around callback batches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mlua::{Function, Lua, Result as LuaResult, Thread};
use serde::{Deserialize, Serialize};

use super::WorkerId;
use crate::messages::{SignalUpdate, UiEvent};
use crate::queue::Producer;
use crate::registry::SignalIdRegistry;
use crate::snapshot::UiSnapshotCell;

/// Per-worker log output (log.info / log.warn / log.error calls).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptLogEntry {
    pub level: String,
    pub message: String,
    pub timestamp: i64,
}

pub type WorkerLog = Arc<Mutex<Vec<ScriptLogEntry>>>;

/// Coroutines spawned by script code, adopted by the scheduler on its next
/// tick. Mutex-protected so `spawn` can be called from inside a running
/// coroutine without touching the list being iterated.
pub type SpawnQueue = Arc<Mutex<Vec<Thread>>>;

/// Keep only the most recent entries per worker.
const WORKER_LOG_CAP: usize = 200;

// ── Worker context ────────────────────────────────────────────────────────────

/// Everything a worker's host functions touch. Owned by the worker thread for
/// its whole life; the mutexes around the producers and the ID cache are
/// uncontended (only the worker thread locks them) and exist to keep the
/// context shareable across the registered closures.
pub struct WorkerContext {
    pub worker_id: WorkerId,
    signal_tx: Mutex<Producer<SignalUpdate>>,
    event_tx: Mutex<Producer<UiEvent>>,
    registry: Arc<SignalIdRegistry>,
    snapshot: Arc<UiSnapshotCell>,
    pub app_running: Arc<AtomicBool>,
    /// Worker-local name → ID cache; the shared registry is only consulted on
    /// a miss, so steady-state pushes never take the registry lock.
    id_cache: Mutex<HashMap<String, i32>>,
    pub spawn_queue: SpawnQueue,
    pub log_sink: WorkerLog,
}

impl WorkerContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: WorkerId,
        signal_tx: Producer<SignalUpdate>,
        event_tx: Producer<UiEvent>,
        registry: Arc<SignalIdRegistry>,
        snapshot: Arc<UiSnapshotCell>,
        app_running: Arc<AtomicBool>,
        spawn_queue: SpawnQueue,
        log_sink: WorkerLog,
    ) -> Self {
        Self {
            worker_id,
            signal_tx: Mutex::new(signal_tx),
            event_tx: Mutex::new(event_tx),
            registry,
            snapshot,
            app_running,
            id_cache: Mutex::new(HashMap::new()),
            spawn_queue,
            log_sink,
        }
    }

    /// Resolve a signal name through the local cache, falling back to the
    /// shared registry on miss.
    pub fn signal_id(&self, name: &str) -> i32 {
        let mut cache = self.id_cache.lock().unwrap();
        if let Some(&id) = cache.get(name) {
            return id;
        }
        let id = self.registry.get_or_create(name);
        cache.insert(name.to_string(), id);
        id
    }

    /// Push one signal update by name. `false` means the ring was full — the
    /// point is dropped and the script may retry later.
    pub fn push_signal_update(&self, name: &str, timestamp: f64, value: f64) -> bool {
        let id = self.signal_id(name);
        self.push_signal_update_fast(id, timestamp, value)
    }

    /// Pre-cached fast variant: no name lookup at all.
    pub fn push_signal_update_fast(&self, signal_id: i32, timestamp: f64, value: f64) -> bool {
        if signal_id < 0 {
            return false;
        }
        self.signal_tx
            .lock()
            .unwrap()
            .push(SignalUpdate::new(signal_id, timestamp, value))
            .is_ok()
    }

    pub fn button_clicked(&self, title: &str) -> bool {
        self.snapshot.read().button_clicked(title)
    }

    pub fn toggle_state(&self, title: &str) -> bool {
        self.snapshot.read().toggle_state(title)
    }

    pub fn text_input(&self, title: &str) -> String {
        self.snapshot.read().text_input(title)
    }

    pub fn set_toggle_state(&self, title: &str, state: bool) -> bool {
        self.event_tx
            .lock()
            .unwrap()
            .push(UiEvent::SetToggle { title: title.to_string(), state })
            .is_ok()
    }

    pub fn set_text_input(&self, title: &str, text: &str) -> bool {
        self.event_tx
            .lock()
            .unwrap()
            .push(UiEvent::SetTextInput { title: title.to_string(), text: text.to_string() })
            .is_ok()
    }

    pub fn is_host_running(&self) -> bool {
        self.app_running.load(Ordering::Acquire)
    }
}

// ── Registration ──────────────────────────────────────────────────────────────

/// Register the full worker API on `lua` against `ctx`.
pub fn register_all(lua: &Lua, ctx: Arc<WorkerContext>) -> LuaResult<()> {
    register_signal_api(lua, Arc::clone(&ctx))?;
    register_ui_api(lua, Arc::clone(&ctx))?;
    register_coroutine_api(lua, Arc::clone(&ctx))?;
    register_util(lua, Arc::clone(&ctx))?;
    register_log(lua, ctx)?;
    install_prelude(lua)?;
    Ok(())
}

// ── Signal updates (lock-free queue push) ─────────────────────────────────────

fn register_signal_api(lua: &Lua, ctx: Arc<WorkerContext>) -> LuaResult<()> {
    let globals = lua.globals();

    let update = {
        let ctx = Arc::clone(&ctx);
        lua.create_function(move |_, (name, timestamp, value): (String, f64, f64)| {
            Ok(ctx.push_signal_update(&name, timestamp, value))
        })?
    };
    globals.set("update_signal", update)?;

    let get_id = {
        let ctx = Arc::clone(&ctx);
        lua.create_function(move |_, name: String| Ok(ctx.signal_id(&name)))?
    };
    globals.set("get_signal_id", get_id)?;

    let update_fast = lua.create_function(move |_, (id, timestamp, value): (i32, f64, f64)| {
        Ok(ctx.push_signal_update_fast(id, timestamp, value))
    })?;
    globals.set("update_signal_fast", update_fast)?;

    Ok(())
}

// ── UI state (read from snapshot, write to event queue) ───────────────────────

fn register_ui_api(lua: &Lua, ctx: Arc<WorkerContext>) -> LuaResult<()> {
    let globals = lua.globals();

    let get_button = {
        let ctx = Arc::clone(&ctx);
        lua.create_function(move |_, title: String| Ok(ctx.button_clicked(&title)))?
    };
    globals.set("get_button_clicked", get_button)?;

    let get_toggle = {
        let ctx = Arc::clone(&ctx);
        lua.create_function(move |_, title: String| Ok(ctx.toggle_state(&title)))?
    };
    globals.set("get_toggle_state", get_toggle)?;

    let get_text = {
        let ctx = Arc::clone(&ctx);
        lua.create_function(move |_, title: String| Ok(ctx.text_input(&title)))?
    };
    globals.set("get_text_input", get_text)?;

    let set_toggle = {
        let ctx = Arc::clone(&ctx);
        lua.create_function(move |_, (title, state): (String, bool)| {
            Ok(ctx.set_toggle_state(&title, state))
        })?
    };
    globals.set("set_toggle_state", set_toggle)?;

    let set_text = lua.create_function(move |_, (title, text): (String, String)| {
        Ok(ctx.set_text_input(&title, &text))
    })?;
    globals.set("set_text_input", set_text)?;

    Ok(())
}

// ── Coroutine support (within this worker) ────────────────────────────────────

fn register_coroutine_api(lua: &Lua, ctx: Arc<WorkerContext>) -> LuaResult<()> {
    let globals = lua.globals();

    let spawn = {
        let queue = Arc::clone(&ctx.spawn_queue);
        lua.create_function(move |lua, func: Function| {
            let thread = lua.create_thread(func)?;
            queue.lock().unwrap().push(thread);
            Ok(())
        })?
    };
    globals.set("spawn", spawn)?;

    // Inside a worker there are no nested OS threads — spawn_thread() degrades
    // to a coroutine so scripts written against the top-level API still run.
    let spawn_thread = {
        let queue = Arc::clone(&ctx.spawn_queue);
        let worker_id = ctx.worker_id;
        lua.create_function(move |lua, func: Function| {
            log::info!("[worker {worker_id}] spawn_thread() in worker — spawning coroutine instead");
            let thread = lua.create_thread(func)?;
            queue.lock().unwrap().push(thread);
            Ok(())
        })?
    };
    globals.set("spawn_thread", spawn_thread)?;

    Ok(())
}

// ── Utility functions ─────────────────────────────────────────────────────────

fn register_util(lua: &Lua, ctx: Arc<WorkerContext>) -> LuaResult<()> {
    let globals = lua.globals();

    globals.set("WORKER_ID", ctx.worker_id)?;

    let now = lua.create_function(|_, ()| Ok(super::now_seconds()))?;
    globals.set("now", now.clone())?;
    globals.set("get_time_seconds", now)?;

    let running = lua.create_function(move |_, ()| Ok(ctx.is_host_running()))?;
    globals.set("is_host_running", running)?;

    // Blocks the whole worker thread, not just the calling coroutine. Scripts
    // inside coroutines should prefer sleep(s).
    let sleep_ms = lua.create_function(|_, ms: u64| {
        std::thread::sleep(std::time::Duration::from_millis(ms));
        Ok(())
    })?;
    globals.set("sleep_ms", sleep_ms)?;

    Ok(())
}

// ── log ───────────────────────────────────────────────────────────────────────

fn register_log(lua: &Lua, ctx: Arc<WorkerContext>) -> LuaResult<()> {
    let log_tbl = lua.create_table()?;

    macro_rules! log_fn {
        ($level:literal) => {{
            let sink = Arc::clone(&ctx.log_sink);
            let worker_id = ctx.worker_id;
            lua.create_function(move |_, msg: String| {
                log::info!("[worker {worker_id}][{}] {}", $level, msg);
                let mut entries = sink.lock().unwrap();
                entries.push(ScriptLogEntry {
                    level: $level.to_string(),
                    message: msg,
                    timestamp: chrono::Utc::now().timestamp(),
                });
                if entries.len() > WORKER_LOG_CAP {
                    let excess = entries.len() - WORKER_LOG_CAP;
                    entries.drain(..excess);
                }
                Ok(())
            })?
        }};
    }

    log_tbl.set("info", log_fn!("info"))?;
    log_tbl.set("warn", log_fn!("warn"))?;
    log_tbl.set("error", log_fn!("error"))?;
    lua.globals().set("log", log_tbl)?;
    Ok(())
}

// ── Lua prelude ───────────────────────────────────────────────────────────────

/// Pure-Lua helpers layered over the registered functions. `yield(s)` sleeps
/// for `s` seconds, `yield()` reschedules on the next tick.
fn install_prelude(lua: &Lua) -> LuaResult<()> {
    lua.load(
        r#"
        IS_WORKER_THREAD = true

        yield = coroutine.yield

        function sleep(s)
            return yield(s)
        end
    "#,
    )
    .set_name("luascope prelude")
    .exec()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SpscRing;
    use crate::scripting::sandbox::TrustLevel;
    use crate::ui::UiState;

    /// Context over tiny rings, plus the consumer ends for assertions.
    fn test_ctx() -> (
        Arc<WorkerContext>,
        crate::queue::Consumer<SignalUpdate>,
        crate::queue::Consumer<UiEvent>,
        Arc<UiSnapshotCell>,
    ) {
        let (signal_tx, signal_rx) = SpscRing::with_capacity(64).split();
        let (event_tx, event_rx) = SpscRing::with_capacity(8).split();
        let snapshot = Arc::new(UiSnapshotCell::new());
        let ctx = Arc::new(WorkerContext::new(
            7,
            signal_tx,
            event_tx,
            Arc::new(SignalIdRegistry::new()),
            Arc::clone(&snapshot),
            Arc::new(AtomicBool::new(true)),
            Arc::new(Mutex::new(Vec::new())),
            Arc::new(Mutex::new(Vec::new())),
        ));
        (ctx, signal_rx, event_rx, snapshot)
    }

    fn vm_with_api(ctx: Arc<WorkerContext>) -> Lua {
        let lua = crate::scripting::sandbox::create_sandboxed_vm(TrustLevel::Basic).unwrap();
        register_all(&lua, ctx).unwrap();
        lua
    }

    #[test]
    fn update_signal_lands_in_the_ring() {
        let (ctx, mut signal_rx, _event_rx, _snap) = test_ctx();
        let lua = vm_with_api(Arc::clone(&ctx));

        let ok: bool = lua.load(r#"return update_signal("A", 1.5, 42.0)"#).eval().unwrap();
        assert!(ok);

        let update = signal_rx.pop().expect("one update queued");
        assert_eq!(update.timestamp, 1.5);
        assert_eq!(update.value, 42.0);
        assert_eq!(update.signal_id, 0, "first name gets the first dense ID");
    }

    #[test]
    fn fast_variant_reuses_the_cached_id() {
        let (ctx, mut signal_rx, _event_rx, _snap) = test_ctx();
        let lua = vm_with_api(Arc::clone(&ctx));

        lua.load(
            r#"
            local id = get_signal_id("B")
            update_signal_fast(id, 0.0, 1.0)
            update_signal("B", 0.1, 2.0)
        "#,
        )
        .exec()
        .unwrap();

        let a = signal_rx.pop().unwrap();
        let b = signal_rx.pop().unwrap();
        assert_eq!(a.signal_id, b.signal_id, "both paths resolve to the same ID");
    }

    #[test]
    fn full_ring_reports_backpressure_to_lua() {
        let (ctx, _signal_rx, event_rx, _snap) = test_ctx();
        let lua = vm_with_api(Arc::clone(&ctx));

        // Event ring has 8 slots, so 7 pushes fit.
        let results: Vec<bool> = (0..9)
            .map(|i| {
                lua.load(format!(r#"return set_toggle_state("t{i}", true)"#))
                    .eval()
                    .unwrap()
            })
            .collect();
        assert_eq!(results.iter().filter(|&&ok| ok).count(), 7);
        assert!(!results[8], "push beyond capacity - 1 must report false");
        assert_eq!(event_rx.len(), 7);
    }

    #[test]
    fn snapshot_reads_reflect_the_latest_publish() {
        let (ctx, _signal_rx, _event_rx, snapshot) = test_ctx();
        let lua = vm_with_api(Arc::clone(&ctx));

        let mut ui = UiState::new();
        ui.add_toggle("Record", true);
        ui.add_text_input("Host", "10.0.0.1");
        snapshot.update(|s| s.rebuild_from(&ui));

        let (toggled, text): (bool, String) = lua
            .load(r#"return get_toggle_state("Record"), get_text_input("Host")"#)
            .eval()
            .unwrap();
        assert!(toggled);
        assert_eq!(text, "10.0.0.1");

        let missing: bool = lua.load(r#"return get_toggle_state("nope")"#).eval().unwrap();
        assert!(!missing, "unknown toggles read as off");
    }

    #[test]
    fn spawn_enqueues_a_coroutine() {
        let (ctx, _signal_rx, _event_rx, _snap) = test_ctx();
        let lua = vm_with_api(Arc::clone(&ctx));

        lua.load(r#"spawn(function() yield() end)"#).exec().unwrap();
        assert_eq!(ctx.spawn_queue.lock().unwrap().len(), 1);
    }

    #[test]
    fn log_calls_land_in_the_sink() {
        let (ctx, _signal_rx, _event_rx, _snap) = test_ctx();
        let lua = vm_with_api(Arc::clone(&ctx));

        lua.load(r#"log.info("hello") log.warn("careful")"#).exec().unwrap();
        let entries = ctx.log_sink.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, "info");
        assert_eq!(entries[0].message, "hello");
        assert_eq!(entries[1].level, "warn");
    }

    #[test]
    fn is_host_running_tracks_the_flag() {
        let (ctx, _signal_rx, _event_rx, _snap) = test_ctx();
        let lua = vm_with_api(Arc::clone(&ctx));

        let running: bool = lua.load("return is_host_running()").eval().unwrap();
        assert!(running);

        ctx.app_running.store(false, Ordering::Release);
        let running: bool = lua.load("return is_host_running()").eval().unwrap();
        assert!(!running);
    }
}
