/// `scripting/` — the concurrent Lua execution substrate
///
/// One OS thread per worker, one Lua VM per worker (mlua), cooperative
/// coroutines inside each worker, and SPSC rings back to the application
/// thread. Script errors are caught and logged — never crash the host.

pub mod api;
pub mod manager;
pub mod sandbox;
pub mod scheduler;
pub mod worker;

use std::sync::LazyLock;
use std::time::Instant;

pub use api::{ScriptLogEntry, WorkerContext};
pub use manager::ScriptThreadManager;
pub use sandbox::TrustLevel;
pub use worker::ScriptSource;

/// Dense worker identifier handed back by `spawn_worker`.
pub type WorkerId = i32;

static CLOCK_EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Monotonic host clock in seconds. Shared timebase for coroutine wake
/// deadlines and the `now()` function exposed to scripts.
pub fn now_seconds() -> f64 {
    CLOCK_EPOCH.elapsed().as_secs_f64()
}
