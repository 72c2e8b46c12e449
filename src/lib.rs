//! luascope — concurrent Lua scripting substrate for a real-time plotting host.
//!
//! User scripts run on their own worker threads, each with an isolated Lua VM
//! and a cooperative coroutine scheduler, and talk to the application thread
//! exclusively through lock-free SPSC rings plus a double-buffered read-only
//! UI snapshot. The application drives [`ScriptThreadManager`] once per frame:
//! publish a snapshot, drain signal updates into its store, apply UI events.
//!
//! ```no_run
//! use luascope::config::ScriptHostConfig;
//! use luascope::scripting::ScriptThreadManager;
//! use luascope::signals::SignalStore;
//! use luascope::ui::UiState;
//!
//! let manager = ScriptThreadManager::new(ScriptHostConfig::default());
//! manager.spawn_worker(r#"
//!     spawn(function()
//!         while is_host_running() do
//!             update_signal("lua.heartbeat", now(), 1.0)
//!             sleep(0.5)
//!         end
//!     end)
//! "#).unwrap();
//!
//! let mut ui = UiState::new();
//! let mut store = SignalStore::new();
//! loop {
//!     manager.update_ui_snapshot(&ui);
//!     manager.drain_signal_queues(&mut store);
//!     manager.process_ui_events(&mut ui);
//!     // ... render `store` and `ui` ...
//! }
//! ```

pub mod config;
pub mod messages;
pub mod queue;
pub mod registry;
pub mod scripting;
pub mod signals;
pub mod snapshot;
pub mod ui;

pub use config::ScriptHostConfig;
pub use messages::{SignalUpdate, UiEvent};
pub use registry::SignalIdRegistry;
pub use scripting::{ScriptThreadManager, TrustLevel, WorkerId};
pub use signals::{PlaybackMode, Signal, SignalStore};
pub use snapshot::{UiSnapshotCell, UiStateSnapshot};
pub use ui::UiState;
