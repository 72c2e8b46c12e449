/// `registry.rs` — signal name → dense ID registry
///
/// Process-wide map from signal name to a compact sequential ID so the hot
/// path (queue messages) carries an `i32` instead of a heap string. Shared by
/// every worker behind a mutex, but consulted only on a cache miss: each
/// worker keeps its own name→id map and the manager keeps an id→name map for
/// the drain step, so the lock is rarely contended.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct RegistryInner {
    id_to_name: Vec<String>,
    name_to_id: HashMap<String, i32>,
}

/// IDs are assigned densely (`0, 1, 2, …`), are append-only, and never change
/// meaning for the life of the process. Operations never fail: a miss creates.
#[derive(Default)]
pub struct SignalIdRegistry {
    inner: Mutex<RegistryInner>,
}

impl SignalIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `name`, creating a fresh dense ID on miss. Idempotent.
    pub fn get_or_create(&self, name: &str) -> i32 {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&id) = inner.name_to_id.get(name) {
            return id;
        }
        let id = inner.id_to_name.len() as i32;
        inner.id_to_name.push(name.to_string());
        inner.name_to_id.insert(name.to_string(), id);
        id
    }

    /// Reverse lookup, used by the manager's drain step.
    pub fn get_name(&self, id: i32) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        if id < 0 {
            return None;
        }
        inner.id_to_name.get(id as usize).cloned()
    }

    pub fn has_id(&self, id: i32) -> bool {
        let inner = self.inner.lock().unwrap();
        id >= 0 && (id as usize) < inner.id_to_name.len()
    }

    /// Number of registered signals.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().id_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop both directions. Only meaningful on a full scripting-environment
    /// reset — live workers hold cached IDs that would dangle otherwise.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.id_to_name.clear();
        inner.name_to_id.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
