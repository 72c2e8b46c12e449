/// `snapshot.rs` — read-only UI state snapshot with double buffering
///
/// Worker threads must never touch the live UI controls, so the application
/// thread publishes a pre-built copy once per frame: two buffers, one
/// "current" (readable by any worker, lock-free), one staging (private to the
/// writer). Publishing swaps the roles with a single atomic store, so a
/// published snapshot is always fully formed and readers lag by at most one
/// publish cycle.
///
/// Readers register themselves in a per-buffer counter before dereferencing;
/// the writer reuses a buffer only once its counter drains. Readers never
/// block or spin — only the writer can wait, and only on a reader that still
/// holds a guard from two publishes ago.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::ui::UiState;

// ── Snapshot data ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ButtonState {
    pub title: String,
    pub clicked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ToggleState {
    pub title: String,
    pub state: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TextInputState {
    pub title: String,
    pub text: String,
}

/// One fully-formed copy of the interactive control states, with companion
/// title indexes for O(1) lookup from script callbacks.
#[derive(Debug, Default)]
pub struct UiStateSnapshot {
    pub buttons: Vec<ButtonState>,
    pub toggles: Vec<ToggleState>,
    pub text_inputs: Vec<TextInputState>,

    button_clicked_map: HashMap<String, bool>,
    toggle_state_map: HashMap<String, bool>,
    text_input_map: HashMap<String, String>,
}

impl UiStateSnapshot {
    /// Clear and repopulate every list from the live controls, then rebuild
    /// the lookup indexes. Runs on the staging buffer only.
    pub fn rebuild_from(&mut self, ui: &UiState) {
        self.buttons.clear();
        self.toggles.clear();
        self.text_inputs.clear();

        for btn in &ui.buttons {
            self.buttons.push(ButtonState { title: btn.title.clone(), clicked: btn.clicked });
        }
        for tog in &ui.toggles {
            self.toggles.push(ToggleState { title: tog.title.clone(), state: tog.state });
        }
        for txt in &ui.text_inputs {
            self.text_inputs.push(TextInputState { title: txt.title.clone(), text: txt.text.clone() });
        }

        self.build_maps();
    }

    fn build_maps(&mut self) {
        self.button_clicked_map.clear();
        self.toggle_state_map.clear();
        self.text_input_map.clear();

        for btn in &self.buttons {
            self.button_clicked_map.insert(btn.title.clone(), btn.clicked);
        }
        for tog in &self.toggles {
            self.toggle_state_map.insert(tog.title.clone(), tog.state);
        }
        for txt in &self.text_inputs {
            self.text_input_map.insert(txt.title.clone(), txt.text.clone());
        }
    }

    /// Unknown titles read as an un-clicked button.
    pub fn button_clicked(&self, title: &str) -> bool {
        self.button_clicked_map.get(title).copied().unwrap_or(false)
    }

    /// Unknown titles read as an off toggle.
    pub fn toggle_state(&self, title: &str) -> bool {
        self.toggle_state_map.get(title).copied().unwrap_or(false)
    }

    /// Unknown titles read as empty text.
    pub fn text_input(&self, title: &str) -> String {
        self.text_input_map.get(title).cloned().unwrap_or_default()
    }

    /// Index sizes, for consistency checks against the list lengths.
    pub fn index_sizes(&self) -> (usize, usize, usize) {
        (
            self.button_clicked_map.len(),
            self.toggle_state_map.len(),
            self.text_input_map.len(),
        )
    }
}

// ── Double buffer ─────────────────────────────────────────────────────────────

/// Single-writer/multi-reader snapshot cell. The writer mutex serialises
/// publishers (there is exactly one in practice — the application thread);
/// readers never touch it.
pub struct UiSnapshotCell {
    buffers: [UnsafeCell<UiStateSnapshot>; 2],
    readers: [AtomicUsize; 2],
    /// Index of the currently published buffer.
    current: AtomicUsize,
    writer: Mutex<()>,
}

// SAFETY: buffer access follows the protocol documented on `read`/`update`:
// readers only dereference a buffer while registered in its counter and while
// it is (or was, guarded) the published one; the writer only mutates the
// other buffer, and only after its counter has drained.
unsafe impl Send for UiSnapshotCell {}
unsafe impl Sync for UiSnapshotCell {}

impl Default for UiSnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}

impl UiSnapshotCell {
    pub fn new() -> Self {
        Self {
            buffers: [
                UnsafeCell::new(UiStateSnapshot::default()),
                UnsafeCell::new(UiStateSnapshot::default()),
            ],
            readers: [AtomicUsize::new(0), AtomicUsize::new(0)],
            current: AtomicUsize::new(0),
            writer: Mutex::new(()),
        }
    }

    /// Rebuild the staging buffer through `f`, then publish it. The staging
    /// buffer keeps the previous-but-one contents; `f` is expected to fully
    /// repopulate it (`UiStateSnapshot::rebuild_from` does).
    pub fn update<F: FnOnce(&mut UiStateSnapshot)>(&self, f: F) {
        let _writer = self.writer.lock().unwrap();

        let staging = 1 - self.current.load(Ordering::SeqCst);

        // A reader may still hold a guard on the retired buffer from before
        // the previous publish. Wait it out; guards are scoped to single
        // lookups, so this is at most a few loads.
        while self.readers[staging].load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
        }

        // Exclusive: no published pointer leads here and the counter is zero.
        f(unsafe { &mut *self.buffers[staging].get() });

        self.current.store(staging, Ordering::SeqCst);
    }

    /// Lock-free read of the current snapshot. The guard pins its buffer;
    /// hold it only for the duration of a lookup.
    pub fn read(&self) -> SnapshotReadGuard<'_> {
        loop {
            let idx = self.current.load(Ordering::SeqCst);
            self.readers[idx].fetch_add(1, Ordering::SeqCst);
            if self.current.load(Ordering::SeqCst) == idx {
                return SnapshotReadGuard { cell: self, idx };
            }
            // A publish slipped in between; release and retry on the new one.
            self.readers[idx].fetch_sub(1, Ordering::Release);
        }
    }
}

/// Pins one buffer of a [`UiSnapshotCell`] for reading.
pub struct SnapshotReadGuard<'a> {
    cell: &'a UiSnapshotCell,
    idx: usize,
}

impl Deref for SnapshotReadGuard<'_> {
    type Target = UiStateSnapshot;

    fn deref(&self) -> &UiStateSnapshot {
        unsafe { &*self.cell.buffers[self.idx].get() }
    }
}

impl Drop for SnapshotReadGuard<'_> {
    fn drop(&mut self) {
        self.cell.readers[self.idx].fetch_sub(1, Ordering::Release);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn sample_ui(n: usize) -> UiState {
        let mut ui = UiState::new();
        for i in 0..n {
            ui.add_toggle(format!("toggle{i}"), i % 2 == 0);
            ui.add_text_input(format!("text{i}"), format!("value{i}"));
            ui.add_button(format!("button{i}"));
        }
        ui
    }

    #[test]
    fn rebuild_populates_lists_and_indexes() {
        let mut snap = UiStateSnapshot::default();
        snap.rebuild_from(&sample_ui(3));

        assert_eq!(snap.toggles.len(), 3);
        assert_eq!(snap.index_sizes(), (3, 3, 3));
        assert!(snap.toggle_state("toggle0"));
        assert!(!snap.toggle_state("toggle1"));
        assert_eq!(snap.text_input("text2"), "value2");
        assert!(!snap.button_clicked("button0"));
    }

    #[test]
    fn unknown_titles_read_as_defaults() {
        let snap = UiStateSnapshot::default();
        assert!(!snap.toggle_state("nope"));
        assert!(!snap.button_clicked("nope"));
        assert_eq!(snap.text_input("nope"), "");
    }

    #[test]
    fn rebuild_replaces_previous_contents() {
        let mut snap = UiStateSnapshot::default();
        snap.rebuild_from(&sample_ui(5));
        snap.rebuild_from(&sample_ui(2));
        assert_eq!(snap.toggles.len(), 2, "stale controls must not survive a rebuild");
        assert_eq!(snap.index_sizes(), (2, 2, 2));
    }

    #[test]
    fn publish_makes_new_state_visible() {
        let cell = UiSnapshotCell::new();
        let mut ui = sample_ui(1);

        cell.update(|s| s.rebuild_from(&ui));
        assert!(cell.read().toggle_state("toggle0"));

        ui.set_toggle("toggle0", false);
        cell.update(|s| s.rebuild_from(&ui));
        assert!(!cell.read().toggle_state("toggle0"), "readers see the latest publish");
    }

    #[test]
    fn readers_never_observe_a_torn_snapshot() {
        let cell = Arc::new(UiSnapshotCell::new());
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let snap = cell.read();
                        let (b, t, x) = snap.index_sizes();
                        assert_eq!(
                            (snap.buttons.len(), snap.toggles.len(), snap.text_inputs.len()),
                            (b, t, x),
                            "lists and indexes must always agree in size"
                        );
                    }
                })
            })
            .collect();

        // Alternate between differently-sized states for a while.
        let small = sample_ui(2);
        let large = sample_ui(9);
        for i in 0..2000 {
            let ui = if i % 2 == 0 { &small } else { &large };
            cell.update(|s| s.rebuild_from(ui));
        }

        stop.store(true, Ordering::Relaxed);
        for r in readers {
            r.join().expect("reader thread must not panic");
        }
    }
}
