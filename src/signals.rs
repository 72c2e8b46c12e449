/// `signals.rs` — name-keyed signal time-series store
///
/// The store belongs to the application/render thread; the scripting core
/// only ever appends points to it through the manager's drain step. Kept here
/// so the drain contract has a concrete shape to land on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackMode {
    /// Real-time feed: fixed-capacity overwrite ring.
    Online,
    /// File playback: history grows unbounded.
    Offline,
}

/// A single signal (e.g. `"IMU.AccelX"`) holding its own history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    time: Vec<f64>,
    value: Vec<f64>,
    /// Online mode: index of the oldest point once the ring is full.
    offset: usize,
    max_points: usize,
    mode: PlaybackMode,
}

impl Signal {
    pub fn new(name: impl Into<String>, max_points: usize, mode: PlaybackMode) -> Self {
        let mut s = Self {
            name: name.into(),
            time: Vec::new(),
            value: Vec::new(),
            offset: 0,
            max_points: max_points.max(1),
            mode,
        };
        if s.mode == PlaybackMode::Online {
            s.time.reserve(s.max_points);
            s.value.reserve(s.max_points);
        }
        s
    }

    pub fn add_point(&mut self, t: f64, v: f64) {
        match self.mode {
            PlaybackMode::Online => {
                if self.time.len() < self.max_points {
                    self.time.push(t);
                    self.value.push(v);
                } else {
                    // Ring is full: overwrite the oldest slot.
                    self.time[self.offset] = t;
                    self.value[self.offset] = v;
                    self.offset = (self.offset + 1) % self.max_points;
                }
            }
            PlaybackMode::Offline => {
                self.time.push(t);
                self.value.push(v);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn clear(&mut self) {
        self.time.clear();
        self.value.clear();
        self.offset = 0;
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
        if self.mode == PlaybackMode::Online {
            if self.time.capacity() < self.max_points {
                self.time.reserve(self.max_points - self.time.len());
            }
            if self.value.capacity() < self.max_points {
                self.value.reserve(self.max_points - self.value.len());
            }
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Points in chronological (insertion) order, unwrapping the ring.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let n = self.time.len();
        (0..n).map(move |i| {
            let idx = if n == self.max_points {
                (self.offset + i) % n
            } else {
                i
            };
            (self.time[idx], self.value[idx])
        })
    }
}

/// The shared store the manager drains into. Owned by the application thread.
pub type SignalStore = HashMap<String, Signal>;

// ── Tests ─────────────────────────────────────────────────────────────────────
