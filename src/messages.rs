/// `messages.rs` — messages exchanged between script workers and the host
///
/// Both message kinds flow one way, worker → application thread, through the
/// per-worker SPSC rings. They are plain data: the drain step on the
/// application side gives them meaning.

use serde::{Deserialize, Serialize};

// ── Signal update ─────────────────────────────────────────────────────────────

/// One data point for a named signal, carried by its pre-resolved dense ID.
///
/// Produced by script code inside a worker, consumed exactly once by the
/// manager's drain step, which appends `(timestamp, value)` to the named
/// series. Not retained after the drain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalUpdate {
    pub signal_id: i32,
    pub timestamp: f64,
    pub value: f64,
}

impl SignalUpdate {
    pub fn new(signal_id: i32, timestamp: f64, value: f64) -> Self {
        Self { signal_id, timestamp, value }
    }
}

// ── UI event ──────────────────────────────────────────────────────────────────

/// An intent to mutate shared UI state, applied by the manager against the
/// live control objects. The worker that sent it never reads it back; it sees
/// the effect in a later snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UiEvent {
    SetToggle { title: String, state: bool },
    SetTextInput { title: String, text: String },
}

impl UiEvent {
    /// Title of the control this event targets.
    pub fn title(&self) -> &str {
        match self {
            UiEvent::SetToggle { title, .. } => title,
            UiEvent::SetTextInput { title, .. } => title,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_event_title_matches_variant() {
        let toggle = UiEvent::SetToggle { title: "Record".into(), state: true };
        assert_eq!(toggle.title(), "Record");

        let text = UiEvent::SetTextInput { title: "Host".into(), text: "10.0.0.1".into() };
        assert_eq!(text.title(), "Host");
    }
}
