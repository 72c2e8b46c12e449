/// `ui.rs` — live interactive control state
///
/// Owned and rendered by the application thread. The scripting core never
/// touches these objects directly: it reads them once per frame to rebuild
/// the snapshot, and mutates them only by applying drained `UiEvent`s.

use serde::{Deserialize, Serialize};

// ── Controls ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ButtonControl {
    pub title: String,
    /// True only for the frame in which the button was pressed.
    pub clicked: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToggleControl {
    pub title: String,
    pub state: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextInputControl {
    pub title: String,
    pub text: String,
}

// ── UiState ───────────────────────────────────────────────────────────────────

/// The set of controls currently active in the host UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiState {
    pub buttons: Vec<ButtonControl>,
    pub toggles: Vec<ToggleControl>,
    pub text_inputs: Vec<TextInputControl>,
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_button(&mut self, title: impl Into<String>) {
        self.buttons.push(ButtonControl { title: title.into(), clicked: false });
    }

    pub fn add_toggle(&mut self, title: impl Into<String>, state: bool) {
        self.toggles.push(ToggleControl { title: title.into(), state });
    }

    pub fn add_text_input(&mut self, title: impl Into<String>, text: impl Into<String>) {
        self.text_inputs.push(TextInputControl { title: title.into(), text: text.into() });
    }

    /// Set a toggle by title. Returns `false` when no such control exists
    /// (the event is simply ignored, matching the drain contract).
    pub fn set_toggle(&mut self, title: &str, state: bool) -> bool {
        match self.toggles.iter_mut().find(|t| t.title == title) {
            Some(t) => {
                t.state = state;
                true
            }
            None => false,
        }
    }

    /// Set a text input by title. Returns `false` when no such control exists.
    pub fn set_text_input(&mut self, title: &str, text: &str) -> bool {
        match self.text_inputs.iter_mut().find(|t| t.title == title) {
            Some(t) => {
                t.text = text.to_string();
                true
            }
            None => false,
        }
    }

    pub fn toggle_state(&self, title: &str) -> Option<bool> {
        self.toggles.iter().find(|t| t.title == title).map(|t| t.state)
    }

    pub fn text_input(&self, title: &str) -> Option<&str> {
        self.text_inputs.iter().find(|t| t.title == title).map(|t| t.text.as_str())
    }

    pub fn button_clicked(&self, title: &str) -> Option<bool> {
        self.buttons.iter().find(|b| b.title == title).map(|b| b.clicked)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
