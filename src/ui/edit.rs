use crossterm::event::{Event, KeyEvent};
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

use crate::connect::ContactField;

/// The text box a single-line editor is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Query,
    Field(ContactField),
}

/// Single-line editor over whichever text box has focus
#[derive(Default)]
pub struct InlineEditor {
    target: Option<EditTarget>,
    input: Input,
}

impl InlineEditor {
    pub fn start(&mut self, current: &str, target: EditTarget) {
        self.target = Some(target);
        self.input = Input::new(current.to_string());
    }

    pub fn cancel(&mut self) {
        self.target = None;
        self.input.reset();
    }

    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<EditTarget> {
        self.target
    }

    pub fn value(&self) -> &str {
        self.input.value()
    }

    pub fn visual_cursor(&self) -> usize {
        self.input.visual_cursor()
    }

    /// Feed a key to the input; returns the new value if the text changed
    pub fn handle_key_event(&mut self, key: KeyEvent) -> Option<String> {
        let changed = self.input.handle_event(&Event::Key(key))?;
        changed.value.then(|| self.input.value().to_string())
    }
}
