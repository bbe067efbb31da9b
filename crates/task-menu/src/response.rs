//! Renderer-agnostic menu responses.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::command::Callback;

/// One inline button: a label and the callback token it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub token: String,
}

impl Button {
    pub fn new(label: impl Into<String>, callback: &Callback) -> Self {
        Self {
            label: label.into(),
            token: callback.token(),
        }
    }
}

/// What the router hands back for any token: text, optional media
/// (a rendered chart), and button rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuResponse {
    pub text: String,
    pub media: Option<PathBuf>,
    pub buttons: Vec<Vec<Button>>,
}

impl MenuResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: None,
            buttons: Vec::new(),
        }
    }

    pub fn with_media(mut self, path: PathBuf) -> Self {
        self.media = Some(path);
        self
    }

    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        self.buttons.push(row);
        self
    }

    /// Append the standard back-to-main-menu row. Every response the
    /// router produces ends with one, so a user can never get stranded.
    pub fn with_main_button(self) -> Self {
        self.with_row(vec![Button::new("🏠 Menu", &Callback::Main)])
    }

    /// Whether any button fires the given callback.
    pub fn has_button_for(&self, callback: &Callback) -> bool {
        let token = callback.token();
        self.buttons
            .iter()
            .flatten()
            .any(|button| button.token == token)
    }
}
