//! Interfaces to the collaborators the expansion pipeline depends on.

use crate::error::Result;
use crate::models::{FieldSpec, Snippet};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Read access to the snippet collection. Lookups hand out shared snapshots,
/// so later edits never reach an expansion already in progress.
pub trait SnippetStore: Send + Sync {
    fn lookup(&self, trigger: &str) -> Option<Arc<Snippet>>;
    fn all_triggers(&self) -> Vec<String>;
}

/// Result of one prompt interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    Submitted(HashMap<String, String>),
    Cancelled,
}

/// Asks the user for every field of a snippet in a single interaction.
pub trait PromptPresenter: Send + Sync {
    fn prompt(&self, fields: &[FieldSpec]) -> Result<PromptOutcome>;
}

/// Raw RGBA pixels, four bytes per pixel, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: usize,
    pub height: usize,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardContent {
    Text(String),
    Image(ImageData),
    Empty,
}

/// The window that had input focus before a prompt appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusToken {
    pub window: u64,
}

pub trait ClipboardService: Send + Sync {
    fn read_clipboard(&self) -> Result<ClipboardContent>;
    fn write_text(&self, text: &str) -> Result<()>;
    /// Write rich text with a plain-text alternative.
    fn write_html(&self, html: &str, alt_text: &str) -> Result<()>;
    fn write_image(&self, image: &ImageData) -> Result<()>;
    fn capture_focus(&self) -> Result<FocusToken>;
    fn restore_focus(&self, token: &FocusToken) -> Result<()>;
}
