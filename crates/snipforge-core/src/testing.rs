//! In-memory collaborators for unit tests.

use crate::error::{Result, SnipForgeError};
use crate::keyboard::{KeySink, SyntheticKey};
use crate::models::{FieldSpec, Snippet};
use crate::services::{
    ClipboardContent, ClipboardService, FocusToken, ImageData, PromptOutcome, PromptPresenter,
    SnippetStore,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MemoryStore {
    snippets: Mutex<HashMap<String, Arc<Snippet>>>,
}

impl MemoryStore {
    pub fn with_templates(templates: &[(&str, &str)]) -> Self {
        let store = Self::default();
        for (trigger, template) in templates {
            store.insert(Snippet::from_template(*trigger, template));
        }
        store
    }

    pub fn insert(&self, snippet: Snippet) {
        self.snippets
            .lock()
            .unwrap()
            .insert(snippet.trigger.clone(), Arc::new(snippet));
    }
}

impl SnippetStore for MemoryStore {
    fn lookup(&self, trigger: &str) -> Option<Arc<Snippet>> {
        self.snippets.lock().unwrap().get(trigger).cloned()
    }

    fn all_triggers(&self) -> Vec<String> {
        self.snippets.lock().unwrap().keys().cloned().collect()
    }
}

/// Presenter that answers from a fixed map and records every request.
pub struct ScriptedPresenter {
    answer: Option<HashMap<String, String>>,
    fail: bool,
    pub requests: Mutex<Vec<Vec<FieldSpec>>>,
}

impl ScriptedPresenter {
    pub fn submitting(values: &[(&str, &str)]) -> Self {
        Self {
            answer: Some(
                values
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn cancelling() -> Self {
        Self {
            answer: None,
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            fail: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl PromptPresenter for ScriptedPresenter {
    fn prompt(&self, fields: &[FieldSpec]) -> Result<PromptOutcome> {
        self.requests.lock().unwrap().push(fields.to_vec());
        if self.fail {
            return Err(SnipForgeError::Prompt("dialog crashed".to_string()));
        }
        Ok(match &self.answer {
            Some(values) => PromptOutcome::Submitted(values.clone()),
            None => PromptOutcome::Cancelled,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardOp {
    WriteText(String),
    WriteHtml { html: String, alt: String },
    WriteImage { width: usize, height: usize },
    RestoreFocus(FocusToken),
}

/// Clipboard whose content can be preset; `None` makes reads fail.
pub struct FakeClipboard {
    content: Mutex<Option<ClipboardContent>>,
    pub ops: Mutex<Vec<ClipboardOp>>,
    pub focus: FocusToken,
}

impl FakeClipboard {
    pub fn holding(content: ClipboardContent) -> Self {
        Self {
            content: Mutex::new(Some(content)),
            ops: Mutex::new(Vec::new()),
            focus: FocusToken { window: 4_194_310 },
        }
    }

    pub fn broken() -> Self {
        Self {
            content: Mutex::new(None),
            ops: Mutex::new(Vec::new()),
            focus: FocusToken { window: 4_194_310 },
        }
    }

    pub fn ops(&self) -> Vec<ClipboardOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn current(&self) -> Option<ClipboardContent> {
        self.content.lock().unwrap().clone()
    }

    fn set(&self, content: ClipboardContent, op: ClipboardOp) {
        *self.content.lock().unwrap() = Some(content);
        self.ops.lock().unwrap().push(op);
    }
}

impl ClipboardService for FakeClipboard {
    fn read_clipboard(&self) -> Result<ClipboardContent> {
        self.content
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SnipForgeError::Clipboard("clipboard unavailable".to_string()))
    }

    fn write_text(&self, text: &str) -> Result<()> {
        self.set(
            ClipboardContent::Text(text.to_string()),
            ClipboardOp::WriteText(text.to_string()),
        );
        Ok(())
    }

    fn write_html(&self, html: &str, alt_text: &str) -> Result<()> {
        self.set(
            ClipboardContent::Text(alt_text.to_string()),
            ClipboardOp::WriteHtml {
                html: html.to_string(),
                alt: alt_text.to_string(),
            },
        );
        Ok(())
    }

    fn write_image(&self, image: &ImageData) -> Result<()> {
        self.set(
            ClipboardContent::Image(image.clone()),
            ClipboardOp::WriteImage {
                width: image.width,
                height: image.height,
            },
        );
        Ok(())
    }

    fn capture_focus(&self) -> Result<FocusToken> {
        Ok(self.focus)
    }

    fn restore_focus(&self, token: &FocusToken) -> Result<()> {
        self.ops.lock().unwrap().push(ClipboardOp::RestoreFocus(*token));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOp {
    Tap(SyntheticKey),
    Text(String),
    Paste,
}

/// Key sink that records everything; optionally fails after `fail_after` ops.
#[derive(Default)]
pub struct RecordingKeys {
    pub ops: Vec<KeyOp>,
    pub fail_after: Option<usize>,
}

impl RecordingKeys {
    fn record(&mut self, op: KeyOp) -> Result<()> {
        if let Some(limit) = self.fail_after {
            if self.ops.len() >= limit {
                return Err(SnipForgeError::Enigo("input rejected".to_string()));
            }
        }
        self.ops.push(op);
        Ok(())
    }

    pub fn count(&self, key: SyntheticKey) -> usize {
        self.ops
            .iter()
            .filter(|op| **op == KeyOp::Tap(key))
            .count()
    }

    pub fn typed(&self) -> String {
        self.ops
            .iter()
            .map(|op| match op {
                KeyOp::Text(text) => text.as_str(),
                _ => "",
            })
            .collect()
    }
}

impl KeySink for RecordingKeys {
    fn tap(&mut self, key: SyntheticKey) -> Result<()> {
        self.record(KeyOp::Tap(key))
    }

    fn text(&mut self, text: &str) -> Result<()> {
        self.record(KeyOp::Text(text.to_string()))
    }

    fn paste_chord(&mut self) -> Result<()> {
        self.record(KeyOp::Paste)
    }
}
