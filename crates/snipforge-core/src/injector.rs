//! Replays an expansion into the focused application.

use crate::config::Settings;
use crate::error::{Result, SnipForgeError};
use crate::expansion::{ExpansionOutcome, ExpansionResult};
use crate::keyboard::{KeySink, SyntheticKey};
use crate::plan::{typed_len, Action};
use crate::services::{ClipboardContent, ClipboardService, ImageData};
use log::{debug, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Lines longer than this are typed in several pieces.
const CHUNK_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectorTiming {
    pub backspace_delay: Duration,
    pub line_delay: Duration,
    pub clipboard_settle: Duration,
    pub deselect_after_image: bool,
}

impl InjectorTiming {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            backspace_delay: Duration::from_millis(settings.backspace_delay_ms),
            line_delay: Duration::from_millis(settings.line_delay_ms),
            clipboard_settle: settings.clipboard_settle(),
            deselect_after_image: settings.deselect_after_image,
        }
    }
}

impl Default for InjectorTiming {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

fn injection_error(err: SnipForgeError) -> SnipForgeError {
    match err {
        SnipForgeError::Injection(_) => err,
        other => SnipForgeError::Injection(other.to_string()),
    }
}

pub struct Injector<K: KeySink> {
    keys: K,
    clipboard: Arc<dyn ClipboardService>,
    timing: InjectorTiming,
}

impl<K: KeySink> Injector<K> {
    pub fn new(keys: K, clipboard: Arc<dyn ClipboardService>, timing: InjectorTiming) -> Self {
        Self {
            keys,
            clipboard,
            timing,
        }
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Remove the trigger and play the resolved output. Any failure of the
    /// input channel aborts the rest and is returned as `Injection`.
    pub fn inject(&mut self, result: &ExpansionResult) -> Result<()> {
        let plan = match &result.outcome {
            ExpansionOutcome::NoOp | ExpansionOutcome::Failed(_) => return Ok(()),
            ExpansionOutcome::Cancelled => None,
            ExpansionOutcome::Complete(plan) => Some(plan),
        };

        if let Some(token) = &result.focus {
            if let Err(err) = self.clipboard.restore_focus(token) {
                warn!("Could not restore focus: {}", err);
            }
        }

        debug!(
            "Injecting '{}': {} backspaces",
            result.trigger, result.delete_count
        );
        self.backspaces(result.delete_count)
            .map_err(injection_error)?;

        let Some(plan) = plan else {
            return self.type_text(&result.trailing).map_err(injection_error);
        };

        let mut cursor_move: isize = 0;
        for action in plan.actions() {
            match action {
                Action::MoveCursorBy(offset) => cursor_move += offset,
                other => self.perform(other).map_err(injection_error)?,
            }
        }

        self.type_text(&result.trailing).map_err(injection_error)?;
        if cursor_move < 0 {
            let trailing = typed_len(&result.trailing) as isize;
            cursor_move -= trailing;
        }
        self.move_cursor(cursor_move).map_err(injection_error)
    }

    fn perform(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::TypeText(text) => self.type_text(text),
            Action::PasteRichText { text, html } => self.paste_rich_text(text, html),
            Action::PasteImage(image) => self.paste_image(image),
            Action::CursorMarker => Ok(()),
            Action::MoveCursorBy(offset) => self.move_cursor(*offset),
        }
    }

    fn backspaces(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.keys.tap(SyntheticKey::Backspace)?;
            pause(self.timing.backspace_delay);
        }
        Ok(())
    }

    /// Type text line by line, pressing Return between lines.
    fn type_text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        let lines: Vec<&str> = text.split('\n').collect();
        for (i, line) in lines.iter().enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if !line.is_empty() {
                let chars: Vec<char> = line.chars().collect();
                for chunk in chars.chunks(CHUNK_SIZE) {
                    let chunk: String = chunk.iter().collect();
                    self.keys.text(&chunk)?;
                }
            }

            if i < lines.len() - 1 {
                self.keys.tap(SyntheticKey::Return)?;
                pause(self.timing.line_delay);
            }
        }
        Ok(())
    }

    fn paste_rich_text(&mut self, text: &str, html: &str) -> Result<()> {
        let saved = self.save_clipboard();
        let pasted = match self.clipboard.write_html(html, text) {
            Ok(()) => self.paste(),
            Err(err) => Err(err),
        };
        self.restore_clipboard(saved);
        pasted
    }

    fn paste_image(&mut self, image: &ImageData) -> Result<()> {
        let saved = self.save_clipboard();
        let pasted = match self.clipboard.write_image(image) {
            Ok(()) => self.paste(),
            Err(err) => Err(err),
        };
        let deselected = match pasted {
            Ok(()) if self.timing.deselect_after_image => self.keys.tap(SyntheticKey::Right),
            other => other,
        };
        self.restore_clipboard(saved);
        deselected
    }

    fn paste(&mut self) -> Result<()> {
        pause(self.timing.clipboard_settle);
        self.keys.paste_chord()?;
        pause(self.timing.clipboard_settle);
        Ok(())
    }

    fn save_clipboard(&self) -> Option<ClipboardContent> {
        match self.clipboard.read_clipboard() {
            Ok(content) => Some(content),
            Err(err) => {
                debug!("Nothing to save from clipboard: {}", err);
                None
            }
        }
    }

    fn restore_clipboard(&self, saved: Option<ClipboardContent>) {
        let restored = match saved {
            Some(ClipboardContent::Text(text)) => self.clipboard.write_text(&text),
            Some(ClipboardContent::Image(image)) => self.clipboard.write_image(&image),
            Some(ClipboardContent::Empty) | None => Ok(()),
        };
        if let Err(err) = restored {
            warn!("Could not restore clipboard: {}", err);
        }
    }

    fn move_cursor(&mut self, offset: isize) -> Result<()> {
        let key = if offset < 0 {
            SyntheticKey::Left
        } else {
            SyntheticKey::Right
        };
        for _ in 0..offset.unsigned_abs() {
            self.keys.tap(key)?;
        }
        Ok(())
    }
}
