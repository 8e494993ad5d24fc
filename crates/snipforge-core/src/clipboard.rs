use crate::error::{Result, SnipForgeError};
use crate::services::{ClipboardContent, ClipboardService, FocusToken, ImageData};
use arboard::Clipboard;
use log::debug;
use std::borrow::Cow;
use std::process::Command;
use std::sync::{Mutex, MutexGuard};

/// Program used to query and re-activate the focused window.
const FOCUS_TOOL: &str = "xdotool";

fn clipboard_error(err: arboard::Error) -> SnipForgeError {
    SnipForgeError::Clipboard(err.to_string())
}

/// System clipboard through arboard, window focus through xdotool.
///
/// The arboard handle is created on first use and kept, so content written
/// for a paste is still being served when the target application asks for it.
#[derive(Default)]
pub struct SystemClipboard {
    handle: Mutex<Option<Clipboard>>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_clipboard<T>(&self, f: impl FnOnce(&mut Clipboard) -> Result<T>) -> Result<T> {
        let mut guard: MutexGuard<'_, Option<Clipboard>> = self
            .handle
            .lock()
            .map_err(|_| SnipForgeError::Clipboard("clipboard lock poisoned".to_string()))?;
        if guard.is_none() {
            *guard = Some(Clipboard::new().map_err(clipboard_error)?);
        }
        match guard.as_mut() {
            Some(clipboard) => f(clipboard),
            None => Err(SnipForgeError::Clipboard(
                "clipboard is not available".to_string(),
            )),
        }
    }
}

impl ClipboardService for SystemClipboard {
    fn read_clipboard(&self) -> Result<ClipboardContent> {
        self.with_clipboard(|clipboard| {
            if let Ok(image) = clipboard.get_image() {
                return Ok(ClipboardContent::Image(ImageData {
                    width: image.width,
                    height: image.height,
                    bytes: image.bytes.into_owned(),
                }));
            }
            match clipboard.get_text() {
                Ok(text) if !text.is_empty() => Ok(ClipboardContent::Text(text)),
                Ok(_) | Err(arboard::Error::ContentNotAvailable) => Ok(ClipboardContent::Empty),
                Err(err) => Err(clipboard_error(err)),
            }
        })
    }

    fn write_text(&self, text: &str) -> Result<()> {
        self.with_clipboard(|clipboard| clipboard.set_text(text).map_err(clipboard_error))
    }

    fn write_html(&self, html: &str, alt_text: &str) -> Result<()> {
        self.with_clipboard(|clipboard| {
            clipboard
                .set_html(html, Some(alt_text))
                .map_err(clipboard_error)
        })
    }

    fn write_image(&self, image: &ImageData) -> Result<()> {
        self.with_clipboard(|clipboard| {
            clipboard
                .set_image(arboard::ImageData {
                    width: image.width,
                    height: image.height,
                    bytes: Cow::Borrowed(&image.bytes),
                })
                .map_err(clipboard_error)
        })
    }

    fn capture_focus(&self) -> Result<FocusToken> {
        let output = Command::new(FOCUS_TOOL)
            .arg("getactivewindow")
            .output()
            .map_err(|err| {
                SnipForgeError::ResourceUnavailable(format!("{} not available: {}", FOCUS_TOOL, err))
            })?;

        if !output.status.success() {
            return Err(SnipForgeError::ResourceUnavailable(
                "no active window".to_string(),
            ));
        }

        let window = parse_window_id(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Focused window before prompt: {}", window);
        Ok(FocusToken { window })
    }

    fn restore_focus(&self, token: &FocusToken) -> Result<()> {
        let status = Command::new(FOCUS_TOOL)
            .args(["windowactivate", "--sync", &token.window.to_string()])
            .status()?;
        if !status.success() {
            return Err(SnipForgeError::ResourceUnavailable(format!(
                "could not re-activate window {}",
                token.window
            )));
        }
        Ok(())
    }
}

fn parse_window_id(output: &str) -> Result<u64> {
    output.trim().parse::<u64>().map_err(|_| {
        SnipForgeError::ResourceUnavailable(format!(
            "unexpected window id from {}: {:?}",
            FOCUS_TOOL,
            output.trim()
        ))
    })
}
