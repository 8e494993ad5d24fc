//! Field prompt shown through an external dialog program (zenity or a
//! compatible replacement such as qarma).

use log::debug;
use snipforge_core::{FieldKind, FieldSpec, PromptOutcome, PromptPresenter, Result, SnipForgeError};
use std::collections::HashMap;
use std::process::Command;

/// Separator between returned values; unlikely to be typed into a field.
const SEPARATOR: &str = "\u{1f}";
const DIALOG_TITLE: &str = "SnipForge";

pub struct CommandPresenter {
    program: String,
}

impl CommandPresenter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Arguments for a single `--forms` dialog covering every field.
pub fn dialog_args(fields: &[FieldSpec]) -> Vec<String> {
    let mut args = vec![
        "--forms".to_string(),
        format!("--title={}", DIALOG_TITLE),
        "--text=Fill in the snippet fields".to_string(),
        format!("--separator={}", SEPARATOR),
    ];

    for field in fields {
        match &field.kind {
            FieldKind::Plain => args.push(format!("--add-entry={}", field.name)),
            FieldKind::Choice(options) => {
                args.push(format!("--add-combo={}", field.name));
                args.push(format!("--combo-values={}", options.join("|")));
            }
        }
    }
    args
}

/// Map the dialog's output back onto field names. An untouched choice field
/// takes its first option.
pub fn parse_dialog_output(fields: &[FieldSpec], stdout: &str) -> Result<HashMap<String, String>> {
    let stdout = stdout.strip_suffix('\n').unwrap_or(stdout);
    let values: Vec<&str> = if fields.len() == 1 {
        vec![stdout]
    } else {
        stdout.split(SEPARATOR).collect()
    };

    if values.len() != fields.len() {
        return Err(SnipForgeError::Prompt(format!(
            "expected {} values from the dialog, got {}",
            fields.len(),
            values.len()
        )));
    }

    let mut resolved = HashMap::new();
    for (field, value) in fields.iter().zip(values) {
        let value = match &field.kind {
            FieldKind::Choice(options) if value.trim().is_empty() => {
                options.first().cloned().unwrap_or_default()
            }
            _ => value.to_string(),
        };
        resolved.insert(field.name.clone(), value);
    }
    Ok(resolved)
}

impl PromptPresenter for CommandPresenter {
    fn prompt(&self, fields: &[FieldSpec]) -> Result<PromptOutcome> {
        let output = Command::new(&self.program)
            .args(dialog_args(fields))
            .output()
            .map_err(|e| {
                SnipForgeError::Prompt(format!("could not run {}: {}", self.program, e))
            })?;

        match output.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                parse_dialog_output(fields, &stdout).map(PromptOutcome::Submitted)
            }
            // Cancel button, Escape, or the window was closed
            Some(1) | Some(5) => {
                debug!("Prompt dismissed");
                Ok(PromptOutcome::Cancelled)
            }
            _ => Err(SnipForgeError::Prompt(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}
