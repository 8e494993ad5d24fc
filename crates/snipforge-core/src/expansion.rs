//! Turns a matched trigger into an [`OutputPlan`].

use crate::calc::{self, format_number};
use crate::config::Settings;
use crate::error::{Result, SnipForgeError};
use crate::matcher::TriggerMatch;
use crate::models::{FieldSpec, Placeholder, Segment};
use crate::plan::{Action, OutputPlan};
use crate::services::{
    ClipboardContent, ClipboardService, FocusToken, ImageData, PromptOutcome, PromptPresenter,
    SnippetStore,
};
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Source of "now" for date placeholders.
pub type Clock = Box<dyn Fn() -> DateTime<Local> + Send>;

/// Progress of the most recent expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionState {
    Idle,
    FieldsPending,
    Resolving,
    Complete,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpansionOutcome {
    Complete(OutputPlan),
    /// The user dismissed the prompt. The trigger is still removed.
    Cancelled,
    /// No snippet exists for the trigger any more.
    NoOp,
    /// The prompt could not be shown. Nothing is changed in the document.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionResult {
    pub trigger: String,
    pub delete_count: usize,
    /// Text typed after a held-back trigger, typed again after the output.
    pub trailing: String,
    pub outcome: ExpansionOutcome,
    /// Focus captured before a prompt was shown.
    pub focus: Option<FocusToken>,
    /// A prompt was shown, so keystrokes since the match went to the dialog.
    pub prompted: bool,
    /// Segments that were skipped or rendered empty.
    pub warnings: Vec<String>,
}

impl ExpansionResult {
    pub fn plan(&self) -> Option<&OutputPlan> {
        match &self.outcome {
            ExpansionOutcome::Complete(plan) => Some(plan),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == ExpansionOutcome::Cancelled
    }
}

#[derive(Debug, Clone)]
struct DateFormats {
    date: String,
    time: String,
    datetime: String,
}

pub struct ExpansionEngine {
    store: Arc<dyn SnippetStore>,
    presenter: Arc<dyn PromptPresenter>,
    clipboard: Arc<dyn ClipboardService>,
    formats: DateFormats,
    clock: Clock,
    state: ExpansionState,
}

impl ExpansionEngine {
    pub fn new(
        store: Arc<dyn SnippetStore>,
        presenter: Arc<dyn PromptPresenter>,
        clipboard: Arc<dyn ClipboardService>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            presenter,
            clipboard,
            formats: DateFormats {
                date: settings.date_format.clone(),
                time: settings.time_format.clone(),
                datetime: settings.datetime_format.clone(),
            },
            clock: Box::new(Local::now),
            state: ExpansionState::Idle,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> ExpansionState {
        self.state
    }

    /// Expand a trigger typed directly, with nothing after it.
    pub fn expand_trigger(&mut self, trigger: &str) -> ExpansionResult {
        self.expand(&TriggerMatch::new(trigger, String::new()))
    }

    /// Resolve the snippet for a match into an output plan, prompting once
    /// for all of its fields.
    pub fn expand(&mut self, request: &TriggerMatch) -> ExpansionResult {
        self.state = ExpansionState::Idle;
        let mut result = ExpansionResult {
            trigger: request.trigger.clone(),
            delete_count: request.delete_count,
            trailing: request.trailing.clone(),
            outcome: ExpansionOutcome::NoOp,
            focus: None,
            prompted: false,
            warnings: Vec::new(),
        };

        let Some(snippet) = self.store.lookup(&request.trigger) else {
            debug!("No snippet for trigger '{}'", request.trigger);
            return result;
        };

        let fields = collect_fields(&snippet.segments);
        let context = if fields.is_empty() {
            HashMap::new()
        } else {
            self.state = ExpansionState::FieldsPending;
            result.focus = match self.clipboard.capture_focus() {
                Ok(token) => Some(token),
                Err(err) => {
                    warn!("Could not record focus before prompting: {}", err);
                    None
                }
            };

            result.prompted = true;
            match self.presenter.prompt(&fields) {
                Ok(PromptOutcome::Submitted(values)) => values,
                Ok(PromptOutcome::Cancelled) => {
                    info!("Prompt for '{}' cancelled", request.trigger);
                    self.state = ExpansionState::Cancelled;
                    result.outcome = ExpansionOutcome::Cancelled;
                    return result;
                }
                Err(err) => {
                    error!("Prompt for '{}' failed: {}", request.trigger, err);
                    self.state = ExpansionState::Failed;
                    result.outcome = ExpansionOutcome::Failed(err.to_string());
                    return result;
                }
            }
        };

        self.state = ExpansionState::Resolving;
        let now = (self.clock)();
        let mut plan = OutputPlan::new();
        for segment in &snippet.segments {
            self.resolve_segment(segment, &context, now, &mut plan, &mut result.warnings);
        }

        self.state = ExpansionState::Complete;
        result.outcome = ExpansionOutcome::Complete(plan.finish());
        result
    }

    fn resolve_segment(
        &self,
        segment: &Segment,
        context: &HashMap<String, String>,
        now: DateTime<Local>,
        plan: &mut OutputPlan,
        warnings: &mut Vec<String>,
    ) {
        match segment {
            Segment::PlainText(text) => plan.push_text(text.as_str()),
            Segment::FormattedText { text, html } => plan.push(Action::PasteRichText {
                text: text.clone(),
                html: html.clone(),
            }),
            Segment::InlineImage(path) => self.resolve_image(path, plan, warnings),
            Segment::CursorMarker => plan.push(Action::CursorMarker),
            Segment::Placeholder(placeholder) => match placeholder {
                Placeholder::Date => push_formatted(&now, &self.formats.date, plan, warnings),
                Placeholder::Time => push_formatted(&now, &self.formats.time, plan, warnings),
                Placeholder::DateTime => {
                    push_formatted(&now, &self.formats.datetime, plan, warnings)
                }
                Placeholder::Clipboard => self.resolve_clipboard(plan, warnings),
                Placeholder::Image(path) => self.resolve_image(path, plan, warnings),
                Placeholder::Calc(expression) => match calc::evaluate(expression, context) {
                    Ok(value) => plan.push_text(format_number(value)),
                    Err(err) => record(warnings, format!("calc '{}': {}", expression, err)),
                },
                Placeholder::Field(field) => match context.get(&field.name) {
                    Some(value) => plan.push_text(value.as_str()),
                    None => record(warnings, format!("no value for field '{}'", field.name)),
                },
            },
        }
    }

    fn resolve_clipboard(&self, plan: &mut OutputPlan, warnings: &mut Vec<String>) {
        match self.clipboard.read_clipboard() {
            Ok(ClipboardContent::Text(text)) if !text.is_empty() => plan.push_text(text),
            Ok(ClipboardContent::Image(image)) => plan.push(Action::PasteImage(image)),
            Ok(_) => record(warnings, "clipboard is empty".to_string()),
            Err(err) => record(warnings, format!("clipboard unreadable: {}", err)),
        }
    }

    fn resolve_image(&self, path: &Path, plan: &mut OutputPlan, warnings: &mut Vec<String>) {
        match load_image(path) {
            Ok(image) => plan.push(Action::PasteImage(image)),
            Err(err) => record(warnings, err.to_string()),
        }
    }
}

fn record(warnings: &mut Vec<String>, message: String) {
    warn!("Skipping segment: {}", message);
    warnings.push(message);
}

fn push_formatted(
    now: &DateTime<Local>,
    format: &str,
    plan: &mut OutputPlan,
    warnings: &mut Vec<String>,
) {
    let mut rendered = String::new();
    match write!(rendered, "{}", now.format(format)) {
        Ok(()) => plan.push_text(rendered),
        Err(_) => record(warnings, format!("invalid date format '{}'", format)),
    }
}

/// Distinct fields in first-occurrence order. `field:<name>` references in
/// calc expressions count as plain fields.
pub fn collect_fields(segments: &[Segment]) -> Vec<FieldSpec> {
    let mut fields: Vec<FieldSpec> = Vec::new();
    let mut add = |field: FieldSpec| {
        if !fields.iter().any(|known| known.name == field.name) {
            fields.push(field);
        }
    };

    for segment in segments {
        match segment {
            Segment::Placeholder(Placeholder::Field(field)) => add(field.clone()),
            Segment::Placeholder(Placeholder::Calc(expression)) => {
                for name in calc::referenced_fields(expression) {
                    add(FieldSpec::plain(name));
                }
            }
            _ => {}
        }
    }
    fields
}

/// Replace a leading `~/` with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Decode an image file into RGBA pixels.
pub fn load_image(path: &Path) -> Result<ImageData> {
    let resolved = expand_home(path);
    let decoded = image::open(&resolved).map_err(|err| {
        SnipForgeError::ResourceUnavailable(format!(
            "image {} could not be read: {}",
            resolved.display(),
            err
        ))
    })?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(ImageData {
        width: width as usize,
        height: height as usize,
        bytes: rgba.into_raw(),
    })
}
