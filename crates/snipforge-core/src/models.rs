use crate::error::{Result, SnipForgeError};
use crate::placeholder::parse_template;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a field prompt is presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Plain,
    Choice(Vec<String>),
}

/// A named user input requested by a `{{name}}` or `{{name=a|b}}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Plain,
        }
    }

    pub fn choice(name: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Choice(options),
        }
    }
}

/// Dynamic content resolved at expansion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    Date,
    Time,
    DateTime,
    Clipboard,
    Image(PathBuf),
    Calc(String),
    Field(FieldSpec),
}

/// One unit of snippet content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    PlainText(String),
    /// Text with a rich (HTML) rendition; the engine never looks inside `html`.
    FormattedText {
        text: String,
        html: String,
    },
    InlineImage(PathBuf),
    CursorMarker,
    Placeholder(Placeholder),
}

/// A parsed snippet, ready for expansion. Shared as an immutable snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub trigger: String,
    pub segments: Vec<Segment>,
}

impl Snippet {
    pub fn new(trigger: impl Into<String>, segments: Vec<Segment>) -> Self {
        Self {
            trigger: trigger.into(),
            segments,
        }
    }

    /// Build a snippet from a template string such as `Hi {{name}}`.
    pub fn from_template(trigger: impl Into<String>, template: &str) -> Self {
        Self::new(trigger, parse_template(template))
    }
}

/// A content segment as written in `snippets.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoredSegment {
    Text { text: String },
    Formatted { text: String, html: String },
    Image { path: PathBuf },
    Cursor,
}

/// Snippet content is either a template string or a list of typed segments.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum SnippetContent {
    Template(String),
    Segments(Vec<StoredSegment>),
}

impl From<String> for SnippetContent {
    fn from(template: String) -> Self {
        SnippetContent::Template(template)
    }
}

impl SnippetContent {
    /// Parse a JSON list of typed segments, as accepted by `add --segments`.
    pub fn parse_segments(json: &str) -> Result<Self> {
        let segments: Vec<StoredSegment> = serde_json::from_str(json)?;
        if segments.is_empty() {
            return Err(SnipForgeError::InvalidSnippet(
                "segment list is empty".to_string(),
            ));
        }
        Ok(SnippetContent::Segments(segments))
    }

    pub fn to_segments(&self) -> Vec<Segment> {
        match self {
            SnippetContent::Template(template) => parse_template(template),
            SnippetContent::Segments(stored) => {
                let mut segments = Vec::new();
                for segment in stored {
                    match segment {
                        StoredSegment::Text { text } => segments.extend(parse_template(text)),
                        StoredSegment::Formatted { text, html } => {
                            segments.push(Segment::FormattedText {
                                text: text.clone(),
                                html: html.clone(),
                            })
                        }
                        StoredSegment::Image { path } => {
                            segments.push(Segment::InlineImage(path.clone()))
                        }
                        StoredSegment::Cursor => segments.push(Segment::CursorMarker),
                    }
                }
                segments
            }
        }
    }

    /// Single-line summary for listings.
    pub fn preview(&self) -> String {
        let text = match self {
            SnippetContent::Template(template) => template.clone(),
            SnippetContent::Segments(stored) => stored
                .iter()
                .map(|segment| match segment {
                    StoredSegment::Text { text } => text.clone(),
                    StoredSegment::Formatted { text, .. } => text.clone(),
                    StoredSegment::Image { path } => format!("[image {}]", path.display()),
                    StoredSegment::Cursor => "|".to_string(),
                })
                .collect(),
        };
        text.replace('\n', "\\n")
    }
}

fn now_rfc3339() -> String {
    Local::now().to_rfc3339()
}

/// A snippet record as persisted in `snippets.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SnippetEntry {
    pub trigger: String,
    pub content: SnippetContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "now_rfc3339")]
    pub timestamp: String,
}

impl SnippetEntry {
    pub fn new(trigger: String, content: impl Into<SnippetContent>) -> Self {
        Self {
            trigger,
            content: content.into(),
            description: None,
            timestamp: now_rfc3339(),
        }
    }

    pub fn update_content(&mut self, content: impl Into<SnippetContent>) {
        self.content = content.into();
        self.timestamp = now_rfc3339();
    }

    pub fn to_snippet(&self) -> Snippet {
        Snippet::new(self.trigger.clone(), self.content.to_segments())
    }

    pub fn formatted_time(&self) -> String {
        let entry_time = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|dt| dt.with_timezone(&Local))
            .unwrap_or_else(|_| Local::now());

        let duration = Local::now().signed_duration_since(entry_time);

        if duration.num_seconds() < 60 {
            format!("{}s ago", duration.num_seconds())
        } else if duration.num_minutes() < 60 {
            format!("{}m ago", duration.num_minutes())
        } else if duration.num_hours() < 24 {
            format!("{}h ago", duration.num_hours())
        } else {
            format!("{}d ago", duration.num_days())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_records_with_template_content() {
        let entry: SnippetEntry =
            serde_json::from_str(r#"{"trigger": ":hi", "content": "Hello {{name}}"}"#).unwrap();

        assert_eq!(
            entry.to_snippet().segments,
            vec![
                Segment::PlainText("Hello ".to_string()),
                Segment::Placeholder(Placeholder::Field(FieldSpec::plain("name"))),
            ]
        );
    }

    #[test]
    fn reads_records_with_segment_content() {
        let json = r#"{
            "trigger": ":logo",
            "content": [
                {"type": "text", "text": "Today {{date}} "},
                {"type": "formatted", "text": "bold", "html": "<b>bold</b>"},
                {"type": "image", "path": "/tmp/logo.png"},
                {"type": "cursor"}
            ]
        }"#;
        let entry: SnippetEntry = serde_json::from_str(json).unwrap();

        assert_eq!(
            entry.to_snippet().segments,
            vec![
                Segment::PlainText("Today ".to_string()),
                Segment::Placeholder(Placeholder::Date),
                Segment::PlainText(" ".to_string()),
                Segment::FormattedText {
                    text: "bold".to_string(),
                    html: "<b>bold</b>".to_string(),
                },
                Segment::InlineImage(PathBuf::from("/tmp/logo.png")),
                Segment::CursorMarker,
            ]
        );
    }

    #[test]
    fn segment_lists_parse_from_json() {
        let content =
            SnippetContent::parse_segments(r#"[{"type": "text", "text": "a"}, {"type": "cursor"}]"#)
                .unwrap();
        assert_eq!(
            content.to_segments(),
            vec![Segment::PlainText("a".to_string()), Segment::CursorMarker]
        );
        assert!(SnippetContent::parse_segments("[]").is_err());
        assert!(SnippetContent::parse_segments(r#"[{"type": "video"}]"#).is_err());
    }

    #[test]
    fn preview_flattens_newlines() {
        let content = SnippetContent::Template("Best,\nSam".to_string());
        assert_eq!(content.preview(), "Best,\\nSam");
    }
}
