//! Parser for the `{{...}}` placeholder syntax embedded in snippet text.
//!
//! Recognised forms: `{{date}}`, `{{time}}`, `{{datetime}}`, `{{clipboard}}`,
//! `{{cursor}}`, `{{image:<path>}}`, `{{calc:<expression>}}`, `{{<name>}}`,
//! `{{field:<name>}}` and `{{<name>=opt1|opt2}}`. Anything else between the
//! braces is kept as literal text.

use crate::models::{FieldSpec, Placeholder, Segment};
use std::path::PathBuf;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Split a template into literal and placeholder segments.
pub fn parse_template(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        let Some(segment) = parse_body(&after_open[..end]) else {
            // Keep one brace and look again, so `{{{name}}}` finds `{{name}}`.
            literal.push_str(&rest[..start + 1]);
            rest = &rest[start + 1..];
            continue;
        };

        literal.push_str(&rest[..start]);
        if !literal.is_empty() {
            segments.push(Segment::PlainText(std::mem::take(&mut literal)));
        }
        segments.push(segment);
        rest = &after_open[end + CLOSE.len()..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::PlainText(literal));
    }

    segments
}

/// Interpret the text between a pair of braces.
fn parse_body(body: &str) -> Option<Segment> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed {
        "date" => return Some(Segment::Placeholder(Placeholder::Date)),
        "time" => return Some(Segment::Placeholder(Placeholder::Time)),
        "datetime" => return Some(Segment::Placeholder(Placeholder::DateTime)),
        "clipboard" => return Some(Segment::Placeholder(Placeholder::Clipboard)),
        "cursor" => return Some(Segment::CursorMarker),
        _ => {}
    }

    let colon = trimmed.find(':');
    let equals = trimmed.find('=');
    let kind_split = match (colon, equals) {
        (Some(c), Some(e)) if c < e => Some(c),
        (Some(c), None) => Some(c),
        _ => None,
    };

    if let Some(index) = kind_split {
        let kind = trimmed[..index].trim();
        let argument = trimmed[index + 1..].trim();
        return match kind {
            "image" if !argument.is_empty() => Some(Segment::Placeholder(Placeholder::Image(
                PathBuf::from(argument),
            ))),
            "calc" if !argument.is_empty() => Some(Segment::Placeholder(Placeholder::Calc(
                argument.to_string(),
            ))),
            "field" => parse_field(argument)
                .map(|field| Segment::Placeholder(Placeholder::Field(field))),
            _ => None,
        };
    }

    parse_field(trimmed).map(|field| Segment::Placeholder(Placeholder::Field(field)))
}

fn parse_field(spec: &str) -> Option<FieldSpec> {
    let (name, options) = match spec.split_once('=') {
        Some((name, options)) => (name.trim(), Some(options)),
        None => (spec.trim(), None),
    };

    if name.is_empty() || name.contains(['{', '}']) {
        return None;
    }

    let options: Vec<String> = options
        .map(|options| {
            options
                .split('|')
                .map(str::trim)
                .filter(|option| !option.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if options.is_empty() {
        Some(FieldSpec::plain(name))
    } else {
        Some(FieldSpec::choice(name, options))
    }
}
