use crate::services::ImageData;

/// A primitive output step for the injector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    TypeText(String),
    PasteRichText { text: String, html: String },
    PasteImage(ImageData),
    CursorMarker,
    MoveCursorBy(isize),
}

/// Characters `text` leaves in the document when typed. The injector drops a
/// `\r` at the end of each line, so CRLF counts as one line break.
pub fn typed_len(text: &str) -> usize {
    let lines = text.split('\n');
    let breaks = text.matches('\n').count();
    lines
        .map(|line| line.strip_suffix('\r').unwrap_or(line).chars().count())
        .sum::<usize>()
        + breaks
}

impl Action {
    /// Characters this action leaves in the target document. Images count as one.
    pub fn visible_len(&self) -> usize {
        match self {
            Action::TypeText(text) => typed_len(text),
            Action::PasteRichText { text, .. } => text.chars().count(),
            Action::PasteImage(_) => 1,
            Action::CursorMarker | Action::MoveCursorBy(_) => 0,
        }
    }
}

/// Ordered actions produced by resolving a snippet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputPlan {
    actions: Vec<Action>,
}

impl OutputPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Append typed text, merging with a preceding TypeText. Empty text is dropped.
    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        if let Some(Action::TypeText(previous)) = self.actions.last_mut() {
            previous.push_str(&text);
            return;
        }
        self.actions.push(Action::TypeText(text));
    }

    /// Append any action. Only the first cursor marker is kept.
    pub fn push(&mut self, action: Action) {
        match action {
            Action::TypeText(text) => self.push_text(text),
            Action::CursorMarker if self.has_cursor_marker() => {}
            other => self.actions.push(other),
        }
    }

    pub fn has_cursor_marker(&self) -> bool {
        self.actions
            .iter()
            .any(|action| matches!(action, Action::CursorMarker))
    }

    /// Characters emitted after the cursor marker, or zero without one.
    pub fn cursor_offset(&self) -> usize {
        match self
            .actions
            .iter()
            .position(|action| matches!(action, Action::CursorMarker))
        {
            Some(index) => self.actions[index + 1..]
                .iter()
                .map(Action::visible_len)
                .sum(),
            None => 0,
        }
    }

    /// Close the plan: a cursor marker followed by content becomes a final
    /// leftward move over that content.
    pub fn finish(mut self) -> Self {
        let offset = self.cursor_offset();
        if offset > 0 {
            self.actions.push(Action::MoveCursorBy(-(offset as isize)));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn adjacent_text_is_merged() {
        let mut plan = OutputPlan::new();
        plan.push_text("Hello");
        plan.push_text("");
        plan.push(Action::TypeText(", world".to_string()));
        assert_eq!(
            plan.actions(),
            &[Action::TypeText("Hello, world".to_string())]
        );
    }

    #[test]
    fn only_the_first_cursor_marker_counts() {
        let mut plan = OutputPlan::new();
        plan.push_text("a");
        plan.push(Action::CursorMarker);
        plan.push_text("bc");
        plan.push(Action::CursorMarker);
        plan.push_text("d");

        assert_eq!(plan.cursor_offset(), 3);
        let plan = plan.finish();
        assert_eq!(plan.actions().last(), Some(&Action::MoveCursorBy(-3)));
        assert_eq!(
            plan.actions()
                .iter()
                .filter(|action| matches!(action, Action::CursorMarker))
                .count(),
            1
        );
    }

    #[test]
    fn images_count_as_one_character() {
        let mut plan = OutputPlan::new();
        plan.push(Action::CursorMarker);
        plan.push(Action::PasteImage(ImageData {
            width: 1,
            height: 1,
            bytes: vec![0, 0, 0, 255],
        }));
        plan.push(Action::PasteRichText {
            text: "ab".to_string(),
            html: "<b>ab</b>".to_string(),
        });
        assert_eq!(plan.cursor_offset(), 3);
    }

    #[test]
    fn crlf_after_the_marker_is_one_step() {
        let mut plan = OutputPlan::new();
        plan.push_text("a");
        plan.push(Action::CursorMarker);
        plan.push_text("b\r\nc");

        assert_eq!(plan.cursor_offset(), 3);
        assert_eq!(typed_len("x\r\ny\nz\r"), 5);
    }
}
