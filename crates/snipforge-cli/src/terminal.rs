use snipforge_core::{
    FieldKind, FieldSpec, PromptOutcome, PromptPresenter, Result, SnipForgeError,
};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

/// Asks for snippet fields on the terminal. End of input cancels.
pub struct TerminalPresenter {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl TerminalPresenter {
    pub fn stdio() -> Self {
        Self::new(Box::new(io::BufReader::new(io::stdin())), Box::new(io::stdout()))
    }

    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }
}

fn lock_error<T>(_: T) -> SnipForgeError {
    SnipForgeError::Prompt("terminal is already in use".to_string())
}

/// Accept either an option's number or its text; blank picks the first.
fn pick_option(options: &[String], answer: &str) -> Option<String> {
    if answer.is_empty() {
        return options.first().cloned();
    }
    if let Ok(index) = answer.parse::<usize>() {
        return options.get(index.checked_sub(1)?).cloned();
    }
    options.iter().find(|option| option.as_str() == answer).cloned()
}

impl PromptPresenter for TerminalPresenter {
    fn prompt(&self, fields: &[FieldSpec]) -> Result<PromptOutcome> {
        let mut input = self.input.lock().map_err(lock_error)?;
        let mut output = self.output.lock().map_err(lock_error)?;
        let mut values = HashMap::new();

        for field in fields {
            loop {
                match &field.kind {
                    FieldKind::Plain => write!(output, "{}: ", field.name)?,
                    FieldKind::Choice(options) => {
                        writeln!(output, "{}:", field.name)?;
                        for (i, option) in options.iter().enumerate() {
                            writeln!(output, "  {}) {}", i + 1, option)?;
                        }
                        write!(output, "choice [1]: ")?;
                    }
                }
                output.flush()?;

                let mut line = String::new();
                if input.read_line(&mut line)? == 0 {
                    return Ok(PromptOutcome::Cancelled);
                }
                let answer = line.trim_end_matches(['\r', '\n']);

                let value = match &field.kind {
                    FieldKind::Plain => Some(answer.to_string()),
                    FieldKind::Choice(options) => pick_option(options, answer.trim()),
                };
                match value {
                    Some(value) => {
                        values.insert(field.name.clone(), value);
                        break;
                    }
                    None => writeln!(output, "Not one of the options, try again.")?,
                }
            }
        }

        Ok(PromptOutcome::Submitted(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn presenter(input: &str) -> TerminalPresenter {
        TerminalPresenter::new(Box::new(Cursor::new(input.to_string())), Box::new(io::sink()))
    }

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::plain("name"),
            FieldSpec::choice("size", vec!["S".to_string(), "M".to_string()]),
        ]
    }

    #[test]
    fn answers_are_collected_in_order() {
        let outcome = presenter("Sam Doe\n2\n").prompt(&fields()).unwrap();
        let PromptOutcome::Submitted(values) = outcome else {
            panic!("expected submission");
        };
        assert_eq!(values["name"], "Sam Doe");
        assert_eq!(values["size"], "M");
    }

    #[test]
    fn invalid_choice_is_asked_again() {
        let outcome = presenter("Sam\nXL\nS\n").prompt(&fields()).unwrap();
        let PromptOutcome::Submitted(values) = outcome else {
            panic!("expected submission");
        };
        assert_eq!(values["size"], "S");
    }

    #[test]
    fn end_of_input_cancels() {
        assert_eq!(
            presenter("Sam\n").prompt(&fields()).unwrap(),
            PromptOutcome::Cancelled
        );
    }
}
