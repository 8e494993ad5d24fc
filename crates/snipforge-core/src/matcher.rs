//! Rolling trigger buffer and the matcher that drives it.
//!
//! The matcher is fed every captured [`KeyEvent`]. A trigger matches when the
//! buffer ends with it and the character before its first character is a word
//! boundary. When a matched trigger is also the start of a longer trigger the
//! match is held back until the next keystroke shows whether the longer one is
//! being typed; a held match that fires late reports the extra characters as
//! `trailing` so they can be removed and typed again after the expansion.

use crate::keyboard::{Key, KeyEvent};
use log::{debug, warn};
use std::collections::VecDeque;

/// Start-of-input, whitespace and punctuation precede an eligible trigger.
pub fn is_boundary(c: char) -> bool {
    c.is_whitespace() || !c.is_alphanumeric()
}

/// Bounded record of recently typed characters.
///
/// Characters before `live_start` were typed but can no longer begin a
/// trigger; they are kept only so a backspace can bring them back.
#[derive(Debug, Clone)]
pub struct TriggerBuffer {
    chars: VecDeque<char>,
    capacity: usize,
    boundary_before: bool,
    live_start: usize,
}

impl TriggerBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            chars: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            boundary_before: true,
            live_start: 0,
        }
    }

    /// Number of live characters.
    pub fn len(&self) -> usize {
        self.chars.len() - self.live_start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The live characters, oldest first.
    pub fn contents(&self) -> String {
        self.chars.iter().skip(self.live_start).collect()
    }

    fn total_len(&self) -> usize {
        self.chars.len()
    }

    /// Append a character, dropping the oldest on overflow. Returns the
    /// number of characters dropped from the front.
    pub fn push(&mut self, c: char) -> usize {
        self.chars.push_back(c);
        let mut dropped = 0;
        while self.chars.len() > self.capacity {
            if let Some(oldest) = self.chars.pop_front() {
                self.boundary_before = is_boundary(oldest);
                self.live_start = self.live_start.saturating_sub(1);
                dropped += 1;
            }
        }
        dropped
    }

    /// Remove the most recent character. Everything still held becomes live
    /// again, since the typo that made it dead may be the one just erased.
    pub fn pop(&mut self) -> Option<char> {
        let popped = self.chars.pop_back();
        self.live_start = 0;
        popped
    }

    /// Empty the buffer; whatever is typed next starts fresh.
    pub fn clear(&mut self) {
        self.chars.clear();
        self.boundary_before = true;
        self.live_start = 0;
    }

    /// Drop every live character but remember them for backspace.
    pub fn discard(&mut self) {
        self.live_start = self.chars.len();
    }

    /// Keep only the newest character live.
    pub fn restart_at_last(&mut self) {
        self.live_start = self.chars.len().saturating_sub(1);
    }

    /// Whether the character before absolute index `start` is a word boundary.
    pub fn boundary_at(&self, start: usize) -> bool {
        if start == 0 {
            self.boundary_before
        } else {
            self.chars
                .get(start - 1)
                .map(|c| is_boundary(*c))
                .unwrap_or(false)
        }
    }

    /// Whether the live characters end with `needle`, starting on a word
    /// boundary.
    pub fn ends_with_at_boundary(&self, needle: &[char]) -> bool {
        if needle.is_empty() || needle.len() > self.len() {
            return false;
        }
        let start = self.chars.len() - needle.len();
        self.chars.iter().skip(start).eq(needle.iter()) && self.boundary_at(start)
    }

    fn suffix_from(&self, start: usize) -> impl Iterator<Item = &char> {
        self.chars.iter().skip(start)
    }
}

/// A trigger recognised in the typed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    pub trigger: String,
    /// Characters to erase from the focused application: the trigger plus
    /// `trailing`.
    pub delete_count: usize,
    /// Characters typed after a held-back match, to be typed again.
    pub trailing: String,
}

impl TriggerMatch {
    pub fn new(trigger: &str, trailing: String) -> Self {
        Self {
            trigger: trigger.to_string(),
            delete_count: trigger.chars().count() + trailing.chars().count(),
            trailing,
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    trigger: String,
    chars: Vec<char>,
}

#[derive(Debug, Clone)]
struct Held {
    index: usize,
    /// Absolute buffer length right after the trigger's last character.
    end: usize,
}

/// Matches the typed stream against the configured triggers.
#[derive(Debug, Clone)]
pub struct TriggerMatcher {
    buffer: TriggerBuffer,
    /// Sorted longest first.
    triggers: Vec<Candidate>,
    configured_capacity: usize,
    held: Option<Held>,
}

impl TriggerMatcher {
    pub fn new<I, S>(triggers: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self {
            buffer: TriggerBuffer::new(capacity),
            triggers: Vec::new(),
            configured_capacity: capacity,
            held: None,
        };
        matcher.set_triggers(triggers);
        matcher
    }

    /// Replace the trigger table. Invalid triggers are skipped.
    pub fn set_triggers<I, S>(&mut self, triggers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut candidates: Vec<Candidate> = Vec::new();
        for trigger in triggers {
            let trigger = trigger.as_ref();
            if trigger.is_empty() || trigger.chars().any(char::is_whitespace) {
                warn!("Ignoring invalid trigger {:?}", trigger);
                continue;
            }
            if candidates.iter().any(|c| c.trigger == trigger) {
                continue;
            }
            candidates.push(Candidate {
                trigger: trigger.to_string(),
                chars: trigger.chars().collect(),
            });
        }
        candidates.sort_by(|a, b| {
            b.chars
                .len()
                .cmp(&a.chars.len())
                .then_with(|| a.trigger.cmp(&b.trigger))
        });

        let longest = candidates.first().map(|c| c.chars.len()).unwrap_or(0);
        // Room for a held match plus the longest trigger it could grow into.
        let capacity = self.configured_capacity.max(longest * 2).max(1);

        self.triggers = candidates;
        self.buffer = TriggerBuffer::new(capacity);
        self.held = None;
    }

    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.triggers.iter().map(|c| c.trigger.as_str())
    }

    pub fn buffer(&self) -> &TriggerBuffer {
        &self.buffer
    }

    /// Forget everything typed so far.
    pub fn cancel(&mut self) {
        self.buffer.clear();
        self.held = None;
    }

    /// Process one key event; returns a match when a trigger completes.
    pub fn feed(&mut self, event: &KeyEvent) -> Option<TriggerMatch> {
        if !event.pressed {
            return None;
        }

        match event.key {
            Key::Shift | Key::CapsLock | Key::AltGraph => None,
            Key::Control | Key::Alt | Key::Meta => {
                self.cancel();
                None
            }
            _ if event.modifiers.has_command() => {
                self.cancel();
                None
            }
            Key::Backspace => self.backspace(),
            Key::Enter => self.boundary_key('\n'),
            Key::Tab => self.boundary_key('\t'),
            Key::Character => match event.character {
                Some(c) if !c.is_control() => self.push_char(c),
                _ => {
                    self.cancel();
                    None
                }
            },
            Key::Escape | Key::Delete | Key::Navigation | Key::Function | Key::Other => {
                self.cancel();
                None
            }
        }
    }

    fn push_char(&mut self, c: char) -> Option<TriggerMatch> {
        let dropped = self.buffer.push(c);
        if let Some(held) = self.held.as_mut() {
            if dropped > held.end {
                self.held = None;
            } else {
                held.end -= dropped;
            }
        }

        if let Some(found) = self.evaluate() {
            return Some(found);
        }

        if self.held.is_none() && !self.can_extend() {
            if c.is_whitespace() {
                self.buffer.discard();
            } else {
                self.buffer.restart_at_last();
            }
        }
        None
    }

    fn backspace(&mut self) -> Option<TriggerMatch> {
        if self.buffer.pop().is_none() {
            return None;
        }
        if let Some(held) = &self.held {
            if self.buffer.total_len() < held.end {
                self.held = None;
            }
        }
        self.evaluate()
    }

    fn boundary_key(&mut self, c: char) -> Option<TriggerMatch> {
        if let Some(held) = self.held.take() {
            let mut trailing = self.trailing_after(held.end);
            trailing.push(c);
            let found = TriggerMatch::new(&self.triggers[held.index].trigger, trailing);
            self.buffer.clear();
            return Some(found);
        }
        self.buffer.clear();
        None
    }

    /// Test the buffer after a mutation: fire, hold, or release a held match.
    fn evaluate(&mut self) -> Option<TriggerMatch> {
        let complete = self
            .triggers
            .iter()
            .position(|candidate| self.buffer.ends_with_at_boundary(&candidate.chars));
        let extendable = self.can_extend();

        if let Some(index) = complete {
            if extendable {
                debug!(
                    "Holding match for {:?} while a longer trigger is possible",
                    self.triggers[index].trigger
                );
                self.held = Some(Held {
                    index,
                    end: self.buffer.total_len(),
                });
                return None;
            }
            let found = TriggerMatch::new(&self.triggers[index].trigger, String::new());
            self.buffer.clear();
            self.held = None;
            return Some(found);
        }

        if extendable {
            return None;
        }

        let held = self.held.take()?;
        let trailing = self.trailing_after(held.end);
        let found = TriggerMatch::new(&self.triggers[held.index].trigger, trailing);
        self.buffer.clear();
        Some(found)
    }

    /// Whether some boundary-aligned suffix of the buffer is a proper prefix
    /// of a trigger.
    fn can_extend(&self) -> bool {
        let len = self.buffer.total_len();
        let longest = self.triggers.first().map(|c| c.chars.len()).unwrap_or(0);
        let first_start = len.saturating_sub(longest).max(self.buffer.live_start);

        (first_start..len).any(|start| {
            if !self.buffer.boundary_at(start) {
                return false;
            }
            let suffix_len = len - start;
            self.triggers.iter().any(|candidate| {
                candidate.chars.len() > suffix_len
                    && self
                        .buffer
                        .suffix_from(start)
                        .eq(candidate.chars[..suffix_len].iter())
            })
        })
    }

    fn trailing_after(&self, end: usize) -> String {
        self.buffer.suffix_from(end).collect()
    }
}
