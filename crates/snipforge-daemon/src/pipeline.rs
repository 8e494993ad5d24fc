//! Hands matches from the capture thread to the sequential expansion worker.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};
use snipforge_core::{
    ExpansionEngine, ExpansionResult, Injector, KeySink, Result, TriggerMatch, TriggerMatcher,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Time for the echo of our own keystrokes to reach the capture thread.
/// Capture drops every key event until then, real ones included, so a
/// trigger typed while output is being injected does not fire.
pub const SYNTHETIC_ECHO: Duration = Duration::from_millis(50);

/// Sending side of the one-deep match queue. A newer match replaces one that
/// is still waiting; submitting never blocks.
#[derive(Clone)]
pub struct MatchSender {
    sender: Sender<TriggerMatch>,
    drain: Receiver<TriggerMatch>,
}

pub fn match_queue() -> (MatchSender, Receiver<TriggerMatch>) {
    let (sender, receiver) = bounded(1);
    (
        MatchSender {
            sender,
            drain: receiver.clone(),
        },
        receiver,
    )
}

impl MatchSender {
    pub fn submit(&self, request: TriggerMatch) {
        let mut pending = request;
        loop {
            match self.sender.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(replaced) = self.drain.try_recv() {
                        debug!("Dropping queued match '{}'", replaced.trigger);
                    }
                    pending = rejected;
                }
                Err(TrySendError::Disconnected(rejected)) => {
                    warn!(
                        "Expansion worker is gone, dropping match '{}'",
                        rejected.trigger
                    );
                    return;
                }
            }
        }
    }
}

/// Runs one expansion at a time: resolve, then inject.
pub struct ExpansionWorker<K: KeySink> {
    engine: ExpansionEngine,
    injector: Injector<K>,
    injecting: Arc<AtomicBool>,
    matcher: Arc<Mutex<TriggerMatcher>>,
    echo_delay: Duration,
}

impl<K: KeySink> ExpansionWorker<K> {
    pub fn new(
        engine: ExpansionEngine,
        injector: Injector<K>,
        injecting: Arc<AtomicBool>,
        matcher: Arc<Mutex<TriggerMatcher>>,
    ) -> Self {
        Self {
            engine,
            injector,
            injecting,
            matcher,
            echo_delay: SYNTHETIC_ECHO,
        }
    }

    pub fn with_echo_delay(mut self, delay: Duration) -> Self {
        self.echo_delay = delay;
        self
    }

    pub fn injector(&self) -> &Injector<K> {
        &self.injector
    }

    /// Expand and inject one match. Capture ignores keystrokes while the
    /// injector is typing, and the trigger buffer starts fresh afterwards.
    pub fn handle(&mut self, request: &TriggerMatch) -> Result<ExpansionResult> {
        let result = self.engine.expand(request);
        for warning in &result.warnings {
            info!("'{}': {}", request.trigger, warning);
        }

        self.injecting.store(true, Ordering::SeqCst);
        let injected = self.injector.inject(&result);
        if !self.echo_delay.is_zero() {
            thread::sleep(self.echo_delay);
        }
        self.injecting.store(false, Ordering::SeqCst);

        match self.matcher.lock() {
            Ok(mut matcher) => matcher.cancel(),
            Err(poisoned) => poisoned.into_inner().cancel(),
        }

        injected?;
        Ok(result)
    }

    /// Process matches until every sender is dropped.
    pub fn run(mut self, receiver: Receiver<TriggerMatch>) {
        for request in receiver.iter() {
            debug!("Expanding '{}'", request.trigger);
            let stale = match self.handle(&request) {
                Ok(result) => result.prompted,
                // The document no longer matches what a queued match expects.
                Err(e) => {
                    error!("Expansion of '{}' failed: {}", request.trigger, e);
                    true
                }
            };
            if stale {
                discard_pending(&receiver);
            }
        }
        info!("Match queue closed, expansion worker exiting");
    }
}

/// Capture sees keys typed into a prompt dialog too. Matches they produced
/// belong to the dialog, not to the window the output went to.
fn discard_pending(receiver: &Receiver<TriggerMatch>) {
    for request in receiver.try_iter() {
        debug!("Discarding '{}' matched during the prompt", request.trigger);
    }
}

/// Start the worker on its own thread. The injector is built on that thread
/// because synthetic input handles are not always `Send`.
pub fn spawn_expansion_worker<K, F>(
    engine: ExpansionEngine,
    make_injector: F,
    injecting: Arc<AtomicBool>,
    matcher: Arc<Mutex<TriggerMatcher>>,
    receiver: Receiver<TriggerMatch>,
) -> JoinHandle<()>
where
    K: KeySink,
    F: FnOnce() -> Result<Injector<K>> + Send + 'static,
{
    thread::spawn(move || match make_injector() {
        Ok(injector) => ExpansionWorker::new(engine, injector, injecting, matcher).run(receiver),
        Err(e) => error!("Could not create the output injector: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use snipforge_core::keyboard::SyntheticKey;
    use snipforge_core::{
        ClipboardContent, ClipboardService, FieldSpec, FocusToken, ImageData, InjectorTiming,
        KeyEvent, PromptOutcome, PromptPresenter, Settings, SnipForgeError, SnippetEntry,
        SnippetLibrary,
    };
    use std::collections::HashMap;

    fn request(trigger: &str) -> TriggerMatch {
        TriggerMatch::new(trigger, String::new())
    }

    fn immediate() -> InjectorTiming {
        InjectorTiming {
            backspace_delay: Duration::ZERO,
            line_delay: Duration::ZERO,
            clipboard_settle: Duration::ZERO,
            deselect_after_image: false,
        }
    }

    #[test]
    fn newer_match_replaces_a_queued_one() {
        let (sender, receiver) = match_queue();
        sender.submit(request(":a"));
        sender.submit(request(":b"));
        sender.submit(request(":c"));

        assert_eq!(receiver.try_recv().unwrap().trigger, ":c");
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn submit_after_worker_exit_does_not_block() {
        let (sender, receiver) = match_queue();
        drop(receiver);
        sender.submit(request(":a"));
        sender.submit(request(":b"));
    }

    struct NoPrompt;

    impl PromptPresenter for NoPrompt {
        fn prompt(&self, _fields: &[FieldSpec]) -> Result<PromptOutcome> {
            Ok(PromptOutcome::Submitted(HashMap::new()))
        }
    }

    struct EmptyClipboard;

    impl ClipboardService for EmptyClipboard {
        fn read_clipboard(&self) -> Result<ClipboardContent> {
            Ok(ClipboardContent::Empty)
        }
        fn write_text(&self, _text: &str) -> Result<()> {
            Ok(())
        }
        fn write_html(&self, _html: &str, _alt_text: &str) -> Result<()> {
            Ok(())
        }
        fn write_image(&self, _image: &ImageData) -> Result<()> {
            Ok(())
        }
        fn capture_focus(&self) -> Result<FocusToken> {
            Err(SnipForgeError::ResourceUnavailable("headless".to_string()))
        }
        fn restore_focus(&self, _token: &FocusToken) -> Result<()> {
            Ok(())
        }
    }

    /// Key sink that reports whether capture was suppressed for each key.
    struct FlagCheckingKeys {
        injecting: Arc<AtomicBool>,
        typed: String,
        backspaces: usize,
        suppressed: bool,
    }

    impl KeySink for FlagCheckingKeys {
        fn tap(&mut self, key: SyntheticKey) -> Result<()> {
            self.suppressed &= self.injecting.load(Ordering::SeqCst);
            if key == SyntheticKey::Backspace {
                self.backspaces += 1;
            }
            Ok(())
        }
        fn text(&mut self, text: &str) -> Result<()> {
            self.suppressed &= self.injecting.load(Ordering::SeqCst);
            self.typed.push_str(text);
            Ok(())
        }
        fn paste_chord(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn worker_injects_with_capture_suppressed_and_resets_the_buffer() {
        let library = Arc::new(SnippetLibrary::new(&[SnippetEntry::new(
            ":hi".to_string(),
            "Hello {{calc:2+2*3}}".to_string(),
        )]));
        let settings = Settings::default();
        let clipboard: Arc<dyn ClipboardService> = Arc::new(EmptyClipboard);
        let engine = ExpansionEngine::new(
            library.clone(),
            Arc::new(NoPrompt),
            clipboard.clone(),
            &settings,
        );
        let injecting = Arc::new(AtomicBool::new(false));
        let keys = FlagCheckingKeys {
            injecting: injecting.clone(),
            typed: String::new(),
            backspaces: 0,
            suppressed: true,
        };
        let matcher = Arc::new(Mutex::new(TriggerMatcher::new(
            [":hi"],
            settings.buffer_capacity,
        )));
        matcher.lock().unwrap().feed(&KeyEvent::typed(':'));

        let mut worker = ExpansionWorker::new(
            engine,
            Injector::new(keys, clipboard, immediate()),
            injecting.clone(),
            matcher.clone(),
        )
        .with_echo_delay(Duration::ZERO);

        let result = worker.handle(&request(":hi")).unwrap();

        assert!(result.plan().is_some());
        let keys = worker.injector().keys();
        assert_eq!(keys.backspaces, 3);
        assert_eq!(keys.typed, "Hello 8");
        assert!(keys.suppressed);
        assert!(!injecting.load(Ordering::SeqCst));
        assert!(matcher.lock().unwrap().buffer().is_empty());
    }

    /// Answers every field with the same text. Typing it also reaches
    /// capture, which matches `brb` inside the answer.
    struct TypingPresenter {
        capture: Mutex<Option<MatchSender>>,
        answer: String,
    }

    impl PromptPresenter for TypingPresenter {
        fn prompt(&self, fields: &[FieldSpec]) -> Result<PromptOutcome> {
            if let Some(queue) = self.capture.lock().unwrap().take() {
                queue.submit(request("brb"));
            }
            Ok(PromptOutcome::Submitted(
                fields
                    .iter()
                    .map(|field| (field.name.clone(), self.answer.clone()))
                    .collect(),
            ))
        }
    }

    #[derive(Clone, Default)]
    struct SharedKeys {
        backspaces: Arc<Mutex<usize>>,
        typed: Arc<Mutex<String>>,
    }

    impl KeySink for SharedKeys {
        fn tap(&mut self, key: SyntheticKey) -> Result<()> {
            if key == SyntheticKey::Backspace {
                *self.backspaces.lock().unwrap() += 1;
            }
            Ok(())
        }
        fn text(&mut self, text: &str) -> Result<()> {
            self.typed.lock().unwrap().push_str(text);
            Ok(())
        }
        fn paste_chord(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn matches_typed_into_the_prompt_are_discarded() {
        let library = Arc::new(SnippetLibrary::new(&[
            SnippetEntry::new(":hi".to_string(), "Hi {{name}}".to_string()),
            SnippetEntry::new("brb".to_string(), "be right back".to_string()),
        ]));
        let settings = Settings::default();
        let clipboard: Arc<dyn ClipboardService> = Arc::new(EmptyClipboard);
        let (queue, receiver) = match_queue();
        let presenter = TypingPresenter {
            capture: Mutex::new(Some(queue.clone())),
            answer: "brb later".to_string(),
        };
        let engine =
            ExpansionEngine::new(library, Arc::new(presenter), clipboard.clone(), &settings);
        let keys = SharedKeys::default();
        let matcher = Arc::new(Mutex::new(TriggerMatcher::new(
            [":hi", "brb"],
            settings.buffer_capacity,
        )));
        let worker = ExpansionWorker::new(
            engine,
            Injector::new(keys.clone(), clipboard, immediate()),
            Arc::new(AtomicBool::new(false)),
            matcher,
        )
        .with_echo_delay(Duration::ZERO);

        queue.submit(request(":hi"));
        drop(queue);
        worker.run(receiver);

        assert_eq!(*keys.backspaces.lock().unwrap(), 3);
        assert_eq!(*keys.typed.lock().unwrap(), "Hi brb later");
    }
}
