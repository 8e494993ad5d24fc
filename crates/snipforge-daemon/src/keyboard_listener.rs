use crate::pipeline::MatchSender;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use snipforge_core::keyboard::key_event_from_rdev;
use snipforge_core::{Modifiers, Result, SnipForgeError, TriggerMatcher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A listener that fails this soon after starting never worked at all.
const STARTUP_GRACE: Duration = Duration::from_millis(500);
/// Pause before listening again after the input device went away.
const RESUME_DELAY: Duration = Duration::from_secs(1);

/// Build the per-event callback. Every key event goes through the matcher in
/// a single lock scope; matches are handed to the worker without waiting.
fn capture_callback(
    matcher: Arc<Mutex<TriggerMatcher>>,
    queue: MatchSender,
    injecting: Arc<AtomicBool>,
) -> impl FnMut(rdev::Event) + 'static {
    let mut modifiers = Modifiers::default();
    move |event: rdev::Event| {
        let Some(key_event) = key_event_from_rdev(&event, &mut modifiers) else {
            return;
        };
        if injecting.load(Ordering::SeqCst) {
            return;
        }

        let matched = match matcher.lock() {
            Ok(mut matcher) => matcher.feed(&key_event),
            Err(poisoned) => poisoned.into_inner().feed(&key_event),
        };

        if let Some(request) = matched {
            debug!("Matched trigger '{}'", request.trigger);
            queue.submit(request);
        }
    }
}

fn listen_loop(
    matcher: Arc<Mutex<TriggerMatcher>>,
    queue: MatchSender,
    injecting: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    startup: Sender<Result<()>>,
) {
    let mut first_attempt = true;

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        let callback = capture_callback(matcher.clone(), queue.clone(), injecting.clone());

        let outcome = rdev::listen(callback);
        if first_attempt && started.elapsed() < STARTUP_GRACE {
            if let Err(e) = outcome {
                let _ = startup.send(Err(SnipForgeError::Startup(format!(
                    "could not open keyboard capture: {:?}",
                    e
                ))));
                return;
            }
        }
        first_attempt = false;

        match outcome {
            Ok(()) => warn!("Keyboard listener stopped"),
            Err(e) => error!("Keyboard listener lost its input device: {:?}", e),
        }

        if !running.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(RESUME_DELAY);
        info!("Resuming keyboard capture");
        if let Ok(mut matcher) = matcher.lock() {
            matcher.cancel();
        }
    }
}

/// Start system-wide keyboard capture on a dedicated thread.
///
/// Returns `Startup` when the listener cannot be opened at all. Later
/// failures are treated as a lost device and capture resumes by itself.
pub fn start_keyboard_listener(
    matcher: Arc<Mutex<TriggerMatcher>>,
    queue: MatchSender,
    injecting: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let (startup_tx, startup_rx) = bounded(1);

    let handle = thread::Builder::new()
        .name("snipforge-capture".to_string())
        .spawn(move || listen_loop(matcher, queue, injecting, running, startup_tx))?;

    match startup_rx.recv_timeout(STARTUP_GRACE) {
        Ok(Err(e)) => Err(e),
        Ok(Ok(())) | Err(RecvTimeoutError::Timeout) => {
            info!("Keyboard capture started");
            Ok(handle)
        }
        Err(RecvTimeoutError::Disconnected) => Err(SnipForgeError::Startup(
            "keyboard listener exited during startup".to_string(),
        )),
    }
}
