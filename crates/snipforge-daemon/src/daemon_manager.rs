use crate::keyboard_listener::start_keyboard_listener;
use crate::permissions::check_input_access;
use crate::pipeline::{match_queue, spawn_expansion_worker};
use crate::process::verify_process_running;
use crate::prompt::CommandPresenter;
use log::{error, info, warn};
use snipforge_core::config::{
    db_file_exists, ensure_config_dir, get_daemon_log_path, get_db_file_path, get_pid_file_path,
};
use snipforge_core::{
    is_daemon_running, ClipboardService, EnigoKeyboard, ExpansionEngine, Injector, InjectorTiming,
    Result, Settings, SnipForgeError, SnippetLibrary, SnippetStore, SystemClipboard,
    TriggerMatcher,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

/// How often the worker looks for changes to `snippets.json`.
const RELOAD_INTERVAL: Duration = Duration::from_secs(1);

/// Start the daemon process
pub fn start_daemon() -> Result<()> {
    // Check if daemon is already running
    if let Some(pid) = is_daemon_running()? {
        if verify_process_running(pid) {
            return Err(SnipForgeError::DaemonAlreadyRunning(pid));
        }
        // PID file exists but process is not running - clean up and restart
        println!("Found stale PID file. Cleaning up and starting new daemon...");
        let _ = fs::remove_file(get_pid_file_path());
    }

    println!("Starting snipforge daemon...");
    ensure_config_dir()?;

    if !db_file_exists() {
        return Err(SnipForgeError::DatabaseNotFound(
            get_db_file_path().to_string_lossy().to_string(),
        ));
    }

    check_input_access()?;

    let daemon_log_file = get_daemon_log_path();
    spawn_worker_process(&daemon_log_file)?;

    // Wait for the daemon to start and create its PID file
    for _ in 0..20 {
        thread::sleep(Duration::from_millis(100));
        if is_daemon_running()?.is_some() {
            break;
        }
    }

    match is_daemon_running()? {
        Some(pid) if verify_process_running(pid) => {
            println!("Daemon started successfully with PID {}.", pid);
            Ok(())
        }
        _ => Err(SnipForgeError::Other(format!(
            "Daemon failed to start. Check logs at {}",
            daemon_log_file.display()
        ))),
    }
}

#[cfg(unix)]
fn spawn_worker_process(log_file: &Path) -> Result<()> {
    use std::process::Command;

    let current_exe = std::env::current_exe()?;
    let cmd = format!(
        "nohup '{}' daemon-worker > '{}' 2>&1 &",
        current_exe.to_string_lossy(),
        log_file.to_string_lossy()
    );

    Command::new("sh").arg("-c").arg(&cmd).status()?;
    Ok(())
}

#[cfg(windows)]
fn spawn_worker_process(log_file: &Path) -> Result<()> {
    use std::process::Command;

    let current_exe = std::env::current_exe()?;
    let cmd = format!(
        "START /B \"snipforge daemon\" \"{}\" daemon-worker > \"{}\" 2>&1",
        current_exe.to_string_lossy(),
        log_file.to_string_lossy()
    );

    Command::new("cmd").arg("/C").arg(&cmd).status()?;
    Ok(())
}

/// Stop the daemon if it's running
pub fn stop_daemon() -> Result<()> {
    let pid_file = get_pid_file_path();

    if !pid_file.exists() {
        return Err(SnipForgeError::DaemonNotRunning);
    }

    let pid_str = match fs::read_to_string(&pid_file) {
        Ok(content) => content,
        Err(e) => {
            let _ = fs::remove_file(&pid_file);
            return Err(SnipForgeError::Other(format!(
                "Failed to read PID file: {}",
                e
            )));
        }
    };

    let pid = match pid_str.trim().parse::<u32>() {
        Ok(pid) => pid,
        Err(_) => {
            let _ = fs::remove_file(&pid_file);
            return Err(SnipForgeError::InvalidPid);
        }
    };

    println!("Attempting to stop daemon with PID {}...", pid);

    if !verify_process_running(pid) {
        println!("Process with PID {} is not running.", pid);
        let _ = fs::remove_file(&pid_file);
        return Ok(());
    }

    if terminate(pid) {
        let _ = fs::remove_file(&pid_file);
        println!("Daemon stopped successfully.");
        return Ok(());
    }

    println!("WARNING: Failed to stop daemon process. PID file will be removed anyway.");
    let _ = fs::remove_file(&pid_file);
    Ok(())
}

/// Ask the process to exit, then force it after a short grace period.
#[cfg(unix)]
fn terminate(pid: u32) -> bool {
    use std::process::Command;

    let pid_arg = pid.to_string();
    if let Ok(status) = Command::new("kill").arg(&pid_arg).status() {
        if status.success() {
            println!("Sent termination signal to daemon with PID {}", pid);
        }
    }

    thread::sleep(Duration::from_millis(500));
    if !verify_process_running(pid) {
        return true;
    }

    println!("Daemon didn't terminate gracefully, using force kill...");
    matches!(
        Command::new("kill").args(["-9", &pid_arg]).status(),
        Ok(status) if status.success()
    )
}

#[cfg(windows)]
fn terminate(pid: u32) -> bool {
    use std::process::Command;

    let pid_arg = pid.to_string();
    let _ = Command::new("taskkill").args(["/PID", &pid_arg]).status();

    thread::sleep(Duration::from_millis(500));
    if !verify_process_running(pid) {
        return true;
    }

    println!("Daemon didn't terminate gracefully, using force kill...");
    matches!(
        Command::new("taskkill").args(["/F", "/T", "/PID", &pid_arg]).status(),
        Ok(status) if status.success()
    )
}

/// Check daemon status
pub fn daemon_status() -> Result<()> {
    match is_daemon_running()? {
        Some(pid) if verify_process_running(pid) => {
            println!("snipforge daemon is running with PID {}", pid);
            println!("Log file: {}", get_daemon_log_path().display());
        }
        Some(pid) => {
            println!("PID file exists but process {} is not running", pid);
            println!("This could indicate the daemon crashed or was stopped abruptly");
            println!("Recommend running 'snipforge stop' followed by 'snipforge start'");
        }
        None => println!("snipforge daemon is not running"),
    }

    for problem in crate::permissions::probe_input_access().problems() {
        println!("Warning: {}", problem);
    }
    Ok(())
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Reload the library and the trigger table when the database file changed.
/// Returns the new modification time.
pub fn reload_if_changed(
    db_path: &Path,
    last_modified: Option<SystemTime>,
    library: &SnippetLibrary,
    matcher: &Mutex<TriggerMatcher>,
) -> Option<SystemTime> {
    let current = modified_time(db_path);
    if current.is_none() || current == last_modified {
        return last_modified;
    }

    match library.reload(db_path) {
        Ok(count) => {
            let triggers = library.all_triggers();
            match matcher.lock() {
                Ok(mut matcher) => matcher.set_triggers(&triggers),
                Err(poisoned) => poisoned.into_inner().set_triggers(&triggers),
            }
            info!("Reloaded {} snippets", count);
            current
        }
        Err(e) => {
            // Keep the old snippets; a half-written file is retried next tick
            warn!("Could not reload snippets: {}", e);
            last_modified
        }
    }
}

/// The actual daemon worker process
pub fn run_daemon_worker() -> Result<()> {
    let settings = Settings::load()?;
    let db_path = get_db_file_path();
    if !db_path.exists() {
        return Err(SnipForgeError::DatabaseNotFound(
            db_path.to_string_lossy().to_string(),
        ));
    }

    check_input_access()?;

    let library = Arc::new(SnippetLibrary::load(&db_path)?);
    let mut last_modified = modified_time(&db_path);
    let matcher = Arc::new(Mutex::new(TriggerMatcher::new(
        library.all_triggers(),
        settings.buffer_capacity,
    )));
    info!("Loaded {} snippets", library.len());

    let clipboard: Arc<dyn ClipboardService> = Arc::new(SystemClipboard::new());
    let presenter = Arc::new(CommandPresenter::new(settings.prompt_command.clone()));
    let engine = ExpansionEngine::new(library.clone(), presenter, clipboard.clone(), &settings);
    let timing = InjectorTiming::from_settings(&settings);

    let injecting = Arc::new(AtomicBool::new(false));
    let running = Arc::new(AtomicBool::new(true));
    let (queue, receiver) = match_queue();

    let _worker = spawn_expansion_worker(
        engine,
        move || EnigoKeyboard::new().map(|keys| Injector::new(keys, clipboard, timing)),
        injecting.clone(),
        matcher.clone(),
        receiver,
    );
    let capture = start_keyboard_listener(matcher.clone(), queue, injecting, running.clone())?;

    // Watch for database changes until the process is terminated
    while !capture.is_finished() {
        thread::sleep(RELOAD_INTERVAL);
        last_modified = reload_if_changed(&db_path, last_modified, &library, &matcher);
    }

    error!("Keyboard capture thread exited");
    Err(SnipForgeError::Startup(
        "keyboard capture stopped".to_string(),
    ))
}

/// This function runs as a separate daemon process
pub fn daemon_worker_entry() -> Result<()> {
    // Create PID file with the current process ID
    let pid_file = get_pid_file_path();
    let mut file = File::create(&pid_file)?;
    write!(file, "{}", process::id())?;

    let result = run_daemon_worker();
    if let Err(e) = &result {
        error!("Daemon worker stopped: {}", e);
    }

    // Clean up PID file on exit
    let _ = fs::remove_file(&pid_file);

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use snipforge_core::keyboard::KeyEvent;
    use snipforge_core::storage::{add_snippet, save_snippets_to};
    use std::time::UNIX_EPOCH;
    use tempfile::tempdir;

    #[test]
    fn changed_database_refreshes_the_trigger_table() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("snippets.json");
        save_snippets_to(&db, &[]).unwrap();

        let library = SnippetLibrary::load(&db).unwrap();
        let matcher = Mutex::new(TriggerMatcher::new(library.all_triggers(), 64));

        add_snippet(&db, ":hi".to_string(), "hello".to_string(), None).unwrap();
        let seen = reload_if_changed(&db, Some(UNIX_EPOCH), &library, &matcher);

        assert!(seen.is_some());
        assert!(library.lookup(":hi").is_some());
        let fired = ":hi"
            .chars()
            .filter_map(|c| matcher.lock().unwrap().feed(&KeyEvent::typed(c)))
            .count();
        assert_eq!(fired, 1);

        // Same timestamp: nothing to do
        assert_eq!(reload_if_changed(&db, seen, &library, &matcher), seen);
    }
}
