//! Checks that keyboard capture can work before the listener is started.

use log::info;
use snipforge_core::{Result, SnipForgeError};

/// What the environment offers for system-wide capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputAccess {
    pub readable_device: bool,
    pub in_input_group: bool,
    pub display: bool,
}

impl InputAccess {
    /// Human-readable problems; empty when capture should work.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.readable_device && !self.in_input_group {
            problems.push(
                "cannot read /dev/input: add your user to the 'input' group \
                 (sudo usermod -a -G input $USER) and log out and back in"
                    .to_string(),
            );
        }
        if !self.display {
            problems.push(
                "no graphical session found: DISPLAY or WAYLAND_DISPLAY must be set".to_string(),
            );
        }
        problems
    }
}

#[cfg(target_os = "linux")]
fn has_readable_input_device() -> bool {
    let Ok(entries) = std::fs::read_dir("/dev/input") else {
        return false;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("event"))
        .any(|entry| std::fs::File::open(entry.path()).is_ok())
}

#[cfg(target_os = "linux")]
fn in_input_group() -> bool {
    let output = std::process::Command::new("groups")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok());

    match output {
        Some(groups) => groups.split_whitespace().any(|group| group == "input"),
        None => false,
    }
}

/// Probe the current session.
#[cfg(target_os = "linux")]
pub fn probe_input_access() -> InputAccess {
    InputAccess {
        readable_device: has_readable_input_device(),
        in_input_group: in_input_group(),
        display: crate::process::detect_display_server().is_some(),
    }
}

#[cfg(target_os = "macos")]
pub fn probe_input_access() -> InputAccess {
    // Input Monitoring is granted per application; System Events answering
    // is the closest observable signal.
    let granted = std::process::Command::new("osascript")
        .arg("-e")
        .arg("tell application \"System Events\" to return name of first process")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false);

    InputAccess {
        readable_device: granted,
        in_input_group: granted,
        display: true,
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn probe_input_access() -> InputAccess {
    InputAccess {
        readable_device: true,
        in_input_group: true,
        display: true,
    }
}

/// Fail with `Startup` when capture cannot be opened.
pub fn check_input_access() -> Result<()> {
    let access = probe_input_access();
    let problems = access.problems();
    if problems.is_empty() {
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    info!(
        "Desktop environment: {}",
        crate::process::detect_desktop_environment()
    );
    #[cfg(not(target_os = "linux"))]
    info!("Input access: {:?}", access);

    Err(SnipForgeError::Startup(problems.join("; ")))
}
