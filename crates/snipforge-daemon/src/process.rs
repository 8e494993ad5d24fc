/// Check whether a process with this PID exists
#[cfg(unix)]
pub fn verify_process_running(pid: u32) -> bool {
    use std::process::Command;

    // kill -0 only probes for the process
    let output = Command::new("kill").args(["-0", &pid.to_string()]).output();

    if let Ok(output) = output {
        output.status.success()
    } else {
        false
    }
}

#[cfg(windows)]
pub fn verify_process_running(pid: u32) -> bool {
    use std::process::Command;

    let output = Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid), "/NH"])
        .output();

    if let Ok(output) = output {
        let output_str = String::from_utf8_lossy(&output.stdout);
        output_str.contains(&pid.to_string())
    } else {
        false
    }
}

/// Name of the desktop session, for diagnostics
#[cfg(target_os = "linux")]
pub fn detect_desktop_environment() -> String {
    use std::env;

    for var in ["XDG_CURRENT_DESKTOP", "DESKTOP_SESSION", "GDMSESSION"] {
        if let Ok(val) = env::var(var) {
            if !val.is_empty() {
                return desktop_name(&val);
            }
        }
    }

    "Unknown".to_string()
}

#[cfg(target_os = "linux")]
fn desktop_name(value: &str) -> String {
    let upper = value.to_uppercase();
    for known in ["GNOME", "KDE", "XFCE", "Cinnamon", "MATE"] {
        if upper.contains(&known.to_uppercase()) {
            return known.to_string();
        }
    }
    value.to_string()
}

/// Which display server the session runs on, if any
#[cfg(target_os = "linux")]
pub fn detect_display_server() -> Option<&'static str> {
    use std::env;

    let set = |var: &str| env::var(var).map(|v| !v.is_empty()).unwrap_or(false);
    if set("WAYLAND_DISPLAY") {
        Some("wayland")
    } else if set("DISPLAY") {
        Some("x11")
    } else {
        None
    }
}
