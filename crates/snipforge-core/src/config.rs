use crate::error::{Result, SnipForgeError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "snipforge";
pub const PID_FILENAME: &str = "snipforge-daemon.pid";
pub const DB_FILENAME: &str = "snippets.json";
pub const SETTINGS_FILENAME: &str = "settings.json";
pub const DAEMON_LOG_FILENAME: &str = "daemon_log.txt";
pub const CONFIG_DIR_ENV: &str = "SNIPFORGE_CONFIG_DIR";

/// Clipboard writes need time to propagate before a paste chord is sent.
pub const MIN_CLIPBOARD_SETTLE_MS: u64 = 20;

/// Get the snipforge configuration directory
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_NAME)))
}

/// Ensure the configuration directory and an empty snippet database exist
pub fn ensure_config_dir() -> Result<PathBuf> {
    let config_dir = get_config_dir();
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    let db_path = get_db_file_path();
    if !db_path.exists() {
        info!("Creating snippet database at: {}", db_path.display());
        fs::write(&db_path, "[]")?;
    }

    Ok(config_dir)
}

/// Get the path to the PID file
pub fn get_pid_file_path() -> PathBuf {
    get_config_dir().join(PID_FILENAME)
}

/// Get the path to the snippet database
pub fn get_db_file_path() -> PathBuf {
    get_config_dir().join(DB_FILENAME)
}

pub fn get_settings_file_path() -> PathBuf {
    get_config_dir().join(SETTINGS_FILENAME)
}

pub fn get_daemon_log_path() -> PathBuf {
    get_config_dir().join(DAEMON_LOG_FILENAME)
}

/// Check if the snippet database exists
pub fn db_file_exists() -> bool {
    get_db_file_path().exists()
}

/// Read the daemon PID file. A file that cannot be read or parsed is stale
/// and gets removed.
pub fn is_daemon_running() -> Result<Option<u32>> {
    let pid_file = get_pid_file_path();

    if !pid_file.exists() {
        return Ok(None);
    }

    match fs::read_to_string(&pid_file) {
        Ok(contents) => match contents.trim().parse::<u32>() {
            Ok(pid) => Ok(Some(pid)),
            Err(_) => {
                let _ = fs::remove_file(&pid_file);
                Ok(None)
            }
        },
        Err(_) => {
            let _ = fs::remove_file(&pid_file);
            Ok(None)
        }
    }
}

/// User-tunable behaviour. Every field has a default so a partial
/// `settings.json` is valid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// chrono format for `{{date}}`
    pub date_format: String,
    /// chrono format for `{{time}}`
    pub time_format: String,
    /// chrono format for `{{datetime}}`
    pub datetime_format: String,
    /// Number of typed characters the trigger buffer keeps
    pub buffer_capacity: usize,
    /// Pause between synthetic backspaces
    pub backspace_delay_ms: u64,
    /// Pause between a clipboard write and the paste chord, and after it
    pub clipboard_settle_ms: u64,
    /// Pause after each typed line
    pub line_delay_ms: u64,
    /// Press Right after pasting an image so it is not left selected
    pub deselect_after_image: bool,
    /// Program used to show the field prompt dialog
    pub prompt_command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            time_format: "%H:%M".to_string(),
            datetime_format: "%Y-%m-%d %H:%M".to_string(),
            buffer_capacity: 64,
            backspace_delay_ms: 2,
            clipboard_settle_ms: 60,
            line_delay_ms: 10,
            deselect_after_image: true,
            prompt_command: "zenity".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the config directory, falling back to defaults when
    /// the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&get_settings_file_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(SnipForgeError::InvalidConfig(
                "buffer_capacity must be at least 1".to_string(),
            ));
        }
        if self.prompt_command.trim().is_empty() {
            return Err(SnipForgeError::InvalidConfig(
                "prompt_command must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Settle delay with the hard lower bound applied.
    pub fn clipboard_settle(&self) -> Duration {
        if self.clipboard_settle_ms < MIN_CLIPBOARD_SETTLE_MS {
            warn!(
                "clipboard_settle_ms {} is below the minimum, using {}",
                self.clipboard_settle_ms, MIN_CLIPBOARD_SETTLE_MS
            );
            return Duration::from_millis(MIN_CLIPBOARD_SETTLE_MS);
        }
        Duration::from_millis(self.clipboard_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_settings_keep_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"date_format": "%d/%m/%Y", "clipboard_settle_ms": 120}"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.date_format, "%d/%m/%Y");
        assert_eq!(settings.clipboard_settle_ms, 120);
        assert_eq!(settings.time_format, "%H:%M");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"buffer_capacity": 0}"#).unwrap();

        assert!(matches!(
            Settings::load_from(&path),
            Err(SnipForgeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn settle_delay_has_a_floor() {
        let settings = Settings {
            clipboard_settle_ms: 1,
            ..Settings::default()
        };
        assert_eq!(
            settings.clipboard_settle(),
            Duration::from_millis(MIN_CLIPBOARD_SETTLE_MS)
        );
    }
}
