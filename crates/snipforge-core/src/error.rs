use crate::calc::EvalError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnipForgeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Keyboard controller error: {0}")]
    Enigo(String),
    #[error("Clipboard error: {0}")]
    Clipboard(String),
    /// Capture could not be started: no usable keyboard or missing permission.
    #[error("Startup failure: {0}")]
    Startup(String),
    /// A single segment's resource (image file, clipboard) could not be read.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),
    /// The focused application rejected synthetic input.
    #[error("Injection failed: {0}")]
    Injection(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("Prompt failed: {0}")]
    Prompt(String),
    #[error("Database not found at: {0}")]
    DatabaseNotFound(String),
    #[error("Invalid snippet: {0}")]
    InvalidSnippet(String),
    #[error("Daemon already running with PID {0}")]
    DaemonAlreadyRunning(u32),
    #[error("Daemon is not running")]
    DaemonNotRunning,
    #[error("Invalid PID in daemon file")]
    InvalidPid,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SnipForgeError>;
