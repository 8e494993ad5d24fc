pub mod calc;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod expansion;
pub mod injector;
pub mod keyboard;
pub mod matcher;
pub mod models;
pub mod placeholder;
pub mod plan;
pub mod services;
pub mod storage;

#[cfg(test)]
mod testing;

// Re-export common items for convenience
pub use calc::{evaluate, format_number, EvalError};
pub use clipboard::SystemClipboard;
pub use config::{get_config_dir, get_db_file_path, is_daemon_running, Settings};
pub use error::{Result, SnipForgeError};
pub use expansion::{ExpansionEngine, ExpansionOutcome, ExpansionResult, ExpansionState};
pub use injector::{Injector, InjectorTiming};
pub use keyboard::{EnigoKeyboard, Key, KeyEvent, KeySink, Modifiers};
pub use matcher::{TriggerMatch, TriggerMatcher};
pub use models::{FieldKind, FieldSpec, Snippet, SnippetContent, SnippetEntry};
pub use plan::{Action, OutputPlan};
pub use services::{
    ClipboardContent, ClipboardService, FocusToken, ImageData, PromptOutcome, PromptPresenter,
    SnippetStore,
};
pub use storage::{
    add_snippet, delete_snippet, load_snippets, update_snippet, ImportMode, SnippetLibrary,
};
