use crate::cli::Commands;
use crate::terminal::TerminalPresenter;
use snipforge_core::config::ensure_config_dir;
use snipforge_core::storage::{
    default_export_file_name, export_snippets, import_snippets,
};
use snipforge_core::{
    add_snippet, delete_snippet, evaluate, format_number, get_db_file_path, load_snippets, update_snippet,
    Action, ExpansionEngine, ExpansionOutcome, ImportMode, Result, Settings, SnippetContent,
    SnippetLibrary, SystemClipboard,
};
use snipforge_daemon::{daemon_status, daemon_worker_entry, start_daemon, stop_daemon};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

const PREVIEW_WIDTH: usize = 48;

pub fn handle_command(command: Option<Commands>) -> Result<()> {
    match command {
        Some(command) => handle_subcommand(command),
        None => list_snippets(), // Default: list snippets when no command provided
    }
}

fn handle_subcommand(command: Commands) -> Result<()> {
    match command {
        Commands::Add {
            trigger,
            content,
            description,
            segments,
        } => {
            let content = parse_content(content, segments)?;
            ensure_config_dir()?;
            let db = get_db_file_path();
            add_snippet(&db, trigger, content, description)
                .map(|_| println!("Snippet added successfully"))
        }
        Commands::Delete { trigger } => delete_snippet(&get_db_file_path(), &trigger)
            .map(|_| println!("Snippet deleted successfully")),
        Commands::Update {
            trigger,
            content,
            segments,
        } => {
            let content = parse_content(content, segments)?;
            update_snippet(&get_db_file_path(), &trigger, content)
                .map(|_| println!("Snippet updated successfully"))
        }
        Commands::List => list_snippets(),
        Commands::Export { path } => handle_export(path),
        Commands::Import { path, replace } => handle_import(path, replace),
        Commands::Expand { trigger } => handle_expand(&trigger),
        Commands::Calc { expression } => {
            let value = evaluate(&expression, &HashMap::new())?;
            println!("{}", format_number(value));
            Ok(())
        }
        Commands::Start => start_daemon(),
        Commands::Stop => stop_daemon(),
        Commands::Status => daemon_status(),
        Commands::DaemonWorker => daemon_worker_entry(),
    }
}

fn parse_content(content: String, segments: bool) -> Result<SnippetContent> {
    if segments {
        SnippetContent::parse_segments(&content)
    } else {
        Ok(SnippetContent::Template(content))
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn list_snippets() -> Result<()> {
    let snippets = load_snippets()?;
    if snippets.is_empty() {
        println!("No snippets yet. Add one with 'snipforge add -t <trigger> -c <content>'.");
        return Ok(());
    }

    let trigger_width = snippets
        .iter()
        .map(|entry| entry.trigger.chars().count())
        .max()
        .unwrap_or(0);

    for entry in &snippets {
        println!(
            "{:<width$}  {:<preview$}  {:>8}  {}",
            entry.trigger,
            truncate(&entry.content.preview(), PREVIEW_WIDTH),
            entry.formatted_time(),
            entry.description.as_deref().unwrap_or(""),
            width = trigger_width,
            preview = PREVIEW_WIDTH,
        );
    }
    println!("{} snippet(s)", snippets.len());
    Ok(())
}

fn handle_export(path: Option<PathBuf>) -> Result<()> {
    let output =
        path.unwrap_or_else(|| PathBuf::from(default_export_file_name(chrono::Local::now())));
    let count = export_snippets(&get_db_file_path(), &output)?;
    println!("Exported {} snippets to {}", count, output.display());
    Ok(())
}

fn handle_import(path: PathBuf, replace: bool) -> Result<()> {
    let mode = if replace {
        ImportMode::Replace
    } else {
        ImportMode::Merge
    };
    ensure_config_dir()?;
    let db = get_db_file_path();
    let summary = import_snippets(&db, &path, mode)?;
    println!(
        "Imported {} of {} snippets ({} skipped)",
        summary.added, summary.total, summary.skipped
    );
    Ok(())
}

/// Resolve a snippet against the real clipboard and clock, prompting on the
/// terminal, and print what would be typed.
fn handle_expand(trigger: &str) -> Result<()> {
    let settings = Settings::load()?;
    let library = Arc::new(SnippetLibrary::load(&get_db_file_path())?);
    let mut engine = ExpansionEngine::new(
        library,
        Arc::new(TerminalPresenter::stdio()),
        Arc::new(SystemClipboard::new()),
        &settings,
    );

    let result = engine.expand_trigger(trigger);
    match &result.outcome {
        ExpansionOutcome::Complete(plan) => {
            println!("Would delete {} characters, then:", result.delete_count);
            for action in plan.actions() {
                println!("  {}", describe_action(action));
            }
        }
        ExpansionOutcome::Cancelled => println!("Cancelled; the trigger would be removed."),
        ExpansionOutcome::NoOp => println!("No snippet for trigger '{}'", trigger),
        ExpansionOutcome::Failed(reason) => println!("Expansion failed: {}", reason),
    }
    for warning in &result.warnings {
        println!("Warning: {}", warning);
    }
    Ok(())
}

fn describe_action(action: &Action) -> String {
    match action {
        Action::TypeText(text) => format!("type {:?}", text),
        Action::PasteRichText { text, .. } => format!("paste formatted {:?}", text),
        Action::PasteImage(image) => format!("paste image {}x{}", image.width, image.height),
        Action::CursorMarker => "cursor mark".to_string(),
        Action::MoveCursorBy(offset) => format!("move cursor by {}", offset),
    }
}
