use crate::config::get_db_file_path;
use crate::error::{Result, SnipForgeError};
use crate::models::{Snippet, SnippetContent, SnippetEntry};
use crate::services::SnippetStore;
use chrono::{DateTime, Local};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// Load all snippets from the default database
pub fn load_snippets() -> Result<Vec<SnippetEntry>> {
    load_snippets_from(&get_db_file_path())
}

/// Load all snippets from a database file
pub fn load_snippets_from(path: &Path) -> Result<Vec<SnippetEntry>> {
    if !path.exists() {
        return Err(SnipForgeError::DatabaseNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    let content = fs::read_to_string(path)?;

    // Handle empty database file
    if content.trim().is_empty() {
        return Ok(vec![]);
    }

    serde_json::from_str(&content).map_err(|e| e.into())
}

/// Load snippets, treating a missing database as empty
fn load_or_empty(path: &Path) -> Result<Vec<SnippetEntry>> {
    match load_snippets_from(path) {
        Ok(s) => Ok(s),
        Err(SnipForgeError::DatabaseNotFound(_)) => Ok(vec![]),
        Err(e) => Err(e),
    }
}

/// Save snippets to a database file
pub fn save_snippets_to(path: &Path, snippets: &[SnippetEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let serialized = serde_json::to_string_pretty(&snippets)?;
    fs::write(path, serialized)?;
    Ok(())
}

/// Triggers are non-empty and contain no whitespace.
pub fn validate_trigger(trigger: &str) -> Result<()> {
    if trigger.is_empty() {
        return Err(SnipForgeError::InvalidSnippet(
            "trigger must not be empty".to_string(),
        ));
    }
    if trigger.chars().any(char::is_whitespace) {
        return Err(SnipForgeError::InvalidSnippet(format!(
            "trigger '{}' must not contain whitespace",
            trigger
        )));
    }
    Ok(())
}

/// Add a new snippet
pub fn add_snippet(
    path: &Path,
    trigger: String,
    content: impl Into<SnippetContent>,
    description: Option<String>,
) -> Result<()> {
    validate_trigger(&trigger)?;
    let mut snippets = load_or_empty(path)?;

    if find_snippet(&snippets, &trigger).is_some() {
        return Err(SnipForgeError::InvalidSnippet(format!(
            "trigger '{}' already exists",
            trigger
        )));
    }

    let mut entry = SnippetEntry::new(trigger, content);
    entry.description = description;
    snippets.push(entry);
    save_snippets_to(path, &snippets)
}

/// Delete a snippet by trigger
pub fn delete_snippet(path: &Path, trigger: &str) -> Result<()> {
    let mut snippets = load_snippets_from(path)?;
    let before = snippets.len();
    snippets.retain(|entry| entry.trigger != trigger);

    if snippets.len() == before {
        return Err(SnipForgeError::Other(format!(
            "Trigger '{}' not found",
            trigger
        )));
    }

    save_snippets_to(path, &snippets)
}

/// Update an existing snippet
pub fn update_snippet(path: &Path, trigger: &str, content: impl Into<SnippetContent>) -> Result<()> {
    let mut snippets = load_snippets_from(path)?;

    let Some(entry) = snippets.iter_mut().find(|entry| entry.trigger == trigger) else {
        return Err(SnipForgeError::Other(format!(
            "Trigger '{}' not found",
            trigger
        )));
    };
    entry.update_content(content);

    save_snippets_to(path, &snippets)
}

/// Find a snippet by trigger
pub fn find_snippet<'a>(snippets: &'a [SnippetEntry], trigger: &str) -> Option<&'a SnippetEntry> {
    snippets.iter().find(|entry| entry.trigger == trigger)
}

/// File written by `export`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExportEnvelope {
    pub version: String,
    pub exported_at: String,
    pub snippet_count: usize,
    pub snippets: Vec<SnippetEntry>,
}

/// `snipforge_snippets_<YYYYmmdd_HHMMSS>.json`
pub fn default_export_file_name(now: DateTime<Local>) -> String {
    format!("snipforge_snippets_{}.json", now.format("%Y%m%d_%H%M%S"))
}

/// Write every snippet in `db` to `output`. Returns the number exported.
pub fn export_snippets(db: &Path, output: &Path) -> Result<usize> {
    let snippets = load_or_empty(db)?;
    let envelope = ExportEnvelope {
        version: EXPORT_FORMAT_VERSION.to_string(),
        exported_at: Local::now().to_rfc3339(),
        snippet_count: snippets.len(),
        snippets,
    };

    fs::write(output, serde_json::to_string_pretty(&envelope)?)?;
    info!(
        "Exported {} snippets to {}",
        envelope.snippet_count,
        output.display()
    );
    Ok(envelope.snippet_count)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Keep existing snippets; imported triggers that already exist are skipped.
    Merge,
    /// Discard existing snippets.
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub skipped: usize,
    pub total: usize,
}

/// Parse an import file: either a bare array of records or an export envelope.
pub fn parse_import(content: &str) -> Result<Vec<SnippetEntry>> {
    let value: Value = serde_json::from_str(content)?;
    let records = match value {
        Value::Array(records) => records,
        Value::Object(mut object) => match object.remove("snippets") {
            Some(Value::Array(records)) => records,
            _ => {
                return Err(SnipForgeError::InvalidSnippet(
                    "import file has no 'snippets' list".to_string(),
                ))
            }
        },
        _ => {
            return Err(SnipForgeError::InvalidSnippet(
                "import file must contain a list of snippets".to_string(),
            ))
        }
    };

    let mut entries = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let has_fields = record.get("trigger").is_some() && record.get("content").is_some();
        if !has_fields {
            return Err(SnipForgeError::InvalidSnippet(format!(
                "record {} needs 'trigger' and 'content'",
                index + 1
            )));
        }
        let entry: SnippetEntry = serde_json::from_value(record).map_err(|err| {
            SnipForgeError::InvalidSnippet(format!("record {}: {}", index + 1, err))
        })?;
        validate_trigger(&entry.trigger)
            .map_err(|err| SnipForgeError::InvalidSnippet(format!("record {}: {}", index + 1, err)))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Import snippets from `input` into `db`.
pub fn import_snippets(db: &Path, input: &Path, mode: ImportMode) -> Result<ImportSummary> {
    let imported = parse_import(&fs::read_to_string(input)?)?;
    let mut snippets = match mode {
        ImportMode::Merge => load_or_empty(db)?,
        ImportMode::Replace => Vec::new(),
    };

    let mut known: HashSet<String> = snippets.iter().map(|s| s.trigger.clone()).collect();
    let mut summary = ImportSummary {
        total: imported.len(),
        ..ImportSummary::default()
    };

    for entry in imported {
        if known.insert(entry.trigger.clone()) {
            snippets.push(entry);
            summary.added += 1;
        } else {
            warn!("Skipping duplicate trigger '{}'", entry.trigger);
            summary.skipped += 1;
        }
    }

    save_snippets_to(db, &snippets)?;
    Ok(summary)
}

/// In-memory snippet set shared with the expansion engine.
///
/// Each snippet is held behind an `Arc`; reloading swaps the map, so a
/// snippet already handed out stays unchanged for its expansion.
#[derive(Debug, Default)]
pub struct SnippetLibrary {
    snippets: RwLock<HashMap<String, Arc<Snippet>>>,
}

impl SnippetLibrary {
    pub fn new(entries: &[SnippetEntry]) -> Self {
        let library = Self::default();
        library.replace(entries);
        library
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(&load_or_empty(path)?))
    }

    pub fn replace(&self, entries: &[SnippetEntry]) {
        let map: HashMap<String, Arc<Snippet>> = entries
            .iter()
            .map(|entry| (entry.trigger.clone(), Arc::new(entry.to_snippet())))
            .collect();
        match self.snippets.write() {
            Ok(mut guard) => *guard = map,
            Err(poisoned) => *poisoned.into_inner() = map,
        }
    }

    /// Re-read the database file. Returns the number of snippets loaded.
    pub fn reload(&self, path: &Path) -> Result<usize> {
        let entries = load_or_empty(path)?;
        self.replace(&entries);
        Ok(entries.len())
    }

    pub fn len(&self) -> usize {
        self.snippets.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnippetStore for SnippetLibrary {
    fn lookup(&self, trigger: &str) -> Option<Arc<Snippet>> {
        self.snippets.read().ok()?.get(trigger).cloned()
    }

    fn all_triggers(&self) -> Vec<String> {
        self.snippets
            .read()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Segment;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn add_update_delete() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("snippets.json");

        add_snippet(&db, ":sig".to_string(), "Best,\nSam".to_string(), None).unwrap();
        add_snippet(
            &db,
            ":addr".to_string(),
            "1 Main St".to_string(),
            Some("home".to_string()),
        )
        .unwrap();

        update_snippet(&db, ":sig", "Cheers,\n{{name}}".to_string()).unwrap();
        let snippets = load_snippets_from(&db).unwrap();
        assert_eq!(snippets.len(), 2);
        assert_eq!(
            find_snippet(&snippets, ":sig").unwrap().content,
            SnippetContent::Template("Cheers,\n{{name}}".to_string())
        );
        assert_eq!(
            find_snippet(&snippets, ":addr").unwrap().description.as_deref(),
            Some("home")
        );

        delete_snippet(&db, ":sig").unwrap();
        let snippets = load_snippets_from(&db).unwrap();
        assert_eq!(snippets.len(), 1);
        assert!(find_snippet(&snippets, ":sig").is_none());
    }

    #[test]
    fn invalid_and_duplicate_triggers_are_rejected() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("snippets.json");

        add_snippet(&db, ":a".to_string(), "x".to_string(), None).unwrap();
        assert!(add_snippet(&db, ":a".to_string(), "y".to_string(), None).is_err());
        assert!(add_snippet(&db, "".to_string(), "y".to_string(), None).is_err());
        assert!(add_snippet(&db, ": b".to_string(), "y".to_string(), None).is_err());
        assert!(update_snippet(&db, ":missing", "y".to_string()).is_err());
        assert!(delete_snippet(&db, ":missing").is_err());
    }

    #[test]
    fn missing_database_is_reported() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_snippets_from(&dir.path().join("none.json")),
            Err(SnipForgeError::DatabaseNotFound(_))
        ));
    }

    #[test]
    fn export_then_import_into_another_database() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.json");
        let target = dir.path().join("target.json");
        let export = dir.path().join("export.json");

        add_snippet(&source, ":a".to_string(), "alpha".to_string(), None).unwrap();
        add_snippet(&source, ":b".to_string(), "beta".to_string(), None).unwrap();
        add_snippet(&target, ":a".to_string(), "kept".to_string(), None).unwrap();

        assert_eq!(export_snippets(&source, &export).unwrap(), 2);
        let envelope: ExportEnvelope =
            serde_json::from_str(&fs::read_to_string(&export).unwrap()).unwrap();
        assert_eq!(envelope.version, EXPORT_FORMAT_VERSION);
        assert_eq!(envelope.snippet_count, 2);

        let summary = import_snippets(&target, &export, ImportMode::Merge).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                added: 1,
                skipped: 1,
                total: 2
            }
        );
        let merged = load_snippets_from(&target).unwrap();
        assert_eq!(
            find_snippet(&merged, ":a").unwrap().content,
            SnippetContent::Template("kept".to_string())
        );

        let summary = import_snippets(&target, &export, ImportMode::Replace).unwrap();
        assert_eq!(summary.added, 2);
        let replaced = load_snippets_from(&target).unwrap();
        assert_eq!(
            find_snippet(&replaced, ":a").unwrap().content,
            SnippetContent::Template("alpha".to_string())
        );
    }

    #[test]
    fn import_accepts_bare_lists_and_rejects_incomplete_records() {
        let entries = parse_import(r#"[{"trigger": ":x", "content": "ex"}]"#).unwrap();
        assert_eq!(entries.len(), 1);

        assert!(parse_import(r#"[{"trigger": ":x"}]"#).is_err());
        assert!(parse_import(r#"[{"trigger": "a b", "content": "x"}]"#).is_err());
        assert!(parse_import(r#"{"version": "1.0"}"#).is_err());
        assert!(parse_import(r#""text""#).is_err());
    }

    #[test]
    fn export_file_name_uses_the_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            default_export_file_name(now),
            "snipforge_snippets_20240309_140507.json"
        );
    }

    #[test]
    fn library_snapshots_survive_reload() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("snippets.json");
        add_snippet(&db, ":a".to_string(), "first".to_string(), None).unwrap();

        let library = SnippetLibrary::load(&db).unwrap();
        let held = library.lookup(":a").unwrap();

        update_snippet(&db, ":a", "second".to_string()).unwrap();
        add_snippet(&db, ":b".to_string(), "bee".to_string(), None).unwrap();
        assert_eq!(library.reload(&db).unwrap(), 2);

        assert_eq!(held.segments, vec![Segment::PlainText("first".to_string())]);
        assert_eq!(
            library.lookup(":a").unwrap().segments,
            vec![Segment::PlainText("second".to_string())]
        );
        let mut triggers = library.all_triggers();
        triggers.sort();
        assert_eq!(triggers, vec![":a".to_string(), ":b".to_string()]);
    }
}
