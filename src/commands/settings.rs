use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;

use crate::db::sqlite;
use crate::error::{Error, Result};
use crate::models::AppSettings;

/// Recursively overlay `overlay` onto `base`; objects merge key by key, anything else replaces.
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Stored settings with an optional JSON file layered on top.
pub fn load_settings(conn: &Connection, config_file: Option<&Path>) -> Result<AppSettings> {
    let stored = sqlite::load_settings(conn)?;
    match config_file {
        Some(path) => apply_config_file(stored, path),
        None => Ok(stored),
    }
}

pub fn apply_config_file(settings: AppSettings, path: &Path) -> Result<AppSettings> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
    let overlay: Value = serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("Invalid settings file {}: {}", path.display(), e)))?;

    let (api_key, audit_url) = (settings.llm.api_key.clone(), settings.audit.url.clone());
    let mut merged = serde_json::to_value(&settings)?;
    merge_json(&mut merged, overlay);

    let mut settings: AppSettings = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid settings file {}: {}", path.display(), e)))?;
    // Secrets never round-trip through JSON
    settings.llm.api_key = api_key;
    settings.audit.url = audit_url;
    log::info!("Applied settings from {}", path.display());
    Ok(settings)
}

pub fn save_settings(conn: &Connection, settings: &AppSettings) -> Result<()> {
    sqlite::save_settings(conn, settings)?;
    Ok(())
}

pub fn show_settings(settings: &AppSettings) -> Result<String> {
    Ok(serde_json::to_string_pretty(settings)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overlays_nested_keys() {
        let mut base = json!({"llm": {"model": "a", "temperature": 0.1}, "query": {"rowLimit": 10}});
        merge_json(&mut base, json!({"llm": {"model": "b"}, "explore": {"sampleRows": 5}}));
        assert_eq!(
            base,
            json!({
                "llm": {"model": "b", "temperature": 0.1},
                "query": {"rowLimit": 10},
                "explore": {"sampleRows": 5}
            })
        );
    }

    #[test]
    fn config_file_overrides_stored_settings() {
        let conn = Connection::open_in_memory().unwrap();
        sqlite::init_schema(&conn).unwrap();

        let mut stored = AppSettings::default();
        stored.llm.model = "stored-model".into();
        stored.query.preview_rows = 5;
        save_settings(&conn, &stored).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("askql.json");
        std::fs::write(&path, r#"{"llm": {"model": "file-model"}}"#).unwrap();

        let settings = load_settings(&conn, Some(&path)).unwrap();
        assert_eq!(settings.llm.model, "file-model");
        assert_eq!(settings.query.preview_rows, 5);

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            load_settings(&conn, Some(&missing)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn shown_settings_hide_api_key() {
        let mut settings = AppSettings::default();
        settings.llm.api_key = Some("sk-secret".into());
        let text = show_settings(&settings).unwrap();
        assert!(text.contains("\"llm\""));
        assert!(!text.contains("sk-secret"));
    }
}
