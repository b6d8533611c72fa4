//! Integration tests for configuration loading and live preference updates

use picka::cli::RunContext;
use picka::config::{ConfigLoader, PickaConfig, PreferenceStore, Preferences};
use picka::error::ApiError;
use picka::host::ConflictAction;
use picka::types::PickAction;
use serde_json::json;
use std::io::Write;
use tempfile::NamedTempFile;

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_rendered_config_loads_back() {
    let mut config = PickaConfig::default();
    config.preferences.isolate_tabs = true;
    config.preferences.browser_action = PickAction::PickFromRightTabsExcludeCurrent;
    config.download.max_active_downloads = 2;
    let file = toml_file(&config.to_toml_string().unwrap());

    let loaded = ConfigLoader::load_from_file(file.path()).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_invalid_pattern_fails_validation() {
    let file = toml_file(
        r#"
[preferences]
use_expression = true
file_pattern = "${index +}"
"#,
    );
    let config = ConfigLoader::load_from_file(file.path()).unwrap();

    let err = config.validated().unwrap_err();
    let ApiError::ConfigError(message) = err else {
        panic!("expected a configuration error");
    };
    assert!(message.contains("file_pattern"));
}

#[test]
fn test_run_context_uses_explicit_file() {
    let file = toml_file(
        r#"
[preferences]
filename_conflict_action = "prompt"

[download]
max_active_downloads = 2
"#,
    );
    let ctx = RunContext::new(Some(file.path().to_path_buf())).unwrap();

    assert_eq!(ctx.config().download.max_active_downloads, 2);
    assert_eq!(
        ctx.config().preferences.filename_conflict_action,
        ConflictAction::Prompt
    );
}

#[test]
fn test_zero_downloads_rejected() {
    let file = toml_file("[download]\nmax_active_downloads = 0\n");
    assert!(matches!(
        RunContext::new(Some(file.path().to_path_buf())),
        Err(ApiError::ConfigError(_))
    ));
}

#[test]
fn test_preference_changes_from_host() {
    let store = PreferenceStore::new(Preferences::default());

    store
        .apply_changes(&json!({
            "isolateTabs": true,
            "filePatternBatch": "${index}${ext}",
            "browserAction": "PICK_FROM_RIGHT_TABS",
        }))
        .unwrap();

    let prefs = store.get();
    assert!(prefs.isolate_tabs);
    assert_eq!(prefs.file_pattern_batch, "${index}${ext}");
    assert_eq!(prefs.browser_action, PickAction::PickFromRightTabs);
}

#[test]
fn test_bad_preference_change_keeps_old_values() {
    let store = PreferenceStore::new(Preferences::default());

    assert!(store.apply_changes(&json!({ "useCache": "sometimes" })).is_err());
    assert!(store.apply_changes(&json!(["not", "an", "object"])).is_err());
    assert_eq!(store.get(), Preferences::default());
}
