//! Integration tests for ConfigManager and profile file handling
//!
//! These tests verify:
//! - Profile loading from JSON and YAML files
//! - Named, default and all-files selection
//! - Missing and malformed files being skipped
//! - Layered settings loading

use camino::Utf8PathBuf;
use pakexport::{AppSettings, ConfigManager, ExportProfile};
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

const DEFAULT_JSON: &str = r#"[
  {
    "gameTitle": "Alpha",
    "paksDir": "D:/Alpha/Paks",
    "outputDir": "out/alpha",
    "logOutputs": false,
    "keepDirectoryStructure": true,
    "createNewCheckpoint": true,
    "useCheckpointFile": "latest",
    "export": ["Alpha/Config/.*\\.ini:ini"],
    "exclude": []
  },
  {
    "gameTitle": "Alpha Demo",
    "paksDir": "D:/AlphaDemo/Paks",
    "outputDir": "out/alpha-demo",
    "export": [".*\\.txt:txt"]
  }
]"#;

const BETA_YAML: &str = r#"
- gameTitle: Beta
  paksDir: E:/Beta/Paks
  outputDir: out/beta
  maxWorkers: 2
  export:
    - 'Beta/Localization/.*\.csv:csv'
  exclude:
    - 'Beta/Localization/Debug/.*'
"#;

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.configs_dir(), &config_path);
}

#[test]
fn test_load_default_profile_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("config.json"), DEFAULT_JSON).unwrap();
    let manager = ConfigManager::new(&config_path).unwrap();

    let profiles = manager.load_default();

    assert_eq!(profiles.len(), 2);
    assert_eq!(profiles[0].game_title, "Alpha");
    assert!(profiles[0].keep_directory_structure);
    assert!(profiles[0].create_new_checkpoint);
    assert_eq!(profiles[0].checkpoint_identifier(), Some("latest"));
    assert_eq!(profiles[1].config_file_name, "config.json");
    assert_eq!(profiles[1].config_object_index, 1);
    assert!(!profiles[1].create_new_checkpoint);
}

#[test]
fn test_default_profile_missing_yields_nothing() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert!(manager.load_default().is_empty());
}

#[test]
fn test_load_named_skips_missing_and_invalid() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("beta.yaml"), BETA_YAML).unwrap();
    fs::write(config_path.join("broken.json"), "{ not json").unwrap();
    let manager = ConfigManager::new(&config_path).unwrap();

    let profiles = manager.load_named(&["missing", "broken", "beta"]);

    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].game_title, "Beta");
    assert_eq!(profiles[0].max_workers, Some(2));
    assert_eq!(profiles[0].exclude.len(), 1);
    assert_eq!(profiles[0].config_file_name, "beta.yaml");
}

#[test]
fn test_load_all_in_file_name_order() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("config.json"), DEFAULT_JSON).unwrap();
    fs::write(config_path.join("beta.yaml"), BETA_YAML).unwrap();
    fs::write(config_path.join("notes.txt"), "not a profile").unwrap();
    let manager = ConfigManager::new(&config_path).unwrap();

    let files = manager.list_profile_files().unwrap();
    let names: Vec<_> = files.iter().map(|f| f.file_name().unwrap()).collect();
    assert_eq!(names, vec!["beta.yaml", "config.json"]);

    let profiles = manager.load_all().unwrap();
    let titles: Vec<_> = profiles.iter().map(|p| p.game_title.as_str()).collect();
    assert_eq!(titles, vec!["Beta", "Alpha", "Alpha Demo"]);
}

#[test]
fn test_describe_profile_files() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("config.json"), DEFAULT_JSON).unwrap();
    fs::write(config_path.join("broken.yml"), ": : :").unwrap();
    let manager = ConfigManager::new(&config_path).unwrap();

    let described = manager.describe_profile_files().unwrap();

    assert_eq!(described.len(), 2);
    assert_eq!(described[0].0, "broken.yml");
    assert!(described[0].1.is_empty());
    assert_eq!(described[1].0, "config.json");
    assert_eq!(described[1].1, vec!["Alpha".to_string(), "Alpha Demo".to_string()]);
}

#[test]
fn test_saved_profiles_round_trip_through_named_load() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut profile = ExportProfile::new("Gamma", "paks", "out");
    profile.use_checkpoint_file = Some("Gamma 01-02-2024 03-04.ckpt".to_string());
    profile.exclude.push("Gamma/Dev/.*".to_string());
    manager.save_profiles("gamma", &[profile]).unwrap();

    let loaded = manager.load_named(&["gamma"]);
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].checkpoint_identifier(), Some("Gamma 01-02-2024 03-04.ckpt"));
    assert_eq!(loaded[0].exclude, vec!["Gamma/Dev/.*".to_string()]);
}

#[test]
fn test_settings_file_overrides_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let settings_path = config_path.join("pakexport.yaml");
    fs::write(
        &settings_path,
        "configs_dir: profiles\ncheckpoints_dir: state/checkpoints\ndebug: true\nmax_workers: 3\n",
    )
    .unwrap();

    let settings = ConfigManager::load_settings(&settings_path).unwrap();

    assert_eq!(settings.configs_dir, "profiles");
    assert_eq!(settings.checkpoints_dir, "state/checkpoints");
    assert_eq!(settings.logs_dir, "logs");
    assert!(settings.debug);
    assert_eq!(settings.max_workers, 3);
}

#[test]
fn test_missing_settings_file_uses_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();

    let settings = ConfigManager::load_settings(&config_path.join("absent.yaml")).unwrap();
    let defaults = AppSettings::default();

    assert_eq!(settings.configs_dir, defaults.configs_dir);
    assert_eq!(settings.checkpoints_dir, defaults.checkpoints_dir);
    assert_eq!(settings.logs_dir, defaults.logs_dir);
}

#[test]
fn test_zero_workers_in_settings_is_rejected() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let settings_path = config_path.join("pakexport.yaml");
    fs::write(&settings_path, "max_workers: 0\n").unwrap();

    assert!(ConfigManager::load_settings(&settings_path).is_err());
}
