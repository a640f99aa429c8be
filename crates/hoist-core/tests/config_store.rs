use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use hoist_core::config::{ConfigScope, ConfigStore, HoistConfig, PollingConfig};
use hoist_core::context::AppContext;

fn stores(temp: &TempDir) -> (ConfigStore, ConfigStore) {
    let global = temp.path().join("global");
    let project = temp.path().join("project");
    (
        ConfigStore::from_paths(ConfigScope::Global, global.clone(), project.clone()),
        ConfigStore::from_paths(ConfigScope::Project, global, project),
    )
}

#[test]
fn missing_file_loads_defaults() {
    let temp = TempDir::new().unwrap();
    let (global, project) = stores(&temp);

    assert_eq!(global.load().unwrap(), HoistConfig::new());
    assert_eq!(project.config_path(), temp.path().join("project").join("hoist.toml"));
    assert_eq!(global.config_path(), temp.path().join("global").join("hoist.toml"));
}

#[test]
fn saved_config_loads_back() {
    let temp = TempDir::new().unwrap();
    let (_, project) = stores(&temp);

    let config = HoistConfig {
        region: Some("us-phoenix-1".to_string()),
        skip_cluster: Some(true),
        platform_dir: Some(PathBuf::from(".sandbox")),
        polling: PollingConfig {
            interval_ms: Some(50),
            timeout_secs: None,
        },
        ..HoistConfig::default()
    };
    project.save(&config).unwrap();

    let written = fs::read_to_string(project.config_path()).unwrap();
    assert!(written.contains("skip_cluster = true"));
    assert!(!written.contains("profile"));
    assert_eq!(project.load().unwrap(), config);
}

#[test]
fn unset_values_fall_through_to_global() {
    let global = HoistConfig {
        profile: Some("DEFAULT".to_string()),
        name_conflict_retries: Some(3),
        polling: PollingConfig {
            interval_ms: Some(100),
            timeout_secs: Some(30),
        },
        ..HoistConfig::default()
    };
    let project = HoistConfig {
        name_conflict_retries: Some(0),
        polling: PollingConfig {
            interval_ms: None,
            timeout_secs: Some(5),
        },
        ..HoistConfig::default()
    };

    let merged = global.merge(&project);
    assert_eq!(merged.profile.as_deref(), Some("DEFAULT"));
    assert_eq!(merged.name_conflict_retries(), 0);
    assert_eq!(merged.polling.interval().as_millis(), 100);
    assert_eq!(merged.polling.timeout().as_secs(), 5);
}

#[test]
fn broken_file_reports_path_and_line() {
    let temp = TempDir::new().unwrap();
    let (_, project) = stores(&temp);
    fs::create_dir_all(temp.path().join("project")).unwrap();
    fs::write(
        project.config_path(),
        "region = \"us-ashburn-1\"\nnative_pipelines = 1\n",
    )
    .unwrap();

    let err = format!("{:#}", project.load().unwrap_err());
    assert!(err.contains("Failed to parse config file"), "{err}");
    assert!(err.contains("line 2"), "{err}");
}

#[test]
fn context_rejects_invalid_merged_config() {
    let temp = TempDir::new().unwrap();
    let ctx = AppContext::with_global_config_dir(
        temp.path().join("home"),
        temp.path().join("project"),
        temp.path().join("state"),
        temp.path().join("global"),
    );
    fs::create_dir_all(temp.path().join("project")).unwrap();
    fs::write(
        ctx.config_store(ConfigScope::Project).config_path(),
        "profile = \"  \"\n",
    )
    .unwrap();

    let err = format!("{:#}", ctx.load_config().unwrap_err());
    assert!(err.contains("profile must not be empty"), "{err}");
}
