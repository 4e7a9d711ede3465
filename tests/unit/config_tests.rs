//! Configuration parsing and validation tests.

use std::time::Duration;

use agent_relay::GlobalConfig;

fn workspace() -> tempfile::TempDir {
    tempfile::tempdir().expect("tempdir")
}

#[test]
fn minimal_config_fills_defaults() {
    let dir = workspace();
    let toml = format!("default_workspace_root = {:?}\n", dir.path());
    let config = GlobalConfig::from_toml_str(&toml).unwrap();

    assert_eq!(config.engine.binary, "claude");
    assert_eq!(config.engine.model, None);
    assert_eq!(config.engine.one_shot_timeout(), Duration::from_secs(300));
    assert_eq!(config.engine.idle_timeout(), Duration::from_secs(300));
    assert_eq!(config.engine.soft_ceiling(), Duration::from_secs(1800));
    assert_eq!(config.session.resume_ttl(), Duration::from_secs(14_400));
}

#[test]
fn explicit_values_override_defaults() {
    let dir = workspace();
    let toml = format!(
        r#"default_workspace_root = {:?}

[engine]
binary = "my-agent"
model = "opus"
one_shot_timeout_seconds = 30
idle_timeout_seconds = 45
soft_ceiling_seconds = 600

[session]
resume_ttl_seconds = 7200
"#,
        dir.path()
    );
    let config = GlobalConfig::from_toml_str(&toml).unwrap();

    assert_eq!(config.engine.binary, "my-agent");
    assert_eq!(config.engine.model.as_deref(), Some("opus"));
    assert_eq!(config.engine.idle_timeout(), Duration::from_secs(45));
    assert_eq!(config.engine.soft_ceiling(), Duration::from_secs(600));
    assert_eq!(config.session.resume_ttl(), Duration::from_secs(7200));
}

#[test]
fn workspace_root_is_canonicalized() {
    let dir = workspace();
    let nested = dir.path().join("a");
    std::fs::create_dir(&nested).unwrap();
    let dotted = dir.path().join("a").join("..").join("a");

    let toml = format!("default_workspace_root = {dotted:?}\n");
    let config = GlobalConfig::from_toml_str(&toml).unwrap();
    assert_eq!(config.default_workspace_root(), nested.canonicalize().unwrap());
}

#[test]
fn db_path_lives_under_the_workspace_root() {
    let dir = workspace();
    let toml = format!("default_workspace_root = {:?}\n", dir.path());
    let config = GlobalConfig::from_toml_str(&toml).unwrap();

    let db = config.db_path();
    assert!(db.starts_with(config.default_workspace_root()));
    assert!(db.ends_with(".agent-relay/sessions.db"));
}

#[test]
fn load_from_path_reads_a_file() {
    let dir = workspace();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!("default_workspace_root = {:?}\n", dir.path()),
    )
    .unwrap();

    let config = GlobalConfig::load_from_path(&path).unwrap();
    assert_eq!(config.engine.binary, "claude");
}

#[test]
fn missing_workspace_root_key_is_an_error() {
    let err = GlobalConfig::from_toml_str("[engine]\nbinary = \"x\"\n").unwrap_err();
    assert!(err.to_string().contains("default_workspace_root"));
}

#[test]
fn nonexistent_workspace_root_is_an_error() {
    let err =
        GlobalConfig::from_toml_str("default_workspace_root = \"/no/such/dir/anywhere\"\n")
            .unwrap_err();
    assert!(err.to_string().contains("default_workspace_root invalid"));
}

#[test]
fn empty_binary_is_an_error() {
    let dir = workspace();
    let toml = format!(
        "default_workspace_root = {:?}\n[engine]\nbinary = \"  \"\n",
        dir.path()
    );
    let err = GlobalConfig::from_toml_str(&toml).unwrap_err();
    assert!(err.to_string().contains("engine.binary"));
}

#[test]
fn zero_timers_are_an_error() {
    let dir = workspace();
    for key in ["idle_timeout_seconds", "soft_ceiling_seconds"] {
        let toml = format!(
            "default_workspace_root = {:?}\n[engine]\n{key} = 0\n",
            dir.path()
        );
        let err = GlobalConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains(key), "{key}: {err}");
    }
}
