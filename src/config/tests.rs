use std::io::Write;

use super::*;

#[test]
fn defaults_resolve_to_service_runtime() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.runtime.target, RuntimeTarget::Service);
    assert_eq!(settings.runtime.mount_surface_id, DEFAULT_MOUNT_SURFACE_ID);
    assert!(!settings.runtime.markup_uses_static);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn presentation_target_and_json_logging_are_honoured() {
    let mut raw = RawSettings::default();
    raw.runtime.target = Some("Presentation".to_string());
    raw.runtime.mount_surface_id = Some("  app-root ".to_string());
    raw.logging.level = Some("debug".to_string());
    raw.logging.json = Some(true);

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.runtime.target, RuntimeTarget::Presentation);
    assert_eq!(settings.runtime.mount_surface_id, "app-root");
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn unknown_runtime_target_is_rejected() {
    let mut raw = RawSettings::default();
    raw.runtime.target = Some("mainframe".to_string());

    let error = Settings::from_raw(raw).expect_err("target should be rejected");
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "runtime.target",
            ..
        }
    ));
}

#[test]
fn empty_mount_surface_id_is_rejected() {
    let mut raw = RawSettings::default();
    raw.runtime.mount_surface_id = Some("   ".to_string());

    let error = Settings::from_raw(raw).expect_err("empty id should be rejected");
    assert!(error.to_string().contains("runtime.mount_surface_id"));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn explicit_config_file_is_loaded() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config file");
    writeln!(
        file,
        "[runtime]\ntarget = \"presentation\"\nmarkup_uses_static = true\n\n[logging]\nlevel = \"warn\""
    )
    .expect("write config");

    let settings = load(Some(file.path())).expect("config should load");

    assert_eq!(settings.runtime.target, RuntimeTarget::Presentation);
    assert!(settings.runtime.markup_uses_static);
    assert_eq!(settings.logging.level, LevelFilter::WARN);
}

#[test]
fn missing_explicit_config_file_fails() {
    let error = load(Some(Path::new("/nonexistent/isorender.toml"))).expect_err("missing file");
    assert!(matches!(error, LoadError::Build(_)));
}
