use em540_exporter::config::Config;
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.serial.port = "/dev/ttyAMA0".to_string();
    cfg.serial.baud_rate = 9600;
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::load(Some(&path)).unwrap();

    assert_eq!(loaded.serial.port, "/dev/ttyAMA0");
    assert_eq!(loaded.serial.baud_rate, 9600);
    assert_eq!(loaded.logging.file, cfg.logging.file);
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();

    cfg.serial.port.clear();
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.serial.baud_rate = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.serial.unit_id = 248;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.serial.stop_bits = 3;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.web.port = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.poll_interval_ms = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn load_rejects_invalid_values() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"serial:\n  unit_id: 0\n").unwrap();
    let err = Config::load(Some(tmp.path())).unwrap_err();
    assert!(err.to_string().contains("serial.unit_id"));
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}

#[test]
fn missing_file_is_io_error() {
    let err = Config::from_file("/nonexistent/em540.yaml").unwrap_err();
    assert!(err.to_string().contains("I/O error"));
}
