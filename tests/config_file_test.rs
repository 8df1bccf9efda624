//! Configuration file loading with environment overlay.

use std::io::Write;
use std::sync::Mutex;

use gg_session::config::{self, ConfigError};
use gg_session::telemetry::LogFormat;

/// Environment variables are process-global; tests touching them run serially.
static ENV_LOCK: Mutex<()> = Mutex::new(());

const KEYS: &[&str] = &[
    "GG_SESSION_MAX_LENGTH",
    "GG_SESSION_N_CTX",
    "GG_SESSION_TOP_K",
    "GG_SESSION_TEMPERATURE",
    "GG_SESSION_LOG_FORMAT",
];

fn clear_env() {
    for key in KEYS {
        std::env::remove_var(key);
    }
}

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

const DOCUMENT: &str = r#"
max_length = 256
echo_prompt = false

[context]
n_ctx = 512
seed = 42

[sampling]
top_k = 8
temperature = 0.0

[log]
level = "debug"
"#;

#[test]
fn file_values_are_loaded() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env();
    let file = write_config(DOCUMENT);

    let cfg = config::load_file(file.path()).unwrap();
    assert_eq!(cfg.session.max_length, 256);
    assert!(!cfg.session.echo_prompt);
    assert_eq!(cfg.session.context.n_ctx, 512);
    assert_eq!(cfg.session.context.seed, 42);
    assert_eq!(cfg.session.sampling.top_k, 8);
    assert_eq!(cfg.session.sampling.temperature, 0.0);
    assert_eq!(cfg.log.level, "debug");
    assert_eq!(cfg.log.format, LogFormat::Pretty);
}

#[test]
fn environment_overrides_file() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env();
    let file = write_config(DOCUMENT);
    std::env::set_var("GG_SESSION_TOP_K", "3");
    std::env::set_var("GG_SESSION_LOG_FORMAT", "json");

    let cfg = config::load_file(file.path()).unwrap();
    clear_env();
    assert_eq!(cfg.session.sampling.top_k, 3);
    assert_eq!(cfg.log.format, LogFormat::Json);
    assert_eq!(cfg.session.max_length, 256);
}

#[test]
fn environment_max_length_is_clamped_to_file_window() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env();
    let file = write_config(DOCUMENT);
    std::env::set_var("GG_SESSION_MAX_LENGTH", "100000");

    let cfg = config::load_file(file.path()).unwrap();
    clear_env();
    assert_eq!(cfg.session.max_length, 512);
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = config::load_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn window_smaller_than_max_length_is_rejected() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env();
    let file = write_config("max_length = 4096\n[context]\nn_ctx = 1024\n");
    let err = config::load_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env();
    let file = write_config("max_length = [");
    let err = config::load_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}
