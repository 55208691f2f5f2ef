use activity_tracker::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        for key in [
            "TRACKER_PROFILE",
            "TRACKER_API_BIND_ADDR",
            "TRACKER_LOG_LEVEL",
            "TRACKER_WINDOW_DAYS",
            "TRACKER_MAX_EVENTS",
            "TRACKER_GITHUB_TOKEN",
            "TRACKER_INGEST_INTERVAL_SECONDS",
        ] {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "127.0.0.1:5000");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.window_days, 7);
    assert_eq!(cfg.max_events, 500);
    assert_eq!(cfg.repositories_path, PathBuf::from("data/repositories.json"));
    assert_eq!(cfg.ingest_interval_seconds, 0);
    assert!(cfg.github_token.is_none());
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "TRACKER_API_BIND_ADDR=127.0.0.1:3000\nTRACKER_MAX_EVENTS=100\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test",
        "TRACKER_API_BIND_ADDR=192.168.0.10:5000\nTRACKER_WINDOW_DAYS=3\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "TRACKER_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "TRACKER_PROFILE=test\nTRACKER_API_BIND_ADDR=127.0.0.1:4000\nUNRELATED_KEY=ignored\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.window_days, 3);
    assert_eq!(cfg.max_events, 100);
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "TRACKER_API_BIND_ADDR=127.0.0.1:3000\nTRACKER_GITHUB_TOKEN=from-file\n",
    );

    unsafe {
        env::set_var("TRACKER_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("TRACKER_GITHUB_TOKEN", "from-env");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.github_token.as_deref(), Some("from-env"));
    assert!(!cfg.redacted_json().unwrap().contains("from-env"));

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("TRACKER_API_BIND_ADDR", "not-an-addr");
    }
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn short_ingest_interval_is_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("TRACKER_INGEST_INTERVAL_SECONDS", "30");
    }
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("30 s interval should fail");
    assert!(matches!(err, ConfigError::InvalidIngestInterval { value: 30 }));

    clear_env();
}

#[test]
fn non_numeric_limits_are_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "TRACKER_WINDOW_DAYS=a-week\n");
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("non-numeric window should fail");
    assert!(matches!(
        err,
        ConfigError::InvalidNumber {
            key: "WINDOW_DAYS",
            ..
        }
    ));

    clear_env();
}
