use serial_test::serial;
use std::{env, panic, path::PathBuf};
use study_quest_shell::{
    ShellConfig,
    config::{ConfigError, DEFAULT_API_BASE_URL, DEFAULT_STORAGE_PATH, Env},
};

const CONFIG_VARS: [&str; 5] = [
    "APP_ENV",
    "STUDY_QUEST_API_URL",
    "STUDY_QUEST_STORAGE_PATH",
    "STUDY_QUEST_BIND_ADDR",
    "STUDY_QUEST_MOCK_AUTH",
];

// --- Setup/Teardown Utilities ---

/// Runs `test` with exactly the given variables set (every other config
/// variable cleared), then restores the previous environment.
fn run_with_env<T, R>(vars: &[(&'static str, &'static str)], test: T) -> R
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    let originals: Vec<(&str, Option<String>)> = CONFIG_VARS
        .iter()
        .map(|&var| (var, env::var(var).ok()))
        .collect();

    unsafe {
        for var in CONFIG_VARS {
            env::remove_var(var);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    let result = panic::catch_unwind(test);

    for (key, original_value) in originals.into_iter().rev() {
        unsafe {
            if let Some(val) = original_value {
                env::set_var(key, val);
            } else {
                env::remove_var(key);
            }
        }
    }

    match result {
        Ok(value) => value,
        Err(e) => panic::resume_unwind(e),
    }
}

// --- Tests ---

#[test]
#[serial]
fn test_config_production_requires_api_url() {
    let result = run_with_env(&[("APP_ENV", "production")], ShellConfig::load);

    assert_eq!(result.unwrap_err(), ConfigError::Missing("STUDY_QUEST_API_URL"));
}

#[test]
#[serial]
fn test_config_production_with_api_url() {
    let config = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("STUDY_QUEST_API_URL", "https://api.study-quest.example"),
        ],
        ShellConfig::load,
    )
    .unwrap();

    assert_eq!(config.env, Env::Production);
    assert_eq!(config.api_base_url, "https://api.study-quest.example");
}

#[test]
#[serial]
fn test_config_local_env_defaults() {
    let config = run_with_env(&[("APP_ENV", "local")], ShellConfig::load).unwrap();

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    assert_eq!(config.storage_path, PathBuf::from(DEFAULT_STORAGE_PATH));
    assert_eq!(config.bind_addr.to_string(), "127.0.0.1:3000");
    assert!(!config.mock_auth);
}

#[test]
#[serial]
fn test_config_overrides() {
    let config = run_with_env(
        &[
            ("STUDY_QUEST_STORAGE_PATH", "/tmp/quest/session.json"),
            ("STUDY_QUEST_BIND_ADDR", "0.0.0.0:8080"),
            ("STUDY_QUEST_MOCK_AUTH", "true"),
        ],
        ShellConfig::load,
    )
    .unwrap();

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.storage_path, PathBuf::from("/tmp/quest/session.json"));
    assert_eq!(config.bind_addr.port(), 8080);
    assert!(config.mock_auth);
}

#[test]
#[serial]
fn test_config_invalid_bind_address() {
    let result = run_with_env(&[("STUDY_QUEST_BIND_ADDR", "not-an-address")], ShellConfig::load);

    assert!(matches!(
        result,
        Err(ConfigError::Invalid {
            name: "STUDY_QUEST_BIND_ADDR",
            ..
        })
    ));
}

#[test]
#[serial]
fn test_config_mock_auth_ignored_in_production() {
    let config = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("STUDY_QUEST_API_URL", "https://api.study-quest.example"),
            ("STUDY_QUEST_MOCK_AUTH", "1"),
        ],
        ShellConfig::load,
    )
    .unwrap();

    assert!(!config.mock_auth);
}
