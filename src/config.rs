use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// ShellConfig
///
/// Holds the shell's entire configuration. Immutable once loaded and pulled
/// into the HTTP state via `FromRef`.
#[derive(Clone, Debug)]
pub struct ShellConfig {
    // Runtime environment marker. Controls log format and the mock-auth switch.
    pub env: Env,
    // Base URL of the Study Quest API that verifies credentials.
    pub api_base_url: String,
    // JSON file backing the persisted session keys.
    pub storage_path: PathBuf,
    // Where the shell's HTTP surface listens.
    pub bind_addr: SocketAddr,
    // Fabricate sessions locally instead of calling the API. Local only.
    pub mock_auth: bool,
}

/// Env
///
/// `local` favors developer convenience (pretty logs, optional mock login);
/// `production` demands an explicit API URL and logs JSON.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Env {
    /// The `APP_ENV` spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),
    #[error("{name} is not valid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_STORAGE_PATH: &str = "study-quest-storage.json";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

impl Default for ShellConfig {
    /// Safe values for tests; reads no environment variables.
    fn default() -> Self {
        Self {
            env: Env::Local,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            mock_auth: false,
        }
    }
}

impl ShellConfig {
    /// load
    ///
    /// Reads the configuration from environment variables (call `dotenv`
    /// first). Fails fast when production is missing its API URL or when a
    /// value does not parse.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let api_base_url = match (env, env::var("STUDY_QUEST_API_URL")) {
            (_, Ok(url)) if !url.trim().is_empty() => url.trim().to_string(),
            (Env::Production, _) => return Err(ConfigError::Missing("STUDY_QUEST_API_URL")),
            (Env::Local, _) => DEFAULT_API_BASE_URL.to_string(),
        };

        let storage_path = env::var("STUDY_QUEST_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORAGE_PATH));

        let bind_addr = env::var("STUDY_QUEST_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "STUDY_QUEST_BIND_ADDR",
                reason: e.to_string(),
            })?;

        // The mock login is a development convenience and is ignored in production.
        let mock_auth = env == Env::Local
            && matches!(
                env::var("STUDY_QUEST_MOCK_AUTH").as_deref(),
                Ok("1") | Ok("true")
            );

        Ok(Self {
            env,
            api_base_url,
            storage_path,
            bind_addr,
            mock_auth,
        })
    }
}
