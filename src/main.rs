use std::process::ExitCode;
use std::sync::Arc;

use study_quest_shell::{
    AppState, AuthState, FileStore, HttpAuthClient, MockAuthService, Navigator, SessionStore,
    StorageState,
    config::{Env, ShellConfig},
    create_router,
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Boots the shell: configuration, logging, persistent storage, the
/// authentication collaborator, the restored session, then the HTTP surface.
#[tokio::main]
async fn main() -> ExitCode {
    // 1. Configuration (fail fast on a bad environment)
    dotenv::dotenv().ok();
    let config = match ShellConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            return ExitCode::FAILURE;
        }
    };

    // 2. Logging: pretty for local work, JSON in production.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "study_quest_shell=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Shell starting in {:?} mode", config.env);

    // 3. Persistent storage and the authentication collaborator.
    let storage: StorageState = Arc::new(FileStore::open(&config.storage_path));
    tracing::info!(path = %config.storage_path.display(), "session storage opened");

    let auth: AuthState = if config.mock_auth {
        tracing::warn!("mock authentication enabled, any credentials will be accepted");
        Arc::new(MockAuthService::new())
    } else {
        Arc::new(HttpAuthClient::new(&config.api_base_url))
    };

    // 4. Session store, restored from the previous run if possible.
    let mut store = SessionStore::new(storage.clone(), auth);
    if store.initialize_from_storage() {
        tracing::info!("previous session restored");
    }

    let app_state = AppState {
        session: store.into_state(),
        navigator: Navigator::new(storage).into_state(),
        config: config.clone(),
    };

    // 5. HTTP surface.
    let app = create_router(app_state);

    let listener = match TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.bind_addr, error = %e, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Listening on {}", config.bind_addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", config.bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server stopped");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
