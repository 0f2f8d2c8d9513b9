use axum::{
    Json, Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use utoipa::OpenApi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Client shell core: persistence, identity, progression and navigation.
pub mod auth;
pub mod config;
pub mod leveling;
pub mod models;
pub mod navigation;
pub mod session;
pub mod storage;

// HTTP surface that lets a view layer drive the shell.
pub mod handlers;
pub mod routes;
use auth::ActiveSession;
use routes::{public, session as session_routes};

// --- Public Re-exports ---

pub use auth::{AuthService, AuthState, HttpAuthClient, MockAuthService};
pub use config::ShellConfig;
pub use navigation::{Navigator, NavigatorState};
pub use session::{SessionState, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageState};

/// ApiDoc
///
/// OpenAPI document for the shell's HTTP surface, served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::list_routes, handlers::current_location, handlers::navigate,
        handlers::get_session, handlers::login, handlers::logout,
        handlers::update_user, handlers::add_gold, handlers::add_experience,
        handlers::get_stats, handlers::complete_pomodoro, handlers::exchange_game_time,
    ),
    components(
        schemas(
            models::User, models::UserRole, models::UserUpdate, models::LoginCredentials,
            models::LoginResponse, models::Quest, models::QuestCategory, models::QuestProgress,
            models::Subject, models::Difficulty, models::QuestType,
            leveling::LevelStats, leveling::PomodoroReward, leveling::GameTimeExchange,
            navigation::NavigationResponse, navigation::RouteView,
            handlers::NavigateRequest, handlers::AmountRequest, handlers::PomodoroRequest,
            handlers::GameTimeRequest, handlers::SessionSnapshot, handlers::HealthStatus,
        )
    ),
    tags(
        (name = "study-quest-shell", description = "Study Quest client shell")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Everything the HTTP handlers share: the single session store, the
/// navigator, and the loaded configuration. Both stateful parts sit behind
/// their own mutex, so requests are applied one at a time.
#[derive(Clone)]
pub struct AppState {
    pub session: SessionState,
    pub navigator: NavigatorState,
    pub config: ShellConfig,
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.session.clone()
    }
}

impl FromRef<AppState> for NavigatorState {
    fn from_ref(app_state: &AppState) -> NavigatorState {
        app_state.navigator.clone()
    }
}

impl FromRef<AppState> for ShellConfig {
    fn from_ref(app_state: &AppState) -> ShellConfig {
        app_state.config.clone()
    }
}

/// session_middleware
///
/// Gate for the session routes. Extracting `ActiveSession` rejects with 401
/// when nobody is logged in, so the handler never runs.
async fn session_middleware(_session: ActiveSession, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the shell's routes, middleware and shared state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(public::public_routes())
        .merge(
            session_routes::session_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                session_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span per request carrying method, URI and the `x-request-id` set above.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
