use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that work with or without an active session. Navigation lives
/// here because the guard itself decides what an anonymous caller may reach.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness plus the environment and auth mode the shell runs with.
        .route("/health", get(handlers::health))
        // GET /navigation/routes
        // The static route table, titles and access metadata included.
        .route("/navigation/routes", get(handlers::list_routes))
        // GET /navigation  | POST /navigation {path}
        // Current location, or run the guard against a new target.
        .route(
            "/navigation",
            get(handlers::current_location).post(handlers::navigate),
        )
        // GET /session
        .route("/session", get(handlers::get_session))
        // POST /session/login
        // Verifies credentials with the authentication service and persists the session.
        .route("/session/login", post(handlers::login))
        // POST /session/logout
        .route("/session/logout", post(handlers::logout))
}
