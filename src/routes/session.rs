use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Session Router Module
///
/// Mutators of the active session. Every route here sits behind the
/// `ActiveSession` middleware in `create_router`, so handlers only run while
/// somebody is logged in.
pub fn session_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // PATCH /session/user
        // Partial profile update (nickname, avatar, ...).
        .route("/session/user", patch(handlers::update_user))
        // POST /session/gold {amount}
        .route("/session/gold", post(handlers::add_gold))
        // POST /session/experience {amount}
        // Recomputes the level; a level-up adds the 50 gold bonus once.
        .route("/session/experience", post(handlers::add_experience))
        // GET /session/stats
        .route("/session/stats", get(handlers::get_stats))
        // POST /session/pomodoro {subject?, duration}
        .route("/session/pomodoro", post(handlers::complete_pomodoro))
        // POST /session/exchange/game-time {hours}
        .route(
            "/session/exchange/game-time",
            post(handlers::exchange_game_time),
        )
}
