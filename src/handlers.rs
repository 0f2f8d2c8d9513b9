use crate::{
    AppState, ShellConfig,
    auth::{ActiveSession, AuthError},
    leveling::{GameTimeExchange, LevelStats, PomodoroReward, RewardError},
    models::{LoginCredentials, LoginResponse, User, UserRole, UserUpdate},
    navigation::{self, NavigationResponse, RouteView},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// --- Request & Response Structs ---

#[derive(Debug, Deserialize, ToSchema)]
pub struct NavigateRequest {
    #[schema(example = "/student/quest")]
    pub path: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AmountRequest {
    pub amount: u32,
}

/// PomodoroRequest
///
/// A finished study session. `subject` is informational only.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PomodoroRequest {
    #[serde(default)]
    pub subject: Option<String>,
    /// Seconds.
    pub duration: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GameTimeRequest {
    pub hours: u32,
}

/// SessionSnapshot
///
/// The session as the view layer sees it. The token stays inside the shell.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub role: Option<UserRole>,
    pub user: Option<User>,
}

/// HealthStatus
///
/// Liveness answer, with enough of the configuration to tell how the shell was started.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub env: String,
    pub mock_auth: bool,
}

/// health
///
/// [Public Route] Liveness probe for whatever hosts the shell.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Shell is up", body = HealthStatus))
)]
pub async fn health(State(config): State<ShellConfig>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        env: config.env.as_str().to_string(),
        mock_auth: config.mock_auth,
    })
}

// --- Navigation Handlers ---

/// list_routes
///
/// [Public Route] The full route table with its access metadata.
#[utoipa::path(
    get,
    path = "/navigation/routes",
    responses((status = 200, description = "Route table", body = [RouteView]))
)]
pub async fn list_routes() -> Json<Vec<RouteView>> {
    Json(navigation::ROUTES.iter().map(RouteView::from).collect())
}

/// current_location
///
/// [Public Route] Where the shell currently is and the title on display.
#[utoipa::path(
    get,
    path = "/navigation",
    responses((status = 200, description = "Current location", body = NavigationResponse))
)]
pub async fn current_location(State(state): State<AppState>) -> Json<NavigationResponse> {
    let navigator = state.navigator.lock().await;
    Json(navigator.snapshot())
}

/// navigate
///
/// [Public Route] Runs the navigation guard for `path` and follows any redirect.
/// A denied navigation is still a 200: the body says where the shell landed.
#[utoipa::path(
    post,
    path = "/navigation",
    request_body = NavigateRequest,
    responses((status = 200, description = "Navigation outcome", body = NavigationResponse))
)]
pub async fn navigate(
    State(state): State<AppState>,
    Json(payload): Json<NavigateRequest>,
) -> Json<NavigationResponse> {
    let mut navigator = state.navigator.lock().await;
    Json(navigator.navigate(&payload.path))
}

// --- Session Handlers ---

/// get_session
///
/// [Public Route] Snapshot of the active session, if any.
#[utoipa::path(
    get,
    path = "/session",
    responses((status = 200, description = "Session snapshot", body = SessionSnapshot))
)]
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    let store = state.session.lock().await;
    Json(SessionSnapshot {
        authenticated: store.is_authenticated(),
        role: store.user_role(),
        user: store.current_user().cloned(),
    })
}

/// login
///
/// [Public Route] Verifies the credentials and starts a session.
/// Failures come back as `{ success: false, error }` with a matching status.
#[utoipa::path(
    post,
    path = "/session/login",
    request_body = LoginCredentials,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Rejected credentials or role", body = LoginResponse),
        (status = 422, description = "Malformed credentials", body = LoginResponse),
        (status = 403, description = "Account disabled", body = LoginResponse),
        (status = 502, description = "Authentication service failure", body = LoginResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginCredentials>, JsonRejection>,
) -> (StatusCode, Json<LoginResponse>) {
    // A malformed body (unknown role included) is still a structured failure.
    let credentials = match payload {
        Ok(Json(credentials)) => credentials,
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "login body rejected");
            return (
                rejection.status(),
                Json(LoginResponse::failure(rejection.body_text())),
            );
        }
    };

    let result = state.session.lock().await.login(&credentials).await;

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(AuthError::InvalidCredentials | AuthError::RoleMismatch { .. }) => StatusCode::UNAUTHORIZED,
        Err(AuthError::AccountDisabled) => StatusCode::FORBIDDEN,
        Err(AuthError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        Err(_) => StatusCode::BAD_GATEWAY,
    };

    (status, Json(LoginResponse::from(result)))
}

/// logout
///
/// [Public Route] Ends the session. Idempotent.
#[utoipa::path(
    post,
    path = "/session/logout",
    responses((status = 204, description = "Logged out"))
)]
pub async fn logout(State(state): State<AppState>) -> StatusCode {
    state.session.lock().await.logout();
    StatusCode::NO_CONTENT
}

/// update_user
///
/// [Session Route] Merges a partial user record into the active session.
#[utoipa::path(
    patch,
    path = "/session/user",
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 401, description = "No active session")
    )
)]
pub async fn update_user(
    _session: ActiveSession,
    State(state): State<AppState>,
    Json(updates): Json<UserUpdate>,
) -> Result<Json<User>, StatusCode> {
    let mut store = state.session.lock().await;
    store.update_user_info(updates);
    current_user(store.current_user())
}

/// add_gold
///
/// [Session Route] Credits gold to the active user.
#[utoipa::path(
    post,
    path = "/session/gold",
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 401, description = "No active session")
    )
)]
pub async fn add_gold(
    _session: ActiveSession,
    State(state): State<AppState>,
    Json(payload): Json<AmountRequest>,
) -> Result<Json<User>, StatusCode> {
    let mut store = state.session.lock().await;
    store.add_gold_coins(payload.amount);
    current_user(store.current_user())
}

/// add_experience
///
/// [Session Route] Credits experience; may level the user up.
#[utoipa::path(
    post,
    path = "/session/experience",
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 401, description = "No active session")
    )
)]
pub async fn add_experience(
    _session: ActiveSession,
    State(state): State<AppState>,
    Json(payload): Json<AmountRequest>,
) -> Result<Json<User>, StatusCode> {
    let mut store = state.session.lock().await;
    store.add_experience(payload.amount);
    current_user(store.current_user())
}

/// get_stats
///
/// [Session Route] Level progress of the active user.
#[utoipa::path(
    get,
    path = "/session/stats",
    responses(
        (status = 200, description = "Level statistics", body = LevelStats),
        (status = 401, description = "No active session")
    )
)]
pub async fn get_stats(
    _session: ActiveSession,
    State(state): State<AppState>,
) -> Result<Json<LevelStats>, StatusCode> {
    let store = state.session.lock().await;
    store.level_stats().map(Json).ok_or(StatusCode::UNAUTHORIZED)
}

/// complete_pomodoro
///
/// [Session Route] Pays out a finished study session.
#[utoipa::path(
    post,
    path = "/session/pomodoro",
    request_body = PomodoroRequest,
    responses(
        (status = 200, description = "Reward granted", body = PomodoroReward),
        (status = 401, description = "No active session")
    )
)]
pub async fn complete_pomodoro(
    _session: ActiveSession,
    State(state): State<AppState>,
    Json(payload): Json<PomodoroRequest>,
) -> Result<Json<PomodoroReward>, StatusCode> {
    let mut store = state.session.lock().await;
    let reward = store
        .complete_pomodoro(payload.duration)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    tracing::info!(
        subject = payload.subject.as_deref().unwrap_or("unspecified"),
        experience = reward.experience_gained,
        gold = reward.gold_gained,
        "pomodoro completed"
    );
    Ok(Json(reward))
}

/// exchange_game_time
///
/// [Session Route] Spends gold on game time (1 to 4 hours, 30 gold per hour).
#[utoipa::path(
    post,
    path = "/session/exchange/game-time",
    request_body = GameTimeRequest,
    responses(
        (status = 200, description = "Exchange completed", body = GameTimeExchange),
        (status = 400, description = "Invalid hours or not enough gold"),
        (status = 401, description = "No active session")
    )
)]
pub async fn exchange_game_time(
    _session: ActiveSession,
    State(state): State<AppState>,
    Json(payload): Json<GameTimeRequest>,
) -> Result<Json<GameTimeExchange>, StatusCode> {
    let mut store = state.session.lock().await;
    match store.exchange_game_time(payload.hours) {
        Ok(exchange) => Ok(Json(exchange)),
        Err(RewardError::NoSession) => Err(StatusCode::UNAUTHORIZED),
        Err(e) => {
            tracing::debug!(error = %e, "game time exchange refused");
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

// The session can be cleared between the extractor and the handler.
fn current_user(user: Option<&User>) -> Result<Json<User>, StatusCode> {
    user.cloned().map(Json).ok_or(StatusCode::UNAUTHORIZED)
}
