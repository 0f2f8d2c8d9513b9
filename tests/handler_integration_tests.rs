use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
};
use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use study_quest_shell::{
    AppState, MockAuthService, MemoryStore, Navigator, SessionStore, ShellConfig,
    auth::{AuthError, AuthService, AuthSession},
    create_router, handlers,
    leveling::{GameTimeExchange, LevelStats, PomodoroReward},
    models::{LoginCredentials, LoginResponse, User, UserRole},
    navigation::{NavigationResponse, RouteView},
    storage::{KeyValueStore, TOKEN_KEY},
};
use tower::ServiceExt;

// --- TEST UTILITIES ---

// Builds an AppState over in-memory storage and the given auth collaborator.
fn create_test_state(storage: Arc<MemoryStore>, auth: impl AuthService + 'static) -> AppState {
    AppState {
        session: SessionStore::new(storage.clone(), Arc::new(auth)).into_state(),
        navigator: Navigator::new(storage).into_state(),
        config: ShellConfig::default(),
    }
}

fn test_app() -> (Router, Arc<MemoryStore>) {
    let storage = Arc::new(MemoryStore::new());
    let app = create_router(create_test_state(storage.clone(), MockAuthService::new()));
    (app, storage)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn send_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login_as(app: &Router, role: &str) -> LoginResponse {
    let response = app
        .clone()
        .oneshot(send_json(
            "POST",
            "/session/login",
            json!({ "username": "alice", "password": "pw", "role": role }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await
}

// --- PUBLIC ROUTES ---

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app();
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: handlers::HealthStatus = read_json(response).await;
    assert_eq!(health.status, "ok");
    assert_eq!(health.env, "local");
    assert!(!health.mock_auth);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let (app, _) = test_app();
    let response = app.oneshot(get("/health")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_served() {
    let (app, _) = test_app();
    let response = app.oneshot(get("/api-docs/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let doc: Value = read_json(response).await;
    assert!(doc["paths"]["/session/login"].is_object());
    assert!(doc["paths"]["/navigation"].is_object());
}

#[tokio::test]
async fn test_route_table_listed() {
    let (app, _) = test_app();
    let response = app.oneshot(get("/navigation/routes")).await.unwrap();
    let routes: Vec<RouteView> = read_json(response).await;

    assert_eq!(routes.len(), 8);
    let shop = routes.iter().find(|route| route.path == "/student/shop").unwrap();
    assert!(shop.requires_auth);
    assert_eq!(shop.role, Some(UserRole::Student));
}

#[tokio::test]
async fn test_navigation_before_and_after_login() {
    let (app, _) = test_app();

    let response = app
        .clone()
        .oneshot(send_json("POST", "/navigation", json!({ "path": "/student/quest" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let denied: NavigationResponse = read_json(response).await;
    assert!(denied.redirected);
    assert_eq!(denied.location, "/login");

    login_as(&app, "student").await;

    let response = app
        .clone()
        .oneshot(send_json("POST", "/navigation", json!({ "path": "/student/quest" })))
        .await
        .unwrap();
    let allowed: NavigationResponse = read_json(response).await;
    assert!(!allowed.redirected);
    assert_eq!(allowed.location, "/student/quest");
    assert_eq!(allowed.title.as_deref(), Some("任务地图"));

    let response = app.oneshot(get("/navigation")).await.unwrap();
    let current: NavigationResponse = read_json(response).await;
    assert_eq!(current.location, "/student/quest");
}

// --- LOGIN / LOGOUT ---

#[tokio::test]
async fn test_login_success_persists_session() {
    let (app, storage) = test_app();

    let body = login_as(&app, "parent").await;
    assert!(body.success);
    assert_eq!(body.user.as_ref().map(|user| user.role), Some(UserRole::Parent));
    assert!(storage.get(TOKEN_KEY).is_some());

    let response = app.oneshot(get("/session")).await.unwrap();
    let snapshot: handlers::SessionSnapshot = read_json(response).await;
    assert!(snapshot.authenticated);
    assert_eq!(snapshot.role, Some(UserRole::Parent));
}

#[tokio::test]
async fn test_login_failure_shape() {
    let storage = Arc::new(MemoryStore::new());
    let app = create_router(create_test_state(storage.clone(), MockAuthService::new_failing()));

    let response = app
        .oneshot(send_json(
            "POST",
            "/session/login",
            json!({ "username": "alice", "password": "nope", "role": "student" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: Value = read_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body.get("user").is_none());
    assert!(body["error"].is_string());
    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_login_rejects_unknown_role() {
    let (app, _) = test_app();
    let response = app
        .oneshot(send_json(
            "POST",
            "/session/login",
            json!({ "username": "alice", "password": "pw", "role": "admin" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: LoginResponse = read_json(response).await;
    assert!(!body.success);
    assert!(body.user.is_none());
    assert!(body.error.is_some_and(|error| error.contains("admin")));
}

// Auth collaborator that hands out a JWT which has already expired.
struct ExpiredTokenAuth;

#[async_trait]
impl AuthService for ExpiredTokenAuth {
    async fn authenticate(&self, credentials: &LoginCredentials) -> Result<AuthSession, AuthError> {
        let mut session = MockAuthService::new().authenticate(credentials).await?;
        let claims = json!({ "sub": session.user.id, "exp": chrono::Utc::now().timestamp() - 5 });
        session.token =
            encode(&Header::default(), &claims, &EncodingKey::from_secret(b"api-secret")).unwrap();
        Ok(session)
    }
}

#[tokio::test]
async fn test_expired_session_token_is_refused() {
    let app = create_router(create_test_state(Arc::new(MemoryStore::new()), ExpiredTokenAuth));
    login_as(&app, "student").await;

    let response = app
        .oneshot(send_json("POST", "/session/gold", json!({ "amount": 10 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let (app, storage) = test_app();
    login_as(&app, "student").await;

    let response = app
        .clone()
        .oneshot(send_json("POST", "/session/logout", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(storage.is_empty());

    let response = app.oneshot(get("/session/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// --- SESSION ROUTES ---

#[tokio::test]
async fn test_session_routes_require_login() {
    let (app, _) = test_app();

    let response = app.clone().oneshot(get("/session/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(send_json("POST", "/session/gold", json!({ "amount": 10 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_add_experience_levels_up_once() {
    let (app, _) = test_app();
    login_as(&app, "student").await;

    let response = app
        .oneshot(send_json("POST", "/session/experience", json!({ "amount": 250 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let user: User = read_json(response).await;
    assert_eq!(user.experience, 250);
    assert_eq!(user.level, 3);
    assert_eq!(user.gold_coins, 150);
}

#[tokio::test]
async fn test_update_user_nickname() {
    let (app, _) = test_app();
    login_as(&app, "student").await;

    let response = app
        .oneshot(send_json("PATCH", "/session/user", json!({ "nickname": "Ace" })))
        .await
        .unwrap();
    let user: User = read_json(response).await;
    assert_eq!(user.nickname, "Ace");
    assert_eq!(user.username, "alice");
}

#[tokio::test]
async fn test_pomodoro_then_stats() {
    let (app, _) = test_app();
    login_as(&app, "student").await;

    let response = app
        .clone()
        .oneshot(send_json(
            "POST",
            "/session/pomodoro",
            json!({ "subject": "math", "duration": 1500 }),
        ))
        .await
        .unwrap();
    let reward: PomodoroReward = read_json(response).await;
    assert_eq!(reward.experience_gained, 25);
    assert_eq!(reward.gold_gained, 10);

    let response = app.oneshot(get("/session/stats")).await.unwrap();
    let stats: LevelStats = read_json(response).await;
    assert_eq!(stats.experience, 25);
    assert_eq!(stats.experience_to_next_level, 75);
}

#[tokio::test]
async fn test_exchange_game_time() {
    let (app, _) = test_app();
    login_as(&app, "student").await;

    let response = app
        .clone()
        .oneshot(send_json("POST", "/session/exchange/game-time", json!({ "hours": 5 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(send_json("POST", "/session/exchange/game-time", json!({ "hours": 2 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let exchange: GameTimeExchange = read_json(response).await;
    assert_eq!(exchange.gold_spent, 60);
    assert_eq!(exchange.remaining_gold, 40);
}

// --- DIRECT HANDLER CALLS ---

#[tokio::test]
async fn test_get_session_handler_without_login() {
    let state = create_test_state(Arc::new(MemoryStore::new()), MockAuthService::new());

    let Json(snapshot) = handlers::get_session(State(state)).await;

    assert!(!snapshot.authenticated);
    assert!(snapshot.role.is_none());
    assert!(snapshot.user.is_none());
}

#[tokio::test]
async fn test_list_routes_handler() {
    let Json(routes) = handlers::list_routes().await;
    assert_eq!(routes.iter().filter(|route| !route.requires_auth).count(), 2);
}
