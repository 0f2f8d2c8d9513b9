use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::dangerous;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    models::{LoginCredentials, LoginResponse, User, UserRole},
    session::SessionState,
    storage::StorageError,
};

/// AuthError
///
/// Every way a login can fail. The session store returns it as a typed
/// error; the HTTP layer folds it into a `LoginResponse { success: false }`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("account is disabled")]
    AccountDisabled,
    #[error("account has role {actual}, not the requested {requested}")]
    RoleMismatch {
        requested: UserRole,
        actual: UserRole,
    },
    #[error("authentication service answered with status {0}")]
    UnexpectedStatus(u16),
    #[error("authentication service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("authentication service sent an invalid response: {0}")]
    InvalidResponse(String),
    #[error("session could not be persisted: {0}")]
    Storage(#[from] StorageError),
}

impl From<Result<User, AuthError>> for LoginResponse {
    fn from(result: Result<User, AuthError>) -> Self {
        match result {
            Ok(user) => LoginResponse::success(user),
            Err(e) => LoginResponse::failure(e.to_string()),
        }
    }
}

/// AuthSession
///
/// What a successful authentication hands back to the session store.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

// 1. AuthService Contract
/// AuthService
///
/// The external authentication collaborator invoked at `SessionStore::login`.
/// The HTTP client talks to the Study Quest API; the mock fabricates a
/// session locally for development and tests.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn authenticate(&self, credentials: &LoginCredentials) -> Result<AuthSession, AuthError>;
}

/// AuthState
///
/// The shared handle to the authentication collaborator.
pub type AuthState = Arc<dyn AuthService>;

// 2. The Real Implementation (Study Quest API)

#[derive(Serialize)]
struct LoginRequestBody<'a> {
    username: &'a str,
    password: &'a str,
    role: UserRole,
}

/// Body of `POST /api/auth/login-json`.
#[derive(Deserialize)]
struct ApiToken {
    access_token: String,
    role: String,
}

/// Body of `GET /api/auth/me`. Snake-case, integer id, nullable display fields.
#[derive(Deserialize)]
struct ApiUser {
    id: i64,
    username: String,
    role: String,
    nickname: Option<String>,
    avatar: Option<String>,
    level: u32,
    experience: u32,
    gold_coins: u32,
    created_at: DateTime<Utc>,
}

impl ApiUser {
    fn into_user(self) -> Result<User, AuthError> {
        let role = self
            .role
            .parse::<UserRole>()
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        Ok(User {
            id: self.id.to_string(),
            nickname: self.nickname.unwrap_or_else(|| self.username.clone()),
            username: self.username,
            role,
            avatar: self.avatar.unwrap_or_default(),
            level: self.level,
            experience: self.experience,
            gold_coins: self.gold_coins,
            created_at: self.created_at,
        })
    }
}

/// HttpAuthClient
///
/// Verifies credentials against the Study Quest API in two steps: exchange
/// the credentials for a bearer token, then fetch the account record with it.
#[derive(Clone)]
pub struct HttpAuthClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AuthService for HttpAuthClient {
    async fn authenticate(&self, credentials: &LoginCredentials) -> Result<AuthSession, AuthError> {
        let response = self
            .client
            .post(format!("{}/api/auth/login-json", self.base_url))
            .json(&LoginRequestBody {
                username: &credentials.username,
                password: &credentials.password,
                role: credentials.role,
            })
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AuthError::InvalidCredentials);
        }
        if status == reqwest::StatusCode::BAD_REQUEST {
            // The API only answers 400 here for disabled accounts.
            return Err(AuthError::AccountDisabled);
        }
        if !status.is_success() {
            return Err(AuthError::UnexpectedStatus(status.as_u16()));
        }

        let token = response
            .json::<ApiToken>()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        let actual = token
            .role
            .parse::<UserRole>()
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        if actual != credentials.role {
            return Err(AuthError::RoleMismatch {
                requested: credentials.role,
                actual,
            });
        }

        let me = self
            .client
            .get(format!("{}/api/auth/me", self.base_url))
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        if !me.status().is_success() {
            return Err(AuthError::UnexpectedStatus(me.status().as_u16()));
        }

        let user = me
            .json::<ApiUser>()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?
            .into_user()?;

        Ok(AuthSession {
            token: token.access_token,
            user,
        })
    }
}

// 3. The Mock Implementation (Local development and tests)
/// MockAuthService
///
/// Accepts any credentials and fabricates a fresh level-1 account with 100
/// gold and a `mock-token-<millis>` token.
#[derive(Clone, Default)]
pub struct MockAuthService {
    /// When true, every login is rejected as invalid credentials.
    pub should_fail: bool,
}

impl MockAuthService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl AuthService for MockAuthService {
    async fn authenticate(&self, credentials: &LoginCredentials) -> Result<AuthSession, AuthError> {
        if self.should_fail {
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        let user = User {
            id: "1".to_string(),
            username: credentials.username.clone(),
            role: credentials.role,
            nickname: credentials.username.clone(),
            avatar: String::new(),
            level: 1,
            experience: 0,
            gold_coins: 100,
            created_at: now,
        };

        Ok(AuthSession {
            token: format!("mock-token-{}", now.timestamp_millis()),
            user,
        })
    }
}

// --- Token Inspection ---

/// token_is_expired
///
/// True only for a JWT whose `exp` claim is in the past, with no leeway. The
/// signature is not checked (the shell holds no secret); opaque tokens and
/// JWTs without a numeric `exp` count as unexpired.
pub fn token_is_expired(token: &str) -> bool {
    let Ok(data) = dangerous::insecure_decode::<serde_json::Value>(token) else {
        return false;
    };

    data.claims
        .get("exp")
        .and_then(serde_json::Value::as_f64)
        .is_some_and(|exp| exp < Utc::now().timestamp() as f64)
}

// --- Session Extractor ---

/// ActiveSession
///
/// Resolves the user of the active session for a shell request.
/// Rejects with 401 when nobody is logged in or the session token has expired.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub user: User,
}

impl<S> FromRequestParts<S> for ActiveSession
where
    S: Send + Sync,
    SessionState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = SessionState::from_ref(state);
        let store = session.lock().await;

        // A token that lapsed while the shell was running no longer counts.
        let token_live = store.token().is_some_and(|token| !token_is_expired(token));
        if !store.is_authenticated() || !token_live {
            return Err(StatusCode::UNAUTHORIZED);
        }

        store
            .current_user()
            .cloned()
            .map(|user| ActiveSession { user })
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
