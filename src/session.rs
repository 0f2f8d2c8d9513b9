use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    auth::{self, AuthError, AuthSession, AuthState},
    leveling::{
        self, GameTimeExchange, LEVEL_UP_BONUS, LevelStats, PomodoroReward, RewardError,
    },
    models::{LoginCredentials, User, UserRole, UserUpdate},
    storage::{SESSION_KEYS, StorageError, StorageState, TOKEN_KEY, USER_INFO_KEY, USER_ROLE_KEY},
};

/// SessionStore
///
/// Owns the current user, the session token and the authenticated flag, and
/// mirrors all three into the injected storage. Created once at startup with
/// its collaborators; reset (not dropped) on logout.
///
/// Every mutator writes the whole `userInfo` record back as its last step.
pub struct SessionStore {
    storage: StorageState,
    auth: AuthState,
    current_user: Option<User>,
    token: Option<String>,
    is_authenticated: bool,
}

/// SessionState
///
/// The single store shared by the shell's HTTP handlers. The mutex serializes
/// every session operation.
pub type SessionState = Arc<Mutex<SessionStore>>;

impl SessionStore {
    pub fn new(storage: StorageState, auth: AuthState) -> Self {
        Self {
            storage,
            auth,
            current_user: None,
            token: None,
            is_authenticated: false,
        }
    }

    pub fn into_state(self) -> SessionState {
        Arc::new(Mutex::new(self))
    }

    // --- Derived Views ---

    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn user_role(&self) -> Option<UserRole> {
        self.current_user.as_ref().map(|user| user.role)
    }

    pub fn is_student(&self) -> bool {
        self.user_role() == Some(UserRole::Student)
    }

    pub fn is_parent(&self) -> bool {
        self.user_role() == Some(UserRole::Parent)
    }

    pub fn is_teacher(&self) -> bool {
        self.user_role() == Some(UserRole::Teacher)
    }

    // --- Actions ---

    /// login
    ///
    /// Verifies `credentials` with the authentication collaborator, then
    /// persists token, role and user record before marking the session active.
    /// On any failure both the in-memory session and the persisted keys are
    /// left exactly as they were.
    pub async fn login(&mut self, credentials: &LoginCredentials) -> Result<User, AuthError> {
        let AuthSession { token, user } = match self.auth.authenticate(credentials).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(username = %credentials.username, error = %e, "login rejected");
                return Err(e);
            }
        };

        let record = serde_json::to_string(&user).map_err(StorageError::from)?;
        self.persist_session([
            (TOKEN_KEY, token.as_str()),
            (USER_ROLE_KEY, user.role.as_str()),
            (USER_INFO_KEY, record.as_str()),
        ])?;

        tracing::info!(username = %user.username, role = %user.role, "session started");

        self.current_user = Some(user.clone());
        self.token = Some(token);
        self.is_authenticated = true;

        Ok(user)
    }

    /// logout
    ///
    /// Clears the in-memory session and removes every persisted session key.
    pub fn logout(&mut self) {
        if let Some(user) = self.current_user.take() {
            tracing::info!(username = %user.username, "session ended");
        }
        self.token = None;
        self.is_authenticated = false;

        for key in SESSION_KEYS {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!(key, error = %e, "failed to remove persisted session key");
            }
        }
    }

    /// update_user_info
    ///
    /// Merges `updates` into the current user. No-op without an active session.
    pub fn update_user_info(&mut self, updates: UserUpdate) {
        let Some(user) = self.current_user.as_mut() else {
            return;
        };

        let previous_role = user.role;
        updates.apply_to(user);
        let role = user.role;

        if role != previous_role {
            self.write(USER_ROLE_KEY, role.as_str());
        }
        self.persist_user();
    }

    pub fn add_gold_coins(&mut self, amount: u32) {
        let Some(user) = self.current_user.as_mut() else {
            return;
        };

        user.gold_coins = user.gold_coins.saturating_add(amount);
        self.persist_user();
    }

    /// add_experience
    ///
    /// Adds experience and recomputes the level. Raising the level grants a
    /// single `LEVEL_UP_BONUS`, however many levels the amount spans.
    pub fn add_experience(&mut self, amount: u32) {
        let Some(user) = self.current_user.as_mut() else {
            return;
        };

        user.experience = user.experience.saturating_add(amount);
        let new_level = leveling::level_for_experience(user.experience);
        if new_level > user.level {
            tracing::info!(username = %user.username, from = user.level, to = new_level, "level up");
            user.level = new_level;
            self.add_gold_coins(LEVEL_UP_BONUS);
        }
        self.persist_user();
    }

    /// initialize_from_storage
    ///
    /// Restores the session persisted by an earlier process. Both the token
    /// and the user record must be present. An expired token or a record that
    /// does not parse is treated as a lost session and cleared through `logout`.
    ///
    /// Returns whether a session was restored.
    pub fn initialize_from_storage(&mut self) -> bool {
        let token = self.storage.get(TOKEN_KEY).filter(|token| !token.is_empty());
        let record = self.storage.get(USER_INFO_KEY).filter(|record| !record.is_empty());
        let (Some(token), Some(record)) = (token, record) else {
            return false;
        };

        if auth::token_is_expired(&token) {
            tracing::info!("persisted session token has expired, clearing session");
            self.logout();
            return false;
        }

        match serde_json::from_str::<User>(&record) {
            Ok(user) => {
                tracing::debug!(username = %user.username, "session restored from storage");
                self.current_user = Some(user);
                self.token = Some(token);
                self.is_authenticated = true;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "persisted user record is corrupted, clearing session");
                self.logout();
                false
            }
        }
    }

    // --- Rewards ---

    pub fn level_stats(&self) -> Option<LevelStats> {
        self.current_user.as_ref().map(LevelStats::for_user)
    }

    /// complete_pomodoro
    ///
    /// Pays out a finished study session: gold first, then experience through
    /// `add_experience` so a level-up earns its bonus.
    pub fn complete_pomodoro(&mut self, duration_secs: u32) -> Option<PomodoroReward> {
        self.current_user.as_ref()?;

        let (experience_gained, gold_gained) = leveling::pomodoro_rewards(duration_secs);
        self.add_gold_coins(gold_gained);
        self.add_experience(experience_gained);

        self.current_user.as_ref().map(|user| PomodoroReward {
            experience_gained,
            gold_gained,
            new_level: user.level,
            total_experience: user.experience,
            total_gold: user.gold_coins,
        })
    }

    /// exchange_game_time
    ///
    /// Spends gold on `hours` of game time.
    pub fn exchange_game_time(&mut self, hours: u32) -> Result<GameTimeExchange, RewardError> {
        let user = self.current_user.as_mut().ok_or(RewardError::NoSession)?;

        let cost = leveling::game_time_cost(hours)?;
        if user.gold_coins < cost {
            return Err(RewardError::InsufficientGold {
                required: cost,
                available: user.gold_coins,
            });
        }

        user.gold_coins -= cost;
        let exchange = GameTimeExchange {
            gold_spent: cost,
            remaining_gold: user.gold_coins,
            game_time_hours: hours,
        };

        self.persist_user();
        Ok(exchange)
    }

    // --- Persistence ---

    /// Writes every entry or none: when a write fails, the keys already
    /// written go back to their previous values.
    fn persist_session<const N: usize>(&self, entries: [(&str, &str); N]) -> Result<(), StorageError> {
        let previous = entries.map(|(key, _)| (key, self.storage.get(key)));

        for (written, (key, value)) in entries.iter().enumerate() {
            if let Err(e) = self.storage.set(key, value) {
                for (key, old) in previous.iter().take(written).rev() {
                    let restored = match old {
                        Some(old) => self.storage.set(key, old),
                        None => self.storage.remove(key),
                    };
                    if let Err(rollback) = restored {
                        tracing::warn!(key, error = %rollback, "failed to roll back session key");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn persist_user(&self) {
        let Some(user) = self.current_user.as_ref() else {
            return;
        };

        match serde_json::to_string(user) {
            Ok(record) => self.write(USER_INFO_KEY, &record),
            Err(e) => tracing::warn!(error = %e, "failed to encode user record"),
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            tracing::warn!(key, error = %e, "failed to persist session value");
        }
    }
}
