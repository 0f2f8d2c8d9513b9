use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Identity & Session Schemas ---

/// UserRole
///
/// The closed set of roles a session can carry. The role decides which
/// role-gated routes the navigation guard lets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum UserRole {
    Student,
    Parent,
    Teacher,
}

impl UserRole {
    /// The persisted spelling, as stored under the `userRole` key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Parent => "parent",
            Self::Teacher => "teacher",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a role string falls outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for UserRole {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "student" => Ok(Self::Student),
            "parent" => Ok(Self::Parent),
            "teacher" => Ok(Self::Teacher),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// User
///
/// The session record owned by the `SessionStore` while a session is active.
/// Serialized wholesale (camelCase keys) under the `userInfo` storage key on
/// every mutation.
///
/// Invariant: after every experience accrual `level == experience / 100 + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    pub nickname: String,
    // Avatar URL or asset key; empty when the user has not picked one.
    pub avatar: String,
    pub level: u32,
    pub experience: u32,
    pub gold_coins: u32,
    pub created_at: DateTime<Utc>,
}

/// UserUpdate
///
/// Partial user record merged into the active session by
/// `SessionStore::update_user_info`. Absent fields leave the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gold_coins: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserUpdate {
    /// Overwrites every field of `user` that this update carries.
    pub fn apply_to(self, user: &mut User) {
        if let Some(id) = self.id {
            user.id = id;
        }
        if let Some(username) = self.username {
            user.username = username;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(nickname) = self.nickname {
            user.nickname = nickname;
        }
        if let Some(avatar) = self.avatar {
            user.avatar = avatar;
        }
        if let Some(level) = self.level {
            user.level = level;
        }
        if let Some(experience) = self.experience {
            user.experience = experience;
        }
        if let Some(gold_coins) = self.gold_coins {
            user.gold_coins = gold_coins;
        }
        if let Some(created_at) = self.created_at {
            user.created_at = created_at;
        }
    }
}

/// LoginCredentials
///
/// Input for `SessionStore::login`. Never persisted. The `Debug` output
/// redacts the password so credentials can appear in tracing spans.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
    pub role: UserRole,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// LoginResponse
///
/// Wire form of a login outcome: `{ success, user?, error? }`.
/// Built from the store's `Result<User, AuthError>` at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResponse {
    pub fn success(user: User) -> Self {
        Self {
            success: true,
            user: Some(user),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            user: None,
            error: Some(error.into()),
        }
    }
}

// --- Learning Content Schemas ---
// Descriptive records consumed by the quest map, battle and shop views.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum QuestType {
    Daily,
    Weekly,
    Boss,
    Special,
}

/// Quest
///
/// A single learning task and the student's completion state against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub difficulty: Difficulty,
    pub experience_reward: u32,
    pub gold_reward: u32,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub is_completed: bool,
    // Percentage, 0.0 - 100.0.
    pub progress: f64,
    // `type` is reserved in Rust; the JSON key stays "type".
    #[serde(rename = "type")]
    pub quest_type: QuestType,
}

/// QuestCategory
///
/// Groups quests of one subject for the quest map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct QuestCategory {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub icon: String,
    pub color: String,
    pub quests: Vec<Quest>,
}

/// QuestProgress
///
/// A student's attempt history against one quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct QuestProgress {
    pub quest_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    // Seconds.
    pub time_spent: u32,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub description: String,
    pub total_quests: u32,
    pub completed_quests: u32,
}
