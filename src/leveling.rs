//! Progression rules shared by the session store: the level formula, the
//! level-up bonus, and the reward/spend tables for study sessions and game time.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::models::User;

/// Experience needed per level.
pub const EXPERIENCE_PER_LEVEL: u32 = 100;
/// Gold granted once per `add_experience` call that raises the level.
pub const LEVEL_UP_BONUS: u32 = 50;
pub const GAME_TIME_GOLD_PER_HOUR: u32 = 30;
pub const MAX_GAME_TIME_HOURS: u32 = 4;

/// `floor(experience / 100) + 1`.
pub fn level_for_experience(experience: u32) -> u32 {
    experience / EXPERIENCE_PER_LEVEL + 1
}

/// Experience and gold earned by a focused study session.
///
/// One experience per whole minute, and 0.4 gold per minute rounded down.
pub fn pomodoro_rewards(duration_secs: u32) -> (u32, u32) {
    let minutes = duration_secs / 60;
    let gold = (u64::from(minutes) * 2 / 5) as u32;
    (minutes, gold)
}

/// Gold price of `hours` of game time, rejecting requests outside `1..=4`.
pub fn game_time_cost(hours: u32) -> Result<u32, RewardError> {
    if hours == 0 || hours > MAX_GAME_TIME_HOURS {
        return Err(RewardError::InvalidHours(hours));
    }
    Ok(hours * GAME_TIME_GOLD_PER_HOUR)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewardError {
    #[error("no active session")]
    NoSession,
    #[error("game time must be between 1 and 4 hours, got {0}")]
    InvalidHours(u32),
    #[error("not enough gold: {required} required, {available} available")]
    InsufficientGold { required: u32, available: u32 },
}

/// LevelStats
///
/// Progress summary shown on the student dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LevelStats {
    pub level: u32,
    pub experience: u32,
    pub gold_coins: u32,
    /// `level * 100 - experience`; negative when the stored level lags the formula.
    pub experience_to_next_level: i64,
    /// Percent of the current level completed.
    pub level_progress: f64,
}

impl LevelStats {
    pub fn for_user(user: &User) -> Self {
        let threshold = i64::from(user.level) * i64::from(EXPERIENCE_PER_LEVEL);
        Self {
            level: user.level,
            experience: user.experience,
            gold_coins: user.gold_coins,
            experience_to_next_level: threshold - i64::from(user.experience),
            level_progress: f64::from(user.experience % EXPERIENCE_PER_LEVEL),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PomodoroReward {
    pub experience_gained: u32,
    pub gold_gained: u32,
    pub new_level: u32,
    pub total_experience: u32,
    pub total_gold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GameTimeExchange {
    pub gold_spent: u32,
    pub remaining_gold: u32,
    pub game_time_hours: u32,
}
