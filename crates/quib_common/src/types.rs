//! Domain records and derived views shared between the store, the
//! progression engine and the HTTP layer.

use crate::stages::{EvolutionStage, StageRequirements};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mood is always kept inside these bounds after any mutation.
pub const MOOD_MIN: f64 = 0.0;
pub const MOOD_MAX: f64 = 100.0;
/// Neutral midpoint used when no sentiment history exists.
pub const MOOD_NEUTRAL: f64 = 50.0;

/// Map an average sentiment in [-1, 1] onto the 0..100 mood range.
pub fn sentiment_to_mood(sentiment: f64) -> f64 {
    ((sentiment + 1.0) * 50.0).clamp(MOOD_MIN, MOOD_MAX)
}

pub fn clamp_mood(mood: f64) -> f64 {
    mood.clamp(MOOD_MIN, MOOD_MAX)
}

/// Completed-activity categories, each with a fixed XP grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    DailyChallenge,
    ChatInteraction,
    TimeBased,
    Custom,
}

impl TaskType {
    pub fn xp_reward(self) -> i64 {
        match self {
            TaskType::DailyChallenge => 50,
            TaskType::ChatInteraction => 10,
            TaskType::TimeBased => 25,
            TaskType::Custom => 30,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::DailyChallenge => "DAILY_CHALLENGE",
            TaskType::ChatInteraction => "CHAT_INTERACTION",
            TaskType::TimeBased => "TIME_BASED",
            TaskType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "DAILY_CHALLENGE" => Ok(TaskType::DailyChallenge),
            "CHAT_INTERACTION" => Ok(TaskType::ChatInteraction),
            "TIME_BASED" => Ok(TaskType::TimeBased),
            "CUSTOM" => Ok(TaskType::Custom),
            other => Err(format!("unknown task type: {}", other)),
        }
    }
}

/// Derived low/medium/high label from interaction recency and frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

impl EngagementLevel {
    pub fn classify(daily_chat_count: i64, missed_days: i64) -> Self {
        if daily_chat_count >= 5 && missed_days <= 1 {
            EngagementLevel::High
        } else if daily_chat_count <= 1 || missed_days >= 3 {
            EngagementLevel::Low
        } else {
            EngagementLevel::Medium
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EngagementLevel::Low => "low",
            EngagementLevel::Medium => "medium",
            EngagementLevel::High => "high",
        }
    }
}

impl FromStr for EngagementLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(EngagementLevel::Low),
            "medium" => Ok(EngagementLevel::Medium),
            "high" => Ok(EngagementLevel::High),
            other => Err(format!("unknown engagement level: {}", other)),
        }
    }
}

/// Account record. `password_hash` is an argon2 PHC string and is never
/// serialized out.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub wallet: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted creature row, joined with the owning account's creation time
/// so account age never needs a second lookup.
#[derive(Debug, Clone, Serialize)]
pub struct Creature {
    pub id: String,
    pub user_id: String,
    pub current_stage: EvolutionStage,
    pub mood_score: f64,
    pub xp: i64,
    pub last_evolution: Option<DateTime<Utc>>,
    pub personality: serde_json::Value,
    pub visual_traits: serde_json::Value,
    pub user_keywords: Vec<String>,
    pub daily_chat_count: i64,
    pub total_chats: i64,
    pub missed_days: i64,
    pub last_chat_date: Option<NaiveDate>,
    pub engagement_level: EngagementLevel,
    pub owner_created_at: DateTime<Utc>,
}

impl Creature {
    /// Whole hours since the owning account was created, floored.
    pub fn account_age_hours(&self, now: DateTime<Utc>) -> i64 {
        (now - self.owner_created_at).num_hours().max(0)
    }
}

/// Point-in-time aggregate of qualifying activity. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub daily_challenges: i64,
    pub chat_interactions: i64,
    pub account_age_hours: i64,
    pub mood_score: f64,
}

/// Creature view returned to API callers: the row plus derived
/// evolution readiness and the next gate to clear.
#[derive(Debug, Clone, Serialize)]
pub struct CreatureState {
    pub id: String,
    pub current_stage: EvolutionStage,
    pub stage_name: &'static str,
    pub mood_score: f64,
    pub xp: i64,
    pub last_evolution: Option<DateTime<Utc>>,
    pub engagement_level: EngagementLevel,
    pub can_evolve: bool,
    pub next_stage: Option<EvolutionStage>,
    pub next_stage_requirements: Option<StageRequirements>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub user_id: String,
    pub task_type: TaskType,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationRecord {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub response: String,
    pub sentiment_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Immutable transition-history record appended on every advance.
#[derive(Debug, Clone, Serialize)]
pub struct EvolutionLogEntry {
    pub id: i64,
    pub user_id: String,
    pub from_stage: EvolutionStage,
    pub to_stage: EvolutionStage,
    pub reason: String,
    pub date: DateTime<Utc>,
}

/// Claimable token reward. Once `claimed` flips true the record is frozen.
#[derive(Debug, Clone, Serialize)]
pub struct TokenClaim {
    pub id: String,
    pub user_id: String,
    pub amount: u64,
    pub claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_mapping_covers_mood_range() {
        assert_eq!(sentiment_to_mood(-1.0), 0.0);
        assert_eq!(sentiment_to_mood(0.0), 50.0);
        assert_eq!(sentiment_to_mood(1.0), 100.0);
        // Out-of-range inputs still land inside the bounds.
        assert_eq!(sentiment_to_mood(5.0), 100.0);
        assert_eq!(sentiment_to_mood(-5.0), 0.0);
    }

    #[test]
    fn engagement_classification() {
        assert_eq!(EngagementLevel::classify(5, 0), EngagementLevel::High);
        assert_eq!(EngagementLevel::classify(5, 1), EngagementLevel::High);
        assert_eq!(EngagementLevel::classify(5, 2), EngagementLevel::Medium);
        assert_eq!(EngagementLevel::classify(1, 0), EngagementLevel::Low);
        assert_eq!(EngagementLevel::classify(2, 3), EngagementLevel::Low);
        assert_eq!(EngagementLevel::classify(3, 1), EngagementLevel::Medium);
    }

    #[test]
    fn task_xp_table() {
        assert_eq!(TaskType::DailyChallenge.xp_reward(), 50);
        assert_eq!(TaskType::ChatInteraction.xp_reward(), 10);
        assert_eq!(TaskType::TimeBased.xp_reward(), 25);
        assert_eq!(TaskType::Custom.xp_reward(), 30);
    }
}
