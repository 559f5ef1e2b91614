use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_DAILY_POINTS: u64 = 300;
pub const ACTION_COOLDOWN_MS: i64 = 60_000;
pub const MAX_NOTIFICATIONS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassroomLimits {
    pub max_daily_points: u64,
    pub action_cooldown_ms: i64,
    pub max_notifications: usize,
}

impl Default for ClassroomLimits {
    fn default() -> Self {
        Self {
            max_daily_points: MAX_DAILY_POINTS,
            action_cooldown_ms: ACTION_COOLDOWN_MS,
            max_notifications: MAX_NOTIFICATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassroomMember {
    pub user_id: String,
    pub display_name: String,
    /// Points credited in this classroom after caps and cooldowns.
    pub total_points: u64,
    /// Last total reported by the member's own progression.
    pub reported_points: u64,
    pub weekly_points: u64,
    pub achievements: Vec<String>,
    pub joined_at_ms: i64,
    pub join_seq: u64,
    pub last_activity_ms: i64,
    pub daily_points_used: u64,
    pub daily_reset_date: NaiveDate,
    pub last_action_ms_by_kind: HashMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassroomNotification {
    pub id: String,
    pub message: String,
    pub timestamp_ms: i64,
    pub read: bool,
}

/// Persistable snapshot of a classroom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classroom {
    pub classroom_id: String,
    pub pin: Option<String>,
    pub created_at_ms: i64,
    /// Members in join order.
    pub members: Vec<ClassroomMember>,
    pub next_join_seq: u64,
    /// Newest first.
    pub notifications: Vec<ClassroomNotification>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub medal: Option<String>,
    pub user_id: String,
    pub display_name: String,
    pub total_points: u64,
    pub weekly_points: u64,
    pub achievements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub top_three: Vec<LeaderboardEntry>,
    pub total_weekly_points: u64,
    pub active_member_count: usize,
    pub week_start_date: NaiveDate,
}
