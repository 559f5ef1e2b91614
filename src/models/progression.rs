use super::issue::IssueSet;
use serde::{Deserialize, Serialize};

/// Points needed per level: leaving level `n` costs `n * LEVEL_STEP`.
pub const LEVEL_STEP: u64 = 100;

/// Cumulative counters. They only grow until an explicit reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressStats {
    pub lifetime_points: u64,
    pub fixed_bug_count: u64,
    pub applied_eco_tip_count: u64,
    pub detected_bug_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionState {
    /// Points banked toward the next level; always below `level * LEVEL_STEP`.
    pub total_points: u64,
    pub level: u32,
    pub previous_issues: IssueSet,
    #[serde(default)]
    pub stats: ProgressStats,
}

impl Default for ProgressionState {
    fn default() -> Self {
        Self {
            total_points: 0,
            level: 1,
            previous_issues: IssueSet::new(),
            stats: ProgressStats::default(),
        }
    }
}

impl ProgressionState {
    pub fn with_points(total_points: u64, level: u32) -> Self {
        Self {
            total_points,
            level: level.max(1),
            ..Self::default()
        }
    }

    pub fn points_for_next_level(&self) -> u64 {
        self.level as u64 * LEVEL_STEP
    }

    pub fn points_to_next_level(&self) -> u64 {
        self.points_for_next_level().saturating_sub(self.total_points)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub old_level: u32,
    pub new_level: u32,
}

/// Outcome of one snapshot. Id lists follow catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixResult {
    pub earned_points: u64,
    pub fixed_issue_ids: Vec<String>,
    pub newly_appeared_issue_ids: Vec<String>,
    pub remaining_issue_ids: Vec<String>,
    pub level_up: Option<LevelUp>,
    pub total_points: u64,
    pub level: u32,
    pub fixed_bug_count: u64,
    pub applied_eco_tip_count: u64,
    /// Suggestion text for each newly appeared issue.
    pub suggestions: Vec<String>,
}
