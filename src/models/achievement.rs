use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Cumulative inputs for achievement predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementCounters {
    pub total_points_ever_earned: u64,
    pub level: u32,
    pub fixed_bug_count: u64,
    pub applied_eco_tip_count: u64,
    pub detected_bug_count: u64,
    pub is_leaderboard_top: bool,
    /// Points were earned between midnight and 05:00.
    pub earned_at_night: bool,
    /// A bug was fixed shortly after it was first detected.
    pub fast_fix: bool,
}

/// Achievement ids already granted to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnlockedAchievements(BTreeSet<String>);

impl UnlockedAchievements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the id was not granted before.
    pub fn grant(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl<S: Into<String>> FromIterator<S> for UnlockedAchievements {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementStatus {
    pub id: String,
    pub name: String,
    pub description: String,
    pub unlocked: bool,
}
