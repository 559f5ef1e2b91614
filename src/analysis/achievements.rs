use crate::error::{EcoError, Result};
use crate::models::achievement::{AchievementCounters, AchievementStatus, UnlockedAchievements};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub condition: fn(&AchievementCounters) -> bool,
}

/// Stateless evaluator. Callers own `UnlockedAchievements` and record grants.
#[derive(Debug, Clone)]
pub struct AchievementEngine {
    achievements: Vec<Achievement>,
}

impl AchievementEngine {
    pub fn new(achievements: Vec<Achievement>) -> Result<Self> {
        let mut seen = HashSet::new();
        for achievement in &achievements {
            if !seen.insert(achievement.id) {
                return Err(EcoError::Config(format!(
                    "Duplicate achievement id: {}",
                    achievement.id
                )));
            }
        }
        Ok(Self { achievements })
    }

    pub fn builtin() -> Self {
        Self {
            achievements: builtin_achievements(),
        }
    }

    pub fn all(&self) -> &[Achievement] {
        &self.achievements
    }

    pub fn by_id(&self, id: &str) -> Result<&Achievement> {
        self.achievements
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| EcoError::NotFound(format!("Achievement {id}")))
    }

    pub fn satisfied(&self, counters: &AchievementCounters) -> Vec<&Achievement> {
        self.achievements
            .iter()
            .filter(|a| (a.condition)(counters))
            .collect()
    }

    /// Ids whose condition holds now and that are not yet unlocked.
    pub fn evaluate(
        &self,
        counters: &AchievementCounters,
        unlocked: &UnlockedAchievements,
    ) -> Vec<String> {
        self.satisfied(counters)
            .into_iter()
            .filter(|a| !unlocked.contains(a.id))
            .map(|a| a.id.to_string())
            .collect()
    }

    pub fn statuses(&self, unlocked: &UnlockedAchievements) -> Vec<AchievementStatus> {
        self.achievements
            .iter()
            .map(|a| AchievementStatus {
                id: a.id.to_string(),
                name: a.name.to_string(),
                description: a.description.to_string(),
                unlocked: unlocked.contains(a.id),
            })
            .collect()
    }
}

fn builtin_achievements() -> Vec<Achievement> {
    vec![
        Achievement {
            id: "first-save",
            name: "First Save",
            description: "Earn XP on your first file save.",
            condition: |c| c.total_points_ever_earned > 0,
        },
        Achievement {
            id: "xp-novice",
            name: "XP Novice",
            description: "Reach 50 XP.",
            condition: |c| c.total_points_ever_earned >= 50,
        },
        Achievement {
            id: "first-100-xp",
            name: "First 100 XP",
            description: "Reach 100 XP.",
            condition: |c| c.total_points_ever_earned >= 100,
        },
        Achievement {
            id: "efficient-thinker",
            name: "Efficient Thinker",
            description: "Reach 500 XP.",
            condition: |c| c.total_points_ever_earned >= 500,
        },
        Achievement {
            id: "xp-master",
            name: "XP Master",
            description: "Reach 1000 XP.",
            condition: |c| c.total_points_ever_earned >= 1000,
        },
        Achievement {
            id: "level-5",
            name: "Level 5",
            description: "Reach level 5.",
            condition: |c| c.level >= 5,
        },
        Achievement {
            id: "green-coder",
            name: "Green Coder",
            description: "Apply 10 eco tips.",
            condition: |c| c.applied_eco_tip_count >= 10,
        },
        Achievement {
            id: "eco-marathon",
            name: "Eco Marathon",
            description: "Apply 100 eco tips.",
            condition: |c| c.applied_eco_tip_count >= 100,
        },
        Achievement {
            id: "eco-streak",
            name: "Eco Streak",
            description: "Apply 5 eco tips before fixing any bug.",
            condition: |c| c.applied_eco_tip_count >= 5 && c.fixed_bug_count == 0,
        },
        Achievement {
            id: "bug-slayer",
            name: "Bug Slayer",
            description: "Fix 20 bugs.",
            condition: |c| c.fixed_bug_count >= 20,
        },
        Achievement {
            id: "bug-exterminator",
            name: "Bug Exterminator",
            description: "Fix 100 bugs.",
            condition: |c| c.fixed_bug_count >= 100,
        },
        Achievement {
            id: "bug-hunter",
            name: "Bug Hunter",
            description: "Detect 50 bugs.",
            condition: |c| c.detected_bug_count >= 50,
        },
        Achievement {
            id: "team-leader",
            name: "Team Leader",
            description: "Top the leaderboard in classroom mode.",
            condition: |c| c.is_leaderboard_top,
        },
        Achievement {
            id: "classroom-hero",
            name: "Classroom Hero",
            description: "Earn 1000 XP while leading your classroom.",
            condition: |c| c.total_points_ever_earned >= 1000 && c.is_leaderboard_top,
        },
        Achievement {
            id: "night-owl",
            name: "Night Owl",
            description: "Earn XP between midnight and 5am.",
            condition: |c| c.earned_at_night,
        },
        Achievement {
            id: "fast-fixer",
            name: "Fast Fixer",
            description: "Fix a bug within 1 minute of detection.",
            condition: |c| c.fast_fix,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_unique() {
        assert!(AchievementEngine::new(builtin_achievements()).is_ok());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut list = builtin_achievements();
        list.push(list[0].clone());
        assert!(matches!(AchievementEngine::new(list), Err(EcoError::Config(_))));
    }

    #[test]
    fn evaluates_point_thresholds() {
        let engine = AchievementEngine::builtin();
        let counters = AchievementCounters {
            total_points_ever_earned: 120,
            level: 2,
            ..Default::default()
        };
        let unlocked = engine.evaluate(&counters, &UnlockedAchievements::new());
        assert_eq!(unlocked, vec!["first-save", "xp-novice", "first-100-xp"]);
    }

    #[test]
    fn skips_already_unlocked() {
        let engine = AchievementEngine::builtin();
        let counters = AchievementCounters {
            total_points_ever_earned: 60,
            ..Default::default()
        };
        let mut unlocked = UnlockedAchievements::new();
        unlocked.grant("first-save");
        assert_eq!(engine.evaluate(&counters, &unlocked), vec!["xp-novice"]);
    }

    #[test]
    fn unlocked_set_never_shrinks() {
        let engine = AchievementEngine::builtin();
        let mut unlocked = UnlockedAchievements::new();

        let streak = AchievementCounters {
            applied_eco_tip_count: 5,
            total_points_ever_earned: 25,
            ..Default::default()
        };
        for id in engine.evaluate(&streak, &unlocked) {
            unlocked.grant(id);
        }
        assert!(unlocked.contains("eco-streak"));

        // The streak predicate turns false once a bug is fixed; the grant stays.
        let later = AchievementCounters {
            fixed_bug_count: 1,
            ..streak
        };
        for id in engine.evaluate(&later, &unlocked) {
            unlocked.grant(id);
        }
        assert!(unlocked.contains("eco-streak"));
        assert!(engine.evaluate(&later, &unlocked).is_empty());
    }

    #[test]
    fn by_id_and_statuses() {
        let engine = AchievementEngine::builtin();
        assert_eq!(engine.by_id("bug-slayer").unwrap().name, "Bug Slayer");
        assert!(matches!(engine.by_id("missing"), Err(EcoError::NotFound(_))));

        let unlocked: UnlockedAchievements = ["team-leader"].into_iter().collect();
        let statuses = engine.statuses(&unlocked);
        assert_eq!(statuses.len(), engine.all().len());
        assert!(statuses.iter().any(|s| s.id == "team-leader" && s.unlocked));
    }
}
