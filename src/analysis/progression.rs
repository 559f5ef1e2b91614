use crate::analysis::catalog::IssueCatalog;
use crate::error::Result;
use crate::models::issue::{IssueCategory, IssueSet};
use crate::models::progression::{FixResult, LevelUp, ProgressionState, LEVEL_STEP};
use log::{debug, info};
use std::sync::Arc;

/// Turns the difference between consecutive scans into points and levels.
///
/// Only issues that disappear earn points; newly appearing issues are reported
/// but never penalised. Multiple level-ups in one snapshot are folded into a
/// single `LevelUp { old_level, new_level }`.
#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    catalog: Arc<IssueCatalog>,
    state: ProgressionState,
}

impl ProgressionEngine {
    pub fn new(catalog: Arc<IssueCatalog>) -> Self {
        Self::with_state(catalog, ProgressionState::default())
    }

    /// Rehydrates persisted state, re-normalizing the level invariant.
    pub fn with_state(catalog: Arc<IssueCatalog>, state: ProgressionState) -> Self {
        let mut engine = Self {
            catalog,
            state: ProgressionState::default(),
        };
        engine.restore(state);
        engine
    }

    pub fn restore(&mut self, mut state: ProgressionState) {
        state.level = state.level.max(1);
        normalize_level(&mut state);
        self.state = state;
    }

    pub fn state(&self) -> &ProgressionState {
        &self.state
    }

    pub fn catalog(&self) -> &Arc<IssueCatalog> {
        &self.catalog
    }

    pub fn reset(&mut self) {
        self.state = ProgressionState::default();
    }

    pub fn process_snapshot(&mut self, current: &IssueSet) -> Result<FixResult> {
        let previous = &self.state.previous_issues;

        // Resolve everything before touching state so an unknown id leaves it intact.
        let fixed_issue_ids = self.catalog.ordered(previous.difference(current))?;
        let newly_appeared_issue_ids = self.catalog.ordered(current.difference(previous))?;
        let remaining_issue_ids = self.catalog.ordered(current.iter())?;

        let mut earned_points = 0u64;
        let mut fixed_bug_count = 0u64;
        let mut applied_eco_tip_count = 0u64;
        for id in &fixed_issue_ids {
            let pattern = self.catalog.by_id(id)?;
            earned_points += pattern.reward_points as u64;
            match pattern.category {
                IssueCategory::BugFix => fixed_bug_count += 1,
                IssueCategory::EcoTip => applied_eco_tip_count += 1,
            }
        }

        let mut suggestions = Vec::with_capacity(newly_appeared_issue_ids.len());
        let mut detected_bugs = 0u64;
        for id in &newly_appeared_issue_ids {
            let pattern = self.catalog.by_id(id)?;
            if pattern.is_bug_fix() {
                detected_bugs += 1;
            }
            suggestions.push(pattern.suggestion.clone());
        }

        let old_level = self.state.level;
        self.state.total_points += earned_points;
        self.state.stats.lifetime_points += earned_points;
        self.state.stats.fixed_bug_count += fixed_bug_count;
        self.state.stats.applied_eco_tip_count += applied_eco_tip_count;
        self.state.stats.detected_bug_count += detected_bugs;
        normalize_level(&mut self.state);
        self.state.previous_issues = current.clone();

        let level_up = (self.state.level > old_level).then(|| LevelUp {
            old_level,
            new_level: self.state.level,
        });

        if earned_points > 0 {
            debug!(
                "Earned {earned_points} points for {} fixed issue(s)",
                fixed_issue_ids.len()
            );
        }
        if let Some(up) = level_up {
            info!("Level up: {} -> {}", up.old_level, up.new_level);
        }

        Ok(FixResult {
            earned_points,
            fixed_issue_ids,
            newly_appeared_issue_ids,
            remaining_issue_ids,
            level_up,
            total_points: self.state.total_points,
            level: self.state.level,
            fixed_bug_count,
            applied_eco_tip_count,
            suggestions,
        })
    }
}

/// Spend `level * LEVEL_STEP` per level until the remainder is below the next threshold.
fn normalize_level(state: &mut ProgressionState) {
    while state.total_points >= state.level as u64 * LEVEL_STEP {
        state.total_points -= state.level as u64 * LEVEL_STEP;
        state.level += 1;
    }
}
