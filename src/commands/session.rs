use crate::analysis::achievements::AchievementEngine;
use crate::analysis::catalog::IssueCatalog;
use crate::analysis::classroom::ClassroomAggregator;
use crate::analysis::progression::ProgressionEngine;
use crate::analysis::report::format_report;
use crate::analysis::scanner::{detect_language, IssueScanner};
use crate::clock::Clock;
use crate::commands::settings::EffectiveSettings;
use crate::error::{EcoError, Result};
use crate::models::achievement::{AchievementCounters, AchievementStatus, UnlockedAchievements};
use crate::models::issue::IssueSet;
use crate::models::progression::{FixResult, ProgressionState};
use crate::store::{ClassroomStore, ProgressionStore};
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Action kind used for classroom cooldowns on document saves.
pub const SAVE_ACTION: &str = "save";

const NIGHT_END_HOUR: u32 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct SessionUpdate {
    pub fix: FixResult,
    pub unlocked_achievements: Vec<String>,
    /// Points credited in the classroom, when one is joined.
    pub classroom_points: Option<u64>,
    /// Why the classroom sync failed. Progress above is kept regardless.
    pub classroom_error: Option<String>,
    pub report: String,
}

struct ClassroomLink {
    aggregator: Arc<ClassroomAggregator>,
    store: Option<Arc<dyn ClassroomStore>>,
}

/// One user's editor session: scan, progress, unlock, and sync to a classroom.
///
/// Computation and persistence are separate steps. `on_document_saved` only
/// touches memory; `save` writes through the store and may fail without
/// losing anything, so the caller can retry.
pub struct Session {
    user_id: String,
    display_name: String,
    scanner: IssueScanner,
    engine: ProgressionEngine,
    achievements: AchievementEngine,
    unlocked: UnlockedAchievements,
    clock: Arc<dyn Clock>,
    store: Arc<dyn ProgressionStore>,
    settings: EffectiveSettings,
    classroom: Option<ClassroomLink>,
    first_seen_ms: HashMap<String, i64>,
    earned_at_night: bool,
    fast_fix: bool,
}

impl Session {
    pub fn load(
        user_id: &str,
        display_name: &str,
        catalog: &IssueCatalog,
        clock: Arc<dyn Clock>,
        store: Arc<dyn ProgressionStore>,
        settings: EffectiveSettings,
    ) -> Result<Self> {
        let catalog = Arc::new(catalog.without(&settings.disabled_patterns)?);

        let mut state = store.load_progression(user_id)?.unwrap_or_default();
        // Drop ids of patterns that were disabled or removed since the last save.
        state.previous_issues = state
            .previous_issues
            .iter()
            .filter(|id| catalog.position(id).is_some())
            .collect();
        let unlocked = store.load_achievements(user_id)?;

        info!(
            "Loaded session for {user_id}: level {}, {} achievement(s)",
            state.level,
            unlocked.len()
        );

        Ok(Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            scanner: IssueScanner::new(catalog.clone()),
            engine: ProgressionEngine::with_state(catalog, state),
            achievements: AchievementEngine::builtin(),
            unlocked,
            clock,
            store,
            settings,
            classroom: None,
            first_seen_ms: HashMap::new(),
            earned_at_night: false,
            fast_fix: false,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> &ProgressionState {
        self.engine.state()
    }

    pub fn unlocked(&self) -> &UnlockedAchievements {
        &self.unlocked
    }

    pub fn achievement_statuses(&self) -> Vec<AchievementStatus> {
        self.achievements.statuses(&self.unlocked)
    }

    pub fn join_classroom(
        &mut self,
        aggregator: Arc<ClassroomAggregator>,
        pin: Option<&str>,
        store: Option<Arc<dyn ClassroomStore>>,
    ) -> Result<()> {
        if !self.settings.classroom_enabled {
            return Err(EcoError::Config("Classroom mode is disabled".to_string()));
        }
        aggregator.join_with_pin(&self.user_id, &self.display_name, pin)?;
        self.classroom = Some(ClassroomLink { aggregator, store });
        Ok(())
    }

    pub fn leave_classroom(&mut self) {
        if let Some(link) = self.classroom.take() {
            link.aggregator.leave(&self.user_id);
        }
    }

    pub fn on_document_saved(&mut self, code: &str, language: &str) -> Result<SessionUpdate> {
        let language = detect_language(language);
        let issues = if language == "unknown" {
            self.scanner.scan(code)
        } else {
            self.scanner.scan_language(code, &language)
        };
        self.process_issues(&issues)
    }

    pub fn process_issues(&mut self, issues: &IssueSet) -> Result<SessionUpdate> {
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();

        let fix = self.engine.process_snapshot(issues)?;
        self.track_fix_timing(&fix, now_ms)?;
        if fix.earned_points > 0 && self.local_hour(now) < NIGHT_END_HOUR {
            self.earned_at_night = true;
        }

        let counters = self.counters();
        let unlocked_achievements = self.achievements.evaluate(&counters, &self.unlocked);
        for id in &unlocked_achievements {
            info!("{} unlocked achievement {id}", self.user_id);
            self.unlocked.grant(id.clone());
        }

        let (classroom_points, classroom_error) = self.sync_classroom();

        let report = format_report(&fix, self.engine.catalog());
        Ok(SessionUpdate {
            fix,
            unlocked_achievements,
            classroom_points,
            classroom_error,
            report,
        })
    }

    /// Progress is already committed here, so a classroom failure is
    /// reported alongside it. A member removed by someone else is detached.
    fn sync_classroom(&mut self) -> (Option<u64>, Option<String>) {
        let Some(link) = &self.classroom else {
            return (None, None);
        };

        match link.aggregator.record_points_update(
            &self.user_id,
            self.engine.state().stats.lifetime_points,
            &self.unlocked.to_vec(),
            SAVE_ACTION,
        ) {
            Ok(points) => (Some(points), None),
            Err(err) => {
                warn!(
                    "Classroom sync failed for {} in {}: {err}",
                    self.user_id,
                    link.aggregator.classroom_id()
                );
                if matches!(err, EcoError::NotAMember(_)) {
                    self.classroom = None;
                }
                (None, Some(err.to_string()))
            }
        }
    }

    pub fn in_classroom(&self) -> bool {
        self.classroom.is_some()
    }

    /// Writes progression, achievements and the joined classroom.
    pub fn save(&self) -> Result<()> {
        let result = self
            .store
            .save_progression(&self.user_id, self.engine.state())
            .and_then(|_| self.store.save_achievements(&self.user_id, &self.unlocked))
            .and_then(|_| match &self.classroom {
                Some(ClassroomLink {
                    aggregator,
                    store: Some(store),
                }) => store.save_classroom(&aggregator.snapshot()),
                _ => Ok(()),
            });

        if let Err(err) = &result {
            warn!("Failed to persist session for {}: {err}", self.user_id);
        }
        result
    }

    /// Clears progression and achievements (explicit user reset).
    pub fn reset(&mut self) {
        self.engine.reset();
        self.unlocked.clear();
        self.first_seen_ms.clear();
        self.earned_at_night = false;
        self.fast_fix = false;
    }

    fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        FixedOffset::east_opt(self.settings.utc_offset_minutes * 60)
            .map(|offset| now.with_timezone(&offset).hour())
            .unwrap_or_else(|| now.hour())
    }

    fn counters(&self) -> AchievementCounters {
        let state = self.engine.state();
        AchievementCounters {
            total_points_ever_earned: state.stats.lifetime_points,
            level: state.level,
            fixed_bug_count: state.stats.fixed_bug_count,
            applied_eco_tip_count: state.stats.applied_eco_tip_count,
            detected_bug_count: state.stats.detected_bug_count,
            is_leaderboard_top: self
                .classroom
                .as_ref()
                .is_some_and(|link| link.aggregator.is_top(&self.user_id)),
            earned_at_night: self.earned_at_night,
            fast_fix: self.fast_fix,
        }
    }

    fn track_fix_timing(&mut self, fix: &FixResult, now_ms: i64) -> Result<()> {
        let catalog = self.engine.catalog().clone();
        for id in &fix.fixed_issue_ids {
            let detected_at = self.first_seen_ms.remove(id);
            if !catalog.by_id(id)?.is_bug_fix() {
                continue;
            }
            if let Some(detected_at) = detected_at {
                if now_ms - detected_at <= self.settings.fast_fix_window_ms {
                    self.fast_fix = true;
                }
            }
        }
        for id in &fix.newly_appeared_issue_ids {
            self.first_seen_ms.insert(id.clone(), now_ms);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::commands::db::SqliteStore;
    use crate::models::classroom::ClassroomLimits;

    fn session(clock: Arc<ManualClock>) -> Session {
        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        Session::load(
            "u1",
            "Ada",
            &IssueCatalog::builtin().expect("catalog"),
            clock,
            store,
            EffectiveSettings::default(),
        )
        .expect("session")
    }

    #[test]
    fn fixing_var_earns_points_and_first_save() {
        let clock = Arc::new(ManualClock::at(2024, 3, 13, 14, 0, 0).expect("valid test date"));
        let mut session = session(clock.clone());

        let first = session
            .on_document_saved("var x = 5;\nconsole.log(x);\n", "javascript")
            .expect("first save");
        assert_eq!(first.fix.earned_points, 0);
        assert!(first.unlocked_achievements.is_empty());

        clock.advance_ms(120_000);
        let second = session
            .on_document_saved("const x = 5;\nconsole.log(x);\n", "javascript")
            .expect("second save");
        assert_eq!(second.fix.fixed_issue_ids, vec!["var-declaration"]);
        assert_eq!(second.fix.earned_points, 10);
        assert_eq!(second.unlocked_achievements, vec!["first-save"]);
        assert!(second.report.contains("Earned XP: +10"));
    }

    #[test]
    fn quick_fix_at_night_unlocks_badges() {
        let clock = Arc::new(ManualClock::at(2024, 3, 13, 2, 0, 0).expect("valid test date"));
        let mut session = session(clock.clone());

        session
            .on_document_saved("while (true) { tick(); }\n", "typescript")
            .expect("detect");
        clock.advance_ms(30_000);
        let update = session
            .on_document_saved("while (running) { tick(); }\n", "typescript")
            .expect("fix");

        assert!(update.unlocked_achievements.contains(&"fast-fixer".to_string()));
        assert!(update.unlocked_achievements.contains(&"night-owl".to_string()));
    }

    #[test]
    fn classroom_receives_lifetime_points() {
        let clock = Arc::new(ManualClock::at(2024, 3, 13, 14, 0, 0).expect("valid test date"));
        let room = Arc::new(ClassroomAggregator::new(
            "CLSRM-ROOM01",
            clock.clone(),
            ClassroomLimits::default(),
        ));
        let mut session = session(clock.clone());
        session.join_classroom(room.clone(), None, None).expect("join");

        session.on_document_saved("var a = 1; console.log(a);", "js").expect("scan");
        clock.advance_ms(61_000);
        let update = session.on_document_saved("const a = 1;", "js").expect("fix");

        assert_eq!(update.classroom_points, Some(15));
        assert_eq!(room.member("u1").expect("member").total_points, 15);
        assert!(room.is_top("u1"));

        session.leave_classroom();
        assert_eq!(room.member_count(), 0);
    }

    #[test]
    fn removal_from_classroom_keeps_the_fix_result() {
        let clock = Arc::new(ManualClock::at(2024, 3, 13, 14, 0, 0).expect("valid test date"));
        let room = Arc::new(ClassroomAggregator::new(
            "CLSRM-ROOM02",
            clock.clone(),
            ClassroomLimits::default(),
        ));
        let mut session = session(clock.clone());
        session.join_classroom(room.clone(), None, None).expect("join");

        session.on_document_saved("var a = 1; console.log(a);", "js").expect("scan");
        room.leave("u1");
        clock.advance_ms(61_000);

        let update = session.on_document_saved("const a = 1;", "js").expect("fix");
        assert_eq!(update.fix.earned_points, 15);
        assert_eq!(update.unlocked_achievements, vec!["first-save"]);
        assert_eq!(update.classroom_points, None);
        assert!(update.classroom_error.is_some());
        assert!(!session.in_classroom());

        clock.advance_ms(61_000);
        let next = session.on_document_saved("const a = 2;", "js").expect("later save");
        assert!(next.classroom_error.is_none());
        assert_eq!(session.state().stats.lifetime_points, 15);
    }

    #[test]
    fn night_owl_follows_the_configured_offset() {
        // 20:00 UTC is 02:00 at UTC+6.
        let clock = Arc::new(ManualClock::at(2024, 3, 13, 20, 0, 0).expect("valid test date"));
        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        let settings = EffectiveSettings {
            utc_offset_minutes: 360,
            ..EffectiveSettings::default()
        };
        let mut session = Session::load(
            "u1",
            "Ada",
            &IssueCatalog::builtin().expect("catalog"),
            clock.clone(),
            store,
            settings,
        )
        .expect("session");

        session.on_document_saved("var a = 1;\nexport default a;\n", "js").expect("detect");
        clock.advance_ms(120_000);
        let update = session
            .on_document_saved("const a = 1;\nexport default a;\n", "js")
            .expect("fix");
        assert!(update.unlocked_achievements.contains(&"night-owl".to_string()));
    }

    #[test]
    fn utc_evening_is_not_night_without_offset() {
        let clock = Arc::new(ManualClock::at(2024, 3, 13, 20, 0, 0).expect("valid test date"));
        let mut session = session(clock.clone());
        session.on_document_saved("var a = 1;\nexport default a;\n", "js").expect("detect");
        clock.advance_ms(120_000);
        let update = session
            .on_document_saved("const a = 1;\nexport default a;\n", "js")
            .expect("fix");
        assert!(!update.unlocked_achievements.contains(&"night-owl".to_string()));
    }

    #[test]
    fn disabled_classroom_mode_rejects_join() {
        let clock = Arc::new(ManualClock::at(2024, 3, 13, 14, 0, 0).expect("valid test date"));
        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        let settings = EffectiveSettings {
            classroom_enabled: false,
            ..EffectiveSettings::default()
        };
        let mut session = Session::load(
            "u1",
            "Ada",
            &IssueCatalog::builtin().expect("catalog"),
            clock.clone(),
            store,
            settings,
        )
        .expect("session");
        let room = Arc::new(ClassroomAggregator::new("CLSRM-OFF001", clock, ClassroomLimits::default()));
        assert!(matches!(
            session.join_classroom(room, None, None),
            Err(EcoError::Config(_))
        ));
    }
}
