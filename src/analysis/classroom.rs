use crate::clock::{day_of, start_of_day_ms, week_start, Clock};
use crate::error::{EcoError, Result};
use crate::models::classroom::{
    Classroom, ClassroomLimits, ClassroomMember, ClassroomNotification, LeaderboardEntry,
    WeeklySummary,
};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

const MEDALS: [&str; 3] = ["🥇", "🥈", "🥉"];

type MemberSlot = Arc<Mutex<ClassroomMember>>;

/// Shared classroom roster with anti-abuse throttling.
///
/// Each member sits behind its own lock, so updates for different members
/// never serialize on member state. Reads copy members one at a time and may
/// observe a slightly stale mix under concurrent writes.
///
/// Ranking: points descending, then join order (earliest joiner first).
/// Weekly points are reset lazily: a write in a new week zeroes them, and
/// reads treat members inactive since the week start as having none.
pub struct ClassroomAggregator {
    classroom_id: String,
    pin: Option<String>,
    created_at_ms: i64,
    limits: ClassroomLimits,
    clock: Arc<dyn Clock>,
    members: RwLock<HashMap<String, MemberSlot>>,
    next_join_seq: AtomicU64,
    notifications: Mutex<Vec<ClassroomNotification>>,
}

impl ClassroomAggregator {
    pub fn new(classroom_id: impl Into<String>, clock: Arc<dyn Clock>, limits: ClassroomLimits) -> Self {
        let created_at_ms = clock.now_ms();
        Self {
            classroom_id: classroom_id.into(),
            pin: None,
            created_at_ms,
            limits,
            clock,
            members: RwLock::new(HashMap::new()),
            next_join_seq: AtomicU64::new(0),
            notifications: Mutex::new(Vec::new()),
        }
    }

    /// New classroom with a generated `CLSRM-XXXXXX` id.
    pub fn create(pin: Option<String>, clock: Arc<dyn Clock>, limits: ClassroomLimits) -> Self {
        let mut classroom = Self::new(generate_classroom_id(), clock, limits);
        classroom.pin = pin.filter(|p| !p.trim().is_empty());
        classroom.notify("Classroom created".to_string());
        info!("Created classroom {}", classroom.classroom_id);
        classroom
    }

    pub fn from_classroom(snapshot: Classroom, clock: Arc<dyn Clock>, limits: ClassroomLimits) -> Self {
        let next_seq = snapshot
            .members
            .iter()
            .map(|m| m.join_seq + 1)
            .max()
            .unwrap_or(0)
            .max(snapshot.next_join_seq);
        let members = snapshot
            .members
            .into_iter()
            .map(|m| (m.user_id.clone(), Arc::new(Mutex::new(m))))
            .collect();

        Self {
            classroom_id: snapshot.classroom_id,
            pin: snapshot.pin,
            created_at_ms: snapshot.created_at_ms,
            limits,
            clock,
            members: RwLock::new(members),
            next_join_seq: AtomicU64::new(next_seq),
            notifications: Mutex::new(snapshot.notifications),
        }
    }

    pub fn snapshot(&self) -> Classroom {
        let mut members = self.member_copies();
        members.sort_by_key(|m| m.join_seq);
        Classroom {
            classroom_id: self.classroom_id.clone(),
            pin: self.pin.clone(),
            created_at_ms: self.created_at_ms,
            members,
            next_join_seq: self.next_join_seq.load(Ordering::SeqCst),
            notifications: self.notifications(),
        }
    }

    pub fn classroom_id(&self) -> &str {
        &self.classroom_id
    }

    pub fn limits(&self) -> ClassroomLimits {
        self.limits
    }

    pub fn member_count(&self) -> usize {
        self.members.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn member(&self, user_id: &str) -> Option<ClassroomMember> {
        self.slot(user_id)
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// Adds the user if absent. Joining twice is a no-op.
    pub fn join(&self, user_id: &str, display_name: &str) {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        if members.contains_key(user_id) {
            return;
        }

        let now = self.clock.now_ms();
        let member = ClassroomMember {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            total_points: 0,
            reported_points: 0,
            weekly_points: 0,
            achievements: Vec::new(),
            joined_at_ms: now,
            join_seq: self.next_join_seq.fetch_add(1, Ordering::SeqCst),
            last_activity_ms: now,
            daily_points_used: 0,
            daily_reset_date: day_of(now),
            last_action_ms_by_kind: HashMap::new(),
        };
        members.insert(user_id.to_string(), Arc::new(Mutex::new(member)));
        drop(members);

        debug!("{user_id} joined classroom {}", self.classroom_id);
        self.notify(format!("{display_name} joined the classroom"));
    }

    pub fn join_with_pin(&self, user_id: &str, display_name: &str, pin: Option<&str>) -> Result<()> {
        if let Some(expected) = &self.pin {
            if pin != Some(expected.as_str()) {
                return Err(EcoError::InvalidPin(self.classroom_id.clone()));
            }
        }
        self.join(user_id, display_name);
        Ok(())
    }

    /// Removes the user. Unknown users are ignored.
    pub fn leave(&self, user_id: &str) {
        let removed = self
            .members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id);
        if removed.is_some() {
            debug!("{user_id} left classroom {}", self.classroom_id);
        }
    }

    /// Credits the growth of a member's reported total, subject to the daily
    /// cap and the per-action cooldown. Returns the points credited; a
    /// throttled update returns 0 and changes nothing.
    pub fn record_points_update(
        &self,
        user_id: &str,
        new_total_points: u64,
        achievements: &[String],
        action_kind: &str,
    ) -> Result<u64> {
        let slot = self
            .slot(user_id)
            .ok_or_else(|| EcoError::NotAMember(user_id.to_string()))?;
        let was_leader = self.leader_id().as_deref() == Some(user_id);

        let now = self.clock.now_ms();
        let today = day_of(now);

        let (granted, display_name, total) = {
            let mut member = slot.lock().unwrap_or_else(PoisonError::into_inner);

            if member.daily_reset_date != today {
                member.daily_reset_date = today;
                member.daily_points_used = 0;
                member.last_action_ms_by_kind.clear();
            }

            if let Some(&last) = member.last_action_ms_by_kind.get(action_kind) {
                if now - last < self.limits.action_cooldown_ms {
                    debug!("Throttled {action_kind} update for {user_id}: cooldown active");
                    return Ok(0);
                }
            }

            if week_start(day_of(member.last_activity_ms)) < week_start(today) {
                member.weekly_points = 0;
            }

            let delta = new_total_points.saturating_sub(member.reported_points);
            let allowance = self
                .limits
                .max_daily_points
                .saturating_sub(member.daily_points_used);
            let granted = delta.min(allowance);
            if granted < delta {
                debug!(
                    "Daily cap reached for {user_id}: discarded {} point(s)",
                    delta - granted
                );
            }

            member.total_points += granted;
            member.weekly_points += granted;
            member.daily_points_used += granted;
            member.reported_points = new_total_points;
            member.achievements = achievements.to_vec();
            member.last_action_ms_by_kind.insert(action_kind.to_string(), now);
            member.last_activity_ms = now;

            (granted, member.display_name.clone(), member.total_points)
        };

        if granted > 0 && !was_leader && self.leader_id().as_deref() == Some(user_id) {
            self.notify(format!("{display_name} took the lead with {total} XP! 🎉"));
        }

        Ok(granted)
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let week_start_ms = self.current_week_start_ms();
        let mut members = self.member_copies();
        members.sort_by(|a, b| {
            b.total_points
                .cmp(&a.total_points)
                .then(a.join_seq.cmp(&b.join_seq))
        });
        members
            .into_iter()
            .enumerate()
            .map(|(i, m)| to_entry(i, m, week_start_ms))
            .collect()
    }

    /// Member at rank one, if anyone has points.
    pub fn leader_id(&self) -> Option<String> {
        self.member_copies()
            .into_iter()
            .filter(|m| m.total_points > 0)
            .min_by(|a, b| {
                b.total_points
                    .cmp(&a.total_points)
                    .then(a.join_seq.cmp(&b.join_seq))
            })
            .map(|m| m.user_id)
    }

    pub fn is_top(&self, user_id: &str) -> bool {
        self.leader_id().as_deref() == Some(user_id)
    }

    pub fn weekly_summary(&self) -> WeeklySummary {
        let week_start_date = week_start(day_of(self.clock.now_ms()));
        let week_start_ms = start_of_day_ms(week_start_date);

        let mut active: Vec<ClassroomMember> = self
            .member_copies()
            .into_iter()
            .filter(|m| m.last_activity_ms >= week_start_ms)
            .collect();
        active.sort_by(|a, b| {
            b.weekly_points
                .cmp(&a.weekly_points)
                .then(a.join_seq.cmp(&b.join_seq))
        });

        let total_weekly_points = active.iter().map(|m| m.weekly_points).sum();
        let active_member_count = active.len();
        let top_three = active
            .into_iter()
            .take(3)
            .enumerate()
            .map(|(i, m)| to_entry(i, m, week_start_ms))
            .collect();

        WeeklySummary {
            top_three,
            total_weekly_points,
            active_member_count,
            week_start_date,
        }
    }

    pub fn notifications(&self) -> Vec<ClassroomNotification> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mark_notification_read(&self, id: &str) -> bool {
        let mut notifications = self.notifications.lock().unwrap_or_else(PoisonError::into_inner);
        match notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&self) {
        let mut notifications = self.notifications.lock().unwrap_or_else(PoisonError::into_inner);
        for notification in notifications.iter_mut() {
            notification.read = true;
        }
    }

    pub fn clear_notifications(&self) {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn notify(&self, message: String) {
        let mut notifications = self.notifications.lock().unwrap_or_else(PoisonError::into_inner);
        notifications.insert(
            0,
            ClassroomNotification {
                id: uuid::Uuid::new_v4().to_string(),
                message,
                timestamp_ms: self.clock.now_ms(),
                read: false,
            },
        );
        notifications.truncate(self.limits.max_notifications);
    }

    fn slot(&self, user_id: &str) -> Option<MemberSlot> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    fn member_copies(&self) -> Vec<ClassroomMember> {
        let slots: Vec<MemberSlot> = self
            .members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        slots
            .iter()
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }

    fn current_week_start_ms(&self) -> i64 {
        start_of_day_ms(week_start(day_of(self.clock.now_ms())))
    }
}

fn to_entry(index: usize, member: ClassroomMember, week_start_ms: i64) -> LeaderboardEntry {
    let weekly_points = if member.last_activity_ms >= week_start_ms {
        member.weekly_points
    } else {
        0
    };
    LeaderboardEntry {
        rank: index + 1,
        medal: MEDALS.get(index).map(|m| m.to_string()),
        user_id: member.user_id,
        display_name: member.display_name,
        total_points: member.total_points,
        weekly_points,
        achievements: member.achievements,
    }
}

fn generate_classroom_id() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("CLSRM-{}", raw[..6].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn classroom() -> (Arc<ManualClock>, ClassroomAggregator) {
        // Wednesday, 2024-03-13.
        let clock = Arc::new(ManualClock::at(2024, 3, 13, 9, 0, 0).expect("valid test date"));
        let aggregator = ClassroomAggregator::new("CLSRM-TEST01", clock.clone(), ClassroomLimits::default());
        (clock, aggregator)
    }

    #[test]
    fn join_is_idempotent() {
        let (_clock, room) = classroom();
        room.join("u1", "Ada");
        room.join("u1", "Ada again");
        assert_eq!(room.member_count(), 1);
        assert_eq!(room.member("u1").unwrap().display_name, "Ada");
    }

    #[test]
    fn leave_unknown_user_is_noop() {
        let (_clock, room) = classroom();
        room.join("u1", "Ada");
        room.leave("ghost");
        room.leave("u1");
        assert_eq!(room.member_count(), 0);
    }

    #[test]
    fn update_requires_membership() {
        let (_clock, room) = classroom();
        let err = room.record_points_update("ghost", 10, &[], "save").unwrap_err();
        assert!(matches!(err, EcoError::NotAMember(_)));
    }

    #[test]
    fn credits_delta_against_reported_total() {
        let (clock, room) = classroom();
        room.join("u1", "Ada");
        assert_eq!(room.record_points_update("u1", 40, &[], "save").unwrap(), 40);
        clock.advance_ms(61_000);
        assert_eq!(room.record_points_update("u1", 55, &[], "save").unwrap(), 15);
        assert_eq!(room.member("u1").unwrap().total_points, 55);
    }

    #[test]
    fn cooldown_rejects_same_action_kind() {
        let (clock, room) = classroom();
        room.join("u1", "Ada");
        room.record_points_update("u1", 10, &[], "save").unwrap();
        let before = room.member("u1").unwrap();

        clock.advance_ms(30_000);
        assert_eq!(room.record_points_update("u1", 20, &[], "save").unwrap(), 0);
        assert_eq!(room.member("u1").unwrap(), before);

        // A different action kind is not throttled.
        assert_eq!(room.record_points_update("u1", 20, &[], "achievement").unwrap(), 10);
    }

    #[test]
    fn daily_cap_discards_excess_and_resets_next_day() {
        let (clock, room) = classroom();
        room.join("u1", "Ada");
        assert_eq!(room.record_points_update("u1", 250, &[], "save").unwrap(), 250);
        clock.advance_ms(61_000);
        assert_eq!(room.record_points_update("u1", 400, &[], "save").unwrap(), 50);
        let member = room.member("u1").unwrap();
        assert_eq!(member.daily_points_used, 300);
        assert_eq!(member.total_points, 300);

        // Next day: the discarded 100 points are not carried over.
        clock.advance_ms(24 * 60 * 60 * 1000);
        assert_eq!(room.record_points_update("u1", 420, &[], "save").unwrap(), 20);
        assert_eq!(room.member("u1").unwrap().daily_points_used, 20);
    }

    #[test]
    fn day_rollover_clears_cooldowns() {
        let clock = Arc::new(ManualClock::at(2024, 3, 13, 23, 59, 50).expect("valid test date"));
        let room = ClassroomAggregator::new("CLSRM-NIGHT1", clock.clone(), ClassroomLimits::default());
        room.join("u1", "Ada");
        assert_eq!(room.record_points_update("u1", 120, &[], "save").unwrap(), 120);

        // 00:00:05 the next day, well inside the 60 s cooldown.
        clock.advance_ms(15_000);
        assert_eq!(room.record_points_update("u1", 150, &[], "save").unwrap(), 30);

        let member = room.member("u1").unwrap();
        assert_eq!(member.daily_points_used, 30);
        assert_eq!(member.total_points, 150);
        assert_eq!(member.daily_reset_date, day_of(clock.now_ms()));
    }

    #[test]
    fn leaderboard_breaks_ties_by_join_order() {
        let (clock, room) = classroom();
        room.join("first", "First");
        room.join("second", "Second");
        room.join("third", "Third");
        room.record_points_update("second", 250, &[], "save").unwrap();
        room.record_points_update("first", 250, &[], "save").unwrap();
        room.record_points_update("third", 100, &[], "save").unwrap();
        clock.advance_ms(1);

        let board = room.leaderboard();
        let order: Vec<&str> = board.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
        assert_eq!(board[0].medal.as_deref(), Some("🥇"));
        assert_eq!(board[2].rank, 3);
        assert!(room.is_top("first"));
    }

    #[test]
    fn weekly_summary_covers_current_week_only() {
        let (clock, room) = classroom();
        room.join("u1", "Ada");
        room.join("u2", "Grace");
        room.record_points_update("u1", 30, &[], "save").unwrap();
        room.record_points_update("u2", 80, &[], "save").unwrap();

        let summary = room.weekly_summary();
        assert_eq!(summary.week_start_date.to_string(), "2024-03-10");
        assert_eq!(summary.total_weekly_points, 110);
        assert_eq!(summary.active_member_count, 2);
        assert_eq!(summary.top_three[0].user_id, "u2");

        // Next week only u1 is active again; its weekly points restart at zero.
        clock.advance_ms(7 * 24 * 60 * 60 * 1000);
        room.record_points_update("u1", 45, &[], "save").unwrap();
        let summary = room.weekly_summary();
        assert_eq!(summary.week_start_date.to_string(), "2024-03-17");
        assert_eq!(summary.active_member_count, 1);
        assert_eq!(summary.total_weekly_points, 15);
        assert_eq!(room.member("u1").unwrap().weekly_points, 15);
    }

    #[test]
    fn pin_protects_join() {
        let clock = Arc::new(ManualClock::at(2024, 3, 13, 9, 0, 0).expect("valid test date"));
        let room = ClassroomAggregator::create(Some("1234".to_string()), clock, ClassroomLimits::default());
        assert!(room.classroom_id().starts_with("CLSRM-"));
        assert_eq!(room.classroom_id().len(), 12);

        let err = room.join_with_pin("u1", "Ada", Some("0000")).unwrap_err();
        assert!(matches!(err, EcoError::InvalidPin(_)));
        room.join_with_pin("u1", "Ada", Some("1234")).unwrap();
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn lead_change_is_announced_once() {
        let (clock, room) = classroom();
        room.join("u1", "Ada");
        room.join("u2", "Grace");
        room.clear_notifications();

        room.record_points_update("u1", 20, &[], "save").unwrap();
        clock.advance_ms(61_000);
        room.record_points_update("u1", 30, &[], "save").unwrap();
        let notes = room.notifications();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].message.contains("Ada took the lead"));

        room.mark_all_read();
        assert!(room.notifications().iter().all(|n| n.read));
    }

    #[test]
    fn notifications_are_capped() {
        let clock = Arc::new(ManualClock::at(2024, 3, 13, 9, 0, 0).expect("valid test date"));
        let limits = ClassroomLimits {
            max_notifications: 3,
            ..ClassroomLimits::default()
        };
        let room = ClassroomAggregator::new("CLSRM-CAP001", clock, limits);
        for i in 0..5 {
            room.join(&format!("u{i}"), &format!("User {i}"));
        }
        let notes = room.notifications();
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].message, "User 4 joined the classroom");
    }

    #[test]
    fn snapshot_round_trip_keeps_join_order() {
        let (clock, room) = classroom();
        room.join("b", "B");
        room.join("a", "A");
        room.record_points_update("a", 12, &["first-save".to_string()], "save").unwrap();

        let snapshot = room.snapshot();
        assert_eq!(snapshot.members[0].user_id, "b");

        let restored = ClassroomAggregator::from_classroom(snapshot.clone(), clock, ClassroomLimits::default());
        assert_eq!(restored.snapshot(), snapshot);
        restored.join("c", "C");
        assert_eq!(restored.member("c").unwrap().join_seq, 2);
    }
}
