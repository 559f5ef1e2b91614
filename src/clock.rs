use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use std::sync::Mutex;

/// Source of "now" for cooldowns, daily caps and weekly resets.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// `None` when the fields do not name a valid UTC instant.
    pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
            .single()
            .map(Self::new)
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = instant;
        }
    }

    pub fn advance_ms(&self, millis: i64) {
        if let Ok(mut now) = self.now.lock() {
            *now += Duration::milliseconds(millis);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}

/// Calendar day (UTC) of a millisecond timestamp.
pub fn day_of(timestamp_ms: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

/// Sunday that starts the calendar week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let back = date.weekday().num_days_from_sunday() as i64;
    date - Duration::days(back)
}

/// Millisecond timestamp of 00:00 UTC on `date`.
pub fn start_of_day_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_starts_on_sunday() {
        // 2024-03-13 is a Wednesday.
        let wednesday = NaiveDate::from_ymd_opt(2024, 3, 13).unwrap();
        assert_eq!(week_start(wednesday), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());

        let sunday = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(week_start(sunday), sunday);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::at(2024, 3, 13, 10, 0, 0).expect("valid test date");
        let before = clock.now_ms();
        clock.advance_ms(61_000);
        assert_eq!(clock.now_ms() - before, 61_000);
    }

    #[test]
    fn invalid_start_date_is_rejected() {
        assert!(ManualClock::at(2024, 2, 30, 10, 0, 0).is_none());
        assert!(ManualClock::at(2024, 3, 13, 24, 0, 0).is_none());
    }

    #[test]
    fn day_of_uses_utc_calendar() {
        let clock = ManualClock::at(2024, 3, 13, 23, 59, 59).expect("valid test date");
        assert_eq!(day_of(clock.now_ms()), NaiveDate::from_ymd_opt(2024, 3, 13).unwrap());
        clock.advance_ms(1_000);
        assert_eq!(day_of(clock.now_ms()), NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
    }
}
