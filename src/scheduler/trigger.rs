//! Weekly trigger points and their next-occurrence derivation.

use chrono::{DateTime, Datelike, Duration, LocalResult, TimeZone};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TriggerError {
    #[error("weekday out of range: {0} (expected 0-6)")]
    DayOutOfRange(u8),
    #[error("hour out of range: {0} (expected 0-23)")]
    HourOutOfRange(u8),
    #[error("minute out of range: {0} (expected 0-59)")]
    MinuteOutOfRange(u8),
}

/// One weekly recurrence point. Day 0 is Sunday, matching the persisted
/// `notification_day` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyTrigger {
    day: u8,
    hour: u8,
    minute: u8,
}

impl WeeklyTrigger {
    /// Out-of-range values are rejected, never wrapped.
    pub fn new(day: u8, hour: u8, minute: u8) -> Result<Self, TriggerError> {
        if day > 6 {
            return Err(TriggerError::DayOutOfRange(day));
        }
        if hour > 23 {
            return Err(TriggerError::HourOutOfRange(hour));
        }
        if minute > 59 {
            return Err(TriggerError::MinuteOutOfRange(minute));
        }
        Ok(Self { day, hour, minute })
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// The next instant strictly after `after` at which this trigger fires,
    /// in `after`'s time zone.
    ///
    /// A fire time that does not exist locally (spring-forward gap) skips to
    /// the following week; an ambiguous one (fall-back) uses the earlier
    /// instant.
    pub fn next_occurrence(&self, after: DateTime<Tz>) -> DateTime<Tz> {
        let tz = after.timezone();
        let days_ahead = (i64::from(self.day) + 7
            - i64::from(after.weekday().num_days_from_sunday()))
            % 7;
        let mut date = after.date_naive() + Duration::days(days_ahead);
        loop {
            let candidate = tz.with_ymd_and_hms(
                date.year(),
                date.month(),
                date.day(),
                u32::from(self.hour),
                u32::from(self.minute),
                0,
            );
            match candidate {
                LocalResult::Single(instant) | LocalResult::Ambiguous(instant, _)
                    if instant > after =>
                {
                    return instant;
                }
                // Already passed this week, or the local time does not exist.
                _ => date += Duration::days(7),
            }
        }
    }
}

impl std::fmt::Display for WeeklyTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "weekday {} at {:02}:{:02}",
            self.day, self.hour, self.minute
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Weekday};
    use chrono_tz::Europe::Berlin;

    #[test]
    fn accepts_boundary_values() {
        assert!(WeeklyTrigger::new(0, 0, 0).is_ok());
        assert!(WeeklyTrigger::new(6, 23, 59).is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert_eq!(
            WeeklyTrigger::new(7, 0, 0),
            Err(TriggerError::DayOutOfRange(7))
        );
        assert_eq!(
            WeeklyTrigger::new(0, 24, 0),
            Err(TriggerError::HourOutOfRange(24))
        );
        assert_eq!(
            WeeklyTrigger::new(0, 0, 60),
            Err(TriggerError::MinuteOutOfRange(60))
        );
    }

    #[test]
    fn next_occurrence_later_same_day() {
        // 2024-01-03 is a Wednesday (day 3).
        let after = Berlin.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap();
        let trigger = WeeklyTrigger::new(3, 11, 30).unwrap();

        let next = trigger.next_occurrence(after);
        assert_eq!(next, Berlin.with_ymd_and_hms(2024, 1, 3, 11, 30, 0).unwrap());
    }

    #[test]
    fn next_occurrence_skips_to_next_week_when_passed() {
        let after = Berlin.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap();
        let trigger = WeeklyTrigger::new(3, 9, 0).unwrap();

        let next = trigger.next_occurrence(after);
        assert_eq!(next, Berlin.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap());
    }

    #[test]
    fn next_occurrence_exact_instant_moves_a_week_ahead() {
        let after = Berlin.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();
        let trigger = WeeklyTrigger::new(3, 9, 0).unwrap();

        let next = trigger.next_occurrence(after);
        assert_eq!(next, Berlin.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap());
    }

    #[test]
    fn next_occurrence_crosses_into_other_weekday() {
        // Wednesday looking for Sunday (day 0).
        let after = Berlin.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap();
        let trigger = WeeklyTrigger::new(0, 8, 15).unwrap();

        let next = trigger.next_occurrence(after);
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!(next, Berlin.with_ymd_and_hms(2024, 1, 7, 8, 15, 0).unwrap());
    }

    #[test]
    fn dst_gap_skips_to_following_week() {
        // In Berlin, 2024-03-31 02:30 does not exist (clocks jump 02:00 -> 03:00).
        let after = Berlin.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap();
        let trigger = WeeklyTrigger::new(0, 2, 30).unwrap();

        let next = trigger.next_occurrence(after);
        assert_eq!(next, Berlin.with_ymd_and_hms(2024, 4, 7, 2, 30, 0).unwrap());
    }

    #[test]
    fn dst_ambiguity_uses_earlier_instant() {
        // In Berlin, 2024-10-27 02:30 happens twice (clocks fall back at 03:00).
        let after = Berlin.with_ymd_and_hms(2024, 10, 26, 12, 0, 0).unwrap();
        let trigger = WeeklyTrigger::new(0, 2, 30).unwrap();

        let next = trigger.next_occurrence(after);
        assert_eq!(next.date_naive().to_string(), "2024-10-27");
        assert_eq!(next.hour(), 2);
        assert_eq!(next.minute(), 30);
        // Earlier of the two instants, still on summer time (UTC+2).
        use chrono::Offset;
        assert_eq!(next.offset().fix().local_minus_utc(), 2 * 3600);
    }
}
