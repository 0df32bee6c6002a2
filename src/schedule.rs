//! Working-hours gate for presence checks

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};

/// Parse an "HH:MM" time of day. Anything else is `None`.
pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let (hour, minute) = raw.trim().split_once(':')?;
    let hour: u32 = hour.trim().parse().ok()?;
    let minute: u32 = minute.trim().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Schedule inputs for a single decision.
#[derive(Debug, Clone, Default)]
pub struct ScheduleConfig {
    pub toggle_state: bool,
    pub weekend_allowed: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl ScheduleConfig {
    pub fn allows(&self, now: NaiveDateTime) -> bool {
        should_check_presence(
            self.toggle_state,
            now,
            self.weekend_allowed,
            self.start_time.as_deref(),
            self.end_time.as_deref(),
        )
    }
}

/// Decide whether presence should be checked at `now`.
///
/// Both window bounds are inclusive at minute resolution. A bound that is
/// missing or does not parse leaves that side open.
pub fn should_check_presence(
    toggle_state: bool,
    now: NaiveDateTime,
    weekend_allowed: bool,
    start_time: Option<&str>,
    end_time: Option<&str>,
) -> bool {
    if !toggle_state {
        tracing::debug!("Accessory is switched off");
        return false;
    }

    if !weekend_allowed && matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        tracing::debug!("It's weekend, accessory will not set the busy flag");
        return false;
    }

    let minute_of_day = (now.hour(), now.minute());

    if let Some(start) = start_time.and_then(parse_time_of_day) {
        if minute_of_day < (start.hour(), start.minute()) {
            tracing::debug!("Presence doesn't need to be checked, before working hours");
            return false;
        }
    }

    if let Some(end) = end_time.and_then(parse_time_of_day) {
        if minute_of_day > (end.hour(), end.minute()) {
            tracing::debug!("Presence doesn't need to be checked, after working hours");
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2024-06-05 is a Wednesday, 2024-06-08 a Saturday.
    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, minute, 30)
            .unwrap()
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("09:00"), NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(parse_time_of_day(" 7:5 "), NaiveTime::from_hms_opt(7, 5, 0));
        assert_eq!(parse_time_of_day("24:00"), None);
        assert_eq!(parse_time_of_day("nine"), None);
        assert_eq!(parse_time_of_day(""), None);
    }

    #[test]
    fn test_toggle_off_is_always_false() {
        for (day, hour) in [(5, 10), (8, 10), (5, 3)] {
            assert!(!should_check_presence(false, at(day, hour, 0), true, None, None));
        }
    }

    #[test]
    fn test_weekend_excluded_regardless_of_window() {
        assert!(!should_check_presence(true, at(8, 12, 0), false, Some("00:00"), Some("23:59")));
        assert!(!should_check_presence(true, at(9, 12, 0), false, None, None));
        assert!(should_check_presence(true, at(8, 12, 0), true, None, None));
    }

    #[test]
    fn test_window_boundaries_are_inclusive() {
        let check = |hour, minute| {
            should_check_presence(true, at(5, hour, minute), false, Some("09:00"), Some("17:30"))
        };
        assert!(!check(8, 59));
        assert!(check(9, 0));
        assert!(check(17, 30));
        assert!(!check(17, 31));
    }

    #[test]
    fn test_unparsable_bound_is_open() {
        assert!(should_check_presence(true, at(5, 3, 0), false, Some("later"), None));
        assert!(should_check_presence(true, at(5, 23, 0), false, None, Some("")));
    }

    #[test]
    fn test_schedule_config_allows() {
        let schedule = ScheduleConfig {
            toggle_state: true,
            weekend_allowed: false,
            start_time: Some("08:00".into()),
            end_time: None,
        };
        assert!(schedule.allows(at(5, 8, 0)));
        assert!(!schedule.allows(at(5, 7, 59)));
    }
}
