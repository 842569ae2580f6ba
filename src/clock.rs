use anyhow::anyhow;
use chrono::{Datelike, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// The school operates in one civil timezone. Deriving "today" from UTC or the
/// host zone shifts the reported day near midnight, so every date/weekday in
/// the daemon comes through here.
pub const SCHOOL_TZ: Tz = chrono_tz::America::Santo_Domingo;

#[derive(Debug, Clone)]
pub struct SchoolDay {
    pub date: String,
    pub weekday: &'static str,
}

/// Resolve the current instant to the school calendar day. Callers resolve
/// once per logical operation and reuse the value for every query in it.
pub fn today() -> SchoolDay {
    let now = Utc::now().with_timezone(&SCHOOL_TZ);
    SchoolDay {
        date: now.format("%Y-%m-%d").to_string(),
        weekday: weekday_name(now.weekday()),
    }
}

/// Wall-clock HH:MM in the school timezone, for the current-block lookup.
pub fn current_time_hhmm() -> String {
    let now = Utc::now().with_timezone(&SCHOOL_TZ);
    format!("{:02}:{:02}", now.hour(), now.minute())
}

/// Full timestamp in the school timezone, for record creation stamps.
pub fn now_stamp() -> String {
    Utc::now()
        .with_timezone(&SCHOOL_TZ)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn weekday_for_date(date: &str) -> anyhow::Result<&'static str> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| anyhow!("date must be YYYY-MM-DD: {}", date))?;
    Ok(weekday_name(parsed.weekday()))
}

pub fn is_valid_date(date: &str) -> bool {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

pub const WEEKDAY_NAMES: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

pub fn is_valid_weekday(name: &str) -> bool {
    WEEKDAY_NAMES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_for_date_resolves_known_dates() {
        assert_eq!(weekday_for_date("2024-09-02").unwrap(), "monday");
        assert_eq!(weekday_for_date("2024-09-08").unwrap(), "sunday");
        assert_eq!(weekday_for_date("2025-01-01").unwrap(), "wednesday");
    }

    #[test]
    fn weekday_for_date_rejects_malformed_input() {
        assert!(weekday_for_date("02/09/2024").is_err());
        assert!(weekday_for_date("2024-13-40").is_err());
        assert!(weekday_for_date("").is_err());
    }

    #[test]
    fn weekday_names_round_trip() {
        for name in WEEKDAY_NAMES {
            assert!(is_valid_weekday(name));
        }
        assert!(!is_valid_weekday("Monday"));
        assert!(!is_valid_weekday("lunes"));
    }
}
