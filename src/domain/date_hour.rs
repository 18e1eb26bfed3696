use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum ParseDateHourError {
    #[error("expected \"YYYY-MM-DD HH\", got {0:?}")]
    Format(String),
    #[error("invalid date: {0}")]
    Date(#[from] chrono::ParseError),
    #[error("hour out of range: {0}")]
    Hour(String),
}

/// A calendar hour in UTC, the key every forecast and plan row is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateHour {
    pub date: NaiveDate,
    pub hour: u32,
}

impl DateHour {
    pub fn new(date: NaiveDate, hour: u32) -> Option<Self> {
        (hour < 24).then_some(Self { date, hour })
    }

    pub fn from_datetime<Z: TimeZone>(t: &DateTime<Z>) -> Self {
        let utc = t.with_timezone(&Utc);
        Self {
            date: utc.date_naive(),
            hour: utc.hour(),
        }
    }

    pub fn now() -> Self {
        Self::from_datetime(&Utc::now())
    }

    /// Start of the hour as a UTC instant.
    pub fn start(&self) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(self.hour, 0, 0).unwrap_or(NaiveTime::MIN);
        Utc.from_utc_datetime(&NaiveDateTime::new(self.date, time))
    }

    pub fn add(&self, hours: i64) -> Self {
        Self::from_datetime(&(self.start() + Duration::hours(hours)))
    }

    pub fn sub(&self, hours: i64) -> Self {
        self.add(-hours)
    }

    pub fn iso_string(&self) -> String {
        format!("{}T{:02}:00:00Z", self.date.format(DATE_FORMAT), self.hour)
    }

    /// Same hour rendered as "YYYY-MM-DD HH" in `tz`.
    pub fn localized(&self, tz: Tz) -> String {
        let local = self.start().with_timezone(&tz);
        format!("{} {:02}", local.format(DATE_FORMAT), local.hour())
    }
}

impl fmt::Display for DateHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}", self.date.format(DATE_FORMAT), self.hour)
    }
}

impl FromStr for DateHour {
    type Err = ParseDateHourError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (date, hour) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| ParseDateHourError::Format(s.to_string()))?;
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT)?;
        let hour: u32 = hour
            .parse()
            .map_err(|_| ParseDateHourError::Hour(hour.to_string()))?;
        DateHour::new(date, hour).ok_or_else(|| ParseDateHourError::Hour(hour.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dh(s: &str) -> DateHour {
        s.parse().unwrap()
    }

    #[test]
    fn test_display_and_parse() {
        let h = dh("2024-03-05 07");
        assert_eq!(h.to_string(), "2024-03-05 07");
        assert_eq!(h.iso_string(), "2024-03-05T07:00:00Z");
        assert!("2024-03-05 24".parse::<DateHour>().is_err());
        assert!("2024-03-05".parse::<DateHour>().is_err());
    }

    #[test]
    fn test_add_crosses_midnight_and_month() {
        assert_eq!(dh("2024-01-31 22").add(3), dh("2024-02-01 01"));
        assert_eq!(dh("2024-02-01 01").sub(3), dh("2024-01-31 22"));
    }

    #[test]
    fn test_ordering_is_chronological() {
        assert!(dh("2024-01-01 23") < dh("2024-01-02 00"));
        assert!(dh("2024-01-02 05") > dh("2024-01-02 04"));
    }

    #[test]
    fn test_localized_in_stockholm() {
        // CET is UTC+1 in winter, CEST UTC+2 in summer
        assert_eq!(dh("2024-01-15 10").localized(chrono_tz::Europe::Stockholm), "2024-01-15 11");
        assert_eq!(dh("2024-07-15 23").localized(chrono_tz::Europe::Stockholm), "2024-07-16 01");
    }

    #[test]
    fn test_from_datetime_normalizes_to_utc() {
        let t = chrono_tz::Europe::Stockholm
            .with_ymd_and_hms(2024, 1, 15, 0, 30, 0)
            .unwrap();
        assert_eq!(DateHour::from_datetime(&t), dh("2024-01-14 23"));
    }
}
