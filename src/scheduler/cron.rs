//! Standard 5-field cron expressions on top of the `cron` crate.
//!
//! Standard cron: `min hour day month weekday` with Sunday as 0 or 7.
//! Cron crate:    `sec min hour day month weekday year` with Sunday as 1.
//! Numeric weekdays are rewritten to names so both agree.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::ConfigurationError;

const WEEKDAYS: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

fn invalid(expression: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidCron {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

fn weekday_name(token: &str) -> String {
    match token.parse::<usize>() {
        Ok(n) if n < WEEKDAYS.len() => WEEKDAYS[n].to_string(),
        _ => token.to_string(),
    }
}

fn translate_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let range = match range.split_once('-') {
                // `n-7` ends on Sunday, which the crate orders first
                Some((start, "7")) if start != "0" && step.is_none() => {
                    format!("{}-SAT,SUN", weekday_name(start))
                }
                Some((start, end)) => format!("{}-{}", weekday_name(start), weekday_name(end)),
                None => weekday_name(range),
            };
            match step {
                Some(step) => format!("{}/{}", range, step),
                None => range,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a standard 5-field expression.
pub fn parse(expression: &str) -> Result<Schedule, ConfigurationError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(invalid(
            expression,
            format!("expected 5 fields, found {}", fields.len()),
        ));
    }

    let normalized = format!(
        "0 {} {} {} {} {} *",
        fields[0],
        fields[1],
        fields[2],
        fields[3],
        translate_weekdays(fields[4])
    );
    Schedule::from_str(&normalized).map_err(|e| invalid(expression, e.to_string()))
}

/// Reject anything `parse` would reject.
pub fn validate(expression: &str) -> Result<(), ConfigurationError> {
    parse(expression).map(|_| ())
}

/// First occurrence strictly after `after`, in UTC.
pub fn next_occurrence(expression: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ConfigurationError> {
    parse(expression)?
        .after(&after)
        .next()
        .ok_or_else(|| invalid(expression, "expression has no future occurrence"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_every_five_minutes() {
        let next = next_occurrence("*/5 * * * *", at(0, 2)).unwrap();
        assert_eq!(next, at(0, 5));
    }

    #[test]
    fn test_every_five_hours() {
        // minute 0 of every fifth hour
        let next = next_occurrence("0 */5 * * *", at(0, 2)).unwrap();
        assert_eq!(next, at(5, 0));
    }

    #[test]
    fn test_strictly_after() {
        let next = next_occurrence("*/5 * * * *", at(0, 5)).unwrap();
        assert_eq!(next, at(0, 10));
    }

    #[test]
    fn test_numeric_weekdays() {
        // 2024-01-01 is a Monday
        let sunday = next_occurrence("30 9 * * 0", at(12, 0)).unwrap();
        assert_eq!(sunday.weekday(), Weekday::Sun);
        assert_eq!((sunday.hour(), sunday.minute()), (9, 30));

        let also_sunday = next_occurrence("30 9 * * 7", at(12, 0)).unwrap();
        assert_eq!(also_sunday, sunday);

        let weekday = next_occurrence("0 8 * * 1-5", at(12, 0)).unwrap();
        assert_eq!(weekday.weekday(), Weekday::Tue);
    }

    #[test]
    fn test_translate_weekdays() {
        assert_eq!(translate_weekdays("1-5"), "MON-FRI");
        assert_eq!(translate_weekdays("0,6"), "SUN,SAT");
        assert_eq!(translate_weekdays("*/2"), "*/2");
        assert_eq!(translate_weekdays("3-7"), "WED-SAT,SUN");
        assert_eq!(translate_weekdays("MON"), "MON");
    }

    #[test]
    fn test_rejects_bad_expressions() {
        for expr in ["", "* * * *", "* * * * * *", "61 * * * *", "not a cron"] {
            let err = validate(expr).unwrap_err();
            assert!(err.to_string().starts_with("invalid cron expression"), "{}", expr);
        }
    }
}
